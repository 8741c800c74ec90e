//! Umbrella integration of one cycle's window statistics into a potential of mean force

use crate::config::{VarianceThresholds, WindowRegistry};
use crate::density::{classify, contributes, density};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::errors::*;
use crate::statistics::StatisticsTensor;
use ndarray::Array1;

/// Hartree energy in joules
pub const HARTREE: f64 = 4.35974417e-18;

/// Boltzmann constant in joules per kelvin
pub const BOLTZMANN: f64 = 1.3806504e-23;

/// Conversion from Hartree to kcal/mol
pub const HARTREE_TO_KCAL_PER_MOL: f64 = 627.503;

/// Evenly spaced points spanning the window coordinates, and the centers of the bins between them
///
/// The same grid is used for every cycle of a run so that curves can be stacked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateGrid {
    points: Array1<f64>,
    centers: Array1<f64>,
    anchor: usize,
}

impl CoordinateGrid {
    /// `n_points` points from `min` to `max` inclusive
    pub fn new(min: f64, max: f64, n_points: usize) -> Self {
        let points = Array1::linspace(min, max, n_points);
        let centers: Array1<f64> = points
            .iter()
            .zip(points.iter().skip(1))
            .map(|(left, right)| 0.5 * (left + right))
            .collect();
        let anchor = centers
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(best, best_abs), (i, c)| {
                if c.abs() < best_abs {
                    (i, c.abs())
                } else {
                    (best, best_abs)
                }
            })
            .0;

        Self {
            points,
            centers,
            anchor,
        }
    }

    /// Grid points at which the mean force is evaluated
    pub fn points(&self) -> &Array1<f64> {
        &self.points
    }

    /// Bin centers at which the PMF is reported; one fewer than the points
    pub fn centers(&self) -> &Array1<f64> {
        &self.centers
    }

    /// Index of the bin center nearest zero, where the PMF is anchored
    pub fn anchor_index(&self) -> usize {
        self.anchor
    }
}

/// The mean force at a grid point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeanForce {
    /// The weighted mean force in Hartree per coordinate unit
    Value(f64),
    /// No window had density at this point
    Undefined,
}

impl MeanForce {
    /// The value, or zero contribution for an undefined point
    pub fn or_zero(self) -> f64 {
        match self {
            MeanForce::Value(v) => v,
            MeanForce::Undefined => 0.0,
        }
    }

    /// Whether the point has a value
    pub fn is_defined(self) -> bool {
        matches!(self, MeanForce::Value(_))
    }
}

/// A potential of mean force at one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PmfCurve {
    /// Cycle index
    pub cycle: usize,
    /// Simulated time in nanoseconds
    pub time: f64,
    /// Bin centers
    pub coordinate: Array1<f64>,
    /// `free_energy[i]` in kcal/mol at `coordinate[i]`, zero at the center nearest zero
    pub free_energy: Array1<f64>,
    /// Bins whose integral crossed a point with undefined mean force
    pub undefined_bins: Vec<usize>,
}

impl PmfCurve {
    /// Number of bins
    pub fn len(&self) -> usize {
        self.free_energy.len()
    }

    /// True for a curve with no bins
    pub fn is_empty(&self) -> bool {
        self.free_energy.is_empty()
    }

    /// Coordinate and value of the highest free energy; the first such bin on ties
    pub fn maximum(&self) -> (f64, f64) {
        let (index, value) = self.free_energy.iter().enumerate().fold(
            (0, f64::NEG_INFINITY),
            |(best, best_value), (i, &v)| {
                if v > best_value {
                    (i, v)
                } else {
                    (best, best_value)
                }
            },
        );
        (self.coordinate[index], value)
    }
}

/// Everything the integration of one cycle produced
#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedCycle {
    /// Mean force at every grid point
    pub mean_force: Vec<MeanForce>,
    /// The anchored potential of mean force
    pub pmf: PmfCurve,
    /// Degenerate windows and numerical gaps met at this cycle
    pub diagnostics: Diagnostics,
}

/// Umbrella integration of per-window running statistics
///
/// At each grid point $\xi$ every window $l$ gives a local estimate of the unbiased mean force
///
/// $$ \frac{\partial A_l}{\partial \xi} = \frac{1}{\beta} \frac{\xi - \bar\xi_l}{\sigma_l^2} - K_l (\xi - \xi_l) $$
///
/// from its running mean $\bar\xi_l$ and variance $\sigma_l^2$, target $\xi_l$ and restraint
/// strength $K_l$. The estimates are combined with weights $N_l p_l(\xi)$, where $N_l$ is the
/// number of samples and $p_l$ the Gaussian density of the window:
///
/// $$ \frac{\partial A}{\partial \xi} = \frac{\sum_l N_l p_l(\xi) \frac{\partial A_l}{\partial \xi}}{\sum_l N_l p_l(\xi)} $$
///
/// The combined mean force is integrated with the trapezoidal rule.
///
/// # References
///
/// 1. Kästner J and Thiel W. Bridging the gap between thermodynamic integration and umbrella
/// sampling provides a novel analysis method: "Umbrella integration". J. Chem. Phys. 123:144104,
/// 2005 <http://dx.doi.org/10.1063/1.2052648>
#[derive(Builder, Debug, Clone)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct UmbrellaIntegration {
    /// Windows and temperature; force constants are the effective restraint strengths
    registry: WindowRegistry,

    /// Number of grid points between the smallest and largest window coordinate
    #[builder(default = "500")]
    bins: usize,

    /// Variance limits for flagging degenerate windows
    #[builder(default)]
    thresholds: VarianceThresholds,

    #[builder(setter(skip), default)]
    grid: CoordinateGrid,
}

impl UmbrellaIntegrationBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(bins) = self.bins {
            if bins < 2 {
                return Err(format!("bins must be at least 2, not {}", bins));
            }
        }
        if let Some(thresholds) = &self.thresholds {
            thresholds.check()?;
        }

        Ok(())
    }

    /// Build the integrator and lay out its coordinate grid
    pub fn build(&self) -> Result<UmbrellaIntegration> {
        let mut new = self.build_inner()?;
        let (min, max) = new.registry.span();
        new.grid = CoordinateGrid::new(min, max, new.bins);
        Ok(new)
    }
}

/// A window that takes part in the sums at some cycle
struct ActiveWindow {
    mean: f64,
    variance: f64,
    samples: f64,
    target: f64,
    force_constant: f64,
}

impl UmbrellaIntegration {
    /// Get a new builder for the `UmbrellaIntegration` struct
    pub fn builder() -> UmbrellaIntegrationBuilder {
        UmbrellaIntegrationBuilder::default()
    }

    /// The window registry
    pub fn registry(&self) -> &WindowRegistry {
        &self.registry
    }

    /// The grid shared by every cycle
    pub fn grid(&self) -> &CoordinateGrid {
        &self.grid
    }

    /// Variance thresholds in use
    pub fn thresholds(&self) -> &VarianceThresholds {
        &self.thresholds
    }

    /// $\beta = E_h / k_B T$, inverse temperature in reciprocal Hartree
    pub fn beta(&self) -> f64 {
        HARTREE / (BOLTZMANN * self.registry.temperature())
    }

    /// Windows taking part at `cycle`, with a diagnostic for each degenerate one
    fn active_windows(
        &self,
        tensor: &StatisticsTensor,
        cycle: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<ActiveWindow>> {
        if tensor.n_windows() != self.registry.len() {
            return Err(UmbrellaError::ArrayLengthMismatch(
                tensor.n_windows(),
                self.registry.len(),
            ));
        }
        let out_of_range = || UmbrellaError::CycleOutOfRange {
            cycle,
            effective_cycles: tensor.effective_cycles(),
        };
        if cycle >= tensor.effective_cycles() {
            return Err(out_of_range());
        }

        let mut active = Vec::with_capacity(self.registry.len());
        for (l, window) in self.registry.windows().iter().enumerate() {
            let stat = tensor.statistic(cycle, l).ok_or_else(out_of_range)?;
            let degeneracy = classify(stat.variance, &self.thresholds);
            let included = contributes(degeneracy, &self.thresholds);
            if let Some(kind) = degeneracy {
                diagnostics.push(Diagnostic::DegenerateWindow {
                    cycle,
                    window: l,
                    coordinate: window.coordinate,
                    variance: stat.variance,
                    kind,
                    excluded: !included,
                });
            }
            if included {
                active.push(ActiveWindow {
                    mean: stat.mean,
                    variance: stat.variance,
                    samples: stat.sample_count,
                    target: window.coordinate,
                    force_constant: window.force_constant,
                });
            }
        }
        Ok(active)
    }

    /// Combined mean force at every grid point for one cycle
    pub fn mean_force(
        &self,
        tensor: &StatisticsTensor,
        cycle: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<MeanForce>> {
        let windows = self.active_windows(tensor, cycle, diagnostics)?;
        let kt = self.beta().recip();

        let mean_force = self
            .grid
            .points()
            .iter()
            .enumerate()
            .map(|(point, &x)| {
                let (numerator, denominator) = windows
                    .iter()
                    .filter_map(|w| density(x, w.mean, w.variance).map(|p| (w, p)))
                    .fold((0.0, 0.0), |(num, den), (w, p)| {
                        let local = kt * (x - w.mean) / w.variance - w.force_constant * (x - w.target);
                        let weight = w.samples * p;
                        (num + weight * local, den + weight)
                    });

                let value = numerator / denominator;
                if denominator > 0.0 && value.is_finite() {
                    MeanForce::Value(value)
                } else {
                    diagnostics.push(Diagnostic::NumericalGap {
                        cycle,
                        point,
                        coordinate: x,
                    });
                    MeanForce::Undefined
                }
            })
            .collect();

        Ok(mean_force)
    }

    /// Integrate a mean-force curve into a PMF anchored at the bin center nearest zero
    pub fn integrate(&self, mean_force: &[MeanForce], cycle: usize, time: f64) -> Result<PmfCurve> {
        let points = self.grid.points();
        if mean_force.len() != points.len() {
            return Err(UmbrellaError::ArrayLengthMismatch(
                mean_force.len(),
                points.len(),
            ));
        }

        // Running free energy at each grid point, zero at the first
        let mut running = Vec::with_capacity(points.len());
        running.push(0.0);
        for i in 0..points.len() - 1 {
            let dx = points[i + 1] - points[i];
            let step = 0.5 * dx * (mean_force[i].or_zero() + mean_force[i + 1].or_zero());
            running.push(running[i] + step);
        }

        let at_centers: Vec<f64> = running
            .iter()
            .zip(running.iter().skip(1))
            .map(|(left, right)| 0.5 * (left + right))
            .collect();
        let reference = at_centers[self.grid.anchor_index()];
        let free_energy: Array1<f64> = at_centers
            .iter()
            .map(|a| (a - reference) * HARTREE_TO_KCAL_PER_MOL)
            .collect();

        let undefined_bins = (0..points.len() - 1)
            .filter(|&i| !(mean_force[i].is_defined() && mean_force[i + 1].is_defined()))
            .collect();

        Ok(PmfCurve {
            cycle,
            time,
            coordinate: self.grid.centers().clone(),
            free_energy,
            undefined_bins,
        })
    }

    /// Mean force and potential of mean force at one cycle
    pub fn cycle(&self, tensor: &StatisticsTensor, cycle: usize) -> Result<IntegratedCycle> {
        let mut diagnostics = Diagnostics::new();
        let mean_force = self.mean_force(tensor, cycle, &mut diagnostics)?;
        let time = tensor.time(cycle).ok_or(UmbrellaError::CycleOutOfRange {
            cycle,
            effective_cycles: tensor.effective_cycles(),
        })?;
        let pmf = self.integrate(&mean_force, cycle, time)?;

        Ok(IntegratedCycle {
            mean_force,
            pmf,
            diagnostics,
        })
    }
}
