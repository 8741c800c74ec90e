//! Window populations and variances, the data behind overlap and variance plots
//!
//! Rendering is left to the caller; this module only lays the Gaussian populations of the
//! windows out on a grid and follows them over time.

use crate::config::{VarianceThresholds, WindowRegistry};
use crate::density::{classify, density};
use crate::diagnostics::{Degeneracy, Diagnostic, Diagnostics};
use crate::errors::*;
use crate::statistics::{Channel, StatisticsTensor};
use ndarray::{Array1, Array2, Axis};

/// Default number of grid points for populations
pub const DEFAULT_RESOLUTION: usize = 2000;

/// Default margin added on both sides of the window span
pub const DEFAULT_EXTEND: f64 = 0.03;

/// Gaussian populations of every window at one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    /// Cycle index
    pub cycle: usize,
    /// Grid the populations are evaluated on
    pub coordinate: Array1<f64>,
    /// `per_window[[l, i]]` is window `l`'s density at `coordinate[i]`; zero for skipped windows
    pub per_window: Array2<f64>,
    /// Sum over windows
    pub total: Array1<f64>,
    /// Windows that were skipped or look too diffuse
    pub diagnostics: Diagnostics,
}

/// Summed populations over time, normalised to a maximum of one
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationEvolution {
    /// Simulated time of each cycle in nanoseconds
    pub time: Array1<f64>,
    /// Grid the populations are evaluated on
    pub coordinate: Array1<f64>,
    /// `density[[c, i]]` is the normalised total population at cycle `c` and `coordinate[i]`
    pub density: Array2<f64>,
}

/// Variance of one window over the effective cycles
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceTrace {
    /// Window index
    pub window: usize,
    /// Simulated time in nanoseconds, from the window's own step counter
    pub time: Vec<f64>,
    /// Running variance at each time
    pub variance: Vec<f64>,
    /// The final variance exceeds the diffuse threshold
    pub diffuse_at_end: bool,
}

/// Populations and variances of the windows of one run
#[derive(Debug, Clone, Copy)]
pub struct Overlap<'a> {
    registry: &'a WindowRegistry,
    tensor: &'a StatisticsTensor,
    thresholds: VarianceThresholds,
    resolution: usize,
    extend: f64,
}

impl<'a> Overlap<'a> {
    /// Populations on the default grid with the default thresholds
    pub fn new(registry: &'a WindowRegistry, tensor: &'a StatisticsTensor) -> Self {
        Self {
            registry,
            tensor,
            thresholds: VarianceThresholds::default(),
            resolution: DEFAULT_RESOLUTION,
            extend: DEFAULT_EXTEND,
        }
    }

    /// Use other variance thresholds
    pub fn thresholds(mut self, thresholds: VarianceThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Use another grid: `resolution` points, `extend` beyond the outermost windows
    pub fn grid(mut self, resolution: usize, extend: f64) -> Self {
        self.resolution = resolution;
        self.extend = extend;
        self
    }

    /// The grid populations are evaluated on
    pub fn coordinate(&self) -> Array1<f64> {
        let (min, max) = self.registry.span();
        Array1::linspace(min - self.extend, max + self.extend, self.resolution)
    }

    /// Populations at any cycle below [`StatisticsTensor::max_cycles`]
    ///
    /// Windows that stopped before `cycle` are left out without a diagnostic; collapsed windows
    /// are left out with one. Diffuse windows are always drawn.
    pub fn population(&self, cycle: usize) -> Result<Population> {
        if cycle >= self.tensor.max_cycles() {
            return Err(UmbrellaError::CycleNotRecorded {
                cycle,
                max_cycles: self.tensor.max_cycles(),
            });
        }

        let coordinate = self.coordinate();
        let mut per_window = Array2::zeros((self.registry.len(), coordinate.len()));
        let mut diagnostics = Diagnostics::new();

        for (l, window) in self.registry.windows().iter().enumerate() {
            let stat = match self.tensor.statistic(cycle, l) {
                Some(stat) => stat,
                None => {
                    log::debug!("xi = {:.4} has no statistics at cycle {}", window.coordinate, cycle);
                    continue;
                }
            };
            let degeneracy = classify(stat.variance, &self.thresholds);
            let included = degeneracy != Some(Degeneracy::Collapsed);
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
            if !included {
                continue;
            }
            for (cell, &x) in per_window.row_mut(l).iter_mut().zip(coordinate.iter()) {
                *cell = density(x, stat.mean, stat.variance).unwrap_or(0.0);
            }
        }

        let total = per_window.sum_axis(Axis(0));
        Ok(Population {
            cycle,
            coordinate,
            per_window,
            total,
            diagnostics,
        })
    }

    /// Summed populations at every effective cycle, normalised by their overall maximum
    pub fn population_evolution(&self) -> Result<PopulationEvolution> {
        let cycles = self.tensor.effective_cycles();
        if cycles == 0 {
            return Err(UmbrellaError::EmptyRange);
        }

        let coordinate = self.coordinate();
        let mut density = Array2::zeros((cycles, coordinate.len()));
        let mut time = Array1::zeros(cycles);
        for cycle in 0..cycles {
            let population = self.population(cycle)?;
            density.row_mut(cycle).assign(&population.total);
            time[cycle] = self
                .tensor
                .time(cycle)
                .ok_or(UmbrellaError::CycleOutOfRange {
                    cycle,
                    effective_cycles: cycles,
                })?;
        }

        let max = density.iter().cloned().fold(0.0, f64::max);
        if max > 0.0 {
            density.mapv_inplace(|p| p / max);
        }

        Ok(PopulationEvolution {
            time,
            coordinate,
            density,
        })
    }

    /// Variance of window `window` at every effective cycle
    pub fn variance_trace(&self, window: usize) -> Result<VarianceTrace> {
        if window >= self.registry.len() {
            return Err(UmbrellaError::WindowOutOfRange {
                window,
                windows: self.registry.len(),
            });
        }

        let cycles = self.tensor.effective_cycles();
        let mut time = Vec::with_capacity(cycles);
        let mut variance = Vec::with_capacity(cycles);
        for cycle in 0..cycles {
            let out_of_range = || UmbrellaError::CycleOutOfRange {
                cycle,
                effective_cycles: cycles,
            };
            let steps = self
                .tensor
                .get(Channel::StepCounter, cycle, window)
                .ok_or_else(out_of_range)?;
            time.push(steps * self.tensor.step_size() * 1.0e-3);
            variance.push(
                self.tensor
                    .get(Channel::Variance, cycle, window)
                    .ok_or_else(out_of_range)?,
            );
        }

        let diffuse_at_end = variance
            .last()
            .map_or(false, |&v| v > self.thresholds.diffuse_variance);
        if diffuse_at_end {
            log::warn!(
                "traj. at xi = {:.4} may be too various",
                self.registry.windows()[window].coordinate
            );
        }

        Ok(VarianceTrace {
            window,
            time,
            variance,
            diffuse_at_end,
        })
    }
}
