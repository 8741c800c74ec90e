//! Synthetic umbrella sampling runs with analytically known results

use crate::config::{
    EvolutionConfig, ForceConstantConvention, RunConfig, VarianceThresholds, Window,
    WindowRegistry, CONFIG_FILE_NAME, SCHEMA_VERSION,
};
use crate::errors::*;
use crate::integration::{BOLTZMANN, HARTREE};
use crate::statistics::{LoadedStatistics, StatisticsFile, StatisticsTensor};
use ndarray::Array1;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Test case of harmonic windows on a linear free energy surface.
///
/// With $A(\xi) = a\xi$ and a restraint $\frac{K}{2}(\xi - \xi_l)^2$, window $l$ samples a normal
/// distribution with mean $\xi_l - a/K$ and variance $k_B T / K$, so every window's local
/// mean force is exactly $a$ and the potential of mean force is a straight line.
///
/// # Examples
///
/// Generate the statistics tensor with default parameters.
///
/// ```
/// use umbrella_rs::testsystems::*;
///
/// let testcase = TiltedWindows::default();
/// let tensor = testcase.statistics().unwrap().tensor;
/// assert_eq!(tensor.effective_cycles(), 10);
/// ```
///
/// Make the running means converge from a displaced start.
///
/// ```
/// use umbrella_rs::testsystems::*;
///
/// let testcase = TiltedWindows::builder().drift(0.002).cycles(50).build().unwrap();
/// let files = testcase.files();
/// assert_eq!(files[0].cycles(), 50);
/// ```
#[derive(Builder, Debug)]
#[builder(build_fn(validate = "Self::validate", name = "build_inner", private))]
pub struct TiltedWindows {
    /// Target coordinate of each window.
    #[builder(default = "Array1::linspace(-0.1, 0.1, 21)")]
    coordinates: Array1<f64>,

    /// Restraint strength shared by every window, Hartree per squared coordinate unit
    #[builder(default = "20.0")]
    force_constant: f64,

    /// Slope of the free energy surface, Hartree per coordinate unit
    #[builder(default = "0.01")]
    slope: f64,

    /// Temperature in kelvin
    #[builder(default = "300.0")]
    temperature: f64,

    /// Number of recorded cycles
    #[builder(default = "10")]
    cycles: usize,

    /// Steps sampled between two recorded cycles
    #[builder(default = "1000.0")]
    steps_per_cycle: f64,

    /// Step size in picoseconds
    #[builder(default = "0.0001")]
    step_size: f64,

    /// Offset of every running mean at the first cycle, decaying as `1 / (cycle + 1)`
    #[builder(default = "0.0")]
    drift: f64,
}

impl TiltedWindowsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(coordinates) = &self.coordinates {
            if coordinates.len() < 2 {
                return Err(format!(
                    "at least two windows are needed, not {}",
                    coordinates.len()
                ));
            }
        }
        if let Some(k) = self.force_constant {
            if !(k > 0.0) {
                return Err(format!("force_constant must be positive, not {}", k));
            }
        }
        if let Some(t) = self.temperature {
            if !(t > 0.0) {
                return Err(format!("temperature must be positive, not {}", t));
            }
        }

        Ok(())
    }

    /// Build the test case
    pub fn build(&self) -> Result<TiltedWindows> {
        Ok(self.build_inner()?)
    }
}

impl TiltedWindows {
    /// Get a new builder for the `TiltedWindows` struct.
    pub fn builder() -> TiltedWindowsBuilder {
        TiltedWindowsBuilder::default()
    }

    /// Slope of the free energy surface in Hartree per coordinate unit
    pub fn slope(&self) -> f64 {
        self.slope
    }

    /// Variance every window samples, $k_B T / K$
    pub fn variance(&self) -> f64 {
        BOLTZMANN * self.temperature / HARTREE / self.force_constant
    }

    /// Mean every window converges to
    pub fn equilibrium_mean(&self, window: usize) -> f64 {
        self.coordinates[window] - self.slope / self.force_constant
    }

    fn windows(&self) -> Vec<Window> {
        self.coordinates
            .iter()
            .map(|&coordinate| Window {
                coordinate,
                force_constant: self.force_constant,
            })
            .collect()
    }

    /// The windows as a registry
    pub fn registry(&self) -> Result<WindowRegistry> {
        WindowRegistry::new(self.windows(), self.temperature)
    }

    /// A run configuration describing this test case
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            version: SCHEMA_VERSION,
            temperature: self.temperature,
            beads: 1,
            force_constant_convention: ForceConstantConvention::Absolute,
            statistics_dir: None,
            evolution: EvolutionConfig::default(),
            thresholds: VarianceThresholds::default(),
            windows: self.windows(),
        }
    }

    /// One statistics file per window
    pub fn files(&self) -> Vec<StatisticsFile> {
        let variance = self.variance();
        self.windows()
            .iter()
            .enumerate()
            .map(|(l, window)| StatisticsFile {
                path: PathBuf::from(window.statistics_file_name()),
                step_size: self.step_size,
                rows: (0..self.cycles)
                    .map(|c| {
                        let n = (c + 1) as f64;
                        Some([
                            n,
                            n,
                            n * self.steps_per_cycle,
                            self.equilibrium_mean(l) + self.drift / n,
                            variance,
                        ])
                    })
                    .collect(),
            })
            .collect()
    }

    /// The aligned statistics of every window
    pub fn statistics(&self) -> Result<LoadedStatistics> {
        StatisticsTensor::from_files(self.files(), &self.registry()?)
    }

    /// Write the statistics files into `dir`
    pub fn write_files(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| UmbrellaError::io(dir, e))?;
        for file in self.files() {
            let path = dir.join(&file.path);
            let mut out =
                BufWriter::new(File::create(&path).map_err(|e| UmbrellaError::io(&path, e))?);
            file.write(&mut out)
                .and_then(|_| out.flush())
                .map_err(|e| UmbrellaError::io(&path, e))?;
        }
        Ok(())
    }

    /// Write a complete source directory: `umbrella.toml` plus the statistics files where the
    /// configuration expects them
    pub fn write_run(&self, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        let config = self.run_config();
        let text = toml::to_string(&config)
            .map_err(|e| UmbrellaError::Config(format!("could not serialise: {}", e)))?;
        fs::create_dir_all(source).map_err(|e| UmbrellaError::io(source, e))?;
        let path = source.join(CONFIG_FILE_NAME);
        fs::write(&path, text).map_err(|e| UmbrellaError::io(&path, e))?;
        self.write_files(config.statistics_path(source))
    }
}

impl Default for TiltedWindows {
    fn default() -> Self {
        Self::builder()
            .build()
            .expect("TiltedWindows should not fail with default params")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_tilted_windows() {
        let testcase = TiltedWindows::builder()
            .coordinates(Array1::linspace(0.0, 1.0, 5))
            .cycles(3)
            .build()
            .unwrap();

        assert_eq!(testcase.coordinates.len(), 5);
        assert_eq!(testcase.force_constant, 20.0);
        assert_eq!(testcase.slope, 0.01);
        assert_eq!(testcase.cycles, 3);
        assert_eq!(testcase.drift, 0.0);
    }

    #[test]
    fn reject_single_window() {
        let result = TiltedWindows::builder()
            .coordinates(Array1::from(vec![0.0]))
            .build();
        assert!(matches!(result, Err(UmbrellaError::BuilderError(_))));
    }

    #[test]
    fn rows_follow_the_analytical_moments() {
        let testcase = TiltedWindows::builder().drift(0.002).build().unwrap();
        let files = testcase.files();

        assert_eq!(files.len(), 21);
        let first = files[0].rows[0].unwrap();
        let last = files[0].rows[9].unwrap();
        assert_eq!(first[2], 1000.0);
        assert_eq!(last[2], 10_000.0);
        assert_eq!(first[3], testcase.equilibrium_mean(0) + 0.002);
        assert_eq!(last[3], testcase.equilibrium_mean(0) + 0.002 / 10.0);
        assert_eq!(first[4], testcase.variance());
    }

    #[test]
    fn written_run_is_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let testcase = TiltedWindows::default();
        testcase.write_run(dir.path()).unwrap();

        let config = RunConfig::from_dir(dir.path()).unwrap();
        assert_eq!(config, testcase.run_config());

        let loaded =
            StatisticsTensor::load(config.statistics_path(dir.path()), &config.registry()).unwrap();
        assert_eq!(loaded.tensor, testcase.statistics().unwrap().tensor);
    }
}
