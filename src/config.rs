//! Run configuration and the window registry
//!
//! Window positions, restraint strengths and the temperature come from a versioned TOML file
//! rather than from the simulation's own input script:
//!
//! ```toml
//! version = 1
//! temperature = 300.0
//! beads = 1
//! force_constant_convention = "absolute"
//!
//! [[windows]]
//! coordinate = -0.05
//! force_constant = 0.1
//!
//! [[windows]]
//! coordinate = 0.0
//! force_constant = 0.1
//! ```

use crate::errors::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The only schema version this crate reads
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the run configuration file inside a source directory
pub const CONFIG_FILE_NAME: &str = "umbrella.toml";

/// One umbrella sampling window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Target value of the reaction coordinate
    pub coordinate: f64,
    /// Restraint strength, in Hartree per squared coordinate unit once in a [`WindowRegistry`]
    pub force_constant: f64,
}

impl Window {
    /// Name of the statistics file this window writes
    pub fn statistics_file_name(&self) -> String {
        format!("umbrella_sampling_{:.4}.dat", self.coordinate)
    }
}

/// How the `force_constant` of each configured window is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForceConstantConvention {
    /// The configured value is the restraint strength used in integration
    Absolute,
    /// The configured value is per kelvin and is multiplied by the temperature once
    PerKelvin,
}

impl Default for ForceConstantConvention {
    fn default() -> Self {
        Self::Absolute
    }
}

/// Parameters of the evolution run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Number of grid points spanning the window coordinates
    #[serde(default = "EvolutionConfig::default_bins")]
    pub bins: usize,
    /// Integrate cycles on the rayon thread pool
    #[serde(default = "EvolutionConfig::default_parallel")]
    pub parallel: bool,
}

impl EvolutionConfig {
    fn default_bins() -> usize {
        500
    }
    fn default_parallel() -> bool {
        true
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            bins: Self::default_bins(),
            parallel: Self::default_parallel(),
        }
    }
}

/// Variance limits used to flag degenerate windows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarianceThresholds {
    /// Variances at or below this are treated as zero and the window is excluded
    #[serde(default = "VarianceThresholds::default_collapsed")]
    pub collapsed_variance: f64,
    /// Variances above this are reported as too diffuse
    #[serde(default = "VarianceThresholds::default_diffuse")]
    pub diffuse_variance: f64,
    /// Also exclude diffuse windows from the sums
    #[serde(default)]
    pub exclude_diffuse: bool,
}

impl VarianceThresholds {
    fn default_collapsed() -> f64 {
        1.0e-10
    }
    fn default_diffuse() -> f64 {
        5.0e-5
    }

    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if !(self.collapsed_variance >= 0.0) {
            return Err(format!(
                "collapsed variance threshold must not be negative, not {}",
                self.collapsed_variance
            ));
        }
        if !(self.diffuse_variance > self.collapsed_variance) {
            return Err(format!(
                "diffuse variance threshold {} must exceed the collapse threshold {}",
                self.diffuse_variance, self.collapsed_variance
            ));
        }
        Ok(())
    }
}

impl Default for VarianceThresholds {
    fn default() -> Self {
        Self {
            collapsed_variance: Self::default_collapsed(),
            diffuse_variance: Self::default_diffuse(),
            exclude_diffuse: false,
        }
    }
}

/// The run configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Schema version; must equal [`SCHEMA_VERSION`]
    pub version: u32,
    /// Temperature in kelvin
    pub temperature: f64,
    /// Number of ring-polymer beads
    #[serde(default = "RunConfig::default_beads")]
    pub beads: usize,
    /// Units of the configured force constants
    #[serde(default)]
    pub force_constant_convention: ForceConstantConvention,
    /// Directory holding the statistics files, relative to the source directory
    #[serde(default)]
    pub statistics_dir: Option<PathBuf>,
    #[serde(default)]
    #[allow(missing_docs)]
    pub evolution: EvolutionConfig,
    #[serde(default)]
    #[allow(missing_docs)]
    pub thresholds: VarianceThresholds,
    /// Windows in configuration order
    pub windows: Vec<Window>,
}

impl RunConfig {
    fn default_beads() -> usize {
        1
    }

    /// Parse and validate a configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read `umbrella.toml` from a source directory
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        Self::from_file(dir.as_ref().join(CONFIG_FILE_NAME))
    }

    /// Read and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| UmbrellaError::io(path, e))?;
        Self::from_toml(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.version != SCHEMA_VERSION {
            return Err(UmbrellaError::Config(format!(
                "schema version {} is not supported (expected {})",
                self.version, SCHEMA_VERSION
            )));
        }
        if !(self.temperature > 0.0) {
            return Err(UmbrellaError::Config(format!(
                "temperature must be positive, not {}",
                self.temperature
            )));
        }
        if self.beads == 0 {
            return Err(UmbrellaError::Config("beads must be at least 1".to_string()));
        }
        if self.evolution.bins < 2 {
            return Err(UmbrellaError::Config(format!(
                "bins must be at least 2, not {}",
                self.evolution.bins
            )));
        }
        self.thresholds.check().map_err(UmbrellaError::Config)?;
        for (i, window) in self.windows.iter().enumerate() {
            if !window.coordinate.is_finite() {
                return Err(UmbrellaError::Config(format!(
                    "window {} has a non-finite coordinate",
                    i
                )));
            }
            if !(window.force_constant.is_finite() && window.force_constant > 0.0) {
                return Err(UmbrellaError::Config(format!(
                    "window {} (xi = {:.4}) needs a positive force constant, not {}",
                    i, window.coordinate, window.force_constant
                )));
            }
        }
        WindowRegistry::check_span(&self.windows)
    }

    /// Resolve the statistics directory below a source directory
    ///
    /// Defaults to `<source>/<temperature>/<beads>`, the layout the sampling campaign writes.
    pub fn statistics_path(&self, source: impl AsRef<Path>) -> PathBuf {
        match &self.statistics_dir {
            Some(dir) => source.as_ref().join(dir),
            None => source
                .as_ref()
                .join(format!("{}", self.temperature.round() as i64))
                .join(self.beads.to_string()),
        }
    }

    /// Human-readable label of the run, e.g. `300 K, 4 beads`
    pub fn label(&self) -> String {
        let temperature = self.temperature.round() as i64;
        if self.beads == 1 {
            format!("{} K, 1 bead", temperature)
        } else {
            format!("{} K, {} beads", temperature, self.beads)
        }
    }

    /// The window registry with force constants in the absolute convention
    pub fn registry(&self) -> WindowRegistry {
        let scale = match self.force_constant_convention {
            ForceConstantConvention::Absolute => 1.0,
            ForceConstantConvention::PerKelvin => self.temperature,
        };
        WindowRegistry {
            windows: self
                .windows
                .iter()
                .map(|w| Window {
                    coordinate: w.coordinate,
                    force_constant: w.force_constant * scale,
                })
                .collect(),
            temperature: self.temperature,
        }
    }
}

/// Ordered windows plus the temperature they were sampled at
///
/// Force constants held here are the effective restraint strengths used by the integration,
/// whatever convention the configuration file used.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRegistry {
    windows: Vec<Window>,
    temperature: f64,
}

impl WindowRegistry {
    /// Build a registry directly from absolute-convention windows
    pub fn new(windows: Vec<Window>, temperature: f64) -> Result<Self> {
        if !(temperature > 0.0) {
            return Err(UmbrellaError::Config(format!(
                "temperature must be positive, not {}",
                temperature
            )));
        }
        Self::check_span(&windows)?;
        Ok(Self {
            windows,
            temperature,
        })
    }

    fn check_span(windows: &[Window]) -> Result<()> {
        if windows.len() < 2 {
            return Err(UmbrellaError::Config(format!(
                "at least two windows are needed, not {}",
                windows.len()
            )));
        }
        let (min, max) = coordinate_span(windows);
        if !(max > min) {
            return Err(UmbrellaError::Config(
                "window coordinates must not all be equal".to_string(),
            ));
        }
        Ok(())
    }

    /// Windows in configuration order
    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Number of windows
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Always false for a validated registry
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Temperature in kelvin
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Smallest and largest window coordinate
    pub fn span(&self) -> (f64, f64) {
        coordinate_span(&self.windows)
    }
}

fn coordinate_span(windows: &[Window]) -> (f64, f64) {
    windows.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(min, max), w| (min.min(w.coordinate), max.max(w.coordinate)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        version = 1
        temperature = 300.0
        beads = 4
        force_constant_convention = "per-kelvin"

        [evolution]
        bins = 100

        [[windows]]
        coordinate = -0.05
        force_constant = 0.01

        [[windows]]
        coordinate = 0.0
        force_constant = 0.02

        [[windows]]
        coordinate = 0.05
        force_constant = 0.01
    "#;

    #[test]
    fn parse_config() {
        let config = RunConfig::from_toml(CONFIG).unwrap();

        assert_eq!(config.temperature, 300.0);
        assert_eq!(config.beads, 4);
        assert_eq!(config.evolution.bins, 100);
        assert_eq!(config.evolution.parallel, true);
        assert_eq!(config.thresholds, VarianceThresholds::default());
        assert_eq!(config.windows.len(), 3);
        assert_eq!(config.label(), "300 K, 4 beads");
        assert_eq!(
            config.statistics_path("/runs/ohch4"),
            PathBuf::from("/runs/ohch4/300/4")
        );
    }

    #[test]
    fn per_kelvin_force_constants_are_scaled_once() {
        let registry = RunConfig::from_toml(CONFIG).unwrap().registry();

        let k: Vec<f64> = registry.windows().iter().map(|w| w.force_constant).collect();
        assert_eq!(k, vec![0.01 * 300.0, 0.02 * 300.0, 0.01 * 300.0]);
        assert_eq!(registry.span(), (-0.05, 0.05));
    }

    #[test]
    fn reject_unknown_version() {
        let text = CONFIG.replace("version = 1", "version = 2");
        assert!(matches!(
            RunConfig::from_toml(&text),
            Err(UmbrellaError::Config(_))
        ));
    }

    #[test]
    fn reject_bad_thresholds() {
        let negative = format!("{}\n[thresholds]\ncollapsed_variance = -1.0\n", CONFIG);
        assert!(matches!(
            RunConfig::from_toml(&negative),
            Err(UmbrellaError::Config(_))
        ));

        let inverted = format!(
            "{}\n[thresholds]\ncollapsed_variance = 1e-4\ndiffuse_variance = 1e-5\n",
            CONFIG
        );
        assert!(matches!(
            RunConfig::from_toml(&inverted),
            Err(UmbrellaError::Config(_))
        ));
    }

    #[test]
    fn reject_single_window() {
        let result = WindowRegistry::new(
            vec![Window {
                coordinate: 0.0,
                force_constant: 1.0,
            }],
            300.0,
        );
        assert!(matches!(result, Err(UmbrellaError::Config(_))));
    }

    #[test]
    fn statistics_file_name_uses_four_decimals() {
        let window = Window {
            coordinate: -0.05,
            force_constant: 1.0,
        };
        assert_eq!(window.statistics_file_name(), "umbrella_sampling_-0.0500.dat");
    }
}
