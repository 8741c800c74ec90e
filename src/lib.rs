#![warn(rust_2018_idioms, missing_docs, missing_debug_implementations)]

//! Umbrella integration of umbrella sampling statistics into potentials of mean force, and the
//! evolution of those potentials over simulated time.
//!
//! Each umbrella window records running means and variances of the reaction coordinate once per
//! cycle. [`statistics`] aligns the windows' files into one tensor, [`integration`] turns the
//! statistics of one cycle into a mean force and an anchored potential of mean force, and
//! [`evolution`] repeats that for every cycle and extracts the barrier over time.
//!
//! ```no_run
//! use umbrella_rs::*;
//!
//! # fn main() -> umbrella_rs::errors::Result<()> {
//! let config = RunConfig::from_dir("runs/ohch4")?;
//! let loaded = StatisticsTensor::load(config.statistics_path("runs/ohch4"), &config.registry())?;
//! let result = Evolution::from_config(&config)?.run(&loaded.tensor)?;
//! result.write_outputs("runs/ohch4")?;
//! # Ok(())
//! # }
//! ```
//!
//! Please reference the following if you use this code in your research:
//!
//! [1] Kästner J and Thiel W. Bridging the gap between thermodynamic integration and umbrella
//! sampling provides a novel analysis method: "Umbrella integration". J. Chem. Phys. 123:144104,
//! 2005. <http://dx.doi.org/10.1063/1.2052648>

#[macro_use]
extern crate derive_builder;

pub mod config;
pub mod density;
pub mod diagnostics;
pub mod errors;
pub mod evolution;
pub mod integration;
pub mod overlap;
pub mod statistics;
pub mod testsystems;

pub use config::{RunConfig, Window, WindowRegistry};
pub use diagnostics::{Diagnostic, Diagnostics};
pub use evolution::{Evolution, EvolutionResult, FreeEnergyTrace, TracePoint};
pub use integration::{MeanForce, PmfCurve, UmbrellaIntegration};
pub use statistics::{StatisticsFile, StatisticsTensor};
