//! Recoverable conditions met while loading statistics and integrating them.
//!
//! None of these stop a run. They are collected while cycles are processed and reported once the
//! run is finished.

use std::fmt;
use std::path::PathBuf;

/// Why a window's variance makes its density suspect
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Degeneracy {
    /// The variance is zero, negative or below the collapse threshold; the window is excluded
    Collapsed,
    /// The variance is above the diffuse threshold; the window may be poorly restrained
    Diffuse,
}

/// A recoverable condition
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A data row in a statistics file did not hold exactly five numeric fields
    MalformedRow {
        /// Statistics file
        path: PathBuf,
        /// Zero-based line number in the file
        line: usize,
        /// Cycle the row would have filled
        cycle: usize,
    },
    /// A window's variance at some cycle is degenerate
    DegenerateWindow {
        /// Cycle index
        cycle: usize,
        /// Window index
        window: usize,
        /// Target coordinate of the window
        coordinate: f64,
        /// The offending variance
        variance: f64,
        /// Which kind of degeneracy
        kind: Degeneracy,
        /// Whether the window was left out of the density and force sums
        excluded: bool,
    },
    /// No window had any density at a grid point, so the mean force there is undefined
    NumericalGap {
        /// Cycle index
        cycle: usize,
        /// Grid point index
        point: usize,
        /// Coordinate of the grid point
        coordinate: f64,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MalformedRow { path, line, cycle } => write!(
                f,
                "{} line {} (cycle {}) is not five numeric fields",
                path.display(),
                line + 1,
                cycle
            ),
            Diagnostic::DegenerateWindow {
                cycle,
                coordinate,
                variance,
                kind: Degeneracy::Collapsed,
                ..
            } => write!(
                f,
                "variance at xi = {:.4} is zero ({:e}) at cycle {}; window excluded",
                coordinate, variance, cycle
            ),
            Diagnostic::DegenerateWindow {
                cycle,
                coordinate,
                variance,
                kind: Degeneracy::Diffuse,
                excluded,
                ..
            } => write!(
                f,
                "xi = {:.4} may be too various ({:e}) at cycle {}{}",
                coordinate,
                variance,
                cycle,
                if *excluded { "; window excluded" } else { "" }
            ),
            Diagnostic::NumericalGap {
                cycle,
                point,
                coordinate,
            } => write!(
                f,
                "no window has density at grid point {} (xi = {:.4}) at cycle {}",
                point, coordinate, cycle
            ),
        }
    }
}

/// The recoverable conditions collected during a run, in the order they were met
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// An empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a condition
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Append every condition of another report, keeping their order
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// All recorded conditions
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of recorded conditions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Degenerate-window conditions only
    pub fn degenerate_windows(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::DegenerateWindow { .. }))
    }

    /// Numerical-gap conditions only
    pub fn gaps(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::NumericalGap { .. }))
    }

    /// Emit every condition through the `log` facade
    pub fn log(&self) {
        for diagnostic in &self.entries {
            log::warn!("{}", diagnostic);
        }
    }
}
