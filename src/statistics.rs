//! Per-window trajectory statistics and their alignment into one tensor
//!
//! Every window writes a file `umbrella_sampling_{xi:.4}.dat` with a fixed 15-line header, one
//! row of running statistics per recorded cycle and an optional `#` trailing line. Windows that were stopped
//! at different times have different numbers of rows; [`StatisticsTensor`] keeps every row but
//! exposes the common range as [`StatisticsTensor::effective_cycles`].

use crate::config::WindowRegistry;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::errors::*;
use ndarray::{Array3, ArrayView1, Axis};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Number of lines before the first data row
pub const HEADER_LINES: usize = 15;

/// Header line carrying the step size
pub const STEP_SIZE_LINE: usize = 9;

/// Whitespace-separated token of [`STEP_SIZE_LINE`] holding the step size
pub const STEP_SIZE_TOKEN: usize = 4;

/// Number of columns in a data row
pub const CHANNELS: usize = 5;

/// Columns of a statistics row, in file order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Cumulative iteration count
    IterationCount,
    /// Raw iteration counter
    RawCounter,
    /// Elapsed-steps counter; also the number of samples behind the running moments
    StepCounter,
    /// Running mean of the reaction coordinate
    Mean,
    /// Running variance of the reaction coordinate
    Variance,
}

impl Channel {
    /// All channels in file order
    pub const ALL: [Channel; CHANNELS] = [
        Channel::IterationCount,
        Channel::RawCounter,
        Channel::StepCounter,
        Channel::Mean,
        Channel::Variance,
    ];

    /// Position of the channel on the tensor's first axis
    pub fn index(self) -> usize {
        match self {
            Channel::IterationCount => 0,
            Channel::RawCounter => 1,
            Channel::StepCounter => 2,
            Channel::Mean => 3,
            Channel::Variance => 4,
        }
    }
}

/// Statistics of one window at one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowCycleStatistic {
    /// Cycle index
    pub cycle: usize,
    /// Running mean of the reaction coordinate
    pub mean: f64,
    /// Running variance of the reaction coordinate
    pub variance: f64,
    /// Number of samples behind the mean and variance
    pub sample_count: f64,
}

/// The parsed contents of one statistics file
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsFile {
    /// Where the file was read from
    pub path: PathBuf,
    /// Step size from the header, in picoseconds
    pub step_size: f64,
    /// One entry per data row; `None` where the row was malformed
    pub rows: Vec<Option<[f64; CHANNELS]>>,
}

impl StatisticsFile {
    /// Open and parse a statistics file
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| UmbrellaError::io(path, e))?;
        Self::parse(BufReader::new(file), path)
    }

    /// Parse statistics from a reader; `path` is only used for error context
    pub fn parse<R: BufRead>(reader: R, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(line.map_err(|e| UmbrellaError::io(&path, e))?);
        }

        if lines.len() < HEADER_LINES {
            return Err(UmbrellaError::MalformedHeader {
                path,
                line: lines.len(),
                reason: format!(
                    "only {} lines, the header alone is {}",
                    lines.len(),
                    HEADER_LINES
                ),
            });
        }

        let step_size = lines[STEP_SIZE_LINE]
            .split_whitespace()
            .nth(STEP_SIZE_TOKEN)
            .and_then(|token| token.parse::<f64>().ok())
            .ok_or_else(|| UmbrellaError::MalformedHeader {
                path: path.clone(),
                line: STEP_SIZE_LINE,
                reason: format!(
                    "token {} of {:?} is not a step size",
                    STEP_SIZE_TOKEN + 1,
                    lines[STEP_SIZE_LINE]
                ),
            })?;

        let mut data = &lines[HEADER_LINES..];
        if let Some(last) = data.last() {
            if is_trailer(last) {
                data = &data[..data.len() - 1];
            }
        }

        let rows = data.iter().map(|line| parse_row(line)).collect();

        Ok(Self {
            path,
            step_size,
            rows,
        })
    }

    /// Number of data rows, well-formed or not
    pub fn cycles(&self) -> usize {
        self.rows.len()
    }

    /// Write the file in the layout [`StatisticsFile::parse`] reads
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for line in 0..HEADER_LINES {
            if line == STEP_SIZE_LINE {
                writeln!(writer, "#   Time step   = {} ps", self.step_size)?;
            } else {
                writeln!(writer, "#")?;
            }
        }
        for row in &self.rows {
            match row {
                Some(values) => {
                    let fields: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                    writeln!(writer, "{}", fields.join(" "))?;
                }
                None => writeln!(writer, "malformed")?,
            }
        }
        writeln!(writer, "# end of umbrella sampling")
    }
}

/// The last line of a file is a trailer if it is blank or a `#` comment
fn is_trailer(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}

fn parse_row(line: &str) -> Option<[f64; CHANNELS]> {
    let mut row = [0.0; CHANNELS];
    let mut tokens = line.split_whitespace();
    for cell in row.iter_mut() {
        *cell = tokens.next()?.parse().ok()?;
    }
    match tokens.next() {
        Some(_) => None,
        None => Some(row),
    }
}

/// Statistics of every window, aligned by cycle
///
/// `data[[channel, cycle, window]]` is `None` where a window has no row for that cycle. Every
/// cell with `cycle < effective_cycles` is populated.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsTensor {
    data: Array3<Option<f64>>,
    cycle_counts: Vec<usize>,
    effective_cycles: usize,
    max_cycles: usize,
    step_size: f64,
}

impl StatisticsTensor {
    /// Read the statistics file of every window in `registry` from `dir`
    pub fn load(dir: impl AsRef<Path>, registry: &WindowRegistry) -> Result<LoadedStatistics> {
        let dir = dir.as_ref();
        log::info!("Getting umbrella data from {}", dir.display());
        log::info!("number of windows: {}", registry.len());

        let files = registry
            .windows()
            .iter()
            .map(|window| StatisticsFile::read(dir.join(window.statistics_file_name())))
            .collect::<Result<Vec<_>>>()?;

        Self::from_files(files, registry)
    }

    /// Align already-parsed files, one per window of `registry` in registry order
    pub fn from_files(
        files: Vec<StatisticsFile>,
        registry: &WindowRegistry,
    ) -> Result<LoadedStatistics> {
        if files.len() != registry.len() {
            return Err(UmbrellaError::ArrayLengthMismatch(
                files.len(),
                registry.len(),
            ));
        }

        let step_size = files[0].step_size;
        if let Some(file) = files.iter().find(|f| f.step_size != step_size) {
            return Err(UmbrellaError::StepSizeMismatch {
                path: file.path.clone(),
                expected: step_size,
                found: file.step_size,
            });
        }

        let cycle_counts: Vec<usize> = files.iter().map(StatisticsFile::cycles).collect();
        let max_cycles = cycle_counts.iter().copied().max().unwrap_or(0);
        let effective_cycles = cycle_counts.iter().copied().min().unwrap_or(0);
        log::info!("Maximum of trajectories: {}", max_cycles);
        log::info!("Minimum of trajectories: {}", effective_cycles);
        log::info!("Step size: {} ps", step_size);

        let mut data = Array3::from_elem((CHANNELS, max_cycles, files.len()), None);
        let mut diagnostics = Diagnostics::new();

        for (window, file) in files.iter().enumerate() {
            for (cycle, row) in file.rows.iter().enumerate() {
                match row {
                    Some(values) => {
                        for (channel, value) in values.iter().enumerate() {
                            data[[channel, cycle, window]] = Some(*value);
                        }
                    }
                    None => {
                        let diagnostic = Diagnostic::MalformedRow {
                            path: file.path.clone(),
                            line: HEADER_LINES + cycle,
                            cycle,
                        };
                        log::warn!("{}", diagnostic);
                        diagnostics.push(diagnostic);
                    }
                }
            }

            let first_gap = (0..effective_cycles).find(|&cycle| file.rows[cycle].is_none());
            if let Some(cycle) = first_gap {
                return Err(UmbrellaError::IncompleteWindow {
                    window,
                    coordinate: registry.windows()[window].coordinate,
                    cycle,
                    effective_cycles,
                    path: file.path.clone(),
                });
            }
        }

        Ok(LoadedStatistics {
            tensor: Self {
                data,
                cycle_counts,
                effective_cycles,
                max_cycles,
                step_size,
            },
            diagnostics,
        })
    }

    /// Number of cycles every window has; the range all evolution work stays within
    pub fn effective_cycles(&self) -> usize {
        self.effective_cycles
    }

    /// Number of cycles of the longest window
    pub fn max_cycles(&self) -> usize {
        self.max_cycles
    }

    /// Number of rows each window's file provided
    pub fn cycle_counts(&self) -> &[usize] {
        &self.cycle_counts
    }

    /// Number of windows
    pub fn n_windows(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Step size shared by every window, in picoseconds
    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    /// The raw `[channel, cycle, window]` cells
    pub fn data(&self) -> &Array3<Option<f64>> {
        &self.data
    }

    /// One cell, `None` if out of range or unpopulated
    pub fn get(&self, channel: Channel, cycle: usize, window: usize) -> Option<f64> {
        self.data
            .get([channel.index(), cycle, window])
            .copied()
            .flatten()
    }

    /// Every window's value of one channel at one cycle
    pub fn channel(&self, channel: Channel, cycle: usize) -> ArrayView1<'_, Option<f64>> {
        self.data
            .index_axis(Axis(0), channel.index())
            .index_axis_move(Axis(0), cycle)
    }

    /// Mean, variance and sample count of a window at a cycle
    pub fn statistic(&self, cycle: usize, window: usize) -> Option<WindowCycleStatistic> {
        Some(WindowCycleStatistic {
            cycle,
            mean: self.get(Channel::Mean, cycle, window)?,
            variance: self.get(Channel::Variance, cycle, window)?,
            sample_count: self.get(Channel::StepCounter, cycle, window)?,
        })
    }

    /// Simulated time of a cycle in nanoseconds, taken from the first window's step counter
    pub fn time(&self, cycle: usize) -> Option<f64> {
        Some(self.get(Channel::StepCounter, cycle, 0)? * self.step_size * 1.0e-3)
    }
}

/// A loaded tensor plus the malformed rows met while reading it
#[derive(Debug, Clone)]
pub struct LoadedStatistics {
    #[allow(missing_docs)]
    pub tensor: StatisticsTensor,
    /// Malformed rows outside the effective cycle range
    pub diagnostics: Diagnostics,
}
