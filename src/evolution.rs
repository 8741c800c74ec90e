//! Potentials of mean force over the whole cycle range, and the barrier trace they give

use crate::config::RunConfig;
use crate::diagnostics::Diagnostics;
use crate::errors::*;
use crate::integration::{IntegratedCycle, PmfCurve, UmbrellaIntegration};
use crate::statistics::StatisticsTensor;
use ndarray::Array2;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the combined PMF table
pub const PMF_TABLE_FILE_NAME: &str = "PMF_data.txt";

/// File name of the free energy trace
pub const TRACE_FILE_NAME: &str = "PMF_free_energy.txt";

/// The highest point of the PMF at one cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracePoint {
    /// Simulated time in nanoseconds
    pub time: f64,
    /// Coordinate of the maximum
    pub coordinate_of_maximum: f64,
    /// Free energy at the maximum in kcal/mol
    pub maximum_free_energy: f64,
}

/// Barrier location and height over time, one point per cycle in cycle order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FreeEnergyTrace {
    points: Vec<TracePoint>,
}

impl FreeEnergyTrace {
    fn push(&mut self, point: TracePoint) {
        self.points.push(point);
    }

    /// Every point in cycle order
    pub fn points(&self) -> &[TracePoint] {
        &self.points
    }

    /// Number of cycles traced
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if no cycle was traced
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Write `time, coordinate, free energy` rows, tab-separated, after a `#` header
    pub fn write<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "# time(ns)\tcoordinate\tfreeEnergy(kcal/mol)")?;
        for point in &self.points {
            writeln!(
                writer,
                "{}\t{}\t{}",
                point.time, point.coordinate_of_maximum, point.maximum_free_energy
            )?;
        }
        Ok(())
    }
}

/// One row of the combined PMF table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PmfTableRow {
    /// Simulated time in nanoseconds
    pub time: f64,
    /// Bin center
    pub coordinate: f64,
    /// Free energy in kcal/mol
    pub free_energy: f64,
}

/// Read a combined PMF table back; blank lines and `#` comments are skipped
pub fn read_pmf_table<R: BufRead>(reader: R) -> Result<Vec<PmfTableRow>> {
    let mut rows = Vec::new();
    for (line, content) in reader.lines().enumerate() {
        let content = content?;
        let trimmed = content.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<f64> = trimmed
            .split('\t')
            .map(|field| field.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| UmbrellaError::MalformedTableRow {
                line: line + 1,
                content: content.clone(),
            })?;
        match fields.as_slice() {
            [time, coordinate, free_energy] => rows.push(PmfTableRow {
                time: *time,
                coordinate: *coordinate,
                free_energy: *free_energy,
            }),
            _ => {
                return Err(UmbrellaError::MalformedTableRow {
                    line: line + 1,
                    content,
                })
            }
        }
    }
    Ok(rows)
}

/// Runs umbrella integration at every cycle common to all windows
#[derive(Debug, Clone)]
pub struct Evolution {
    engine: UmbrellaIntegration,
    parallel: bool,
}

impl Evolution {
    /// Drive `engine` over the cycles, in parallel by default
    pub fn new(engine: UmbrellaIntegration) -> Self {
        Self {
            engine,
            parallel: true,
        }
    }

    /// Set up the engine and driver a run configuration describes
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        let engine = UmbrellaIntegration::builder()
            .registry(config.registry())
            .bins(config.evolution.bins)
            .thresholds(config.thresholds)
            .build()?;
        Ok(Self::new(engine).parallel(config.evolution.parallel))
    }

    /// Integrate cycles on the rayon thread pool or one after another
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The engine used for every cycle
    pub fn engine(&self) -> &UmbrellaIntegration {
        &self.engine
    }

    /// Compute the potential of mean force at every effective cycle, in cycle order
    ///
    /// Fails with [`UmbrellaError::EmptyRange`] when the windows share no cycle.
    pub fn run(&self, tensor: &StatisticsTensor) -> Result<EvolutionResult> {
        let total = tensor.effective_cycles();
        if total == 0 {
            return Err(UmbrellaError::EmptyRange);
        }
        log::info!("Computing PMF evolution over {} cycles", total);

        let integrated: Vec<IntegratedCycle> = if self.parallel {
            (0..total)
                .into_par_iter()
                .map(|cycle| self.engine.cycle(tensor, cycle))
                .collect::<Result<_>>()?
        } else {
            (0..total)
                .map(|cycle| self.engine.cycle(tensor, cycle))
                .collect::<Result<_>>()?
        };

        let mut result = EvolutionResult {
            curves: Vec::with_capacity(total),
            trace: FreeEnergyTrace::default(),
            diagnostics: Diagnostics::new(),
        };
        for cycle in integrated {
            log::debug!(
                "PMF evolution {} of {} at {:.4} ns",
                cycle.pmf.cycle + 1,
                total,
                cycle.pmf.time
            );
            let (coordinate_of_maximum, maximum_free_energy) = cycle.pmf.maximum();
            result.trace.push(TracePoint {
                time: cycle.pmf.time,
                coordinate_of_maximum,
                maximum_free_energy,
            });
            result.diagnostics.extend(cycle.diagnostics);
            result.curves.push(cycle.pmf);
        }

        Ok(result)
    }
}

/// The curves, trace and diagnostics of a finished evolution run
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionResult {
    curves: Vec<PmfCurve>,
    trace: FreeEnergyTrace,
    diagnostics: Diagnostics,
}

impl EvolutionResult {
    /// One curve per cycle, in cycle order
    pub fn curves(&self) -> &[PmfCurve] {
        &self.curves
    }

    /// The barrier trace
    pub fn trace(&self) -> &FreeEnergyTrace {
        &self.trace
    }

    /// Every recoverable condition met, in cycle order
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// About ten evenly spaced curves: the first, every `len / 10`-th and the last
    pub fn snapshots(&self) -> Vec<&PmfCurve> {
        let total = self.curves.len();
        let stride = (total / 10).max(1);
        self.curves
            .iter()
            .enumerate()
            .filter(|(cycle, _)| (cycle + 1) % stride == 0 || *cycle == 0 || *cycle + 1 == total)
            .map(|(_, curve)| curve)
            .collect()
    }

    /// Free energies stacked as `[cycle, bin]`
    pub fn surface(&self) -> Array2<f64> {
        let bins = self.curves.first().map_or(0, PmfCurve::len);
        let mut surface = Array2::zeros((self.curves.len(), bins));
        for (mut row, curve) in surface.outer_iter_mut().zip(&self.curves) {
            row.assign(&curve.free_energy);
        }
        surface
    }

    /// Write one tab-separated `time, coordinate, free energy` row per cycle and bin
    pub fn write_pmf_table<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for curve in &self.curves {
            for (coordinate, free_energy) in curve.coordinate.iter().zip(curve.free_energy.iter()) {
                writeln!(writer, "{}\t{}\t{}", curve.time, coordinate, free_energy)?;
            }
        }
        Ok(())
    }

    /// Write the PMF table and the trace into `dir`, returning their paths
    pub fn write_outputs(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        let table = dir.join(PMF_TABLE_FILE_NAME);
        let trace = dir.join(TRACE_FILE_NAME);

        let mut out = BufWriter::new(File::create(&table).map_err(|e| UmbrellaError::io(&table, e))?);
        self.write_pmf_table(&mut out).and_then(|_| out.flush())?;

        let mut out = BufWriter::new(File::create(&trace).map_err(|e| UmbrellaError::io(&trace, e))?);
        self.trace.write(&mut out).and_then(|_| out.flush())?;

        Ok((table, trace))
    }
}

/// Read a combined PMF table from a file
pub fn read_pmf_table_file(path: impl AsRef<Path>) -> Result<Vec<PmfTableRow>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| UmbrellaError::io(path, e))?;
    read_pmf_table(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::StatisticsFile;
    use crate::testsystems::TiltedWindows;
    use approx::assert_abs_diff_eq;
    use itertools::Itertools;
    use std::io::Cursor;

    fn evolution(system: &TiltedWindows, bins: usize) -> Evolution {
        let engine = UmbrellaIntegration::builder()
            .registry(system.registry().unwrap())
            .bins(bins)
            .build()
            .unwrap();
        Evolution::new(engine)
    }

    #[test]
    fn one_curve_and_trace_point_per_cycle() {
        let system = TiltedWindows::builder().drift(0.002).cycles(12).build().unwrap();
        let tensor = system.statistics().unwrap().tensor;
        let result = evolution(&system, 50).run(&tensor).unwrap();

        assert_eq!(result.curves().len(), 12);
        assert_eq!(result.trace().len(), 12);
        for (cycle, curve) in result.curves().iter().enumerate() {
            assert_eq!(curve.cycle, cycle);
            assert_eq!(curve.coordinate.len(), 49);
            assert_eq!(curve.free_energy.len(), 49);
            assert!(curve
                .coordinate
                .iter()
                .tuple_windows()
                .all(|(a, b)| a <= b));
            assert_eq!(curve.free_energy[50 / 2 - 1], 0.0);
        }

        assert!(result
            .trace()
            .points()
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.time < b.time));
        let last = result.curves().last().unwrap();
        let point = result.trace().points().last().unwrap();
        assert_eq!(
            (point.coordinate_of_maximum, point.maximum_free_energy),
            last.maximum()
        );
    }

    #[test]
    fn parallel_and_serial_runs_agree() {
        let system = TiltedWindows::builder().drift(0.002).cycles(8).build().unwrap();
        let tensor = system.statistics().unwrap().tensor;

        let parallel = evolution(&system, 100).run(&tensor).unwrap();
        let again = evolution(&system, 100).run(&tensor).unwrap();
        let serial = evolution(&system, 100).parallel(false).run(&tensor).unwrap();

        assert_eq!(parallel, again);
        assert_eq!(parallel, serial);
    }

    #[test]
    fn empty_range_is_an_error() {
        let system = TiltedWindows::builder().cycles(0).build().unwrap();
        let tensor = system.statistics().unwrap().tensor;

        assert!(matches!(
            evolution(&system, 10).run(&tensor),
            Err(UmbrellaError::EmptyRange)
        ));
    }

    #[test]
    fn only_effective_cycles_are_integrated() {
        let system = TiltedWindows::builder().cycles(6).build().unwrap();
        let mut files: Vec<StatisticsFile> = system.files();
        files[3].rows.truncate(4);
        files[7].rows.truncate(5);
        let tensor = StatisticsTensor::from_files(files, &system.registry().unwrap())
            .unwrap()
            .tensor;
        assert_eq!(tensor.max_cycles(), 6);
        assert_eq!(tensor.effective_cycles(), 4);

        let result = evolution(&system, 20).run(&tensor).unwrap();
        assert_eq!(result.curves().len(), 4);
        assert_eq!(result.trace().len(), 4);
    }

    #[test]
    fn pmf_table_reads_back() {
        let system = TiltedWindows::builder().drift(0.002).cycles(3).build().unwrap();
        let tensor = system.statistics().unwrap().tensor;
        let result = evolution(&system, 30).run(&tensor).unwrap();

        let mut buffer = Vec::new();
        result.write_pmf_table(&mut buffer).unwrap();
        let rows = read_pmf_table(Cursor::new(buffer)).unwrap();

        assert_eq!(rows.len(), 3 * 29);
        let expected = result.curves().iter().flat_map(|curve| {
            curve
                .coordinate
                .iter()
                .zip(curve.free_energy.iter())
                .map(move |(&x, &a)| (curve.time, x, a))
        });
        for (row, (time, x, a)) in rows.iter().zip(expected) {
            assert_abs_diff_eq!(row.time, time, epsilon = 1e-12);
            assert_abs_diff_eq!(row.coordinate, x, epsilon = 1e-12);
            assert_abs_diff_eq!(row.free_energy, a, epsilon = 1e-12);
        }
    }

    #[test]
    fn malformed_table_row() {
        let result = read_pmf_table(Cursor::new("0.1\t0.2\t0.3\n0.1\tnope\t0.3\n"));
        assert!(matches!(
            result,
            Err(UmbrellaError::MalformedTableRow { line: 2, .. })
        ));
        let result = read_pmf_table(Cursor::new("0.1\t0.2\n"));
        assert!(matches!(
            result,
            Err(UmbrellaError::MalformedTableRow { line: 1, .. })
        ));
    }

    #[test]
    fn snapshots_and_surface() {
        let system = TiltedWindows::builder().cycles(25).build().unwrap();
        let tensor = system.statistics().unwrap().tensor;
        let result = evolution(&system, 10).run(&tensor).unwrap();

        let cycles: Vec<usize> = result.snapshots().iter().map(|c| c.cycle).collect();
        assert_eq!(
            cycles,
            vec![0, 1, 3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23, 24]
        );

        let surface = result.surface();
        assert_eq!(surface.shape(), &[25, 9]);
        assert_eq!(surface.row(7).to_vec(), result.curves()[7].free_energy.to_vec());
    }

    #[test]
    fn trace_has_header_and_one_row_per_cycle() {
        let system = TiltedWindows::builder().cycles(4).build().unwrap();
        let tensor = system.statistics().unwrap().tensor;
        let result = evolution(&system, 10).run(&tensor).unwrap();

        let mut buffer = Vec::new();
        result.trace().write(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with('#'));
        assert_eq!(lines[1].split('\t').count(), 3);
    }
}
