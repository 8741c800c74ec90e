use approx::assert_relative_eq;
use std::fs;
use umbrella_rs::errors::UmbrellaError;
use umbrella_rs::evolution::{read_pmf_table_file, PMF_TABLE_FILE_NAME, TRACE_FILE_NAME};
use umbrella_rs::testsystems::TiltedWindows;
use umbrella_rs::*;

fn run(source: &std::path::Path) -> anyhow::Result<EvolutionResult> {
    let config = RunConfig::from_dir(source)?;
    let loaded = StatisticsTensor::load(config.statistics_path(source), &config.registry())?;
    assert!(loaded.diagnostics.is_empty());
    Ok(Evolution::from_config(&config)?.run(&loaded.tensor)?)
}

#[test]
fn source_directory_to_output_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let testcase = TiltedWindows::builder().cycles(6).build()?;
    testcase.write_run(dir.path())?;
    assert!(dir.path().join("300").join("1").is_dir());

    let result = run(dir.path())?;
    let (table, trace) = result.write_outputs(dir.path())?;
    assert_eq!(table, dir.path().join(PMF_TABLE_FILE_NAME));
    assert_eq!(trace, dir.path().join(TRACE_FILE_NAME));

    let rows = read_pmf_table_file(&table)?;
    assert_eq!(rows.len(), 6 * 499);
    let trace_text = fs::read_to_string(&trace)?;
    assert_eq!(trace_text.lines().count(), 1 + 6);

    // Last cycle: straight line through the anchor with the surface's slope
    let last = result.curves().last().unwrap();
    let kcal_slope = testcase.slope() * 627.503;
    let n = last.len();
    let fitted = (last.free_energy[n - 1] - last.free_energy[0])
        / (last.coordinate[n - 1] - last.coordinate[0]);
    assert_relative_eq!(fitted, kcal_slope, max_relative = 1e-3);
    Ok(())
}

#[test]
fn rerunning_rewrites_identical_outputs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    TiltedWindows::builder().cycles(4).build()?.write_run(dir.path())?;

    let (table, trace) = run(dir.path())?.write_outputs(dir.path())?;
    let first = (fs::read(&table)?, fs::read(&trace)?);
    run(dir.path())?.write_outputs(dir.path())?;
    let second = (fs::read(&table)?, fs::read(&trace)?);

    assert_eq!(first, second);
    Ok(())
}

#[test]
fn no_common_cycles_writes_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    TiltedWindows::builder().cycles(0).build()?.write_run(dir.path())?;

    assert!(matches!(
        run(dir.path()).map_err(|e| e.downcast::<UmbrellaError>()),
        Err(Ok(UmbrellaError::EmptyRange))
    ));
    assert!(!dir.path().join(PMF_TABLE_FILE_NAME).exists());
    assert!(!dir.path().join(TRACE_FILE_NAME).exists());
    Ok(())
}

#[test]
fn missing_statistics_file_names_the_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let testcase = TiltedWindows::default();
    testcase.write_run(dir.path())?;
    let config = RunConfig::from_dir(dir.path())?;
    let missing = config
        .statistics_path(dir.path())
        .join(config.windows[3].statistics_file_name());
    fs::remove_file(&missing)?;

    match StatisticsTensor::load(config.statistics_path(dir.path()), &config.registry()) {
        Err(UmbrellaError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected an I/O error, got {:?}", other),
    }
    Ok(())
}
