use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use umbrella_rs::*;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Folder holding umbrella.toml and the umbrella sampling results
    #[arg(value_name = "SOURCE_DIR")]
    source: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = RunConfig::from_dir(&args.source)
        .with_context(|| format!("reading the run configuration in {}", args.source.display()))?;
    log::info!("Run: {}", config.label());

    let loaded = StatisticsTensor::load(config.statistics_path(&args.source), &config.registry())?;
    let result = Evolution::from_config(&config)?.run(&loaded.tensor)?;

    loaded.diagnostics.log();
    result.diagnostics().log();

    let (table, trace) = result.write_outputs(&args.source)?;
    log::info!("Wrote {} and {}", table.display(), trace.display());

    if let Some(point) = result.trace().points().last() {
        println!(
            "{:.4} ns: barrier of {:.4} kcal/mol at xi = {:.4}",
            point.time, point.maximum_free_energy, point.coordinate_of_maximum
        );
    }

    Ok(())
}
