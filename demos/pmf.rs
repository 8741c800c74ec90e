use anyhow::Result;
use itertools::Itertools;
use umbrella_rs::overlap::Overlap;
use umbrella_rs::testsystems::*;
use umbrella_rs::*;

/// Integrate a tilted test case whose running means start displaced and converge, printing the
/// barrier trace and the slope of a few PMF snapshots as the mean force converges.
fn main() -> Result<()> {
    env_logger::init();

    let testcase = TiltedWindows::builder()
        .drift(0.005)
        .cycles(40)
        .build()?;
    let registry = testcase.registry()?;
    let loaded = testcase.statistics()?;

    let engine = UmbrellaIntegration::builder()
        .registry(registry.clone())
        .bins(200)
        .build()?;
    let result = Evolution::new(engine).run(&loaded.tensor)?;
    result.diagnostics().log();

    println!("Expected slope: {:.4} kcal/mol per unit", testcase.slope() * 627.503);
    println!("time(ns)\tcoordinate\tfreeEnergy(kcal/mol)");
    for point in result.trace().points() {
        println!(
            "{:.4}\t{:.4}\t{:.4}",
            point.time, point.coordinate_of_maximum, point.maximum_free_energy
        );
    }

    for curve in result.snapshots() {
        let (first, last) = (0, curve.len() - 1);
        let slope = (curve.free_energy[last] - curve.free_energy[first])
            / (curve.coordinate[last] - curve.coordinate[first]);
        println!(
            "cycle {:>3}: fitted slope {:.4}, gaps at [{}]",
            curve.cycle,
            slope,
            curve.undefined_bins.iter().join(", ")
        );
    }

    let populations = Overlap::new(&registry, &loaded.tensor).population_evolution()?;
    let (lowest, _) = populations
        .density
        .row(populations.time.len() - 1)
        .iter()
        .cloned()
        .minmax()
        .into_option()
        .unwrap_or((0.0, 0.0));
    println!("Lowest normalised population between windows: {:.4}", lowest);

    Ok(())
}
