// SPDX-License-Identifier: AGPL-3.0-only

//! Run the tiled MAC test on the software cluster
//!
//! Loads the 20-element reference vectors, multiplies them in tiles of 4 on
//! the simulated MAC and prints the stage timeline of the data mover and
//! the compute unit.

use snax_driver::prelude::*;
use snax_driver::scheduler::Stage;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("snax_driver=info")
        .init();

    let dataset = Dataset::snax_mac_reference();
    let report = SoftwareCluster::snax_default()
        .with_latency_polls(16)
        .run(&dataset, MacMultiply, &PipelineConfig::new(4))?;

    println!("iteration  load  compute  store");
    for i in 0..report.iterations {
        let tile_at = |role: Role, stage: Stage| {
            report
                .unit_with_role(role)
                .and_then(|u| u.stage_events(stage).find(|e| e.iteration == i))
                .map_or_else(|| "-".to_string(), |e| format!("t{}", e.tile))
        };
        println!(
            "{i:>9}  {:>4}  {:>7}  {:>5}",
            tile_at(Role::DataMover, Stage::Load),
            tile_at(Role::Compute, Stage::Compute),
            tile_at(Role::DataMover, Stage::Store),
        );
    }

    println!();
    println!("output      {:?}", report.output);
    println!(
        "mismatches  device={} host={} of {}",
        report.verification.device_mismatches,
        report.verification.host_mismatches,
        report.verification.checked
    );
    Ok(())
}
