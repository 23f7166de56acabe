use anyhow::{anyhow, Result};
use rao_cli::Scenario;
use std::path::Path;
use tracing::{info, warn};

pub fn handle(scenario_path: &Path) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let stats = scenario.network.stats();
    info!(
        "network: {} buses, {} lines, {} switches, {} PSTs",
        stats.num_buses, stats.num_lines, stats.num_switches, stats.num_psts
    );

    let diag = scenario.crac.validate(Some(&scenario.network));
    for issue in diag.warnings() {
        warn!("{issue}");
    }
    for issue in diag.errors() {
        println!("{issue}");
    }
    if diag.has_errors() {
        return Err(anyhow!(
            "scenario {} is inconsistent: {}",
            scenario_path.display(),
            diag.summary()
        ));
    }

    println!(
        "Scenario {} is valid ({}): {} contingencies, {} Cnecs, {} network actions, {} range actions",
        scenario_path.display(),
        diag.summary(),
        scenario.crac.contingencies.len(),
        scenario.crac.cnecs.len(),
        scenario.crac.network_actions.len(),
        scenario.crac.range_actions.len()
    );
    Ok(())
}
