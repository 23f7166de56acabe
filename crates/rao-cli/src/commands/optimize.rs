use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use rao_algo::{run_rao, IteratingLinearOptimizer, LinearSensitivityProvider, RaoOutcome};
use rao_cli::{ParamsFile, Scenario};
use tracing::info;

use crate::commands::util::{configure_threads, parse_threads, write_text};

pub fn handle(
    scenario_path: &Path,
    params_path: Option<&Path>,
    out: Option<&Path>,
    threads: Option<&str>,
) -> Result<()> {
    let start = Instant::now();
    let scenario = Scenario::load(scenario_path)?;
    let mut params = match params_path {
        Some(path) => ParamsFile::load(path)?.rao,
        None => Default::default(),
    };
    if let Some(spec) = threads {
        let count = parse_threads(spec)?;
        configure_threads(count);
        params.multithreading.use_available_cpus(count);
    }

    let provider = LinearSensitivityProvider::new(
        scenario.sensitivity,
        &scenario.network,
        &scenario.crac.contingencies,
    )
    .context("building sensitivity model")?;
    let optimizer = IteratingLinearOptimizer::new(params.range_actions.clone());

    info!(
        "optimizing {} ({} Cnecs, {} network actions, {} range actions)",
        scenario.crac.id,
        scenario.crac.cnecs.len(),
        scenario.crac.network_actions.len(),
        scenario.crac.range_actions.len()
    );
    let outcome = run_rao(
        &scenario.crac,
        &scenario.network,
        &params,
        &provider,
        &optimizer,
    )
    .with_context(|| format!("optimizing scenario {}", scenario_path.display()))?;
    info!("optimization finished in {:.2?}", start.elapsed());

    let json = serde_json::to_string_pretty(&outcome).context("serializing outcome to JSON")?;
    match out {
        Some(path) => {
            write_text(path, &json)
                .with_context(|| format!("writing outcome {}", path.display()))?;
            print_summary(&outcome);
            println!("Wrote outcome to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_summary(outcome: &RaoOutcome) {
    let cost = |c: Option<f64>| c.map_or_else(|| "n/a".to_string(), |c| format!("{c:.2}"));
    println!("Status       : {:?}", outcome.status);
    println!("Initial cost : {}", cost(outcome.initial_cost));
    println!("Final cost   : {}", cost(outcome.final_cost));
    if outcome.fell_back_to_initial_situation {
        println!("Fell back to the initial situation");
    }
    for perimeter in &outcome.perimeters {
        let actions = if perimeter.network_actions.is_empty() {
            "-".to_string()
        } else {
            perimeter.network_actions.join(", ")
        };
        println!(
            "  {} [{:?}] cost {} actions: {}",
            perimeter.state,
            perimeter.kind,
            cost(perimeter.cost),
            actions
        );
    }
    if let Some(message) = &outcome.message {
        println!("{message}");
    }
}
