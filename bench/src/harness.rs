//! One full benchmark run: connect, compare, inspect, extrapolate.

use crate::compare::ComparisonEngine;
use crate::error::BenchError;
use crate::executor::execute_sampled;
use crate::extrapolate::extrapolate;
use crate::plan::explain;
use crate::report::Report;
use crate::scenario::{dataset_size_sql, standard_scenarios};
use crate::store::Store;
use audience_core::config::{BenchSettings, SchemaNames};

/// Run every standard scenario against `store` and collect the report.
///
/// Only connection and schema-name problems abort the run. Query and plan
/// failures end up in the report next to the numbers they affect.
pub async fn run(
    store: &dyn Store,
    settings: &BenchSettings,
    names: &SchemaNames,
) -> Result<Report, BenchError> {
    let scenarios = standard_scenarios(names).map_err(BenchError::Schema)?;
    let size_sql = dataset_size_sql(names).map_err(BenchError::Schema)?;

    store.ping().await.map_err(BenchError::Connection)?;
    log::info!("Connected to {}", store.name());
    let mut session = store.session().await.map_err(BenchError::Connection)?;

    let size = execute_sampled(&mut *session, &size_sql, settings.query_timeout, 1).await;
    let dataset_size = size.outcome.map_err(BenchError::DatasetSize);
    match &dataset_size {
        Ok(n) => log::info!("Test dataset: {n} users"),
        Err(err) => log::error!("{err}"),
    }

    let comparisons = {
        let mut engine =
            ComparisonEngine::new(&mut *session, settings.query_timeout, settings.samples);
        engine.run_all(&scenarios).await
    };

    let plan = match scenarios.first() {
        Some(first) => {
            let plan = explain(
                &mut *session,
                store.dialect(),
                &first.optimized_sql,
                settings.query_timeout,
            )
            .await
            .map_err(BenchError::Plan);
            if let Err(err) = &plan {
                log::warn!("{err}");
            }
            Some((first.name, plan))
        }
        None => None,
    };

    let extrapolation = match (&dataset_size, comparisons.first()) {
        (Err(_), _) => Err("dataset size unknown".to_string()),
        (Ok(_), None) => Err("no scenario was measured".to_string()),
        (Ok(n), Some(first)) => match &first.optimized.outcome {
            Ok(_) => extrapolate(
                first.optimized.elapsed,
                *n,
                settings.target_users,
                settings.latency_budget,
            )
            .map_err(|err| err.to_string()),
            Err(_) => Err(format!("{} optimized query failed", first.scenario)),
        },
    };
    if let Ok(e) = &extrapolation {
        log::info!(
            "Estimated {:?} at {} users ({})",
            e.projected,
            e.target_n,
            if e.passed { "within budget" } else { "over budget" }
        );
    }

    Ok(Report {
        backend: store.name(),
        dataset_size,
        comparisons,
        plan,
        extrapolation,
        budget: settings.latency_budget,
        samples: settings.samples,
    })
}
