//! Integration tests: run the harness end to end against the SQLite fixture.

use audience_bench::compare::ComparisonEngine;
use audience_bench::error::QueryError;
use audience_bench::executor::execute;
use audience_bench::fixture::{generate_users, FixtureParams, UserProfile};
use audience_bench::harness;
use audience_bench::plan::explain;
use audience_bench::scenario::standard_scenarios;
use audience_bench::store::sqlite::SqliteStore;
use audience_bench::store::Store;
use audience_core::config::{BenchSettings, SchemaNames};
use std::time::Duration;

fn setup(users: usize) -> (SqliteStore, Vec<UserProfile>) {
    let profiles = generate_users(&FixtureParams::with_users(users));
    let store = SqliteStore::with_fixture(&SchemaNames::default(), &profiles).expect("fixture");
    (store, profiles)
}

/// Expected counts computed directly from the generated users, in scenario
/// order.
fn expected_counts(users: &[UserProfile]) -> [u64; 3] {
    let count = |pred: &dyn Fn(&UserProfile) -> bool| users.iter().filter(|u| pred(u)).count() as u64;
    [
        count(&|u| u.country == "US"),
        count(&|u| u.country == "US" || u.tier == "gold" || u.tier == "platinum"),
        count(&|u| u.has_purchased && u.spend_cents > 10_000),
    ]
}

#[tokio::test]
async fn hundred_users_forty_in_us() {
    let (store, _) = setup(100);
    let scenarios = standard_scenarios(&SchemaNames::default()).unwrap();
    let single = &scenarios[0];
    let mut session = store.session().await.unwrap();

    let eav = execute(&mut *session, &single.baseline_sql, None).await;
    let optimized = execute(&mut *session, &single.optimized_sql, None).await;
    assert_eq!(eav.count(), Some(40));
    assert_eq!(optimized.count(), Some(40));
}

#[tokio::test]
async fn every_scenario_counts_the_same_users_on_both_schemas() {
    let (store, users) = setup(2_000);
    let scenarios = standard_scenarios(&SchemaNames::default()).unwrap();
    let mut session = store.session().await.unwrap();
    let mut engine = ComparisonEngine::new(&mut *session, None, 1);
    let results = engine.run_all(&scenarios).await;

    let expected = expected_counts(&users);
    assert_eq!(results.len(), 3);
    for (result, want) in results.iter().zip(expected) {
        assert_eq!(result.counts_agree(), Some(true), "{}", result.scenario);
        assert_eq!(result.optimized.count(), Some(want), "{}", result.scenario);
    }
}

#[tokio::test]
async fn speedup_matches_measured_durations() {
    let (store, _) = setup(1_000);
    let report = harness::run(&store, &BenchSettings::default(), &SchemaNames::default())
        .await
        .unwrap();

    for result in &report.comparisons {
        let speedup = result.speedup().expect("both arms succeed with measurable time");
        let ratio = result.baseline.elapsed.as_secs_f64() / result.optimized.elapsed.as_secs_f64();
        assert!((speedup - ratio).abs() < 1e-9);
    }
    assert!(report.aggregate_speedup().is_some());
}

#[tokio::test]
async fn full_run_is_idempotent() {
    let (store, _) = setup(1_500);
    let settings = BenchSettings::default();
    let names = SchemaNames::default();

    let first = harness::run(&store, &settings, &names).await.unwrap();
    let second = harness::run(&store, &settings, &names).await.unwrap();

    assert_eq!(first.dataset_size.as_ref().ok(), Some(&1_500));
    assert_eq!(first.counts(), second.counts());
    assert!(first.counts().iter().all(Option::is_some));
}

#[tokio::test]
async fn extrapolation_projects_from_dataset_size() {
    let (store, _) = setup(500);
    let settings = BenchSettings {
        target_users: 1_000,
        ..BenchSettings::default()
    };
    let report = harness::run(&store, &settings, &SchemaNames::default())
        .await
        .unwrap();

    let e = report.extrapolation.expect("extrapolation available");
    assert_eq!(e.measured_n, 500);
    assert_eq!(e.target_n, 1_000);
    assert_eq!(e.measured, report.comparisons[0].optimized.elapsed);
    assert_eq!(e.projected, e.measured * 2);
}

#[tokio::test]
async fn plan_inspection_returns_lines() {
    let (store, _) = setup(100);
    let scenarios = standard_scenarios(&SchemaNames::default()).unwrap();
    let mut session = store.session().await.unwrap();

    let plan = explain(&mut *session, store.dialect(), &scenarios[0].optimized_sql, None)
        .await
        .unwrap();
    assert!(!plan.is_empty());
    assert!(plan.lines().all(|line| !line.trim().is_empty()));
}

#[tokio::test]
async fn sampled_run_keeps_counts() {
    let (store, users) = setup(800);
    let settings = BenchSettings {
        samples: 3,
        ..BenchSettings::default()
    };
    let report = harness::run(&store, &settings, &SchemaNames::default())
        .await
        .unwrap();

    let expected = expected_counts(&users);
    for (result, want) in report.comparisons.iter().zip(expected) {
        assert_eq!(result.baseline.count(), Some(want));
        assert_eq!(result.optimized.count(), Some(want));
    }
}

#[tokio::test]
async fn missed_deadline_fails_every_arm_without_aborting() {
    let (store, _) = setup(200);
    let settings = BenchSettings {
        query_timeout: Some(Duration::from_nanos(1)),
        ..BenchSettings::default()
    };
    let report = harness::run(&store, &settings, &SchemaNames::default())
        .await
        .unwrap();

    assert_eq!(report.comparisons.len(), 3);
    for result in &report.comparisons {
        assert_eq!(result.speedup(), None);
        for arm in result.arms() {
            let err = arm.outcome.as_ref().unwrap_err();
            assert!(matches!(
                err,
                audience_bench::error::BenchError::Query {
                    source: QueryError::Timeout(_),
                    ..
                }
            ));
        }
    }
    assert!(report.extrapolation.is_err());

    let mut rendered = Vec::new();
    report.render(&mut rendered).unwrap();
    let text = String::from_utf8(rendered).unwrap();
    assert!(text.contains("n/a"));
    assert!(!text.contains("NaN"));
}
