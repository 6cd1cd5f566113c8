//! The whole catalog against the in-memory storefront

use std::sync::Arc;

use relcheck_common::{Browser, SuiteConfig};
use relcheck_e2e::fake::{FakeLauncher, FakeSite, ItemSpec, ProductSpec};
use relcheck_e2e::scenarios::SessionProfile;
use relcheck_e2e::{ScenarioFilter, ScenarioId, ScenarioStatus, TestRunner, TestSuiteResult};

const BASE: &str = "https://shop.test";

fn config(output: &std::path::Path) -> SuiteConfig {
    let mut config = SuiteConfig::default();
    config.target.base_url = BASE.to_string();
    config.runner.output_dir = output.to_path_buf();
    config
}

#[tokio::test]
async fn every_scenario_passes_on_a_healthy_storefront() {
    let output = tempfile::tempdir().unwrap();
    let launcher = Arc::new(FakeLauncher::new(FakeSite::storefront(BASE)));
    let runner = TestRunner::new(launcher.clone(), config(output.path()));

    let results = runner.run_all().await.unwrap();

    let failures: Vec<_> = results
        .results
        .iter()
        .filter(|r| r.status != ScenarioStatus::Passed)
        .map(|r| format!("{}: {:?}", r.code, r.error))
        .collect();
    assert!(failures.is_empty(), "{:#?}", failures);
    assert_eq!(results.total, 15);
    assert_eq!(results.passed, 15);
    assert!(results.success());

    let codes: Vec<_> = results.results.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes[0], "TC-01");
    assert_eq!(codes[14], "TC-15");

    let launches = launcher.launches();
    assert_eq!(launches.len(), 15);
    assert_eq!(launches.iter().filter(|o| o.browser == Browser::Firefox).count(), 1);
    assert_eq!(launches.iter().filter(|o| o.is_mobile).count(), 1);
}

#[tokio::test]
async fn failures_are_recorded_with_screenshots_and_written_out() {
    let output = tempfile::tempdir().unwrap();
    let too_many = (0..7).map(|i| ItemSpec::new(&format!("Wallet {}", i), "$20"));
    let site = FakeSite::new(BASE).product_for(
        "wallet",
        "/itm/1",
        &ProductSpec::new("Wallet", "$20").items(too_many),
    );
    let runner = TestRunner::new(Arc::new(FakeLauncher::new(site)), config(output.path()));

    let filter = ScenarioFilter {
        ids: vec![ScenarioId::Tc01, ScenarioId::Tc11],
        ..Default::default()
    };
    let results = runner.run(&filter).await.unwrap();

    assert_eq!((results.passed, results.failed), (1, 1));
    let failed = &results.results[0];
    assert_eq!(failed.code, "TC-01");
    assert_eq!(failed.status, ScenarioStatus::Failed);
    assert!(failed.error.as_deref().unwrap().starts_with("TC-01: assertion failed"));

    let screenshot = failed.attempts[0].screenshot.clone().unwrap();
    assert!(screenshot.starts_with(output.path().join("screenshots")));
    assert!(screenshot.exists());

    let path = runner.write_results(&results).unwrap();
    assert_eq!(path, output.path().join("test-results.json"));
    let written: TestSuiteResult = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written.run_id, results.run_id);
    assert_eq!(written.failed, 1);
}

#[tokio::test]
async fn retries_turn_a_broken_launch_into_a_flaky_pass() {
    let output = tempfile::tempdir().unwrap();
    let mut config = config(output.path());
    config.runner.retries = 2;
    config.runner.workers = 1;
    let launcher = Arc::new(FakeLauncher::new(FakeSite::storefront(BASE)).failing_first(2));
    let runner = TestRunner::new(launcher.clone(), config);

    let filter = ScenarioFilter {
        ids: vec![ScenarioId::Tc03],
        ..Default::default()
    };
    let results = runner.run(&filter).await.unwrap();

    assert_eq!(results.flaky, 1);
    assert!(results.success());
    let attempts = &results.results[0].attempts;
    assert_eq!(attempts.len(), 3);
    assert!(!attempts[0].success && !attempts[1].success && attempts[2].success);
}

#[tokio::test]
async fn the_first_retry_of_a_failing_scenario_is_traced() {
    let output = tempfile::tempdir().unwrap();
    let mut config = config(output.path());
    config.runner.retries = 2;
    let too_many = (0..7).map(|i| ItemSpec::new(&format!("Wallet {}", i), "$20"));
    let site = FakeSite::new(BASE).product_for(
        "wallet",
        "/itm/1",
        &ProductSpec::new("Wallet", "$20").items(too_many),
    );
    let runner = TestRunner::new(Arc::new(FakeLauncher::new(site)), config);

    let result = runner.run_scenario(ScenarioId::Tc01).await;

    assert_eq!(result.status, ScenarioStatus::Failed);
    let traces: Vec<_> = result.attempts.iter().map(|a| a.trace.clone()).collect();
    assert_eq!(traces.len(), 3);
    assert!(traces[0].is_none() && traces[2].is_none());
    let trace = traces[1].clone().unwrap();
    assert_eq!(trace, output.path().join("traces").join("TC-01-attempt2.zip"));
    assert!(trace.exists());
    assert!(result.attempts.iter().all(|a| a.screenshot.is_some()));
}

#[tokio::test]
async fn without_retries_a_broken_launch_fails() {
    let output = tempfile::tempdir().unwrap();
    let launcher = Arc::new(FakeLauncher::new(FakeSite::storefront(BASE)).failing_first(1));
    let runner = TestRunner::new(launcher, config(output.path()));
    let result = runner.run_scenario(ScenarioId::Tc02).await;
    assert_eq!(result.status, ScenarioStatus::Failed);
    assert_eq!(result.attempts.len(), 1);
    assert!(result.attempts[0].screenshot.is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_scenarios_hit_the_scenario_timeout() {
    let output = tempfile::tempdir().unwrap();
    let mut config = config(output.path());
    config.runner.scenario_timeout_ms = 2_000;
    config.runner.screenshot_on_failure = false;
    config.rules.section_timeout_ms = 60_000;
    let slow = ProductSpec::new("Wallet", "$20")
        .items([ItemSpec::new("wallet", "$20")])
        .section_delay(std::time::Duration::from_secs(30));
    let site = FakeSite::new(BASE).product_for("wallet", "/itm/1", &slow);
    let runner = TestRunner::new(Arc::new(FakeLauncher::new(site)), config);

    let result = runner.run_scenario(ScenarioId::Tc11).await;
    assert_eq!(result.status, ScenarioStatus::Failed);
    assert_eq!(
        result.error.as_deref(),
        Some("Scenario TC-11 timed out after 2000 ms")
    );
}

#[test]
fn mobile_profile_is_only_used_for_the_layout_check() {
    let mobile: Vec<_> = ScenarioId::ALL
        .iter()
        .filter(|id| id.meta().profile == SessionProfile::Mobile)
        .collect();
    assert_eq!(mobile, vec![&ScenarioId::Tc05]);
}
