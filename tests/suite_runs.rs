//! End-to-end runs of the built-in suites against the virtual device

use hil_harness::core::report::{ReportGenerator, ReportHeader};
use hil_harness::core::session::{HarnessSession, SessionConfig};
use hil_harness::core::simulator::{DeviceProfile, VirtualDevice};
use hil_harness::core::transport::{SimulatorConfig, Transport, TransportError};
use hil_harness::suites::{self, BenchProfile};
use hil_harness::{Category, Status};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn simulated(profile: &BenchProfile) -> SimulatorConfig {
    let device = VirtualDevice::new(DeviceProfile {
        signal_hz: profile.signal_hz,
        ..DeviceProfile::default()
    });
    SimulatorConfig::default().with_device(device)
}

#[tokio::test]
async fn complete_suite_passes_on_virtual_device() {
    let profile = BenchProfile::accelerated();
    let suites = suites::by_name("complete", &profile).unwrap();
    let config = SessionConfig::new(Transport::Simulated(simulated(&profile)));

    let run = HarnessSession::execute(config, &suites, CancellationToken::new())
        .await
        .unwrap();

    assert!(run.outcome.completed());
    assert_eq!(run.ledger.len(), 26);
    let failures: Vec<String> = run
        .ledger
        .entries()
        .iter()
        .filter(|e| e.verdict.status != Status::Pass)
        .map(|e| format!("{}: {}", e.id, e.verdict))
        .collect();
    assert!(failures.is_empty(), "{failures:#?}");
}

#[tokio::test]
async fn extended_suite_on_virtual_device() {
    let profile = BenchProfile::accelerated();
    let suites = suites::by_name("extended", &profile).unwrap();
    let config = SessionConfig::new(Transport::Simulated(simulated(&profile)));

    let run = HarnessSession::execute(config, &suites, CancellationToken::new())
        .await
        .unwrap();

    assert!(run.outcome.completed());
    assert_eq!(run.ledger.len(), 12);
    for entry in run.ledger.entries() {
        if entry.known_flaky.is_some() {
            continue;
        }
        assert_eq!(entry.verdict.status, Status::Pass, "{}: {}", entry.id, entry.verdict);
    }
    let flaky: Vec<&str> = run.ledger.flaky().map(|e| e.id.as_str()).collect();
    assert_eq!(flaky, vec!["CNT-HW-08"]);
    assert_eq!(run.ledger.summary().flaky, 1);
}

#[tokio::test]
async fn noisy_chunked_link_keeps_attribution() {
    let profile = BenchProfile::accelerated();
    let suite = suites::complete(&profile);
    let config = SessionConfig::new(Transport::Simulated(
        simulated(&profile).heartbeat(Duration::from_millis(25)).chunk_size(7),
    ));

    let run = HarnessSession::execute(config, &[suite], CancellationToken::new())
        .await
        .unwrap();

    for id in ["RW-07", "RW-10", "RW-11", "GPIO-01", "GPIO-03", "SYS-VERSION"] {
        let entry = run.ledger.entries().iter().find(|e| e.id == id).unwrap();
        assert_eq!(entry.verdict.status, Status::Pass, "{id}: {}", entry.verdict);
    }
}

#[tokio::test]
async fn link_drop_aborts_and_report_is_still_written() {
    let profile = BenchProfile::accelerated();
    let suites = suites::by_name("all", &profile).unwrap();
    let config = SessionConfig::new(Transport::Simulated(SimulatorConfig {
        drop_after_commands: Some(5),
        ..simulated(&profile)
    }));

    let run = HarnessSession::execute(config, &suites, CancellationToken::new())
        .await
        .unwrap();

    assert!(run.outcome.aborted.is_some());
    assert!(!run.outcome.cancelled);
    assert_eq!(run.outcome.executed, run.ledger.len());
    assert_eq!(run.outcome.executed + run.outcome.skipped, 38);
    let last = run.ledger.entries().last().unwrap();
    assert_eq!(last.verdict.status, Status::Fail);
    assert_eq!(last.verdict.category, Some(Category::Transport));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("TEST_REPORT.txt");
    let mut generator = ReportGenerator::new(ReportHeader::new("T", "v1.0.0 Build #116", "simulator", "all"));
    generator.header_mut().note("run aborted");
    generator.write(&run.ledger, &path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("Note: run aborted"));
    assert!(text.contains(&format!("  Total tests: {}", run.ledger.len())));
}

#[tokio::test]
async fn cancel_before_start_runs_nothing() {
    let profile = BenchProfile::accelerated();
    let suites = suites::by_name("all", &profile).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = HarnessSession::execute(
        SessionConfig::new(Transport::Simulated(simulated(&profile))),
        &suites,
        cancel,
    )
    .await
    .unwrap();

    assert!(run.outcome.cancelled);
    assert!(run.ledger.is_empty());
    assert_eq!(run.outcome.skipped, 38);
}

#[tokio::test]
async fn refused_link_is_an_error() {
    let config = SessionConfig::new(Transport::Simulated(SimulatorConfig {
        refuse_connection: true,
        ..SimulatorConfig::default()
    }));
    let err = HarnessSession::open(config).await.err().unwrap();
    assert!(matches!(err, TransportError::PortNotFound(_)));
}
