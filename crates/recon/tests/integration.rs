use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tally_recon::bins::DiffBin;
use tally_recon::compare::{Comparator, DualSourceComparator, ScopedStore};
use tally_recon::engine::{run, IdentifierSource};
use tally_recon::error::{CompareError, StoreError};
use tally_recon::model::{Comparison, StoreSide};
use tally_recon::report::{write_summary, ReconReport};
use tally_recon::store::MemoryStore;
use tally_recon::{pool, RunConfig};

fn config(concurrency: usize, timeout_secs: u64) -> RunConfig {
    let input = format!(
        r#"
name = "integration"
concurrency = {concurrency}
timeout_secs = {timeout_secs}

[store_a]
kind = "gcs"
bucket = "livestream-prod"
root = "CompositePreProcessing/v2/"

[store_b]
kind = "gcs"
bucket = "livestream-prod-temp"
root = "CompositePreProcessing/v4/"

[retry]
initial_interval_ms = 1
max_interval_ms = 5
jitter = 0.0
"#
    );
    RunConfig::from_toml(&input).unwrap()
}

fn v2(id: &str) -> String {
    format!("CompositePreProcessing/v2/{id}/")
}

fn v4(id: &str) -> String {
    format!("CompositePreProcessing/v4/{id}/")
}

/// Offending identifiers per bin, order-independent.
fn offender_sets(report: &ReconReport) -> Vec<(DiffBin, BTreeSet<String>)> {
    report
        .bins
        .iter()
        .map(|t| (t.bin, t.identifiers.iter().cloned().collect()))
        .collect()
}

fn counts(report: &ReconReport) -> Vec<usize> {
    report.bins.iter().map(|t| t.count).collect()
}

fn assert_balanced(report: &ReconReport) {
    let binned: usize = report.bins.iter().map(|t| t.count).sum();
    assert_eq!(binned + report.skipped.len(), report.summary.total);
}

// -------------------------------------------------------------------------
// Classification examples
// -------------------------------------------------------------------------

#[test]
fn worked_examples_land_in_expected_bins() {
    let cases = [
        (10, 10, DiffBin::Equal),
        (7, 10, DiffBin::Less),
        (13, 10, DiffBin::More1To4),
        (10, 600, DiffBin::Less),
        (610, 100, DiffBin::MoreThan500),
    ];
    for (count_a, count_b, expected) in cases {
        let a = MemoryStore::new("prod").with_count(&v2("id-1"), count_a);
        let b = MemoryStore::new("temp").with_count(&v4("id-1"), count_b);
        let report = run(
            &config(4, 30),
            Arc::new(a),
            Arc::new(b),
            IdentifierSource::Enumerate,
        )
        .unwrap();

        let tally = &report.bins[expected.index()];
        assert_eq!(tally.count, 1, "{count_a} vs {count_b}");
        if expected.tracks_offenders() {
            assert_eq!(tally.identifiers, vec!["id-1"]);
        } else {
            assert!(tally.identifiers.is_empty());
        }
        assert_balanced(&report);
    }
}

// -------------------------------------------------------------------------
// Whole runs
// -------------------------------------------------------------------------

#[test]
fn identical_stores_are_all_equal() {
    let mut a = MemoryStore::new("prod");
    let mut b = MemoryStore::new("temp");
    for i in 0..50u64 {
        let id = format!("rec-{i:03}");
        a = a.with_count(&v2(&id), i % 9);
        b = b.with_count(&v4(&id), i % 9);
    }
    // Identifiers with zero objects are not listed, so only those with
    // at least one object are enumerated.
    let report = run(&config(8, 30), Arc::new(a), Arc::new(b), IdentifierSource::Enumerate).unwrap();

    assert!(report.summary.total > 0);
    assert_eq!(report.summary.equal, report.summary.total);
    assert_eq!(report.summary.offending, 0);
    assert_eq!(report.summary.skipped, 0);
    assert!(!report.has_discrepancies());
}

#[test]
fn failing_identifier_is_skipped_and_run_completes() {
    let a = MemoryStore::new("prod")
        .with_count(&v2("good"), 3)
        .with_count(&v2("bad"), 3)
        .with_failure(v2("bad"), StoreError::Status { status: 500, message: "boom".into() });
    let b = MemoryStore::new("temp")
        .with_count(&v4("good"), 3)
        .with_count(&v4("bad"), 3);
    let report = run(&config(4, 30), Arc::new(a), Arc::new(b), IdentifierSource::Enumerate).unwrap();

    assert_eq!(report.summary.total, 2);
    assert_eq!(report.summary.equal, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].identifier, "bad");
    assert!(report.skipped[0].reason.contains("prod"));
    assert!(report.has_discrepancies());
    assert_balanced(&report);
}

#[test]
fn timeout_skips_identifier_without_blocking_shutdown() {
    let a = MemoryStore::new("prod")
        .with_count(&v2("fast"), 2)
        .with_count(&v2("slow"), 2)
        .with_delay(v2("slow"), Duration::from_secs(4));
    let b = MemoryStore::new("temp")
        .with_count(&v4("fast"), 2)
        .with_count(&v4("slow"), 2);

    let started = Instant::now();
    let report = run(&config(2, 1), Arc::new(a), Arc::new(b), IdentifierSource::Enumerate).unwrap();

    // Returns at the 1s deadline, well before the 4s count finishes.
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.summary.equal, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].identifier, "slow");
    assert!(report.skipped[0].reason.contains("timed out"));
    assert_balanced(&report);
}

#[test]
fn repeated_concurrent_runs_agree() {
    let mut a = MemoryStore::new("prod");
    let mut b = MemoryStore::new("temp");
    let mut ids = Vec::new();
    for i in 0..120u64 {
        let id = format!("id-{i}");
        a = a.with_count(&v2(&id), (i * 37) % 700);
        b = b.with_count(&v4(&id), (i * 11) % 90);
        ids.push(id);
    }
    let a: Arc<MemoryStore> = Arc::new(a);
    let b: Arc<MemoryStore> = Arc::new(b);

    let first = run(
        &config(16, 30),
        a.clone(),
        b.clone(),
        IdentifierSource::Provided(ids.clone()),
    )
    .unwrap();
    assert_balanced(&first);

    for _ in 0..5 {
        let again = run(
            &config(16, 30),
            a.clone(),
            b.clone(),
            IdentifierSource::Provided(ids.clone()),
        )
        .unwrap();
        assert_eq!(counts(&again), counts(&first));
        assert_eq!(offender_sets(&again), offender_sets(&first));
    }
}

#[test]
fn pool_drains_even_when_every_comparison_times_out() {
    let a = MemoryStore::new("prod").with_delay("v2/", Duration::from_secs(3));
    let b = MemoryStore::new("temp");
    let comparator = DualSourceComparator::new(
        ScopedStore::new(Arc::new(a), "v2/"),
        ScopedStore::new(Arc::new(b), "v4/"),
    )
    .with_timeout(Duration::from_millis(100));

    let ids: Vec<String> = (0..8).map(|i| format!("id-{i}")).collect();
    let started = Instant::now();
    let report = pool::run(ids, &comparator, 4);

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.skipped.len(), 8);
    assert_eq!(report.compared(), 0);
    assert!(report.is_balanced());
}

#[test]
fn count_error_never_substitutes_zero() {
    let a = MemoryStore::new("prod").with_count("v2/id-1/", 5);
    let b = MemoryStore::new("temp").with_failure("v4/", StoreError::Transport("reset".into()));
    let comparator = DualSourceComparator::new(
        ScopedStore::new(Arc::new(a), "v2/"),
        ScopedStore::new(Arc::new(b), "v4/"),
    );
    let result: Result<Comparison, CompareError> = comparator.compare("id-1");
    match result {
        Err(CompareError::Count { side, store, .. }) => {
            assert_eq!(side, StoreSide::B);
            assert_eq!(store, "temp");
        }
        other => panic!("expected count failure, got {other:?}"),
    }
}

// -------------------------------------------------------------------------
// Output
// -------------------------------------------------------------------------

#[test]
fn summary_lists_offenders_per_bin() {
    let a = MemoryStore::new("prod")
        .with_count(&v2("fc8a9074"), 12)
        .with_count(&v2("0b25f5a4"), 3);
    let b = MemoryStore::new("temp")
        .with_count(&v4("fc8a9074"), 10)
        .with_count(&v4("0b25f5a4"), 3);
    let report = run(&config(2, 30), Arc::new(a), Arc::new(b), IdentifierSource::Enumerate).unwrap();

    let mut out = Vec::new();
    write_summary(&report, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("Store A: prod (CompositePreProcessing/v2/)"));
    assert!(text.contains("Total identifiers: 2\n"));
    assert!(text.contains("Offending identifiers (+1..+4): ('fc8a9074')\n"));
    assert!(!text.contains("Skipped"));
}
