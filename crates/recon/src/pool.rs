//! Fixed-size worker pool over a pre-filled, closed queue.

use std::sync::mpsc;
use std::thread;

use parking_lot::Mutex;

use crate::compare::Comparator;
use crate::model::Identifier;
use crate::report::AggregateReport;

pub const DEFAULT_CONCURRENCY: usize = 64;

/// Compare every identifier with at most `concurrency` in flight and
/// aggregate the results. Blocks until the queue is drained.
///
/// Failed comparisons are recorded as skipped. Counting threads left behind
/// by timed-out comparisons are detached and never delay the return.
pub fn run<C: Comparator + ?Sized>(
    identifiers: Vec<Identifier>,
    comparator: &C,
    concurrency: usize,
) -> AggregateReport {
    let total = identifiers.len();
    let workers = concurrency.clamp(1, total.max(1));

    let (tx, rx) = mpsc::sync_channel::<Identifier>(total.max(1));
    for id in identifiers {
        // Capacity equals the identifier count, so this never blocks.
        let _ = tx.send(id);
    }
    drop(tx);

    let queue = Mutex::new(rx);
    let report = Mutex::new(AggregateReport::new(total));

    log::info!("comparing {total} identifier(s) with {workers} worker(s)");

    thread::scope(|scope| {
        let mut started = 0;
        for i in 0..workers {
            let spawned = thread::Builder::new()
                .name(format!("recon-worker-{i}"))
                .spawn_scoped(scope, || worker(&queue, comparator, &report));
            match spawned {
                Ok(_) => started += 1,
                Err(e) => {
                    log::warn!("started {started} of {workers} worker(s); cannot start more: {e}");
                    break;
                }
            }
        }
        // Without any worker thread the caller drains the queue itself.
        if started == 0 {
            worker(&queue, comparator, &report);
        }
    });

    report.into_inner()
}

fn worker<C: Comparator + ?Sized>(
    queue: &Mutex<mpsc::Receiver<Identifier>>,
    comparator: &C,
    report: &Mutex<AggregateReport>,
) {
    loop {
        // The queue is closed and fully populated, so recv never waits on a
        // producer; it returns Err once drained.
        let next = queue.lock().recv();
        let Ok(identifier) = next else {
            break;
        };

        match comparator.compare(&identifier) {
            Ok(comparison) => {
                let bin = report.lock().record(&comparison);
                if bin.tracks_offenders() {
                    log::info!(
                        "'{identifier}': a={} b={} diff={} ({bin})",
                        comparison.count_a,
                        comparison.count_b,
                        comparison.difference(),
                    );
                }
            }
            Err(err) => {
                log::warn!("skipping {err}");
                report.lock().skip(&err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::bins::DiffBin;
    use crate::error::{CompareError, StoreError};
    use crate::model::{Comparison, StoreSide};

    /// Deterministic outcomes keyed by identifier.
    struct TableComparator {
        table: HashMap<String, Result<(u64, u64), CompareError>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl TableComparator {
        fn new(rows: Vec<(&str, Result<(u64, u64), CompareError>)>) -> Self {
            Self {
                table: rows.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    impl Comparator for TableComparator {
        fn compare(&self, identifier: &str) -> Result<Comparison, CompareError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            let (count_a, count_b) = self.table[identifier].clone()?;
            Ok(Comparison { identifier: identifier.to_string(), count_a, count_b })
        }
    }

    fn count_err(id: &str) -> CompareError {
        CompareError::Count {
            identifier: id.into(),
            side: StoreSide::A,
            store: "prod".into(),
            source: StoreError::Transport("reset".into()),
        }
    }

    #[test]
    fn empty_input_yields_empty_report() {
        let cmp = TableComparator::new(vec![]);
        let report = run(Vec::new(), &cmp, 8);
        assert_eq!(report.total, 0);
        assert_eq!(report.compared(), 0);
        assert!(report.is_balanced());
    }

    #[test]
    fn every_identifier_processed_once() {
        let ids: Vec<String> = (0..200u64).map(|i| format!("id-{i}")).collect();
        let cmp = TableComparator::new(
            ids.iter()
                .enumerate()
                .map(|(i, id)| (id.as_str(), Ok((i as u64 % 7, 3))))
                .collect(),
        );
        let report = run(ids.clone(), &cmp, 16);
        assert_eq!(cmp.calls.load(Ordering::SeqCst), 200);
        assert_eq!(report.total, 200);
        assert!(report.is_balanced());
    }

    #[test]
    fn failures_are_skipped_not_binned() {
        let cmp = TableComparator::new(vec![
            ("ok", Ok((1, 1))),
            ("bad", Err(count_err("bad"))),
        ]);
        let report = run(vec!["ok".into(), "bad".into()], &cmp, 2);
        assert_eq!(report.tally(DiffBin::Equal).count, 1);
        assert_eq!(report.compared(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].identifier, "bad");
        assert!(report.is_balanced());
    }

    struct ThreadNameComparator;

    impl Comparator for ThreadNameComparator {
        fn compare(&self, identifier: &str) -> Result<Comparison, CompareError> {
            let on_worker = thread::current()
                .name()
                .is_some_and(|name| name.starts_with("recon-worker-"));
            Ok(Comparison {
                identifier: identifier.to_string(),
                count_a: u64::from(on_worker),
                count_b: 1,
            })
        }
    }

    #[test]
    fn comparisons_run_on_named_workers() {
        let ids: Vec<String> = (0..10).map(|i| format!("id-{i}")).collect();
        let report = run(ids, &ThreadNameComparator, 3);
        assert_eq!(report.tally(DiffBin::Equal).count, 10);
    }

    #[test]
    fn concurrency_above_input_is_capped() {
        let mut cmp = TableComparator::new(vec![("a", Ok((2, 1))), ("b", Ok((0, 0)))]);
        cmp.delay = Duration::from_millis(5);
        let report = run(vec!["a".into(), "b".into()], &cmp, 1024);
        assert_eq!(report.tally(DiffBin::More1To4).identifiers, vec!["a"]);
        assert!(report.is_balanced());
    }
}
