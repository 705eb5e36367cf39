use std::sync::Arc;
use std::time::Instant;

use crate::backoff::retry;
use crate::compare::{Comparator, DualSourceComparator, RetryingComparator, ScopedStore};
use crate::config::{RunConfig, StoreConfig};
use crate::enumerate::{dedup_identifiers, list_identifiers};
use crate::error::{CompareError, ReconError, StoreError};
use crate::model::{Comparison, Identifier, StoreSide};
use crate::pool;
use crate::report::{ReconMeta, ReconReport, StoreLabel};
use crate::store::ObjectStore;

/// Where the identifiers of a run come from.
#[derive(Debug, Clone)]
pub enum IdentifierSource {
    /// List the root of the configured reference store.
    Enumerate,
    /// Use this list as given (e.g. read from a file).
    Provided(Vec<Identifier>),
}

/// Run one reconciliation per config. Returns the binned report.
///
/// Only enumeration failure is fatal; per-identifier failures land in the
/// report's skipped list.
pub fn run(
    config: &RunConfig,
    store_a: Arc<dyn ObjectStore>,
    store_b: Arc<dyn ObjectStore>,
    source: IdentifierSource,
) -> Result<ReconReport, ReconError> {
    let started = Instant::now();
    let run_at = chrono::Utc::now().to_rfc3339();

    let mut identifiers = match source {
        IdentifierSource::Enumerate => {
            let reference = match config.enumerate.from {
                StoreSide::A => &store_a,
                StoreSide::B => &store_b,
            };
            enumerate(config, reference.as_ref())?
        }
        IdentifierSource::Provided(ids) => ids,
    };
    let dropped = dedup_identifiers(&mut identifiers);
    if dropped > 0 {
        log::warn!("ignoring {dropped} duplicate identifier(s)");
    }

    let meta_a = label(store_a.as_ref(), &config.store_a);
    let meta_b = label(store_b.as_ref(), &config.store_b);
    let comparator = build_comparator(config, store_a, store_b);
    let aggregate = pool::run(identifiers, comparator.as_ref(), config.concurrency);

    let meta = ReconMeta {
        config_name: config.name.clone(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        run_at,
        duration_ms: started.elapsed().as_millis(),
        concurrency: config.concurrency,
        timeout_secs: config.timeout_secs,
        store_a: meta_a,
        store_b: meta_b,
    };
    Ok(ReconReport::new(meta, aggregate))
}

/// List identifiers under the reference store's root, retrying transient
/// listing failures with the run's policy.
pub fn enumerate(config: &RunConfig, store: &dyn ObjectStore) -> Result<Vec<Identifier>, ReconError> {
    let root = &config.store(config.enumerate.from).root;
    let op_name = format!("list '{root}' in '{}'", store.name());
    let ids = retry(&config.retry.policy(), &op_name, StoreError::is_transient, || {
        list_identifiers(store, root)
    })
    .map_err(|e| ReconError::Listing {
        store: store.name().to_string(),
        root: root.clone(),
        attempts: e.attempts(),
        source: e.into_inner(),
    })?;
    log::info!("found {} identifier(s) under '{root}' in '{}'", ids.len(), store.name());
    Ok(ids)
}

/// Compare the given identifiers one after another, in order. Used for
/// spot checks where a full pool run is unnecessary.
pub fn compare_identifiers(
    config: &RunConfig,
    store_a: Arc<dyn ObjectStore>,
    store_b: Arc<dyn ObjectStore>,
    identifiers: &[Identifier],
) -> Vec<Result<Comparison, CompareError>> {
    let comparator = build_comparator(config, store_a, store_b);
    identifiers.iter().map(|id| comparator.compare(id)).collect()
}

fn build_comparator(
    config: &RunConfig,
    store_a: Arc<dyn ObjectStore>,
    store_b: Arc<dyn ObjectStore>,
) -> Box<dyn Comparator> {
    let dual = DualSourceComparator::new(scoped(store_a, &config.store_a), scoped(store_b, &config.store_b))
        .with_timeout(config.timeout());
    if config.retry.comparisons {
        Box::new(RetryingComparator::new(dual, config.retry.policy()))
    } else {
        Box::new(dual)
    }
}

fn scoped(store: Arc<dyn ObjectStore>, config: &StoreConfig) -> ScopedStore {
    let scoped = ScopedStore::new(store, config.root.clone());
    match &config.suffix {
        Some(suffix) => scoped.with_suffix(suffix.clone()),
        None => scoped,
    }
}

fn label(store: &dyn ObjectStore, config: &StoreConfig) -> StoreLabel {
    StoreLabel {
        name: store.name().to_string(),
        root: config.root.clone(),
    }
}
