//! Concrete `ObjectStore` backends selected by `kind` in the run config.

pub mod fs;
pub mod gcs;

use std::sync::Arc;

use tally_recon::{ObjectStore, StoreConfig, StoreKind};

use crate::exit_codes::EXIT_STORE_SETUP;
use crate::CliError;

/// Build the backend for one `[store_*]` section.
///
/// `fs` bases are resolved relative to `base_dir` (the config file's
/// directory) unless absolute.
pub fn open_store(config: &StoreConfig, base_dir: &std::path::Path) -> Result<Arc<dyn ObjectStore>, CliError> {
    match config.kind {
        StoreKind::Gcs => {
            let token = resolve_token(config.token_env.as_deref())?;
            let store = match &config.endpoint {
                Some(endpoint) => gcs::GcsStore::with_base_url(&config.bucket, token, endpoint.clone()),
                None => gcs::GcsStore::new(&config.bucket, token),
            }
            .map_err(|e| setup_err(format!("gcs bucket '{}': {e}", config.bucket)))?;
            Ok(Arc::new(store))
        }
        StoreKind::Fs => {
            let store = fs::FsStore::new(base_dir.join(&config.bucket)).map_err(|e| {
                setup_err(e.to_string()).with_hint("for kind = \"fs\", bucket is a directory path")
            })?;
            Ok(Arc::new(store))
        }
    }
}

/// Read the bearer token. An explicitly named variable must be set; the
/// default variable is optional and its absence means anonymous access.
fn resolve_token(token_env: Option<&str>) -> Result<Option<String>, CliError> {
    match token_env {
        Some(var) => match std::env::var(var) {
            Ok(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
            _ => Err(setup_err(format!("environment variable {var} is not set"))
                .with_hint("export an OAuth access token, e.g. from `gcloud auth print-access-token`")),
        },
        None => match std::env::var(gcs::DEFAULT_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
            _ => {
                log::debug!("{} not set; using anonymous access", gcs::DEFAULT_TOKEN_ENV);
                Ok(None)
            }
        },
    }
}

fn setup_err(msg: impl Into<String>) -> CliError {
    CliError { code: EXIT_STORE_SETUP, message: msg.into(), hint: None }
}
