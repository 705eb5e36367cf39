//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `tally` exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | General error (unspecified)                               |
//! | 2    | Usage error (bad args, unreadable identifier file)        |
//! | 3    | Invalid run config                                        |
//! | 4    | Identifier listing failed; nothing was compared           |
//! | 5    | A store backend could not be set up                       |
//! | 6    | Discrepancies or skipped identifiers (`--strict` only)    |

use tally_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing or unreadable input file.
pub const EXIT_USAGE: u8 = 2;

/// Config could not be read, parsed, or validated.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Enumeration of the reference store failed after retries.
pub const EXIT_LISTING_FAILED: u8 = 4;

/// Store construction failed (HTTP client, missing base directory).
pub const EXIT_STORE_SETUP: u8 = 5;

/// Run completed but found offending or skipped identifiers.
/// Only returned under `--strict`; otherwise the run exits 0.
pub const EXIT_DISCREPANCIES: u8 = 6;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_INVALID_CONFIG,
        ReconError::Listing { .. } => EXIT_LISTING_FAILED,
        ReconError::Io(_) => EXIT_ERROR,
    }
}
