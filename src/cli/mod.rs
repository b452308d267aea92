//! CLI command handlers
//!
//! Bridges clap argument parsing with the import, assignment, and analytics
//! layers.

pub mod check;
pub mod import;

pub use check::handle_check_command;
pub use import::{handle_import_command, ImportOptions};

use crate::error::{Error, Result};
use crate::import::{ColumnProfile, DateFilter, ImportEvent, ImportHandle, ImportResult};
use crate::models::transaction::ImportedTransaction;
use std::path::Path;

/// Named CSV column profiles selectable from the command line
pub fn csv_profile(name: &str) -> Result<ColumnProfile> {
    match name {
        "default" => Ok(ColumnProfile::default()),
        "bank" => Ok(ColumnProfile::simple_bank()),
        "credit-card" => Ok(ColumnProfile::credit_card()),
        other => Err(Error::Validation(format!(
            "Unknown CSV profile: {} (expected default, bank, or credit-card)",
            other
        ))),
    }
}

/// Start the right background importer for the file
pub fn start_import(
    path: &Path,
    filter: DateFilter,
    profile: Option<&str>,
) -> Result<ImportHandle> {
    let is_csv = profile.is_some()
        || path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
    if is_csv {
        let profile = csv_profile(profile.unwrap_or("default"))?;
        Ok(crate::import::import_csv(path.to_path_buf(), profile, filter))
    } else {
        Ok(crate::import::import_gnucash(path.to_path_buf(), filter))
    }
}

/// Drain an import's events, returning the batch on success
pub fn collect_import(handle: ImportHandle) -> Result<Vec<ImportedTransaction>> {
    let mut batch = Vec::new();
    for event in handle.wait() {
        match event {
            ImportEvent::Started => tracing::debug!("import started"),
            ImportEvent::Progress(percent) => tracing::debug!(percent, "import progress"),
            ImportEvent::Imported(transactions) => batch = transactions,
            ImportEvent::Finished(ImportResult::Complete, _) => return Ok(batch),
            ImportEvent::Finished(ImportResult::Cancelled, _) => {
                return Err(Error::Import("Import was cancelled".into()))
            }
            ImportEvent::Finished(ImportResult::Failed, message) => {
                return Err(Error::Import(message))
            }
        }
    }
    Err(Error::Import("Import ended without a result".into()))
}
