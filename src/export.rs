//! CSV export of fetched transactions.
//!
//! Fixed 8-column layout, one row per record. Missing category or account
//! joins render as an explicit placeholder so "no data" never looks like an
//! empty string, and the inclusion flag renders as Oui/Non.

use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::api::models::Transaction;
use crate::summary::{UNCATEGORIZED, UNKNOWN_ACCOUNT};

/// Column order of the exported file
pub const CSV_HEADERS: [&str; 8] = [
    "Date valeur",
    "Date comptable",
    "Description",
    "Type",
    "Montant",
    "Catégorie",
    "Compte",
    "Comptabilisée",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write `records` to `path` as UTF-8 CSV.
///
/// An empty slice still produces a valid file containing only the header row.
pub fn export_csv(records: &[Transaction], path: &Path) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADERS)?;

    for tx in records {
        let category = tx
            .categories
            .as_ref()
            .map(|c| c.name.as_str())
            .unwrap_or(UNCATEGORIZED);
        let account = tx
            .accounts
            .as_ref()
            .map(|a| a.name.as_str())
            .unwrap_or(UNKNOWN_ACCOUNT);
        let included = if tx.include_in_stats { "Oui" } else { "Non" };

        writer.write_record([
            tx.value_date.to_string(),
            tx.transaction_date.to_string(),
            tx.description.clone(),
            tx.kind.as_str().to_string(),
            format!("{:.2}", tx.amount),
            category.to_string(),
            account.to_string(),
            included.to_string(),
        ])?;
    }

    writer.flush()?;
    info!("Exported {} transaction(s) to {}", records.len(), path.display());
    Ok(())
}
