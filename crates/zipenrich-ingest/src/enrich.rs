//! Enrichment of a tabular payload with reference attributes
//!
//! Appends `dob` (and, outside restricted mode, `email`) to every row, keyed
//! by the identifier column. Rows keep their order and count.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use crate::config::EnrichConfig;
use crate::reference::{ReferenceError, ReferenceMap, ReferenceRecord};
use crate::table::{RecordSet, TableError};

pub const DOB_COLUMN: &str = "dob";
pub const EMAIL_COLUMN: &str = "email";

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Invalid table in {file}: {reason}")]
    InvalidStructure { file: String, reason: String },

    #[error("Reference lookup failed for {file}: {source}")]
    Reference {
        file: String,
        #[source]
        source: ReferenceError,
    },
}

impl TransformError {
    fn invalid(file: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidStructure {
            file: file.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Per-file enrichment settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichOptions {
    pub id_column: String,
    /// Only `dob` is added; `email` is left out of the output entirely
    pub restricted: bool,
}

impl EnrichOptions {
    pub fn new(id_column: impl Into<String>) -> Self {
        Self {
            id_column: id_column.into(),
            restricted: false,
        }
    }

    pub fn restricted(mut self, restricted: bool) -> Self {
        self.restricted = restricted;
        self
    }

    /// Options for an archive, with restricted mode derived from its name
    pub fn for_archive(config: &EnrichConfig, archive_name: &str) -> Self {
        Self::new(config.id_column.clone()).restricted(config.is_restricted(archive_name))
    }
}

/// Distinct trimmed identifiers, blanks excluded
pub fn distinct_ids(records: &RecordSet, id_index: usize) -> BTreeSet<String> {
    records
        .rows
        .iter()
        .filter_map(|row| row.get(id_index))
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build the enriched table.
///
/// Output columns are the input columns minus any existing `dob`/`email`,
/// then `dob`, then `email` unless restricted. Identifiers missing from
/// `resolved` get empty values.
pub fn enrich_records(
    records: &RecordSet,
    resolved: &ReferenceMap,
    id_index: usize,
    options: &EnrichOptions,
) -> RecordSet {
    let kept: Vec<usize> = records
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| *name != DOB_COLUMN && *name != EMAIL_COLUMN)
        .map(|(i, _)| i)
        .collect();

    let mut columns: Vec<String> = kept.iter().map(|&i| records.columns[i].clone()).collect();
    columns.push(DOB_COLUMN.to_string());
    if !options.restricted {
        columns.push(EMAIL_COLUMN.to_string());
    }

    let empty = ReferenceRecord::default();
    let rows = records
        .rows
        .iter()
        .map(|row| {
            let id = row.get(id_index).map(|v| v.trim()).unwrap_or_default();
            let record = resolved.get(id).unwrap_or(&empty);

            let mut out: Vec<String> = kept
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect();
            out.push(record.dob.clone());
            if !options.restricted {
                out.push(record.email.clone());
            }
            out
        })
        .collect();

    RecordSet::new(columns, rows)
}

/// Parse, resolve and re-serialize one payload.
///
/// `resolve` is called at most once with the distinct identifiers of the
/// file, and not at all when the file has none.
pub fn enrich_payload<F>(
    data: &[u8],
    file_name: &str,
    options: &EnrichOptions,
    resolve: F,
) -> Result<Vec<u8>, TransformError>
where
    F: FnOnce(&BTreeSet<String>) -> Result<ReferenceMap, ReferenceError>,
{
    let records = RecordSet::parse(data).map_err(|e| TransformError::invalid(file_name, e))?;

    let id_index = records.column_index(&options.id_column).ok_or_else(|| {
        TransformError::invalid(
            file_name,
            format!("'{}' column not found", options.id_column),
        )
    })?;

    if records.is_empty() {
        return Err(TransformError::invalid(file_name, "no data rows"));
    }

    let ids = distinct_ids(&records, id_index);
    let resolved = if ids.is_empty() {
        ReferenceMap::new()
    } else {
        resolve(&ids).map_err(|source| TransformError::Reference {
            file: file_name.to_string(),
            source,
        })?
    };

    debug!(
        "Enriching {} rows of {} ({} identifiers, restricted: {})",
        records.len(),
        file_name,
        ids.len(),
        options.restricted
    );

    enrich_records(&records, &resolved, id_index, options)
        .to_csv_bytes()
        .map_err(|e: TableError| TransformError::invalid(file_name, e))
}
