use crate::status::Status;
use crate::types::Record;
use crate::{LeadConfig, LeadError, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// What the writer does when a batch brings columns the file header lacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Only append rows. Rows are laid out in the sorted union of columns
    /// while the header at the top of the file stays as it was, so a wider or
    /// unsorted header no longer matches the appended rows.
    #[default]
    AppendOnly,
    /// Rewrite the whole file whenever the header differs from the sorted
    /// union of columns, leaving new columns empty in earlier rows.
    Rewrite,
}

/// The outcome of one export, rendered as a human-readable status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    NothingToExport,
    Saved { count: usize, path: PathBuf },
    Failed(String),
}

impl ExportStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, ExportStatus::Saved { .. })
    }

    pub fn as_status(&self) -> Status {
        match self {
            ExportStatus::NothingToExport => Status::warning(self.to_string()),
            ExportStatus::Saved { .. } => Status::success(self.to_string()),
            ExportStatus::Failed(_) => Status::error(self.to_string()),
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportStatus::NothingToExport => f.write_str("No leads to export"),
            ExportStatus::Saved { count, path } => {
                write!(f, "{} leads saved to {}", count, path.display())
            }
            ExportStatus::Failed(reason) => write!(f, "CSV export error: {}", reason),
        }
    }
}

/// Appends records to a CSV file, merging the column set with the existing header.
///
/// Concurrent writers to the same path are not coordinated; callers that share a
/// file must serialize their calls.
#[derive(Debug, Clone)]
pub struct RecordWriter {
    path: PathBuf,
    policy: SchemaPolicy,
}

impl RecordWriter {
    pub fn new(path: impl Into<PathBuf>, policy: SchemaPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn from_config(config: &LeadConfig) -> Self {
        Self::new(config.output_path.clone(), config.schema_policy)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `records` in order and reports what happened.
    ///
    /// An empty batch leaves the filesystem untouched. I/O failures come back
    /// as `ExportStatus::Failed` carrying the underlying error text.
    pub fn append_records(&self, records: &[Record]) -> ExportStatus {
        if records.is_empty() {
            return ExportStatus::NothingToExport;
        }

        match self.try_append(records) {
            Ok(count) => {
                info!("Saved {} leads to {}", count, self.path.display());
                ExportStatus::Saved {
                    count,
                    path: self.path.clone(),
                }
            }
            Err(e) => {
                error!("CSV export to {} failed: {}", self.path.display(), e);
                ExportStatus::Failed(e.to_string())
            }
        }
    }

    fn try_append(&self, records: &[Record]) -> Result<usize> {
        let header = if has_content(&self.path)? {
            read_header(&self.path)?
        } else {
            Vec::new()
        };
        let columns = merge_columns(&header, records);
        let reshaped = header != columns;

        debug!(?columns, reshaped, "Merged CSV columns");

        // Rows are always laid out in sorted column order, so any header that
        // differs from `columns` (wider or merely unsorted) needs a rewrite.
        if self.policy == SchemaPolicy::Rewrite && reshaped && !header.is_empty() {
            self.rewrite(&columns, records)?;
        } else {
            self.append(&columns, header.is_empty(), records)?;
        }

        Ok(records.len())
    }

    fn append(&self, columns: &[String], write_header: bool, records: &[Record]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = WriterBuilder::new().from_writer(file);

        if write_header {
            writer.write_record(columns)?;
        }
        for record in records {
            writer.write_record(aligned(record, columns))?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Writes the existing rows and `records` under `columns` to a sibling file,
    /// then moves it over the original.
    fn rewrite(&self, columns: &[String], records: &[Record]) -> Result<()> {
        let staging = staging_path(&self.path)?;

        if let Err(e) = self.write_merged(&staging, columns, records) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }

        commit_staging(&staging, &self.path)?;
        info!("Rewrote {} with {} columns", self.path.display(), columns.len());
        Ok(())
    }

    fn write_merged(&self, staging: &Path, columns: &[String], records: &[Record]) -> Result<()> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)?;
        let header = reader.headers()?.clone();
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|c| header.iter().position(|h| h == c))
            .collect();

        let mut writer = WriterBuilder::new().from_path(staging)?;
        writer.write_record(columns)?;

        for row in reader.records() {
            let row = row?;
            writer.write_record(
                positions
                    .iter()
                    .map(|pos| pos.and_then(|i| row.get(i)).unwrap_or("")),
            )?;
        }
        for record in records {
            writer.write_record(aligned(record, columns))?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Appends `records` to the file at `path` without rewriting earlier rows.
pub fn append_records(path: impl Into<PathBuf>, records: &[Record]) -> ExportStatus {
    RecordWriter::new(path, SchemaPolicy::AppendOnly).append_records(records)
}

/// Reads the first row of a CSV file. An empty file yields no columns.
pub fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut row = StringRecord::new();
    if reader.read_record(&mut row)? {
        Ok(row.iter().map(String::from).collect())
    } else {
        Ok(Vec::new())
    }
}

fn has_content(path: &Path) -> Result<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.len() > 0),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Sorted union of the existing header and every key in the batch.
fn merge_columns(header: &[String], records: &[Record]) -> Vec<String> {
    let mut columns: BTreeSet<String> = header.iter().cloned().collect();
    for record in records {
        columns.extend(record.keys().map(String::from));
    }
    columns.into_iter().collect()
}

fn aligned<'a>(record: &'a Record, columns: &'a [String]) -> impl Iterator<Item = &'a str> {
    columns.iter().map(move |c| record.get(c).unwrap_or(""))
}

/// Moves the staging file over `target`, removing it if the move fails.
fn commit_staging(staging: &Path, target: &Path) -> Result<()> {
    if let Err(e) = fs::rename(staging, target) {
        let _ = fs::remove_file(staging);
        return Err(e.into());
    }
    Ok(())
}

fn staging_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| LeadError::InvalidInput(format!("{} is not a file path", path.display())))?;
    Ok(path.with_file_name(format!(".{}.tmp", name.to_string_lossy())))
}
