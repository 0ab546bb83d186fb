//! Parquet encoding
//!
//! Columnar encoding for the canonical entities: self-describing Parquet
//! with SNAPPY compression. Schemas are all-string except `negotiated_rate`,
//! which is a 64-bit float; nested objects arrive here already encoded as
//! JSON strings. Files are written to a sibling temp path and renamed so a
//! crash never leaves a partial part file behind.

use crate::domain::{PrismError, Result};
use arrow::array::{ArrayRef, Float64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Utf8,
    Float64,
}

/// One column of an entity schema
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub const fn utf8(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Utf8,
        }
    }

    pub const fn float64(name: &'static str) -> Self {
        Self {
            name,
            kind: ColumnKind::Float64,
        }
    }
}

/// One cell of a row, matching its column's kind
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Utf8(Option<String>),
    Float64(f64),
}

/// Writes rows as a single Parquet file at `path`, atomically.
pub fn write_parquet(path: &Path, columns: &[ColumnSpec], rows: &[Vec<Cell>]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| PrismError::Write(format!("creating {}: {e}", parent.display())))?;
    }

    let fields: Vec<Field> = columns
        .iter()
        .map(|c| match c.kind {
            ColumnKind::Utf8 => Field::new(c.name, DataType::Utf8, true),
            ColumnKind::Float64 => Field::new(c.name, DataType::Float64, false),
        })
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let mut string_builders: Vec<StringBuilder> = Vec::new();
    let mut float_builders: Vec<Float64Builder> = Vec::new();
    // Builder index per column, into its kind's builder list.
    let slots: Vec<usize> = columns
        .iter()
        .map(|c| match c.kind {
            ColumnKind::Utf8 => {
                string_builders.push(StringBuilder::new());
                string_builders.len() - 1
            }
            ColumnKind::Float64 => {
                float_builders.push(Float64Builder::new());
                float_builders.len() - 1
            }
        })
        .collect();

    for (row_index, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(PrismError::Write(format!(
                "row {row_index} has {} cells, schema has {} columns",
                row.len(),
                columns.len()
            )));
        }
        for (col, cell) in row.iter().enumerate() {
            match (columns[col].kind, cell) {
                (ColumnKind::Utf8, Cell::Utf8(value)) => {
                    string_builders[slots[col]].append_option(value.as_deref());
                }
                (ColumnKind::Float64, Cell::Float64(value)) => {
                    float_builders[slots[col]].append_value(*value);
                }
                (kind, cell) => {
                    return Err(PrismError::Write(format!(
                        "column '{}' expects {kind:?}, row {row_index} has {cell:?}",
                        columns[col].name
                    )));
                }
            }
        }
    }

    let arrays: Vec<ArrayRef> = columns
        .iter()
        .enumerate()
        .map(|(col, spec)| match spec.kind {
            ColumnKind::Utf8 => Arc::new(string_builders[slots[col]].finish()) as ArrayRef,
            ColumnKind::Float64 => Arc::new(float_builders[slots[col]].finish()) as ArrayRef,
        })
        .collect();

    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|e| PrismError::Write(format!("building record batch: {e}")))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("part.parquet");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let file = File::create(&tmp_path)
        .map_err(|e| PrismError::Write(format!("creating {}: {e}", tmp_path.display())))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .map_err(|e| PrismError::Write(format!("opening parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| PrismError::Write(format!("writing {}: {e}", tmp_path.display())))?;
    writer
        .close()
        .map_err(|e| PrismError::Write(format!("closing {}: {e}", tmp_path.display())))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        PrismError::Write(format!(
            "renaming {} to {}: {e}",
            tmp_path.display(),
            path.display()
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    const COLUMNS: [ColumnSpec; 3] = [
        ColumnSpec::utf8("service_code"),
        ColumnSpec::float64("negotiated_rate"),
        ColumnSpec::utf8("plan_details"),
    ];

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("part-0000.parquet");

        let rows = vec![
            vec![
                Cell::Utf8(Some("99213".to_string())),
                Cell::Float64(81.84),
                Cell::Utf8(Some("{\"plan_name\":\"PPO\"}".to_string())),
            ],
            vec![
                Cell::Utf8(Some("99214".to_string())),
                Cell::Float64(120.5),
                Cell::Utf8(None),
            ],
        ];
        write_parquet(&path, &COLUMNS, &rows).unwrap();

        let file = File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].num_rows(), 2);
        assert_eq!(batches[0].num_columns(), 3);

        // No temp residue next to the final file.
        assert!(!dir.path().join("part-0000.parquet.tmp").exists());
    }

    #[test]
    fn test_cell_kind_mismatch_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.parquet");
        let rows = vec![vec![
            Cell::Float64(1.0),
            Cell::Float64(1.0),
            Cell::Utf8(None),
        ]];
        assert!(write_parquet(&path, &COLUMNS, &rows).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_row_arity_mismatch_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.parquet");
        let rows = vec![vec![Cell::Utf8(None)]];
        assert!(write_parquet(&path, &COLUMNS, &rows).is_err());
    }
}
