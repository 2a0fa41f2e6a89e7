// ==============================================================================
// preprocess.rs - Upload Normalization
// ==============================================================================
// Description: Normalizes uploaded sales spreadsheets into the canonical schema
// Author: Matt Barham
// Created: 2026-02-11
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================
// Uploaded files come from several point-of-sale exports. Header names and
// date formats vary; everything is mapped onto the canonical
// (product_id, date, quantity) schema before storage.
// ==============================================================================

use std::path::Path;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::models::TrainingRecord;

/// Accepted header aliases, matched case-insensitively after trimming
const PRODUCT_ALIASES: [&str; 3] = ["product_id", "kode_produk", "product"];
const DATE_ALIASES: [&str; 2] = ["date", "tanggal"];
const QUANTITY_ALIASES: [&str; 4] = ["quantity", "total_jumlah", "jumlah", "qty"];

/// Date formats seen in the wild, tried in order
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

/// Errors that can occur during upload normalization
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column: no header matched any of {aliases:?}")]
    MissingColumn { aliases: Vec<String> },

    #[error("Unparseable date at line {line}: {value}")]
    InvalidDate { line: usize, value: String },

    #[error("Unparseable quantity at line {line}: {value}")]
    InvalidQuantity { line: usize, value: String },

    #[error("Empty product identifier at line {line}")]
    EmptyProductId { line: usize },

    #[error("File contains no data rows")]
    Empty,
}

/// Normalize an uploaded CSV file into canonical training records
///
/// # Arguments
/// * `path` - Path to the uploaded file, saved verbatim by the API layer
///
/// # Returns
/// * `Ok(Vec<TrainingRecord>)` - Normalized rows in file order
/// * `Err(PreprocessError)` - Unrecognized schema or unparseable values
///
/// Column order is free; columns beyond the three recognized ones are
/// ignored. Blank lines are skipped.
pub fn normalize_file(path: impl AsRef<Path>) -> Result<Vec<TrainingRecord>, PreprocessError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path.as_ref())?;

    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let product_idx = find_column(&header, &PRODUCT_ALIASES)?;
    let date_idx = find_column(&header, &DATE_ALIASES)?;
    let quantity_idx = find_column(&header, &QUANTITY_ALIASES)?;

    debug!(
        "Resolved upload columns: product={}, date={}, quantity={}",
        header[product_idx], header[date_idx], header[quantity_idx]
    );

    let mut records = Vec::new();

    for (index, row) in reader.records().enumerate() {
        let line = index + 2;
        let row = row?;

        // Skip fully blank lines
        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let product_id = row.get(product_idx).unwrap_or("").trim().to_string();
        if product_id.is_empty() {
            return Err(PreprocessError::EmptyProductId { line });
        }

        let date_str = row.get(date_idx).unwrap_or("").trim();
        let date = parse_date(date_str).ok_or_else(|| PreprocessError::InvalidDate {
            line,
            value: date_str.to_string(),
        })?;

        let quantity_str = row.get(quantity_idx).unwrap_or("").trim();
        let quantity = quantity_str.replace(',', ".").parse::<f64>().map_err(|_| {
            PreprocessError::InvalidQuantity {
                line,
                value: quantity_str.to_string(),
            }
        })?;

        records.push(TrainingRecord {
            product_id,
            date,
            quantity,
        });
    }

    if records.is_empty() {
        return Err(PreprocessError::Empty);
    }

    Ok(records)
}

fn find_column(header: &[String], aliases: &[&str]) -> Result<usize, PreprocessError> {
    header
        .iter()
        .position(|name| aliases.contains(&name.as_str()))
        .ok_or_else(|| PreprocessError::MissingColumn {
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_normalize_canonical_headers() {
        let contents = "\
product_id,date,quantity
P-1,2023-11-01,14
P-1,2023-11-02,9
";
        let file = create_test_file(contents);

        let records = normalize_file(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].product_id, "P-1");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2023, 11, 1).unwrap());
        assert_eq!(records[0].quantity, 14.0);
    }

    #[test]
    fn test_normalize_aliased_headers_and_slash_dates() {
        let contents = "\
KODE_PRODUK,TANGGAL,TOTAL_JUMLAH
P-9,01/11/2023,4
P-9,02/11/2023,6
";
        let file = create_test_file(contents);

        let records = normalize_file(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].product_id, "P-9");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2023, 11, 1).unwrap());
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2023, 11, 2).unwrap());
    }

    #[test]
    fn test_normalize_ignores_extra_columns_and_blank_lines() {
        let contents = "\
store,product_id,date,quantity,notes
S1,P-1,2023-11-01,14,ok
,,,,
S1,P-1,2023-11-02,9,ok
";
        let file = create_test_file(contents);

        let records = normalize_file(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_normalize_missing_column() {
        let contents = "product_id,date\nP-1,2023-11-01\n";
        let file = create_test_file(contents);

        let err = normalize_file(file.path()).unwrap_err();
        assert!(matches!(err, PreprocessError::MissingColumn { .. }));
    }

    #[test]
    fn test_normalize_bad_quantity_reports_line() {
        let contents = "\
product_id,date,quantity
P-1,2023-11-01,many
";
        let file = create_test_file(contents);

        let err = normalize_file(file.path()).unwrap_err();
        match err {
            PreprocessError::InvalidQuantity { line, value } => {
                assert_eq!(line, 2);
                assert_eq!(value, "many");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_normalize_same_file_twice_yields_same_rows() {
        // Ingestion is append-only with no dedup key; the caller appending the
        // same upload twice stores every row twice. Asserted here so the
        // behavior is a recorded decision rather than an accident.
        let contents = "\
product_id,date,quantity
P-1,2023-11-01,14
";
        let file = create_test_file(contents);

        let first = normalize_file(file.path()).unwrap();
        let second = normalize_file(file.path()).unwrap();
        assert_eq!(first, second);
    }
}
