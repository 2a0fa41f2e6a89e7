// ==============================================================================
// csv_data.rs - Canonical Sales CSV Codec
// ==============================================================================
// Description: Reader/writer for the canonical training-data CSV schema
// Author: Matt Barham
// Created: 2026-02-10
// Modified: 2026-03-20
// Version: 1.1.0
// ==============================================================================
// Format: Comma-delimited with a header row
// Example:
//   product_id,date,quantity
//   P-1042,2023-11-01,14
//   P-1042,2023-11-02,9
// ==============================================================================

use std::path::Path;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{ForecastPoint, TrainingRecord};

/// Canonical header written by [`write_records`] and expected by [`read_records`]
pub const CANONICAL_HEADER: [&str; 3] = ["product_id", "date", "quantity"];

/// Errors that can occur while reading or writing canonical CSV files
#[derive(Error, Debug)]
pub enum CsvDataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid header: expected {expected:?}, found {found:?}")]
    InvalidHeader { expected: Vec<String>, found: Vec<String> },

    #[error("Invalid date value at line {line}: {value}")]
    InvalidDate { line: usize, value: String },

    #[error("Invalid quantity value at line {line}: {value}")]
    InvalidQuantity { line: usize, value: String },

    #[error("File contains a header but no data rows")]
    Empty,
}

/// Read a canonical training-data CSV file
///
/// # Arguments
/// * `path` - Path to a CSV written in the canonical schema (see module header)
///
/// # Returns
/// * `Ok(Vec<TrainingRecord>)` - Parsed rows in file order
/// * `Err(CsvDataError)` - Header mismatch, parse error, or empty file
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<TrainingRecord>, CsvDataError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    if header != CANONICAL_HEADER {
        return Err(CsvDataError::InvalidHeader {
            expected: CANONICAL_HEADER.iter().map(|h| h.to_string()).collect(),
            found: header,
        });
    }

    let mut records = Vec::new();

    for (index, row) in reader.records().enumerate() {
        // Header is line 1, first data row is line 2
        let line = index + 2;
        let row = row?;

        let product_id = row.get(0).unwrap_or("").trim().to_string();
        let date_str = row.get(1).unwrap_or("").trim();
        let quantity_str = row.get(2).unwrap_or("").trim();

        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
            CsvDataError::InvalidDate {
                line,
                value: date_str.to_string(),
            }
        })?;

        let quantity = quantity_str.parse::<f64>().map_err(|_| {
            CsvDataError::InvalidQuantity {
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
        return Err(CsvDataError::Empty);
    }

    Ok(records)
}

/// Write training records as a canonical CSV file (used for job staging files)
pub fn write_records(
    path: impl AsRef<Path>,
    records: &[TrainingRecord],
) -> Result<(), CsvDataError> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;

    writer.write_record(CANONICAL_HEADER)?;
    for record in records {
        let date = record.date.format("%Y-%m-%d").to_string();
        let quantity = record.quantity.to_string();
        writer.write_record([record.product_id.as_str(), date.as_str(), quantity.as_str()])?;
    }
    writer.flush()?;

    Ok(())
}

/// Write forecast points as a downloadable result artifact
pub fn write_forecast(
    path: impl AsRef<Path>,
    product_id: &str,
    points: &[ForecastPoint],
) -> Result<(), CsvDataError> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;

    writer.write_record(["product_id", "date", "forecast_quantity"])?;
    for point in points {
        let date = point.date.format("%Y-%m-%d").to_string();
        let quantity = point.quantity.to_string();
        writer.write_record([product_id, date.as_str(), quantity.as_str()])?;
    }
    writer.flush()?;

    Ok(())
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
    fn test_read_valid_file() {
        let contents = "\
product_id,date,quantity
P-1042,2023-11-01,14
P-1042,2023-11-02,9.5
P-7,2023-11-02,3
";
        let file = create_test_file(contents);

        let records = read_records(file.path()).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].product_id, "P-1042");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2023, 11, 1).unwrap());
        assert_eq!(records[1].quantity, 9.5);
        assert_eq!(records[2].product_id, "P-7");
    }

    #[test]
    fn test_read_rejects_wrong_header() {
        let contents = "id,day,amount\nP-1,2023-11-01,4\n";
        let file = create_test_file(contents);

        let err = read_records(file.path()).unwrap_err();
        assert!(matches!(err, CsvDataError::InvalidHeader { .. }));
    }

    #[test]
    fn test_read_reports_bad_date_with_line() {
        let contents = "\
product_id,date,quantity
P-1,2023-11-01,4
P-1,01/11/2023,5
";
        let file = create_test_file(contents);

        let err = read_records(file.path()).unwrap_err();
        match err {
            CsvDataError::InvalidDate { line, value } => {
                assert_eq!(line, 3);
                assert_eq!(value, "01/11/2023");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_rejects_header_only_file() {
        let file = create_test_file("product_id,date,quantity\n");

        let err = read_records(file.path()).unwrap_err();
        assert!(matches!(err, CsvDataError::Empty));
    }

    #[test]
    fn test_write_then_read_preserves_rows() {
        let records = vec![
            TrainingRecord {
                product_id: "P-1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                quantity: 7.0,
            },
            TrainingRecord {
                product_id: "P-1".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                quantity: 11.0,
            },
        ];

        let file = NamedTempFile::new().unwrap();
        write_records(file.path(), &records).unwrap();

        let read_back = read_records(file.path()).unwrap();
        assert_eq!(read_back, records);
    }
}
