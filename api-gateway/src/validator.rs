// ==============================================================================
// validator.rs - File Upload Validation (API Gateway)
// ==============================================================================
// Description: Validates uploaded sales files at API layer before writing to disk
// Author: Matt Barham
// Created: 2026-02-11
// Modified: 2026-03-20
// Version: 1.0.0
// Security: Allowlist-only file types, size limits, filename sanitization
// ==============================================================================

use anyhow::Result;
use axum::body::Bytes;
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader};
use tracing::{debug, info};

// Maximum upload size (enforced at validation layer)
const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024; // 50 MB

/// Extensions accepted for sales data uploads
const ALLOWED_EXTENSIONS: [&str; 2] = ["csv", "txt"];

#[derive(Debug)]
pub struct ValidatedFile {
    pub original_name: String,
    pub safe_name: String,
    pub extension: String,
    pub size: usize,
    pub hash_sha256: String,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

pub struct FileValidator;

impl FileValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate file upload from multipart form data
    pub fn validate_upload(&self, filename: &str, file_data: &Bytes) -> Result<ValidatedFile> {
        info!("Validating upload: {}", filename);

        // 1. Size check (BEFORE any processing)
        let size = file_data.len();
        if size == 0 {
            anyhow::bail!("File is empty");
        }
        if size > MAX_UPLOAD_SIZE {
            anyhow::bail!(
                "File too large: {} bytes (max: {} bytes)",
                size,
                MAX_UPLOAD_SIZE
            );
        }
        debug!("Size check passed: {} bytes", size);

        // 2. Filename sanitization
        let safe_name = self.sanitize_filename(filename)?;
        debug!("Sanitized filename: {}", safe_name);

        // 3. Extension check (allowlist)
        let ext = self.get_extension(&safe_name)?;
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            anyhow::bail!("Invalid file type: .{}", ext);
        }
        debug!("Extension check passed: .{}", ext);

        // 4. Content validation (basic format check)
        self.validate_content(file_data)?;
        debug!("Content validation passed");

        // 5. Compute SHA-256 hash
        let hash = self.compute_sha256(file_data);
        debug!("SHA-256: {}", hash);

        Ok(ValidatedFile {
            original_name: filename.to_string(),
            safe_name,
            extension: ext,
            size,
            hash_sha256: hash,
            validated_at: chrono::Utc::now(),
        })
    }

    pub fn sanitize_filename(&self, name: &str) -> Result<String> {
        // Remove path separators, null bytes, control characters
        let safe = name
            .replace(['/', '\\', '\0'], "_")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.' || *c == '-')
            .collect::<String>();

        // Limit length to 255 characters
        let truncated: String = safe.chars().take(255).collect();

        // Must not be empty after sanitization
        if truncated.is_empty() {
            anyhow::bail!("Invalid filename after sanitization");
        }

        // Must not start with . (hidden file)
        if truncated.starts_with('.') {
            anyhow::bail!("Filename cannot start with '.'");
        }

        Ok(truncated)
    }

    fn get_extension(&self, filename: &str) -> Result<String> {
        let mut parts = filename.rsplit('.');
        let ext = parts
            .next()
            .map(|s| s.to_lowercase())
            .ok_or_else(|| anyhow::anyhow!("No file extension found"))?;

        if parts.next().is_none() {
            anyhow::bail!("No file extension found");
        }

        Ok(ext)
    }

    /// The file must look like delimited text: a header line with at least
    /// two comma-separated fields
    fn validate_content(&self, data: &Bytes) -> Result<()> {
        let reader = BufReader::new(&data[..]);

        for line in reader.lines().take(10) {
            let line = line.map_err(|_| anyhow::anyhow!("File is not valid text"))?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = line.split(',').count();
            if fields < 2 {
                anyhow::bail!(
                    "Not a delimited sales file: first line has {} column(s)",
                    fields
                );
            }
            return Ok(());
        }

        anyhow::bail!("File contains no data lines")
    }

    fn compute_sha256(&self, data: &Bytes) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        let validator = FileValidator::new();

        assert_eq!(
            validator.sanitize_filename("sales_2024.csv").unwrap(),
            "sales_2024.csv"
        );

        assert_eq!(
            validator.sanitize_filename("weekly export (v2).csv").unwrap(),
            "weeklyexportv2.csv"
        );

        // Traversal attempts collapse to a dot-prefixed name and are rejected
        assert!(validator.sanitize_filename("../../../etc/passwd").is_err());
        assert!(validator.sanitize_filename(".hidden").is_err());
    }

    #[test]
    fn test_extension_allowlist() {
        let validator = FileValidator::new();
        let data = Bytes::from("product_id,date,quantity\nP-1,2024-01-01,3\n");

        assert!(validator.validate_upload("sales.csv", &data).is_ok());
        assert!(validator.validate_upload("sales.txt", &data).is_ok());
        assert!(validator.validate_upload("sales.xlsx", &data).is_err());
        assert!(validator.validate_upload("sales", &data).is_err());
    }

    #[test]
    fn test_size_limits() {
        let validator = FileValidator::new();

        let large_data = Bytes::from(vec![b'a'; MAX_UPLOAD_SIZE + 1]);
        let result = validator.validate_upload("sales.csv", &large_data);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too large"));

        let empty = Bytes::new();
        assert!(validator.validate_upload("sales.csv", &empty).is_err());
    }

    #[test]
    fn test_content_requires_delimited_header() {
        let validator = FileValidator::new();

        let not_csv = Bytes::from("just a sentence with no commas\n");
        assert!(validator.validate_upload("sales.csv", &not_csv).is_err());

        let csv = Bytes::from("TANGGAL,TOTAL_JUMLAH,KODE_PRODUK\n");
        assert!(validator.validate_upload("sales.csv", &csv).is_ok());
    }
}
