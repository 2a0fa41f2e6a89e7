// ==============================================================================
// models.rs - Demand Data Models
// ==============================================================================
// Description: Data structures shared by the ingest and forecasting paths
// Author: Matt Barham
// Created: 2026-02-09
// Modified: 2026-02-23
// Version: 1.0.0
// ==============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One historical sales observation for a product on a calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    /// Product identifier (opaque string, e.g. "P-1042")
    pub product_id: String,

    /// Observation date
    pub date: NaiveDate,

    /// Units sold on that date
    pub quantity: f64,
}

/// One forecasted future observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Forecast date (strictly after the last training date)
    pub date: NaiveDate,

    /// Predicted units
    pub quantity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_record_date_serializes_iso() {
        let record = TrainingRecord {
            product_id: "P-1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            quantity: 12.0,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2024-01-05");
    }
}
