//! On-disk table schema.
//!
//! The Parquet file is long-format: one row per (timestamp, symbol), sorted
//! by timestamp then symbol. Timestamps are UTC epoch milliseconds; field
//! values are nullable so widened columns survive a round trip.

use polars::prelude::*;

pub const TIMESTAMP: &str = "timestamp";
pub const SYMBOL: &str = "symbol";

/// Expected schema of the store table.
pub struct BarSchema;

impl BarSchema {
    pub fn timestamp_dtype() -> DataType {
        DataType::Datetime(TimeUnit::Milliseconds, None)
    }

    pub fn schema() -> Schema {
        let mut fields = vec![
            Field::new(TIMESTAMP.into(), Self::timestamp_dtype()),
            Field::new(SYMBOL.into(), DataType::String),
        ];
        fields.extend(
            crate::domain::Field::ALL
                .iter()
                .map(|f| Field::new(f.name().into(), DataType::Float64)),
        );
        Schema::from_iter(fields)
    }

    /// Check that every expected column exists with the expected type.
    /// Extra columns are tolerated and ignored.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
            if actual_dtype != field.dtype() {
                return Err(SchemaError::TypeMismatch {
                    column: field.name().to_string(),
                    expected: field.dtype().clone(),
                    actual: actual_dtype.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
