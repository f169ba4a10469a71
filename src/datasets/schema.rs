//! Canonical column types for the home sales dataset.
//!
//! The CSV schema is inferred from the file and then the columns the
//! benchmark queries depend on are pinned to fixed types, so every layout
//! reads the same values regardless of what inference guessed.

use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::sync::Arc;

use crate::HarnessError;

/// Columns every benchmark query can rely on, with their canonical types.
pub const REQUIRED_COLUMNS: &[(&str, DataType)] = &[
    ("date", DataType::Date32),
    ("date_built", DataType::Int64),
    ("price", DataType::Float64),
    ("bedrooms", DataType::Int64),
    ("bathrooms", DataType::Float64),
    ("floors", DataType::Float64),
    ("sqft_living", DataType::Int64),
    ("view", DataType::Int64),
];

fn canonical_type(name: &str) -> Option<&'static DataType> {
    REQUIRED_COLUMNS
        .iter()
        .find(|(column, _)| *column == name)
        .map(|(_, data_type)| data_type)
}

/// Pin required columns to their canonical types, keeping every other column
/// (and the file's column order) as inferred.
///
/// All fields are nullable: blank CSV cells are read as nulls, not errors.
pub fn normalize_schema(inferred: &Schema) -> Result<SchemaRef, HarnessError> {
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| inferred.field_with_name(name).is_err())
        .collect();

    if !missing.is_empty() {
        return Err(HarnessError::DatasetUnavailable(format!(
            "dataset is missing required column(s): {}",
            missing.join(", ")
        )));
    }

    let fields: Vec<Field> = inferred
        .fields()
        .iter()
        .map(|field| {
            let data_type = canonical_type(field.name())
                .cloned()
                .unwrap_or_else(|| field.data_type().clone());
            Field::new(field.name(), data_type, true)
        })
        .collect();

    Ok(Arc::new(Schema::new(fields)))
}
