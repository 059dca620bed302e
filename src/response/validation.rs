//! Validate a terminal response before it is committed.

use std::collections::HashSet;

use crate::error::{Result, TurnError};

use super::{Cell, Chart, Response, ResponsePart, Table};

/// Validate a response.
///
/// A response must have at least one part unless it is an explicit
/// acknowledgement, and each part's payload must match its kind. Returns the
/// first violation found as [`TurnError::Validation`].
pub fn validate_response(response: &Response) -> Result<()> {
    if response.parts.is_empty() && !response.acknowledgement {
        return Err(TurnError::validation(
            "response has no parts and is not an acknowledgement",
        ));
    }

    for (index, part) in response.parts.iter().enumerate() {
        let outcome = match part {
            ResponsePart::Text { .. } => Ok(()),
            ResponsePart::Table(table) => validate_table(table),
            ResponsePart::Chart(chart) => validate_chart(chart),
        };
        outcome.map_err(|message| {
            TurnError::validation(format!("part {index} ({}): {message}", part.kind()))
        })?;
    }

    Ok(())
}

fn validate_table(table: &Table) -> std::result::Result<(), String> {
    if table.columns.is_empty() {
        return Err("table has no columns".to_string());
    }

    let mut seen = HashSet::new();
    for name in &table.columns {
        if name.trim().is_empty() {
            return Err("table has an empty column name".to_string());
        }
        if !seen.insert(name.as_str()) {
            return Err(format!("duplicate column '{name}'"));
        }
    }

    for (row_index, row) in table.rows.iter().enumerate() {
        if row.len() != table.columns.len() {
            return Err(format!(
                "row {row_index} has {} cells, expected {}",
                row.len(),
                table.columns.len()
            ));
        }
        if let Some(col) = row
            .iter()
            .position(|cell| matches!(cell, Cell::Float(v) if !v.is_finite()))
        {
            return Err(format!(
                "row {row_index} column '{}' holds a non-finite float",
                table.columns[col]
            ));
        }
    }

    Ok(())
}

fn validate_chart(chart: &Chart) -> std::result::Result<(), String> {
    if !chart.figure.is_object() {
        return Err(format!(
            "chart figure must be an object, got {}",
            json_type_name(&chart.figure)
        ));
    }
    Ok(())
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
