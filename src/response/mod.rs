//! Typed multi-part responses produced at turn completion.

pub mod validation;

pub use validation::validate_response;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Result;

/// A scalar table cell.
///
/// Integers that fit `i64` decode as `Int`, larger unsigned ones as `UInt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::UInt(value), Self::Int)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Tabular data: named columns and ordered rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row<I, C>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }
}

/// Declarative figure description, opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub figure: serde_json::Value,
}

impl Chart {
    pub fn new(figure: serde_json::Value) -> Self {
        Self { figure }
    }
}

/// Discriminant of a [`ResponsePart`], for renderer dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartKind {
    Text,
    Table,
    Chart,
}

/// One renderable piece of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponsePart {
    /// Markdown-bearing text.
    Text { content: String },
    Table(Table),
    Chart(Chart),
}

impl ResponsePart {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn kind(&self) -> PartKind {
        match self {
            Self::Text { .. } => PartKind::Text,
            Self::Table(_) => PartKind::Table,
            Self::Chart(_) => PartKind::Chart,
        }
    }
}

impl From<&str> for ResponsePart {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for ResponsePart {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<Table> for ResponsePart {
    fn from(value: Table) -> Self {
        Self::Table(value)
    }
}

impl From<Chart> for ResponsePart {
    fn from(value: Chart) -> Self {
        Self::Chart(value)
    }
}

/// Ordered multi-part terminal result of a turn. Part order is render order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    pub parts: Vec<ResponsePart>,
    /// Marks an intentionally empty response.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub acknowledgement: bool,
}

impl Response {
    pub fn new(parts: Vec<ResponsePart>) -> Self {
        Self {
            parts,
            acknowledgement: false,
        }
    }

    /// A single text part.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![ResponsePart::text(content)])
    }

    /// An intentionally empty response.
    pub fn acknowledgement() -> Self {
        Self {
            parts: Vec::new(),
            acknowledgement: true,
        }
    }

    pub fn with_part(mut self, part: impl Into<ResponsePart>) -> Self {
        self.parts.push(part.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        validate_response(self)
    }

    /// Parts with runs of consecutive text joined by a blank line.
    ///
    /// Renderers that lay out text as one flowing block use this view; the
    /// stored part order is untouched.
    pub fn merged(&self) -> Vec<ResponsePart> {
        let mut merged: Vec<ResponsePart> = Vec::with_capacity(self.parts.len());
        let mut text_buffer: Vec<&str> = Vec::new();

        for part in &self.parts {
            match part {
                ResponsePart::Text { content } => text_buffer.push(content.as_str()),
                other => {
                    if !text_buffer.is_empty() {
                        merged.push(ResponsePart::text(text_buffer.join("\n\n")));
                        text_buffer.clear();
                    }
                    merged.push(other.clone());
                }
            }
        }
        if !text_buffer.is_empty() {
            merged.push(ResponsePart::text(text_buffer.join("\n\n")));
        }
        merged
    }
}

impl From<Vec<ResponsePart>> for Response {
    fn from(parts: Vec<ResponsePart>) -> Self {
        Self::new(parts)
    }
}

impl From<&str> for Response {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for Response {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<Table> for Response {
    fn from(value: Table) -> Self {
        Self::new(vec![value.into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merged_joins_adjacent_text_parts() {
        let response = Response::text("a")
            .with_part("b")
            .with_part(Table::new(["x"]).with_row([1_i64]))
            .with_part("c");

        let merged = response.merged();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], ResponsePart::text("a\n\nb"));
        assert_eq!(merged[1].kind(), PartKind::Table);
        assert_eq!(merged[2], ResponsePart::text("c"));
        assert_eq!(response.parts.len(), 4);
    }

    #[test]
    fn parts_are_tagged_by_kind() {
        let json = serde_json::to_value(ResponsePart::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "text", "content": "hi" }));

        let table = ResponsePart::from(Table::new(["n", "ok"]).with_row([Cell::Int(1), Cell::Bool(true)]));
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["kind"], "table");
        assert_eq!(json["rows"][0], serde_json::json!([1, true]));
        let back: ResponsePart = serde_json::from_value(json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn large_unsigned_cells_keep_precision() {
        let cells: Vec<Cell> = serde_json::from_str("[18446744073709551615, 7, 1.5]").unwrap();
        assert_eq!(cells, vec![Cell::UInt(u64::MAX), Cell::Int(7), Cell::Float(1.5)]);
        assert_eq!(Cell::from(5_u64), Cell::Int(5));
        assert_eq!(serde_json::to_string(&cells[0]).unwrap(), "18446744073709551615");
    }

    #[test]
    fn acknowledgement_flag_is_omitted_when_false() {
        let json = serde_json::to_value(Response::text("done")).unwrap();
        assert!(json.get("acknowledgement").is_none());
        let json = serde_json::to_value(Response::acknowledgement()).unwrap();
        assert_eq!(json["acknowledgement"], true);
    }
}
