// Sheets v4 wire types and request builders
//
// Only the slice of the API surface this client uses. Request builders are
// pure so row-index arithmetic and range strings can be tested without a
// network.

use serde::{Deserialize, Serialize};

// ============================================================
// Responses
// ============================================================

/// Response to a spreadsheet metadata fetch, filtered down to sheet
/// titles and ids via the `fields` query parameter.
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadsheetMeta {
    #[serde(default)]
    pub sheets: Vec<SheetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetEntry {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub title: String,
    pub sheet_id: i64,
}

/// A `values.get` response. An empty range omits `values` entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueRange {
    #[serde(default)]
    pub values: Option<Vec<Vec<serde_json::Value>>>,
}

impl ValueRange {
    /// Rows as plain strings; non-string cells are stringified.
    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.values
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect()
    }
}

fn cell_to_string(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchUpdateResponse {
    #[serde(default)]
    pub replies: Vec<BatchUpdateReply>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpdateReply {
    pub add_sheet: Option<AddSheetReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddSheetReply {
    pub properties: SheetProperties,
}

/// Standard Google error body: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Pull the embedded error message out of a response body, falling back to
/// the raw text when the body is not the standard error envelope.
pub fn extract_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
        _ => body.trim().to_string(),
    }
}

// ============================================================
// Requests
// ============================================================

/// One entry of a batchUpdate request. Exactly one field is set; the others
/// stay out of the serialized body.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_sheet: Option<AddSheetRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_dimension: Option<DeleteDimensionRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_sheet: Option<DeleteSheetRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdateRequest {
    pub requests: Vec<Request>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddSheetRequest {
    pub properties: NewSheetProperties,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSheetProperties {
    pub title: String,
    pub grid_properties: GridProperties,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    pub row_count: u32,
    pub column_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDimensionRequest {
    pub range: DimensionRange,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRange {
    pub sheet_id: i64,
    pub dimension: String,
    pub start_index: u32,
    pub end_index: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSheetRequest {
    pub sheet_id: i64,
}

/// Body for a `values.update` / `values.append` call.
#[derive(Debug, Clone, Serialize)]
pub struct ValueBody {
    pub values: Vec<Vec<String>>,
}

// ============================================================
// Range strings and request builders
// ============================================================

/// Range covering the entire first row of a topic sheet.
pub fn header_range(topic: &str) -> String {
    format!("{topic}!1:1")
}

/// Fixed two-column data range: row 2 onward, columns A and B.
pub fn two_column_events_range(topic: &str) -> String {
    format!("{topic}!A2:B")
}

/// Target cell for the header write of a new topic.
pub fn header_write_range(topic: &str) -> String {
    format!("{topic}!A1")
}

/// addSheet request for a new topic: one (header) row, one column per
/// header.
pub fn add_sheet_request(title: &str, column_count: u32) -> Request {
    Request {
        add_sheet: Some(AddSheetRequest {
            properties: NewSheetProperties {
                title: title.to_string(),
                grid_properties: GridProperties {
                    row_count: 1,
                    column_count,
                },
            },
        }),
        ..Default::default()
    }
}

/// deleteDimension request removing exactly the physical row at 1-based
/// `row_number`, expressed as a half-open 0-based index range.
pub fn delete_row_request(sheet_id: i64, row_number: u32) -> Request {
    Request {
        delete_dimension: Some(DeleteDimensionRequest {
            range: DimensionRange {
                sheet_id,
                dimension: "ROWS".to_string(),
                start_index: row_number.saturating_sub(1),
                end_index: row_number,
            },
        }),
        ..Default::default()
    }
}

/// deleteSheet request, used to compensate a failed topic creation.
pub fn delete_sheet_request(sheet_id: i64) -> Request {
    Request {
        delete_sheet: Some(DeleteSheetRequest { sheet_id }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
