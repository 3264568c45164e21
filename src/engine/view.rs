// View state owned by the sync engine
//
// Domain types plus the pure row-mapping, ordering, and validation helpers
// the engine composes. Everything here is synchronous and network-free.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::util::time::parse_timestamp;

/// Default free-text column for topics created without explicit columns.
pub const DEFAULT_EVENT_COLUMN: &str = "Event Description";

/// First column of every topic schema.
pub const TIMESTAMP_HEADER: &str = "Timestamp";

/// A named table within the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Unique key, case-sensitive, exact-match.
    pub title: String,
    pub sheet_id: i64,
}

/// One data row within a topic's table.
///
/// Events are never mutated in place; only append and delete exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Derived identity: `<topicTitle>-<zeroBasedRowOffset>`.
    pub id: String,
    pub timestamp: String,
    /// Values keyed by header name, excluding the timestamp column.
    pub fields: BTreeMap<String, String>,
    /// 1-based physical row in the remote table; row 1 is the header, so
    /// data rows start at 2.
    pub row_number: u32,
}

/// Transient draft of an event being composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    /// Optional custom timestamp in wire format; blank means "now".
    pub custom_timestamp: String,
    /// Values keyed by header name.
    pub fields: HashMap<String, String>,
}

impl EventDraft {
    pub fn is_empty(&self) -> bool {
        self.custom_timestamp.is_empty() && self.fields.is_empty()
    }
}

/// Everything the client renders, owned by the engine and replaced only
/// through its operations.
#[derive(Debug, Default)]
pub struct ViewState {
    pub topics: Vec<Topic>,
    /// Title of the selected topic.
    pub selected_topic: Option<String>,
    pub headers: Vec<String>,
    pub events: Vec<EventRecord>,
    pub draft: EventDraft,
    /// The single dismissible user-facing message.
    pub error: Option<String>,
    pub initial_loading: bool,
    pub fetching_topics: bool,
    pub fetching_headers: bool,
    pub fetching_events: bool,
}

impl ViewState {
    /// Sheet id of the selected topic, when it is still in the collection.
    pub fn selected_sheet_id(&self) -> Option<i64> {
        let selected = self.selected_topic.as_deref()?;
        self.topics
            .iter()
            .find(|t| t.title == selected)
            .map(|t| t.sheet_id)
    }

    /// Drop all topic-derived state; used by sign-out and store changes.
    pub fn clear_derived(&mut self) {
        self.topics.clear();
        self.selected_topic = None;
        self.headers.clear();
        self.events.clear();
        self.draft = EventDraft::default();
    }
}

/// Compose a header row from a comma-separated column list.
///
/// Columns are trimmed and empties dropped; no columns at all falls back to
/// the default free-text column. The timestamp column always comes first.
pub fn compose_header_row(columns: &str) -> Vec<String> {
    let mut headers = vec![TIMESTAMP_HEADER.to_string()];
    let user_columns: Vec<String> = columns
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if user_columns.is_empty() {
        headers.push(DEFAULT_EVENT_COLUMN.to_string());
    } else {
        headers.extend(user_columns);
    }
    headers
}

/// Build the row to append: timestamp first, then one value per schema
/// column in order, missing fields as empty strings.
pub fn build_event_row(
    headers: &[String],
    timestamp: &str,
    fields: &HashMap<String, String>,
) -> Vec<String> {
    headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            if index == 0 {
                timestamp.to_string()
            } else {
                fields.get(header).cloned().unwrap_or_default()
            }
        })
        .collect()
}

/// Map raw store rows (row 2 onward) into event records for a topic.
///
/// Cells are keyed by the matching header; rows wider than the known schema
/// fall back to spreadsheet column names so the data stays visible.
pub fn map_event_rows(topic: &str, headers: &[String], rows: Vec<Vec<String>>) -> Vec<EventRecord> {
    rows.into_iter()
        .enumerate()
        .map(|(offset, row)| {
            let timestamp = row.first().cloned().unwrap_or_default();
            let fields = row
                .into_iter()
                .enumerate()
                .skip(1)
                .map(|(index, value)| {
                    let key = headers
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| format!("Column {}", column_letter(index)));
                    (key, value)
                })
                .collect();
            EventRecord {
                id: format!("{topic}-{offset}"),
                timestamp,
                fields,
                row_number: offset as u32 + 2,
            }
        })
        .collect()
}

/// Sort events newest first. Rows whose timestamp fails to parse sort after
/// all valid ones and keep their original relative order.
pub fn sort_events_newest_first(events: &mut [EventRecord]) {
    // Stable sort, so equal keys (both invalid) never reorder.
    events.sort_by(|a, b| {
        match (parse_timestamp(&a.timestamp), parse_timestamp(&b.timestamp)) {
            (Some(ta), Some(tb)) => tb.cmp(&ta),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}

/// Spreadsheet-style column name for a 0-based column index.
fn column_letter(index: usize) -> String {
    let mut name = String::new();
    let mut n = index;
    loop {
        name.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    name
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
