// Typed wrapper over the Sheets v4 REST surface
//
// The client is session-unaware: callers pass the bearer token for every
// call and are responsible for only calling while signed in. Failures carry
// the HTTP status plus the message embedded in the store's error body so
// they can be classified downstream.

use async_trait::async_trait;
use reqwest::Url;

use super::error::StoreError;
use super::types::{
    add_sheet_request, delete_row_request, delete_sheet_request, extract_error_message,
    header_range, header_write_range, two_column_events_range, BatchUpdateRequest,
    BatchUpdateResponse, SpreadsheetMeta, ValueBody, ValueRange,
};
use crate::engine::Topic;

/// Production endpoint for the tabular store.
pub const SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";

/// Which columns an event read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadWindow {
    /// Columns A:B from row 2 onward, regardless of schema width.
    TwoColumn,
    /// The whole sheet; the caller-facing result still starts at row 2.
    FullSheet,
}

/// Async interface to the remote tabular store.
///
/// Implemented by [`SheetsClient`] in production and by mocks in engine
/// tests.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the store's topics in store-defined order. An empty store is an
    /// empty vec, not an error.
    async fn list_topics(&self, token: &str, store_id: &str) -> Result<Vec<Topic>, StoreError>;

    /// Read the header row of a topic. A missing row is an empty vec.
    async fn get_header_row(
        &self,
        token: &str,
        store_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Read raw event rows from row 2 onward.
    async fn get_event_rows(
        &self,
        token: &str,
        store_id: &str,
        topic: &str,
        window: ReadWindow,
    ) -> Result<Vec<Vec<String>>, StoreError>;

    /// Append one event row; the store picks the insertion point.
    async fn append_event_row(
        &self,
        token: &str,
        store_id: &str,
        topic: &str,
        values: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Delete exactly the physical row at 1-based `row_number`.
    async fn delete_event_row(
        &self,
        token: &str,
        store_id: &str,
        sheet_id: i64,
        row_number: u32,
    ) -> Result<(), StoreError>;

    /// Create a topic sheet and write its header row, returning the new
    /// sheet id.
    async fn create_topic(
        &self,
        token: &str,
        store_id: &str,
        title: &str,
        header_row: &[String],
    ) -> Result<i64, StoreError>;
}

/// Sheets v4 client.
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl SheetsClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: SHEETS_BASE_URL.to_string(),
            api_key: None,
        }
    }

    /// Point the client at a different endpoint (builder pattern).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a preconfigured HTTP client (builder pattern).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Send an API key with every call (builder pattern).
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Build a URL from path segments, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| StoreError::transport(e.to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StoreError::transport("base URL cannot have path segments"))?;
            for segment in segments {
                path.push(segment);
            }
        }
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    /// Turn a non-success response into a StoreError carrying the embedded
    /// message.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::new(
            Some(status.as_u16()),
            extract_error_message(&body),
        ))
    }

    async fn get_values(
        &self,
        token: &str,
        store_id: &str,
        range: &str,
    ) -> Result<Vec<Vec<String>>, StoreError> {
        let url = self.url(&["v4", "spreadsheets", store_id, "values", range])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        let response = Self::check(response).await?;
        let parsed: ValueRange = response
            .json()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        Ok(parsed.into_rows())
    }

    async fn batch_update(
        &self,
        token: &str,
        store_id: &str,
        body: &BatchUpdateRequest,
    ) -> Result<BatchUpdateResponse, StoreError> {
        let url = self.url(&["v4", "spreadsheets", &format!("{store_id}:batchUpdate")])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))
    }
}

impl Default for SheetsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for SheetsClient {
    async fn list_topics(&self, token: &str, store_id: &str) -> Result<Vec<Topic>, StoreError> {
        let mut url = self.url(&["v4", "spreadsheets", store_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets(properties(title,sheetId))");
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        let response = Self::check(response).await?;
        let meta: SpreadsheetMeta = response
            .json()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|sheet| Topic {
                title: sheet.properties.title,
                sheet_id: sheet.properties.sheet_id,
            })
            .collect())
    }

    async fn get_header_row(
        &self,
        token: &str,
        store_id: &str,
        topic: &str,
    ) -> Result<Vec<String>, StoreError> {
        let rows = self
            .get_values(token, store_id, &header_range(topic))
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn get_event_rows(
        &self,
        token: &str,
        store_id: &str,
        topic: &str,
        window: ReadWindow,
    ) -> Result<Vec<Vec<String>>, StoreError> {
        match window {
            ReadWindow::TwoColumn => {
                self.get_values(token, store_id, &two_column_events_range(topic))
                    .await
            }
            ReadWindow::FullSheet => {
                // The whole-sheet read includes the header row; drop it.
                let rows = self.get_values(token, store_id, topic).await?;
                Ok(rows.into_iter().skip(1).collect())
            }
        }
    }

    async fn append_event_row(
        &self,
        token: &str,
        store_id: &str,
        topic: &str,
        values: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut url = self.url(&[
            "v4",
            "spreadsheets",
            store_id,
            "values",
            &format!("{topic}:append"),
        ])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&ValueBody {
                values: vec![values],
            })
            .send()
            .await
            .map_err(|e| StoreError::transport(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_event_row(
        &self,
        token: &str,
        store_id: &str,
        sheet_id: i64,
        row_number: u32,
    ) -> Result<(), StoreError> {
        let body = BatchUpdateRequest {
            requests: vec![delete_row_request(sheet_id, row_number)],
        };
        self.batch_update(token, store_id, &body).await?;
        Ok(())
    }

    async fn create_topic(
        &self,
        token: &str,
        store_id: &str,
        title: &str,
        header_row: &[String],
    ) -> Result<i64, StoreError> {
        // Step 1: create the sheet sized to the header.
        let body = BatchUpdateRequest {
            requests: vec![add_sheet_request(title, header_row.len() as u32)],
        };
        let response = self.batch_update(token, store_id, &body).await?;
        let sheet_id = response
            .replies
            .first()
            .and_then(|reply| reply.add_sheet.as_ref())
            .map(|added| added.properties.sheet_id)
            .ok_or_else(|| {
                StoreError::new(None, "Could not get sheetId for new sheet.")
            })?;

        // Step 2: write the header row. The sheet already exists at this
        // point, so a failure here compensates by deleting it again rather
        // than leaving a headerless sheet behind.
        let mut url = self.url(&[
            "v4",
            "spreadsheets",
            store_id,
            "values",
            &header_write_range(title),
        ])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let write = async {
            let response = self
                .http
                .put(url)
                .bearer_auth(token)
                .json(&ValueBody {
                    values: vec![header_row.to_vec()],
                })
                .send()
                .await
                .map_err(|e| StoreError::transport(e.to_string()))?;
            Self::check(response).await?;
            Ok::<(), StoreError>(())
        };

        if let Err(err) = write.await {
            let rollback = BatchUpdateRequest {
                requests: vec![delete_sheet_request(sheet_id)],
            };
            if let Err(rollback_err) = self.batch_update(token, store_id, &rollback).await {
                crate::warn!(
                    "Failed to roll back sheet {} after header write error: {}",
                    sheet_id,
                    rollback_err
                );
            }
            return Err(err);
        }

        Ok(sheet_id)
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
