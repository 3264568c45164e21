//! Remote tabular store client.
//!
//! This module wraps the slice of the Sheets v4 REST surface the event log
//! uses: listing sheets (topics), reading header and data ranges, appending
//! rows, deleting rows, and the two-step topic creation. The [`RemoteStore`]
//! trait is the seam the sync engine depends on; [`SheetsClient`] is the
//! production implementation.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ReadWindow, RemoteStore, SheetsClient, SHEETS_BASE_URL};
pub use error::{classify, ErrorClass, StoreError, StoreOp};
