//! Audit log ingestion and search over HTTP.
//!
//! Producers `POST` events to `/api/ingest`; they are filtered by API name
//! and persisted by an [`storage::EventStore`]. Operators read them back
//! through `/api/query` as JSON, CSV or NDJSON.

pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod filters;
pub mod handlers;
pub mod logging;
pub mod query;
pub mod server;
pub mod signals;
pub mod storage;
pub mod wildcard;
