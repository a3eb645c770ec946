//! HTTP API handlers for deces-ingest
//!
//! REST routes for submission, run status, statistics and quarantine
//! repair, plus an SSE stream of import events.

pub mod health;
pub mod import;
pub mod quarantine;
pub mod sse;

pub use health::health_routes;
pub use import::import_routes;
pub use quarantine::quarantine_routes;
pub use sse::import_event_stream;
