//! `triage-client`: HTTP transport for the triage engine.
//!
//! Implements the engine's external collaborator traits against the console
//! backend's REST API and feeds the server push stream into a
//! [`PushChannel`](triage_core::channel::PushChannel).
//!
//! ```text
//! HttpBackend ── POST /api/v1/search            → SearchBackend
//!             ── POST /api/v1/action/execute    → ActionExecutor
//!             ── GET  /api/v1/action/operations → OperationSource
//!
//! EventFeed   ── GET  /api/v1/events (one JSON message per line) → PushChannel::dispatch
//! ```

pub mod error;
pub mod feed;
pub mod http;

pub use error::ClientError;
pub use feed::{EventFeed, FeedSummary};
pub use http::HttpBackend;

pub type Result<T> = std::result::Result<T, ClientError>;
