//! Pumps the server push stream into a [`PushChannel`](triage_core::channel::PushChannel).
//!
//! One JSON event per line, bare or behind an SSE `data:` prefix; any other
//! line is skipped.

use crate::http::HttpBackend;
use crate::Result;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use triage_core::channel::{PushChannel, PushMessage};

/// Counters for one connection of the event feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub dispatched: usize,
    pub unhandled: usize,
    pub skipped: usize,
}

/// Pumps the server push stream into a [`PushChannel`].
pub struct EventFeed {
    backend: HttpBackend,
    channel: Arc<PushChannel>,
}

impl EventFeed {
    pub fn new(backend: HttpBackend, channel: Arc<PushChannel>) -> Self {
        Self { backend, channel }
    }

    /// Connect and dispatch messages until the server closes the stream.
    ///
    /// The channel is marked connected while the stream is open.
    pub async fn run(&self) -> Result<FeedSummary> {
        let resp = self.backend.open_events().await?;
        let body = resp.bytes_stream().map_err(std::io::Error::other);
        pump(StreamReader::new(Box::pin(body)), &self.channel).await
    }

    /// Run the feed on a background task.
    pub fn spawn(self) -> JoinHandle<Result<FeedSummary>> {
        tokio::spawn(async move {
            let result = self.run().await;
            match &result {
                Ok(summary) => tracing::info!(
                    dispatched = summary.dispatched,
                    skipped = summary.skipped,
                    "event feed closed"
                ),
                Err(e) => tracing::warn!(error = %e, "event feed failed"),
            }
            result
        })
    }
}

struct Connected<'a>(&'a PushChannel);

impl Drop for Connected<'_> {
    fn drop(&mut self) {
        self.0.set_connected(false);
    }
}

/// Read `reader` line by line, dispatching every parseable message.
pub async fn pump<R>(reader: R, channel: &PushChannel) -> Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    channel.set_connected(true);
    let _connected = Connected(channel);

    let mut summary = FeedSummary::default();
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Some(message) => {
                if channel.dispatch(&message) {
                    summary.dispatched += 1;
                } else {
                    summary.unhandled += 1;
                }
            }
            None => summary.skipped += 1,
        }
    }
    Ok(summary)
}

/// Decode one line of the push stream.
///
/// Accepts a bare JSON message or an SSE `data:` line. Other SSE fields and
/// unparseable lines yield `None`.
pub fn parse_line(line: &str) -> Option<PushMessage> {
    let line = line.trim();
    let json = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if line.starts_with('{') => line,
        None => {
            tracing::trace!(line, "ignoring non-data line");
            return None;
        }
    };
    match serde_json::from_str(json) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::debug!(error = %e, line, "skipping unparseable push message");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use triage_core::channel::{ProgressEvent, ACTION_MESSAGE_TYPE};

    #[test]
    fn parse_line_accepts_json_and_sse_data() {
        let bare = parse_line(r#"{"type":"action","processed":1}"#).unwrap();
        assert_eq!(bare.kind, "action");
        let sse = parse_line(r#"data: {"type":"status"}"#).unwrap();
        assert_eq!(sse.kind, "status");
        assert!(parse_line("event: message").is_none());
        assert!(parse_line(": keep-alive").is_none());
        assert!(parse_line("data: {oops").is_none());
        assert!(parse_line(r#"{"no_type":true}"#).is_none());
    }

    #[tokio::test]
    async fn pump_dispatches_and_tracks_connection() {
        let channel = PushChannel::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let observer = Arc::clone(&channel);
        let _sub = channel.subscribe(ACTION_MESSAGE_TYPE, move |m| {
            let event = ProgressEvent::from_message(m).unwrap();
            sink.lock()
                .unwrap()
                .push((event.processed, observer.is_connected()));
        });

        let id = uuid::Uuid::new_v4();
        let body = format!(
            "{{\"type\":\"action\",\"request_id\":\"{id}\",\"processed\":1,\"total\":2}}\n\
             \n\
             garbage\n\
             data: {{\"type\":\"action\",\"request_id\":\"{id}\",\"processed\":2,\"total\":2}}\n\
             {{\"type\":\"status\"}}\n"
        );
        let summary = pump(body.as_bytes(), &channel).await.unwrap();

        assert_eq!(
            summary,
            FeedSummary {
                dispatched: 2,
                unhandled: 1,
                skipped: 1
            }
        );
        assert_eq!(*received.lock().unwrap(), vec![(1, true), (2, true)]);
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn run_streams_from_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", crate::http::EVENTS_PATH)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: {\"type\":\"ping\"}\n\ndata: {\"type\":\"ping\"}\n\n")
            .create_async()
            .await;

        let channel = PushChannel::new();
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let _sub = channel.subscribe("ping", move |_| *counter.lock().unwrap() += 1);

        let backend =
            HttpBackend::new(&server.url(), None, std::time::Duration::from_secs(5)).unwrap();
        let summary = EventFeed::new(backend, Arc::clone(&channel))
            .spawn()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.dispatched, 2);
        assert_eq!(*hits.lock().unwrap(), 2);
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn run_surfaces_status_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", crate::http::EVENTS_PATH)
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let channel = PushChannel::new();
        let backend =
            HttpBackend::new(&server.url(), None, std::time::Duration::from_secs(5)).unwrap();
        let err = EventFeed::new(backend, Arc::clone(&channel))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, crate::ClientError::Status { status: 401, .. }));
        assert!(!channel.is_connected());
    }
}
