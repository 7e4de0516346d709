//! Feed sources
//!
//! Transport is out of scope for the engine: a source only hands over
//! decoded book events in venue order.

use std::future::Future;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::{Event, FeedMessage};
use crate::error::{IngestError, Result};

/// Ordered stream of book events
pub trait FeedSource {
    /// Next book event, or `None` once the feed is exhausted.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<Event>>> + Send;
}

/// Replays newline-delimited venue messages from a reader
pub struct ReplayFeed<R> {
    lines: Lines<R>,
    line_number: u64,
    skipped: u64,
}

impl ReplayFeed<BufReader<File>> {
    /// Replay a recorded feed file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| {
            IngestError::Feed(format!("Failed to open {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Replaying feed file");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl ReplayFeed<BufReader<Stdin>> {
    /// Replay messages piped on standard input
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send> ReplayFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            skipped: 0,
        }
    }

    /// Lines that could not be decoded
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<R: AsyncBufRead + Unpin + Send> FeedSource for ReplayFeed<R> {
    async fn next_event(&mut self) -> Result<Option<Event>> {
        while let Some(line) = self
            .lines
            .next_line()
            .await
            .map_err(|e| IngestError::Feed(e.to_string()))?
        {
            self.line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let message = match FeedMessage::parse(line) {
                Ok(message) => message,
                Err(e) => {
                    self.skipped += 1;
                    warn!(line = self.line_number, error = %e, "Skipping undecodable feed message");
                    continue;
                }
            };

            match message {
                FeedMessage::Subscriptions { channels } => {
                    info!(channels = %channels, "Subscription confirmed");
                }
                FeedMessage::Heartbeat { .. } => {
                    trace!(line = self.line_number, "Heartbeat");
                }
                FeedMessage::Error { message, reason } => {
                    warn!(message = %message, reason = ?reason, "Venue reported an error");
                }
                FeedMessage::Unknown => {
                    debug!(line = self.line_number, "Ignoring unhandled message type");
                }
                book => {
                    if let Some(event) = book.into_event() {
                        return Ok(Some(event));
                    }
                }
            }
        }

        Ok(None)
    }
}

/// Feed backed by an in-process channel
pub struct ChannelFeed {
    receiver: mpsc::Receiver<Event>,
}

impl ChannelFeed {
    /// Create a feed and the sender that drives it
    pub fn new(capacity: usize) -> (mpsc::Sender<Event>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self { receiver })
    }
}

impl FeedSource for ChannelFeed {
    async fn next_event(&mut self) -> Result<Option<Event>> {
        Ok(self.receiver.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::SnapshotEvent;

    #[tokio::test]
    async fn test_replay_skips_noise() {
        let input = concat!(
            r#"{"type":"subscriptions","channels":[{"name":"level2"}]}"#,
            "\n\n",
            "garbage\n",
            r#"{"type":"snapshot","product_id":"BTC-USD","bids":[["100.50","2"]],"asks":[]}"#,
            "\n",
            r#"{"type":"heartbeat","sequence":1}"#,
            "\n",
            r#"{"type":"l2update","product_id":"BTC-USD","changes":[["buy","100.50","0"]]}"#,
            "\n",
        );

        let mut feed = ReplayFeed::new(BufReader::new(input.as_bytes()));

        let first = feed.next_event().await.unwrap().unwrap();
        assert!(matches!(first, Event::Snapshot(_)));

        let second = feed.next_event().await.unwrap().unwrap();
        assert!(matches!(second, Event::Incremental(_)));

        assert!(feed.next_event().await.unwrap().is_none());
        assert_eq!(feed.skipped(), 1);
    }

    #[tokio::test]
    async fn test_replay_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.ndjson");
        std::fs::write(
            &path,
            r#"{"type":"snapshot","product_id":"ETH-USD","bids":[],"asks":[["10","1"]]}"#,
        )
        .unwrap();

        let mut feed = ReplayFeed::open(&path).await.unwrap();
        let event = feed.next_event().await.unwrap().unwrap();
        assert_eq!(event.instrument(), "ETH-USD");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let err = ReplayFeed::open("/nonexistent/feed.ndjson").await.err().unwrap();
        assert!(matches!(err, IngestError::Feed(_)));
    }

    #[tokio::test]
    async fn test_channel_feed() {
        let (sender, mut feed) = ChannelFeed::new(4);
        sender
            .send(Event::Snapshot(SnapshotEvent::new("BTC-USD", &[], &[])))
            .await
            .unwrap();
        drop(sender);

        assert!(feed.next_event().await.unwrap().is_some());
        assert!(feed.next_event().await.unwrap().is_none());
    }
}
