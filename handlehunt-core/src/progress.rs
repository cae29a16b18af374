//! Progress delivery.
//!
//! The engine pushes [`ProgressEvent`]s into one or more [`ProgressSink`]s.
//! [`ProgressHub`] is the built-in sink that fans events out to per-handle
//! [`Subscription`]s over a tokio broadcast channel. Delivery failures never
//! affect a scan.

use handlehunt_scanner::SiteDefinition;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

pub const DEFAULT_HUB_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// A new site was confirmed. `found_so_far` is cumulative.
    #[serde(rename = "SEARCH_PROGRESS")]
    Progress {
        handle: String,
        found_so_far: Vec<SiteDefinition>,
        total_sites: usize,
    },
    #[serde(rename = "SEARCH_COMPLETE")]
    Complete {
        handle: String,
        final_found: Vec<SiteDefinition>,
    },
    #[serde(rename = "SEARCH_FAILED")]
    Failed { handle: String, error: String },
}

impl ProgressEvent {
    pub fn handle(&self) -> &str {
        match self {
            ProgressEvent::Progress { handle, .. }
            | ProgressEvent::Complete { handle, .. }
            | ProgressEvent::Failed { handle, .. } => handle,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressEvent::Progress { .. })
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("No subscribers listening for '{0}'")]
    NoSubscribers(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError>;
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) -> Result<(), SinkError> + Send + Sync,
{
    fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self(event)
    }
}

/// Broadcast hub behind [`ScanEngine::subscribe`](crate::engine::ScanEngine::subscribe).
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self, handle: &str) -> Subscription {
        Subscription {
            handle: handle.to_string(),
            rx: self.tx.subscribe(),
            finished: false,
        }
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl ProgressSink for ProgressHub {
    fn emit(&self, event: &ProgressEvent) -> Result<(), SinkError> {
        self.tx
            .send(event.clone())
            .map(|_| ())
            .map_err(|_| SinkError::NoSubscribers(event.handle().to_string()))
    }
}

/// Events for one handle, ending after its terminal event.
pub struct Subscription {
    handle: String,
    rx: broadcast::Receiver<ProgressEvent>,
    finished: bool,
}

impl Subscription {
    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        while !self.finished {
            match self.rx.recv().await {
                Ok(event) if event.handle() == self.handle => {
                    self.finished = event.is_terminal();
                    return Some(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // progress events are cumulative, the next one catches up
                    warn!("Subscriber for '{}' lagged by {} events", self.handle, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                }
            }
        }
        None
    }
}
