use crate::kubernetes::WatchSource;
use crate::observers::ObserverList;
use crate::types::{RawEnvelope, Resource, ResourceError, ResourceKey, ResourceKind};
use futures::FutureExt;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay before re-opening a watch stream after it failed or closed.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The server answered the watch request with a non-200 status.
    #[error("invalid status from server: {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed watch line: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("server reported watch error: {0}")]
    Watch(String),
}

impl FeedError {
    /// Fatal errors stop the feed; everything else triggers a reconnect.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FeedError::Rejected { .. })
    }
}

/// What a feed knows, as seen by its observers.
#[derive(Debug)]
pub struct FeedState {
    kind: ResourceKind,
    namespace: Option<String>,
    registry: HashMap<ResourceKey, Resource>,
}

impl FeedState {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Latest instance seen for a resource, across reconnects.
    #[allow(dead_code)]
    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.registry.get(key)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

/// One long-lived watch on a single resource kind.
pub struct Feed<S> {
    source: S,
    state: FeedState,
    observers: ObserverList,
    reconnect_delay: Duration,
}

impl<S: WatchSource> Feed<S> {
    pub fn new(
        source: S,
        kind: ResourceKind,
        namespace: Option<String>,
        observers: ObserverList,
    ) -> Self {
        Self {
            source,
            state: FeedState {
                kind,
                namespace,
                registry: HashMap::new(),
            },
            observers,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    /// Follow the watch endpoint forever, reconnecting on any stream failure.
    ///
    /// Only returns when the server rejects the watch request, with the error
    /// that stopped the feed.
    pub async fn run(&mut self) -> FeedError {
        let kind = self.state.kind;
        loop {
            match self.stream_once().await {
                Ok(()) => info!(%kind, "Watch stream closed by server"),
                Err(err) if err.is_fatal() => {
                    error!(%kind, error = %err, "Watch request rejected, stopping feed");
                    return err;
                }
                Err(err) => warn!(%kind, error = %err, "Failed connection"),
            }
            info!(%kind, resources = self.state.len(), "Reconnecting...");
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn stream_once(&mut self) -> Result<(), FeedError> {
        let mut lines = self
            .source
            .open(self.state.kind, self.state.namespace.as_deref())
            .await?;
        debug!(kind = %self.state.kind, "Watch stream established");

        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let resource = match serde_json::from_str::<RawEnvelope>(&line)? {
                RawEnvelope::Added(object)
                | RawEnvelope::Modified(object)
                | RawEnvelope::Deleted(object) => self.state.kind.decode(object)?,
                RawEnvelope::Bookmark(_) => {
                    debug!(kind = %self.state.kind, "Skipping bookmark");
                    continue;
                }
                RawEnvelope::Error(status) => {
                    return Err(FeedError::Watch(format!("{:?}", status)));
                }
            };
            self.dispatch(resource).await;
        }
        Ok(())
    }

    /// Record the update, then hand it to every observer in order.
    async fn dispatch(&mut self, resource: Resource) {
        let key = resource.key();
        self.state.registry.insert(key.clone(), resource);
        let Some(resource) = self.state.registry.get(&key) else {
            return;
        };

        for observer in self.observers.iter() {
            let outcome = AssertUnwindSafe(observer.observe(resource, &self.state))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(observer = observer.name(), resource = %key, error = %e, "Observer failed");
                }
                Err(_) => {
                    error!(observer = observer.name(), resource = %key, "Observer panicked");
                }
            }
        }
    }
}
