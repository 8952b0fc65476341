//! Builders and doubles shared by the unit tests.

use crate::feed::{FeedError, FeedState};
use crate::kubernetes::{LineStream, WatchSource};
use crate::observers::Observer;
use crate::types::{Resource, ResourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    rfc3339.parse().expect("valid timestamp")
}

pub fn envelope(kind: &str, object: Value) -> String {
    json!({ "type": kind, "object": object }).to_string()
}

pub fn pod_object(namespace: &str, name: &str, phase: &str, statuses: Value) -> Value {
    json!({
        "kind": "Pod",
        "apiVersion": "v1",
        "metadata": {
            "namespace": namespace,
            "name": name,
            "creationTimestamp": "2024-03-01T09:00:00Z"
        },
        "spec": {"containers": [{"name": "app"}, {"name": "sidecar"}]},
        "status": {"phase": phase, "containerStatuses": statuses}
    })
}

pub fn pod_line(namespace: &str, name: &str, phase: &str) -> String {
    envelope("ADDED", pod_object(namespace, name, phase, json!([])))
}

pub fn oom_pod_line(namespace: &str, name: &str, container: &str, finished_at: &str) -> String {
    let statuses = json!([{
        "name": container,
        "ready": false,
        "restartCount": 1,
        "state": {"terminated": {"reason": "OOMKilled", "exitCode": 137, "finishedAt": finished_at}}
    }]);
    envelope("MODIFIED", pod_object(namespace, name, "Running", statuses))
}

pub fn event_line(
    namespace: &str,
    name: &str,
    reason: &str,
    message: &str,
    last_seen: &str,
    node: &str,
) -> String {
    envelope(
        "ADDED",
        json!({
            "kind": "Event",
            "apiVersion": "v1",
            "metadata": {"namespace": namespace, "name": format!("{}.17b", name)},
            "involvedObject": {"kind": "Pod", "namespace": namespace, "name": name},
            "reason": reason,
            "message": message,
            "count": 1,
            "firstTimestamp": last_seen,
            "lastTimestamp": last_seen,
            "source": {"component": "kubelet", "host": node}
        }),
    )
}

pub fn bookmark_line() -> String {
    envelope(
        "BOOKMARK",
        json!({"kind": "Pod", "apiVersion": "v1", "metadata": {"resourceVersion": "4711"}}),
    )
}

pub fn error_line() -> String {
    envelope(
        "ERROR",
        json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": "too old resource version: 1 (4711)",
            "reason": "Expired",
            "code": 410
        }),
    )
}

/// What one call to `open` yields.
pub enum Connection {
    Lines(Vec<Result<String, FeedError>>),
    Reject { status: u16, message: String },
}

impl Connection {
    pub fn lines<I: IntoIterator<Item = String>>(lines: I) -> Self {
        Connection::Lines(lines.into_iter().map(Ok).collect())
    }

    /// Lines followed by a dropped connection.
    pub fn dropped<I: IntoIterator<Item = String>>(lines: I) -> Self {
        let mut items: Vec<_> = lines.into_iter().map(Ok).collect();
        items.push(Err(FeedError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ))));
        Connection::Lines(items)
    }

    pub fn forbidden() -> Self {
        Connection::Reject {
            status: 403,
            message: "pods is forbidden: User \"system:anonymous\" cannot watch resource".to_string(),
        }
    }
}

/// Plays back scripted connections; once exhausted every open is rejected.
#[derive(Default)]
pub struct ScriptedSource {
    connections: Mutex<VecDeque<Connection>>,
    opened: AtomicUsize,
}

impl ScriptedSource {
    pub fn new<I: IntoIterator<Item = Connection>>(connections: I) -> Arc<Self> {
        Arc::new(Self {
            connections: Mutex::new(connections.into_iter().collect()),
            opened: AtomicUsize::new(0),
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatchSource for Arc<ScriptedSource> {
    async fn open(
        &self,
        _kind: ResourceKind,
        _namespace: Option<&str>,
    ) -> Result<LineStream, FeedError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let next = self.connections.lock().pop_front();
        match next {
            Some(Connection::Lines(lines)) => Ok(stream::iter(lines).boxed()),
            Some(Connection::Reject { status, message }) => {
                Err(FeedError::Rejected { status, message })
            }
            None => Err(FeedError::Rejected {
                status: 410,
                message: "script exhausted".to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
}

/// Observer that appends `<name>:<namespace>/<name>` to a shared log.
pub struct Recorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    behavior: Behavior,
}

impl Recorder {
    pub fn new(
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        behavior: Behavior,
    ) -> Arc<dyn Observer> {
        Arc::new(Self {
            name,
            log,
            behavior,
        })
    }
}

#[async_trait]
impl Observer for Recorder {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn observe(&self, resource: &Resource, feed: &FeedState) -> anyhow::Result<()> {
        assert!(feed.get(&resource.key()).is_some(), "registry updated first");
        self.log.lock().push(format!("{}:{}", self.name, resource.key()));
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => anyhow::bail!("{} refused", self.name),
            Behavior::Panic => panic!("{} blew up", self.name),
        }
    }
}
