use crate::console::Console;
use crate::feed::FeedState;
use crate::notify::Notifier;
use crate::types::{Container, Event, Pod, Resource};
use crate::utils::{Palette, format_time};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered observers shared by every feed.
pub type ObserverList = Arc<[Arc<dyn Observer>]>;

/// Optional notification channel, fixed at startup.
pub type SharedNotifier = Option<Arc<dyn Notifier>>;

/// Reacts to every resource update a feed decodes.
#[async_trait]
pub trait Observer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn observe(&self, resource: &Resource, feed: &FeedState) -> anyhow::Result<()>;
}

/// Default watermark: one minute before process start.
pub fn default_since() -> DateTime<Utc> {
    Utc::now() - TimeDelta::minutes(1)
}

/// Roughly one in this many observations sweeps expired suppression keys.
const SWEEP_ONE_IN: u32 = 100;

fn retention() -> TimeDelta {
    TimeDelta::hours(1)
}

/// Watermark plus a map of recently emitted alert keys.
///
/// `since` never moves: once a key has been recorded it stays suppressed
/// until a sweep drops it, about an hour later.
pub struct SuppressionWindow {
    since: DateTime<Utc>,
    seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SuppressionWindow {
    pub fn new(since: DateTime<Utc>) -> Self {
        Self {
            since,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_fresh(&self, time: DateTime<Utc>) -> bool {
        time > self.since
    }

    /// Amortized cleanup: approximately every 100 observations, drop keys
    /// older than an hour.
    pub fn sweep(&self) {
        if fastrand::u32(..SWEEP_ONE_IN) == 0 {
            self.purge_older_than(Utc::now() - retention());
        }
    }

    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) {
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, emitted| *emitted >= cutoff);
        debug!(purged = before - seen.len(), "Swept suppression keys");
    }

    /// Returns true and records the key if it has not been emitted since the watermark.
    pub fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Utc::now())
    }

    pub fn admit_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut seen = self.seen.lock();
        if seen.get(key).is_some_and(|emitted| *emitted > self.since) {
            return false;
        }
        seen.insert(key.to_string(), now);
        true
    }
}

/// Best-effort delivery; failures are logged and never reach the caller.
async fn notify(notifier: &SharedNotifier, text: &str) {
    let Some(notifier) = notifier else {
        return;
    };
    if let Err(e) = notifier.send_message(text).await {
        warn!(error = %e, "Failed to send notification");
    }
}

/// Prints one line per fresh resource update, skipping exact repeats.
pub struct ConsolePrinter {
    window: SuppressionWindow,
    palette: Palette,
    console: Console,
}

impl ConsolePrinter {
    pub fn new(since: DateTime<Utc>, palette: Palette, console: Console) -> Self {
        Self {
            window: SuppressionWindow::new(since),
            palette,
            console,
        }
    }
}

#[async_trait]
impl Observer for ConsolePrinter {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn observe(&self, resource: &Resource, _feed: &FeedState) -> anyhow::Result<()> {
        self.window.sweep();
        // Pods have no last-seen time and are always shown
        if resource
            .last_seen()
            .is_some_and(|seen| !self.window.is_fresh(seen))
        {
            return Ok(());
        }
        let line = self.palette.resource_line(resource);
        if self.window.admit(&line) {
            self.console.print(&[line]);
        }
        Ok(())
    }
}

/// Alerts once per node on kubelet `SystemOOM` events.
pub struct SystemOomAlerter {
    window: SuppressionWindow,
    palette: Palette,
    console: Console,
    notifier: SharedNotifier,
}

impl SystemOomAlerter {
    pub fn new(
        since: DateTime<Utc>,
        palette: Palette,
        console: Console,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            window: SuppressionWindow::new(since),
            palette,
            console,
            notifier,
        }
    }
}

#[async_trait]
impl Observer for SystemOomAlerter {
    fn name(&self) -> &'static str {
        "system-oom"
    }

    async fn observe(&self, resource: &Resource, _feed: &FeedState) -> anyhow::Result<()> {
        self.window.sweep();
        let Resource::Event(event) = resource else {
            return Ok(());
        };
        if event.reason != "SystemOOM" || !self.window.is_fresh(event.last_seen) {
            return Ok(());
        }
        let node = event.source_node.as_deref().unwrap_or("unknown");
        if !self.window.admit(node) {
            debug!(node, "Suppressing repeated system OOM");
            return Ok(());
        }

        self.console.print(&[
            self.palette.banner("SYSTEM OOM"),
            format!("Node: {}", node),
            format!("Killed: {}", format_time(&event.last_seen)),
            self.palette.rule(),
        ]);
        let msg = [
            ":rotating_light: *System OOM* :rotating_light:".to_string(),
            format!("Node: {}", node),
        ]
        .join("\n");
        notify(&self.notifier, &msg).await;
        Ok(())
    }
}

/// Alerts once per pod on `FailedKillPod` events.
pub struct FailedPodKillAlerter {
    window: SuppressionWindow,
    palette: Palette,
    console: Console,
    notifier: SharedNotifier,
}

impl FailedPodKillAlerter {
    pub fn new(
        since: DateTime<Utc>,
        palette: Palette,
        console: Console,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            window: SuppressionWindow::new(since),
            palette,
            console,
            notifier,
        }
    }

    fn slack_message(event: &Event) -> String {
        [
            ":super_saiyan: *Failed to kill pod* :super_saiyan:".to_string(),
            format!("Namespace: {}", event.namespace),
            format!("Pod: {}", event.name),
            format!("```{}```", event.message.replace('\n', " ")),
        ]
        .join("\n")
    }
}

#[async_trait]
impl Observer for FailedPodKillAlerter {
    fn name(&self) -> &'static str {
        "failed-pod-kill"
    }

    async fn observe(&self, resource: &Resource, _feed: &FeedState) -> anyhow::Result<()> {
        self.window.sweep();
        let Resource::Event(event) = resource else {
            return Ok(());
        };
        if event.reason != "FailedKillPod" || !self.window.is_fresh(event.last_seen) {
            return Ok(());
        }
        let key = event.key().to_string();
        if !self.window.admit(&key) {
            debug!(pod = %key, "Suppressing repeated failed pod kill");
            return Ok(());
        }

        self.console.print(&[
            self.palette.banner("Failed to kill pod"),
            format!("Pod: {}", event.name),
            format!("Killed: {}", format_time(&event.last_seen)),
            event.message.clone(),
            self.palette.rule(),
        ]);
        notify(&self.notifier, &Self::slack_message(event)).await;
        Ok(())
    }
}

/// Alerts on containers terminated with `OOMKilled` after the watermark.
///
/// There is no suppression: every pod update carrying the kill alerts again.
pub struct PodOomAlerter {
    since: DateTime<Utc>,
    palette: Palette,
    console: Console,
    notifier: SharedNotifier,
}

impl PodOomAlerter {
    pub fn new(
        since: DateTime<Utc>,
        palette: Palette,
        console: Console,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            since,
            palette,
            console,
            notifier,
        }
    }

    async fn alert(&self, pod: &Pod, container: &Container, killed: DateTime<Utc>) {
        self.console.print(&[
            self.palette.banner("OOM KILLED"),
            format!("Pod: {}", pod.name),
            format!("Container: {}", container.name),
            format!("Killed: {}", format_time(&killed)),
            self.palette.rule(),
        ]);
        let msg = [
            ":dead-docker: *POD OOM* :dead-docker:".to_string(),
            format!("Namespace: {}", pod.namespace),
            format!("Pod: {}", pod.name),
            format!("Container: {}", container.name),
        ]
        .join("\n");
        notify(&self.notifier, &msg).await;
    }
}

#[async_trait]
impl Observer for PodOomAlerter {
    fn name(&self) -> &'static str {
        "pod-oom"
    }

    async fn observe(&self, resource: &Resource, _feed: &FeedState) -> anyhow::Result<()> {
        let Resource::Pod(pod) = resource else {
            return Ok(());
        };
        for container in pod.containers.iter().filter(|c| c.is_oom_killed()) {
            debug!(
                pod = %pod.key(),
                container = %container.name,
                image = container.spec.image.as_deref().unwrap_or("?"),
                restarts = container.status.as_ref().map_or(0, |s| s.restart_count),
                "Container terminated by OOM killer"
            );
            match container.finished_at() {
                Some(killed) if killed > self.since => self.alert(pod, container, killed).await,
                Some(_) => {}
                None => debug!(
                    pod = %pod.key(),
                    container = %container.name,
                    "OOM kill without finish time"
                ),
            }
        }
        Ok(())
    }
}

/// The standard observer chain: console first, then the alerters.
pub fn default_observers(
    since: DateTime<Utc>,
    palette: Palette,
    console: Console,
    notifier: SharedNotifier,
) -> ObserverList {
    Arc::new([
        Arc::new(ConsolePrinter::new(since, palette, console.clone())) as Arc<dyn Observer>,
        Arc::new(PodOomAlerter::new(
            since,
            palette,
            console.clone(),
            notifier.clone(),
        )),
        Arc::new(SystemOomAlerter::new(
            since,
            palette,
            console.clone(),
            notifier.clone(),
        )),
        Arc::new(FailedPodKillAlerter::new(since, palette, console, notifier)),
    ])
}
