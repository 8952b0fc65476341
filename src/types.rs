use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One line of a watch stream: `{"type": ..., "object": {...}}`.
pub type RawEnvelope = kube::core::WatchEvent<serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("malformed resource document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("resource document is missing {0}")]
    MissingField(&'static str),

    #[error("container {container} must report exactly one state, got {keys:?}")]
    AmbiguousState { container: String, keys: Vec<String> },

    #[error("container {container} reports unknown state {state}")]
    UnknownState { container: String, state: String },
}

/// The watch endpoints a feed can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Pods,
    Events,
}

impl ResourceKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            ResourceKind::Pods => {
                <k8s_openapi::api::core::v1::Pod as k8s_openapi::Resource>::URL_PATH_SEGMENT
            }
            ResourceKind::Events => {
                <k8s_openapi::api::core::v1::Event as k8s_openapi::Resource>::URL_PATH_SEGMENT
            }
        }
    }

    /// Build the typed resource for this kind from a watch envelope's object.
    pub fn decode(self, object: serde_json::Value) -> Result<Resource, ResourceError> {
        match self {
            ResourceKind::Pods => Pod::from_object(object).map(Resource::Pod),
            ResourceKind::Events => Event::from_object(object).map(Resource::Event),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path_segment())
    }
}

/// Registry identity of a resource.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone)]
pub enum Resource {
    Pod(Pod),
    Event(Event),
}

impl Resource {
    pub fn key(&self) -> ResourceKey {
        match self {
            Resource::Pod(pod) => pod.key(),
            Resource::Event(event) => event.key(),
        }
    }

    /// Pods have no natural "last seen" time and always return `None`.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        match self {
            Resource::Pod(_) => None,
            Resource::Event(event) => Some(event.last_seen),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(phase)
    }
}

#[derive(Debug, Clone)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    pub phase: PodPhase,
    pub started_at: DateTime<Utc>,
    pub containers: Vec<Container>,
}

impl Pod {
    pub fn from_object(object: serde_json::Value) -> Result<Self, ResourceError> {
        let raw: RawPod = serde_json::from_value(object)?;
        let namespace = raw
            .metadata
            .namespace
            .ok_or(ResourceError::MissingField("metadata.namespace"))?;
        let name = raw
            .metadata
            .name
            .ok_or(ResourceError::MissingField("metadata.name"))?;
        let started_at = raw
            .metadata
            .creation_timestamp
            .ok_or(ResourceError::MissingField("metadata.creationTimestamp"))?;

        // Each container takes ownership of its own status entry
        let mut statuses: HashMap<String, RawContainerStatus> = raw
            .status
            .container_statuses
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        let containers = raw
            .spec
            .containers
            .into_iter()
            .map(|spec| {
                let status = statuses.remove(&spec.name);
                Container::new(spec, status)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pod {
            namespace,
            name,
            phase: raw.status.phase,
            started_at,
            containers,
        })
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// Pods compare equal when identity and phase match; container detail is ignored.
impl PartialEq for Pod {
    fn eq(&self, other: &Self) -> bool {
        self.namespace == other.namespace && self.name == other.name && self.phase == other.phase
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    #[allow(dead_code)]
    pub ready: bool,
    pub restart_count: i32,
    pub state: ContainerState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Waiting {
        reason: Option<String>,
    },
    Running {
        started_at: Option<DateTime<Utc>>,
    },
    Terminated {
        reason: Option<String>,
        exit_code: Option<i32>,
        finished_at: Option<DateTime<Utc>>,
    },
}

impl ContainerState {
    fn from_raw(
        container: &str,
        raw: BTreeMap<String, RawStateDetail>,
    ) -> Result<Self, ResourceError> {
        let mut entries = raw.into_iter();
        let (state, detail) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (first, second) => {
                return Err(ResourceError::AmbiguousState {
                    container: container.to_string(),
                    keys: first
                        .into_iter()
                        .chain(second)
                        .chain(entries)
                        .map(|(key, _)| key)
                        .collect(),
                });
            }
        };
        match state.as_str() {
            "waiting" => Ok(ContainerState::Waiting {
                reason: detail.reason,
            }),
            "running" => Ok(ContainerState::Running {
                started_at: detail.started_at,
            }),
            "terminated" => Ok(ContainerState::Terminated {
                reason: detail.reason,
                exit_code: detail.exit_code,
                finished_at: detail.finished_at,
            }),
            _ => Err(ResourceError::UnknownState {
                container: container.to_string(),
                state,
            }),
        }
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &'static str {
        match self {
            ContainerState::Waiting { .. } => "waiting",
            ContainerState::Running { .. } => "running",
            ContainerState::Terminated { .. } => "terminated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub name: String,
    pub spec: ContainerSpec,
    pub status: Option<ContainerStatus>,
}

impl Container {
    fn new(spec: ContainerSpec, status: Option<RawContainerStatus>) -> Result<Self, ResourceError> {
        let status = status
            .map(|raw| {
                Ok::<_, ResourceError>(ContainerStatus {
                    ready: raw.ready,
                    restart_count: raw.restart_count,
                    state: ContainerState::from_raw(&spec.name, raw.state)?,
                })
            })
            .transpose()?;
        Ok(Container {
            name: spec.name.clone(),
            spec,
            status,
        })
    }

    pub fn state(&self) -> Option<&ContainerState> {
        self.status.as_ref().map(|s| &s.state)
    }

    pub fn is_oom_killed(&self) -> bool {
        matches!(
            self.state(),
            Some(ContainerState::Terminated { reason: Some(reason), .. }) if reason == "OOMKilled"
        )
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self.state() {
            Some(ContainerState::Terminated { finished_at, .. }) => *finished_at,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub namespace: String,
    pub name: String,
    pub kind: String,
    pub reason: String,
    pub message: String,
    pub count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub source_component: Option<String>,
    pub source_node: Option<String>,
}

impl Event {
    pub fn from_object(object: serde_json::Value) -> Result<Self, ResourceError> {
        let raw: RawEvent = serde_json::from_value(object)?;
        let last_seen = raw
            .last_timestamp
            .or(raw.event_time)
            .or(raw.metadata.creation_timestamp)
            .ok_or(ResourceError::MissingField("lastTimestamp"))?;
        let first_seen = raw.first_timestamp.unwrap_or(last_seen).min(last_seen);

        let source_component = raw.source.component;
        let source_node = match source_component.as_deref() {
            Some("kubelet") => raw.source.host,
            _ => None,
        };

        Ok(Event {
            namespace: raw
                .involved_object
                .namespace
                .unwrap_or_else(|| "???".to_string()),
            name: raw.involved_object.name.unwrap_or_default(),
            kind: raw.involved_object.kind.unwrap_or_default(),
            reason: raw.reason.unwrap_or_default(),
            message: raw.message.unwrap_or_default(),
            count: raw.count.unwrap_or(1),
            first_seen,
            last_seen,
            source_component,
            source_node,
        })
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMeta {
    namespace: Option<String>,
    name: Option<String>,
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RawPod {
    metadata: RawMeta,
    spec: RawPodSpec,
    #[serde(default)]
    status: RawPodStatus,
}

#[derive(Debug, Deserialize)]
struct RawPodSpec {
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPodStatus {
    #[serde(default)]
    phase: PodPhase,
    #[serde(default)]
    container_statuses: Vec<RawContainerStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContainerStatus {
    name: String,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    restart_count: i32,
    #[serde(default)]
    state: BTreeMap<String, RawStateDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStateDetail {
    reason: Option<String>,
    exit_code: Option<i32>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(default)]
    metadata: RawMeta,
    #[serde(default)]
    involved_object: RawObjectReference,
    reason: Option<String>,
    message: Option<String>,
    count: Option<u32>,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
    event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    source: RawEventSource,
}

#[derive(Debug, Default, Deserialize)]
struct RawObjectReference {
    namespace: Option<String>,
    name: Option<String>,
    kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawEventSource {
    component: Option<String>,
    host: Option<String>,
}
