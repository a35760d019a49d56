use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize)]
pub struct JsonOut<T: Serialize> {
    pub ok: bool,
    pub data: T,
}

/// One declared service from the stack file. Parameters keep the insertion
/// order of the declarative source.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub name: String,
    pub enabled: bool,
    pub params: Vec<(String, ParamValue)>,
}

impl ServiceDefinition {
    /// Template id for this service: the `template` parameter when present,
    /// otherwise the service name.
    pub fn template_id(&self) -> &str {
        for (k, v) in &self.params {
            if k == "template" {
                if let ParamValue::String(s) = v {
                    return s;
                }
            }
        }
        &self.name
    }
}

/// Closed variant type for parameter values. The stack file is open-ended
/// key/value, but every value is one of these — never an untyped bag.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    String(String),
    Int(i64),
    Bool(bool),
    /// Indirection to a key in the encrypted vault (`!secret <key>` in YAML).
    SecretRef(String),
    Map(Vec<(String, ParamValue)>),
}

/// Immutable per-run global variables. Built once from the stack file and
/// passed explicitly into config resolution — no process-wide singleton.
#[derive(Debug, Clone, Default)]
pub struct GlobalContext {
    pub vars: Vec<(String, ParamValue)>,
}

impl GlobalContext {
    /// Per-service convergence timeout in seconds (`converge_timeout` global).
    pub fn converge_timeout_secs(&self) -> u64 {
        for (k, v) in &self.vars {
            if k == "converge_timeout" {
                if let ParamValue::Int(n) = v {
                    if *n > 0 {
                        return *n as u64;
                    }
                }
            }
        }
        DEFAULT_CONVERGE_TIMEOUT_SECS
    }
}

pub const DEFAULT_CONVERGE_TIMEOUT_SECS: u64 = 300;

/// A resolved context value: scalars are stringified at resolution time so
/// rendering is a pure text substitution.
#[derive(Debug, Clone, PartialEq)]
pub enum CtxValue {
    Str(String),
    Map(BTreeMap<String, CtxValue>),
}

/// Merged evaluation context for one service render. Holds resolved secrets,
/// so it is never serialized or logged.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    values: BTreeMap<String, CtxValue>,
}

impl RenderContext {
    pub fn insert(&mut self, key: String, value: CtxValue) {
        self.values.insert(key, value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Look up a possibly dotted path (`db.host`) through nested maps.
    pub fn lookup(&self, path: &str) -> Option<&CtxValue> {
        let mut parts = path.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            match current {
                CtxValue::Map(m) => current = m.get(part)?,
                CtxValue::Str(_) => return None,
            }
        }
        Some(current)
    }
}

/// Rendered runtime definition for one service.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub service: String,
    pub content: String,
    /// sha256 of the rendered bytes, hex-encoded.
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Unchanged,
    Applied,
    WouldApply,
    ConfigFailed,
    RenderFailed,
    ApplyFailed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Unchanged => "unchanged",
            OutcomeStatus::Applied => "applied",
            OutcomeStatus::WouldApply => "would_apply",
            OutcomeStatus::ConfigFailed => "config_failed",
            OutcomeStatus::RenderFailed => "render_failed",
            OutcomeStatus::ApplyFailed => "apply_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OutcomeStatus::ConfigFailed | OutcomeStatus::RenderFailed | OutcomeStatus::ApplyFailed
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub service: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Outcome {
    pub fn new(service: &str, status: OutcomeStatus) -> Self {
        Self {
            service: service.to_string(),
            status,
            detail: None,
        }
    }

    pub fn with_detail(service: &str, status: OutcomeStatus, detail: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            status,
            detail: Some(detail.into()),
        }
    }
}

/// Aggregated result of one reconciliation run. Outcomes are in registry
/// order; `aborted` is set when a fatal mid-run condition (engine
/// unavailable, cancellation) stopped the remaining services.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn record(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn success(&self) -> bool {
        self.aborted.is_none() && !self.outcomes.iter().any(|o| o.status.is_failure())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    Running,
    Stopped,
    PartiallyRunning,
    Unknown,
}

impl RunningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunningState::Running => "running",
            RunningState::Stopped => "stopped",
            RunningState::PartiallyRunning => "partially_running",
            RunningState::Unknown => "unknown",
        }
    }
}

#[derive(Serialize)]
pub struct StatusRow {
    pub service: String,
    pub state: RunningState,
}

#[derive(Serialize)]
pub struct ServiceRow {
    pub service: String,
    pub enabled: bool,
    pub template: String,
}

#[derive(Serialize)]
pub struct CheckItem {
    pub service: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize)]
pub struct CheckReport {
    pub overall: String,
    pub items: Vec<CheckItem>,
}
