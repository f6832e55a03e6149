use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The reserved name of the test this tool owns on the remote side.
pub const TEST_NAME: &str = "CLI (auto generated)";

/// The reserved name of the script this tool owns on the remote side.
pub const SCRIPT_NAME: &str = "CLI (auto generated)";

/// An identifier assigned by the service.
///
/// The service uses numbers for most resources but this is not guaranteed, so the identifier is
/// kept in the form it was received and sent back the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceId {
    Number(i64),
    Text(String),
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceId::Number(n) => write!(f, "{n}"),
            ResourceId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ResourceId {
    fn from(value: i64) -> Self {
        ResourceId::Number(value)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        match value.parse::<i64>() {
            Ok(n) => ResourceId::Number(n),
            Err(_) => ResourceId::Text(value.to_string()),
        }
    }
}

/// The body of any create call that only reports the new identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    pub id: ResourceId,
}

/// A remote test definition.
///
/// Fields this tool does not know about are kept so that a full overwrite does not drop them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResource {
    pub id: ResourceId,
    /// Empty when the service lists a test without a name.
    #[serde(default, deserialize_with = "string_or_null")]
    pub name: String,
    #[serde(default)]
    pub ui_status: Option<String>,
    #[serde(default)]
    pub last_run: Option<Value>,
    #[serde(default)]
    pub send_email: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TestResource {
    /// Apply the bookkeeping fields the create endpoint does not accept.
    pub fn with_canonical_fields(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self.last_run = None;
        self.send_email = Some(false);
        self.ui_status = Some("NEW".to_string());
        self
    }
}

/// A remote script definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptResource {
    pub id: ResourceId,
    #[serde(default)]
    pub name: Option<String>,
    /// The uploaded artifact the script runs.
    #[serde(default)]
    pub file: Option<ResourceId>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestSummary {
    pub id: ResourceId,
    pub name: String,
    pub description: Option<String>,
}

/// Full overwrite of an existing script, pointing it at a freshly uploaded artifact.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptReload {
    pub id: ResourceId,
    pub name: String,
    pub file: ResourceId,
    pub status: String,
    pub tests: Vec<TestSummary>,
    #[serde(rename = "type")]
    pub script_type: u32,
    pub pacing: Option<f64>,
    pub created_by: String,
    pub created_on: i64,
    pub modified_by: String,
    pub modified_on: i64,
    #[serde(rename = "updatedBy")]
    pub updated_by: String,
    #[serde(rename = "updatedOn")]
    pub updated_on: i64,
}

impl ScriptReload {
    pub fn new(script_id: ResourceId, artifact_id: ResourceId, test_id: ResourceId) -> Self {
        let now = Utc::now().timestamp_millis();

        Self {
            id: script_id,
            name: SCRIPT_NAME.to_string(),
            file: artifact_id,
            status: "FINISHED".to_string(),
            tests: vec![TestSummary {
                id: test_id,
                name: TEST_NAME.to_string(),
                description: None,
            }],
            script_type: 1,
            pacing: None,
            created_by: String::new(),
            created_on: now,
            modified_by: String::new(),
            modified_on: now,
            updated_by: String::new(),
            updated_on: now,
        }
    }
}

/// The association of a script with a test, as listed under the test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptTestLink {
    pub id: ResourceId,
    pub load_script: ResourceId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The load policy carried by a script-test link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkPolicy {
    /// Seconds.
    pub duration: u64,
    pub pacing: f64,
    /// Seconds.
    pub ramp_up: u64,
    /// Seconds.
    pub tear_down: u64,
    pub vusers: u32,
}

impl Default for LinkPolicy {
    /// The policy a link is created with, before the local configuration is applied.
    fn default() -> Self {
        Self {
            duration: 0,
            pacing: 1.0,
            ramp_up: 0,
            tear_down: 0,
            vusers: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pacing {
    pub script_pacing: Option<f64>,
    pub manual_pacing: Option<f64>,
    pub calculated_pacing: f64,
}

/// Body of the link create and link update calls.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptTestLinkPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ResourceId>,
    pub duration: u64,
    pub end_interval: u64,
    pub end_vusers_count: u32,
    pub load_script: ResourceId,
    pub load_test: ResourceId,
    pub modified_by: String,
    pub modified_date: i64,
    pub name: String,
    pub pacing: Pacing,
    pub ramp_up: u64,
    pub start_interval: u64,
    pub start_vusers_count: u32,
    pub tear_down: u64,
    pub time_offset: u64,
    #[serde(rename = "type")]
    pub link_type: u32,
    pub vusers_num: u32,
}

impl ScriptTestLinkPayload {
    pub fn new(
        link_id: Option<ResourceId>,
        test_id: ResourceId,
        script_id: ResourceId,
        name: &str,
        policy: &LinkPolicy,
    ) -> Self {
        Self {
            id: link_id,
            duration: policy.duration,
            end_interval: 0,
            end_vusers_count: 1,
            load_script: script_id,
            load_test: test_id,
            modified_by: String::new(),
            modified_date: Utc::now().timestamp_millis(),
            name: name.to_string(),
            pacing: Pacing {
                script_pacing: None,
                manual_pacing: None,
                calculated_pacing: policy.pacing,
            },
            ramp_up: policy.ramp_up,
            start_interval: 0,
            start_vusers_count: 1,
            tear_down: policy.tear_down,
            time_offset: 0,
            link_type: 1,
            vusers_num: policy.vusers,
        }
    }
}

/// One region of a test's virtual user distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographyEntry {
    pub id: ResourceId,
    pub name: String,
    pub vusers_percent: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRef {
    pub id: ResourceId,
    pub path: PathBuf,
}

/// A launched run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRef {
    pub id: ResourceId,
    pub started_at: DateTime<Utc>,
}

/// The status of a run as reported by the status check call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunStatus {
    pub ui_status: String,
    /// Milliseconds since the epoch.
    #[serde(rename = "loadTestBeginTime", default)]
    pub load_test_begin_time: Option<i64>,
    /// Milliseconds since the epoch.
    #[serde(rename = "loadTestEndTime", default)]
    pub load_test_end_time: Option<i64>,
}

/// A single `(x, y)` sample. `x` is milliseconds since the run began.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TimePoint {
    #[serde(deserialize_with = "number_or_string")]
    pub x: f64,
    #[serde(deserialize_with = "number_or_string")]
    pub y: f64,
}

/// The samples of one metric for one combination of group-by values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Breakdown {
    #[serde(default)]
    pub specifics: Map<String, Value>,
    #[serde(default)]
    pub values: Vec<TimePoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSeries {
    #[serde(default)]
    pub data: Vec<Breakdown>,
}

/// Time series keyed by the metric name used in the query.
pub type TimeSeries = BTreeMap<String, MetricSeries>;

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("number out of range")),
        Value::String(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!(
            "expected a number, got {other}"
        ))),
    }
}
