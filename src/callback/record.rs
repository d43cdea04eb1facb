//! The begin record written at the start of every event scope.

use chrono::Utc;
use serde_json::Value as JsonValue;

use super::censor::is_truthy;
use super::config::{EventsConfig, JobIds, DEFAULT_MAX_EVENT_RES};
use super::types::{generate_uuid, Attributes, EventName};
use crate::error::Result;

/// Flags that name the event when a record carries no `event` key.
const FALLBACK_EVENT_FLAGS: [&str; 6] = [
    "debug",
    "verbose",
    "deprecated",
    "warning",
    "system_warning",
    "error",
];

/// Record-level settings shared by every event of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOptions {
    /// Job identifiers stamped into each record
    pub job_ids: JobIds,
    /// `res` payloads longer than this (serialized) are emptied
    pub max_event_res: usize,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            job_ids: JobIds::default(),
            max_event_res: DEFAULT_MAX_EVENT_RES,
        }
    }
}

impl From<&EventsConfig> for RecordOptions {
    fn from(config: &EventsConfig) -> Self {
        Self {
            job_ids: config.job_ids.clone(),
            max_event_res: config.max_event_res,
        }
    }
}

/// A fully resolved event record, immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    payload: Attributes,
}

impl EventRecord {
    /// Resolve a context snapshot into the record written by `dump_begin`.
    ///
    /// Identity fields are only filled in when the snapshot lacks them, so a
    /// caller-supplied `uuid` survives.
    pub fn begin(mut payload: Attributes, counter: u64, options: &RecordOptions) -> Self {
        for (key, id) in options.job_ids.fields() {
            payload.insert(key.to_string(), JsonValue::from(id));
        }

        set_default(&mut payload, "uuid", || JsonValue::String(generate_uuid()));
        set_default(&mut payload, "pid", || JsonValue::from(std::process::id()));
        set_default(&mut payload, "created", || {
            JsonValue::String(Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
        });
        set_default(&mut payload, "counter", || JsonValue::from(counter));

        let has_event = payload.get("event").map_or(false, is_truthy);
        if !has_event {
            let name = FALLBACK_EVENT_FLAGS
                .iter()
                .find(|flag| payload.get(**flag).map_or(false, is_truthy))
                .copied()
                .unwrap_or("verbose");
            payload.insert("event".to_string(), JsonValue::String(name.to_string()));
        }

        let is_stats = payload.get("event").and_then(JsonValue::as_str)
            == Some(EventName::PlaybookOnStats.as_str());
        if !is_stats {
            if let Some(res) = payload.get_mut("res") {
                if res.to_string().len() > options.max_event_res {
                    *res = JsonValue::Object(Default::default());
                }
            }
        }

        Self { payload }
    }

    /// Event name of this record.
    pub fn event(&self) -> &str {
        self.payload
            .get("event")
            .and_then(JsonValue::as_str)
            .unwrap_or("verbose")
    }

    /// Record identifier.
    pub fn uuid(&self) -> Option<&str> {
        self.payload.get("uuid").and_then(JsonValue::as_str)
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.payload.get(key)
    }

    /// All fields, in insertion order.
    pub fn payload(&self) -> &Attributes {
        &self.payload
    }

    /// Consume the record and return its fields.
    pub fn into_payload(self) -> Attributes {
        self.payload
    }

    /// Serialize the record as compact JSON.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.payload)?)
    }
}

fn set_default(payload: &mut Attributes, key: &str, value: impl FnOnce() -> JsonValue) {
    if !payload.contains_key(key) {
        payload.insert(key.to_string(), value());
    }
}
