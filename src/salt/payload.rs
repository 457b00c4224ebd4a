//! Decoding of raw Salt output into typed payloads.
//!
//! Salt returns loosely typed JSON: a bare string or list when rendering fails,
//! a `data` envelope around runner output, a target-to-records map for
//! `salt <target>` calls, or a flat record map. Everything is decoded here once
//! so the interpreter only ever sees [`StatePayload`].

use serde::Deserialize;
use serde_json::{Map, Value};

/// Separator between the components of a Salt state id.
const ID_SEPARATOR: &str = "_|-";

/// Keys that only ever appear on a state record.
const RECORD_KEYS: &[&str] = &[
    "result",
    "comment",
    "changes",
    "duration",
    "name",
    "__sls__",
    "__run_num__",
    "__id__",
];

/// Keys that may accompany `data` in a runner envelope.
const ENVELOPE_KEYS: &[&str] = &["data", "outputter", "retcode"];

/// A decoded external payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePayload {
    /// Salt reported an error as plain text instead of state results.
    ErrorMessage(String),
    /// Per-resource outcomes, in arbitrary order.
    ResourceMap {
        retcode: Option<i32>,
        records: Vec<ResourceRecord>,
    },
}

/// Outcome of one resource within a state run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub id: String,
    pub name: Option<String>,
    pub sls: Option<String>,
    pub target: Option<String>,
    pub result: bool,
    pub comment: String,
    pub duration: f64,
    pub changes: Value,
    pub run_num: u64,
    pub orchestration: bool,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    comment: Value,
    #[serde(default)]
    duration: Value,
    #[serde(default)]
    changes: Value,
    #[serde(default)]
    name: Value,
    #[serde(rename = "__sls__", default)]
    sls: Option<String>,
    #[serde(rename = "__run_num__", default)]
    run_num: u64,
    #[serde(rename = "__orchestration__", default)]
    orchestration: bool,
}

impl StatePayload {
    /// Decode a raw JSON value.
    ///
    /// `exit_code` is used as the retcode unless the payload embeds its own.
    pub fn decode(value: Value, exit_code: Option<i32>) -> Self {
        match value {
            Value::Object(mut map) => {
                let retcode = map
                    .remove("retcode")
                    .and_then(|v| v.as_i64())
                    .and_then(|v| i32::try_from(v).ok())
                    .or(exit_code);

                if let Some(data) = take_envelope(&mut map) {
                    return match Self::decode(data, retcode) {
                        Self::ResourceMap { records, .. } => Self::ResourceMap { retcode, records },
                        message => message,
                    };
                }

                decode_records(map, retcode)
            }
            other => Self::ErrorMessage(value_text(&other)),
        }
    }

    /// Decode the payload embedded in an orchestration record, if there is one.
    ///
    /// Runner calls that do not return state output are not treated as nested
    /// runs. Text payloads only count when the record itself failed, since that
    /// is how Salt reports a nested render error.
    pub fn embedded(record: &ResourceRecord) -> Option<Self> {
        if !record.orchestration {
            return None;
        }
        let inner = record
            .changes
            .get("ret")
            .or_else(|| record.changes.get("return"))?;

        match inner {
            Value::Object(_) => match Self::decode(inner.clone(), None) {
                payload @ Self::ResourceMap { .. } if !payload.is_empty() => Some(payload),
                payload @ Self::ErrorMessage(_) if !record.result => Some(payload),
                _ => None,
            },
            Value::String(_) | Value::Array(_) if !record.result => {
                Some(Self::decode(inner.clone(), None))
            }
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::ResourceMap { records, .. } if records.is_empty())
    }
}

impl ResourceRecord {
    /// Decode one record, returning `None` when the value is not a JSON object.
    pub fn from_value(id: &str, value: Value, target: Option<&str>) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        let raw: RawRecord = serde_json::from_value(value).ok()?;

        Some(Self {
            id: id.to_string(),
            name: match raw.name {
                Value::Null => None,
                other => Some(value_text(&other)),
            },
            sls: raw.sls,
            target: target.map(str::to_string),
            result: is_truthy(&raw.result),
            comment: value_text(&raw.comment),
            duration: parse_duration(&raw.duration),
            changes: raw.changes,
            run_num: raw.run_num,
            orchestration: raw.orchestration,
        })
    }

    /// State function from the id (`module_|-id_|-name_|-function`).
    pub fn state_function(&self) -> Option<&str> {
        let parts: Vec<&str> = self.id.split(ID_SEPARATOR).collect();
        if parts.len() >= 4 {
            parts.last().copied()
        } else {
            None
        }
    }

    /// Returns true for `salt.function` style calls whose `changes` hold a raw
    /// return value rather than actual changes.
    pub fn is_function_call(&self) -> bool {
        !self.orchestration && self.state_function() == Some("function")
    }

    /// Target or SLS the record came from.
    pub fn namespace(&self) -> Option<String> {
        self.target.clone().or_else(|| self.sls.clone())
    }
}

/// Returns true when a value would be considered "set" by Salt.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Render a value as human text: strings verbatim, lists line by line.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join("\n"),
        other => other.to_string(),
    }
}

fn take_envelope(map: &mut Map<String, Value>) -> Option<Value> {
    if map.contains_key("data") && map.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str())) {
        map.remove("data")
    } else {
        None
    }
}

/// A record carries at least one known key, or has a scalar field that a
/// target map (whose children are all record objects) never would.
fn looks_like_record(value: &Value) -> bool {
    value.as_object().is_some_and(|o| {
        o.keys().any(|k| RECORD_KEYS.contains(&k.as_str())) || !o.values().all(Value::is_object)
    })
}

fn decode_records(map: Map<String, Value>, retcode: Option<i32>) -> StatePayload {
    let mut records = Vec::new();

    for (key, value) in map {
        if looks_like_record(&value) {
            match ResourceRecord::from_value(&key, value, None) {
                Some(record) => records.push(record),
                None => {
                    return StatePayload::ErrorMessage(format!("{key}: malformed state result"));
                }
            }
            continue;
        }

        match value {
            // Target map: minion id -> record map
            Value::Object(inner) => {
                for (id, record) in inner {
                    match ResourceRecord::from_value(&id, record.clone(), Some(&key)) {
                        Some(record) => records.push(record),
                        None => {
                            return StatePayload::ErrorMessage(format!(
                                "{key}: {}",
                                value_text(&record)
                            ));
                        }
                    }
                }
            }
            Value::String(_) | Value::Array(_) => {
                return StatePayload::ErrorMessage(format!("{key}: {}", value_text(&value)));
            }
            other => {
                return StatePayload::ErrorMessage(format!(
                    "Unexpected output for {key}: {other}"
                ));
            }
        }
    }

    StatePayload::ResourceMap { retcode, records }
}

fn parse_duration(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        // Older Salt releases report "12.5 ms"
        Value::String(s) => s
            .trim()
            .trim_end_matches("ms")
            .trim()
            .parse()
            .unwrap_or(0.0),
        _ => 0.0,
    }
}
