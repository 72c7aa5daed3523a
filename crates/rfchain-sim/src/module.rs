//! Module Behaviour Abstraction
//!
//! Every piece of simulated equipment implements [`ModuleBehavior`]. The
//! physics lives behind this trait; presentation adapters only ever read
//! `state()` and `alarms()` and forward user intents to the module's
//! `handle_*` methods.

use rfchain_core::{RfError, RfResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Equipment in the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Gpsdo,
    Lnb,
    Buc,
    Hpa,
    Omt,
    Coupler,
    Filter,
}

impl ModuleKind {
    /// All modules in status-panel order
    pub const ALL: [ModuleKind; 7] = [
        ModuleKind::Gpsdo,
        ModuleKind::Lnb,
        ModuleKind::Buc,
        ModuleKind::Hpa,
        ModuleKind::Omt,
        ModuleKind::Coupler,
        ModuleKind::Filter,
    ];

    /// Key of this module in the persisted front-end state
    pub fn state_key(&self) -> &'static str {
        match self {
            ModuleKind::Gpsdo => "gpsdo",
            ModuleKind::Lnb => "lnb",
            ModuleKind::Buc => "buc",
            ModuleKind::Hpa => "hpa",
            ModuleKind::Omt => "omt",
            ModuleKind::Coupler => "coupler",
            ModuleKind::Filter => "filter",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleKind::Gpsdo => "GPSDO",
            ModuleKind::Lnb => "LNB",
            ModuleKind::Buc => "BUC",
            ModuleKind::Hpa => "HPA",
            ModuleKind::Omt => "OMT",
            ModuleKind::Coupler => "Coupler",
            ModuleKind::Filter => "Filter",
        };
        f.write_str(s)
    }
}

/// Alarm severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSeverity {
    Info,
    Warning,
    Error,
}

/// A displayable alarm. Computed every time it is asked for, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmStatus {
    pub severity: AlarmSeverity,
    pub message: String,
}

impl AlarmStatus {
    pub fn new(severity: AlarmSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    /// Wrap a module alarm string, deriving severity from its text
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            severity: classify_alarm(&message),
            message,
        }
    }
}

/// Phrases that escalate an alarm to `Error`
const ERROR_PHRASES: [&str; 3] = ["over-temperature", "high current", "not operational"];

/// Severity for a module alarm string
pub fn classify_alarm(message: &str) -> AlarmSeverity {
    let lower = message.to_ascii_lowercase();
    if ERROR_PHRASES.iter().any(|p| lower.contains(p)) {
        AlarmSeverity::Error
    } else {
        AlarmSeverity::Warning
    }
}

/// Common interface for simulated RF equipment
pub trait ModuleBehavior {
    /// Plain-data state record, serialized in the persisted shape
    type State: Clone + PartialEq + Serialize + DeserializeOwned;

    fn kind(&self) -> ModuleKind;

    /// Current state (read-only)
    fn state(&self) -> &Self::State;

    /// Active alarm strings
    fn alarms(&self) -> Vec<String>;

    fn is_powered(&self) -> bool;

    /// True when a field that matters to observers differs from `previous`.
    ///
    /// Compared by value with tolerances on jittering quantities, so
    /// tick-to-tick noise does not count as a change.
    fn status_changed(&self, previous: &Self::State) -> bool;

    /// Replace the state wholesale after a merge
    fn apply_state(&mut self, state: Self::State);

    /// Deep-merge a persisted partial state into this module
    fn try_sync(&mut self, partial: &Value) -> RfResult<()> {
        let merged = merge_state(self.state(), partial)?;
        self.apply_state(merged);
        Ok(())
    }
}

/// Deep-merge `partial` over `base` by way of their JSON form.
///
/// Objects merge key by key, anything else replaces. A `null` in the
/// partial leaves the base value untouched.
pub fn merge_state<T>(base: &T, partial: &Value) -> RfResult<T>
where
    T: Serialize + DeserializeOwned,
{
    if !partial.is_object() && !partial.is_null() {
        return Err(RfError::StateMerge(format!(
            "expected an object, got {}",
            partial
        )));
    }
    let mut value = serde_json::to_value(base)?;
    merge_json(&mut value, partial);
    Ok(serde_json::from_value(value)?)
}

/// Recursive JSON merge of `patch` into `target`
pub fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (key, pv) in p {
                match t.get_mut(key) {
                    Some(tv) => merge_json(tv, pv),
                    None => {
                        if !pv.is_null() {
                            t.insert(key.clone(), pv.clone());
                        }
                    }
                }
            }
        }
        (_, Value::Null) => {}
        (t, p) => *t = p.clone(),
    }
}

/// Float comparison used by `status_changed` implementations
pub(crate) fn differs(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() > tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Inner {
        level: f64,
        enabled: bool,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Outer {
        name: String,
        inner: Inner,
    }

    #[test]
    fn test_classify_alarm() {
        assert_eq!(classify_alarm("HPA over-temperature"), AlarmSeverity::Error);
        assert_eq!(classify_alarm("HPA High Current draw"), AlarmSeverity::Error);
        assert_eq!(classify_alarm("LNB not operational"), AlarmSeverity::Error);
        assert_eq!(classify_alarm("GNSS signal lost"), AlarmSeverity::Warning);
    }

    #[test]
    fn test_merge_nested_fields() {
        let base = Outer {
            name: "a".into(),
            inner: Inner {
                level: 1.0,
                enabled: false,
            },
        };
        let merged = merge_state(&base, &json!({"inner": {"enabled": true}})).unwrap();
        assert_eq!(merged.name, "a");
        assert_eq!(merged.inner.level, 1.0);
        assert!(merged.inner.enabled);
    }

    #[test]
    fn test_merge_null_keeps_base() {
        let base = Outer {
            name: "a".into(),
            inner: Inner {
                level: 1.0,
                enabled: false,
            },
        };
        let merged = merge_state(&base, &json!({"name": null})).unwrap();
        assert_eq!(merged, base);
        assert_eq!(merge_state(&base, &Value::Null).unwrap(), base);
    }

    #[test]
    fn test_merge_type_mismatch_fails() {
        let base = Outer {
            name: "a".into(),
            inner: Inner {
                level: 1.0,
                enabled: false,
            },
        };
        assert!(merge_state(&base, &json!({"inner": {"level": "loud"}})).is_err());
        assert!(merge_state(&base, &json!(3)).is_err());
    }

    #[test]
    fn test_module_kind_keys() {
        assert_eq!(ModuleKind::Gpsdo.state_key(), "gpsdo");
        assert_eq!(ModuleKind::Coupler.to_string(), "Coupler");
        assert_eq!(ModuleKind::ALL.len(), 7);
    }
}
