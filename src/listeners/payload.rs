//! Payload type and duplicate-suppression rules.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskError;

/// Key/value record delivered to callbacks.
pub type Payload = serde_json::Map<String, Value>;

/// Key under which the emitting listener's type name is attached.
pub const EVENT_CLASS_KEY: &str = "event-class";

/// Serializes a typed event into a [`Payload`]. The value must serialize to a JSON object.
pub fn to_payload<T: Serialize>(value: &T) -> Result<Payload, TaskError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(TaskError::fail(format!(
            "payload must be an object, got {other}"
        ))),
        Err(e) => Err(TaskError::fail(e.to_string())),
    }
}

/// How consecutive payloads are compared and decorated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupPolicy {
    /// Insert [`EVENT_CLASS_KEY`] into the payload handed to each callback.
    pub attach_event_class: bool,
    /// Take [`EVENT_CLASS_KEY`] into account when comparing with the previous payload.
    pub compare_event_class: bool,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            attach_event_class: true,
            compare_event_class: false,
        }
    }
}

impl DedupPolicy {
    /// Whether `next` repeats `previous`. Empty payloads never do.
    pub fn is_duplicate(&self, previous: Option<&Payload>, next: &Payload) -> bool {
        let Some(previous) = previous else {
            return false;
        };
        if next.is_empty() {
            return false;
        }
        if self.compare_event_class {
            previous == next
        } else {
            eq_ignoring(previous, next, EVENT_CLASS_KEY)
        }
    }

    /// The copy handed to one callback.
    pub fn decorate(&self, payload: Option<&Payload>, class: &str) -> Option<Payload> {
        let mut payload = payload?.clone();
        if self.attach_event_class {
            payload.insert(EVENT_CLASS_KEY.to_string(), Value::String(class.to_string()));
        }
        Some(payload)
    }
}

fn eq_ignoring(a: &Payload, b: &Payload, key: &str) -> bool {
    let width = |m: &Payload| m.len() - usize::from(m.contains_key(key));
    width(a) == width(b)
        && a
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .all(|(k, v)| b.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(v: Value) -> Payload {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn equal_payloads_are_duplicates() {
        let p = payload(json!({"level": 50, "state": "Charging"}));
        assert!(DedupPolicy::default().is_duplicate(Some(&p), &p.clone()));
    }

    #[test]
    fn first_and_empty_payloads_are_never_duplicates() {
        let policy = DedupPolicy::default();
        let p = payload(json!({"level": 50}));
        assert!(!policy.is_duplicate(None, &p));
        assert!(!policy.is_duplicate(Some(&Payload::new()), &Payload::new()));
    }

    #[test]
    fn event_class_is_ignored_by_default() {
        let bare = payload(json!({"level": 50}));
        let tagged = payload(json!({"level": 50, "event-class": "Battery"}));
        assert!(DedupPolicy::default().is_duplicate(Some(&tagged), &bare));

        let strict = DedupPolicy {
            compare_event_class: true,
            ..DedupPolicy::default()
        };
        assert!(!strict.is_duplicate(Some(&tagged), &bare));
    }

    #[test]
    fn decorate_attaches_class_on_a_copy() {
        let p = payload(json!({"level": 50}));
        let out = DedupPolicy::default().decorate(Some(&p), "Battery").expect("some");
        assert_eq!(out["event-class"], json!("Battery"));
        assert!(!p.contains_key(EVENT_CLASS_KEY));

        let plain = DedupPolicy {
            attach_event_class: false,
            ..DedupPolicy::default()
        };
        assert_eq!(plain.decorate(Some(&p), "Battery"), Some(p));
        assert_eq!(plain.decorate(None, "Battery"), None);
    }

    #[test]
    fn non_object_is_not_a_payload() {
        #[derive(Serialize)]
        struct Level {
            level: u8,
        }
        assert_eq!(to_payload(&Level { level: 3 }).unwrap()["level"], json!(3));
        assert!(to_payload(&5u8).is_err());
    }
}
