use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const FORKED_FROM_APP_ID: &str = "forkedFromAppId";
pub const FORKED_TO_ORG_ID: &str = "forkedToOrgId";
pub const FORKED_FROM_APP_NAME: &str = "forkedFromAppName";
pub const EVENT_DATA: &str = "eventData";

/// Key under which the resolved target workspace is recorded
pub const WORKSPACE_KEY: &str = "workspace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEvent {
    Fork,
}

impl fmt::Display for AnalyticsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyticsEvent::Fork => f.write_str("FORK"),
        }
    }
}

/// Values gathered while a fork runs, forwarded verbatim to analytics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventData(BTreeMap<String, Value>);

impl EventData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each key is written at most once; later writes are ignored and
    /// reported as `false`.
    pub fn insert_once(&mut self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        if self.0.contains_key(&key) {
            tracing::debug!("event data key {} already set, keeping first value", key);
            return false;
        }
        self.0.insert(key, value);
        true
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect::<Map<_, _>>())
    }
}

/// Payload of the fork analytics event.
pub fn fork_payload(
    source_application_id: &str,
    target_workspace_id: &str,
    source_application_name: &str,
    event_data: &EventData,
) -> Value {
    serde_json::json!({
        FORKED_FROM_APP_ID: source_application_id,
        FORKED_TO_ORG_ID: target_workspace_id,
        FORKED_FROM_APP_NAME: source_application_name,
        EVENT_DATA: event_data.to_value(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_once_keeps_first_value() {
        let mut data = EventData::new();
        assert!(data.insert_once(WORKSPACE_KEY, json!({"id": "ws-1"})));
        assert!(!data.insert_once(WORKSPACE_KEY, json!({"id": "ws-2"})));

        assert_eq!(data.len(), 1);
        assert_eq!(data.get(WORKSPACE_KEY), Some(&json!({"id": "ws-1"})));
    }

    #[test]
    fn test_fork_payload_shape() {
        let mut data = EventData::new();
        data.insert_once(WORKSPACE_KEY, json!({"id": "ws-9"}));

        let payload = fork_payload("app-1", "ws-9", "Orders", &data);

        assert_eq!(payload[FORKED_FROM_APP_ID], "app-1");
        assert_eq!(payload[FORKED_TO_ORG_ID], "ws-9");
        assert_eq!(payload[FORKED_FROM_APP_NAME], "Orders");
        assert_eq!(payload[EVENT_DATA][WORKSPACE_KEY]["id"], "ws-9");
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(AnalyticsEvent::Fork.to_string(), "FORK");
        assert_eq!(
            serde_json::to_string(&AnalyticsEvent::Fork).unwrap(),
            "\"FORK\""
        );
    }
}
