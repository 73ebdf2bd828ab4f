//! Decoded events and the read-only view the builtins query.
//!
//! An event is one YAML document from the monitor. Message events carry
//! the topic they came from and a base64 payload; every event carries a
//! snapshot of the node graph.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize};

use crate::decoder::DecodeError;

/// Accept a missing list, `null`, or a list with null entries.
fn string_list<'de, D>(d: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<Option<String>>>::deserialize(d)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}

fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ──────────────────────────────────────────────
// Wire model
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosService {
    #[serde(default, deserialize_with = "nullable")]
    pub service: String,
    #[serde(default, deserialize_with = "string_list")]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosTopic {
    #[serde(default, deserialize_with = "nullable")]
    pub topic: String,
    /// The first entry is the message type, `pkg/msg/Type`
    #[serde(default, deserialize_with = "string_list")]
    pub parameters: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub publishers: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub subscribers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosNode {
    #[serde(default, deserialize_with = "nullable")]
    pub node: String,
    #[serde(default, deserialize_with = "string_list")]
    pub gids: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub services: Vec<RosService>,
}

impl RosNode {
    pub fn has_service(&self, name: &str) -> bool {
        self.services.iter().any(|s| s.service == name)
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.service.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosContext {
    #[serde(default, deserialize_with = "nullable")]
    pub nodes: Vec<RosNode>,
    #[serde(default, deserialize_with = "nullable")]
    pub topics: Vec<RosTopic>,
}

/// One event document as sent by the monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RosMessage {
    #[serde(default, deserialize_with = "nullable")]
    pub event: String,
    #[serde(default, deserialize_with = "nullable")]
    pub fromtopic: String,
    #[serde(default, deserialize_with = "nullable")]
    pub rawmsg: String,
    /// Decoded message body; kept for logging only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<serde_yaml::Value>,
    #[serde(default, deserialize_with = "nullable")]
    pub context: RosContext,
}

// ──────────────────────────────────────────────
// Event kinds
// ──────────────────────────────────────────────

/// What an evaluation pass was started by. Selects the rule section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Msg,
    Graph,
    /// No event: a poll tick
    External,
    /// A decoded event of a kind no section handles
    Unknown,
}

impl EventKind {
    pub fn from_event(event: &str) -> EventKind {
        match event {
            "message" => EventKind::Msg,
            "graph" => EventKind::Graph,
            _ => EventKind::Unknown,
        }
    }

    pub fn section_name(self) -> &'static str {
        match self {
            EventKind::Msg => "Msg",
            EventKind::Graph => "Graph",
            EventKind::External => "External",
            EventKind::Unknown => "Unknown",
        }
    }
}

// ──────────────────────────────────────────────
// View
// ──────────────────────────────────────────────

/// Read-only queries the builtins make against the current event.
pub trait MessageView: Send {
    fn kind(&self) -> EventKind;

    /// Decoded payload bytes.
    fn raw_payload(&self) -> Result<Vec<u8>, DecodeError>;

    fn source_topic(&self) -> &str;

    /// Publishers of `topic`, empty if the topic is unknown.
    fn publishers_of(&self, topic: &str) -> &[String];

    fn subscribers_of(&self, topic: &str) -> &[String];

    fn nodes(&self) -> &[RosNode];

    fn topic_names(&self) -> Vec<&str>;

    /// `(package, type)` of the messages on `topic`.
    fn message_type(&self, topic: &str) -> Option<(&str, &str)>;

    fn node(&self, name: &str) -> Option<&RosNode> {
        self.nodes().iter().find(|n| n.node == name)
    }

    fn node_names(&self) -> Vec<&str> {
        self.nodes().iter().map(|n| n.node.as_str()).collect()
    }
}

impl RosMessage {
    fn topic(&self, name: &str) -> Option<&RosTopic> {
        self.context.topics.iter().find(|t| t.topic == name)
    }
}

impl MessageView for RosMessage {
    fn kind(&self) -> EventKind {
        EventKind::from_event(&self.event)
    }

    fn raw_payload(&self) -> Result<Vec<u8>, DecodeError> {
        Ok(STANDARD.decode(self.rawmsg.trim())?)
    }

    fn source_topic(&self) -> &str {
        &self.fromtopic
    }

    fn publishers_of(&self, topic: &str) -> &[String] {
        self.topic(topic).map(|t| t.publishers.as_slice()).unwrap_or(&[])
    }

    fn subscribers_of(&self, topic: &str) -> &[String] {
        self.topic(topic).map(|t| t.subscribers.as_slice()).unwrap_or(&[])
    }

    fn nodes(&self) -> &[RosNode] {
        &self.context.nodes
    }

    fn topic_names(&self) -> Vec<&str> {
        self.context.topics.iter().map(|t| t.topic.as_str()).collect()
    }

    fn message_type(&self, topic: &str) -> Option<(&str, &str)> {
        let param = self.topic(topic)?.parameters.first()?;
        let fields: Vec<&str> = param.split('/').collect();
        match fields.as_slice() {
            [pkg, _, ty, ..] => Some((*pkg, *ty)),
            [pkg] | [pkg, _] => Some((*pkg, "")),
            [] => None,
        }
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"
event: message
fromtopic: /chatter
rawmsg: aGVsbG8=
context:
  nodes:
    - node: /talker
      gids: [g1]
      services:
        - service: /talker/get_loggers
          params: []
    - node: /listener
  topics:
    - topic: /chatter
      parameters: [std_msgs/msg/String]
      publishers: [/talker]
      subscribers:
        - /listener
        -
    - topic: /rosout
"#;

    #[test]
    fn decodes_with_missing_and_null_lists() {
        let msg: RosMessage = serde_yaml::from_str(GRAPH).unwrap();
        assert_eq!(msg.kind(), EventKind::Msg);
        assert_eq!(msg.source_topic(), "/chatter");
        assert_eq!(msg.raw_payload().unwrap(), b"hello");
        assert_eq!(msg.publishers_of("/chatter"), ["/talker".to_string()]);
        assert_eq!(msg.subscribers_of("/chatter").len(), 2);
        assert!(msg.publishers_of("/rosout").is_empty());
        assert!(msg.publishers_of("/nope").is_empty());
        assert!(msg.node("/listener").unwrap().services.is_empty());
        assert!(msg.node("/talker").unwrap().has_service("/talker/get_loggers"));
        assert_eq!(msg.topic_names(), vec!["/chatter", "/rosout"]);
    }

    #[test]
    fn message_type_fields() {
        let msg: RosMessage = serde_yaml::from_str(GRAPH).unwrap();
        assert_eq!(msg.message_type("/chatter"), Some(("std_msgs", "String")));
        assert_eq!(msg.message_type("/rosout"), None);
    }

    #[test]
    fn unknown_event_kind() {
        let msg: RosMessage = serde_yaml::from_str("event: parameter\n").unwrap();
        assert_eq!(msg.kind(), EventKind::Unknown);
        assert_eq!(EventKind::Unknown.section_name(), "Unknown");
    }

    #[test]
    fn bad_base64_is_a_decode_error() {
        let msg: RosMessage = serde_yaml::from_str("event: message\nrawmsg: '***'\n").unwrap();
        assert!(matches!(msg.raw_payload(), Err(DecodeError::Base64(_))));
    }
}
