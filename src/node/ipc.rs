//! IPC messages exchanged with the managed node
//!
//! The node writes single-line JSON objects on stdout to report its reply
//! port and the faults it has confirmed; the supervisor writes requests as
//! single-line JSON on the node's stdin. Everything else on stdout is
//! regular log output.

use serde::{Deserialize, Serialize};

/// Raw message as sent by the node
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NodeIpcMessage {
    #[serde(rename = "Started", default)]
    pub started: Option<Vec<serde_json::Value>>,

    #[serde(rename = "ReplyPort", default)]
    pub reply_port: Option<u16>,

    #[serde(rename = "FInjects", default)]
    pub f_injects: Option<Vec<String>>,
}

/// Typed event decoded from a [`NodeIpcMessage`]
#[derive(Debug, Clone, PartialEq)]
pub enum NodeMessage {
    /// Node reports it started
    Started,
    /// Port the wallet API listens on
    ReplyPort(u16),
    /// Complete set of faults currently active in the node
    FaultInjections(Vec<String>),
}

impl NodeIpcMessage {
    /// Decode a stdout line, `None` if it is not an IPC message
    pub fn decode_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        let message: Self = serde_json::from_str(trimmed).ok()?;
        if message.is_empty() {
            return None;
        }
        Some(message)
    }

    fn is_empty(&self) -> bool {
        self.started.is_none() && self.reply_port.is_none() && self.f_injects.is_none()
    }

    /// Split into typed events, reply port first
    pub fn into_messages(self) -> Vec<NodeMessage> {
        let mut messages = Vec::new();
        if self.started.is_some() {
            messages.push(NodeMessage::Started);
        }
        if let Some(port) = self.reply_port {
            messages.push(NodeMessage::ReplyPort(port));
        }
        if let Some(faults) = self.f_injects {
            messages.push(NodeMessage::FaultInjections(faults));
        }
        messages
    }
}

/// Fault injection request: fault id and whether to enable it
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FaultInjectionRequest(pub String, pub bool);

/// Message sent to the node
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum OutgoingIpcMessage {
    SetFInject(FaultInjectionRequest),
}

impl OutgoingIpcMessage {
    pub fn set_fault(fault: &str, enabled: bool) -> Self {
        OutgoingIpcMessage::SetFInject(FaultInjectionRequest(fault.to_string(), enabled))
    }

    /// Encode as a single JSON line (without the newline)
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
