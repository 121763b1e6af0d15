//! JSON message shapes exchanged with peer machines.
//!
//! These types exist only at the channel boundary; everything inside the vat
//! works on [`Slot`] values directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CommsError;
use crate::slot::Slot;

/// A method invocation addressed to an object the receiver exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCall {
    pub target: Slot,
    pub method_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub slots: Vec<Slot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_slot: Option<Slot>,
}

/// Settlement of a promise the receiver holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum WireEvent {
    NotifyFulfillToData {
        promise: Slot,
        args: String,
        #[serde(default)]
        slots: Vec<Slot>,
    },
    NotifyFulfillToTarget {
        promise: Slot,
        target: Slot,
    },
    NotifyReject {
        promise: Slot,
        args: Value,
        #[serde(default)]
        slots: Vec<Slot>,
    },
}

impl WireEvent {
    pub fn promise(&self) -> Slot {
        match self {
            WireEvent::NotifyFulfillToData { promise, .. }
            | WireEvent::NotifyFulfillToTarget { promise, .. }
            | WireEvent::NotifyReject { promise, .. } => *promise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Event(WireEvent),
    Call(WireCall),
}

impl From<WireCall> for WireMessage {
    fn from(call: WireCall) -> Self {
        WireMessage::Call(call)
    }
}

impl From<WireEvent> for WireMessage {
    fn from(event: WireEvent) -> Self {
        WireMessage::Event(event)
    }
}

impl WireMessage {
    pub fn encode(&self) -> Result<String, CommsError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(message: &str) -> Result<Self, CommsError> {
        Ok(serde_json::from_str(message)?)
    }
}

/// Slot reference in the legacy inbound format, numbered by the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySlot {
    #[serde(rename = "type")]
    pub kind: String,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCall {
    pub index: u64,
    pub method_name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub slots: Vec<LegacySlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyMessage {
    Event(WireEvent),
    Call(LegacyCall),
}

impl LegacyMessage {
    pub fn decode(message: &str) -> Result<Self, CommsError> {
        Ok(serde_json::from_str(message)?)
    }
}

/// Kernel argument encoding: `{"args": [...]}`.
pub fn encode_args(args: &[Value]) -> Result<String, CommsError> {
    Ok(serde_json::to_string(&serde_json::json!({ "args": args }))?)
}

pub fn decode_args(args_json: &str) -> Result<Vec<Value>, CommsError> {
    match serde_json::from_str::<Value>(args_json)? {
        Value::Object(mut map) => match map.remove("args") {
            Some(Value::Array(args)) => Ok(args),
            Some(other) => Err(CommsError::MalformedArgs(format!(
                "'args' must be an array, got {other}"
            ))),
            None => Err(CommsError::MalformedArgs("missing 'args'".into())),
        },
        Value::Array(args) => Ok(args),
        other => Err(CommsError::MalformedArgs(format!(
            "expected an args object, got {other}"
        ))),
    }
}
