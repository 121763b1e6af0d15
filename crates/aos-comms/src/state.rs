use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clist::CList;
use crate::error::CommsError;
use crate::ids::IdAllocator;
use crate::promises::PromiseTable;
use crate::registry::ChannelRegistry;

/// This machine's identity, written once by `init`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineState {
    name: Option<String>,
    proof: Option<Value>,
}

impl MachineState {
    pub fn initialize(&mut self, name: String, proof: Value) -> Result<(), CommsError> {
        if let Some(existing) = &self.name {
            return Err(CommsError::AlreadyInitialized(existing.clone()));
        }
        self.name = Some(name);
        self.proof = Some(proof);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.name.is_some()
    }

    pub fn name(&self) -> Result<&str, CommsError> {
        self.name.as_deref().ok_or(CommsError::NotInitialized)
    }
}

/// Remote senders waiting on a kernel promise, filled by the legacy inbound path.
#[derive(Debug, Clone, Default)]
pub struct SubscriberTable {
    by_promise: BTreeMap<u64, Vec<String>>,
}

impl SubscriberTable {
    pub fn add(&mut self, promise_id: u64, sender: impl Into<String>) {
        self.by_promise.entry(promise_id).or_default().push(sender.into());
    }

    pub fn get(&self, promise_id: u64) -> &[String] {
        self.by_promise
            .get(&promise_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[String])> {
        self.by_promise
            .iter()
            .map(|(promise, senders)| (*promise, senders.as_slice()))
    }
}

/// All tables owned by one comms vat instance.
#[derive(Debug, Clone, Default)]
pub struct CommsState {
    pub machine: MachineState,
    pub ids: IdAllocator,
    pub channels: ChannelRegistry,
    pub clist: CList,
    pub subscribers: SubscriberTable,
    pub promises: PromiseTable,
}
