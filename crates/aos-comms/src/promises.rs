//! Bookkeeping for promises the comms vat relays across machines.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::slot::Slot;

/// Who settles a relayed promise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "machine", rename_all = "snake_case")]
pub enum Decider {
    /// A vat in the local kernel; settlement arrives through `notify*`.
    Kernel,
    /// The named peer; settlement arrives over the wire.
    Remote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiseStatus {
    Unresolved,
    Fulfilled,
    Rejected,
}

/// A settlement expressed in kernel slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Data { data: String, slots: Vec<Slot> },
    Target { target: Slot },
    Rejection { data: String, slots: Vec<Slot> },
}

impl Resolution {
    pub fn status(&self) -> PromiseStatus {
        match self {
            Resolution::Data { .. } | Resolution::Target { .. } => PromiseStatus::Fulfilled,
            Resolution::Rejection { .. } => PromiseStatus::Rejected,
        }
    }

    /// Kernel slots a peer learns about along with the settlement.
    pub fn kernel_slots(&self) -> Vec<Slot> {
        match self {
            Resolution::Data { slots, .. } | Resolution::Rejection { slots, .. } => slots.clone(),
            Resolution::Target { target } => vec![*target],
        }
    }
}

/// A kernel promise/resolver pair minted by the comms vat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromisePair {
    pub promise: u64,
    pub resolver: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseRecord {
    pub decider: Decider,
    pub status: PromiseStatus,
    /// Machines that were told about this promise, first one is its home.
    pub watchers: Vec<String>,
    /// Kernel resolver the vat settles when a remote decider reports back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolver: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<PromisePair>,
    /// Kept once settled so late watchers can still be told.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    /// Machines that have been sent the settlement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notified: Vec<String>,
}

impl PromiseRecord {
    pub fn new(decider: Decider, machine: &str) -> Self {
        Self {
            decider,
            status: PromiseStatus::Unresolved,
            watchers: vec![machine.to_string()],
            resolver: None,
            relay: None,
            resolution: None,
            notified: Vec::new(),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.status != PromiseStatus::Unresolved
    }

    pub fn decided_by(&self, machine: &str) -> bool {
        matches!(&self.decider, Decider::Remote(name) if name == machine)
    }

    pub fn settle(&mut self, resolution: Resolution) {
        self.status = resolution.status();
        self.resolution = Some(resolution);
    }

    pub fn was_notified(&self, machine: &str) -> bool {
        self.notified.iter().any(|m| m == machine)
    }

    pub fn mark_notified(&mut self, machine: &str) {
        if !self.was_notified(machine) {
            self.notified.push(machine.to_string());
        }
    }

    pub fn watch(&mut self, machine: &str) {
        if !self.watchers.iter().any(|w| w == machine) {
            self.watchers.push(machine.to_string());
        }
    }

    /// Every kernel resolver that must observe a remote settlement.
    pub fn resolvers_for(&self, kernel_slot: Slot) -> Vec<u64> {
        let mut out = Vec::new();
        if kernel_slot.kind == crate::slot::SlotKind::Resolver {
            out.push(kernel_slot.id);
        }
        if let Some(resolver) = self.resolver {
            out.push(resolver);
        }
        if let Some(relay) = self.relay {
            out.push(relay.resolver);
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromiseTable {
    records: BTreeMap<Slot, PromiseRecord>,
    relays: HashMap<u64, Slot>,
}

impl PromiseTable {
    pub fn insert(&mut self, kernel_slot: Slot, record: PromiseRecord) {
        if let Some(relay) = record.relay {
            self.relays.insert(relay.promise, kernel_slot);
        }
        self.records.insert(kernel_slot, record);
    }

    pub fn get(&self, kernel_slot: Slot) -> Option<&PromiseRecord> {
        self.records.get(&kernel_slot)
    }

    pub fn get_mut(&mut self, kernel_slot: Slot) -> Option<&mut PromiseRecord> {
        self.records.get_mut(&kernel_slot)
    }

    /// The record a relay promise id stands in for.
    pub fn relay_owner(&self, promise_id: u64) -> Option<Slot> {
        self.relays.get(&promise_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Slot, &PromiseRecord)> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
