//! Per-machine bidirectional address book between kernel slots and wire slots.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::CommsError;
use crate::slot::{Slot, change_perspective};

/// One registration: `kernel_slot` is known to `machine` as `me_to_you` when we
/// send it, and arrives from `machine` as `you_to_me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CListEntry {
    pub machine: String,
    pub kernel_slot: Slot,
    pub you_to_me: Slot,
    pub me_to_you: Slot,
}

#[derive(Debug, Clone, Default)]
struct PeerTable {
    incoming: HashMap<Slot, Slot>,
    outgoing: HashMap<Slot, Slot>,
}

#[derive(Debug, Clone, Default)]
pub struct CList {
    peers: BTreeMap<String, PeerTable>,
    homes: HashMap<Slot, String>,
    entries: Vec<CListEntry>,
}

impl CList {
    /// Register a new 4-tuple. Both directions must be fresh for `machine`.
    pub fn add(
        &mut self,
        machine: &str,
        kernel_slot: Slot,
        you_to_me: Slot,
        me_to_you: Slot,
    ) -> Result<(), CommsError> {
        if !kernel_slot.is_kernel_facing() {
            return Err(CommsError::NotKernelSlot(kernel_slot));
        }
        if change_perspective(you_to_me)? != me_to_you {
            return Err(CommsError::NotADualPair {
                machine: machine.to_string(),
                you_to_me,
                me_to_you,
            });
        }
        self.check_if_already_exists(machine, kernel_slot, you_to_me)?;

        let peer = self.peers.entry(machine.to_string()).or_default();
        peer.incoming.insert(you_to_me, kernel_slot);
        peer.outgoing.insert(kernel_slot, me_to_you);
        self.homes
            .entry(kernel_slot)
            .or_insert_with(|| machine.to_string());
        self.entries.push(CListEntry {
            machine: machine.to_string(),
            kernel_slot,
            you_to_me,
            me_to_you,
        });
        Ok(())
    }

    fn check_if_already_exists(
        &self,
        machine: &str,
        kernel_slot: Slot,
        you_to_me: Slot,
    ) -> Result<(), CommsError> {
        let Some(peer) = self.peers.get(machine) else {
            return Ok(());
        };
        if peer.outgoing.contains_key(&kernel_slot) {
            return Err(CommsError::DuplicateKernelSlot {
                machine: machine.to_string(),
                kernel_slot,
            });
        }
        if peer.incoming.contains_key(&you_to_me) {
            return Err(CommsError::DuplicateWireSlot {
                machine: machine.to_string(),
                wire_slot: you_to_me,
            });
        }
        Ok(())
    }

    pub fn map_incoming(&self, machine: &str, you_to_me: Slot) -> Option<Slot> {
        self.peers
            .get(machine)
            .and_then(|peer| peer.incoming.get(&you_to_me))
            .copied()
    }

    /// The machine the kernel slot was first registered for, with the wire
    /// slot we send to it.
    pub fn map_kernel_slot(&self, kernel_slot: Slot) -> Option<(&str, Slot)> {
        let machine = self.homes.get(&kernel_slot)?;
        let me_to_you = self.map_kernel_slot_for(machine, kernel_slot)?;
        Some((machine.as_str(), me_to_you))
    }

    pub fn map_kernel_slot_for(&self, machine: &str, kernel_slot: Slot) -> Option<Slot> {
        self.peers
            .get(machine)
            .and_then(|peer| peer.outgoing.get(&kernel_slot))
            .copied()
    }

    pub fn home_of(&self, kernel_slot: Slot) -> Option<&str> {
        self.homes.get(&kernel_slot).map(String::as_str)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> &[CListEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::SlotKind;

    fn egress(id: u64) -> Slot {
        Slot::new(SlotKind::YourEgress, id)
    }

    fn ingress(id: u64) -> Slot {
        Slot::new(SlotKind::YourIngress, id)
    }

    #[test]
    fn both_directions_are_recorded() {
        let mut clist = CList::default();
        clist
            .add("user", Slot::import(10), egress(4), ingress(4))
            .unwrap();

        assert_eq!(clist.map_incoming("user", egress(4)), Some(Slot::import(10)));
        assert_eq!(
            clist.map_kernel_slot(Slot::import(10)),
            Some(("user", ingress(4)))
        );
        assert_eq!(clist.map_incoming("bot", egress(4)), None);
        assert_eq!(clist.map_incoming("user", ingress(4)), None);
    }

    #[test]
    fn duplicate_kernel_slot_is_rejected() {
        let mut clist = CList::default();
        clist
            .add("user", Slot::import(10), egress(4), ingress(4))
            .unwrap();
        let err = clist
            .add("user", Slot::import(10), egress(5), ingress(5))
            .unwrap_err();
        assert!(matches!(err, CommsError::DuplicateKernelSlot { .. }));
        assert_eq!(clist.len(), 1);
    }

    #[test]
    fn duplicate_wire_slot_is_rejected() {
        let mut clist = CList::default();
        clist
            .add("user", Slot::import(10), egress(4), ingress(4))
            .unwrap();
        let err = clist
            .add("user", Slot::import(11), egress(4), ingress(4))
            .unwrap_err();
        assert!(matches!(err, CommsError::DuplicateWireSlot { .. }));
    }

    #[test]
    fn mismatched_perspective_is_rejected() {
        let mut clist = CList::default();
        let err = clist
            .add("user", Slot::import(10), egress(4), egress(4))
            .unwrap_err();
        assert!(matches!(err, CommsError::NotADualPair { .. }));
        let err = clist
            .add("user", egress(1), egress(4), ingress(4))
            .unwrap_err();
        assert!(matches!(err, CommsError::NotKernelSlot(_)));
    }

    #[test]
    fn same_kernel_slot_may_be_known_to_several_machines() {
        let mut clist = CList::default();
        clist
            .add("bot", Slot::import(10), egress(1), ingress(1))
            .unwrap();
        clist
            .add("user", Slot::import(10), egress(2), ingress(2))
            .unwrap();

        assert_eq!(clist.home_of(Slot::import(10)), Some("bot"));
        assert_eq!(
            clist.map_kernel_slot(Slot::import(10)),
            Some(("bot", ingress(1)))
        );
        assert_eq!(
            clist.map_kernel_slot_for("user", Slot::import(10)),
            Some(ingress(2))
        );
        assert_eq!(clist.entries().len(), 2);
    }

    #[test]
    fn kernel_slot_duplicates_are_checked_per_machine() {
        let mut clist = CList::default();
        clist
            .add("bot", Slot::import(10), egress(1), ingress(1))
            .unwrap();
        clist
            .add("user", Slot::import(10), egress(1), ingress(1))
            .unwrap();

        let err = clist
            .add("user", Slot::import(10), egress(3), ingress(3))
            .unwrap_err();
        assert!(matches!(
            err,
            CommsError::DuplicateKernelSlot { machine, kernel_slot }
                if machine == "user" && kernel_slot == Slot::import(10)
        ));
        assert_eq!(clist.map_incoming("bot", egress(1)), Some(Slot::import(10)));
        assert_eq!(clist.map_incoming("user", egress(1)), Some(Slot::import(10)));
        assert_eq!(clist.len(), 2);
    }
}
