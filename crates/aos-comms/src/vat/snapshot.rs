use serde::{Deserialize, Serialize};
use serde_cbor::value::Value as CborValue;
use sha2::{Digest, Sha256};

use super::*;
use crate::clist::CListEntry;
use crate::ids::IdAllocator;
use crate::state::MachineState;

pub const SNAPSHOT_VERSION: u32 = 1;

const HASH_PREFIX: &str = "sha256:";

/// Everything a comms vat needs to pick up where it left off. Channel devices
/// are not part of it; the host reinstalls them after a restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommsSnapshot {
    pub version: u32,
    pub config: CommsConfig,
    pub machine: MachineState,
    pub next_id: u64,
    /// `(machine, device)` pairs from `connect`.
    pub channels: Vec<(String, String)>,
    /// Registration order is preserved so homes survive a restore.
    pub clist: Vec<CListEntry>,
    pub subscribers: Vec<(u64, Vec<String>)>,
    pub promises: Vec<PromiseSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiseSnapshot {
    pub kernel_slot: Slot,
    pub record: PromiseRecord,
}

impl CommsSnapshot {
    /// Canonical CBOR bytes, self-described.
    pub fn to_cbor(&self) -> Result<Vec<u8>, CommsError> {
        let canonical: CborValue = serde_cbor::value::to_value(self)?;
        let mut buf = Vec::with_capacity(256);
        let mut serializer = serde_cbor::ser::Serializer::new(&mut buf);
        serializer.self_describe()?;
        canonical.serialize(&mut serializer)?;
        Ok(buf)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CommsError> {
        Ok(serde_cbor::from_slice(bytes)?)
    }

    /// `sha256:<hex>` over the canonical encoding.
    pub fn digest(&self) -> Result<String, CommsError> {
        let digest = Sha256::digest(self.to_cbor()?);
        Ok(format!("{HASH_PREFIX}{}", hex::encode(digest)))
    }
}

impl<S: Syscall> CommsVat<S> {
    pub fn snapshot(&self) -> CommsSnapshot {
        let state = &self.state;
        CommsSnapshot {
            version: SNAPSHOT_VERSION,
            config: self.config.clone(),
            machine: state.machine.clone(),
            next_id: state.ids.next_id(),
            channels: state
                .channels
                .entries()
                .map(|(machine, device)| (machine.to_string(), device.to_string()))
                .collect(),
            clist: state.clist.entries().to_vec(),
            subscribers: state
                .subscribers
                .iter()
                .map(|(promise, senders)| (promise, senders.to_vec()))
                .collect(),
            promises: state
                .promises
                .iter()
                .map(|(kernel_slot, record)| PromiseSnapshot {
                    kernel_slot: *kernel_slot,
                    record: record.clone(),
                })
                .collect(),
        }
    }

    /// JSON view of the tables for logs and test assertions.
    pub fn debug_state(&self) -> Result<Value, CommsError> {
        Ok(serde_json::to_value(self.snapshot())?)
    }

    pub fn state_digest(&self) -> Result<String, CommsError> {
        self.snapshot().digest()
    }

    /// Rebuild a vat from `snapshot`, replaying registrations through the same
    /// checks live traffic goes through.
    pub fn restore(syscall: S, snapshot: CommsSnapshot) -> Result<Self, CommsError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CommsError::SnapshotVersion(snapshot.version));
        }
        let mut vat = Self::with_config(syscall, snapshot.config);
        let state = &mut vat.state;
        state.machine = snapshot.machine;
        state.ids = IdAllocator::resume_at(snapshot.next_id);
        for (machine, device) in snapshot.channels {
            state.channels.connect(machine, device);
        }
        for entry in snapshot.clist {
            state
                .clist
                .add(&entry.machine, entry.kernel_slot, entry.you_to_me, entry.me_to_you)?;
        }
        for (promise, senders) in snapshot.subscribers {
            for sender in senders {
                state.subscribers.add(promise, sender);
            }
        }
        for promise in snapshot.promises {
            state.promises.insert(promise.kernel_slot, promise.record);
        }
        log::debug!(
            "restored comms vat with {} clist entries and {} promises",
            state.clist.len(),
            state.promises.len()
        );
        Ok(vat)
    }

    pub fn restore_from_cbor(syscall: S, bytes: &[u8]) -> Result<Self, CommsError> {
        Self::restore(syscall, CommsSnapshot::from_cbor(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{RecordingSyscall, connected_vat};
    use super::*;

    #[test]
    fn restore_reproduces_digest_and_ids() {
        let (mut vat, _log, _outbox) = connected_vat("alice", &["bot"]);
        vat.deliver(0, "addIngress", r#"{"args":["bot",8]}"#, &[], None)
            .unwrap();
        vat.deliver(1, "give", r#"{"args":[]}"#, &[Slot::promise(50)], Some(60))
            .unwrap();

        let bytes = vat.snapshot().to_cbor().unwrap();
        let mut restored = CommsVat::restore_from_cbor(RecordingSyscall::default(), &bytes).unwrap();
        assert_eq!(restored.state_digest().unwrap(), vat.state_digest().unwrap());
        assert_eq!(restored.debug_state().unwrap(), vat.debug_state().unwrap());

        let relay = restored
            .state()
            .promises
            .get(Slot::promise(50))
            .unwrap()
            .relay
            .unwrap();
        assert_eq!(
            restored.state().promises.relay_owner(relay.promise),
            Some(Slot::promise(50))
        );

        let next = restored.map_outbound("bot", Slot::import(9)).unwrap();
        assert_eq!(next.id, vat.state().ids.next_id());
    }

    #[test]
    fn settled_promises_keep_their_resolution() {
        let (mut vat, _log, _outbox) = connected_vat("alice", &["bot"]);
        vat.deliver(0, "addIngress", r#"{"args":["bot",8]}"#, &[], None)
            .unwrap();
        vat.deliver(1, "give", r#"{"args":[]}"#, &[Slot::promise(50)], None)
            .unwrap();
        vat.notify_reject(50, r#""gone""#, &[]).unwrap();

        let bytes = vat.snapshot().to_cbor().unwrap();
        let restored = CommsVat::restore_from_cbor(RecordingSyscall::default(), &bytes).unwrap();
        let record = restored.state().promises.get(Slot::promise(50)).unwrap();
        assert_eq!(
            record.resolution,
            Some(Resolution::Rejection {
                data: r#""gone""#.into(),
                slots: vec![],
            })
        );
        assert_eq!(record.notified, vec!["bot".to_string()]);
    }

    #[test]
    fn digest_is_stable_and_prefixed() {
        let (vat, _log, _outbox) = connected_vat("alice", &["bot"]);
        let first = vat.state_digest().unwrap();
        assert!(first.starts_with("sha256:"));
        assert_eq!(first.len(), "sha256:".len() + 64);
        assert_eq!(first, vat.state_digest().unwrap());
    }

    #[test]
    fn unknown_version_is_refused() {
        let (vat, _log, _outbox) = connected_vat("alice", &[]);
        let mut snapshot = vat.snapshot();
        snapshot.version = 7;
        let err = CommsVat::restore(RecordingSyscall::default(), snapshot)
            .err()
            .unwrap();
        assert!(matches!(err, CommsError::SnapshotVersion(7)));
    }
}
