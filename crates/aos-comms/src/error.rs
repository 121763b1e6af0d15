use thiserror::Error;

use crate::slot::{Slot, SlotKind};

#[derive(Debug, Error)]
pub enum CommsError {
    #[error("slot {0} has no wire perspective")]
    NoPerspective(Slot),
    #[error("clist already maps kernel slot {kernel_slot} for machine '{machine}'")]
    DuplicateKernelSlot { machine: String, kernel_slot: Slot },
    #[error("clist already maps wire slot {wire_slot} from machine '{machine}'")]
    DuplicateWireSlot { machine: String, wire_slot: Slot },
    #[error("clist entry for machine '{machine}' is not a dual pair: {you_to_me} / {me_to_you}")]
    NotADualPair {
        machine: String,
        you_to_me: Slot,
        me_to_you: Slot,
    },
    #[error("kernel slot {0} is not kernel-facing")]
    NotKernelSlot(Slot),
    #[error("wire slot {0} is not wire-facing")]
    NotWireSlot(Slot),
    #[error("export {0} reached the wire without prior registration")]
    UnregisteredExport(Slot),
    #[error("unrecognized target {0}")]
    UnknownTarget(Slot),
    #[error("machine '{machine}' sent unknown wire slot {slot}")]
    UnknownWireSlot { machine: String, slot: Slot },
    #[error("invalid message target {0}")]
    InvalidTarget(Slot),
    #[error("result slot {0} must be an answer")]
    InvalidResultSlot(Slot),
    #[error("legacy slot type '{0}' is not supported; only 'export' may be passed")]
    UnsupportedLegacySlot(String),
    #[error("comms vat already initialized as '{0}'")]
    AlreadyInitialized(String),
    #[error("comms vat not initialized")]
    NotInitialized,
    #[error("unknown controller method '{0}'")]
    UnknownControllerMethod(String),
    #[error("controller method '{method}' has malformed arguments: {reason}")]
    ControllerArgs { method: String, reason: String },
    #[error("malformed delivery arguments: {0}")]
    MalformedArgs(String),
    #[error("no channel registered for machine '{0}'")]
    UnknownMachine(String),
    #[error("no channel device named '{0}'")]
    UnknownDevice(String),
    #[error("verification failed for machine '{0}'")]
    VerificationFailed(String),
    #[error("no promise record for {0}")]
    UnknownPromise(Slot),
    #[error("promise {promise} is not decided by '{machine}'")]
    NotDecider { machine: String, promise: Slot },
    #[error("promise {0} is already settled")]
    AlreadySettled(Slot),
    #[error("cannot resolve promise {promise} to another promise {target}")]
    ResolveToPromise { promise: Slot, target: Slot },
    #[error("kernel {kind} {id} has no relay promise")]
    MissingRelay { kind: SlotKind, id: u64 },
    #[error("legacy send_in path is disabled")]
    LegacyDisabled,
    #[error("wire encoding error: {0}")]
    Wire(#[from] serde_json::Error),
    #[error("snapshot encoding error: {0}")]
    SnapshotEncoding(#[from] serde_cbor::Error),
    #[error("unsupported snapshot version {0}")]
    SnapshotVersion(u32),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Failure reported by a channel device.
#[derive(Debug, Clone, Error)]
#[error("device '{device}' failed: {message}")]
pub struct DeviceError {
    pub device: String,
    pub message: String,
}

impl DeviceError {
    pub fn new(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            message: message.into(),
        }
    }
}
