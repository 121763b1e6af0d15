//! Comms vat: carries object references and promise settlements between
//! machines, translating kernel slots to per-peer wire slots and back.

pub mod clist;
pub mod config;
pub mod device;
pub mod error;
pub mod ids;
pub mod promises;
pub mod registry;
pub mod slot;
pub mod state;
pub mod syscall;
pub mod vat;
pub mod wire;

pub use clist::{CList, CListEntry};
pub use config::{CommsConfig, PIPELINING_ENV, PipeliningScheme};
pub use device::{ChannelDevice, DeviceTable};
pub use error::{CommsError, DeviceError};
pub use ids::CONTROLLER_FACET;
pub use promises::{Decider, PromisePair, PromiseRecord, PromiseStatus, Resolution};
pub use slot::{Slot, SlotKind, change_perspective};
pub use state::CommsState;
pub use syscall::Syscall;
pub use vat::{
    CommsSnapshot, CommsVat, ControllerOp, PromiseSnapshot, SNAPSHOT_VERSION, UNDEFINED_JSON,
};
pub use wire::{WireCall, WireEvent, WireMessage};
