use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::{CommsConfig, PipeliningScheme};
use crate::device::{ChannelDevice, DeviceTable};
use crate::error::CommsError;
use crate::promises::{Decider, PromiseRecord, Resolution};
use crate::slot::{Slot, SlotKind, change_perspective};
use crate::state::CommsState;
use crate::syscall::Syscall;
use crate::wire::{WireCall, WireEvent, WireMessage};

mod controller;
mod dispatch;
mod inbound;
mod outbound;
mod snapshot;
#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{ControllerOp, UNDEFINED_JSON};
pub use snapshot::{CommsSnapshot, PromiseSnapshot, SNAPSHOT_VERSION};

/// An encoded wire message bound for one peer.
struct Outgoing {
    from: String,
    to: String,
    device: String,
    encoded: String,
}

/// One comms vat instance: the tables, the kernel it talks to and the
/// channel devices that reach its peers.
pub struct CommsVat<S: Syscall> {
    state: CommsState,
    syscall: S,
    devices: DeviceTable,
    config: CommsConfig,
}

impl<S: Syscall> CommsVat<S> {
    pub fn new(syscall: S) -> Self {
        Self::with_config(syscall, CommsConfig::default())
    }

    pub fn with_config(syscall: S, config: CommsConfig) -> Self {
        Self {
            state: CommsState::default(),
            syscall,
            devices: DeviceTable::default(),
            config,
        }
    }

    /// Make a channel device available under the name `connect` refers to.
    pub fn install_device(&mut self, name: impl Into<String>, device: Box<dyn ChannelDevice>) {
        self.devices.install(name, device);
    }

    pub fn state(&self) -> &CommsState {
        &self.state
    }

    pub fn config(&self) -> &CommsConfig {
        &self.config
    }

    pub fn syscall(&self) -> &S {
        &self.syscall
    }

    pub fn syscall_mut(&mut self) -> &mut S {
        &mut self.syscall
    }

    pub fn machine_name(&self) -> Result<&str, CommsError> {
        self.state.machine.name()
    }

    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    /// Encode a message for `machine` and find the device that reaches it.
    /// Nothing has been sent when this fails.
    fn prepare(&self, machine: &str, message: &WireMessage) -> Result<Outgoing, CommsError> {
        let from = self.state.machine.name()?.to_string();
        let device = self
            .state
            .channels
            .device_for(machine)
            .ok_or_else(|| CommsError::UnknownMachine(machine.to_string()))?
            .to_string();
        if !self.devices.contains(&device) {
            return Err(CommsError::UnknownDevice(device));
        }
        Ok(Outgoing {
            from,
            to: machine.to_string(),
            device,
            encoded: message.encode()?,
        })
    }

    fn send(&mut self, outgoing: &Outgoing) -> Result<(), CommsError> {
        log::debug!(
            "comms {} -> {} via {}: {}",
            outgoing.from,
            outgoing.to,
            outgoing.device,
            outgoing.encoded
        );
        self.devices.get_mut(&outgoing.device)?.send_over_channel(
            &outgoing.from,
            &outgoing.to,
            &outgoing.encoded,
        )?;
        Ok(())
    }

    fn transmit(&mut self, machine: &str, message: &WireMessage) -> Result<(), CommsError> {
        let outgoing = self.prepare(machine, message)?;
        self.send(&outgoing)
    }

    /// Register a fresh kernel promise as the result of a call `machine` made,
    /// so its settlement is relayed back to `machine` as `result_slot`.
    fn register_result(
        &mut self,
        machine: &str,
        result_slot: Slot,
        promise_id: u64,
    ) -> Result<(), CommsError> {
        if !result_slot.kind.is_answer() {
            return Err(CommsError::InvalidResultSlot(result_slot));
        }
        let kernel_slot = Slot::promise(promise_id);
        self.state.clist.add(
            machine,
            kernel_slot,
            result_slot,
            change_perspective(result_slot)?,
        )?;
        self.state
            .promises
            .insert(kernel_slot, PromiseRecord::new(Decider::Kernel, machine));
        self.state.subscribers.add(promise_id, machine);
        self.syscall.subscribe(promise_id);
        Ok(())
    }
}
