use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use aos_comms::{ChannelDevice, DeviceError};
use serde_json::Value;

/// One message a vat handed to its channel device.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub from: String,
    pub to: String,
    pub message: String,
}

impl Packet {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.message).unwrap_or(Value::String(self.message.clone()))
    }
}

#[derive(Debug, Default)]
struct WireState {
    queue: VecDeque<Packet>,
    callbacks: Vec<String>,
    down: Vec<String>,
}

/// Shared queue behind one or more [`RecordingDevice`]s.
#[derive(Debug, Clone, Default)]
pub struct Wire(Arc<Mutex<WireState>>);

impl Wire {
    fn lock(&self) -> MutexGuard<'_, WireState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pop(&self) -> Option<Packet> {
        self.lock().queue.pop_front()
    }

    pub fn take(&self) -> Vec<Packet> {
        self.lock().queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    /// Machines that registered an inbound callback, in order.
    pub fn callbacks(&self) -> Vec<String> {
        self.lock().callbacks.clone()
    }

    /// Make every later send addressed to `machine` fail.
    pub fn cut(&self, machine: &str) {
        self.lock().down.push(machine.to_string());
    }

    /// Undo [`Wire::cut`] for `machine`.
    pub fn mend(&self, machine: &str) {
        self.lock().down.retain(|down| down != machine);
    }
}

/// Channel device that queues outbound messages on a [`Wire`].
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    name: String,
    wire: Wire,
}

impl RecordingDevice {
    pub fn new(name: impl Into<String>, wire: Wire) -> Self {
        Self {
            name: name.into(),
            wire,
        }
    }
}

impl ChannelDevice for RecordingDevice {
    fn send_over_channel(&mut self, from: &str, to: &str, message: &str) -> Result<(), DeviceError> {
        let mut wire = self.wire.lock();
        if wire.down.iter().any(|machine| machine == to) {
            return Err(DeviceError::new(&self.name, format!("no route to '{to}'")));
        }
        log::trace!("{} queued {from} -> {to}", self.name);
        wire.queue.push_back(Packet {
            from: from.to_string(),
            to: to.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    fn register_inbound_callback(&mut self, machine: &str) -> Result<(), DeviceError> {
        self.wire.lock().callbacks.push(machine.to_string());
        Ok(())
    }
}
