use std::sync::{Arc, Mutex};

use serde_json::json;

use super::*;
use crate::error::DeviceError;
use crate::promises::PromisePair;

const CHANNEL: &str = "channel";
const FIRST_KERNEL_ID: u64 = 100;

/// A kernel syscall as observed by the vat under test.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send {
        target: Slot,
        method: String,
        args: String,
        slots: Vec<Slot>,
        result: u64,
    },
    Subscribe(u64),
    CreatePromise(PromisePair),
    FulfillToData {
        resolver: u64,
        data: String,
        slots: Vec<Slot>,
    },
    FulfillToTarget {
        resolver: u64,
        target: Slot,
    },
    Reject {
        resolver: u64,
        data: String,
        slots: Vec<Slot>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

/// Syscall stub that records every call and hands out kernel ids from 100 up,
/// clear of the small ids tests pick by hand.
#[derive(Debug, Clone)]
pub struct RecordingSyscall {
    log: CallLog,
    next_id: u64,
}

impl Default for RecordingSyscall {
    fn default() -> Self {
        Self {
            log: CallLog::default(),
            next_id: FIRST_KERNEL_ID,
        }
    }
}

impl RecordingSyscall {
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn fresh(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Syscall for RecordingSyscall {
    fn send(&mut self, target: Slot, method: &str, args_json: &str, slots: &[Slot]) -> u64 {
        let result = self.fresh();
        self.log.push(Call::Send {
            target,
            method: method.to_string(),
            args: args_json.to_string(),
            slots: slots.to_vec(),
            result,
        });
        result
    }

    fn subscribe(&mut self, promise_id: u64) {
        self.log.push(Call::Subscribe(promise_id));
    }

    fn create_promise(&mut self) -> PromisePair {
        let pair = PromisePair {
            promise: self.fresh(),
            resolver: self.fresh(),
        };
        self.log.push(Call::CreatePromise(pair));
        pair
    }

    fn fulfill_to_data(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]) {
        self.log.push(Call::FulfillToData {
            resolver: resolver_id,
            data: data_json.to_string(),
            slots: slots.to_vec(),
        });
    }

    fn fulfill_to_target(&mut self, resolver_id: u64, target: Slot) {
        self.log.push(Call::FulfillToTarget {
            resolver: resolver_id,
            target,
        });
    }

    fn reject(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]) {
        self.log.push(Call::Reject {
            resolver: resolver_id,
            data: data_json.to_string(),
            slots: slots.to_vec(),
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub from: String,
    pub to: String,
    pub message: String,
}

impl Sent {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.message).unwrap_or_else(|_| json!(self.message))
    }
}

#[derive(Debug, Default)]
struct OutboxState {
    sent: Vec<Sent>,
    down: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Outbox(Arc<Mutex<OutboxState>>);

impl Outbox {
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut self.0.lock().unwrap().sent)
    }

    /// Make sends to `machine` fail until [`Outbox::mend`].
    pub fn cut(&self, machine: &str) {
        self.0.lock().unwrap().down.push(machine.to_string());
    }

    pub fn mend(&self, machine: &str) {
        self.0.lock().unwrap().down.retain(|down| down != machine);
    }
}

struct RecordingDevice {
    outbox: Outbox,
}

impl ChannelDevice for RecordingDevice {
    fn send_over_channel(&mut self, from: &str, to: &str, message: &str) -> Result<(), DeviceError> {
        let mut state = self.outbox.0.lock().unwrap();
        if state.down.iter().any(|down| down == to) {
            return Err(DeviceError::new(CHANNEL, format!("link to '{to}' is down")));
        }
        state.sent.push(Sent {
            from: from.to_string(),
            to: to.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    fn register_inbound_callback(&mut self, _machine: &str) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// An initialized vat with no devices.
pub fn test_vat(name: &str) -> (CommsVat<RecordingSyscall>, CallLog) {
    let syscall = RecordingSyscall::default();
    let log = syscall.log();
    let mut vat = CommsVat::new(syscall);
    vat.state
        .machine
        .initialize(name.to_string(), json!("test-proof"))
        .unwrap();
    (vat, log)
}

/// An initialized vat whose `peers` are all reachable over one recording device.
pub fn connected_vat(name: &str, peers: &[&str]) -> (CommsVat<RecordingSyscall>, CallLog, Outbox) {
    let (mut vat, log) = test_vat(name);
    let outbox = Outbox::default();
    vat.install_device(
        CHANNEL,
        Box::new(RecordingDevice {
            outbox: outbox.clone(),
        }),
    );
    for peer in peers {
        vat.state.channels.connect(*peer, CHANNEL);
    }
    (vat, log, outbox)
}
