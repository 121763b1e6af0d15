//! Shared helpers for the comms integration tests.
//!
//! Each integration test compiles this module separately, so some helpers
//! look unused from one file or another.

#![allow(dead_code)]

use aos_comms::{CommsVat, Slot};
use aos_comms_testkit::{KernelLog, MockSyscall, RecordingDevice, Wire};
use serde_json::{Value, json};

pub const CHANNEL: &str = "channel";

/// `{"args":[...]}` as the kernel encodes it.
pub fn args(values: Value) -> String {
    json!({ "args": values }).to_string()
}

pub fn slot_ref(index: usize) -> Value {
    json!({ "@qclass": "slot", "index": index })
}

/// A vat bootstrapped through `init`/`connect` with one recording device.
pub fn bootstrapped_vat(name: &str, peers: &[&str]) -> (CommsVat<MockSyscall>, KernelLog, Wire) {
    let syscall = MockSyscall::new();
    let kernel = syscall.log();
    let wire = Wire::default();
    let mut vat = CommsVat::new(syscall);
    vat.install_device(CHANNEL, Box::new(RecordingDevice::new(CHANNEL, wire.clone())));
    vat.deliver(0, "init", &args(json!([name, "proof", CHANNEL])), &[], None)
        .unwrap();
    for peer in peers {
        vat.deliver(0, "connect", &args(json!([peer, "key", CHANNEL])), &[], None)
            .unwrap();
    }
    kernel.clear();
    (vat, kernel, wire)
}

pub fn add_egress(vat: &mut CommsVat<MockSyscall>, machine: &str, index: u64, kernel_slot: Slot) {
    vat.deliver(
        0,
        "addEgress",
        &args(json!([machine, index, slot_ref(0)])),
        &[kernel_slot],
        None,
    )
    .unwrap();
}
