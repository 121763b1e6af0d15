//! Test fixtures for exercising comms vats without a real kernel or network.
//!
//! - [`MockSyscall`]: records syscalls and queues the notifications a kernel
//!   would send back for subscribed promises.
//! - [`RecordingDevice`]: channel device that queues messages on a shared [`Wire`].
//! - [`LoopbackNet`]: several vats on one wire, pumped until quiet.

pub mod device;
pub mod net;
pub mod syscall;

pub use device::{Packet, RecordingDevice, Wire};
pub use net::{LOOPBACK_DEVICE, LoopbackNet, Node};
pub use syscall::{FIRST_KERNEL_ID, KernelCall, KernelLog, KernelNotification, MockSyscall};
