use crate::promises::PromisePair;
use crate::slot::Slot;

/// Kernel syscalls the comms vat issues. Implemented by the hosting kernel.
///
/// All calls are synchronous; promise settlement happens later through the
/// dispatcher's `notify_*` entry points.
pub trait Syscall {
    /// Queue `method` on `target` and return the kernel promise for its result.
    fn send(&mut self, target: Slot, method: &str, args_json: &str, slots: &[Slot]) -> u64;

    /// Ask to be notified when `promise_id` settles.
    fn subscribe(&mut self, promise_id: u64);

    fn create_promise(&mut self) -> PromisePair;

    fn fulfill_to_data(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]);

    fn fulfill_to_target(&mut self, resolver_id: u64, target: Slot);

    fn reject(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]);
}

impl<T: Syscall + ?Sized> Syscall for Box<T> {
    fn send(&mut self, target: Slot, method: &str, args_json: &str, slots: &[Slot]) -> u64 {
        (**self).send(target, method, args_json, slots)
    }

    fn subscribe(&mut self, promise_id: u64) {
        (**self).subscribe(promise_id)
    }

    fn create_promise(&mut self) -> PromisePair {
        (**self).create_promise()
    }

    fn fulfill_to_data(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]) {
        (**self).fulfill_to_data(resolver_id, data_json, slots)
    }

    fn fulfill_to_target(&mut self, resolver_id: u64, target: Slot) {
        (**self).fulfill_to_target(resolver_id, target)
    }

    fn reject(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]) {
        (**self).reject(resolver_id, data_json, slots)
    }
}
