//! In-memory kernel stand-in that records syscalls and plays settlements back.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use aos_comms::{CommsError, CommsVat, PromisePair, Slot, Syscall};

/// Kernel ids start well above the small ids tests pick by hand.
pub const FIRST_KERNEL_ID: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub enum KernelCall {
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

/// A settlement the kernel owes the vat for a promise it subscribed to.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelNotification {
    FulfillToData {
        promise: u64,
        data: String,
        slots: Vec<Slot>,
    },
    FulfillToTarget {
        promise: u64,
        target: Slot,
    },
    Reject {
        promise: u64,
        data: String,
        slots: Vec<Slot>,
    },
}

impl KernelNotification {
    pub fn promise(&self) -> u64 {
        match self {
            KernelNotification::FulfillToData { promise, .. }
            | KernelNotification::FulfillToTarget { promise, .. }
            | KernelNotification::Reject { promise, .. } => *promise,
        }
    }

    /// Hand this notification to the vat's dispatcher.
    pub fn deliver<S: Syscall>(self, vat: &mut CommsVat<S>) -> Result<(), CommsError> {
        match self {
            KernelNotification::FulfillToData {
                promise,
                data,
                slots,
            } => vat.notify_fulfill_to_data(promise, &data, &slots),
            KernelNotification::FulfillToTarget { promise, target } => {
                vat.notify_fulfill_to_target(promise, target)
            }
            KernelNotification::Reject {
                promise,
                data,
                slots,
            } => vat.notify_reject(promise, &data, &slots),
        }
    }
}

#[derive(Debug)]
struct KernelState {
    next_id: u64,
    calls: Vec<KernelCall>,
    subscriptions: BTreeSet<u64>,
    /// resolver id -> promise id for pairs the vat created.
    pairs: HashMap<u64, u64>,
    pending: VecDeque<KernelNotification>,
}

impl Default for KernelState {
    fn default() -> Self {
        Self {
            next_id: FIRST_KERNEL_ID,
            calls: Vec::new(),
            subscriptions: BTreeSet::new(),
            pairs: HashMap::new(),
            pending: VecDeque::new(),
        }
    }
}

impl KernelState {
    fn fresh(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Queue a notification when `resolver` belongs to a subscribed pair.
    fn settle(&mut self, resolver: u64, make: impl FnOnce(u64) -> KernelNotification) {
        let Some(promise) = self.pairs.get(&resolver).copied() else {
            return;
        };
        if self.subscriptions.contains(&promise) {
            self.pending.push_back(make(promise));
        }
    }
}

/// Shared view of one mock kernel, kept by tests after the syscall moves
/// into the vat.
#[derive(Debug, Clone, Default)]
pub struct KernelLog(Arc<Mutex<KernelState>>);

impl KernelLog {
    fn lock(&self) -> MutexGuard<'_, KernelState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> Vec<KernelCall> {
        self.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    /// `(target, method, result promise)` of every send so far.
    pub fn sends(&self) -> Vec<(Slot, String, u64)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                KernelCall::Send {
                    target,
                    method,
                    result,
                    ..
                } => Some((*target, method.clone(), *result)),
                _ => None,
            })
            .collect()
    }

    pub fn is_subscribed(&self, promise_id: u64) -> bool {
        self.lock().subscriptions.contains(&promise_id)
    }

    pub fn take_notifications(&self) -> Vec<KernelNotification> {
        self.lock().pending.drain(..).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockSyscall {
    log: KernelLog,
}

impl MockSyscall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> KernelLog {
        self.log.clone()
    }
}

impl Syscall for MockSyscall {
    fn send(&mut self, target: Slot, method: &str, args_json: &str, slots: &[Slot]) -> u64 {
        let mut kernel = self.log.lock();
        let result = kernel.fresh();
        kernel.calls.push(KernelCall::Send {
            target,
            method: method.to_string(),
            args: args_json.to_string(),
            slots: slots.to_vec(),
            result,
        });
        result
    }

    fn subscribe(&mut self, promise_id: u64) {
        let mut kernel = self.log.lock();
        kernel.subscriptions.insert(promise_id);
        kernel.calls.push(KernelCall::Subscribe(promise_id));
    }

    fn create_promise(&mut self) -> PromisePair {
        let mut kernel = self.log.lock();
        let pair = PromisePair {
            promise: kernel.fresh(),
            resolver: kernel.fresh(),
        };
        kernel.pairs.insert(pair.resolver, pair.promise);
        kernel.calls.push(KernelCall::CreatePromise(pair));
        pair
    }

    fn fulfill_to_data(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]) {
        let mut kernel = self.log.lock();
        kernel.calls.push(KernelCall::FulfillToData {
            resolver: resolver_id,
            data: data_json.to_string(),
            slots: slots.to_vec(),
        });
        kernel.settle(resolver_id, |promise| KernelNotification::FulfillToData {
            promise,
            data: data_json.to_string(),
            slots: slots.to_vec(),
        });
    }

    fn fulfill_to_target(&mut self, resolver_id: u64, target: Slot) {
        let mut kernel = self.log.lock();
        kernel.calls.push(KernelCall::FulfillToTarget {
            resolver: resolver_id,
            target,
        });
        kernel.settle(resolver_id, |promise| KernelNotification::FulfillToTarget {
            promise,
            target,
        });
    }

    fn reject(&mut self, resolver_id: u64, data_json: &str, slots: &[Slot]) {
        let mut kernel = self.log.lock();
        kernel.calls.push(KernelCall::Reject {
            resolver: resolver_id,
            data: data_json.to_string(),
            slots: slots.to_vec(),
        });
        kernel.settle(resolver_id, |promise| KernelNotification::Reject {
            promise,
            data: data_json.to_string(),
            slots: slots.to_vec(),
        });
    }
}
