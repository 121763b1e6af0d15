use anyhow::{Context, Result, bail};
use aos_comms::{CommsConfig, CommsVat, Slot, SlotKind};
use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::device::{RecordingDevice, Wire};
use crate::syscall::{KernelLog, MockSyscall};

pub const LOOPBACK_DEVICE: &str = "loopback";

const MAX_STEPS: usize = 10_000;

/// A machine on the loopback network: its comms vat and a handle on the
/// mock kernel underneath it.
pub struct Node {
    pub vat: CommsVat<MockSyscall>,
    pub kernel: KernelLog,
}

/// Several comms vats wired together through one in-memory queue. Nothing
/// moves until [`LoopbackNet::pump`] runs.
pub struct LoopbackNet {
    nodes: IndexMap<String, Node>,
    wire: Wire,
    config: CommsConfig,
}

impl Default for LoopbackNet {
    fn default() -> Self {
        Self::with_config(CommsConfig::default())
    }
}

impl LoopbackNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CommsConfig) -> Self {
        Self {
            nodes: IndexMap::new(),
            wire: Wire::default(),
            config,
        }
    }

    /// Add a machine and bootstrap it through the controller's `init`.
    pub fn add_machine(&mut self, name: &str) -> Result<()> {
        if self.nodes.contains_key(name) {
            bail!("machine '{name}' already on the network");
        }
        let syscall = MockSyscall::new();
        let kernel = syscall.log();
        let mut vat = CommsVat::with_config(syscall, self.config.clone());
        vat.install_device(
            LOOPBACK_DEVICE,
            Box::new(RecordingDevice::new(LOOPBACK_DEVICE, self.wire.clone())),
        );
        let args = json!({ "args": [name, format!("proof-of-{name}"), LOOPBACK_DEVICE] });
        vat.deliver(0, "init", &args.to_string(), &[], None)
            .with_context(|| format!("init '{name}'"))?;
        self.nodes.insert(name.to_string(), Node { vat, kernel });
        Ok(())
    }

    /// Connect two machines in both directions.
    pub fn connect(&mut self, a: &str, b: &str) -> Result<()> {
        for (from, to) in [(a, b), (b, a)] {
            let args = json!({ "args": [to, format!("key-of-{to}"), LOOPBACK_DEVICE] });
            self.node_mut(from)?
                .vat
                .deliver(0, "connect", &args.to_string(), &[], None)
                .with_context(|| format!("connect '{from}' to '{to}'"))?;
        }
        Ok(())
    }

    /// Let `owner` egress `kernel_slot` to `peer` at `index`, and register the
    /// matching ingress on `peer`. Returns the export `peer`'s kernel uses.
    pub fn export(
        &mut self,
        owner: &str,
        peer: &str,
        index: u64,
        kernel_slot: Slot,
    ) -> Result<Slot> {
        let egress = json!({ "args": [peer, index, { "@qclass": "slot", "index": 0 }] });
        self.node_mut(owner)?
            .vat
            .deliver(0, "addEgress", &egress.to_string(), &[kernel_slot], None)
            .with_context(|| format!("addEgress on '{owner}'"))?;

        let ingress = json!({ "args": [owner, index] });
        let vat = &mut self.node_mut(peer)?.vat;
        vat.deliver(0, "addIngress", &ingress.to_string(), &[], None)
            .with_context(|| format!("addIngress on '{peer}'"))?;
        vat.state()
            .clist
            .map_incoming(owner, Slot::new(SlotKind::YourIngress, index))
            .with_context(|| format!("'{peer}' has no ingress from '{owner}' at {index}"))
    }

    /// Deliver a message from `machine`'s kernel to one of its presences.
    pub fn deliver(
        &mut self,
        machine: &str,
        facet: u64,
        method: &str,
        args: &[Value],
        slots: &[Slot],
        resolver: Option<u64>,
    ) -> Result<()> {
        let args = json!({ "args": args });
        self.node_mut(machine)?
            .vat
            .deliver(facet, method, &args.to_string(), slots, resolver)
            .with_context(|| format!("deliver {method}() on '{machine}'"))
    }

    /// Run until no messages or kernel notifications are left. Returns the
    /// number of wire messages delivered.
    pub fn pump(&mut self) -> Result<usize> {
        let mut delivered = 0;
        for _ in 0..MAX_STEPS {
            let mut progressed = false;
            for (name, node) in self.nodes.iter_mut() {
                for notification in node.kernel.take_notifications() {
                    let promise = notification.promise();
                    notification
                        .deliver(&mut node.vat)
                        .with_context(|| format!("'{name}' notified of promise {promise}"))?;
                    progressed = true;
                }
            }
            if let Some(packet) = self.wire.pop() {
                log::debug!("loopback {} -> {}", packet.from, packet.to);
                self.node_mut(&packet.to)?
                    .vat
                    .receive(&packet.from, &packet.message)
                    .with_context(|| format!("'{}' receiving from '{}'", packet.to, packet.from))?;
                delivered += 1;
                progressed = true;
            }
            if !progressed {
                return Ok(delivered);
            }
        }
        bail!("loopback network still busy after {MAX_STEPS} steps")
    }

    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .with_context(|| format!("no machine '{name}'"))
    }

    pub fn node_mut(&mut self, name: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(name)
            .with_context(|| format!("no machine '{name}'"))
    }

    pub fn vat(&self, name: &str) -> Result<&CommsVat<MockSyscall>> {
        Ok(&self.node(name)?.vat)
    }

    pub fn kernel(&self, name: &str) -> Result<KernelLog> {
        Ok(self.node(name)?.kernel.clone())
    }

    pub fn wire(&self) -> &Wire {
        &self.wire
    }

    pub fn machines(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}
