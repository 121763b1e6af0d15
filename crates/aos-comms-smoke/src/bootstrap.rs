//! Bootstrap two machines and show the tables the controller fills in.

use anyhow::{Context, Result, ensure};
use aos_comms::{Slot, SlotKind};

use crate::util::{self, DemoOptions};

pub fn run(options: &DemoOptions) -> Result<()> {
    let mut net = util::chain(options, &["alice", "bob"])?;

    println!("→ bob egresses import:5 to alice at index 1");
    let presence = net.export("bob", "alice", 1, Slot::import(5))?;
    println!("     alice's kernel sees it as {presence}");
    ensure!(presence.kind == SlotKind::Export, "ingress should be an export");

    let again = net.export("bob", "alice", 2, Slot::import(6))?;
    println!("     a second egress becomes {again}");
    ensure!(again.id != presence.id, "ingress ids must be distinct");

    let bob = net.vat("bob")?;
    let found = bob
        .state()
        .clist
        .map_incoming("alice", Slot::new(SlotKind::YourEgress, 1))
        .context("bob lost the egress")?;
    println!("     bob resolves your-egress:1 from alice to {found}");
    ensure!(found == Slot::import(5), "egress lookup returned {found}");

    util::finish(&net, options)
}
