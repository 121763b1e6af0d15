//! carol's object, reached by alice only through bob.

use anyhow::{Result, ensure};
use aos_comms::Slot;
use aos_comms_testkit::KernelCall;
use serde_json::json;

use crate::util::{self, DemoOptions};

const RESOLVER: u64 = 72;

pub fn run(options: &DemoOptions) -> Result<()> {
    let mut net = util::chain(options, &["alice", "bob", "carol"])?;
    let at_bob = net.export("carol", "bob", 5, Slot::import(9))?;
    let at_alice = net.export("bob", "alice", 3, at_bob)?;
    println!("→ carol's import:9 is {at_bob} at bob and {at_alice} at alice");

    net.deliver("alice", at_alice.id, "hello", &[json!("hi")], &[], Some(RESOLVER))?;
    let hops = net.pump()?;
    println!("     call took {hops} hop(s)");
    ensure!(net.kernel("bob")?.sends().is_empty(), "bob's kernel should not see the call");

    let (target, method, result) = util::only_send(&net, "carol")?;
    println!("     carol's kernel runs {target}.{method}()");
    net.node_mut("carol")?
        .vat
        .notify_fulfill_to_data(result, "\"hello back\"", &[])?;
    net.pump()?;

    let settled = util::settlement_of(&net, "alice", RESOLVER)?;
    println!("     alice's resolver {RESOLVER}: {settled:?}");
    ensure!(
        matches!(&settled, KernelCall::FulfillToData { .. }),
        "unexpected settlement {settled:?}"
    );
    util::finish(&net, options)
}
