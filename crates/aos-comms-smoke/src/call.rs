//! alice calls an object bob exports; bob's kernel answers.

use anyhow::{Result, ensure};
use aos_comms::Slot;
use aos_comms_testkit::KernelCall;
use serde_json::json;

use crate::util::{self, DemoOptions};

const RESOLVER: u64 = 70;

pub fn run(options: &DemoOptions) -> Result<()> {
    let mut net = util::chain(options, &["alice", "bob"])?;
    let presence = net.export("bob", "alice", 1, Slot::import(5))?;

    println!("→ alice calls getBalance(\"savings\") on {presence}");
    net.deliver("alice", presence.id, "getBalance", &[json!("savings")], &[], Some(RESOLVER))?;
    let delivered = net.pump()?;
    println!("     {delivered} message(s) on the wire");

    let (target, method, result) = util::only_send(&net, "bob")?;
    println!("     bob's kernel runs {target}.{method}() -> promise {result}");

    println!("→ bob's kernel fulfills promise {result} with 100");
    net.node_mut("bob")?
        .vat
        .notify_fulfill_to_data(result, "100", &[])?;
    net.pump()?;

    let settled = util::settlement_of(&net, "alice", RESOLVER)?;
    println!("     alice's resolver {RESOLVER}: {settled:?}");
    ensure!(
        matches!(&settled, KernelCall::FulfillToData { data, .. } if data == "100"),
        "unexpected settlement {settled:?}"
    );
    util::finish(&net, options)
}
