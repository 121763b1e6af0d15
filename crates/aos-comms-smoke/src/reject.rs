use anyhow::{Result, bail, ensure};
use aos_comms::Slot;
use aos_comms_testkit::KernelCall;
use serde_json::json;

use crate::util::{self, DemoOptions};

const RESOLVER: u64 = 71;
const REASON: &str = r#"{"message":"insufficient funds"}"#;

pub fn run(options: &DemoOptions) -> Result<()> {
    let mut net = util::chain(options, &["alice", "bob"])?;
    let presence = net.export("bob", "alice", 1, Slot::import(5))?;

    println!("→ alice calls withdraw(1000) on {presence}");
    net.deliver("alice", presence.id, "withdraw", &[json!(1000)], &[], Some(RESOLVER))?;
    net.pump()?;
    let (_, _, result) = util::only_send(&net, "bob")?;

    println!("→ bob's kernel rejects promise {result}");
    net.node_mut("bob")?.vat.notify_reject(result, REASON, &[])?;
    net.pump()?;

    let settled = util::settlement_of(&net, "alice", RESOLVER)?;
    println!("     alice's resolver {RESOLVER}: {settled:?}");
    ensure!(
        matches!(&settled, KernelCall::Reject { data, .. } if data == REASON),
        "unexpected settlement {settled:?}"
    );

    match net.node_mut("bob")?.vat.notify_reject(result, REASON, &[]) {
        Ok(()) => bail!("a second rejection must be refused"),
        Err(err) => println!("     a second rejection is refused: {err}"),
    }
    util::finish(&net, options)
}
