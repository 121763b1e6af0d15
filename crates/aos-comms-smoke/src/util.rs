use anyhow::{Context, Result, ensure};
use aos_comms::{CommsConfig, Slot};
use aos_comms_testkit::{KernelCall, LoopbackNet};

pub struct DemoOptions {
    pub config: CommsConfig,
    pub dump_state: bool,
}

/// A network with `machines` added and connected in a chain.
pub fn chain(options: &DemoOptions, machines: &[&str]) -> Result<LoopbackNet> {
    let mut net = LoopbackNet::with_config(options.config.clone());
    for machine in machines {
        net.add_machine(machine)?;
    }
    for pair in machines.windows(2) {
        net.connect(pair[0], pair[1])?;
    }
    log::info!("network up: {}", machines.join(" <-> "));
    Ok(net)
}

/// The single kernel send `machine` has issued, as `(target, method, result)`.
pub fn only_send(net: &LoopbackNet, machine: &str) -> Result<(Slot, String, u64)> {
    let sends = net.kernel(machine)?.sends();
    ensure!(sends.len() == 1, "'{machine}' issued {} sends, expected 1", sends.len());
    sends
        .into_iter()
        .next()
        .context("send vanished")
}

/// Whether `machine`'s kernel saw `resolver` settled, and how.
pub fn settlement_of(net: &LoopbackNet, machine: &str, resolver: u64) -> Result<KernelCall> {
    net.kernel(machine)?
        .calls()
        .into_iter()
        .find(|call| match call {
            KernelCall::FulfillToData { resolver: r, .. }
            | KernelCall::FulfillToTarget { resolver: r, .. }
            | KernelCall::Reject { resolver: r, .. } => *r == resolver,
            _ => false,
        })
        .with_context(|| format!("resolver {resolver} on '{machine}' never settled"))
}

pub fn finish(net: &LoopbackNet, options: &DemoOptions) -> Result<()> {
    if !options.dump_state {
        return Ok(());
    }
    for machine in net.machines() {
        let state = net.vat(machine)?.debug_state()?;
        println!("--- {machine} ---");
        println!("{}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}
