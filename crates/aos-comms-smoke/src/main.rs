mod bootstrap;
mod call;
mod forward;
mod reject;
mod util;

use std::process;
use std::sync::Once;

use anyhow::{Result, anyhow};
use aos_comms::{CommsConfig, PipeliningScheme};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "aos-comms-smoke", version, about = "Run comms vat demos over a loopback network")]
struct Cli {
    /// Promise pipelining scheme; defaults to $AOS_COMMS_PIPELINING or chained.
    #[arg(long, value_enum)]
    pipelining: Option<Scheme>,
    /// Print each machine's comms tables after the demo.
    #[arg(long, default_value_t = false)]
    dump_state: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    /// Bootstrap two machines through the controller
    Bootstrap,
    /// Call a remote object and relay the answer
    Call,
    /// Relay a rejection back to the caller
    Reject,
    /// Route a call through a middle machine to a third party
    Forward,
    /// Run every demo in order
    All,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Scheme {
    Chained,
    Simplified,
}

impl From<Scheme> for PipeliningScheme {
    fn from(scheme: Scheme) -> Self {
        match scheme {
            Scheme::Chained => PipeliningScheme::Chained,
            Scheme::Simplified => PipeliningScheme::Simplified,
        }
    }
}

struct Demo {
    slug: &'static str,
    summary: &'static str,
    runner: fn(&util::DemoOptions) -> Result<()>,
}

const DEMOS: &[Demo] = &[
    Demo {
        slug: "bootstrap",
        summary: "init, connect, addEgress and addIngress on two machines",
        runner: bootstrap::run,
    },
    Demo {
        slug: "call",
        summary: "remote call with its answer relayed back",
        runner: call::run,
    },
    Demo {
        slug: "reject",
        summary: "remote call whose promise is rejected",
        runner: reject::run,
    },
    Demo {
        slug: "forward",
        summary: "three machines, call forwarded by the middle one",
        runner: forward::run,
    },
];

fn main() {
    init_logging();
    if let Err(err) = run_cli() {
        eprintln!("error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        process::exit(1);
    }
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .try_init();
    });
}

fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CommsConfig::from_env();
    if let Some(scheme) = cli.pipelining {
        config.pipelining = scheme.into();
    }
    let options = util::DemoOptions {
        config,
        dump_state: cli.dump_state,
    };
    match cli.command {
        Some(Commands::Bootstrap) => run_single("bootstrap", &options),
        Some(Commands::Call) => run_single("call", &options),
        Some(Commands::Reject) => run_single("reject", &options),
        Some(Commands::Forward) => run_single("forward", &options),
        Some(Commands::All) => {
            for demo in DEMOS {
                run_single(demo.slug, &options)?;
            }
            Ok(())
        }
        None => {
            list_demos();
            Ok(())
        }
    }
}

fn list_demos() {
    println!("Demos:\n");
    for demo in DEMOS {
        println!("  {:<10} {}", demo.slug, demo.summary);
    }
    println!("\n  all        Run every demo");
}

fn run_single(slug: &str, options: &util::DemoOptions) -> Result<()> {
    let demo = DEMOS
        .iter()
        .find(|demo| demo.slug == slug)
        .ok_or_else(|| anyhow!("unknown demo '{slug}'"))?;
    println!("Running demo {slug}: {}", demo.summary);
    (demo.runner)(options)
}
