use dkg_cli::{
    actions::{keygen, run, verify},
    opts::{Command, DKGOpts},
};

use gumdrop::Options;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("dkg_core=info".parse()?)
        .add_directive("dkg_cli=info".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let opts = DKGOpts::parse_args_default_or_exit();

    let command = opts.command.unwrap_or_else(|| {
        eprintln!("No command was provided.");
        eprintln!("{}", DKGOpts::usage());
        process::exit(2)
    });

    let rng = &mut rand::thread_rng();
    match command {
        Command::Keygen(opts) => keygen(opts, rng).map(drop),
        Command::Run(opts) => run(opts, rng).await.map(drop),
        Command::Verify(opts) => verify(opts).map(drop),
    }
}
