use gumdrop::Options;
use std::default::Default;

#[derive(Debug, Options, Clone)]
pub struct DKGOpts {
    help: bool,
    #[options(command)]
    pub command: Option<Command>,
}

// The supported commands
#[derive(Debug, Options, Clone)]
pub enum Command {
    #[options(help = "creates a new share encryption keypair")]
    Keygen(KeygenOpts),

    #[options(help = "runs a DKG instance on an in-memory ledger")]
    Run(RunOpts),

    #[options(help = "checks a share from an exported commit data file")]
    Verify(VerifyOpts),
}

#[derive(Debug, Options, Clone)]
pub struct KeygenOpts {
    help: bool,

    #[options(help = "path to the file where the keys will be written (stdout if none provided)")]
    pub path: Option<String>,
}

#[derive(Debug, Options, Clone, Default)]
pub struct RunOpts {
    help: bool,

    #[options(help = "path to a JSON orchestrator config, overridden by the flags below")]
    pub config: Option<String>,

    #[options(short = "n", help = "the number of participants")]
    pub participants: Option<usize>,

    #[options(short = "t", help = "the number of shares required to recover the secret")]
    pub threshold: Option<usize>,

    #[options(no_short, help = "the deposit each participant locks, in wei")]
    pub deposit: Option<u128>,

    #[options(short = "w", help = "blocks between the last commitment and finalization")]
    pub challenge_window: Option<u64>,

    #[options(
        no_short,
        help = "what an unjustified complaint does: `close` (default) or `continue`"
    )]
    pub policy: Option<String>,

    #[options(no_short, help = "the participant which files a complaint")]
    pub complainer: Option<u32>,

    #[options(no_short, help = "the participant which deals a corrupted share to the complainer")]
    pub malicious: Option<u32>,

    #[options(no_short, help = "the participant accused by the complainer (defaults to --malicious)")]
    pub accused: Option<u32>,

    #[options(
        short = "o",
        help = "the path where the result of the DKG will be stored (stdout if none provided)"
    )]
    pub output: Option<String>,

    #[options(no_short, help = "the path where every commitment and share is exported")]
    pub commit_data: Option<String>,

    #[options(short = "i", help = "ask for confirmation before each stage")]
    pub interactive: bool,
}

#[derive(Debug, Options, Clone)]
pub struct VerifyOpts {
    help: bool,

    #[options(help = "path to the commit data written by `run`")]
    pub commit_data: String,

    #[options(help = "the complainer's hex encoded secret key")]
    pub key: String,

    #[options(no_short, help = "the id of the share's recipient")]
    pub complainer: u32,

    #[options(no_short, help = "the id of the share's dealer")]
    pub accused: u32,
}
