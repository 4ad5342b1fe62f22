//! Definitions of CLI arguments and commands for the option deployment scripts

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{commands::create_options, errors::ScriptError};

/// Deploys option tokens and lists them on the options AMM
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// The commands exposed by the scripts
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploys an option token for every option in the config file,
    /// then lists all of them on the AMM in a single multicall.
    CreateOptions(CreateOptionsArgs),
}

impl Commands {
    /// Runs the command
    pub async fn run(self) -> Result<(), ScriptError> {
        match self {
            Commands::CreateOptions(args) => create_options(args).await,
        }
    }
}

/// Arguments of the `create-options` command
#[derive(Args, Debug)]
pub struct CreateOptionsArgs {
    #[arg(short, long, long_help)]
    /// The path to the JSON deployment config.
    /// Relative ABI paths in the config are resolved against its directory.
    pub config: PathBuf,

    #[arg(short, long, env = "PRIVATE_KEY", hide_env_values = true)]
    /// The private key of the account sending the transactions, in hex form.
    /// Not needed for a dry run.
    pub private_key: Option<String>,

    #[arg(short, long, env = "RPC_URL")]
    /// The node RPC URL, overriding the one in the config
    pub rpc_url: Option<String>,

    #[arg(short, long, long_help)]
    /// The path to the deployments file in which deployed option tokens are recorded.
    /// Tokens deployed by an aborted run are recorded too.
    pub deployments_path: Option<PathBuf>,

    #[arg(long)]
    /// Only validate the config and log the calldata of every deployment
    pub dry_run: bool,
}
