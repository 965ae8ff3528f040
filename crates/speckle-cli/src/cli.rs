use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "speckle",
    about = "Send, receive and version object graphs",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with server, token and cache settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Server URL, overriding the config file
    #[arg(long, global = true, env = "SPECKLE_SERVER")]
    pub server: Option<String>,

    /// API token, overriding the config file
    #[arg(long, global = true, env = "SPECKLE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the reference server
    Serve(ServeArgs),
    /// Send a JSON graph and commit it to a branch
    Send(SendArgs),
    /// Receive a commit's graph and print it as JSON
    Receive(ReceiveArgs),
    /// Create, list, inspect or delete streams
    Stream(StreamArgs),
    /// Create, list or delete branches
    Branch(BranchArgs),
    /// List commits
    Commit(CommitArgs),
    /// Decompose a JSON graph locally and print record statistics
    Flatten(FlattenArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Server configuration (TOML)
    #[arg(long)]
    pub server_config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Keep objects on disk under this directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct SendArgs {
    /// JSON file holding the graph
    pub file: PathBuf,
    #[arg(long)]
    pub stream: String,
    #[arg(long, default_value = "main")]
    pub branch: String,
    #[arg(short, long, default_value = "")]
    pub message: String,
    /// Skip the local disk cache even if one is configured
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args)]
pub struct ReceiveArgs {
    pub stream: String,
    /// Commit to receive; defaults to the latest on the branch
    #[arg(long)]
    pub commit: Option<String>,
    #[arg(long, default_value = "main")]
    pub branch: String,
    #[arg(long)]
    pub no_cache: bool,
}

#[derive(Args)]
pub struct StreamArgs {
    #[command(subcommand)]
    pub action: StreamAction,
}

#[derive(Subcommand)]
pub enum StreamAction {
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(long)]
        public: bool,
    },
    List {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    Get {
        id: String,
    },
    Delete {
        id: String,
    },
}

#[derive(Args)]
pub struct BranchArgs {
    #[command(subcommand)]
    pub action: BranchAction,
}

#[derive(Subcommand)]
pub enum BranchAction {
    Create {
        stream: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    List {
        stream: String,
    },
    Delete {
        stream: String,
        name: String,
    },
}

#[derive(Args)]
pub struct CommitArgs {
    #[command(subcommand)]
    pub action: CommitAction,
}

#[derive(Subcommand)]
pub enum CommitAction {
    List {
        stream: String,
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Args)]
pub struct FlattenArgs {
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_defaults_to_main() {
        let cli = Cli::parse_from(["speckle", "send", "model.json", "--stream", "s1"]);
        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.branch, "main");
                assert_eq!(args.stream, "s1");
                assert!(!args.no_cache);
            }
            _ => panic!("expected send"),
        }
    }
}
