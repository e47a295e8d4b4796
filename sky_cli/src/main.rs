use crate::init_config::CmdConfig;
use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::InfoLevel;
use directories::ProjectDirs;
use std::path::PathBuf;

mod cmd;
mod config;
mod helpers;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the one in the platform config dir
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Portal to talk to, overrides `portal_url` from the config
    #[arg(long, value_name = "URL", global = true)]
    portal: Option<String>,

    /// Sent as `Skynet-Api-Key`, overrides `api_key` from the config
    #[arg(long, value_name = "KEY", global = true)]
    api_key: Option<String>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<InfoLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Modify the client config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Generate a seed and print the key pair derived from it
    Keygen {
        /// Derive from this seed instead of generating a random one
        #[arg(long)]
        seed: Option<String>,
        /// Number of random bytes in a generated seed
        #[arg(long, default_value_t = sky_core::keys::DEFAULT_SEED_LENGTH)]
        length: usize,
    },
    /// Decode and convert skylinks
    Skylink {
        #[command(subcommand)]
        cmd: SkylinkCmd,
    },
    /// Print the padded size of an encrypted file of SIZE bytes
    Pad { size: u64 },
    /// Read and write raw registry entries
    Registry {
        #[command(subcommand)]
        cmd: RegistryCmd,
    },
    /// Read and write JSON stored with SkyDB
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SkylinkEncoding {
    Base32,
    Base64,
}

#[derive(Subcommand)]
enum SkylinkCmd {
    /// Print the version, bitfield and merkle root of a skylink
    Decode {
        /// Base32 or base64 skylink, a `sia:` URI or a portal URL
        skylink: String,
    },
    /// Convert a skylink between its base32 and base64 forms
    Convert {
        skylink: String,
        #[arg(long, value_enum)]
        to: SkylinkEncoding,
    },
    /// Print a skylink as a `sia://` URI
    Format { skylink: String },
}

#[derive(Subcommand)]
enum RegistryCmd {
    /// Fetch an entry
    Get {
        /// Owner public key in hex, optionally prefixed with `ed25519:`
        public_key: String,
        data_key: String,
        /// DATA_KEY is an already hashed key in hex
        #[arg(long, action = ArgAction::SetTrue)]
        hashed: bool,
    },
    /// Write raw data (up to 70 bytes) to an entry of the seed's key pair
    SetData {
        #[arg(long)]
        seed: String,
        data_key: String,
        /// Entry data in hex
        data: String,
    },
    /// Print the v2 skylink resolving to an entry
    Link {
        public_key: String,
        data_key: String,
        #[arg(long, action = ArgAction::SetTrue)]
        hashed: bool,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    /// Fetch the JSON value stored at DATA_KEY
    GetJson { public_key: String, data_key: String },
    /// Store a JSON value at DATA_KEY
    SetJson {
        #[arg(long)]
        seed: String,
        data_key: String,
        /// JSON document, e.g. '{"name": "alice"}'
        json: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // stdout carries command output, logs go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    // Configs live under ~/.config/sky/config.toml (or the platform equivalent).
    let dirs =
        ProjectDirs::from("", "", "sky").context("failed to determine config directory path")?;
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_file(&dirs));

    let overrides = config::Overrides {
        portal_url: cli.portal,
        api_key: cli.api_key,
    };
    cmd::run_command(config_file, overrides, cli.cmd).await
}
