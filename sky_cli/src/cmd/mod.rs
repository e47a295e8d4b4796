use std::path::PathBuf;

use anyhow::{Context, Result};
use sky_core::{KeyPair, pad_file_size};

use crate::config::{Overrides, load_config};
use crate::init_config::{CmdConfig, init_config_file};

mod db;
mod registry;
mod skylink;

pub use db::run_db;
pub use registry::run_registry;
pub use skylink::run_skylink;

pub async fn run_command(
    config_file: PathBuf,
    overrides: Overrides,
    cmd: crate::Commands,
) -> Result<()> {
    match cmd {
        crate::Commands::Config { cmd: CmdConfig::Init } => init_config_file(&config_file),
        crate::Commands::Config { cmd: CmdConfig::Show } => {
            let mut config = load_config(&config_file, overrides)?;
            if config.api_key.is_some() {
                config.api_key = Some("<redacted>".to_owned());
            }
            print!("{}", toml::to_string(&config)?);
            Ok(())
        }
        crate::Commands::Keygen { seed, length } => {
            let (keys, seed) = match seed {
                Some(seed) => (crate::helpers::key_pair_from_seed(&seed)?, seed),
                None => KeyPair::generate(length).context("failed to generate seed")?,
            };
            println!("seed:        {seed}");
            println!("public key:  {}", keys.public_key_hex());
            println!("private key: {}", keys.private_key_hex());
            Ok(())
        }
        crate::Commands::Skylink { cmd } => run_skylink(cmd),
        crate::Commands::Pad { size } => {
            println!("{}", pad_file_size(size)?);
            Ok(())
        }
        crate::Commands::Registry { cmd } => {
            let config = load_config(&config_file, overrides)?;
            run_registry(cmd, &config).await
        }
        crate::Commands::Db { cmd } => {
            let config = load_config(&config_file, overrides)?;
            run_db(cmd, &config).await
        }
    }
}
