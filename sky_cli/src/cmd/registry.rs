use anyhow::{Context, Result};
use sky_core::DataKey;
use sky_registry::{ClientConfig, HttpRegistry, RegistryClient, get_entry_link};
use tracing::info;

use super::db::open_db;
use crate::RegistryCmd;
use crate::helpers::{key_pair_from_seed, parse_data_key, parse_hex_data, parse_public_key};

pub async fn run_registry(cmd: RegistryCmd, config: &ClientConfig) -> Result<()> {
    match cmd {
        RegistryCmd::Get {
            public_key,
            data_key,
            hashed,
        } => {
            let client = client(config)?;
            let public_key = parse_public_key(&public_key)?;
            let data_key = parse_data_key(&data_key, hashed)?;
            match client
                .get_entry(&public_key, &data_key)
                .await
                .context("failed to fetch registry entry")?
            {
                Some(signed) => {
                    println!("revision:  {}", signed.entry.revision);
                    println!("data:      {}", hex::encode(&signed.entry.data));
                    println!("signature: {}", signed.signature.to_hex());
                }
                None => println!("entry not found"),
            }
        }
        RegistryCmd::SetData {
            seed,
            data_key,
            data,
        } => {
            let db = open_db(config)?;
            let keys = key_pair_from_seed(&seed)?;
            let data = parse_hex_data(&data)?;
            db.set_entry_data(&keys, &data_key, &data)
                .await
                .context("failed to write registry entry")?;

            let hashed = DataKey::from(data_key.as_str()).hashed();
            if let Some(revision) = db.cache().cached_revision(&keys.public_key(), &hashed) {
                info!(revision, "registry entry written");
                println!("revision: {revision}");
            }
        }
        RegistryCmd::Link {
            public_key,
            data_key,
            hashed,
        } => {
            let link = get_entry_link(
                &parse_public_key(&public_key)?,
                &parse_data_key(&data_key, hashed)?,
            )?;
            println!("{}", link.to_base64());
        }
    }
    Ok(())
}

fn client(config: &ClientConfig) -> Result<RegistryClient<HttpRegistry>> {
    Ok(RegistryClient::new(HttpRegistry::from_config(config)?)
        .with_signature_verification(config.verify_signatures))
}
