use anyhow::{Context, Result};
use sky_registry::{ClientConfig, HttpBlobStore, HttpRegistry, PortalClient, RegistryClient, SkyDb};

use crate::DbCmd;
use crate::helpers::{key_pair_from_seed, parse_public_key};

pub async fn run_db(cmd: DbCmd, config: &ClientConfig) -> Result<()> {
    let db = open_db(config)?;
    match cmd {
        DbCmd::GetJson {
            public_key,
            data_key,
        } => {
            let public_key = parse_public_key(&public_key)?;
            let response = db
                .get_json(&public_key, &data_key)
                .await
                .context("failed to read JSON")?;
            match response.data {
                Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
                None => println!("null"),
            }
        }
        DbCmd::SetJson {
            seed,
            data_key,
            json,
        } => {
            let keys = key_pair_from_seed(&seed)?;
            let value: serde_json::Value =
                serde_json::from_str(&json).context("argument is not valid JSON")?;
            let response = db
                .set_json(&keys, &data_key, &value)
                .await
                .context("failed to write JSON")?;
            if let Some(link) = response.data_link {
                println!("stored at {}", link.to_base64());
            }
        }
    }
    Ok(())
}

pub(super) fn open_db(config: &ClientConfig) -> Result<SkyDb<HttpRegistry, HttpBlobStore>> {
    let portal = PortalClient::from_config(config)?;
    let client =
        RegistryClient::new(portal.registry()).with_signature_verification(config.verify_signatures);
    Ok(SkyDb::new(client, portal.blob_store()))
}
