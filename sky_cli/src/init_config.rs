use std::{fs, io::Write, path::Path};

use anyhow::Context;
use clap::Subcommand;
use sky_registry::ClientConfig;
use toml_edit::{DocumentMut, Item};
use tracing::info;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the config file if it doesn't exist and fills in missing defaults
    Init,
    /// Prints the effective config, including command line overrides
    Show,
}

/// Adds every top-level key and nested table entry of `defaults` that `doc`
/// does not have yet. Existing values and comments are kept.
pub fn merge_defaults(doc: &mut DocumentMut, defaults: &DocumentMut) {
    for (key, item) in defaults.iter() {
        if !doc.contains_key(key) {
            doc.insert(key, item.clone());
            continue;
        }
        if let (Some(Item::Table(existing)), Item::Table(default_table)) = (doc.get_mut(key), item) {
            for (nested_key, nested_item) in default_table.iter() {
                if !existing.contains_key(nested_key) {
                    existing.insert(nested_key, nested_item.clone());
                }
            }
        }
    }
}

/// Creates `config_file` or completes it with the default values.
pub fn init_config_file(config_file: &Path) -> anyhow::Result<()> {
    let mut doc = if config_file.exists() {
        fs::read_to_string(config_file)?
    } else {
        if let Some(parent) = config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        "".to_owned()
    }
    .parse::<DocumentMut>()
    .context("could not parse config file")?;

    let defaults = toml::to_string(&ClientConfig::default())?
        .parse::<DocumentMut>()
        .context("could not encode default config")?;
    merge_defaults(&mut doc, &defaults);

    info!("writing to config file {config_file:?}");

    let tmp_path = config_file.with_extension("tmp");
    let mut tmp = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;
    tmp.write_all(doc.to_string().as_bytes())?;
    tmp.sync_all()?;
    fs::rename(&tmp_path, config_file)?;
    Ok(())
}
