use anyhow::{Context, Result, anyhow};
use sky_core::Skylink;
use sky_core::skylink::{
    ParseSkylinkOptions, convert_skylink_to_base32, convert_skylink_to_base64, format_skylink,
    parse_skylink_url,
};

use crate::{SkylinkCmd, SkylinkEncoding};

pub fn run_skylink(cmd: SkylinkCmd) -> Result<()> {
    match cmd {
        SkylinkCmd::Decode { skylink } => {
            let id = parse_skylink_url(&skylink, ParseSkylinkOptions::default())?
                .ok_or_else(|| anyhow!("no skylink found in '{skylink}'"))?;
            let skylink = Skylink::parse(&id).context("failed to decode skylink")?;
            let version = if skylink.is_v2() { 2 } else { 1 };
            println!("version:     {version}");
            println!("bitfield:    {}", skylink.bitfield);
            println!("merkle root: {}", hex::encode(skylink.merkle_root));
            println!("base64:      {}", skylink.to_base64());
            println!("base32:      {}", skylink.to_base32());
        }
        SkylinkCmd::Convert { skylink, to } => {
            let converted = match to {
                SkylinkEncoding::Base32 => convert_skylink_to_base32(&skylink)?,
                SkylinkEncoding::Base64 => convert_skylink_to_base64(&skylink)?,
            };
            println!("{converted}");
        }
        SkylinkCmd::Format { skylink } => {
            // Validate before formatting so typos don't turn into URIs.
            Skylink::parse(&skylink).context("failed to decode skylink")?;
            println!("{}", format_skylink(&skylink));
        }
    }
    Ok(())
}
