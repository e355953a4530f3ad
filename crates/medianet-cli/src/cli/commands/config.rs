//! `medianet config` – show where the config lives and what is in effect.

use anyhow::Result;
use medianet_core::config::{self, MedianetConfig};

pub fn run_config(cfg: &MedianetConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    // Spell out the retry section even when the file omits it.
    let effective = MedianetConfig {
        retry: Some(cfg.retry.clone().unwrap_or_default()),
        ..cfg.clone()
    };
    print!("{}", toml_of(&effective)?);
    Ok(())
}

fn toml_of(cfg: &MedianetConfig) -> Result<String> {
    Ok(toml::to_string_pretty(cfg)?)
}
