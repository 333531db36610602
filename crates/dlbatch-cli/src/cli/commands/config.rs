//! `dlbatch config` – where the config lives and what it resolves to.

use anyhow::Result;
use dlbatch_core::config::{self, BatchConfig};
use std::path::Path;

pub fn run_show_config(explicit: Option<&Path>, cfg: &BatchConfig) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# {}", path.display());
    print!("{}", cfg.to_toml_string()?);
    Ok(())
}
