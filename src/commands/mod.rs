pub mod code;
pub mod search;
pub mod validate;
pub mod zones;

use anyhow::{Context, Result};
use std::path::Path;

use terminjaeger::config::Config;

pub use code::code;
pub use search::search;
pub use validate::validate;
pub use zones::zones;

/// Config file (if any) overlaid with `TERMINJAEGER_*` variables
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?
            .with_env(),
        None => Config::from_env(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
