use std::path::Path;

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use tracing::{debug, info};
use vismem_experiment::SessionConfig;

/// Defaults, then the JSON file when given, then `VISMEM_*` variables.
pub fn load(path: Option<&Path>) -> Result<SessionConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(SessionConfig::default()));

    if let Some(path) = path {
        info!(path = %path.display(), "loading session settings");
        figment = figment.merge(Json::file(path));
    }

    resolve(figment.merge(Env::prefixed("VISMEM_")))
}

/// Extracts, clamps into supported ranges and validates.
pub fn resolve(figment: Figment) -> Result<SessionConfig> {
    let raw: SessionConfig = figment
        .extract()
        .context("failed to load session settings")?;
    let config = raw.normalized();
    if config != raw {
        debug!(?raw, ?config, "settings clamped to supported ranges");
    }
    config.validate().context("invalid session settings")?;
    Ok(config)
}
