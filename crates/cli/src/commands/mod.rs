pub mod config_cmd;
pub mod models;
pub mod run;
pub mod status;

use std::sync::Arc;

use deepdive_config::AppConfig;
use deepdive_core::StateStore;
use deepdive_core::provider::Provider;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

pub(crate) async fn open_store(config: &AppConfig) -> Result<Arc<dyn StateStore>, Box<dyn std::error::Error>> {
    let store = deepdive_store::open(&config.store)
        .await
        .map_err(|e| format!("Failed to open {} store: {e}", config.store.backend))?;
    Ok(store)
}

pub(crate) fn default_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    let router = deepdive_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not available", router.default_name()))?;
    Ok(provider)
}
