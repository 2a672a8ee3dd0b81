//! `deepdive config`: configuration management commands.

use deepdive_config::AppConfig;

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🦀 DeepDive Configuration");
    println!("========================");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Provider:      {}", config.default_provider);
    println!("  Model:         {}", config.default_model);
    println!("  API key:       {}", if config.has_api_key() { "set" } else { "missing" });
    println!("  Store:         {} ({})", config.store.backend, config.store.resolved_path().display());
    println!("  Courtesy:      {} ms", config.pipeline.courtesy_delay_ms);
    println!(
        "  Retry:         {} retries, {}..{} ms, x{}",
        config.pipeline.retry.max_retries,
        config.pipeline.retry.initial_delay_ms,
        config.pipeline.retry.max_delay_ms,
        config.pipeline.retry.backoff_multiplier
    );
    Ok(())
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");
            if config.has_api_key() {
                println!("   ✅ All checks passed");
            } else {
                println!("   ⚠️  No API key set (set DEEPDIVE_API_KEY or GEMINI_API_KEY env var)");
            }
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
        }
    }
    Ok(())
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let dir = AppConfig::config_dir();
    let path = dir.join("config.toml");
    if path.exists() {
        println!("⚠️  Config already exists at {}", path.display());
        return Ok(());
    }

    std::fs::create_dir_all(&dir)?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", path.display());
    Ok(())
}
