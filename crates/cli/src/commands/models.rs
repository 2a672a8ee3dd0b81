//! `deepdive models`: list models the configured provider can serve.

use super::{default_provider, load_config};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let provider = default_provider(&config)?;

    println!("🔍 Checking provider '{}'...", provider.name());
    match provider.health_check().await {
        Ok(true) => println!("   ✅ Reachable"),
        Ok(false) => println!("   ⚠️  Provider reported unhealthy"),
        Err(e) => {
            println!("   ❌ {e}");
            return Ok(());
        }
    }

    let models = provider.list_models().await?;
    if models.is_empty() {
        println!("   No models reported");
        return Ok(());
    }

    println!();
    for model in &models {
        let marker = if *model == config.default_model { "*" } else { " " };
        println!(" {marker} {model}");
    }
    if !models.iter().any(|m| *m == config.default_model) {
        println!();
        println!("   ⚠️  Configured model '{}' is not in the list", config.default_model);
    }
    Ok(())
}
