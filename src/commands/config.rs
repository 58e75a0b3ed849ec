use anyhow::Result;
use colored::Colorize;
use agent_pricing::config::Config;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration with secrets masked
pub fn show(cfg: &Config) -> Result<()> {
    info!("Displaying configuration");
    let sanitized = sanitize_secrets(cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
///
/// Loading already validated the configuration; this prints a summary.
pub fn validate(cfg: &Config) -> Result<()> {
    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Server: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Database: {}", cfg.database.url);
    println!("  Enabled Providers: {}", enabled_providers(cfg).join(", "));
    println!(
        "  Background Refresh: {}",
        if cfg.refresh.enabled {
            "enabled".green()
        } else {
            "disabled".red()
        }
    );

    info!("Configuration validation successful");
    Ok(())
}

/// Sanitize secrets in configuration for safe display
fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    if let Some(key) = &sanitized.providers.openrouter.api_key {
        sanitized.providers.openrouter.api_key = Some(mask_api_key(key));
    }
    sanitized
}

/// Mask an API key for safe display
///
/// Shows first 7 and last 4 characters with an ellipsis in between
/// Example: "sk-or-v1-1234567890abcdef" -> "sk-or-v...cdef"
fn mask_api_key(key: &str) -> String {
    if key.len() <= 11 || !key.is_ascii() {
        // Too short to mask meaningfully
        return "***".to_string();
    }

    let prefix = &key[..7];
    let suffix = &key[key.len() - 4..];

    format!("{}...{}", prefix, suffix)
}

fn enabled_providers(cfg: &Config) -> Vec<&'static str> {
    let mut names = Vec::new();
    if cfg.providers.openrouter.enabled {
        names.push("openrouter");
    }
    if cfg.providers.litellm.enabled {
        names.push("litellm");
    }
    names
}
