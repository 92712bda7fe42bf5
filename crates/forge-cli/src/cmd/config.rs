use crate::output::print_json;
use anyhow::Context;
use forge_core::{EngineConfig, WarnLevel};
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let config = EngineConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "path": config_path,
            "config": config,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else {
        println!("# {}", config_path.display());
        print!("{}", config.to_yaml()?);
        if warnings.is_empty() {
            println!("\nConfig is valid. No warnings.");
        } else {
            println!();
            for w in &warnings {
                let prefix = match w.level {
                    WarnLevel::Warning => "warning",
                    WarnLevel::Error => "error",
                };
                println!("[{prefix}] {}", w.message);
            }
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
