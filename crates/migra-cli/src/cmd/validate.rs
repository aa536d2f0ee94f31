use super::Context;
use crate::output::print_json;
use migra_core::adapter::AdapterRegistry;
use migra_core::config::WarnLevel;

pub fn run(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let registry = AdapterRegistry::with_defaults();
    let issues = config.validate(&registry);
    let has_errors = issues.iter().any(|w| w.level == WarnLevel::Error);

    if ctx.json {
        print_json(&serde_json::json!({
            "valid": !has_errors,
            "issues": issues,
            "services": config.services.len(),
            "strategy": config.execution.strategy,
            "tenancy": config.tenancy().map(|t| t.mode.as_str()),
        }))?;
    } else {
        for w in &issues {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
        if !has_errors {
            println!("Configuration is valid");
            println!("  Services: {}", config.services.len());
            println!("  Strategy: {}", config.execution.strategy);
            if let Some(tenancy) = config.tenancy() {
                println!("  Tenancy: enabled ({})", tenancy.mode);
            }
        }
    }

    if has_errors {
        anyhow::bail!("configuration validation found errors");
    }
    Ok(())
}
