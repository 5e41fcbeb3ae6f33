use anyhow::{anyhow, Result};
use quill_llm::{ProviderEntry, Router, Settings};
use tracing::info;

/// Probe one provider, or every configured provider in order
pub async fn execute(
    router: &Router,
    settings: &Settings,
    provider_id: Option<String>,
    model: Option<String>,
    json: bool,
) -> Result<()> {
    let targets: Vec<&ProviderEntry> = match provider_id.as_deref() {
        Some(id) => vec![settings
            .provider(id)
            .ok_or_else(|| anyhow!("Unknown provider '{}'", id))?],
        None => settings.providers.iter().collect(),
    };

    if targets.is_empty() {
        println!("No providers configured");
        return Ok(());
    }

    let mut failures = 0usize;
    for provider in targets {
        let Some(model) = model.as_deref().or_else(|| provider.default_model()) else {
            println!("{:<14} skipped: no model listed", provider.id);
            continue;
        };

        info!(provider = %provider.id, model, "Testing connectivity");
        let report = router.test_connectivity(provider, model).await;
        if !report.success {
            failures += 1;
        }

        if json {
            let mut line = serde_json::to_value(&report)?;
            line["provider"] = serde_json::json!(provider.id);
            line["model"] = serde_json::json!(model);
            println!("{}", line);
        } else if report.success {
            println!("{:<14} ok      {:>6} ms  {}", provider.id, report.latency_ms, model);
        } else {
            println!(
                "{:<14} FAILED  {:>6} ms  {}: {}",
                provider.id,
                report.latency_ms,
                model,
                report.error.unwrap_or_default()
            );
        }
    }

    if failures > 0 {
        tracing::warn!(failures, "Some providers failed the connectivity test");
    }
    Ok(())
}
