use quill_llm::Settings;

/// Print one line per configured provider
pub fn execute(settings: &Settings) {
    if settings.providers.is_empty() {
        println!("No providers configured");
        return;
    }

    for provider in &settings.providers {
        let key = if provider.resolved_api_key().is_some() {
            "key: set"
        } else {
            "key: MISSING"
        };
        println!(
            "{:<14} {:<14} {:<52} {}  [{}]",
            provider.id,
            provider.provider_type,
            provider.effective_base_url().unwrap_or("(no base URL)"),
            key,
            provider.models.join(", "),
        );
    }

    let mut scenes: Vec<_> = settings.scenes.iter().collect();
    scenes.sort_by(|a, b| a.0.cmp(b.0));
    for (scene, selection) in scenes {
        println!("scene {:<12} -> {} / {}", scene, selection.provider, selection.model);
    }
}
