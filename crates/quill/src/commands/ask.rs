use std::io::Write;

use anyhow::{anyhow, bail, Result};
use futures::StreamExt;
use quill_llm::{cancellable, Message, ProviderEntry, Router, Settings};
use tokio_util::sync::CancellationToken;

use crate::cli::Target;

/// Send one prompt and print the answer, streamed unless `stream` is false
pub async fn execute(
    router: &Router,
    settings: &Settings,
    target: &Target,
    system: Option<String>,
    prompt: String,
    stream: bool,
) -> Result<()> {
    let (provider, model) = resolve_target(settings, target)?;

    let mut messages = Vec::new();
    if let Some(system) = system.as_deref() {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(&prompt));

    if !stream {
        let text = router.complete(&messages, provider, &model, false).await?;
        println!("{}", text);
        return Ok(());
    }

    // Ctrl-C ends the stream at the next read instead of killing the process
    let token = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        }
    });

    let mut chunks = cancellable(router.stream(&messages, provider, &model), token.clone());
    let mut stdout = std::io::stdout();
    let result = async {
        while let Some(chunk) = chunks.next().await {
            write!(stdout, "{}", chunk?)?;
            stdout.flush()?;
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;
    ctrl_c.abort();
    println!();

    if token.is_cancelled() {
        eprintln!("(cancelled)");
    }
    result
}

/// Provider and model from `--scene`, or `--provider` with `--model` or the
/// provider's first listed model
fn resolve_target<'a>(
    settings: &'a Settings,
    target: &Target,
) -> Result<(&'a ProviderEntry, String)> {
    if let Some(scene) = target.scene.as_deref() {
        let (provider, model) = settings.scene(scene)?;
        return Ok((provider, model.to_string()));
    }

    let Some(id) = target.provider.as_deref() else {
        bail!("Pass --provider <ID> or --scene <NAME>");
    };
    let provider = settings
        .provider(id)
        .ok_or_else(|| anyhow!("Unknown provider '{}'", id))?;
    let model = target
        .model
        .clone()
        .or_else(|| provider.default_model().map(str::to_string))
        .ok_or_else(|| anyhow!("Provider '{}' lists no models; pass --model", id))?;
    Ok((provider, model))
}
