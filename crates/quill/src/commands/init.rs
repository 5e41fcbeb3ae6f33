use anyhow::Result;
use std::path::Path;

const DEFAULT_CONFIG: &str = r#"# Quill LLM configuration

[http]
# Seconds of silence tolerated between reads; live streams are not capped
read_timeout_secs = 120
connect_timeout_secs = 10

# One [[providers]] block per configured vendor endpoint.
# type: openai | anthropic | google | deepseek | openRouter | customOpenAI
#       zhipu | dashscope | minimax
# base_url defaults per type; customOpenAI requires one.
# api_key may be inlined or read from the variable named by api_key_env.

[[providers]]
id = "openai"
type = "openai"
api_key_env = "OPENAI_API_KEY"
models = ["gpt-4o-mini"]

[[providers]]
id = "claude"
type = "anthropic"
api_key_env = "ANTHROPIC_API_KEY"
models = ["claude-3-5-haiku-latest"]

[[providers]]
id = "gemini"
type = "google"
api_key_env = "GEMINI_API_KEY"
models = ["gemini-2.0-flash"]

[[providers]]
id = "openrouter"
type = "openRouter"
api_key_env = "OPENROUTER_API_KEY"
models = ["openai/gpt-4o-mini"]

# Extra headers are merged into every request; protocol headers win.
# [providers.headers]
# X-Title = "My Reading Group"

[scenes.summary]
provider = "claude"
model = "claude-3-5-haiku-latest"

[scenes.translation]
provider = "openai"
model = "gpt-4o-mini"

[scenes.qa]
provider = "gemini"
model = "gemini-2.0-flash"

[scenes.tags]
provider = "openrouter"
model = "openai/gpt-4o-mini"
"#;

/// Write the sample config file
pub fn run_init(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Config already exists at {:?}", path);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    println!("Created config at {:?}", path);
    Ok(())
}
