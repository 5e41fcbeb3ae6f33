pub mod settings;

pub use settings::{HttpSettings, ProviderEntry, SceneSelection, Settings};
