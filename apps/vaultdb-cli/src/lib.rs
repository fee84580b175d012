//! Shared setup for the vaultdb binaries.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use vaultdb_core::config::Config;
use vaultdb_core::Settings;

/// Log to stderr. `RUST_LOG` wins; otherwise `info`, or `debug` with `verbose`.
pub fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Layered settings from `dir` (default: the working directory).
pub fn load_settings(dir: Option<&Path>) -> Result<Settings> {
    let dir = dir.unwrap_or_else(|| Path::new("."));
    let config = Config::load_from(dir).with_context(|| format!("loading config from {}", dir.display()))?;
    config.settings().with_context(|| format!("invalid configuration (env {})", config.env_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dirs_resolve_next_to_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "[data]\nvault_dir = \"notes\"\n\n[search]\ndefault_k = 7\n")
            .unwrap();
        let settings = load_settings(Some(tmp.path())).unwrap();
        assert_eq!(Path::new(&settings.data.vault_dir), tmp.path().join("notes"));
        assert_eq!(Path::new(&settings.data.index_dir), tmp.path().join("index"));
        assert_eq!(settings.search.default_k, 7);
    }
}
