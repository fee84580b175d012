//! Layered configuration loader and path helpers.
//!
//! Merges built-in defaults, `config.toml`, `config.<env>.toml` (env taken from
//! `RUST_ENV`) and `APP_*` environment variables, in that order. Nested keys
//! use `__` in variable names, e.g. `APP_SEARCH__RRF_K=30`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::settings::Settings;

pub struct Config {
    figment: Figment,
    env_name: String,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load from the config files found in `dir`. Missing files are skipped.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            other => tracing::debug!(env = other, "no env-specific config file for this environment"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, env_name, base_dir: dir.to_path_buf() })
    }

    /// Defaults overlaid with an inline TOML document; no files or env vars.
    pub fn from_toml_str(toml: &str) -> Self {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml));
        Self { figment, env_name: "inline".to_string(), base_dir: PathBuf::from(".") }
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the typed settings, resolving data paths against
    /// the directory the config was loaded from.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        settings.data.vault_dir = resolve_with_base(&self.base_dir, &settings.data.vault_dir)
            .to_string_lossy()
            .into_owned();
        settings.data.index_dir = resolve_with_base(&self.base_dir, &settings.data.index_dir)
            .to_string_lossy()
            .into_owned();
        Ok(settings)
    }
}

/// Expand `~` and `${VAR}`/`$VAR` in a user-provided path without touching the
/// filesystem. Unknown variables are left as written.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let with_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    PathBuf::from(shellexpand::tilde(&with_env).as_ref())
}

/// Expand `p`, then join it onto `base` unless it is already absolute.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}
