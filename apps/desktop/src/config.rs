use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use client_core::{transport::engine_ws_url, Keymap};
use serde::Deserialize;

const ENV_PREFIX: &str = "APP__";
const KEYMAP_ENV_PREFIX: &str = "KEYMAP__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub engine_url: String,
    pub elf_file: Option<PathBuf>,
    pub log_filter: String,
    pub run_timeout_secs: Option<u64>,
    /// Binding name to chord, e.g. `run = "f6"`.
    pub keymap: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine_url: "ws://127.0.0.1:7878".into(),
            elf_file: None,
            log_filter: "info".into(),
            run_timeout_secs: None,
            keymap: HashMap::new(),
        }
    }
}

/// Values given on the command line; each one overrides file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub engine_url: Option<String>,
    pub elf_file: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub run_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    engine_url: Option<String>,
    elf_file: Option<PathBuf>,
    log_filter: Option<String>,
    run_timeout_secs: Option<u64>,
    #[serde(default)]
    keymap: HashMap<String, String>,
}

impl Settings {
    pub fn keymap(&self) -> anyhow::Result<Keymap> {
        Keymap::default()
            .with_overrides(&self.keymap)
            .context("invalid keymap override")
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn apply_file(&mut self, raw: &str) -> anyhow::Result<()> {
        let file_cfg: FileConfig = toml::from_str(raw)?;
        if let Some(v) = file_cfg.engine_url {
            self.engine_url = v;
        }
        if let Some(v) = file_cfg.elf_file {
            self.elf_file = Some(v);
        }
        if let Some(v) = file_cfg.log_filter {
            self.log_filter = v;
        }
        if let Some(v) = file_cfg.run_timeout_secs {
            self.run_timeout_secs = Some(v);
        }
        self.keymap.extend(file_cfg.keymap);
        Ok(())
    }

    fn apply_env(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            let Some(key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if let Some(binding) = key.strip_prefix(KEYMAP_ENV_PREFIX) {
                self.keymap.insert(binding.to_ascii_lowercase(), value);
                continue;
            }
            match key {
                "ENGINE_URL" => self.engine_url = value,
                "ELF_FILE" => self.elf_file = Some(PathBuf::from(value)),
                "LOG_FILTER" => self.log_filter = value,
                "RUN_TIMEOUT_SECS" => {
                    if let Ok(parsed) = value.parse::<u64>() {
                        self.run_timeout_secs = Some(parsed);
                    }
                }
                _ => {}
            }
        }
    }

    fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(v) = &cli.engine_url {
            self.engine_url = v.clone();
        }
        if let Some(v) = &cli.elf_file {
            self.elf_file = Some(v.clone());
        }
        if let Some(v) = &cli.log_filter {
            self.log_filter = v.clone();
        }
        if let Some(v) = cli.run_timeout_secs {
            self.run_timeout_secs = Some(v);
        }
    }
}

/// Builds settings from defaults, then `config_path` if it exists, then
/// `APP__*` environment variables, then the command line.
pub fn load_settings(config_path: &Path, cli: &CliOverrides) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if config_path.exists() {
        let raw = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        settings
            .apply_file(&raw)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
    }

    settings.apply_env(std::env::vars());
    settings.apply_cli(cli);
    validate_engine_url(&settings.engine_url)?;
    settings.keymap()?;
    Ok(settings)
}

/// Accepts `ws`/`wss` addresses and `http`/`https` ones the transport
/// rewrites to WebSocket.
fn validate_engine_url(raw: &str) -> anyhow::Result<()> {
    engine_ws_url(raw)?;
    Ok(())
}
