use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, Cli, InitArgs};
use crate::core::backup::{BACKUP_DIR, BackupConfig};
use crate::core::guard::DEFAULT_MAX_FILE_SIZE;
use crate::core::store::StoreConfig;
use crate::infra::io::write_atomic;

/// Config file names, first match wins.
pub const CONFIG_FILES: &[&str] = &["aicode.toml", "aicode.yaml", "aicode.json", ".aicode.toml"];

/// `AICODE_<SECTION>__<KEY>`
pub const ENV_PREFIX: &str = "AICODE";

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// File load/save limits
    pub files: FilesConfig,

    /// Chat model settings
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig
{
    pub max_file_size: u64,
    pub backups: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig
{
    pub name: String,
    pub endpoint: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for FilesConfig
{
    fn default() -> Self
    {
        Self { max_file_size: DEFAULT_MAX_FILE_SIZE, backups: true }
    }
}

impl Default for ModelConfig
{
    fn default() -> Self
    {
        Self {
            name: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

impl Config
{
    /// Command-line flags win over files and environment.
    pub fn apply_cli(
        &mut self,
        cli: &Cli,
    )
    {
        if cli.no_backup
        {
            self.files.backups = false;
        }
        if let Some(max) = cli.max_file_size
        {
            self.files.max_file_size = max;
        }
        if let Some(key) = &cli.api_key
        {
            self.model.api_key = Some(key.clone());
        }
        if let Some(model) = &cli.model
        {
            self.model.name = model.clone();
        }
    }

    pub fn store_config(&self) -> StoreConfig
    {
        StoreConfig {
            max_file_size: self.files.max_file_size,
            backup: BackupConfig { enabled: self.files.backups, dir: PathBuf::from(BACKUP_DIR) },
        }
    }
}

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Defaults, then the first config file found in `dir`, then `AICODE_*`
/// environment variables (`AICODE_MODEL__NAME`, `AICODE_FILES__BACKUPS`, ...).
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    load_config_with(dir, None)
}

/// `vars` replaces the process environment when given.
fn load_config_with(
    dir: &Path,
    vars: Option<config::Map<String, String>>,
) -> Result<Config>
{
    let mut builder = config::Config::builder();

    for name in CONFIG_FILES
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(vars),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("aicode.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::create_dir_all(&args.path).context("Failed to create config directory")?;
    write_atomic(&config_path, toml_string.as_bytes()).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
