//! TOML configuration.
//!
//! Loaded once per run from `--config` and validated up front so a bad
//! value fails before any request is sent. A few settings can be
//! overridden from the command line (see [`Overrides`]).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use archive_sync_core::batch::DEFAULT_BLOCKSIZE;
use archive_sync_core::profile::IndexProfile;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub dirs: DirsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub url: String,
    pub name: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding an API key sent as `x-api-key`.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_profile() -> String {
    "fbi".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_blocksize")]
    pub blocksize: usize,
    /// Keep going after a unit of work fails instead of stopping the run.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            blocksize: DEFAULT_BLOCKSIZE,
            continue_on_error: false,
        }
    }
}

fn default_blocksize() -> usize {
    DEFAULT_BLOCKSIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_deposit_dir")]
    pub deposit_dir: PathBuf,
    #[serde(default = "default_deposit_prefix")]
    pub deposit_prefix: String,
    #[serde(default = "default_checksum_dir")]
    pub checksum_dir: PathBuf,
    #[serde(default = "default_checksum_prefix")]
    pub checksum_prefix: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            deposit_dir: default_deposit_dir(),
            deposit_prefix: default_deposit_prefix(),
            checksum_dir: default_checksum_dir(),
            checksum_prefix: default_checksum_prefix(),
        }
    }
}

fn default_deposit_dir() -> PathBuf {
    PathBuf::from("/badc/ARCHIVE_INFO/deposit_logs")
}
fn default_deposit_prefix() -> String {
    "deposit_ingest1.".to_string()
}
fn default_checksum_dir() -> PathBuf {
    PathBuf::from("/datacentre/stats/checkm")
}
fn default_checksum_prefix() -> String {
    "checkm.".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./esync-output")
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FiltersConfig {
    /// JSON file mapping index aliases to accepted path roots.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Directory index updated from deposit logs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DirsConfig {
    /// Index holding one document per archive directory, on the same
    /// cluster as `[index]`. Directory changes are not applied when unset.
    #[serde(default)]
    pub index: Option<String>,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub index: Option<String>,
    pub blocksize: Option<usize>,
}

impl Config {
    /// The index profile named by `index.profile`.
    pub fn profile(&self) -> Result<IndexProfile> {
        self.index.profile.parse()
    }

    /// The API key, if one is configured and present in the environment.
    pub fn api_key(&self) -> Result<Option<String>> {
        match &self.index.api_key_env {
            None => Ok(None),
            Some(var) => std::env::var(var)
                .map(Some)
                .with_context(|| format!("{} environment variable not set", var)),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    load_config_with(path, &Overrides::default())
}

pub fn load_config_with(path: &Path, overrides: &Overrides) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if let Some(url) = &overrides.url {
        config.index.url = url.clone();
    }
    if let Some(index) = &overrides.index {
        config.index.name = index.clone();
    }
    if let Some(blocksize) = overrides.blocksize {
        config.batch.blocksize = blocksize;
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(config.index.url.starts_with("http://") || config.index.url.starts_with("https://")) {
        anyhow::bail!(
            "index.url must start with http:// or https://, got '{}'",
            config.index.url
        );
    }

    if config.index.name.trim().is_empty() {
        anyhow::bail!("index.name must not be empty");
    }

    if config.index.timeout_secs == 0 {
        anyhow::bail!("index.timeout_secs must be > 0");
    }

    if config.batch.blocksize == 0 {
        anyhow::bail!("batch.blocksize must be > 0");
    }

    if let Some(dirs) = &config.dirs.index {
        if dirs.trim().is_empty() {
            anyhow::bail!("dirs.index must not be empty when set");
        }
    }

    config.profile()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[index]
url = "http://localhost:9200"
name = "ceda-fbi"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.batch.blocksize, 800);
        assert!(!config.batch.continue_on_error);
        assert_eq!(config.index.profile, "fbi");
        assert_eq!(config.index.timeout_secs, 60);
        assert_eq!(config.logs.deposit_prefix, "deposit_ingest1.");
        assert_eq!(config.logs.checksum_prefix, "checkm.");
        assert!(config.filters.path.is_none());
        assert!(config.dirs.index.is_none());
        assert_eq!(config.profile().unwrap().location_field, "info.location");
    }

    #[test]
    fn overrides_win_over_file() {
        let file = write_config(MINIMAL);
        let overrides = Overrides {
            url: Some("https://es.example.org".into()),
            index: Some("ceda-eo".into()),
            blocksize: Some(50),
        };
        let config = load_config_with(file.path(), &overrides).unwrap();
        assert_eq!(config.index.url, "https://es.example.org");
        assert_eq!(config.index.name, "ceda-eo");
        assert_eq!(config.batch.blocksize, 50);
    }

    #[test]
    fn zero_blocksize_is_rejected() {
        let file = write_config(&format!("{MINIMAL}\n[batch]\nblocksize = 0\n"));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("blocksize"));
    }

    #[test]
    fn unknown_profile_is_rejected() {
        let file = write_config(
            "[index]\nurl = \"http://localhost:9200\"\nname = \"x\"\nprofile = \"nope\"\n",
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Unknown index profile"));
    }

    #[test]
    fn dirs_index_is_read_and_checked() {
        let file = write_config(&format!("{MINIMAL}\n[dirs]\nindex = \"ceda-dirs\"\n"));
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.dirs.index.as_deref(), Some("ceda-dirs"));

        let file = write_config(&format!("{MINIMAL}\n[dirs]\nindex = \" \"\n"));
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn url_needs_a_scheme() {
        let file = write_config("[index]\nurl = \"localhost:9200\"\nname = \"x\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn missing_api_key_variable_is_an_error() {
        let file = write_config(&format!(
            "{MINIMAL}api_key_env = \"ESYNC_TEST_KEY_THAT_IS_NOT_SET\"\n"
        ));
        let config = load_config(file.path()).unwrap();
        assert!(config.api_key().is_err());
    }
}
