use crate::errors::{Error, Result};
use config::{Config, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of the environment overrides, `NETATMO_EXPORTER_<SECTION>_<FIELD>`.
pub const ENV_PREFIX: &str = "NETATMO_EXPORTER";

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_API_URL: &str = "https://api.netatmo.com";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InfluxSettings {
    pub url: String,
    pub token: String,
    pub bucket: String,
    pub org: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetatmoSettings {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// UNIX seconds after which `access_token` is no longer accepted.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub influx: InfluxSettings,
    pub netatmo: NetatmoSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Influx,
    Netatmo,
}

impl Section {
    pub fn key(&self) -> &'static str {
        match self {
            Section::Influx => "influx",
            Section::Netatmo => "netatmo",
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        match self {
            Section::Influx => &["url", "token", "bucket", "org", "batch_size"],
            Section::Netatmo => &[
                "client_id",
                "client_secret",
                "username",
                "password",
                "access_token",
                "refresh_token",
                "expires_at",
                "api_url",
            ],
        }
    }
}

/// On-disk formats a config file can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Toml,
        }
    }

    fn file_format(&self) -> FileFormat {
        match self {
            ConfigFormat::Toml => FileFormat::Toml,
            ConfigFormat::Yaml => FileFormat::Yaml,
        }
    }
}

/// Where one section of the settings lives: either nested under
/// `[section]` in a combined file, or at the top level of its own file.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSource {
    pub path: PathBuf,
    pub nested: bool,
}

impl SectionSource {
    pub fn key_for(&self, section: Section, field: &str) -> String {
        if self.nested {
            format!("{}.{}", section.key(), field)
        } else {
            field.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSources {
    pub influx: SectionSource,
    pub netatmo: SectionSource,
}

impl ConfigSources {
    /// Sections without a dedicated file are read from `combined`.
    pub fn new(combined: &Path, influx: Option<&Path>, netatmo: Option<&Path>) -> Self {
        let source = |dedicated: Option<&Path>| match dedicated {
            Some(path) => SectionSource {
                path: path.to_path_buf(),
                nested: false,
            },
            None => SectionSource {
                path: combined.to_path_buf(),
                nested: true,
            },
        };

        Self {
            influx: source(influx),
            netatmo: source(netatmo),
        }
    }
}

pub fn env_var_name(section: Section, field: &str) -> String {
    format!(
        "{}_{}_{}",
        ENV_PREFIX,
        section.key().to_uppercase(),
        field.to_uppercase()
    )
}

/// Environment lookup backed by the process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

pub fn load<E>(sources: &ConfigSources, env: E) -> Result<Settings>
where
    E: Fn(&str) -> Option<String>,
{
    Ok(Settings {
        influx: load_section(&sources.influx, Section::Influx, &env)?,
        netatmo: load_section(&sources.netatmo, Section::Netatmo, &env)?,
    })
}

pub fn load_section<T, E>(source: &SectionSource, section: Section, env: E) -> Result<T>
where
    T: DeserializeOwned,
    E: Fn(&str) -> Option<String>,
{
    let config_error = |source_err| Error::Config {
        path: source.path.clone(),
        source: source_err,
    };

    let format = ConfigFormat::from_path(&source.path);
    let mut builder = Config::builder()
        .add_source(File::from(source.path.clone()).format(format.file_format()));

    for field in section.fields() {
        let var = env_var_name(section, field);
        if let Some(value) = env(&var) {
            debug!("Overriding {}.{} from {}", section.key(), field, var);
            builder = builder
                .set_override(source.key_for(section, field), value)
                .map_err(config_error)?;
        }
    }

    let config = builder.build().map_err(config_error)?;

    if source.nested {
        config.get::<T>(section.key()).map_err(config_error)
    } else {
        config.try_deserialize::<T>().map_err(config_error)
    }
}
