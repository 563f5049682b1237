use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_PAGE_SIZE: usize = 5;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => {
                format!("Configuration problem: {detail}. Update quill.yaml.")
            }
        }
    }
}

/// Runtime settings for the client. Loaded from `quill.yaml` when one
/// exists; a missing file just means defaults. `QUILL_BASE_URL` overrides
/// the file either way.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub page_size: usize,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let section = match locate_config_file() {
            Some(path) => {
                let contents = fs::read_to_string(&path).map_err(|err| {
                    ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
                })?;
                let config: QuillConfig = serde_yaml::from_str(&contents).map_err(|err| {
                    ConfigError::Invalid(format!("invalid {}: {err}", path.display()))
                })?;
                config.app.unwrap_or_default()
            }
            None => AppSection::default(),
        };
        resolve_settings(section)
    }
}

fn resolve_settings(section: AppSection) -> Result<Settings, ConfigError> {
    let base_url = std::env::var("QUILL_BASE_URL")
        .ok()
        .or(section.base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let parsed = Url::parse(&base_url)
        .map_err(|err| ConfigError::Invalid(format!("invalid base url '{base_url}': {err}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::Invalid(format!(
            "base url '{base_url}' must be http or https"
        )));
    }

    let data_dir = section
        .data_dir
        .map(PathBuf::from)
        .unwrap_or_else(default_data_dir);
    let page_size = section.page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1);

    Ok(Settings {
        base_url,
        data_dir,
        page_size,
    })
}

fn default_data_dir() -> PathBuf {
    if let Some(base) = BaseDirs::new() {
        base.data_dir().join("quill")
    } else {
        PathBuf::from(".quill")
    }
}

fn locate_config_file() -> Option<PathBuf> {
    config_file_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn config_file_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("quill");
        paths.push(config_dir.join("quill.yaml"));
        paths.push(config_dir.join("quill.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".quill").join("quill.yaml"));
        paths.push(home_dir.join(".quill").join("quill.yml"));
    } else {
        paths.push(PathBuf::from("quill.yaml"));
        paths.push(PathBuf::from("quill.yml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct QuillConfig {
    app: Option<AppSection>,
}

#[derive(Debug, Default, Deserialize)]
struct AppSection {
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    data_dir: Option<String>,
    #[serde(default)]
    page_size: Option<usize>,
}
