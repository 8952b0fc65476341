use crate::cli::Cli;
use crate::notify::SlackConfig;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Please specify valid api hostname using --api")]
    MissingApi,

    #[error("failed to read token file {path}: {source}")]
    Token {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token file {0} is empty")]
    EmptyToken(PathBuf),

    #[error("failed to read CA store {path}: {source}")]
    CaStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the feeds and observers need, resolved once at startup.
#[derive(Debug)]
pub struct Settings {
    pub api_base: String,
    pub token: String,
    pub namespace: Option<String>,
    pub ca_pem: Option<Vec<u8>>,
    pub color: bool,
    pub slack: Option<SlackConfig>,
}

impl Settings {
    pub fn from_cli(
        cli: &Cli,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api = cli
            .api
            .as_deref()
            .filter(|api| !api.is_empty())
            .ok_or(ConfigError::MissingApi)?;

        let token = match &cli.api_token {
            Some(token) => token.trim().to_string(),
            None => read_token(&expand_home(&cli.token))?,
        };

        let ca_pem = cli
            .ca_store
            .as_ref()
            .map(|path| {
                std::fs::read(path).map_err(|source| ConfigError::CaStore {
                    path: path.clone(),
                    source,
                })
            })
            .transpose()?;

        Ok(Settings {
            api_base: api_base(api),
            token,
            namespace: cli.namespace.clone().filter(|ns| !ns.is_empty()),
            ca_pem,
            color: cli.color_enabled(),
            slack: slack_from_env(env),
        })
    }
}

pub fn api_base(host: &str) -> String {
    format!("https://{}/api/v1", host.trim_end_matches('/'))
}

/// Slack is enabled only when both the token and the channel are set.
pub fn slack_from_env(env: impl Fn(&str) -> Option<String>) -> Option<SlackConfig> {
    let token = env("SLACK_TOKEN").filter(|v| !v.is_empty())?;
    let channel = env("SLACK_CHANNEL").filter(|v| !v.is_empty())?;
    Some(SlackConfig { token, channel })
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

fn read_token(path: &Path) -> Result<String, ConfigError> {
    let token = std::fs::read_to_string(path).map_err(|source| ConfigError::Token {
        path: path.to_path_buf(),
        source,
    })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(ConfigError::EmptyToken(path.to_path_buf()));
    }
    Ok(token.to_string())
}
