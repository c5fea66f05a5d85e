//! Run configuration and environment variable parsing.
//!
//! Settings are read from the environment (optionally seeded from a dotenv file).
//! The issues run uses the `GH_ISSUES_` prefix and the merge run uses `GH_MERGE_`.
//! Everything that can make a run fail before any network traffic is checked here,
//! including creating the output file.

use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ISSUES_ENV_PREFIX: &str = "GH_ISSUES_";
pub const MERGE_ENV_PREFIX: &str = "GH_MERGE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("your configuration must specify both an owner and a name for the target GitHub repository")]
    MissingRepository,

    #[error("moving average window must be at least one day")]
    InvalidWindow,

    #[error("invalid configuration value: {0}")]
    Env(#[from] envy::Error),

    #[error("unable to open configuration file '{path}': {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("unable to create output file '{path}': {source}")]
    OutputNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("incorrect access rights to output file '{path}': {source}")]
    OutputPermission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open output file '{path}': {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A unique identifier for a GitHub repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RepoId {
    /// The owner of the repository (e.g., "rust-lang").
    pub owner: String,
    /// The name of the repository (e.g., "cargo").
    pub repo: String,
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Basic-auth credentials for the GitHub API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Loads a dotenv file into the process environment.
///
/// An explicitly named file must exist. Without a path, a `.env` in the working
/// directory is picked up if present.
pub fn load_env_file(path: Option<&Path>) -> Result<(), ConfigError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %path.display(), "Using configuration file");
        }
        None => {
            if let Ok(path) = dotenvy::dotenv() {
                tracing::debug!(path = %path.display(), "Loaded .env file");
            }
        }
    }
    Ok(())
}

/// Raw settings as they appear in the environment, before validation.
#[derive(Debug, Deserialize)]
struct RawIssuesConfig {
    repo_owner: Option<String>,
    repo_name: Option<String>,
    #[serde(default = "default_out_path")]
    out_path: PathBuf,
    username: Option<String>,
    password: Option<String>,
    #[serde(default = "default_api_base")]
    api_base: String,
    #[serde(default = "default_moving_avg_window")]
    moving_avg_window: usize,
}

fn default_out_path() -> PathBuf {
    PathBuf::from("./gh-issues.csv")
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_moving_avg_window() -> usize {
    30
}

/// Configuration for the issues run.
#[derive(Clone, Debug)]
pub struct IssuesConfig {
    /// Repository whose issues are counted.
    pub repo: RepoId,
    /// Where the issues CSV is written.
    pub out_path: PathBuf,
    /// Optional credentials; used only when both username and password are set.
    pub credentials: Option<Credentials>,
    /// Root of the REST API, without a trailing slash.
    pub api_base: String,
    /// Size of the trailing window (in days) for the moving averages.
    pub window: NonZeroUsize,
}

impl IssuesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw: RawIssuesConfig = envy::prefixed(ISSUES_ENV_PREFIX).from_env()?;
        log_defaults(
            ISSUES_ENV_PREFIX,
            &[
                ("OUT_PATH", default_out_path().display().to_string()),
                ("API_BASE", default_api_base()),
                ("MOVING_AVG_WINDOW", default_moving_avg_window().to_string()),
            ],
        );
        let config = Self::from_raw(raw)?;
        tracing::info!(config = ?config, "Resolved issues configuration");
        Ok(config)
    }

    fn from_raw(raw: RawIssuesConfig) -> Result<Self, ConfigError> {
        let repo = match (non_blank(raw.repo_owner), non_blank(raw.repo_name)) {
            (Some(owner), Some(repo)) => RepoId { owner, repo },
            _ => return Err(ConfigError::MissingRepository),
        };

        let credentials = match (non_blank(raw.username), raw.password) {
            (Some(username), Some(password)) => Some(Credentials { username, password }),
            _ => None,
        };

        let window = NonZeroUsize::new(raw.moving_avg_window).ok_or(ConfigError::InvalidWindow)?;

        Ok(Self {
            repo,
            out_path: raw.out_path,
            credentials,
            api_base: raw.api_base.trim_end_matches('/').to_string(),
            window,
        })
    }

    /// URL of the repository's issues collection.
    pub fn issues_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/issues",
            self.api_base, self.repo.owner, self.repo.repo
        )
    }

    /// Creates the output file up front so a bad path fails the run before any download.
    pub fn open_output(&self) -> Result<File, ConfigError> {
        create_output(&self.out_path)
    }
}

/// Configuration for the merge run.
#[derive(Clone, Debug, Deserialize)]
pub struct MergeConfig {
    /// The externally produced time series; its first column is the date key.
    #[serde(default = "default_series_path")]
    pub series_path: PathBuf,
    /// Issues CSV written by a previous issues run.
    #[serde(default = "default_out_path")]
    pub issues_path: PathBuf,
    #[serde(default = "default_merged_path")]
    pub merged_path: PathBuf,
}

fn default_series_path() -> PathBuf {
    PathBuf::from("./entropy.csv")
}

fn default_merged_path() -> PathBuf {
    PathBuf::from("./gh-entropy-issues.csv")
}

impl MergeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = envy::prefixed(MERGE_ENV_PREFIX).from_env()?;
        log_defaults(
            MERGE_ENV_PREFIX,
            &[
                ("SERIES_PATH", default_series_path().display().to_string()),
                ("ISSUES_PATH", default_out_path().display().to_string()),
                ("MERGED_PATH", default_merged_path().display().to_string()),
            ],
        );
        tracing::info!(config = ?config, "Resolved merge configuration");
        Ok(config)
    }
}

/// Names the settings that fell back to their defaults.
fn log_defaults(prefix: &str, defaults: &[(&str, String)]) -> Vec<String> {
    defaults
        .iter()
        .filter(|(key, _)| std::env::var_os(format!("{prefix}{key}")).is_none())
        .map(|(key, default)| {
            tracing::info!("'{prefix}{key}' not specified, using '{default}'");
            format!("{prefix}{key}")
        })
        .collect()
}

pub(crate) fn create_output(path: &Path) -> Result<File, ConfigError> {
    File::create(path).map_err(|source| {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => ConfigError::OutputNotFound { path, source },
            io::ErrorKind::PermissionDenied => ConfigError::OutputPermission { path, source },
            _ => ConfigError::Output { path, source },
        }
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ISSUE_VARS: [&str; 7] = [
        "GH_ISSUES_REPO_OWNER",
        "GH_ISSUES_REPO_NAME",
        "GH_ISSUES_OUT_PATH",
        "GH_ISSUES_USERNAME",
        "GH_ISSUES_PASSWORD",
        "GH_ISSUES_API_BASE",
        "GH_ISSUES_MOVING_AVG_WINDOW",
    ];

    fn clear_issue_vars() {
        for var in ISSUE_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_issue_vars();
        env::set_var("GH_ISSUES_REPO_OWNER", "rust-lang");
        env::set_var("GH_ISSUES_REPO_NAME", "cargo");
        env::set_var("GH_ISSUES_OUT_PATH", "/tmp/cargo-issues.csv");
        env::set_var("GH_ISSUES_USERNAME", "octocat");
        env::set_var("GH_ISSUES_PASSWORD", "hunter2");
        env::set_var("GH_ISSUES_API_BASE", "http://localhost:8080/");
        env::set_var("GH_ISSUES_MOVING_AVG_WINDOW", "7");

        let config = IssuesConfig::from_env().expect("Failed to load config");

        assert_eq!(config.repo.to_string(), "rust-lang/cargo");
        assert_eq!(config.out_path, PathBuf::from("/tmp/cargo-issues.csv"));
        assert_eq!(config.window.get(), 7);
        assert_eq!(
            config.issues_url(),
            "http://localhost:8080/repos/rust-lang/cargo/issues"
        );
        let credentials = config.credentials.expect("credentials should be set");
        assert_eq!(credentials.username, "octocat");
        assert!(!format!("{credentials:?}").contains("hunter2"));

        clear_issue_vars();
    }

    #[test]
    #[serial]
    fn test_config_defaults() {
        clear_issue_vars();
        env::set_var("GH_ISSUES_REPO_OWNER", "rust-lang");
        env::set_var("GH_ISSUES_REPO_NAME", "cargo");

        let config = IssuesConfig::from_env().expect("Failed to load config");

        assert_eq!(config.out_path, PathBuf::from("./gh-issues.csv"));
        assert_eq!(config.api_base, "https://api.github.com");
        assert_eq!(config.window.get(), 30);
        assert!(config.credentials.is_none());

        clear_issue_vars();
    }

    #[test]
    #[serial]
    fn test_config_missing_repo() {
        clear_issue_vars();
        env::set_var("GH_ISSUES_REPO_OWNER", "rust-lang");

        let result = IssuesConfig::from_env();
        assert!(matches!(result, Err(ConfigError::MissingRepository)));

        clear_issue_vars();
    }

    #[test]
    #[serial]
    fn test_config_zero_window_rejected() {
        clear_issue_vars();
        env::set_var("GH_ISSUES_REPO_OWNER", "rust-lang");
        env::set_var("GH_ISSUES_REPO_NAME", "cargo");
        env::set_var("GH_ISSUES_MOVING_AVG_WINDOW", "0");

        let result = IssuesConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidWindow)));

        clear_issue_vars();
    }

    #[test]
    #[serial]
    fn test_password_without_username_skips_auth() {
        clear_issue_vars();
        env::set_var("GH_ISSUES_REPO_OWNER", "rust-lang");
        env::set_var("GH_ISSUES_REPO_NAME", "cargo");
        env::set_var("GH_ISSUES_PASSWORD", "hunter2");

        let config = IssuesConfig::from_env().expect("Failed to load config");
        assert!(config.credentials.is_none());

        clear_issue_vars();
    }

    #[test]
    #[serial]
    fn test_merge_config_defaults() {
        env::remove_var("GH_MERGE_SERIES_PATH");
        env::remove_var("GH_MERGE_ISSUES_PATH");
        env::set_var("GH_MERGE_MERGED_PATH", "merged.csv");

        let config = MergeConfig::from_env().expect("Failed to load config");

        assert_eq!(config.series_path, PathBuf::from("./entropy.csv"));
        assert_eq!(config.issues_path, PathBuf::from("./gh-issues.csv"));
        assert_eq!(config.merged_path, PathBuf::from("merged.csv"));

        env::remove_var("GH_MERGE_MERGED_PATH");
    }

    #[test]
    #[serial]
    fn test_unset_settings_reported_as_defaults() {
        env::remove_var("GH_ISSUES_API_BASE");
        env::set_var("GH_ISSUES_OUT_PATH", "custom.csv");

        let defaulted = log_defaults(
            ISSUES_ENV_PREFIX,
            &[
                ("OUT_PATH", default_out_path().display().to_string()),
                ("API_BASE", default_api_base()),
            ],
        );
        assert_eq!(defaulted, vec!["GH_ISSUES_API_BASE".to_string()]);

        env::remove_var("GH_ISSUES_OUT_PATH");
    }

    #[cfg(unix)]
    #[test]
    fn test_output_in_read_only_directory_is_permission_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users ignore directory permissions; nothing to check then.
        if File::create(dir.path().join("writable-check")).is_ok() {
            return;
        }

        let err = create_output(&dir.path().join("issues.csv")).unwrap_err();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(err, ConfigError::OutputPermission { .. }));
        assert!(err.to_string().contains("incorrect access rights"));
    }

    #[test]
    fn test_output_in_missing_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("issues.csv");

        let err = create_output(&path).unwrap_err();
        assert!(matches!(err, ConfigError::OutputNotFound { .. }));
        assert!(err.to_string().contains("unable to create output file"));
    }
}
