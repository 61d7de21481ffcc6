use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    downloader::has_bundled_tool,
    error::{AppError, Result},
};

/// How often the UI drains the output queue while a download runs.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default directory for per-session log files, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Where the spotdl executable comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolSource {
    /// An explicit executable, or a bare name looked up on `PATH`
    Program(PathBuf),
    /// `<interpreter> -m spotdl`
    Python { interpreter: OsString },
    /// The executable embedded under `assets/`, extracted to the user cache dir
    Bundled,
}

impl ToolSource {
    /// Picks the bundled executable when one was embedded, otherwise the python module.
    fn detect(python: Option<OsString>) -> Self {
        if has_bundled_tool() {
            return ToolSource::Bundled;
        }
        let interpreter = python.unwrap_or_else(|| {
            OsString::from(if cfg!(target_os = "windows") { "python" } else { "python3" })
        });
        ToolSource::Python { interpreter }
    }
}

/// Everything a download needs besides the request itself.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tool: ToolSource,
    /// Write `~/.spotdl/config.json` from the environment and pass `--config --no-cache`
    pub bootstrap_config: bool,
    /// Home directory holding `.spotdl/`
    pub home_dir: Option<PathBuf>,
    /// Session log directory; `None` disables the log file
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let tool = match lookup("SPOTDL_GUI_TOOL").filter(|v| !v.is_empty()) {
            Some(program) => ToolSource::Program(program.into()),
            None => ToolSource::detect(lookup("SPOTDL_GUI_PYTHON").filter(|v| !v.is_empty())),
        };

        let log_dir = match lookup("SPOTDL_GUI_LOG_DIR") {
            Some(dir) if dir.is_empty() => None,
            Some(dir) => Some(PathBuf::from(dir)),
            None => Some(PathBuf::from(DEFAULT_LOG_DIR)),
        };

        Self {
            tool,
            bootstrap_config: lookup("SPOTDL_GUI_SKIP_CONFIG").is_none(),
            home_dir: dirs::home_dir(),
            log_dir,
        }
    }
}

/// Loads `.env` from the working directory or a parent into the process environment.
///
/// Variables that are already set keep their values.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), ".env loaded"),
        Err(e) if e.not_found() => debug!("no .env file"),
        Err(e) => warn!(error = %e, ".env could not be read"),
    }
}

/// Spotify API credentials handed to spotdl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Both values must be present and non-blank.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        match (get("CLIENT_ID"), get("CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Ok(Self {
                client_id,
                client_secret,
            }),
            _ => Err(AppError::MissingCredentials),
        }
    }
}

#[derive(Debug, Serialize)]
struct SpotdlConfigFile {
    client_id: String,
    client_secret: String,
    no_cache: bool,
}

/// Writes `<home>/.spotdl/config.json` and returns its path.
pub fn write_spotdl_config(home: &Path, credentials: &Credentials) -> Result<PathBuf> {
    let dir = home.join(".spotdl");
    std::fs::create_dir_all(&dir)?;

    let path = dir.join("config.json");
    let file = SpotdlConfigFile {
        client_id: credentials.client_id.clone(),
        client_secret: credentials.client_secret.clone(),
        no_cache: true,
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(&path, format!("{json}\n"))?;

    info!(path = %path.display(), "spotdl config written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn credentials_need_both_values() {
        let creds = Credentials::from_lookup(lookup(&[("CLIENT_ID", "id"), ("CLIENT_SECRET", " secret ")])).unwrap();
        assert_eq!(creds.client_secret, "secret");

        let missing = Credentials::from_lookup(lookup(&[("CLIENT_ID", "id")]));
        assert!(matches!(missing, Err(AppError::MissingCredentials)));

        let blank = Credentials::from_lookup(lookup(&[("CLIENT_ID", "  "), ("CLIENT_SECRET", "s")]));
        assert!(matches!(blank, Err(AppError::MissingCredentials)));
    }

    #[test]
    fn credentials_from_dotenv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# spotify app\nCLIENT_ID=from-file\nCLIENT_SECRET=\"s3cret\"\n").unwrap();

        let vars: HashMap<String, String> = dotenvy::from_path_iter(&path)
            .unwrap()
            .map(|pair| pair.unwrap())
            .collect();
        let creds = Credentials::from_lookup(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(creds.client_id, "from-file");
        assert_eq!(creds.client_secret, "s3cret");
    }

    #[test]
    fn spotdl_config_is_written_under_home() {
        let home = tempfile::tempdir().unwrap();
        let creds = Credentials {
            client_id: "abc".into(),
            client_secret: "def".into(),
        };

        let path = write_spotdl_config(home.path(), &creds).unwrap();
        assert_eq!(path, home.path().join(".spotdl").join("config.json"));

        let parsed: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["client_id"], "abc");
        assert_eq!(parsed["client_secret"], "def");
        assert_eq!(parsed["no_cache"], true);
    }

    #[test]
    fn explicit_tool_and_log_dir_from_env() {
        let env: HashMap<&str, OsString> = [
            ("SPOTDL_GUI_TOOL", OsString::from("/opt/spotdl")),
            ("SPOTDL_GUI_LOG_DIR", OsString::from("")),
            ("SPOTDL_GUI_SKIP_CONFIG", OsString::from("1")),
        ]
        .into_iter()
        .collect();

        let config = AppConfig::from_lookup(|k| env.get(k).cloned());
        assert_eq!(config.tool, ToolSource::Program(PathBuf::from("/opt/spotdl")));
        assert_eq!(config.log_dir, None);
        assert!(!config.bootstrap_config);
    }

    #[test]
    fn defaults_without_env() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.log_dir, Some(PathBuf::from(DEFAULT_LOG_DIR)));
        assert!(config.bootstrap_config);
        // No executable is embedded in test builds.
        assert!(matches!(config.tool, ToolSource::Python { .. }));
    }
}
