//! Server list configuration.
//!
//! Servers come from a TOML file and from `--server NAME=ADDRESS` flags:
//!
//! ```toml
//! [servers.primary]
//! address = "10.42.2.207"
//!
//! [servers.reporting]
//! address = "10.42.2.206:27018"
//! username = "monitor"
//! password = "secret"
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::collector::MongoShellAdapter;
use crate::fleet::{Fleet, Server};

/// File name looked up in the user's config directory.
pub const CONFIG_FILE_NAME: &str = "motop.toml";

/// Configuration errors. Startup only.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse { path: PathBuf, message: String },
    InvalidServer(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "invalid config {}: {}", path.display(), message)
            }
            ConfigError::InvalidServer(msg) => write!(f, "invalid server: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Connection settings of one server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// `host`, `host:port` or a `mongodb://` URI.
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ServerConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: None,
            password: None,
        }
    }
}

/// Monitored servers by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
}

impl Config {
    /// Parses TOML text; `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        debug!(path = %path.display(), servers = config.servers.len(), "loaded config");
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file is an empty config.
    pub fn load_optional(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file");
                Ok(Self::default())
            }
            other => other,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, server) in &self.servers {
            if server.address.trim().is_empty() {
                return Err(ConfigError::InvalidServer(format!(
                    "{} has no address",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Adds or replaces a server.
    pub fn insert(&mut self, name: impl Into<String>, server: ServerConfig) {
        self.servers.insert(name.into(), server);
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Builds the fleet, one shell adapter per server.
    pub fn build_fleet(&self, shell: &str, timeout: Duration) -> Fleet {
        let servers = self
            .servers
            .iter()
            .map(|(name, server)| {
                let adapter = MongoShellAdapter::new(server.address.clone())
                    .with_credentials(server.username.clone(), server.password.clone())
                    .with_shell(shell)
                    .with_timeout(timeout);
                Server::new(name.clone(), server.address.clone(), Arc::new(adapter))
            })
            .collect();
        Fleet::new(servers)
    }
}

/// Parses a `--server` value: `NAME=ADDRESS`, or a bare address used as
/// its own name.
pub fn parse_server_arg(value: &str) -> Result<(String, ServerConfig), ConfigError> {
    let (name, address) = match value.split_once('=') {
        Some((name, address)) => (name.trim(), address.trim()),
        None => (value.trim(), value.trim()),
    };
    if name.is_empty() || address.is_empty() {
        return Err(ConfigError::InvalidServer(format!(
            "expected NAME=ADDRESS, got {:?}",
            value
        )));
    }
    Ok((name.to_string(), ServerConfig::new(address)))
}

/// `$XDG_CONFIG_HOME/motop.toml`, else `~/.config/motop.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    config_path_from(
        std::env::var_os("XDG_CONFIG_HOME"),
        std::env::var_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(dir) = xdg_config_home.filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(CONFIG_FILE_NAME));
    }
    home.filter(|h| !h.is_empty())
        .map(|h| PathBuf::from(h).join(".config").join(CONFIG_FILE_NAME))
}

/// Guidance printed when no server is configured.
pub fn instructions(path: Option<&Path>) -> String {
    let location = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| format!("~/.config/{}", CONFIG_FILE_NAME));
    format!(
        "No servers to monitor.\n\
         \n\
         List them in {location}, one section per server:\n\
         \n\
         [servers.MongoDB01]\n\
         address = \"10.42.2.207\"\n\
         \n\
         [servers.MongoDB02]\n\
         address = \"10.42.2.121:27018\"\n\
         username = \"monitor\"\n\
         password = \"secret\"\n\
         \n\
         or pass --server NAME=ADDRESS, or try --demo.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse() {
        let text = r#"
            [servers.b]
            address = "10.0.0.2:27018"
            username = "monitor"
            password = "secret"

            [servers.a]
            address = "10.0.0.1"
        "#;
        let config = Config::parse(text, Path::new("motop.toml")).unwrap();

        let names: Vec<&String> = config.servers.keys().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(config.servers["a"], ServerConfig::new("10.0.0.1"));
        assert_eq!(config.servers["b"].username.as_deref(), Some("monitor"));
        assert_eq!(config.servers["b"].password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_parse_empty() {
        let config = Config::parse("", Path::new("motop.toml")).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let err = Config::parse("[servers.a]\n", Path::new("motop.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = Config::parse("[servers.a]\naddress = \" \"\n", Path::new("x")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidServer(_)));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[servers.db1]\naddress = \"10.0.0.1\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.servers.len(), 1);

        let fleet = config.build_fleet("mongosh", Duration::from_secs(1));
        assert_eq!(fleet.len(), 1);
        assert_eq!(fleet.servers()[0].name(), "db1");
        assert_eq!(fleet.servers()[0].address(), "10.0.0.1");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Io { .. })
        ));
        assert!(Config::load_optional(&path).unwrap().is_empty());
    }

    #[test]
    fn test_server_arg_overrides_file() {
        let mut config = Config::parse(
            "[servers.db1]\naddress = \"10.0.0.1\"\n",
            Path::new("motop.toml"),
        )
        .unwrap();
        let (name, server) = parse_server_arg("db1=10.0.0.9:27018").unwrap();
        config.insert(name, server);
        let (name, server) = parse_server_arg("10.0.0.5").unwrap();
        config.insert(name, server);

        assert_eq!(config.servers["db1"].address, "10.0.0.9:27018");
        assert_eq!(config.servers["10.0.0.5"].address, "10.0.0.5");
    }

    #[test]
    fn test_server_arg_errors() {
        assert!(parse_server_arg("db1=").is_err());
        assert!(parse_server_arg("=10.0.0.1").is_err());
        assert!(parse_server_arg("").is_err());
    }

    #[test]
    fn test_config_path() {
        assert_eq!(
            config_path_from(Some("/etc/xdg".into()), Some("/home/u".into())),
            Some(PathBuf::from("/etc/xdg/motop.toml"))
        );
        assert_eq!(
            config_path_from(Some("".into()), Some("/home/u".into())),
            Some(PathBuf::from("/home/u/.config/motop.toml"))
        );
        assert_eq!(config_path_from(None, None), None);
    }

    #[test]
    fn test_instructions_name_the_path() {
        let text = instructions(Some(Path::new("/tmp/motop.toml")));
        assert!(text.contains("/tmp/motop.toml"));
        assert!(text.contains("[servers.MongoDB01]"));
    }
}
