//! Configuration loading and validation.
//!
//! `config.toml` is deserialized with serde; `validate` collects every
//! violation so the operator sees them all at once instead of fixing one
//! per restart.

use serde::Deserialize;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub listen: ListenConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub resv: ResvConfig,
    #[serde(default, rename = "oper")]
    pub opers: Vec<OperBlock>,
    #[serde(default, rename = "link")]
    pub links: Vec<LinkBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name in the mesh (e.g. `irc.example.net`).
    pub name: String,
    /// TS6 server id: digit followed by two alphanumerics.
    pub sid: String,
    pub description: String,
    #[serde(default = "defaults::network")]
    pub network: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Client listener address.
    pub client: SocketAddr,
    /// Server-link listener address; no listener when absent.
    #[serde(default)]
    pub server: Option<SocketAddr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "defaults::db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: defaults::db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "defaults::nicklen")]
    pub nicklen: usize,
    #[serde(default = "defaults::channellen")]
    pub channellen: usize,
    /// Minimum non-wildcard characters in a nick reservation mask.
    #[serde(default = "defaults::min_nonwildcard_simple")]
    pub min_nonwildcard_simple: usize,
    /// Seconds between global NAMES sweeps for non-opers.
    #[serde(default = "defaults::pace_wait")]
    pub pace_wait: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        LimitsConfig {
            nicklen: defaults::nicklen(),
            channellen: defaults::channellen(),
            min_nonwildcard_simple: defaults::min_nonwildcard_simple(),
            pace_wait: defaults::pace_wait(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResvConfig {
    /// Opers are not force-parted from reserved channels.
    #[serde(default = "defaults::yes")]
    pub exempt_opers: bool,
    /// Untargeted reservations become globally replicated prop-bans.
    /// When off, they stay local and go out as cluster messages instead.
    #[serde(default = "defaults::yes")]
    pub use_propagated_bans: bool,
}

impl Default for ResvConfig {
    fn default() -> Self {
        ResvConfig {
            exempt_opers: true,
            use_propagated_bans: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperBlock {
    pub name: String,
    /// bcrypt `$2…` hash, or plaintext for dev setups.
    pub password: String,
    /// May place and lift reservations.
    #[serde(default = "defaults::yes")]
    pub resv: bool,
    /// May target other servers with `ON`.
    #[serde(default)]
    pub remote_ban: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkBlock {
    /// Peer server name.
    pub name: String,
    pub password: String,
}

mod defaults {
    pub fn network() -> String {
        "CorvidNet".to_string()
    }
    pub fn db_path() -> String {
        "corvidd.db".to_string()
    }
    pub fn nicklen() -> usize {
        30
    }
    pub fn channellen() -> usize {
        50
    }
    pub fn min_nonwildcard_simple() -> usize {
        3
    }
    pub fn pace_wait() -> i64 {
        10
    }
    pub fn yes() -> bool {
        true
    }
}

impl Config {
    /// Load and parse a config file.
    pub fn load(path: &str) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Parse config from a string (tests, embedded configs).
    pub fn parse(raw: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(raw)?)
    }
}

/// Validate a loaded config, collecting every violation.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() || !config.server.name.contains('.') {
        errors.push(format!(
            "server.name {:?} must be a dotted server name",
            config.server.name
        ));
    }

    let sid = config.server.sid.as_bytes();
    if sid.len() != 3
        || !sid[0].is_ascii_digit()
        || !sid[1..].iter().all(|b| b.is_ascii_alphanumeric())
    {
        errors.push(format!(
            "server.sid {:?} must be a digit followed by two alphanumerics",
            config.server.sid
        ));
    }

    if config.limits.nicklen == 0 || config.limits.channellen == 0 {
        errors.push("limits.nicklen and limits.channellen must be nonzero".to_string());
    }

    for oper in &config.opers {
        if oper.name.is_empty() || oper.password.is_empty() {
            errors.push(format!("oper block {:?} missing name or password", oper.name));
        }
    }

    for link in &config.links {
        if link.name.is_empty() || link.password.is_empty() {
            errors.push(format!("link block {:?} missing name or password", link.name));
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        name = "irc.example.net"
        sid = "0CV"
        description = "test node"

        [listen]
        client = "127.0.0.1:6667"
    "#;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = Config::parse(MINIMAL).unwrap();
        assert_eq!(config.server.network, "CorvidNet");
        assert_eq!(config.limits.nicklen, 30);
        assert_eq!(config.limits.min_nonwildcard_simple, 3);
        assert!(config.resv.exempt_opers);
        assert!(config.listen.server.is_none());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn oper_and_link_blocks() {
        let raw = format!(
            "{MINIMAL}
            [[oper]]
            name = \"ops\"
            password = \"hunter2\"
            remote_ban = true

            [[link]]
            name = \"hub.example.net\"
            password = \"linkpw\"
            "
        );
        let config = Config::parse(&raw).unwrap();
        assert_eq!(config.opers.len(), 1);
        assert!(config.opers[0].resv);
        assert!(config.opers[0].remote_ban);
        assert_eq!(config.links[0].name, "hub.example.net");
    }

    #[test]
    fn bad_sid_is_collected() {
        let raw = MINIMAL.replace("0CV", "XYZ!");
        let config = Config::parse(&raw).unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("server.sid")));
    }
}
