//! Load config from file and environment.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use defuse_core::{CoordinatorConfig, MacAddress, ModuleKind, PeripheralConfig};
use serde::Deserialize;
use tracing::warn;

/// Which unit this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Coordinator,
    Puzzle,
    Needy,
    Spectator,
}

impl Role {
    pub fn module_kind(self) -> ModuleKind {
        match self {
            Role::Coordinator => ModuleKind::Main,
            Role::Puzzle => ModuleKind::Puzzle,
            Role::Needy => ModuleKind::Needy,
            Role::Spectator => ModuleKind::Spectator,
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coordinator" | "main" => Ok(Role::Coordinator),
            "puzzle" => Ok(Role::Puzzle),
            "needy" => Ok(Role::Needy),
            "spectator" => Ok(Role::Spectator),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Node configuration. File: ~/.config/defuse/config.toml or /etc/defuse/config.toml.
/// Env overrides: DEFUSE_ROLE, DEFUSE_PORT, DEFUSE_MAC.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default puzzle.
    #[serde(default = "default_role")]
    pub role: Role,
    /// UDP port shared by every unit on the LAN (default 47474).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Multicast group standing in for the radio broadcast address.
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    /// Unit address as `AA:BB:CC:DD:EE:FF`; random when unset.
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub peripheral: PeripheralConfig,
}

fn default_role() -> Role {
    Role::Puzzle
}
fn default_port() -> u16 {
    47474
}
fn default_multicast_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 47, 47)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: default_role(),
            port: default_port(),
            multicast_group: default_multicast_group(),
            mac: None,
            coordinator: CoordinatorConfig::default(),
            peripheral: PeripheralConfig::default(),
        }
    }
}

impl Config {
    /// Configured address, or a fresh locally administered one.
    pub fn mac_address(&self) -> anyhow::Result<MacAddress> {
        match &self.mac {
            Some(s) => s
                .parse()
                .with_context(|| format!("invalid mac address {s:?}")),
            None => Ok(MacAddress::random()),
        }
    }
}

/// Load config: default, then the first config file found, then env vars.
pub fn load() -> Config {
    let mut c = load_file(&config_paths()).unwrap_or_default();
    apply_overrides(&mut c, |name| std::env::var(name).ok());
    c
}

fn apply_overrides(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("DEFUSE_ROLE") {
        match s.parse() {
            Ok(role) => c.role = role,
            Err(e) => warn!(error = %e, "ignoring DEFUSE_ROLE"),
        }
    }
    if let Some(s) = var("DEFUSE_PORT") {
        match s.parse::<u16>() {
            Ok(p) => c.port = p,
            Err(e) => warn!(value = %s, error = %e, "ignoring DEFUSE_PORT"),
        }
    }
    if let Some(s) = var("DEFUSE_MAC") {
        c.mac = Some(s);
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/defuse/config.toml"));
    }
    out.push(PathBuf::from("/etc/defuse/config.toml"));
    out
}

/// Only the first existing file is considered; an unreadable or invalid one falls back to defaults.
fn load_file(paths: &[PathBuf]) -> Option<Config> {
    let path = paths.iter().find(|p| p.exists())?;
    match read_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(path = %path.display(), error = %format!("{e:#}"), "ignoring config file");
            None
        }
    }
}

fn read_file(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&s)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use defuse_core::InfoCorrelation;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c: Config = toml::from_str("").unwrap();
        assert_eq!(c.role, Role::Puzzle);
        assert_eq!(c.port, 47474);
        assert_eq!(c.coordinator.max_strikes, 3);
        assert_eq!(c.peripheral.code_poll_interval_ms, 200);
    }

    #[test]
    fn nested_tables() {
        let c: Config = toml::from_str(
            r#"
            role = "coordinator"
            mac = "02:00:00:00:00:01"

            [coordinator]
            max_strikes = 5
            duration_ms = 120000

            [peripheral]
            info_correlation = "keyed"
            "#,
        )
        .unwrap();
        assert_eq!(c.role, Role::Coordinator);
        assert_eq!(c.coordinator.max_strikes, 5);
        assert_eq!(c.coordinator.duration_ms, 120_000);
        assert_eq!(c.coordinator.heartbeat_interval_ms, 50);
        assert_eq!(c.peripheral.info_correlation, InfoCorrelation::Keyed);
        assert_eq!(
            c.mac_address().unwrap(),
            MacAddress::new([2, 0, 0, 0, 0, 1])
        );
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("colour = \"red\"").is_err());
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DEFUSE_ROLE", "Needy"),
            ("DEFUSE_PORT", "not-a-port"),
            ("DEFUSE_MAC", "02:aa:bb:cc:dd:ee"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        apply_overrides(&mut c, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.role, Role::Needy);
        assert_eq!(c.port, 47474);
        assert_eq!(c.mac.as_deref(), Some("02:aa:bb:cc:dd:ee"));
    }

    #[test]
    fn bad_mac_is_an_error() {
        let c = Config {
            mac: Some("nope".into()),
            ..Config::default()
        };
        assert!(c.mac_address().is_err());
        assert!(!Config::default().mac_address().unwrap().is_broadcast());
    }

    #[test]
    fn first_existing_file_wins() {
        let dir = std::env::temp_dir().join(format!("defuse-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.toml");
        std::fs::write(&good, "port = 5000\nrole = \"spectator\"").unwrap();
        let c = load_file(&[dir.join("missing.toml"), good.clone()]).unwrap();
        assert_eq!(c.port, 5000);
        assert_eq!(c.role, Role::Spectator);

        let bad = dir.join("bad.toml");
        std::fs::write(&bad, "port = \"x\"").unwrap();
        assert!(load_file(&[bad, good]).is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
