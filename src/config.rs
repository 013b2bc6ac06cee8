//! Persistent client settings (`ftpnav.toml`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::listing::ListingFormat;

const MAX_RECENT_HOSTS: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// URL to connect to at startup.
    pub default_url: Option<String>,
    pub listing_format: ListingFormat,
    /// TCP connect bound; unset means the OS default.
    pub connect_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
    pub journal: Option<PathBuf>,
    /// Spinner while a transfer runs.
    pub progress: bool,
    pub color: bool,
    /// Most recent first.
    pub recent_hosts: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_url: None,
            listing_format: ListingFormat::Unix,
            connect_timeout_secs: None,
            log_file: None,
            journal: None,
            progress: true,
            color: true,
            recent_hosts: Vec::new(),
        }
    }
}

impl Config {
    /// Missing file means defaults; a file that does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("read config {}", path.display())),
        };
        toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Stage the new contents next to `path`, then rename over it. The file
    /// is readable by the owner only, since it records hosts.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create config directory {}", dir.display()))?;
        let text = toml::to_string_pretty(self).context("serialize config")?;

        let mut staged = tempfile::Builder::new()
            .prefix(".ftpnav-")
            .suffix(".toml")
            .tempfile_in(dir)
            .with_context(|| format!("stage config in {}", dir.display()))?;
        staged.write_all(text.as_bytes())?;
        staged.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let owner_only = std::fs::Permissions::from_mode(0o600);
            staged.as_file().set_permissions(owner_only)?;
        }
        staged
            .persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("replace config {}", path.display()))?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    /// Remember a connected URL; credentials are never stored.
    pub fn add_recent_host(&mut self, url: &str) {
        let entry = strip_userinfo(url.trim().trim_end_matches('/'));
        self.recent_hosts.retain(|h| h != &entry);
        self.recent_hosts.insert(0, entry);
        if self.recent_hosts.len() > MAX_RECENT_HOSTS {
            self.recent_hosts.truncate(MAX_RECENT_HOSTS);
        }
    }
}

fn strip_userinfo(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let authority_end = rest.find('/').unwrap_or(rest.len());
            match rest[..authority_end].rfind('@') {
                Some(at) => format!("{}://{}", scheme, &rest[at + 1..]),
                None => url.to_string(),
            }
        }
        None => url.to_string(),
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("ftpnav");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("ftpnav");
    }
    PathBuf::from(".ftpnav")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("ftpnav.toml")
}
