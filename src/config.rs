//! Configuration for the file server and for clients of it.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Environment variable overriding the file server base URL.
pub const FILE_SERVER_URL_ENV: &str = "POSTCARD_FILE_SERVER_URL";
pub const DEFAULT_FILE_SERVER_URL: &str = "http://localhost:3001";
pub const DEFAULT_DESIGN_DIR: &str = "public/PSD-files";
pub const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3001);

/// Design files the server will hand out.
pub const DEFAULT_ALLOWLIST: [&str; 5] = [
    "5248770.psd",
    "8039429.psd",
    "39690114_8731898.psd",
    "7209489.psd",
    "8060186.psd",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileServerConfig {
    pub root: PathBuf,
    pub allowlist: Vec<String>,
    pub bind: SocketAddr,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_DESIGN_DIR),
            allowlist: DEFAULT_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
            bind: DEFAULT_BIND_ADDR,
        }
    }
}

/// Where clients find the file server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub file_server_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            file_server_url: DEFAULT_FILE_SERVER_URL.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(FILE_SERVER_URL_ENV).filter(|v| !v.trim().is_empty()) {
            Some(url) => Self {
                file_server_url: url.trim().trim_end_matches('/').to_string(),
            },
            None => Self::default(),
        }
    }

    pub fn design_url(&self, file_name: &str) -> String {
        format!("{}/psd/{}", self.file_server_url, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        let cfg = ClientConfig::from_lookup(|k| {
            (k == FILE_SERVER_URL_ENV).then(|| "https://files.example.com/".to_string())
        });
        assert_eq!(cfg.design_url("a.psd"), "https://files.example.com/psd/a.psd");
    }

    #[test]
    fn blank_env_falls_back() {
        let cfg = ClientConfig::from_lookup(|_| Some("  ".into()));
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.design_url("x.psd"), "http://localhost:3001/psd/x.psd");
    }

    #[test]
    fn default_bind_is_local_port_3001() {
        let cfg = FileServerConfig::default();
        assert_eq!(cfg.bind, DEFAULT_BIND_ADDR);
        assert_eq!(cfg.bind.to_string(), "127.0.0.1:3001");
        assert_eq!(cfg.allowlist.len(), 5);
    }
}
