use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

pub const DEFAULT_PORT: u16 = 3001;
pub const DATA_DIR_ENV: &str = "MOCKLY_DATA_DIR";
const DATA_DIR_NAME: &str = ".mockario";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Built web UI, served under `/ui` when present.
    pub web_dir: Option<PathBuf>,
    /// Request log capacity; `None` keeps everything.
    pub max_logs: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            data_dir: default_data_dir(),
            web_dir: None,
            max_logs: None,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// URL for humans; a wildcard bind is shown as localhost.
    pub fn public_url(&self) -> String {
        let host = if self.host.is_unspecified() {
            "localhost".to_string()
        } else {
            self.host.to_string()
        };
        format!("http://{}:{}", host, self.port)
    }
}

/// `$MOCKLY_DATA_DIR`, else `$HOME/.mockario`, else `./.mockario`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}
