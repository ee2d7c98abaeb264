use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:5000" or "127.0.0.1:8080"
    /// Default: "0.0.0.0:5000"
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Root directory served to clients
    /// Must exist at startup, fatal otherwise
    /// Default: "public"
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Directory holding static assets (requests under "static/") and the
    /// optional listing template override ("index.html" inside it)
    /// Default: "static"
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Sleep a fixed delay in every worker so concurrency effects are
    /// observable from the outside
    /// Default: false
    #[serde(default)]
    pub simulate_work: bool,
    /// Select the naive counter variant (split read-modify-write) to
    /// demonstrate lost updates
    /// Default: false
    #[serde(default)]
    pub unsafe_counters: bool,
    /// Per-client-IP request limit per sliding window
    /// Values below 0.1 are clamped up; default 5.0
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,
    /// Idle read timeout in milliseconds
    /// Default: 1000
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Simulated work duration in milliseconds, applied when `simulate_work`
    /// is set
    /// Default: 1000
    #[serde(default = "default_simulate_delay")]
    pub simulate_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            root_dir: default_root_dir(),
            static_dir: default_static_dir(),
            simulate_work: false,
            unsafe_counters: false,
            max_rate: default_max_rate(),
            read_timeout_ms: default_read_timeout(),
            simulate_delay_ms: default_simulate_delay(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_rate() -> f64 {
    5.0
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_simulate_delay() -> u64 {
    1000
}
