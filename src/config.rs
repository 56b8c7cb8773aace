//! # Process-wide configuration
//!
//! Holds the handful of constants the wire format and scheduler need a
//! default for, with environment-variable overrides, mirroring the
//! original C library's `config.h` compiled-in defaults.
//!
//! Address/URL parsing configures a single connection; this module
//! only covers the process-wide fallbacks used when a URL omits them.

use std::env;
use std::sync::OnceLock;

/// Default port used when a URL omits one.
pub const DEFAULT_PORT: u16 = 5170;

/// Default MTU assumed when a transport cannot report one.
pub const DEFAULT_MAX_PKT_SIZE: u32 = 1376;

/// Default per-connection socket buffer size request, in bytes.
pub const DEFAULT_SOCKET_BUF: i32 = 212_992;

#[derive(Debug, Clone)]
struct Config {
    default_port: u16,
    default_max_pkt_size: u32,
}

impl Config {
    fn from_env() -> Self {
        let default_port = env::var("AVTRANSPORT_DEFAULT_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let default_max_pkt_size = env::var("AVTRANSPORT_DEFAULT_MTU")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_PKT_SIZE);

        Config {
            default_port,
            default_max_pkt_size,
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Returns the default port used by the address parser when a URL omits one.
pub fn default_port() -> u16 {
    config().default_port
}

/// Returns the default MTU used by the scheduler when a transport doesn't
/// report one via `Transport::max_pkt_len`.
pub fn default_max_pkt_size() -> u32 {
    config().default_max_pkt_size
}
