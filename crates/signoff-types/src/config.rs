//! Global configuration types for Signoff.
//!
//! `GlobalConfig` represents the top-level `signoff.toml` that controls the
//! server bind address, the SLA sweep and authorization defaults.

use serde::{Deserialize, Serialize};

/// Top-level configuration. Every section and field has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sla: SlaConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// SLA sweep settings. The sweep is observational: it records breaches and
/// never changes step status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlaConfig {
    /// Seconds between sweeps. 0 disables the background sweep.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// When true the sweep also flags breached instances as `ESCALATED`.
    #[serde(default)]
    pub escalate_instances: bool,
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            escalate_instances: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Role name whose holders bypass step gates. Compared case-insensitively.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

fn default_admin_role() -> String {
    "admin".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_role: default_admin_role(),
        }
    }
}
