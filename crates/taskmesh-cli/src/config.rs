//! Configuration for the taskmesh binary.
//!
//! A TOML file with serde defaults throughout, so an empty or missing
//! file yields a working mesh. A handful of environment variables
//! override the bind addresses after the file is read.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use taskmesh_agent::AgentConfig;
use taskmesh_control::ControlPlaneConfig;
use taskmesh_core::{TaskmeshError, TaskmeshResult};
use taskmesh_human::HumanConsumerConfig;
use taskmesh_queue::RetryPolicy;

/// Config path used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "taskmesh.toml";

/// Everything the binary needs to assemble a mesh.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeshConfig {
    /// Queue backend and transport retry policy.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Control plane service and API bind address.
    #[serde(default)]
    pub control: ControlServerConfig,
    /// Result consumer service and API bind address.
    #[serde(default)]
    pub human: HumanServerConfig,
    /// Limits applied to every bundled agent service.
    #[serde(default)]
    pub agents: AgentConfig,
}

/// Selects and tunes the queue transport.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Backend name. `memory` ships; networked backends plug in
    /// behind the same trait.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Publish retry policy at the transport boundary.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Control plane bind address plus its routing limits.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlServerConfig {
    /// Host the control plane API binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the control plane API binds to.
    #[serde(default = "default_control_port")]
    pub port: u16,
    /// Routing limits, flattened into the same TOML table.
    #[serde(flatten)]
    pub plane: ControlPlaneConfig,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_control_port(),
            plane: ControlPlaneConfig::default(),
        }
    }
}

/// Result consumer bind address plus its buffering limits.
#[derive(Debug, Clone, Deserialize)]
pub struct HumanServerConfig {
    /// Host the result consumer API binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the result consumer API binds to.
    #[serde(default = "default_human_port")]
    pub port: u16,
    /// Buffering limits, flattened into the same TOML table.
    #[serde(flatten)]
    pub consumer: HumanConsumerConfig,
}

impl Default for HumanServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_human_port(),
            consumer: HumanConsumerConfig::default(),
        }
    }
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    8000
}

fn default_human_port() -> u16 {
    8001
}

impl MeshConfig {
    /// Applies the deployment environment's address overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CONTROL_PLANE_HOST") {
            self.control.host = host;
        }
        if let Ok(port) = std::env::var("CONTROL_PLANE_PORT") {
            match port.parse() {
                Ok(port) => self.control.port = port,
                Err(e) => warn!(value = %port, error = %e, "Ignoring CONTROL_PLANE_PORT"),
            }
        }
        if let Ok(host) = std::env::var("HUMAN_CONSUMER_HOST") {
            self.human.host = host;
        }
        if let Ok(port) = std::env::var("HUMAN_CONSUMER_PORT") {
            match port.parse() {
                Ok(port) => self.human.port = port,
                Err(e) => warn!(value = %port, error = %e, "Ignoring HUMAN_CONSUMER_PORT"),
            }
        }
    }
}

/// Reads the config file. A path given explicitly must exist; the
/// default path falls back to defaults when absent.
pub async fn load(path: Option<&Path>) -> TaskmeshResult<MeshConfig> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(MeshConfig::default());
        }
        Err(e) => {
            return Err(TaskmeshError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            )));
        }
    };
    toml::from_str(&raw).map_err(|e| {
        TaskmeshError::Config(format!("invalid config file '{}': {e}", path.display()))
    })
}
