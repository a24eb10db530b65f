//! Tunables for one agent service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use taskmesh_queue::RetryPolicy;

/// Limits and timeouts governing an [`AgentService`](crate::AgentService).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Task steps processed concurrently; further requests wait.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Reasoner completions allowed per task step before the agent
    /// gives up and escalates.
    #[serde(default = "default_max_reasoning_steps")]
    pub max_reasoning_steps: u32,
    /// Deadline for a single tool invocation, in milliseconds.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    /// How long to wait for the control plane's registration ack, in
    /// milliseconds.
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,
    /// Retry budget for startup registration.
    #[serde(default)]
    pub registration_retry: RetryPolicy,
    /// How many recent step results to remember for redelivery.
    #[serde(default = "default_result_cache_size")]
    pub result_cache_size: usize,
}

fn default_max_in_flight() -> usize {
    4
}

fn default_max_reasoning_steps() -> u32 {
    8
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

fn default_registration_timeout_ms() -> u64 {
    5_000
}

fn default_result_cache_size() -> usize {
    256
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_reasoning_steps: default_max_reasoning_steps(),
            tool_timeout_ms: default_tool_timeout_ms(),
            registration_timeout_ms: default_registration_timeout_ms(),
            registration_retry: RetryPolicy::default(),
            result_cache_size: default_result_cache_size(),
        }
    }
}

impl AgentConfig {
    /// Tool deadline as a [`Duration`].
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    /// Registration ack deadline as a [`Duration`].
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_millis(self.registration_timeout_ms)
    }
}
