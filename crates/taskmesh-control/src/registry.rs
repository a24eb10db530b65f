//! Registry of live agent services.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{info, warn};

use taskmesh_core::{AgentDescriptor, TaskmeshError, TaskmeshResult};

/// Thread-safe map of service name to advertised capabilities.
///
/// A service re-announcing itself with its existing topic refreshes
/// its descriptor in place; claiming an already-taken name with a
/// different topic is rejected so two processes cannot shadow each
/// other.
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, AgentDescriptor>>,
}

impl AgentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Adds or refreshes a service.
    pub fn register(&self, descriptor: AgentDescriptor) -> TaskmeshResult<()> {
        let mut agents = self.agents.write();
        if let Some(existing) = agents.get(&descriptor.service_name) {
            if existing.topic != descriptor.topic {
                warn!(
                    service = %descriptor.service_name,
                    held_topic = %existing.topic,
                    requested_topic = %descriptor.topic,
                    "Registration conflict"
                );
                return Err(TaskmeshError::Registration(format!(
                    "service '{}' already registered with topic '{}'",
                    descriptor.service_name, existing.topic
                )));
            }
            info!(service = %descriptor.service_name, "Registration refreshed");
        } else {
            info!(
                service = %descriptor.service_name,
                topic = %descriptor.topic,
                "Agent service registered"
            );
        }
        agents.insert(descriptor.service_name.clone(), descriptor);
        Ok(())
    }

    /// Removes a service. Returns whether it was present.
    pub fn deregister(&self, service_name: &str) -> bool {
        let removed = self.agents.write().remove(service_name).is_some();
        if removed {
            info!(service = %service_name, "Agent service deregistered");
        }
        removed
    }

    /// Looks up one service.
    pub fn get(&self, service_name: &str) -> Option<AgentDescriptor> {
        self.agents.read().get(service_name).cloned()
    }

    /// All registered services, sorted by name so routing prompts are
    /// stable.
    pub fn list(&self) -> Vec<AgentDescriptor> {
        let mut agents: Vec<AgentDescriptor> = self.agents.read().values().cloned().collect();
        agents.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        agents
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
