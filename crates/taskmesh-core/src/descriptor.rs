//! Capability advertisement for agent services.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What an agent service tells the control plane about itself when it
/// registers. The `description` is the routing surface: the
/// orchestrator's reasoner sees it verbatim when choosing a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Mesh-wide unique service name.
    pub service_name: String,
    /// Natural-language summary of what the service is useful for.
    pub description: String,
    /// Topic the service consumes task requests from.
    pub topic: String,
    /// Names of the tools the service exposes to its reasoner.
    #[serde(default)]
    pub tool_names: BTreeSet<String>,
}

impl AgentDescriptor {
    /// Builds a descriptor whose topic defaults to the service name.
    pub fn new(service_name: impl Into<String>, description: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            topic: service_name.clone(),
            service_name,
            description: description.into(),
            tool_names: BTreeSet::new(),
        }
    }

    /// Overrides the consuming topic.
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Records the tool names the service exposes.
    #[must_use]
    pub fn with_tool_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_names = names.into_iter().map(Into::into).collect();
        self
    }
}
