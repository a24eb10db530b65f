//! Wire envelope exchanged over the message queue.
//!
//! Every service in the mesh communicates exclusively through
//! [`Envelope`] values published to named topics. The envelope carries
//! routing metadata plus an opaque JSON payload; the payload shape is
//! determined by [`MessageKind`] and the direction of travel.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::descriptor::AgentDescriptor;
use crate::error::TaskmeshResult;

/// Topic names reserved by the mesh itself.
pub mod topics {
    /// Topic the control plane consumes: registrations, task
    /// submissions, and step results all land here.
    pub const CONTROL_PLANE: &str = "control_plane";

    /// Topic the terminal result consumer listens on.
    pub const HUMAN: &str = "human";
}

/// Discriminates the payload carried by an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A unit of work for an agent, or an external task submission
    /// when addressed to the control plane.
    TaskRequest,
    /// A completed step from an agent, or a finalized task when
    /// addressed to the human topic.
    TaskResult,
    /// Service registration traffic in either direction: a
    /// [`RegistrationPayload`] toward the control plane, a
    /// [`RegistrationAck`] back to the registering service.
    Registration,
    /// Reserved for tool invocation traffic between services.
    ToolCall,
    /// Reserved for tool output traffic between services.
    ToolResult,
}

/// A single message on the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id of this message, minted at publish time.
    pub id: Uuid,
    /// Payload discriminator.
    pub kind: MessageKind,
    /// Service name of the publisher.
    pub source: String,
    /// Topic this envelope was addressed to.
    pub destination: String,
    /// Task the message belongs to, when it belongs to one.
    #[serde(default)]
    pub task_id: Option<Uuid>,
    /// Kind-specific JSON payload.
    pub payload: Value,
    /// Publish timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Builds an envelope with a fresh id and the current timestamp.
    pub fn new(
        kind: MessageKind,
        source: impl Into<String>,
        destination: impl Into<String>,
        task_id: Option<Uuid>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            source: source.into(),
            destination: destination.into(),
            task_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// A work assignment addressed to an agent topic, or a task
    /// submission addressed to the control plane.
    pub fn task_request(
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: &TaskRequestPayload,
    ) -> TaskmeshResult<Self> {
        Ok(Self::new(
            MessageKind::TaskRequest,
            source,
            destination,
            Some(payload.task_id),
            serde_json::to_value(payload)?,
        ))
    }

    /// A step result published back to the control plane.
    pub fn task_result(
        source: impl Into<String>,
        destination: impl Into<String>,
        payload: &TaskResultPayload,
    ) -> TaskmeshResult<Self> {
        Ok(Self::new(
            MessageKind::TaskResult,
            source,
            destination,
            Some(payload.task_id),
            serde_json::to_value(payload)?,
        ))
    }

    /// A registration (or deregistration) addressed to the control
    /// plane.
    pub fn registration(
        source: impl Into<String>,
        payload: &RegistrationPayload,
    ) -> TaskmeshResult<Self> {
        Ok(Self::new(
            MessageKind::Registration,
            source,
            topics::CONTROL_PLANE,
            None,
            serde_json::to_value(payload)?,
        ))
    }

    /// The control plane's answer to a registration, addressed back
    /// to the registering service's own topic.
    pub fn registration_ack(
        destination: impl Into<String>,
        payload: &RegistrationAck,
    ) -> TaskmeshResult<Self> {
        Ok(Self::new(
            MessageKind::Registration,
            topics::CONTROL_PLANE,
            destination,
            None,
            serde_json::to_value(payload)?,
        ))
    }

    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> TaskmeshResult<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Payload of a [`MessageKind::TaskRequest`] envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequestPayload {
    /// Task the work belongs to.
    pub task_id: Uuid,
    /// Zero-based index of the step the receiver is asked to perform.
    /// Submissions to the control plane carry 0 here.
    #[serde(default)]
    pub step: u32,
    /// Instruction text the agent should act on.
    pub input: String,
}

/// How a step concluded from the agent's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The agent produced an answer for this step.
    Answer,
    /// The agent could not finish and the task should go to a human.
    NeedsHuman,
}

/// Payload of a [`MessageKind::TaskResult`] envelope published by an
/// agent service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultPayload {
    /// Task the result belongs to.
    pub task_id: Uuid,
    /// Step index echoed from the originating request.
    #[serde(default)]
    pub step: u32,
    /// Output text for the step.
    pub output: String,
    /// Whether the agent answered or gave up.
    pub outcome: StepOutcome,
}

/// Payload of a [`MessageKind::Registration`] envelope sent by an
/// agent service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationPayload {
    /// The registering service's advertised capabilities.
    pub descriptor: AgentDescriptor,
    /// When true, remove the service from the registry instead.
    #[serde(default)]
    pub deregister: bool,
}

/// Control plane's reply to a [`RegistrationPayload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationAck {
    /// Service the ack is addressed to.
    pub service_name: String,
    /// Whether the registration was applied.
    pub accepted: bool,
    /// Populated with the rejection cause when `accepted` is false.
    #[serde(default)]
    pub reason: Option<String>,
}
