//! Brings up the whole mesh in one process: queue, control plane,
//! human consumer, demo agents and both HTTP servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use taskmesh_agent::AgentService;
use taskmesh_control::{ControlPlane, ReasonerOrchestrator};
use taskmesh_core::{TaskmeshError, TaskmeshResult};
use taskmesh_human::{MemorySink, TaskResultService};
use taskmesh_queue::{InMemoryQueue, MessageQueue, RetryingQueue};

use crate::config::{MeshConfig, QueueConfig};
use crate::demo;

/// Builds the message queue the whole mesh shares.
pub fn build_queue(config: &QueueConfig) -> TaskmeshResult<Arc<dyn MessageQueue>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(RetryingQueue::new(
            InMemoryQueue::new(),
            config.retry.clone(),
        ))),
        other => Err(TaskmeshError::Config(format!(
            "unknown queue backend '{other}'"
        ))),
    }
}

/// A running mesh. Dropping it aborts nothing; call
/// [`Mesh::shutdown`] to take the services down cleanly.
pub struct Mesh {
    /// The control plane, for direct submissions and registry reads.
    pub plane: Arc<ControlPlane>,
    /// The terminal result consumer.
    pub results: Arc<TaskResultService>,
    /// Where the control API actually bound.
    pub control_addr: SocketAddr,
    /// Where the human API actually bound.
    pub human_addr: SocketAddr,
    agents: Vec<Arc<AgentService>>,
    tasks: JoinSet<()>,
}

impl Mesh {
    /// Deregisters the demo agents, then stops every service task.
    pub async fn shutdown(mut self) {
        for agent in &self.agents {
            if let Err(e) = agent.deregister().await {
                warn!(
                    service = %agent.descriptor().service_name,
                    error = %e,
                    "Deregistration failed"
                );
            }
        }
        // Let the control plane consume the deregistrations before it
        // is torn down with everything else.
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.tasks.shutdown().await;
    }
}

/// Starts every component of the demo mesh on one shared queue and
/// binds both HTTP servers.
pub async fn launch(config: MeshConfig) -> TaskmeshResult<Mesh> {
    let queue = build_queue(&config.queue)?;

    let orchestrator = Arc::new(ReasonerOrchestrator::new(Arc::new(demo::KeywordRouter::demo())));
    let plane = Arc::new(ControlPlane::new(
        Arc::clone(&queue),
        orchestrator,
        config.control.plane.clone(),
    ));
    let results = Arc::new(TaskResultService::new(
        Arc::clone(&queue),
        Arc::new(MemorySink::new()),
        config.human.consumer.clone(),
    ));
    let agents = vec![
        Arc::new(demo::machines_agent(Arc::clone(&queue), config.agents.clone())),
        Arc::new(demo::orders_agent(Arc::clone(&queue), config.agents.clone())),
    ];

    let mut tasks = JoinSet::new();
    tasks.spawn({
        let plane = Arc::clone(&plane);
        async move {
            if let Err(e) = plane.run().await {
                error!(error = %e, "Control plane stopped");
            }
        }
    });
    tasks.spawn({
        let results = Arc::clone(&results);
        async move {
            if let Err(e) = results.run().await {
                error!(error = %e, "Result consumer stopped");
            }
        }
    });

    // Give the hub tasks a beat to subscribe; the agents' registration
    // retry covers the rest.
    tokio::time::sleep(Duration::from_millis(50)).await;
    for agent in &agents {
        let agent = Arc::clone(agent);
        tasks.spawn(async move {
            let name = agent.descriptor().service_name.clone();
            if let Err(e) = Arc::clone(&agent).run().await {
                error!(service = %name, error = %e, "Agent service stopped");
            }
        });
    }

    let control_listener =
        TcpListener::bind((config.control.host.as_str(), config.control.port)).await?;
    let control_addr = control_listener.local_addr()?;
    let control_app = taskmesh_control::http::build(Arc::clone(&plane));
    tasks.spawn(async move {
        if let Err(e) = axum::serve(control_listener, control_app).await {
            error!(error = %e, "Control API stopped");
        }
    });

    let human_listener =
        TcpListener::bind((config.human.host.as_str(), config.human.port)).await?;
    let human_addr = human_listener.local_addr()?;
    let human_app = taskmesh_human::http::build(Arc::clone(&results));
    tasks.spawn(async move {
        if let Err(e) = axum::serve(human_listener, human_app).await {
            error!(error = %e, "Human API stopped");
        }
    });

    info!(%control_addr, %human_addr, "Mesh is up");
    Ok(Mesh {
        plane,
        results,
        control_addr,
        human_addr,
        agents,
        tasks,
    })
}
