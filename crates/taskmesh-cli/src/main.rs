//! The `taskmesh` binary: serve a demo mesh or run it through a
//! scripted conversation.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskmesh_core::{Task, TaskStatus};
use uuid::Uuid;

mod config;
mod demo;
mod launcher;

use config::MeshConfig;
use launcher::Mesh;

#[derive(Parser)]
#[command(name = "taskmesh", about = "Queue-mediated mesh of agent services")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the mesh until interrupted.
    Serve {
        /// Override the control API port.
        #[arg(long)]
        control_port: Option<u16>,
        /// Override the human API port.
        #[arg(long)]
        human_port: Option<u16>,
    },
    /// Push three canned tasks through the mesh and print what comes
    /// out the other end.
    Demo,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = config::load(cli.config.as_deref()).await?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Serve {
            control_port,
            human_port,
        } => {
            if let Some(port) = control_port {
                config.control.port = port;
            }
            if let Some(port) = human_port {
                config.human.port = port;
            }
            serve(config).await
        }
        Commands::Demo => run_demo(config).await,
    }
}

async fn serve(config: MeshConfig) -> anyhow::Result<()> {
    let mesh = launcher::launch(config).await?;
    info!(
        control = %mesh.control_addr,
        human = %mesh.human_addr,
        "Mesh serving, press Ctrl-C to stop"
    );
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    mesh.shutdown().await;
    Ok(())
}

async fn run_demo(config: MeshConfig) -> anyhow::Result<()> {
    let mesh = launcher::launch(config).await?;
    wait_for_agents(&mesh, 2).await?;

    let questions = [
        "what is the status of order 5?",
        "how many jobs does the machine have?",
        "write me a poem about message queues",
    ];
    for question in questions {
        let task = mesh.plane.submit(question, "demo").await?;
        let done = wait_for_result(&mesh, task.id).await?;
        match done.status {
            TaskStatus::Completed => {
                println!("{question}");
                println!("  -> {}", done.last_output().unwrap_or("(no output)"));
            }
            TaskStatus::NeedsHuman => {
                println!("{question}");
                println!("  -> escalated to a human");
            }
            other => {
                println!("{question}");
                println!("  -> ended as {other:?}");
            }
        }
    }

    mesh.shutdown().await;
    Ok(())
}

async fn wait_for_agents(mesh: &Mesh, expected: usize) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while mesh.plane.registry().len() < expected {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("demo agents did not register in time");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

async fn wait_for_result(mesh: &Mesh, task_id: Uuid) -> anyhow::Result<Task> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        if let Some(task) = mesh.results.result(task_id).await {
            return Ok(task);
        }
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("no result for task {task_id} reached the consumer");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
