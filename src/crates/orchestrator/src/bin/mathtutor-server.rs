//! Math-tutoring orchestrator server binary.
//!
//! Connects the three backend clients, runs database migrations, and
//! serves the REST/SSE API described in spec §6.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use graph_client::neo4j::{Neo4jConfig, Neo4jGraphClient};
use graph_client::GraphClient;
use llm_client::remote::{ClaudeClient, OpenAiClient};
use llm_client::{CompletionClient, RemoteLlmConfig};
use vector_client::weaviate::WeaviateVectorClient;
use vector_client::VectorClient;

use orchestrator::api::routes::{create_router, AppState};
use orchestrator::config::AppConfig;
use orchestrator::db::DatabaseConnection;
use orchestrator::pipeline::{Pipeline, PipelineConfig};
use orchestrator::smart_query::SmartQueryLayer;
use orchestrator::staging::StagingWorkflow;

#[derive(Parser, Debug)]
#[command(name = "mathtutor-server", about = "Math-tutoring RAG query-orchestration engine")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt().with_env_filter(config.log_level.clone()).init();

    tracing::info!(port = config.server.port, "configuration loaded");

    let graph: Arc<dyn GraphClient> = Arc::new(
        Neo4jGraphClient::connect(Neo4jConfig {
            uri: config.graph.uri.clone(),
            user: config.graph.user.clone(),
            password: config.graph.password.clone(),
            ..Neo4jConfig::default()
        })
        .await
        .map_err(|e| format!("failed to connect to graph store: {e}"))?,
    );

    let vector: Arc<dyn VectorClient> = Arc::new(
        WeaviateVectorClient::connect(&config.vector.host, Duration::from_secs(30))
            .await
            .map_err(|e| format!("failed to connect to vector store: {e}"))?,
    );

    let llm: Arc<dyn CompletionClient> = {
        let remote_config = RemoteLlmConfig::new(
            config.llm.api_key.clone(),
            config.llm.base_url.clone(),
            config.llm.model.clone(),
        );
        match config.llm.provider.as_str() {
            "openai" => Arc::new(OpenAiClient::new(remote_config)),
            _ => Arc::new(ClaudeClient::new(remote_config)),
        }
    };

    tracing::info!("performing startup reachability checks");
    if !llm.is_healthy().await {
        return Err("LLM provider unreachable at startup".into());
    }
    if !vector.is_healthy().await {
        return Err("vector store unreachable at startup".into());
    }

    let db = DatabaseConnection::new(&config.database_url).await?;
    tracing::info!("running database migrations");
    db.run_migrations().await?;
    db.health_check().await?;

    let pool = db.pool().clone();
    let pipeline_config =
        PipelineConfig { breaker: config.breaker.to_breaker_config(), ..PipelineConfig::default() };
    let pipeline = Pipeline::new(graph.clone(), vector.clone(), llm.clone(), pool.clone(), pipeline_config);
    let staging = StagingWorkflow::new(graph.clone(), llm.clone(), pool.clone());
    let smart_query = Arc::new(SmartQueryLayer::new(pool.clone(), config.freshness_window_days));

    let app_state = AppState { pipeline, smart_query, staging, graph, vector, llm, pool };
    let app = create_router(app_state);

    let port = cli.port.unwrap_or(config.server.port);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    tracing::info!(%addr, "starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received CTRL-C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
