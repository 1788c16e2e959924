//! Component construction and the HTTP server

use super::config::{AppConfig, IndexBackend};
use super::loader::load_config;
use crate::chat::ChatPipeline;
use anyhow::{Context, Result};
use axum::extract::Extension;
use densex_core::{load_env, LedgerError, UsageLedger};
use densex_llm::{
    Embedder, EmbeddingConfig, HttpEmbeddingProvider, OpenRouterClient, OpenRouterConfig,
};
use densex_search::{IndexConfig, LocalIndex, PineconeConfig, PineconeIndex, RetryingStore, VectorStore};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

/// Startup failures
#[derive(Debug, Error)]
pub enum InitError {
    #[error("environment loading failed")]
    Environment(#[source] densex_core::Error),

    #[error("usage ledger initialization failed")]
    Ledger(#[source] LedgerError),

    #[error("embedder initialization failed")]
    Embedder(#[source] densex_llm::Error),

    #[error("index initialization failed")]
    Index(#[source] densex_search::Error),

    #[error("language model initialization failed")]
    Llm(#[source] densex_llm::Error),
}

/// Everything a command needs
pub struct Components {
    pub ledger: Arc<UsageLedger>,
    pub embedder: Embedder,
    pub store: Arc<dyn VectorStore>,
    pub pipeline: Arc<ChatPipeline>,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Components")
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

/// Variables that must come from the environment because the config
/// leaves them unset
fn required_env(config: &AppConfig) -> Vec<&'static str> {
    let mut required = Vec::new();
    if config.index.backend == IndexBackend::Pinecone {
        if config.index.pinecone_api_key.is_none() {
            required.push("PINECONE_API_KEY");
        }
        if config.index.pinecone_host.is_none() {
            required.push("PINECONE_INDEX_HOST");
        }
    }
    required
}

/// Resolve required secrets, then build ledger, embedder, index and model
pub async fn build_components(mut config: AppConfig) -> Result<Components, InitError> {
    let required = required_env(&config);
    let env = load_env(&required).await.map_err(InitError::Environment)?;
    if let Some(key) = env.get("PINECONE_API_KEY") {
        config.index.pinecone_api_key = Some(key.clone());
    }
    if let Some(host) = env.get("PINECONE_INDEX_HOST") {
        config.index.pinecone_host = Some(host.clone());
    }

    let ledger = Arc::new(
        UsageLedger::open(&config.monitor.ledger_config())
            .await
            .map_err(InitError::Ledger)?,
    );

    let embedder = build_embedder(&config)?;
    let store = build_store(&config, ledger.clone())?;

    let mut pipeline = ChatPipeline::new(embedder.clone(), store.clone(), config.index.top_k);
    if config.llm.is_configured() {
        pipeline = pipeline.with_llm(build_llm(&config, ledger.clone())?);
        info!(model = %config.llm.model, "language model enabled");
    } else {
        info!("no language model configured, replying with retrieved passages");
    }

    Ok(Components {
        ledger,
        embedder,
        store,
        pipeline: Arc::new(pipeline),
    })
}

fn build_embedder(config: &AppConfig) -> Result<Embedder, InitError> {
    let settings = &config.embedding;
    if settings.dimensions != config.index.dimensions {
        return Err(InitError::Embedder(densex_llm::Error::NotConfigured(format!(
            "embedding dimension {} does not match index dimension {}",
            settings.dimensions, config.index.dimensions
        ))));
    }

    let mut embedding = EmbeddingConfig::default()
        .with_base_url(settings.base_url.clone())
        .with_model(settings.model.clone(), settings.dimensions);
    if let Some(key) = settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        embedding = embedding.with_api_key(key);
    }

    let provider = HttpEmbeddingProvider::new(embedding).map_err(InitError::Embedder)?;
    Ok(Embedder::new(Arc::new(provider)).with_policy(settings.policy()))
}

fn build_store(config: &AppConfig, ledger: Arc<UsageLedger>) -> Result<Arc<dyn VectorStore>, InitError> {
    let settings = &config.index;
    let store: Arc<dyn VectorStore> = match settings.backend {
        IndexBackend::Local => {
            let path = settings.resolved_path();
            let index = LocalIndex::open(&path, IndexConfig::new(settings.dimensions))
                .map_err(InitError::Index)?;
            info!(path = %path.display(), vectors = index.len(), "local index ready");
            Arc::new(
                RetryingStore::new(index)
                    .with_policy(settings.policy())
                    .with_ledger(ledger, settings.upsert_cost),
            )
        }
        IndexBackend::Pinecone => {
            let api_key = settings.pinecone_api_key.clone().unwrap_or_default();
            let host = settings.pinecone_host.clone().unwrap_or_default();
            let mut pinecone = PineconeConfig::new(api_key, host);
            if let Some(namespace) = &settings.pinecone_namespace {
                pinecone = pinecone.with_namespace(namespace.clone());
            }
            let index = PineconeIndex::new(pinecone).map_err(InitError::Index)?;
            Arc::new(
                RetryingStore::new(index)
                    .with_policy(settings.policy())
                    .with_ledger(ledger, settings.upsert_cost),
            )
        }
    };
    Ok(store)
}

fn build_llm(config: &AppConfig, ledger: Arc<UsageLedger>) -> Result<OpenRouterClient, InitError> {
    let settings = &config.llm;
    let openrouter = OpenRouterConfig::new(settings.api_key.clone().unwrap_or_default())
        .with_base_url(settings.base_url.clone())
        .with_model(settings.model.clone())
        .with_price_per_1k(settings.price_per_1k);
    let policy = settings.policy();

    Ok(OpenRouterClient::from_config(openrouter)
        .map_err(InitError::Llm)?
        .with_policy(policy)
        .with_ledger(ledger, settings.price_per_1k))
}

/// Load configuration and build components
pub async fn init() -> Result<(AppConfig, Components)> {
    let config = load_config().context("Failed to load configuration")?;
    info!("Configuration loaded");

    let components = build_components(config.clone()).await?;
    Ok((config, components))
}

/// Run the server
pub async fn run() -> Result<()> {
    info!("Starting Densex v{}", env!("CARGO_PKG_VERSION"));

    let (config, components) = init().await?;
    info!(
        store = components.store.name(),
        llm = components.pipeline.has_llm(),
        "chat pipeline ready"
    );

    let app = crate::api::router()
        .layer(Extension(components.pipeline.clone()))
        .layer(Extension(components.ledger.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = config
        .server
        .address()
        .parse()
        .context("Invalid server address")?;

    info!("HTTP server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Densex shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        // Never resolve; the process is stopped externally
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
