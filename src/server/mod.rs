//! HTTP front end for query processing and the learning system

pub mod http;

use anyhow::{Context, Result};
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{Assistant, ChatClient, QueryTranslator, TextGenerator};
use crate::config::Config;
use crate::learning::{InsightGenerator, LearningStore};

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub assistant: Arc<Assistant>,
    pub insights: Arc<InsightGenerator>,
}

impl ServerState {
    /// Wire the assistant and insight generator around one store
    pub fn new(config: Config, generator: Arc<dyn TextGenerator>, store: LearningStore) -> Self {
        let translator = QueryTranslator::new(generator.clone(), &config.llm);
        let insights = InsightGenerator::from_config(generator, &config);
        let assistant = Assistant::new(translator, Arc::new(RwLock::new(store)));
        Self {
            config: Arc::new(config),
            assistant: Arc::new(assistant),
            insights: Arc::new(insights),
        }
    }

    /// Build state from config: opens the store and the chat client
    pub fn from_config(config: Config) -> Result<Self> {
        let path = config.learning.storage_path()?;
        let store = LearningStore::open(&path)
            .with_context(|| format!("Failed to open learning store at {}", path.display()))?;
        let client = ChatClient::from_config(&config.llm)?;
        Ok(Self::new(config, Arc::new(client), store))
    }
}

/// Build the CORS layer from the configured origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

/// Application router
pub fn router(state: ServerState) -> Router {
    let api = Router::new()
        .route("/query/process", post(http::process_query_handler))
        .route("/learning/feedback", post(http::feedback_handler))
        .route("/learning/history", get(http::history_handler))
        .route("/learning/analysis", get(http::analysis_handler))
        .route("/learning/correction", post(http::correction_handler))
        .route("/learning/report", get(http::report_handler))
        .route("/health", get(http::health_handler))
        .route("/ready", get(http::ready_handler));

    Router::new()
        .route("/", get(http::root_handler))
        .nest("/api/v1", api)
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the server, with optional host/port overrides
pub async fn start(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let state = ServerState::from_config(config)?;
    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port)
        .parse()
        .context("Invalid server address")?;
    let store_path = state.assistant.store().read().await.path().to_path_buf();
    let app = router(state);

    println!("SQL Assistant Server");
    println!("  Learning data: {}", store_path.display());
    println!("  Listening on http://{}", addr);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
