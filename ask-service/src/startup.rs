//! Application startup and lifecycle management.

use crate::config::AskConfig;
use crate::handlers::{ask::ask, health};
use crate::middleware::auth_middleware;
use crate::services::credentials::CredentialRotator;
use crate::services::generator::Generator;
use crate::services::identity::{
    FirebaseVerifier, FirebaseVerifierConfig, IdentityVerifier, DEFAULT_MIN_REFRESH_INTERVAL,
};
use crate::services::providers::gemini::{GeminiClient, GeminiConfig};
use crate::services::providers::CompletionClient;
use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{make_request_span, request_id_middleware},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service_name: Arc<str>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub generator: Arc<Generator>,
}

pub fn build_router(state: AppState, allowed_origin: &str) -> Result<Router, AppError> {
    let origin = allowed_origin.parse::<HeaderValue>().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!(
            "Invalid CORS origin '{}': {}",
            allowed_origin,
            e
        ))
    })?;

    let ask_routes = Router::new()
        .route("/ask", post(ask))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .merge(ask_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| make_request_span(request)),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Builds the production components from `config` and binds the listener.
    pub async fn build(config: AskConfig) -> Result<Self, AppError> {
        let verifier = FirebaseVerifier::new(FirebaseVerifierConfig {
            project_id: config.firebase.project_id.clone(),
            jwks_url: config.firebase.jwks_url.clone(),
            timeout: config.upstream_timeout,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        })
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        tracing::info!(
            project_id = %config.firebase.project_id,
            client_email = config.firebase.client_email.as_deref().unwrap_or("-"),
            "Initialized Firebase token verifier"
        );

        let client: Arc<dyn CompletionClient> = Arc::new(
            GeminiClient::new(GeminiConfig {
                api_base: config.gemini.api_base.clone(),
                timeout: config.upstream_timeout,
            })
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?,
        );

        let generator = Generator::new(
            client,
            config.gemini.keys.clone(),
            Arc::new(CredentialRotator::new()),
            config.gemini.strategy,
            config.gemini.model.clone(),
        );

        tracing::info!(
            model = %config.gemini.model,
            credentials = config.gemini.keys.len(),
            key_strategy = %config.gemini.strategy,
            "Initialized Gemini client"
        );

        let state = AppState {
            service_name: Arc::from(config.service_name.as_str()),
            verifier: Arc::new(verifier),
            generator: Arc::new(generator),
        };

        Self::with_state(state, &config).await
    }

    /// Binds the listener for an already assembled state. Port 0 picks a
    /// random port, which tests rely on.
    pub async fn with_state(state: AppState, config: &AskConfig) -> Result<Self, AppError> {
        let router = build_router(state, &config.allowed_origin)?;

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serves until SIGINT or SIGTERM, then drains in-flight requests.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(port = self.port, "Listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
