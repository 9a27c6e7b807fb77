use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Request, State},
    http::{self, HeaderName, HeaderValue, Method, StatusCode, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use platform_api::{ErrorClassifier, Failure, FailureSlot, REQUEST_ID_HEADER, RequestContext};
use platform_authz::{GrantRevokeCoordinator, PolicyTranslator, ResourceSchema};
use platform_db::DbPool;
use platform_obs::EventSink;
use sea_orm::{ConnectionTrait, Statement};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::{authorization, config::AppConfig};

/// Header naming the calling application.
pub const APP_CODE_HEADER: &str = "x-bk-app-code";

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<AppConfig>,
    pub translator: PolicyTranslator,
    pub coordinator: GrantRevokeCoordinator,
    pub classifier: ErrorClassifier,
    pub events: EventSink,
}

impl AppState {
    pub fn new(
        db: DbPool,
        config: Arc<AppConfig>,
        schema: Arc<dyn ResourceSchema>,
        events: EventSink,
    ) -> Self {
        Self {
            db,
            config,
            translator: PolicyTranslator::new(schema),
            coordinator: GrantRevokeCoordinator::new(),
            classifier: ErrorClassifier::new(events.clone()),
            events,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    addr: SocketAddr,
}

impl ServeConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            addr: SocketAddr::from((host, port)),
        }
    }
}

pub async fn serve(config: ServeConfig, state: AppState) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;

    info!(%config.addr, "grant server listening");
    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let allow_origin = if allowed.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(allowed)
    };
    CorsLayer::new()
        .allow_headers([
            http::header::CONTENT_TYPE,
            http::header::ACCEPT_LANGUAGE,
            HeaderName::from_static(APP_CODE_HEADER),
        ])
        .allow_methods([Method::POST, Method::GET])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1/open/authorization", authorization::routes())
        .nest("/api/v1/authorization", authorization::routes())
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(state.config.body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), classify_failures))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), MakeRequestUuid))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.config.request_timeout))
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// Fixes the request context, runs the handler and turns any [`Failure`] it
/// left in the response into the uniform error reply.
async fn classify_failures(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let ctx = RequestContext::from_parts(&parts);
    let bytes = match to_bytes(body, state.config.body_limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let failure = Failure::Parse(err.to_string());
            return classified(&state, &ctx, &failure, "");
        }
    };
    let body_text = String::from_utf8_lossy(&bytes).into_owned();
    parts.extensions.insert(ctx.clone());

    let mut response = next.run(Request::from_parts(parts, Body::from(bytes))).await;
    match FailureSlot::take(&mut response) {
        Some(failure) => classified(&state, &ctx, &failure, &body_text),
        None => response,
    }
}

fn classified(state: &AppState, ctx: &RequestContext, failure: &Failure, body: &str) -> Response {
    match state.classifier.classify(ctx, failure, body) {
        Some(reply) => reply.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn not_found() -> Failure {
    Failure::NotFound
}

pub async fn method_not_allowed(method: Method) -> Failure {
    Failure::MethodNotAllowed(method.to_string())
}

/// The application a request is made on behalf of.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerApp(pub String);

impl FromRequestParts<AppState> for CallerApp {
    type Rejection = Failure;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let code = parts
            .headers
            .get(APP_CODE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| Failure::Unauthenticated(format!("missing {APP_CODE_HEADER} header")))?;
        if !state.config.app_permissions.knows(code) {
            return Err(Failure::Forbidden(format!("app {code} may not manage policies")));
        }
        Ok(Self(code.to_string()))
    }
}

/// Request context installed by the classifying middleware.
#[derive(Clone, Debug)]
pub struct Ctx(pub RequestContext);

impl<S: Send + Sync> FromRequestParts<S> for Ctx {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| RequestContext::from_parts(parts));
        Ok(Self(ctx))
    }
}

/// JSON body whose decode errors surface as [`Failure::Parse`].
#[derive(Clone, Debug)]
pub struct JsonBody(pub Value);

impl<S: Send + Sync> FromRequest<S> for JsonBody {
    type Rejection = Failure;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(Failure::Parse(rejection.body_text())),
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let backend = state.db.get_database_backend();
    let db_ok = state
        .db
        .execute(Statement::from_string(backend, "SELECT 1".to_string()))
        .await
        .is_ok();
    Json(HealthResponse {
        ok: db_ok,
        db_ok,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    db_ok: bool,
    version: &'static str,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    ctrl_c.await;

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}
