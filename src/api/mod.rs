//! HTTP surface: router assembly, middleware and the server loop.

pub mod error;
pub mod handlers;
pub mod openapi;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    response::Json,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

use crate::{
    auth::{AuthConfig, AuthState},
    cli::{actions::server::Args, telemetry},
    inference::ModelStore,
    store::{postgres::PgStore, Repositories},
};

pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

/// Shared state handed to every handler through `Extension` layers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub repos: Repositories,
    pub auth: Arc<AuthState>,
    pub models: Arc<ModelStore>,
}

/// Build the CORS layer for an explicit origin list; credentials are allowed.
///
/// # Errors
/// Returns an error if an origin is not a valid header value.
pub fn cors(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).with_context(|| format!("invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]))
}

/// The complete application: documented routes, `/openapi.json` and middleware.
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    let (router, doc) = openapi::api_router().split_for_parts();

    router
        .route(
            "/openapi.json",
            get(move || {
                let doc = doc.clone();
                async move { Json(doc) }
            }),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state.repos))
                .layer(Extension(state.auth))
                .layer(Extension(state.models)),
        )
}

/// Connect to the database, build the app and serve until a shutdown signal.
///
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, or the
/// listener cannot bind.
pub async fn new(args: Args) -> Result<()> {
    let store = PgStore::connect(&args.dsn).await?;

    let state = AppState {
        repos: Repositories::from_backend(Arc::new(store)),
        auth: Arc::new(AuthState::new(
            AuthConfig::default().with_token_ttl_minutes(args.token_ttl_minutes),
            args.secret_key,
        )),
        models: Arc::new(ModelStore::new(args.model_path)),
    };

    let app = app(state, cors(&args.cors_origins)?);

    let listener = TcpListener::bind(format!("::0:{}", args.port)).await?;

    info!("Listening on [::]:{}", args.port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry::shutdown_tracer();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("Failed to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let method = request.method();
    let path = request.uri().path();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or(path, MatchedPath::as_str);
    let request_id = headers
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", %method, path, route, request_id)
}

#[cfg(test)]
mod tests;
