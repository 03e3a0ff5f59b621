use {
    crate::server::FailurePolicy,
    axum::{
        Json, Router,
        extract::State,
        response::{IntoResponse, Response},
        routing::get,
    },
    chrono::Utc,
    http::{StatusCode, Uri, header::ALLOW},
    imds_proxy_credentials::{CredentialResolver, ErrorRecord, ResolveError},
    log::{debug, warn},
    std::{future::pending, sync::Arc},
    tokio::sync::mpsc::Sender,
};

#[derive(Clone)]
pub(crate) struct AppState {
    resolver: Arc<CredentialResolver>,
    failure_policy: FailurePolicy,
    fatal: Sender<ResolveError>,
}

impl AppState {
    pub(crate) fn new(resolver: CredentialResolver, failure_policy: FailurePolicy, fatal: Sender<ResolveError>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            failure_policy,
            fatal,
        }
    }
}

/// Every path answers `GET` with the current credentials; every other method is rejected.
pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_credentials).head(method_not_allowed))
        .route("/{*path}", get(get_credentials).head(method_not_allowed))
        .with_state(state)
}

async fn get_credentials(State(state): State<AppState>, uri: Uri) -> Response {
    debug!("GET {uri}");

    match state.resolver.resolve().await {
        Ok(record) => {
            debug!("Serving credentials expiring at {}", record.expiration);
            (StatusCode::OK, Json(record)).into_response()
        }
        Err(e) => match state.failure_policy {
            FailurePolicy::Exit => {
                // The server stops on the first report and aborts this connection, so nothing is ever written back.
                // A full channel means another request already reported.
                let _ = state.fatal.try_send(e);
                pending().await
            }
            FailurePolicy::Respond => {
                warn!("{e}");
                let record = ErrorRecord::new(e.code(), e.to_string(), Utc::now());
                (StatusCode::INTERNAL_SERVER_ERROR, Json(record)).into_response()
            }
        },
    }
}

// axum answers HEAD with the GET handler unless told otherwise.
async fn method_not_allowed() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, [(ALLOW, "GET")])
}
