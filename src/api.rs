//! HTTP management API.
//!
//! Record owners identify themselves with an opaque 36-character
//! identifier passed as a `uuid` query parameter; a middleware checks
//! its shape and, when an identity service is configured, asks it for a
//! verdict before any management handler runs. `/statistics` stays
//! outside that gate.

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task;
use tower_http::cors::CorsLayer;

use crate::config::ServerConfig;
use crate::errors::DnsError;
use crate::stats::{QueryStats, StatsSnapshot};
use crate::store::{Record, RecordStore};

/// Shared state for the management handlers.
#[derive(Clone)]
pub struct ApiState {
    store: RecordStore,
    stats: Arc<QueryStats>,
    zone: String,
    verify_url: Option<String>,
    http: reqwest::Client,
}

impl ApiState {
    pub fn new(config: &ServerConfig, store: RecordStore, stats: Arc<QueryStats>) -> Self {
        Self {
            store,
            stats,
            zone: config.zone.trim_end_matches('.').to_ascii_lowercase(),
            verify_url: config.verify_url.clone(),
            http: reqwest::Client::new(),
        }
    }
}

/// The verified caller identifier, inserted by [`verify_caller`].
#[derive(Clone)]
pub struct CallerId(pub String);

type ApiError = (StatusCode, String);

#[derive(Deserialize)]
struct IdentityQuery {
    uuid: Option<String>,
}

#[derive(Deserialize)]
struct VerifyReply {
    #[serde(default)]
    valid: bool,
}

#[derive(Deserialize)]
struct UpsertRequest {
    domain: String,
    #[serde(default)]
    ipv4: Option<String>,
    #[serde(default)]
    ipv6: Option<String>,
}

#[derive(Serialize)]
struct AvailabilityReply {
    available: bool,
}

#[derive(Serialize)]
struct RecordReply {
    message: String,
    record: Record,
}

#[derive(Serialize)]
struct MessageReply {
    message: String,
}

/// Build the management router.
pub fn router(state: ApiState) -> Router {
    let protected = Router::new()
        .route(
            "/checks/is-domain-available/{domain}",
            get(is_domain_available),
        )
        .route(
            "/checks/is-domain-taken-by-someone/{domain}",
            get(is_domain_taken),
        )
        .route("/manage-record/create-or-update", post(create_or_update))
        .route("/manage-record/delete", get(delete_record))
        .layer(middleware::from_fn_with_state(state.clone(), verify_caller));

    Router::new()
        .merge(protected)
        .route("/statistics", get(statistics))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind the HTTP listener and serve the management API.
pub async fn run_http_server(addr: SocketAddr, state: ApiState) -> Result<(), DnsError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP management API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Gate management routes on the caller identifier.
///
/// The identifier must be exactly 36 characters; when an identity
/// service is configured it also has to vouch for it. The verified
/// identifier lands in the request extensions as [`CallerId`].
async fn verify_caller(
    State(state): State<ApiState>,
    Query(identity): Query<IdentityQuery>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(uuid) = identity.uuid.filter(|u| u.len() == 36) else {
        return Err((
            StatusCode::BAD_REQUEST,
            "A 36-character uuid query parameter is required".to_string(),
        ));
    };

    if let Some(base) = &state.verify_url {
        let url = format!("{}/{}", base.trim_end_matches('/'), uuid);
        let reply = state.http.get(&url).send().await.map_err(|e| {
            warn!("Identity service request failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                "Identity service unreachable".to_string(),
            )
        })?;
        if !reply.status().is_success() {
            return Err((StatusCode::UNAUTHORIZED, "Identifier rejected".to_string()));
        }
        let verdict: VerifyReply = reply.json().await.map_err(|e| {
            warn!("Identity service reply unreadable: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                "Identity service unreachable".to_string(),
            )
        })?;
        if !verdict.valid {
            return Err((StatusCode::UNAUTHORIZED, "Identifier rejected".to_string()));
        }
    }

    request.extensions_mut().insert(CallerId(uuid));
    Ok(next.run(request).await)
}

/// Whether a domain is free for anyone to claim.
async fn is_domain_available(
    State(state): State<ApiState>,
    Path(domain): Path<String>,
) -> Result<Json<AvailabilityReply>, ApiError> {
    let domain = validate_domain(&state.zone, &domain)?;
    let store = state.store.clone();
    let in_use = task::spawn_blocking(move || store.domain_in_use(&domain))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;
    Ok(Json(AvailabilityReply { available: !in_use }))
}

/// Whether a domain is free for THIS caller, ignoring their own record.
async fn is_domain_taken(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerId>,
    Path(domain): Path<String>,
) -> Result<Json<AvailabilityReply>, ApiError> {
    let domain = validate_domain(&state.zone, &domain)?;
    let store = state.store.clone();
    let taken = task::spawn_blocking(move || store.domain_taken_by_other(&domain, &caller.0))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;
    Ok(Json(AvailabilityReply { available: !taken }))
}

/// Create or replace the caller's record.
async fn create_or_update(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerId>,
    Json(request): Json<UpsertRequest>,
) -> Result<Json<RecordReply>, ApiError> {
    let domain = validate_domain(&state.zone, &request.domain)?;
    let ipv4 = parse_addr::<Ipv4Addr>(request.ipv4.as_deref(), "IPv4")?;
    let ipv6 = parse_addr::<Ipv6Addr>(request.ipv6.as_deref(), "IPv6")?;
    if ipv4.is_none() && ipv6.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            "At least one of ipv4 or ipv6 is required".to_string(),
        ));
    }

    let store = state.store.clone();
    let check_domain = domain.clone();
    let check_caller = caller.0.clone();
    let taken =
        task::spawn_blocking(move || store.domain_taken_by_other(&check_domain, &check_caller))
            .await
            .map_err(internal_error)?
            .map_err(internal_error)?;
    if taken {
        return Err((StatusCode::CONFLICT, "Domain is already taken".to_string()));
    }

    let store = state.store.clone();
    let record = task::spawn_blocking(move || {
        store.upsert(&caller.0, &domain, ipv4.as_deref(), ipv6.as_deref())
    })
    .await
    .map_err(internal_error)?
    .map_err(internal_error)?;
    Ok(Json(RecordReply {
        message: "Record saved".to_string(),
        record,
    }))
}

/// Delete the caller's record.
async fn delete_record(
    State(state): State<ApiState>,
    Extension(caller): Extension<CallerId>,
) -> Result<Json<MessageReply>, ApiError> {
    let store = state.store.clone();
    let deleted = task::spawn_blocking(move || store.delete(&caller.0))
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;
    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            "No record found for this identifier".to_string(),
        ));
    }
    Ok(Json(MessageReply {
        message: "Record deleted".to_string(),
    }))
}

/// In-memory query counters since startup.
async fn statistics(State(state): State<ApiState>) -> Json<StatsSnapshot> {
    Json(state.stats.snapshot())
}

/// Normalize and check a submitted domain: it must sit under the served
/// zone with at least one well-formed host label in front.
fn validate_domain(zone: &str, raw: &str) -> Result<String, ApiError> {
    let name = raw.trim().trim_end_matches('.').to_ascii_lowercase();
    let suffix = format!(".{}", zone);
    let Some(host) = name.strip_suffix(&suffix) else {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Domain must end with .{}", zone),
        ));
    };
    if host.is_empty() || !host.split('.').all(valid_label) {
        return Err((StatusCode::BAD_REQUEST, "Invalid domain name".to_string()));
    }
    Ok(name)
}

fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}

/// Parse an optional address field, normalizing it to its canonical
/// string form; blank means absent.
fn parse_addr<T>(raw: Option<&str>, family: &str) -> Result<Option<String>, ApiError>
where
    T: FromStr + Display,
{
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<T>() {
        Ok(addr) => Ok(Some(addr.to_string())),
        Err(_) => Err((
            StatusCode::BAD_REQUEST,
            format!("Invalid {} address: {}", family, raw),
        )),
    }
}

fn internal_error<E: Display>(e: E) -> ApiError {
    error!("Management API failure: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal error".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CALLER: &str = "11111111-2222-4333-8444-555555555555";
    const OTHER: &str = "99999999-8888-4777-8666-555555555555";

    struct Fixture {
        _dir: TempDir,
        state: ApiState,
    }

    fn fixture(verify_url: Option<String>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ddns.db");
        let store = RecordStore::open(path.to_str().unwrap(), "example.com").unwrap();
        let state = ApiState {
            store,
            stats: Arc::new(QueryStats::new()),
            zone: "example.com".to_string(),
            verify_url,
            http: reqwest::Client::new(),
        };
        Fixture { _dir: dir, state }
    }

    fn get_request(path: &str) -> Request {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    fn post_json(path: &str, body: Value) -> Request {
        Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(state: ApiState, request: Request) -> (StatusCode, Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }

    /// A stand-in identity service that vouches for exactly one
    /// identifier.
    async fn spawn_identity_service(accepted: &'static str) -> SocketAddr {
        let app = Router::new().route(
            "/{uuid}",
            get(move |Path(uuid): Path<String>| async move {
                Json(json!({ "valid": uuid == accepted }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn requests_without_a_valid_uuid_are_rejected() {
        let fx = fixture(None);
        let (status, _) = send(
            fx.state.clone(),
            get_request("/checks/is-domain-available/host.example.com"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            fx.state.clone(),
            get_request("/checks/is-domain-available/host.example.com?uuid=short"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn availability_reflects_the_store() {
        let fx = fixture(None);
        let (status, body) = send(
            fx.state.clone(),
            get_request(&format!(
                "/checks/is-domain-available/free.example.com?uuid={}",
                CALLER
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], json!(true));

        // the store plants loopback.<zone> at startup
        let (status, body) = send(
            fx.state.clone(),
            get_request(&format!(
                "/checks/is-domain-available/loopback.example.com?uuid={}",
                CALLER
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], json!(false));
    }

    #[tokio::test]
    async fn create_update_delete_round_trip() {
        let fx = fixture(None);
        let path = format!("/manage-record/create-or-update?uuid={}", CALLER);

        let (status, body) = send(
            fx.state.clone(),
            post_json(
                &path,
                json!({ "domain": "host.example.com", "ipv4": "192.0.2.10" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["domain"], json!("host.example.com"));
        assert_eq!(body["record"]["ipv4"], json!("192.0.2.10"));

        let (status, body) = send(
            fx.state.clone(),
            post_json(
                &path,
                json!({ "domain": "host.example.com", "ipv4": "192.0.2.99" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["ipv4"], json!("192.0.2.99"));

        let delete_path = format!("/manage-record/delete?uuid={}", CALLER);
        let (status, _) = send(fx.state.clone(), get_request(&delete_path)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(fx.state.clone(), get_request(&delete_path)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn a_domain_owned_by_someone_else_cannot_be_claimed() {
        let fx = fixture(None);
        let (status, _) = send(
            fx.state.clone(),
            post_json(
                &format!("/manage-record/create-or-update?uuid={}", CALLER),
                json!({ "domain": "host.example.com", "ipv4": "192.0.2.10" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            fx.state.clone(),
            get_request(&format!(
                "/checks/is-domain-taken-by-someone/host.example.com?uuid={}",
                OTHER
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], json!(false));

        let (status, _) = send(
            fx.state.clone(),
            post_json(
                &format!("/manage-record/create-or-update?uuid={}", OTHER),
                json!({ "domain": "host.example.com", "ipv4": "192.0.2.20" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // the owner can still see the name as theirs
        let (_, body) = send(
            fx.state.clone(),
            get_request(&format!(
                "/checks/is-domain-taken-by-someone/host.example.com?uuid={}",
                CALLER
            )),
        )
        .await;
        assert_eq!(body["available"], json!(true));
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected() {
        let fx = fixture(None);
        let path = format!("/manage-record/create-or-update?uuid={}", CALLER);

        let (status, _) = send(
            fx.state.clone(),
            post_json(
                &path,
                json!({ "domain": "host.elsewhere.net", "ipv4": "192.0.2.10" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            fx.state.clone(),
            post_json(
                &path,
                json!({ "domain": "host.example.com", "ipv4": "not-an-ip" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            fx.state.clone(),
            post_json(&path, json!({ "domain": "host.example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn statistics_need_no_identifier() {
        let fx = fixture(None);
        let (status, body) = send(fx.state.clone(), get_request("/statistics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_queries"], json!(0));
    }

    #[tokio::test]
    async fn identity_service_verdicts_are_enforced() {
        let addr = spawn_identity_service(CALLER).await;
        let fx = fixture(Some(format!("http://{}", addr)));

        let (status, _) = send(
            fx.state.clone(),
            get_request(&format!(
                "/checks/is-domain-available/host.example.com?uuid={}",
                CALLER
            )),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            fx.state.clone(),
            get_request(&format!(
                "/checks/is-domain-available/host.example.com?uuid={}",
                OTHER
            )),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unreachable_identity_service_is_a_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fx = fixture(Some(format!("http://{}", addr)));
        let (status, _) = send(
            fx.state.clone(),
            get_request(&format!(
                "/checks/is-domain-available/host.example.com?uuid={}",
                CALLER
            )),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
