//! Integration tests for the REST transport.
//!
//! Each test starts a local axum server on an ephemeral port that speaks the
//! envelope protocol, then drives it through `HttpTransport` and the client.
//!
//! Run with: `cargo test --features http --test http_transport`

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, TimeZone, Utc};
use resource_kit::normalizer::{ErrorBody, RawFailure, CLIENT_ERROR};
use resource_kit::transport::{
    Envelope, ExportFormat, HttpTransport, ImportFile, ImportReport, ListEnvelope, Transport,
};
use resource_kit::{
    Entity, EntityClient, ErrorKind, FieldError, HandlingDirective, ListParams, SortDirection,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const TOKEN: &str = "secret-token";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Product {
    id: u64,
    name: String,
    price: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ProductPatch {
    name: Option<String>,
    price: Option<f64>,
}

impl Entity for Product {
    type Id = u64;
    type Patch = ProductPatch;

    fn id(&self) -> u64 {
        self.id
    }

    fn resource() -> &'static str {
        "products"
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

fn product(id: u64, name: &str, price: f64) -> Product {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    Product {
        id,
        name: name.to_string(),
        price,
        created_at: at,
        updated_at: at,
    }
}

// ============================================================================
// Test server
// ============================================================================

#[derive(Default)]
struct Backend {
    records: Mutex<Vec<Product>>,
    last_query: Mutex<Vec<(String, String)>>,
    last_import: Mutex<Option<(String, Vec<u8>)>>,
}

type Shared = Arc<Backend>;

#[derive(Deserialize)]
struct BulkUpdate {
    id: u64,
    data: ProductPatch,
}

#[derive(Deserialize)]
struct BulkDelete {
    ids: Vec<u64>,
}

fn error(status: StatusCode, body: ErrorBody) -> Response {
    (status, Json(body)).into_response()
}

fn authorized(headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", TOKEN);
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
        _ => Err(error(
            StatusCode::UNAUTHORIZED,
            ErrorBody::with_code("TOKEN_EXPIRED"),
        )),
    }
}

fn apply(base: Product, patch: ProductPatch) -> Product {
    Product {
        name: patch.name.unwrap_or(base.name),
        price: patch.price.unwrap_or(base.price),
        ..base
    }
}

async fn list(
    State(backend): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    *backend.last_query.lock().unwrap() = query;
    let data = backend.records.lock().unwrap().clone();
    let total = data.len() as u64;
    Json(ListEnvelope {
        data,
        total,
        page: 1,
        limit: 10,
        total_pages: 1,
    })
    .into_response()
}

async fn get_one(State(backend): State<Shared>, headers: HeaderMap, Path(id): Path<u64>) -> Response {
    if let Err(denied) = authorized(&headers) {
        return denied;
    }
    let found = backend
        .records
        .lock()
        .unwrap()
        .iter()
        .find(|p| p.id == id)
        .cloned();
    match found {
        Some(p) => Json(Envelope::ok(p)).into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            ErrorBody {
                code: Some("RESOURCE_NOT_FOUND".to_string()),
                ..Default::default()
            },
        ),
    }
}

async fn create(State(backend): State<Shared>, Json(patch): Json<ProductPatch>) -> Response {
    if patch.name.as_deref().map_or(true, str::is_empty) {
        return error(
            StatusCode::BAD_REQUEST,
            ErrorBody {
                message: Some("Product is invalid".to_string()),
                errors: vec![FieldError::new("name", "is required")],
                ..Default::default()
            },
        );
    }
    let mut records = backend.records.lock().unwrap();
    let created = apply(product(records.len() as u64 + 100, "", 0.0), patch);
    records.push(created.clone());
    (StatusCode::CREATED, Json(Envelope::ok(created).with_message("Created"))).into_response()
}

async fn update(
    State(backend): State<Shared>,
    Path(id): Path<u64>,
    Json(patch): Json<ProductPatch>,
) -> Response {
    let mut records = backend.records.lock().unwrap();
    match records.iter_mut().find(|p| p.id == id) {
        Some(slot) => {
            *slot = apply(slot.clone(), patch);
            Json(Envelope::ok(slot.clone())).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn delete_one(State(backend): State<Shared>, Path(id): Path<u64>) -> StatusCode {
    backend.records.lock().unwrap().retain(|p| p.id != id);
    StatusCode::NO_CONTENT
}

async fn create_bulk(
    State(backend): State<Shared>,
    Json(patches): Json<Vec<ProductPatch>>,
) -> Json<Envelope<Vec<Product>>> {
    let mut records = backend.records.lock().unwrap();
    let created: Vec<Product> = patches
        .into_iter()
        .enumerate()
        .map(|(i, patch)| apply(product(200 + i as u64, "", 0.0), patch))
        .collect();
    records.extend(created.clone());
    Json(Envelope::ok(created))
}

async fn update_bulk(
    State(backend): State<Shared>,
    Json(updates): Json<Vec<BulkUpdate>>,
) -> Json<Envelope<Vec<Product>>> {
    let mut records = backend.records.lock().unwrap();
    let mut updated = Vec::new();
    for BulkUpdate { id, data } in updates {
        if let Some(slot) = records.iter_mut().find(|p| p.id == id) {
            *slot = apply(slot.clone(), data);
            updated.push(slot.clone());
        }
    }
    Json(Envelope::ok(updated))
}

async fn delete_bulk(
    State(backend): State<Shared>,
    Json(body): Json<BulkDelete>,
) -> Json<Envelope<u64>> {
    let mut records = backend.records.lock().unwrap();
    let before = records.len();
    records.retain(|p| !body.ids.contains(&p.id));
    Json(Envelope::ok((before - records.len()) as u64))
}

async fn export(
    State(backend): State<Shared>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    *backend.last_query.lock().unwrap() = query;
    let csv: String = backend
        .records
        .lock()
        .unwrap()
        .iter()
        .map(|p| format!("{},{}\n", p.id, p.name))
        .collect();
    ([(header::CONTENT_TYPE, "text/csv")], csv).into_response()
}

async fn import(State(backend): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    *backend.last_import.lock().unwrap() = Some((content_type, body.to_vec()));
    Json(Envelope::ok(ImportReport {
        imported_count: 2,
        errors: vec!["row 3: price missing".to_string()],
    }))
    .into_response()
}

async fn rejected(Path(id): Path<u64>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "data": {
            "id": id,
            "created_at": "2024-03-01T09:00:00Z",
            "updated_at": "2024-03-01T09:00:00Z"
        },
        "message": "Catalogue is frozen",
        "success": false
    }))
}

/// Start the server; returns its base URL and shared state.
async fn serve(records: Vec<Product>) -> (String, Shared) {
    let backend: Shared = Arc::new(Backend::default());
    *backend.records.lock().unwrap() = records;

    let app = Router::new()
        .route("/api/products", get(list).post(create))
        .route(
            "/api/products/bulk",
            post(create_bulk).put(update_bulk).delete(delete_bulk),
        )
        .route("/api/products/export", get(export))
        .route("/api/products/import", post(import))
        .route(
            "/api/products/{id}",
            get(get_one).put(update).delete(delete_one),
        )
        .route("/api/frozen/{id}", get(rejected))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    (format!("http://{}/api/", addr), backend)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Transport
// ============================================================================

/// Test 1: list sends canonical query pairs and the bearer token.
#[tokio::test]
async fn test_list_sends_query_and_token() {
    init_logging();
    let (base, backend) = serve(vec![product(1, "Milk", 1.2), product(2, "Brie", 6.5)]).await;
    let transport = HttpTransport::new(base).with_bearer_token(TOKEN);

    let params = ListParams::new()
        .filter("category", "dairy")
        .sort_by("price", SortDirection::Desc)
        .limit(25);
    let envelope: ListEnvelope<Product> = Transport::<Product>::list(&transport, &params)
        .await
        .expect("list should succeed");

    assert_eq!(envelope.total, 2);
    assert_eq!(envelope.data[1].name, "Brie");

    let query = backend.last_query.lock().unwrap().clone();
    assert!(query.contains(&("category".to_string(), "dairy".to_string())));
    assert!(query.contains(&("limit".to_string(), "25".to_string())));
    assert!(query.contains(&("sortBy".to_string(), "price".to_string())));
    assert!(query.contains(&("sortOrder".to_string(), "desc".to_string())));
}

/// Test 2: a missing token maps to a 401 status with the decoded body.
#[tokio::test]
async fn test_missing_token_is_status_failure() {
    init_logging();
    let (base, _backend) = serve(vec![product(1, "Milk", 1.2)]).await;
    let transport = HttpTransport::new(base);

    let failure = Transport::<Product>::get(&transport, &1).await.unwrap_err();
    assert_eq!(
        failure,
        RawFailure::status_with_body(401, ErrorBody::with_code("TOKEN_EXPIRED"))
    );
}

#[tokio::test]
async fn test_delete_accepts_empty_body() {
    init_logging();
    let (base, backend) = serve(vec![product(1, "Milk", 1.2)]).await;
    let transport = HttpTransport::new(base);

    let envelope = Transport::<Product>::delete(&transport, &1)
        .await
        .expect("204 should be success");
    assert!(envelope.success);
    assert!(backend.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_bulk_routes() {
    init_logging();
    let (base, backend) = serve(vec![product(1, "Milk", 1.2), product(2, "Brie", 6.5)]).await;
    let transport = HttpTransport::new(base);

    let created = Transport::<Product>::create_many(
        &transport,
        &[
            ProductPatch {
                name: Some("Kale".into()),
                price: Some(1.75),
            },
            ProductPatch {
                name: Some("Leek".into()),
                price: None,
            },
        ],
    )
    .await
    .unwrap()
    .data;
    assert_eq!(created.len(), 2);

    let updated = Transport::<Product>::update_many(
        &transport,
        &[(
            1,
            ProductPatch {
                name: None,
                price: Some(1.5),
            },
        )],
    )
    .await
    .unwrap()
    .data;
    assert_eq!(updated[0].price, 1.5);
    assert_eq!(updated[0].name, "Milk");

    let deleted = Transport::<Product>::delete_many(&transport, &[1, 2, 999])
        .await
        .unwrap()
        .data;
    assert_eq!(deleted, 2);
    assert_eq!(backend.records.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_export_and_import() {
    init_logging();
    let (base, backend) = serve(vec![product(1, "Milk", 1.2)]).await;
    let transport = HttpTransport::new(base);

    let bytes = Transport::<Product>::export(
        &transport,
        ExportFormat::Xlsx,
        &ListParams::new().filter("name", "Milk"),
    )
    .await
    .unwrap();
    assert_eq!(bytes, b"1,Milk\n");
    let query = backend.last_query.lock().unwrap().clone();
    assert!(query.contains(&("format".to_string(), "xlsx".to_string())));
    assert!(query.contains(&("name".to_string(), "Milk".to_string())));

    let file = ImportFile::new("catalogue.csv", "id,name\n5,Feta\n");
    let report = Transport::<Product>::import(&transport, &file)
        .await
        .unwrap()
        .data;
    assert_eq!(report.imported_count, 2);
    assert_eq!(report.errors, vec!["row 3: price missing".to_string()]);

    let (content_type, body) = backend.last_import.lock().unwrap().clone().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"catalogue.csv\""));
    assert!(body.contains("5,Feta"));
}

#[tokio::test]
async fn test_connection_refused_is_network_failure() {
    init_logging();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = HttpTransport::new(format!("http://{}", addr));
    let failure = Transport::<Product>::get(&transport, &1).await.unwrap_err();
    assert!(matches!(failure, RawFailure::Network(_)));
}

// ============================================================================
// Client over HTTP
// ============================================================================

/// Test 3: expired sessions surface as a directive through the client.
#[tokio::test]
async fn test_client_emits_directive_on_expired_token() {
    init_logging();
    let (base, _backend) = serve(vec![product(1, "Milk", 1.2)]).await;
    let client: EntityClient<Product, _> =
        EntityClient::new(HttpTransport::new(base).with_bearer_token("stale"));
    let mut directives = client.directives();

    let err = client.get_by_id(&1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    assert_eq!(err.code(), "TOKEN_EXPIRED");
    assert_eq!(
        directives.try_recv(),
        Some(HandlingDirective::ClearSessionAndLogin {
            reason: "session_expired"
        })
    );
}

#[tokio::test]
async fn test_client_validation_and_not_found() {
    init_logging();
    let (base, _backend) = serve(vec![product(1, "Milk", 1.2)]).await;
    let client: EntityClient<Product, _> =
        EntityClient::new(HttpTransport::new(base).with_bearer_token(TOKEN));

    let invalid = client.create(ProductPatch::default()).await.unwrap_err();
    assert_eq!(invalid.kind(), ErrorKind::Validation);
    assert_eq!(invalid.message(), "Product is invalid");
    assert_eq!(invalid.field_messages()["name"], vec!["is required".to_string()]);

    let missing = client.get_by_id(&42).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    assert_eq!(missing.message(), "The requested resource does not exist.");
}

#[tokio::test]
async fn test_client_round_trip_with_cache() {
    init_logging();
    let (base, backend) = serve(vec![product(1, "Milk", 1.2)]).await;
    let client: EntityClient<Product, _> =
        EntityClient::new(HttpTransport::new(base).with_bearer_token(TOKEN));

    let first = client.list(&ListParams::new()).await.unwrap();
    assert_eq!(first.items.len(), 1);

    // Served from cache even though the backend changed underneath.
    backend.records.lock().unwrap().push(product(2, "Brie", 6.5));
    assert_eq!(client.list(&ListParams::new()).await.unwrap().items.len(), 1);

    let created = client
        .create(ProductPatch {
            name: Some("Kale".into()),
            price: Some(1.75),
        })
        .await
        .unwrap();
    assert_eq!(created.name, "Kale");

    // The create invalidated the cached page.
    assert_eq!(client.list(&ListParams::new()).await.unwrap().items.len(), 3);
}

#[tokio::test]
async fn test_rejected_envelope_uses_server_message() {
    init_logging();
    let (base, _backend) = serve(Vec::new()).await;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Frozen {
        id: u64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl Entity for Frozen {
        type Id = u64;
        type Patch = ();

        fn id(&self) -> u64 {
            self.id
        }

        fn resource() -> &'static str {
            "frozen"
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn updated_at(&self) -> DateTime<Utc> {
            self.updated_at
        }
    }

    let client: EntityClient<Frozen, _> = EntityClient::new(HttpTransport::new(base));
    let err = client.get_by_id(&1).await.unwrap_err();
    assert_eq!(err.message(), "Catalogue is frozen");
    assert_eq!(err.kind(), ErrorKind::Unexpected);
}

#[tokio::test]
async fn test_client_network_failure_is_client_error() {
    init_logging();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client: EntityClient<Product, _> =
        EntityClient::new(HttpTransport::new(format!("http://{}", addr)));
    let err = client.list(&ListParams::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Client);
    assert_eq!(err.code(), CLIENT_ERROR);
}
