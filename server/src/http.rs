use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use anyhow::Context;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{self, HeaderName, HeaderValue, Method, StatusCode, request::Parts},
    response::IntoResponse,
    routing::{get, post},
};
use platform_api::{ApiError, ApiResult};
use products_hr::{Draft, Employee, EmployeeService, HrError, Lookup};
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    config::AppConfig,
    graphql::{self, SchemaType},
};

const SAVE_SUCCESS: &str = "Save success!";
const UPDATE_SUCCESS: &str = "Update success!";
const DOES_NOT_EXIST: &str = "Does not exist";

#[derive(Clone)]
pub struct AppState {
    pub employees: EmployeeService,
    pub schema: SchemaType,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(employees: EmployeeService, config: Arc<AppConfig>) -> Self {
        let schema = graphql::build_schema(employees.clone());
        Self {
            employees,
            schema,
            config,
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

    info!(%config.addr, "employee server listening");
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
        .allow_headers([http::header::CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(allow_origin)
}

pub fn build_router(state: AppState) -> Router {
    let request_id = MakeRequestUuid;
    let header_name = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/health", get(health_handler))
        .route("/employee", get(list_employees).post(create_employee))
        .route(
            "/employee/{id}",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
        .route("/graphql", post(graphql_handler))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header_name.clone(), request_id))
                .layer(PropagateRequestIdLayer::new(header_name))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_allowed_origins)),
        )
        .with_state(state)
}

/// `Json` whose rejections use the shared error body.
struct ApiJson<T>(T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| ApiError::InvalidInput(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// `Path` whose rejections use the shared error body.
struct ApiPath<T>(T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection: PathRejection| ApiError::InvalidInput(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// Body returned by create and update.
#[derive(Debug, Serialize)]
struct SavedReply {
    message: &'static str,
    employee: Employee,
}

async fn list_employees(State(state): State<AppState>) -> ApiResult<Json<Vec<Employee>>> {
    let rows = state.employees.get_all().await.map_err(hr_error)?;
    Ok(Json(rows))
}

async fn get_employee(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<Employee>> {
    match state.employees.get_by_id(id).await.map_err(hr_error)? {
        Lookup::Found(employee) => Ok(Json(employee)),
        Lookup::NotFound => Err(ApiError::not_found()),
    }
}

async fn create_employee(
    State(state): State<AppState>,
    ApiJson(draft): ApiJson<Draft>,
) -> ApiResult<(StatusCode, Json<SavedReply>)> {
    let employee = state.employees.create(draft).await.map_err(hr_error)?;
    Ok((
        StatusCode::CREATED,
        Json(SavedReply {
            message: SAVE_SUCCESS,
            employee,
        }),
    ))
}

async fn update_employee(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(draft): ApiJson<Draft>,
) -> ApiResult<Json<SavedReply>> {
    match state.employees.update(id, draft).await.map_err(hr_error)? {
        Lookup::Found(employee) => Ok(Json(SavedReply {
            message: UPDATE_SUCCESS,
            employee,
        })),
        Lookup::NotFound => Err(ApiError::NotFound(DOES_NOT_EXIST.into())),
    }
}

async fn delete_employee(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<bool>> {
    match state.employees.delete(id).await.map_err(hr_error)? {
        Lookup::Found(_) => Ok(Json(true)),
        Lookup::NotFound => Err(ApiError::not_found()),
    }
}

async fn graphql_handler(
    State(state): State<AppState>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    state.schema.execute(request.into_inner()).await.into()
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.employees.storage_ok().await;
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

fn hr_error(err: HrError) -> ApiError {
    ApiError::internal(err.into())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        signal(SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use platform_db::{DbError, DbResult, EmployeeStore, MemoryEmployeeStore};
    use sea_orm::DbErr;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn router_with(store: Arc<dyn EmployeeStore>) -> Router {
        let state = AppState::new(EmployeeService::new(store), Arc::new(AppConfig::default()));
        build_router(state)
    }

    fn router() -> Router {
        router_with(Arc::new(MemoryEmployeeStore::new()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(http::header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn employee_crud_round() {
        let app = router();

        let (status, body) = send(
            &app,
            Method::POST,
            "/employee",
            Some(json!({"name": "Alice", "email": "a@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(
            body,
            json!({"message": "Save success!", "employee": {"id": 1, "name": "Alice", "email": "a@x.com"}})
        );

        let (status, body) = send(&app, Method::GET, "/employee/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": 1, "name": "Alice", "email": "a@x.com"}));

        let (status, body) = send(
            &app,
            Method::PUT,
            "/employee/1",
            Some(json!({"id": 99, "name": "Alicia", "email": "a@x.com"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Update success!");
        assert_eq!(body["employee"]["id"], 1);
        assert_eq!(body["employee"]["name"], "Alicia");

        let (status, body) = send(&app, Method::GET, "/employee", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([{"id": 1, "name": "Alicia", "email": "a@x.com"}]));

        let (status, body) = send(&app, Method::DELETE, "/employee/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(true));

        let (status, body) = send(&app, Method::GET, "/employee/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (_, body) = send(&app, Method::GET, "/employee", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn update_of_unknown_employee_is_not_found() {
        let app = router();
        let (status, body) = send(
            &app,
            Method::PUT,
            "/employee/5",
            Some(json!({"name": "Ghost"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"code": "NOT_FOUND", "message": "Does not exist"}));
    }

    #[tokio::test]
    async fn delete_of_unknown_employee_is_not_found() {
        let app = router();
        let (status, body) = send(&app, Method::DELETE, "/employee/5", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn non_numeric_id_is_invalid_input() {
        let app = router();
        let (status, body) = send(&app, Method::GET, "/employee/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_input() {
        let app = router();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/employee")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "INVALID_INPUT");

        let (_, listed) = send(&app, Method::GET, "/employee", None).await;
        assert_eq!(listed, json!([]));
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let app = router();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn health_reports_storage_state() {
        let (status, body) = send(&router(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["db_ok"], true);

        let (_, body) = send(&router_with(Arc::new(DownStore)), Method::GET, "/health", None).await;
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn storage_failure_is_masked() {
        let app = router_with(Arc::new(DownStore));
        let (status, body) = send(&app, Method::GET, "/employee", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"code": "INTERNAL", "message": "internal server error"})
        );
    }

    #[tokio::test]
    async fn graphql_endpoint_serves_employees() {
        let app = router();
        send(
            &app,
            Method::POST,
            "/employee",
            Some(json!({"name": "Bob", "email": "b@x.com"})),
        )
        .await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/graphql",
            Some(json!({"query": "{ employees { id name } }"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"data": {"employees": [{"id": 1, "name": "Bob"}]}}));
    }

    struct DownStore;

    fn unreachable() -> DbError {
        DbError::Unavailable(DbErr::Custom("connection refused".into()))
    }

    #[async_trait]
    impl EmployeeStore for DownStore {
        async fn find_all(&self) -> DbResult<Vec<Employee>> {
            Err(unreachable())
        }

        async fn find_by_id(&self, _id: i64) -> DbResult<Option<Employee>> {
            Err(unreachable())
        }

        async fn save(&self, _draft: Draft) -> DbResult<Employee> {
            Err(unreachable())
        }

        async fn delete_by_id(&self, _id: i64) -> DbResult<bool> {
            Err(unreachable())
        }

        async fn ping(&self) -> DbResult<()> {
            Err(unreachable())
        }
    }
}
