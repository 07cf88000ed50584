//! Request DTO validation layer.
//!
//! Wraps a route so that its query string or body is checked against a
//! [`Schema`] before the handler runs. Rejected requests are answered here
//! with a 400 listing every violation; accepted ones continue with the
//! coerced data in place.

use std::{
    convert::Infallible,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    async_trait,
    body::{to_bytes, Body},
    extract::{FromRequestParts, Request},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        request::Parts,
        HeaderMap, HeaderValue, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Json,
};
use domain::{validation, AppError, Schema, ValidationSource, Violation};
use http_body_util::LengthLimitError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tower::{Layer, Service};

use super::errors::{ApiError, FinalErrorBody};

/// Largest body read for validation.
pub const MAX_BODY_BYTES: usize = 100 * 1024;

pub const VALIDATION_FAILED: &str = "Validation failed";

/// Body of a 400 answer to a request that failed validation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationFailure {
    pub error: String,
    pub details: Vec<Violation>,
}

impl IntoResponse for ValidationFailure {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::BAD_REQUEST, Json(self)).into_response();
        response.extensions_mut().insert(FinalErrorBody);
        response
    }
}

/// Query parameters accepted by a query validation layer, already coerced.
///
/// Kept apart from the raw query so handlers can still read the original
/// string through `Query` or the URI.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedQuery(pub Map<String, Value>);

impl ValidatedQuery {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Reads the validated values into a typed DTO.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.0.clone())).map_err(|err| {
            ApiError::from(anyhow::Error::new(err).context("Validated query does not fit its DTO"))
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ValidatedQuery
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<ValidatedQuery>().cloned().ok_or_else(|| {
            anyhow::anyhow!("ValidatedQuery extracted on a route without query validation").into()
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyFormat {
    Json,
    Form,
    Unsupported,
}

impl BodyFormat {
    fn of(headers: &HeaderMap) -> Self {
        let Some(content_type) = headers.get(CONTENT_TYPE) else {
            return Self::Json;
        };
        let mime = content_type
            .to_str()
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime == "application/json" || mime.ends_with("+json") {
            Self::Json
        } else if mime == "application/x-www-form-urlencoded" {
            Self::Form
        } else {
            Self::Unsupported
        }
    }
}

fn pairs_object(encoded: &str) -> Result<Map<String, Value>, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(encoded)?;
    Ok(validation::object_from_pairs(pairs))
}

fn query_object(uri: &Uri) -> Result<Map<String, Value>, ApiError> {
    pairs_object(uri.query().unwrap_or_default())
        .map_err(|_| AppError::bad_request("Malformed query string").into())
}

fn body_read_error(err: axum::Error) -> AppError {
    if err.into_inner().is::<LengthLimitError>() {
        AppError::new(413, "Request body too large")
    } else {
        AppError::bad_request("Request body could not be read")
    }
}

async fn body_object(headers: &HeaderMap, body: Body) -> Result<Map<String, Value>, ApiError> {
    let bytes = to_bytes(body, MAX_BODY_BYTES).await.map_err(body_read_error)?;
    if bytes.is_empty() {
        return Ok(Map::new());
    }

    match BodyFormat::of(headers) {
        BodyFormat::Json => match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(object)) => Ok(object),
            Ok(_) => Err(AppError::bad_request("Request body must be a JSON object").into()),
            Err(_) => Err(AppError::bad_request("Malformed JSON body").into()),
        },
        BodyFormat::Form => {
            let encoded = std::str::from_utf8(&bytes)
                .map_err(|_| AppError::bad_request("Malformed form body"))?;
            pairs_object(encoded).map_err(|_| AppError::bad_request("Malformed form body").into())
        }
        BodyFormat::Unsupported => Err(AppError::new(415, "Unsupported content type").into()),
    }
}

/// Schema bound to the part of the request it checks.
#[derive(Clone, Debug)]
pub struct DtoValidator {
    schema: Schema,
    source: ValidationSource,
}

impl DtoValidator {
    pub fn new(schema: Schema, source: ValidationSource) -> Self {
        Self { schema, source }
    }

    /// Validates `request`, returning it with the validated data attached,
    /// or the response that ends it.
    pub async fn check(&self, request: Request) -> Result<Request, Response> {
        match self.source {
            ValidationSource::Query => self.check_query(request),
            ValidationSource::Body => self.check_body(request).await,
        }
    }

    fn check_query(&self, mut request: Request) -> Result<Request, Response> {
        let raw = query_object(request.uri()).map_err(IntoResponse::into_response)?;
        let validated = self.validate(raw)?;

        request.extensions_mut().insert(ValidatedQuery(validated));
        Ok(request)
    }

    async fn check_body(&self, request: Request) -> Result<Request, Response> {
        let (mut parts, body) = request.into_parts();
        let raw = body_object(&parts.headers, body)
            .await
            .map_err(IntoResponse::into_response)?;
        let validated = self.validate(raw)?;

        let bytes = serde_json::to_vec(&Value::Object(validated))
            .map_err(|err| ApiError::from(anyhow::Error::new(err)).into_response())?;
        parts
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        parts
            .headers
            .insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));

        Ok(Request::from_parts(parts, Body::from(bytes)))
    }

    fn validate(&self, raw: Map<String, Value>) -> Result<Map<String, Value>, Response> {
        self.schema.validate(raw).map_err(|details| {
            tracing::debug!(
                source = %self.source,
                violations = details.len(),
                "Request rejected by validation"
            );
            ValidationFailure {
                error: VALIDATION_FAILED.to_string(),
                details,
            }
            .into_response()
        })
    }
}

/// Layer that validates requests before they reach the wrapped route.
#[derive(Clone, Debug)]
pub struct ValidateLayer {
    validator: Arc<DtoValidator>,
}

impl ValidateLayer {
    pub fn new(schema: Schema, source: ValidationSource) -> Self {
        Self {
            validator: Arc::new(DtoValidator::new(schema, source)),
        }
    }
}

/// Shorthand for [`ValidateLayer::new`].
pub fn validate_dto(schema: Schema, source: ValidationSource) -> ValidateLayer {
    ValidateLayer::new(schema, source)
}

impl<S> Layer<S> for ValidateLayer {
    type Service = Validate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Validate {
            inner,
            validator: self.validator.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Validate<S> {
    inner: S,
    validator: Arc<DtoValidator>,
}

impl<S> Service<Request> for Validate<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let validator = self.validator.clone();
        // The clone may not be ready; keep the one that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match validator.check(request).await {
                Ok(request) => inner.call(request).await,
                Err(response) => Ok(response),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        extract::State,
        routing::{get, post},
        Router,
    };
    use domain::FieldRule;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    type Calls = Arc<AtomicUsize>;

    #[derive(Debug, Deserialize, PartialEq)]
    struct SearchQuery {
        name: Option<String>,
        age: Option<i64>,
    }

    fn query_dto() -> Schema {
        Schema::new()
            .field("name", FieldRule::string().optional())
            .field("age", FieldRule::integer().min(1.0).optional())
    }

    fn body_dto() -> Schema {
        Schema::new()
            .field("title", FieldRule::string())
            .field("price", FieldRule::integer().min(0.0))
    }

    async fn search(State(calls): State<Calls>, query: ValidatedQuery) -> Json<Value> {
        calls.fetch_add(1, Ordering::SeqCst);
        Json(Value::Object(query.0))
    }

    async fn typed_search(query: ValidatedQuery) -> Result<String, ApiError> {
        let dto: SearchQuery = query.deserialize()?;
        Ok(format!("{:?}/{:?}", dto.name, dto.age))
    }

    async fn create(State(calls): State<Calls>, Json(body): Json<Value>) -> Json<Value> {
        calls.fetch_add(1, Ordering::SeqCst);
        Json(body)
    }

    async fn unvalidated(query: ValidatedQuery) -> Json<Value> {
        Json(Value::Object(query.0))
    }

    fn app(calls: Calls) -> Router {
        Router::new()
            .route(
                "/search",
                get(search).layer(validate_dto(query_dto(), ValidationSource::Query)),
            )
            .route(
                "/typed",
                get(typed_search).layer(validate_dto(query_dto(), ValidationSource::Query)),
            )
            .route(
                "/products",
                post(create).layer(validate_dto(body_dto(), ValidationSource::Body)),
            )
            .route("/unvalidated", get(unvalidated))
            .with_state(calls)
    }

    async fn send(calls: &Calls, request: Request) -> (StatusCode, Vec<u8>) {
        let response = app(calls.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn get_request(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_request(content_type: Option<&str>, body: impl Into<Body>) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/products");
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(body.into()).unwrap()
    }

    fn post_json(body: Value) -> Request {
        post_request(Some("application/json"), body.to_string())
    }

    fn json_of(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    fn failure_of(bytes: &[u8]) -> ValidationFailure {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn valid_query_is_coerced_and_attached() {
        let calls = Calls::default();

        let (status, body) = send(&calls, get_request("/search?name=John&age=25")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({ "name": "John", "age": 25 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_below_minimum_is_rejected() {
        let calls = Calls::default();

        let (status, body) = send(&calls, get_request("/search?name=John&age=-5")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let failure = failure_of(&body);
        assert_eq!(failure.error, VALIDATION_FAILED);
        assert_eq!(failure.details.len(), 1);
        assert_eq!(failure.details[0].property, "age");
        assert_eq!(
            failure.details[0].constraints.get("min").map(String::as_str),
            Some("age must not be less than 1")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_query_passes_optional_fields() {
        let calls = Calls::default();

        let (status, body) = send(&calls, get_request("/search")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_query_key_fails_type_check() {
        let calls = Calls::default();

        let (status, body) = send(&calls, get_request("/search?name=a&name=b")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(failure_of(&body).details[0].failed("isString"));
    }

    #[tokio::test]
    async fn validated_query_reads_into_a_typed_dto() {
        let calls = Calls::default();

        let (status, body) = send(&calls, get_request("/typed?name=John%20Doe&age=30")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, br#"Some("John Doe")/Some(30)"#.to_vec());
    }

    #[tokio::test]
    async fn extracting_without_the_layer_is_an_internal_error() {
        let calls = Calls::default();

        let (status, _) = send(&calls, get_request("/unvalidated")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn valid_body_replaces_the_original() {
        let calls = Calls::default();

        let (status, body) =
            send(&calls, post_json(json!({ "title": "Product", "price": 99 }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({ "title": "Product", "price": 99 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let calls = Calls::default();

        let (status, body) =
            send(&calls, post_json(json!({ "title": "Product", "price": -10 }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let failure = failure_of(&body);
        assert!(failure.details.iter().any(|v| v.property == "price"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_required_field_stops_the_request() {
        let calls = Calls::default();

        let (status, body) = send(&calls, post_json(json!({ "title": "Product" }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(failure_of(&body).details[0].property, "price");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn numeric_strings_in_the_body_are_coerced() {
        let calls = Calls::default();

        let (status, body) =
            send(&calls, post_json(json!({ "title": "Product", "price": "12" }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body)["price"], json!(12));
    }

    #[tokio::test]
    async fn form_body_is_validated_like_json() {
        let calls = Calls::default();
        let request = post_request(
            Some("application/x-www-form-urlencoded"),
            "title=Desk+lamp&price=25",
        );

        let (status, body) = send(&calls, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_of(&body), json!({ "title": "Desk lamp", "price": 25 }));
    }

    #[tokio::test]
    async fn body_without_content_type_is_read_as_json() {
        let calls = Calls::default();
        let request = post_request(None, r#"{"title":"Product","price":1}"#);

        let (status, _) = send(&calls, request).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_body_reports_every_required_field() {
        let calls = Calls::default();

        let (status, body) = send(&calls, post_request(None, Body::empty())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let properties: Vec<String> = failure_of(&body)
            .details
            .into_iter()
            .map(|v| v.property)
            .collect();
        assert_eq!(properties, vec!["title", "price"]);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let calls = Calls::default();

        let (status, body) = send(&calls, post_request(Some("application/json"), "{title")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json_of(&body),
            json!({ "status": "error", "message": "Malformed JSON body" })
        );
    }

    #[tokio::test]
    async fn non_object_json_is_a_bad_request() {
        let calls = Calls::default();

        let (status, body) = send(&calls, post_json(json!([1, 2, 3]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_of(&body)["message"], "Request body must be a JSON object");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let calls = Calls::default();
        let padding = "x".repeat(MAX_BODY_BYTES + 1);

        let (status, _) = send(
            &calls,
            post_json(json!({ "title": padding, "price": 1 })),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected() {
        let calls = Calls::default();

        let (status, _) = send(&calls, post_request(Some("text/plain"), "title=x")).await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn broken_body_stream_is_a_bad_request() {
        let err = axum::Error::new(std::io::Error::other("connection reset by peer"));

        let app_error = body_read_error(err);

        assert_eq!(app_error.status_code(), 400);
        assert_eq!(app_error.message(), "Request body could not be read");
    }

    #[test]
    fn body_format_follows_content_type() {
        let mut headers = HeaderMap::new();
        assert_eq!(BodyFormat::of(&headers), BodyFormat::Json);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert_eq!(BodyFormat::of(&headers), BodyFormat::Json);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/merge-patch+json"));
        assert_eq!(BodyFormat::of(&headers), BodyFormat::Json);

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        assert_eq!(BodyFormat::of(&headers), BodyFormat::Form);

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(BodyFormat::of(&headers), BodyFormat::Unsupported);
    }
}
