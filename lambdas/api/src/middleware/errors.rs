//! Error translation.
//!
//! Every handler failure is an [`ApiError`]. Rendering it picks the status
//! and body from the error variant; the [`translate_errors`] layer then
//! reports unexpected failures together with the request they came from.

use std::{any::Any, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Request,
    },
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        Method, StatusCode, Uri,
    },
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use domain::{AppError, Error};
use serde::Serialize;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Failure returned from a request handler.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(Error::App(err))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(Error::Unexpected(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(rejection.status().as_u16(), rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::new(rejection.status().as_u16(), rejection.body_text()).into()
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

fn reply(status: StatusCode, message: &str, details: Option<&str>) -> Response {
    let body = ErrorBody {
        status: "error",
        message,
        details,
    };
    (status, Json(body)).into_response()
}

/// Whether the error is answered with an opaque 500.
pub fn is_unexpected(error: &Error) -> bool {
    match error {
        Error::App(app) => StatusCode::from_u16(app.status_code()).is_err(),
        Error::Schema { .. } | Error::InvalidId { .. } => false,
        Error::Unexpected(_) => true,
    }
}

/// Maps an error to its HTTP response. Unexpected errors never expose their message.
pub fn error_response(error: &Error) -> Response {
    match error {
        Error::App(app) => match StatusCode::from_u16(app.status_code()) {
            Ok(status) => reply(status, app.message(), None),
            Err(_) => reply(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE, None),
        },
        Error::Schema { details } => {
            reply(StatusCode::BAD_REQUEST, "Validation error", Some(details))
        }
        Error::InvalidId { .. } => reply(StatusCode::BAD_REQUEST, "Invalid ID format", None),
        Error::Unexpected(_) => {
            reply(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE, None)
        }
    }
}

/// Marks a response as produced from an error.
#[derive(Clone, Debug)]
pub struct FailedRequest(pub Arc<Error>);

/// Marks an error response whose body is already final and must not be
/// rewritten, such as a validation report.
#[derive(Clone, Copy, Debug)]
pub struct FinalErrorBody;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = error_response(&self.0);
        response
            .extensions_mut()
            .insert(FailedRequest(Arc::new(self.0)));
        response
    }
}

/// Outermost application layer: logs unexpected failures with the method
/// and URL of the request that caused them, and gives error responses built
/// outside the handlers (extractor rejections, 405s) the uniform body.
pub async fn translate_errors(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;
    if let Some(FailedRequest(error)) = response.extensions_mut().remove::<FailedRequest>() {
        if is_unexpected(&error) {
            log_unexpected(&error, &method, &uri);
        }
        return response;
    }
    if response.extensions_mut().remove::<FinalErrorBody>().is_some() {
        return response;
    }

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return uniform_error(response);
    }
    response
}

/// Replaces the body of an unmarked error response, keeping its status and
/// headers such as `Allow`.
fn uniform_error(response: Response) -> Response {
    let (parts, _) = response.into_parts();
    let message = parts.status.canonical_reason().unwrap_or("Error");
    let mut rebuilt = error_response(&AppError::new(parts.status.as_u16(), message).into());

    for (name, value) in &parts.headers {
        if name != CONTENT_TYPE && name != CONTENT_LENGTH {
            rebuilt.headers_mut().append(name.clone(), value.clone());
        }
    }
    rebuilt
}

fn log_unexpected(error: &Error, method: &Method, uri: &Uri) {
    let message = format!("{error:#}");
    let backtrace = match error {
        Error::Unexpected(err) => err.backtrace().to_string(),
        _ => String::new(),
    };

    tracing::error!(
        error = %message,
        backtrace = %backtrace,
        url = %uri,
        method = %method,
        "Unexpected error"
    );
}

/// Turns a caught handler panic into an unexpected error.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    ApiError::from(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

pub async fn route_not_found() -> ApiError {
    AppError::not_found("Route not found").into()
}
