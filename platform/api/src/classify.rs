use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use platform_obs::{DebugTrace, ErrorReport, EventSink, OpsEvent};
use tracing::error;

use crate::{
    code::{CodeError, ErrorBody, ErrorCode},
    context::RequestContext,
    failure::Failure,
    validation::one_line_error,
};

/// Final status for `code`: open API callers get 200 for everything outside
/// the status-preserving set.
pub fn response_status(code: ErrorCode, open_api: bool) -> StatusCode {
    if open_api && !code.preserves_status() {
        StatusCode::OK
    } else {
        code.status()
    }
}

/// Uniform error response.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorReply {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl IntoResponse for ErrorReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Maps a [`Failure`] to the client-facing taxonomy and fires the
/// diagnostic hooks.
#[derive(Clone, Debug)]
pub struct ErrorClassifier {
    sink: EventSink,
}

impl ErrorClassifier {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    /// Returns `None` for not-found, which is passed through untouched.
    /// `body` is the raw request body, only used for unexpected failures.
    pub fn classify(
        &self,
        ctx: &RequestContext,
        failure: &Failure,
        body: &str,
    ) -> Option<ErrorReply> {
        let locale = ctx.locale;
        let error = match failure {
            Failure::NotFound => return None,
            Failure::Unauthenticated(detail) => {
                CodeError::new(ErrorCode::Unauthorized, locale).format(detail, false)
            }
            Failure::Forbidden(detail) => {
                CodeError::new(ErrorCode::Forbidden, locale).format(detail, false)
            }
            Failure::MethodNotAllowed(method) => CodeError::new(ErrorCode::MethodNotAllowed, locale)
                .format(locale.method_not_allowed(method), true),
            Failure::Parse(detail) => {
                CodeError::new(ErrorCode::JsonFormatError, locale).format(detail, false)
            }
            Failure::Validation { detail, schema } => {
                let error = CodeError::new(ErrorCode::ValidateError, locale);
                if ctx.open_api {
                    error.format(detail.to_json(), true)
                } else {
                    error.format(one_line_error(detail, *schema), false)
                }
            }
            Failure::Domain(domain) => {
                self.trace(ctx, domain.code, false);
                domain.clone()
            }
            Failure::Unexpected(err) => {
                error!(
                    error = %format!("{err:#}"),
                    method = %ctx.method,
                    path = %ctx.path,
                    request_id = ctx.request_id.as_deref().unwrap_or("-"),
                    body,
                    "unhandled failure"
                );
                self.trace(ctx, ErrorCode::SystemError, true);
                self.sink.emit(OpsEvent::ErrorReport(ErrorReport {
                    request_id: ctx.request_id.clone(),
                    method: ctx.method.clone(),
                    path: ctx.path.clone(),
                    error: format!("{err:#}"),
                }));
                CodeError::new(ErrorCode::SystemError, locale)
            }
        };

        Some(ErrorReply {
            status: response_status(error.code, ctx.open_api),
            body: error.body(),
        })
    }

    fn trace(&self, ctx: &RequestContext, code: ErrorCode, unexpected: bool) {
        self.sink.emit(OpsEvent::DebugTrace(DebugTrace {
            request_id: ctx.request_id.clone(),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            code: code.as_str(),
            unexpected,
            rollback: true,
        }));
    }
}
