use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{code::CodeError, validation::{FieldKind, ValidationNode}};

/// Every way a request can fail, tagged at the seam where it was detected.
///
/// Variant order is classification priority.
#[derive(Debug, Error)]
pub enum Failure {
    #[error("not found")]
    NotFound,
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("malformed request body: {0}")]
    Parse(String),
    #[error("validation failed: {detail}")]
    Validation {
        detail: ValidationNode,
        schema: Option<&'static FieldKind>,
    },
    #[error(transparent)]
    Domain(CodeError),
    #[error("unexpected failure: {0:#}")]
    Unexpected(Arc<anyhow::Error>),
}

impl Failure {
    pub fn unexpected(err: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected(Arc::new(err.into()))
    }

    pub fn validation(detail: ValidationNode, schema: &'static FieldKind) -> Self {
        Self::Validation {
            detail,
            schema: Some(schema),
        }
    }
}

impl From<anyhow::Error> for Failure {
    fn from(value: anyhow::Error) -> Self {
        Self::unexpected(value)
    }
}

impl From<CodeError> for Failure {
    fn from(value: CodeError) -> Self {
        Self::Domain(value)
    }
}

/// Carries a [`Failure`] from a handler to the classifying middleware inside
/// the response extensions.
#[derive(Clone, Debug)]
pub struct FailureSlot(pub Arc<Failure>);

impl FailureSlot {
    pub fn take(response: &mut Response) -> Option<Arc<Failure>> {
        response
            .extensions_mut()
            .remove::<FailureSlot>()
            .map(|slot| slot.0)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response
            .extensions_mut()
            .insert(FailureSlot(Arc::new(self)));
        response
    }
}

pub type ApiResult<T> = Result<T, Failure>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_travels_in_response_extensions() {
        let mut response = Failure::Forbidden("app not allowed".into()).into_response();
        let failure = FailureSlot::take(&mut response).unwrap();
        assert!(matches!(*failure, Failure::Forbidden(_)));
        assert!(FailureSlot::take(&mut response).is_none());
    }

    #[test]
    fn internal_errors_keep_their_chain() {
        let err = anyhow::anyhow!("connection reset").context("granting view");
        let failure = Failure::from(err);
        assert_eq!(
            failure.to_string(),
            "unexpected failure: granting view: connection reset"
        );
    }
}
