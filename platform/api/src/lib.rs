//! Client-facing error surface of the grant service: the stable error code
//! taxonomy, localized validation text, and the classifier that turns any
//! request [`Failure`] into the uniform error body.

mod classify;
mod code;
mod context;
mod failure;
mod locale;
mod validation;

pub use classify::{ErrorClassifier, ErrorReply, response_status};
pub use code::{CodeError, ErrorBody, ErrorCode};
pub use context::{OPEN_API_MARKER, REQUEST_ID_HEADER, RequestContext, is_open_api_path};
pub use failure::{ApiResult, Failure, FailureSlot};
pub use locale::{Locale, Msg};
pub use validation::{
    FieldKind, FieldSpec, NON_FIELD_ERRORS, ObjectSchema, ValidationNode, one_line_error,
};
