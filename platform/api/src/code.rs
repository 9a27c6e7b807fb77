use std::fmt;

use axum::http::StatusCode;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::locale::Locale;

/// Stable client-facing error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    JsonFormatError,
    ValidateError,
    InvalidResourceKind,
    SystemError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            ErrorCode::JsonFormatError => "JSON_FORMAT_ERROR",
            ErrorCode::ValidateError => "VALIDATE_ERROR",
            ErrorCode::InvalidResourceKind => "INVALID_RESOURCE_KIND",
            ErrorCode::SystemError => "SYSTEM_ERROR",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::JsonFormatError
            | ErrorCode::ValidateError
            | ErrorCode::InvalidResourceKind => StatusCode::BAD_REQUEST,
            ErrorCode::SystemError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Codes whose native status survives on the open API. Every other code
    /// is reported there with 200 and the error body.
    pub fn preserves_status(self) -> bool {
        matches!(
            self,
            ErrorCode::Unauthorized
                | ErrorCode::Forbidden
                | ErrorCode::NotFound
                | ErrorCode::SystemError
        )
    }

    pub fn title(self, locale: Locale) -> &'static str {
        match (locale, self) {
            (Locale::En, ErrorCode::Unauthorized) => "Unauthorized",
            (Locale::En, ErrorCode::Forbidden) => "Forbidden",
            (Locale::En, ErrorCode::NotFound) => "Not found",
            (Locale::En, ErrorCode::MethodNotAllowed) => "Method not allowed",
            (Locale::En, ErrorCode::JsonFormatError) => "JSON format error",
            (Locale::En, ErrorCode::ValidateError) => "Parameter validation failed",
            (Locale::En, ErrorCode::InvalidResourceKind) => "Invalid resource",
            (Locale::En, ErrorCode::SystemError) => "System error",
            (Locale::Zh, ErrorCode::Unauthorized) => "用户未登录或登录态失效",
            (Locale::Zh, ErrorCode::Forbidden) => "没有访问权限",
            (Locale::Zh, ErrorCode::NotFound) => "资源不存在",
            (Locale::Zh, ErrorCode::MethodNotAllowed) => "请求方法不允许",
            (Locale::Zh, ErrorCode::JsonFormatError) => "JSON格式错误",
            (Locale::Zh, ErrorCode::ValidateError) => "参数校验失败",
            (Locale::Zh, ErrorCode::InvalidResourceKind) => "资源不合法",
            (Locale::Zh, ErrorCode::SystemError) => "系统异常",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A failure that already carries its client-facing code and message.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{code}: {message}")]
pub struct CodeError {
    pub code: ErrorCode,
    pub message: String,
    pub data: Option<Value>,
}

impl CodeError {
    pub fn new(code: ErrorCode, locale: Locale) -> Self {
        Self {
            code,
            message: code.title(locale).to_string(),
            data: None,
        }
    }

    /// Appends `detail` to the title, or replaces the message with it.
    #[must_use]
    pub fn format(mut self, detail: impl fmt::Display, replace: bool) -> Self {
        self.message = if replace {
            detail.to_string()
        } else {
            format!("{}: {detail}", self.message)
        };
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            result: false,
            code: self.code,
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }
}

/// Uniform error payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorBody {
    pub result: bool,
    pub code: ErrorCode,
    pub message: String,
    pub data: Option<Value>,
}
