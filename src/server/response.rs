// src/server/response.rs

//! JSON response envelope

use crate::error::{Error, ErrorKind};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `{success, error, data}` envelope returned by every API route except file downloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub error: String,
    pub data: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: String::new(),
            data: BTreeMap::new(),
            status: StatusCode::OK,
        }
    }

    pub fn with(mut self, key: &str, values: Vec<String>) -> Self {
        self.data.insert(key.to_string(), values);
        self
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            data: BTreeMap::new(),
            status,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        Self::failure(status_for(err.kind()), err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self::ok()
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AddressResolution => StatusCode::BAD_REQUEST,
        ErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::DuplicatePackage | ErrorKind::AmbiguousMatch => StatusCode::CONFLICT,
        ErrorKind::ExternalTool => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
