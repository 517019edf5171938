use std::fmt::{Display, Formatter};

use lmdb::Error as LmdbError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

/// Outcome of a catalog operation.
///
/// Every error variant doubles as the user-facing notice for a failed gateway call,
/// and [`AppResponse::Ok`] carries the notice for a successful one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppResponse {
    NetworkError(String),
    NotFound(String),
    ParseError(String),
    DatabaseError(String),
    SerializationError(String),
    ValidationError(String),
    BadRequest(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ParseError(msg) => write!(f, "Parse error: {}", msg),
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl std::error::Error for AppResponse {}

impl From<LmdbError> for AppResponse {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::NotFound => AppResponse::NotFound("Key not found in overlay store".to_string()),
            LmdbError::MapFull => {
                AppResponse::DatabaseError("Overlay store is full, increase map_size".to_string())
            }
            LmdbError::Corrupted => AppResponse::DatabaseError("Overlay store is corrupted".to_string()),
            _ => AppResponse::DatabaseError(format!("LMDB error: {}", err)),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for AppResponse {
    fn from(err: std::io::Error) -> Self {
        AppResponse::DatabaseError(format!("IO error: {}", err))
    }
}

impl From<reqwest::Error> for AppResponse {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppResponse::NetworkError(format!("request timed out: {}", err))
        } else if err.is_connect() {
            AppResponse::NetworkError(format!("connection error: {}", err))
        } else if err.is_decode() {
            AppResponse::ParseError(format!("unexpected response body: {}", err))
        } else if let Some(status) = err.status() {
            AppResponse::NetworkError(format!("HTTP {}: {}", status.as_u16(), err))
        } else {
            AppResponse::NetworkError(err.to_string())
        }
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AppResponse::Ok(_))
    }

    /// The bare message, without the variant prefix `Display` adds.
    pub fn message(&self) -> &str {
        match self {
            AppResponse::NetworkError(msg)
            | AppResponse::NotFound(msg)
            | AppResponse::ParseError(msg)
            | AppResponse::DatabaseError(msg)
            | AppResponse::SerializationError(msg)
            | AppResponse::ValidationError(msg)
            | AppResponse::BadRequest(msg)
            | AppResponse::Ok(msg) => msg,
        }
    }
}
