use crate::pagination::{Page, PageMeta};
use crate::shaper::RecipeRecord;
use feinschmecker_core::FeinschmeckerError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::error;

const INTERNAL_MESSAGE: &str = "An error occurred while processing your request";

/// Successful search payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryResponse {
    pub data: Vec<RecipeRecord>,
    pub meta: PageMeta,
}

impl From<Page<RecipeRecord>> for QueryResponse {
    fn from(page: Page<RecipeRecord>) -> Self {
        Self {
            data: page.items,
            meta: page.meta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    /// HTTP status a transport layer should use for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::ServiceUnavailable => 503,
            ErrorCode::InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn code(&self) -> ErrorCode {
        self.error.code
    }

    /// Maps an error to its public shape. Only validation errors expose details; anything
    /// internal is logged here and replaced by a generic message.
    pub fn from_error(err: &FeinschmeckerError) -> Self {
        let body = match err {
            FeinschmeckerError::Validation(v) => ErrorBody {
                code: ErrorCode::ValidationError,
                message: "Invalid request parameters".to_string(),
                details: serde_json::to_value(&v.errors).ok(),
            },
            FeinschmeckerError::NotReady(_) => ErrorBody {
                code: ErrorCode::ServiceUnavailable,
                message: "Service not ready".to_string(),
                details: None,
            },
            other => {
                error!(kind = other.kind(), "Search failed: {}", other);
                ErrorBody {
                    code: ErrorCode::InternalError,
                    message: INTERNAL_MESSAGE.to_string(),
                    details: None,
                }
            }
        };
        Self { error: body }
    }
}

impl From<FeinschmeckerError> for ErrorResponse {
    fn from(err: FeinschmeckerError) -> Self {
        Self::from_error(&err)
    }
}

/// Either envelope, serialized without a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum SearchReply {
    Ok(QueryResponse),
    Err(ErrorResponse),
}

impl SearchReply {
    pub fn is_ok(&self) -> bool {
        matches!(self, SearchReply::Ok(_))
    }
}

impl From<feinschmecker_core::Result<QueryResponse>> for SearchReply {
    fn from(result: feinschmecker_core::Result<QueryResponse>) -> Self {
        match result {
            Ok(response) => SearchReply::Ok(response),
            Err(err) => SearchReply::Err(ErrorResponse::from_error(&err)),
        }
    }
}
