//! API response types
//!
//! Every endpoint answers with one of two envelopes:
//!
//! ```json
//! { "success": true, "data": ..., "meta": { ... } }
//! { "success": false, "error": { "code": "VALIDATION_ERROR", "message": "..." } }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard success response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: None,
        }
    }

    pub fn success_with_meta(data: T, meta: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            meta: Some(meta),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Standard error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }
}

/// Offset pagination metadata for list responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetMeta {
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
}

impl OffsetMeta {
    pub fn new(limit: i64, offset: i64, count: usize) -> Self {
        Self {
            limit,
            offset,
            count,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "limit": self.limit,
            "offset": self.offset,
            "count": self.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_omits_meta() {
        let value = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(value, json!({"success": true, "data": [1, 2]}));
    }

    #[test]
    fn test_success_with_meta() {
        let meta = OffsetMeta::new(50, 0, 2).to_value();
        let value = serde_json::to_value(ApiResponse::success_with_meta("x", meta)).unwrap();
        assert_eq!(value["meta"]["limit"], 50);
        assert_eq!(value["meta"]["count"], 2);
    }

    #[test]
    fn test_error_with_details() {
        let error = ErrorResponse::with_details(
            "VALIDATION_ERROR",
            "bad limit",
            json!({"field": "limit"}),
        );
        let value = serde_json::to_value(error).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["details"]["field"], "limit");
    }
}
