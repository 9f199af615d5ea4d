//! 错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ed_core::{EdError, ErrorKind};
use serde_json::json;
use tracing::{error, warn};

/// 接口错误
#[derive(Debug)]
pub enum ApiError {
    /// 领域错误，按类别映射状态码
    Domain(EdError),
    /// 缺少或无法解析操作人请求头
    Unauthorized(String),
    /// 角色无权执行该操作
    Forbidden(String),
}

impl From<EdError> for ApiError {
    fn from(err: EdError) -> Self {
        ApiError::Domain(err)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Blocked => StatusCode::FORBIDDEN,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::InsufficientStock => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Domain(err) => {
                let kind = err.kind();
                let status = status_for(kind);
                if status.is_server_error() {
                    error!(kind = kind.as_str(), "Request failed: {}", err);
                } else {
                    warn!(kind = kind.as_str(), "Request rejected: {}", err);
                }
                (status, kind.as_str(), err.to_string())
            }
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, "unauthorized", message),
            ApiError::Forbidden(message) => {
                warn!("Role check failed: {}", message);
                (StatusCode::FORBIDDEN, "forbidden", message)
            }
        };

        let body = Json(json!({
            "error": true,
            "kind": kind,
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed_core::{OrderStatus, Prerequisite};

    fn status_of(err: EdError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_error_kinds_map_to_status_codes() {
        assert_eq!(status_of(EdError::not_found("patient", "V1")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(EdError::MissingPrerequisite(Prerequisite::Motive)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(EdError::NotEditable { order_id: 1, status: OrderStatus::Fulfilled }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(EdError::Validation("quantity".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(EdError::Conflict("batch".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(EdError::InsufficientStock { medication_id: 1, available: 0, requested: 2 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(EdError::Database("down".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_header_errors() {
        assert_eq!(
            ApiError::Unauthorized("missing".into()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("nurse".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
    }
}
