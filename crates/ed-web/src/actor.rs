//! 操作人上下文
//!
//! 身份由外部身份服务签发，网关把结果写入 `x-actor-id`、`x-actor-name`、`x-actor-role` 请求头。

use crate::error::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ed_core::{Actor, Role};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_NAME_HEADER: &str = "x-actor-name";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// 临床医生（住院医师与专科医生）
pub const CLINICIANS: &[Role] = &[Role::Resident, Role::Specialist];

/// 当前请求的操作人
#[derive(Debug, Clone)]
pub struct ActorContext(pub Actor);

impl ActorContext {
    pub fn actor(&self) -> &Actor {
        &self.0
    }

    /// 校验角色；管理员不受限制
    pub fn require(&self, roles: &[Role]) -> Result<&Actor, ApiError> {
        let actor = &self.0;
        if actor.role == Role::Admin || roles.contains(&actor.role) {
            Ok(actor)
        } else {
            Err(ApiError::Forbidden(format!(
                "role {} may not perform this operation",
                actor.role
            )))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_ID_HEADER)?;
        let role: Role = header(parts, ACTOR_ROLE_HEADER)?
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| ApiError::Unauthorized("unknown actor role".to_string()))?;
        // 姓名缺省时用 id 代替
        let name = header(parts, ACTOR_NAME_HEADER).unwrap_or(id);

        Ok(ActorContext(Actor::new(id, name, role)))
    }
}
