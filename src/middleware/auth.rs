use crate::error::Error;
use crate::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub sid: Uuid,
    pub role: Option<String>,
}

pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        return Error::Unauthorized("missing_authorization".into()).into_response();
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return Error::Unauthorized("bad_authorization".into()).into_response();
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return Error::Unauthorized("unsupported_scheme".into()).into_response();
    };

    match state.session_service.authorize(token).await {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "admin request rejected");
            e.into_response()
        }
    }
}
