use crate::dto::admin_dto::LoginResponse;
use crate::error::{Error, Result};
use crate::middleware::auth::Claims;
use crate::models::admin::AdminSessionBody;
use crate::models::audit_log::{AuthAction, ClientInfo};
use crate::services::audit_service::{to_body, AuditService};
use crate::store::{DocumentStore, WriteBatch, WriteOp, ADMIN_SESSIONS};
use crate::utils::crypto::verify_password;
use crate::utils::time::{chrono_duration, now};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn DocumentStore>,
    jwt_secret: String,
    password_hash: String,
    ttl: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        jwt_secret: String,
        password_hash: String,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            jwt_secret,
            password_hash,
            ttl,
        }
    }

    pub async fn login(&self, password: &str, client: &ClientInfo) -> Result<LoginResponse> {
        let ok = verify_password(password, &self.password_hash)
            .map_err(|e| Error::Config(format!("Admin password hash is invalid: {}", e)))?;
        if !ok {
            let batch = WriteBatch::new().push(AuditService::auth_entry(
                AuthAction::LoginFailure,
                None,
                client,
            )?);
            if let Err(e) = self.store.commit(batch).await {
                tracing::warn!(error = %e, "failed to record rejected login");
            }
            tracing::warn!("admin login rejected");
            return Err(Error::InvalidCredentials);
        }

        let session_id = Uuid::new_v4();
        let expires_at = now() + chrono_duration(self.ttl);
        let session = AdminSessionBody {
            user_agent: client.user_agent.clone(),
            expires_at,
        };
        let batch = WriteBatch::new()
            .push(WriteOp::Create {
                collection: ADMIN_SESSIONS.to_string(),
                id: session_id.to_string(),
                data: to_body(&session)?,
            })
            .push(AuditService::auth_entry(
                AuthAction::LoginSuccess,
                Some(session_id),
                client,
            )?);
        self.store.commit(batch).await?;

        let claims = Claims {
            sub: ADMIN_ROLE.to_string(),
            exp: expires_at.timestamp().max(0) as usize,
            sid: session_id,
            role: Some(ADMIN_ROLE.to_string()),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("Failed to sign token: {}", e)))?;

        tracing::info!(%session_id, "admin signed in");
        Ok(LoginResponse {
            token,
            session_id,
            expires_at,
        })
    }

    pub async fn logout(&self, session_id: Uuid, client: &ClientInfo) -> Result<()> {
        let batch = WriteBatch::new()
            .push(WriteOp::Delete {
                collection: ADMIN_SESSIONS.to_string(),
                id: session_id.to_string(),
            })
            .push(AuditService::auth_entry(
                AuthAction::Logout,
                Some(session_id),
                client,
            )?);
        self.store.commit(batch).await?;
        tracing::info!(%session_id, "admin signed out");
        Ok(())
    }

    /// Checks the token signature and expiry, then that its session still exists.
    pub async fn authorize(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|_| Error::Unauthorized("invalid_token".to_string()))?;
        let claims = data.claims;

        if !claims
            .role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case(ADMIN_ROLE))
        {
            return Err(Error::Unauthorized("forbidden".to_string()));
        }

        let Some(doc) = self
            .store
            .get(ADMIN_SESSIONS, &claims.sid.to_string())
            .await?
        else {
            return Err(Error::Unauthorized("session_revoked".to_string()));
        };
        let session: AdminSessionBody = serde_json::from_value(serde_json::Value::Object(doc.data))?;
        if session.expires_at <= now() {
            return Err(Error::Unauthorized("session_expired".to_string()));
        }
        Ok(claims)
    }
}
