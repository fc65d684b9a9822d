use crate::error::Result;
use crate::models::audit_log::{
    AuditAction, AuditLogBody, AuditLogEntry, AuthAction, AuthLogBody, ClientInfo,
};
use crate::models::candidate::CandidateStatus;
use crate::store::{DocumentStore, Order, StoreError, WriteOp, AUTH_LOGS, CANDIDATE_LOGS};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn DocumentStore>,
}

pub(crate) fn to_body<T: Serialize>(value: &T) -> std::result::Result<Map<String, JsonValue>, StoreError> {
    match serde_json::to_value(value)? {
        JsonValue::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

impl AuditService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Append op for one candidate mutation; committed together with the mutation itself.
    pub fn candidate_entry(
        action: AuditAction,
        candidate_id: Uuid,
        candidate_name: &str,
        old_status: Option<CandidateStatus>,
        new_status: Option<CandidateStatus>,
        client: &ClientInfo,
    ) -> std::result::Result<WriteOp, StoreError> {
        let body = AuditLogBody {
            action,
            candidate_id,
            candidate_name: candidate_name.to_string(),
            old_status,
            new_status,
            user_agent: client.user_agent.clone(),
        };
        Ok(WriteOp::Append {
            collection: CANDIDATE_LOGS.to_string(),
            data: to_body(&body)?,
        })
    }

    pub fn auth_entry(
        action: AuthAction,
        session_id: Option<Uuid>,
        client: &ClientInfo,
    ) -> std::result::Result<WriteOp, StoreError> {
        let body = AuthLogBody {
            action,
            session_id,
            user_agent: client.user_agent.clone(),
        };
        Ok(WriteOp::Append {
            collection: AUTH_LOGS.to_string(),
            data: to_body(&body)?,
        })
    }

    /// Audit trail of one candidate, newest first.
    pub async fn history(&self, candidate_id: Uuid) -> Result<Vec<AuditLogEntry>> {
        let docs = self
            .store
            .find_by(
                CANDIDATE_LOGS,
                "candidateId",
                &JsonValue::String(candidate_id.to_string()),
                Order::CreatedDesc,
            )
            .await?;
        let entries = docs
            .into_iter()
            .map(AuditLogEntry::from_document)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}
