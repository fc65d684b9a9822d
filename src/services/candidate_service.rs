use crate::dto::candidate_dto::CandidateForm;
use crate::error::{Error, Result};
use crate::models::audit_log::{AuditAction, AuditLogEntry, ClientInfo};
use crate::models::candidate::{Candidate, CandidateRecord, CandidateStatus, DocumentKey};
use crate::services::audit_service::AuditService;
use crate::services::upload_service::UploadService;
use crate::store::{
    DocumentStore, Order, StoreError, StoredDocument, WriteBatch, WriteOp, CANDIDATES,
    CANDIDATE_BACKUPS,
};
use crate::utils::time::now;
use crate::utils::validation::{validate_file, validate_form, FileLimits, FileRejection};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct CandidateService {
    store: Arc<dyn DocumentStore>,
    uploader: UploadService,
    audit: AuditService,
    limits: FileLimits,
}

fn status_body(status: CandidateStatus) -> Map<String, JsonValue> {
    let mut body = Map::new();
    body.insert("status".to_string(), JsonValue::String(status.as_str().to_string()));
    body
}

fn not_found(id: Uuid) -> Error {
    Error::NotFound(format!("Candidate {} not found", id))
}

impl CandidateService {
    pub fn new(store: Arc<dyn DocumentStore>, uploader: UploadService, limits: FileLimits) -> Self {
        let audit = AuditService::new(store.clone());
        Self {
            store,
            uploader,
            audit,
            limits,
        }
    }

    /// Validates, uploads the five documents, then writes the record, its audit
    /// entry and its backup in one batch.
    pub async fn create(&self, form: CandidateForm, client: &ClientInfo) -> Result<Candidate> {
        let errors = validate_form(&form);
        if !errors.is_empty() {
            return Err(Error::InvalidForm(errors));
        }

        let mut files = Vec::with_capacity(DocumentKey::ALL.len());
        for key in DocumentKey::ALL {
            let file = form.document(key).ok_or(Error::InvalidDocument {
                key,
                reason: FileRejection::Missing,
            })?;
            validate_file(file, &self.limits)
                .map_err(|reason| Error::InvalidDocument { key, reason })?;
            files.push(file.clone());
        }

        let age: u8 = form
            .age
            .trim()
            .parse()
            .map_err(|_| Error::BadRequest("Age must be a whole number".to_string()))?;

        let id = Uuid::new_v4();
        let documents = self.uploader.upload_all(id, &files).await?;

        let record = CandidateRecord {
            name: form.name.trim().to_string(),
            age,
            phone: form.phone.trim().to_string(),
            national_id: form.national_id.trim().to_string(),
            documents,
            status: CandidateStatus::Backlog,
        };
        let body = record.to_body()?;
        let batch = WriteBatch::new()
            .push(WriteOp::Create {
                collection: CANDIDATES.to_string(),
                id: id.to_string(),
                data: body.clone(),
            })
            .push(AuditService::candidate_entry(
                AuditAction::Create,
                id,
                &record.name,
                None,
                Some(CandidateStatus::Backlog),
                client,
            )?)
            .push(WriteOp::Set {
                collection: CANDIDATE_BACKUPS.to_string(),
                id: id.to_string(),
                data: body,
            });

        if let Err(e) = self.store.commit(batch).await {
            tracing::error!(candidate_id = %id, error = %e, "failed to persist candidate, removing uploads");
            self.uploader.remove_all(&record.documents).await;
            return Err(e.into());
        }

        tracing::info!(candidate_id = %id, "candidate created");
        let created_at = now();
        Ok(self
            .read_back(Candidate {
                id,
                record,
                version: 1,
                created_at,
                updated_at: created_at,
            })
            .await)
    }

    pub async fn get(&self, id: Uuid) -> Result<Candidate> {
        let doc = self.fetch(id).await?;
        Ok(Candidate::from_document(doc)?)
    }

    /// All candidates, newest first.
    pub async fn list(&self) -> Result<Vec<Candidate>> {
        let docs = self.store.list(CANDIDATES, Order::CreatedDesc).await?;
        let candidates = docs
            .into_iter()
            .map(Candidate::from_document)
            .collect::<std::result::Result<Vec<_>, StoreError>>()?;
        Ok(candidates)
    }

    pub async fn update_status(
        &self,
        id: Uuid,
        new_status: CandidateStatus,
        expected_version: Option<i64>,
        client: &ClientInfo,
    ) -> Result<Candidate> {
        let current = Candidate::from_document(self.fetch(id).await?)?;
        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(StoreError::Conflict {
                    collection: CANDIDATES.to_string(),
                    id: id.to_string(),
                    expected,
                    actual: current.version,
                }
                .into());
            }
        }

        let old_status = current.status();
        let batch = WriteBatch::new()
            .push(WriteOp::Update {
                collection: CANDIDATES.to_string(),
                id: id.to_string(),
                data: status_body(new_status),
                expected_version: Some(current.version),
            })
            .push(AuditService::candidate_entry(
                AuditAction::StatusUpdate,
                id,
                current.name(),
                Some(old_status),
                Some(new_status),
                client,
            )?)
            .push(WriteOp::Merge {
                collection: CANDIDATE_BACKUPS.to_string(),
                id: id.to_string(),
                data: status_body(new_status),
            });
        self.store.commit(batch).await?;

        tracing::info!(candidate_id = %id, from = %old_status, to = %new_status, "candidate status updated");
        let mut updated = current;
        updated.record.status = new_status;
        updated.version += 1;
        updated.updated_at = now();
        Ok(self.read_back(updated).await)
    }

    /// Removes the record and its backup, then the stored documents. Document
    /// deletion is best-effort and never fails the call.
    pub async fn delete(&self, id: Uuid, client: &ClientInfo) -> Result<()> {
        let current = Candidate::from_document(self.fetch(id).await?)?;
        let batch = WriteBatch::new()
            .push(WriteOp::Delete {
                collection: CANDIDATES.to_string(),
                id: id.to_string(),
            })
            .push(WriteOp::Delete {
                collection: CANDIDATE_BACKUPS.to_string(),
                id: id.to_string(),
            })
            .push(AuditService::candidate_entry(
                AuditAction::Delete,
                id,
                current.name(),
                Some(current.status()),
                None,
                client,
            )?);
        self.store.commit(batch).await?;

        let failed = self.uploader.remove_all(&current.record.documents).await;
        if failed > 0 {
            tracing::warn!(candidate_id = %id, failed, "some candidate documents were not deleted");
        }
        tracing::info!(candidate_id = %id, "candidate deleted");
        Ok(())
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<AuditLogEntry>> {
        self.audit.history(id).await
    }

    /// The stored copy after a committed write. The write already happened, so
    /// a failed read falls back to the locally built candidate.
    async fn read_back(&self, written: Candidate) -> Candidate {
        match self.get(written.id).await {
            Ok(candidate) => candidate,
            Err(e) => {
                tracing::warn!(candidate_id = %written.id, error = %e, "committed candidate could not be read back");
                written
            }
        }
    }

    async fn fetch(&self, id: Uuid) -> Result<StoredDocument> {
        self.store
            .get(CANDIDATES, &id.to_string())
            .await?
            .ok_or_else(|| not_found(id))
    }
}
