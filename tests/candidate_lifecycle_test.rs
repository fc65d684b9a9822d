mod common;

use candidate_intake::{
    error::{Error, ErrorKind},
    models::{
        audit_log::{AuditAction, ClientInfo},
        candidate::{CandidateStatus, DocumentKey},
    },
    store::{DocumentStore, CANDIDATES, CANDIDATE_BACKUPS, CANDIDATE_LOGS},
};
use common::{maria_form, TestApp, JPEG};
use serde_json::{json, Value as JsonValue};

fn client() -> ClientInfo {
    ClientInfo::new(Some("lifecycle-tests".into()))
}

#[tokio::test]
async fn maria_silva_is_created_with_audit_backup_and_documents() {
    let app = TestApp::new();
    let service = &app.state.candidate_service;

    let candidate = service.create(maria_form(), &client()).await.unwrap();
    assert_eq!(candidate.name(), "Maria Silva");
    assert_eq!(candidate.status(), CandidateStatus::Backlog);
    assert_eq!(candidate.record.age, 29);

    let id = candidate.id.to_string();
    assert_eq!(app.store.count(CANDIDATES), 1);
    assert_eq!(app.store.count(CANDIDATE_BACKUPS), 1);
    assert_eq!(app.store.count(CANDIDATE_LOGS), 1);

    let backup = app
        .store
        .get(CANDIDATE_BACKUPS, &id)
        .await
        .unwrap()
        .expect("backup");
    let record = app.store.get(CANDIDATES, &id).await.unwrap().expect("record");
    assert_eq!(backup.data, record.data);

    let history = service.history(candidate.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].body.action, AuditAction::Create);
    assert_eq!(history[0].body.candidate_id, candidate.id);
    assert_eq!(history[0].body.user_agent.as_deref(), Some("lifecycle-tests"));

    let stored = app.blobs.paths_with_prefix(&format!("candidates/{id}/"));
    assert_eq!(stored.len(), 5);
    for key in DocumentKey::ALL {
        let path = format!("candidates/{id}/{key}.jpeg");
        assert!(stored.contains(&path), "missing {path}");
        let blob = app.blobs.object(&path).expect("stored blob");
        assert_eq!(blob.content_type, "image/jpeg");
        assert_eq!(&blob.bytes[..], JPEG);
        assert_eq!(
            candidate.record.documents.get(key),
            format!("memory://{path}")
        );
    }

    let mut feed = app.state.feed.watch();
    let state = feed
        .wait_for(|s| !s.candidates.is_empty())
        .await
        .unwrap()
        .clone();
    assert_eq!(state.candidates[0].id, candidate.id);
}

#[tokio::test]
async fn invalid_checksum_writes_nothing() {
    let app = TestApp::new();
    let mut form = maria_form();
    form.national_id = "111.444.777-36".into();

    let err = app
        .state
        .candidate_service
        .create(form, &client())
        .await
        .unwrap_err();
    match &err {
        Error::InvalidForm(fields) => assert_eq!(
            fields.get("nationalId").map(String::as_str),
            Some("National ID check digits do not match")
        ),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(app.store.count(CANDIDATES), 0);
    assert_eq!(app.store.count(CANDIDATE_LOGS), 0);
    assert!(app.blobs.paths_with_prefix("candidates/").is_empty());
}

#[tokio::test]
async fn failed_upload_leaves_no_record_and_no_blobs() {
    let app = TestApp::new();
    app.blobs.fail_put_on("/addressProof.jpeg");

    let err = app
        .state
        .candidate_service
        .create(maria_form(), &client())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upload);
    assert!(err.is_retryable());
    assert_eq!(app.store.count(CANDIDATES), 0);
    assert_eq!(app.store.count(CANDIDATE_BACKUPS), 0);
    assert_eq!(app.store.count(CANDIDATE_LOGS), 0);
    assert!(app.blobs.paths_with_prefix("candidates/").is_empty());
}

#[tokio::test]
async fn oversized_document_is_rejected_by_name() {
    let app = TestApp::new();
    let mut form = maria_form();
    let big = vec![0xFF; 5 * 1024 * 1024 + 1];
    if let Some(doc) = form.documents.iter_mut().find(|d| d.key == DocumentKey::IdBack) {
        let mut bytes = big;
        bytes[1] = 0xD8;
        doc.bytes = bytes.into();
    }

    let err = app
        .state
        .candidate_service
        .create(form, &client())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidDocument {
            key: DocumentKey::IdBack,
            ..
        }
    ));
    assert_eq!(err.user_message(), "ID back: File must be at most 5 MB");
    assert!(app.blobs.paths_with_prefix("candidates/").is_empty());
}

#[tokio::test]
async fn approve_then_delete_cascades() {
    let app = TestApp::new();
    let service = &app.state.candidate_service;
    let candidate = service.create(maria_form(), &client()).await.unwrap();
    let id = candidate.id;

    let approved = service
        .update_status(id, CandidateStatus::Approved, Some(candidate.version), &client())
        .await
        .unwrap();
    assert_eq!(approved.status(), CandidateStatus::Approved);
    assert_eq!(approved.version, candidate.version + 1);

    let backup = app
        .store
        .get(CANDIDATE_BACKUPS, &id.to_string())
        .await
        .unwrap()
        .expect("backup");
    assert_eq!(backup.data["status"], json!("Approved"));

    let history = service.history(id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].body.action, AuditAction::StatusUpdate);
    assert_eq!(history[0].body.old_status, Some(CandidateStatus::Backlog));
    assert_eq!(history[0].body.new_status, Some(CandidateStatus::Approved));

    service.delete(id, &client()).await.unwrap();
    assert_eq!(app.store.count(CANDIDATES), 0);
    assert_eq!(app.store.count(CANDIDATE_BACKUPS), 0);
    assert!(app
        .blobs
        .paths_with_prefix(&format!("candidates/{id}/"))
        .is_empty());

    let history = service.history(id).await.unwrap();
    let deletes = history
        .iter()
        .filter(|e| e.body.action == AuditAction::Delete)
        .count();
    assert_eq!(deletes, 1);
    assert_eq!(history.len(), 3);

    let mut feed = app.state.feed.watch();
    feed.wait_for(|s| !s.loading && s.candidates.iter().all(|c| c.id != id))
        .await
        .unwrap();

    let err = service.get(id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn stale_version_conflicts_without_audit() {
    let app = TestApp::new();
    let service = &app.state.candidate_service;
    let candidate = service.create(maria_form(), &client()).await.unwrap();

    service
        .update_status(candidate.id, CandidateStatus::Approved, Some(candidate.version), &client())
        .await
        .unwrap();
    let err = service
        .update_status(candidate.id, CandidateStatus::Rejected, Some(candidate.version), &client())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let current = service.get(candidate.id).await.unwrap();
    assert_eq!(current.status(), CandidateStatus::Approved);
    assert_eq!(service.history(candidate.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn document_cleanup_failure_does_not_fail_delete() {
    let app = TestApp::new();
    let service = &app.state.candidate_service;
    let candidate = service.create(maria_form(), &client()).await.unwrap();
    app.blobs.fail_delete_on("/taxId.jpeg");

    service.delete(candidate.id, &client()).await.unwrap();
    assert_eq!(app.store.count(CANDIDATES), 0);
    let left = app
        .blobs
        .paths_with_prefix(&format!("candidates/{}/", candidate.id));
    assert_eq!(left, vec![format!("candidates/{}/taxId.jpeg", candidate.id)]);
}

#[tokio::test]
async fn feed_orders_newest_first() {
    let app = TestApp::new();
    let service = &app.state.candidate_service;
    let first = service.create(maria_form(), &client()).await.unwrap();
    let mut second_form = maria_form();
    second_form.name = "João Souza".into();
    let second = service.create(second_form, &client()).await.unwrap();

    let mut feed = app.state.feed.watch();
    let state = feed
        .wait_for(|s| s.candidates.len() == 2)
        .await
        .unwrap()
        .clone();
    let ids: Vec<_> = state.candidates.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let listed = service.list().await.unwrap();
    assert_eq!(listed, state.candidates);
    let _: JsonValue = serde_json::to_value(&listed[0]).unwrap();
}

#[tokio::test]
async fn every_transition_is_logged_and_reaches_the_feed() {
    let app = TestApp::new();
    let service = &app.state.candidate_service;
    let mut current = service.create(maria_form(), &client()).await.unwrap();
    let mut feed = app.state.feed.watch();

    let steps = [
        CandidateStatus::Approved,
        CandidateStatus::Rejected,
        CandidateStatus::Rejected,
        CandidateStatus::Backlog,
    ];
    let mut expected = Vec::new();
    for next in steps {
        let previous = current.status();
        current = service
            .update_status(current.id, next, Some(current.version), &client())
            .await
            .unwrap();
        assert_eq!(current.status(), next);
        expected.push((previous, next));

        let (version, status) = (current.version, current.status());
        let state = feed
            .wait_for(|s| s.candidates.first().map(|c| c.version) == Some(version))
            .await
            .unwrap()
            .clone();
        assert_eq!(state.candidates.len(), 1);
        assert_eq!(state.candidates[0].status(), status);
        assert!(state.error.is_none());
    }
    assert_eq!(current.version, 5);

    let history = service.history(current.id).await.unwrap();
    assert_eq!(history.len(), steps.len() + 1);
    let logged: Vec<_> = history
        .iter()
        .rev()
        .filter(|e| e.body.action == AuditAction::StatusUpdate)
        .map(|e| (e.body.old_status.unwrap(), e.body.new_status.unwrap()))
        .collect();
    assert_eq!(logged, expected);

    let backup = app
        .store
        .get(CANDIDATE_BACKUPS, &current.id.to_string())
        .await
        .unwrap()
        .expect("backup");
    assert_eq!(backup.data["status"], json!("Backlog"));
}
