pub mod audit_service;
pub mod candidate_service;
pub mod feed_service;
pub mod notification_service;
pub mod session_service;
pub mod sync_service;
pub mod upload_service;
