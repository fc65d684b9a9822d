pub mod admin;
pub mod audit_log;
pub mod candidate;
