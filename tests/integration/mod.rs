//! Integration tests for the HTTP API

pub mod audit_tests;
pub mod file_tests;
pub mod guard_tests;
pub mod guest_token_tests;
pub mod health_tests;
pub mod membership_tests;
pub mod notification_tests;
pub mod subscription_tests;
pub mod user_tests;
