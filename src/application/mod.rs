// Application layer - Use cases and the traits they depend on
pub mod aggregation;
pub mod auth_provider;
pub mod ingestion;
pub mod normalizer;
pub mod record_source;
pub mod report;
pub mod retry;
pub mod session_controller;
