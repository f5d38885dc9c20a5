// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod csv_export;
pub mod local_auth;
pub mod sheet_client;
