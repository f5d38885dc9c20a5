// Presentation layer - HTTP surface for the browser view
pub mod app_state;
pub mod handlers;
pub mod router;
