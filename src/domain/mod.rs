// Domain layer - Pure types and rules
pub mod image;
pub mod record;
pub mod series;
pub mod session;
pub mod substance;
pub mod working_set;
