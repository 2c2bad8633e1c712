//! Hierarchical configuration for the server binary.
mod profile;
mod schema;

pub use profile::ApplicationProfile;
pub use schema::{Config, ServerConfig};
