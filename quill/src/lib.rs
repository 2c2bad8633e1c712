pub mod bootstrap;
pub mod configuration;
pub mod csrf;
pub mod flash;
pub mod forms;
pub mod password;
pub mod posts;
pub mod routes;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod templates;
pub mod users;
pub mod web;

pub use routes::run;
pub use state::{ApplicationState, BuildError, build_application_state};
