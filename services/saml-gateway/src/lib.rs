pub mod app;
pub mod config;
pub mod groups;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod profile;
pub mod redirect;
pub mod saml;
pub mod tokens;

pub use app::{build_router, AppState};
