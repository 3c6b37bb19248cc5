use std::sync::Arc;

use axum::extract::FromRef;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::groups::GroupStore;
use crate::handlers::{
    contact, health, metrics_endpoint, not_found, saml_callback, saml_metadata,
};
use crate::metrics::GatewayMetrics;
use crate::middleware::saml_authenticate;
use crate::saml::SamlAuthenticator;
use crate::tokens::TokenSigner;

#[derive(Clone)]
pub struct AppState {
    pub groups: Arc<dyn GroupStore>,
    pub saml: Arc<SamlAuthenticator>,
    pub token_signer: Arc<TokenSigner>,
    pub config: Arc<GatewayConfig>,
    pub metrics: Arc<GatewayMetrics>,
}

impl FromRef<AppState> for Arc<SamlAuthenticator> {
    fn from_ref(state: &AppState) -> Self {
        state.saml.clone()
    }
}

/// Routes added before the SAML layer (the callback and the fallback, which
/// covers `/auth/saml/`) require an assertion; the ones added after it are public.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/saml/callback", post(saml_callback))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            saml_authenticate,
        ))
        .route("/auth/contact", get(contact))
        .route("/auth/saml/metadata", get(saml_metadata))
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
