use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::groups::GroupOwner;
use crate::profile::SamlProfile;
use crate::redirect::{found, with_query_param};
use crate::saml::{SamlAuthenticator, FAILURE_REDIRECT};
use crate::tokens::TokenPayload;
use crate::AppState;

/// Generic 500 body; details only go to the log.
#[derive(Debug)]
pub struct ServerError;

#[derive(Debug, Serialize)]
struct ServerErrorBody {
    success: bool,
    error: &'static str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ServerErrorBody {
                success: false,
                error: "ServerError",
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub contact: GroupOwner,
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "Unable to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn contact(State(state): State<AppState>) -> Result<Json<ContactResponse>, ServerError> {
    match state.groups.root_group().await {
        Ok(group) => {
            state.metrics.contact_lookup("success");
            debug!(group_id = %group.id, group = %group.name, "Resolved root group contact");
            Ok(Json(ContactResponse {
                success: true,
                contact: group.owner,
            }))
        }
        Err(err) => {
            state.metrics.contact_lookup("error");
            error!(error = ?err, "Unexpected error");
            Err(ServerError)
        }
    }
}

pub async fn saml_metadata(State(saml): State<Arc<SamlAuthenticator>>) -> Response {
    match saml.metadata_xml() {
        Ok(xml) => ([(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(err) => {
            error!(error = %err, "Failed to render SP metadata");
            ServerError.into_response()
        }
    }
}

/// Assertion consumer: runs after the SAML middleware accepted the response.
pub async fn saml_callback(
    State(state): State<AppState>,
    Extension(profile): Extension<SamlProfile>,
) -> Response {
    let Some(email) = profile.email() else {
        state.metrics.saml_callback("missing_email");
        warn!(profile = ?profile.as_map(), "Missing email in profile");
        return found(FAILURE_REDIRECT);
    };

    let issued = match state.token_signer.issue(TokenPayload::for_email(email)) {
        Ok(issued) => issued,
        Err(err) => {
            state.metrics.saml_callback("error");
            error!(error = %err, "Failed to issue application token");
            return ServerError.into_response();
        }
    };

    state.metrics.saml_callback("token_issued");
    info!(
        name = %issued.payload.name,
        expires_at_ms = issued.expires_at_ms,
        "Issued application token"
    );
    found(&with_query_param(&state.config.app_url, "jwt", &issued.token))
}

pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
