use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::redirect::found;
use crate::saml::FAILURE_REDIRECT;
use crate::AppState;

const MAX_SAML_FORM_BYTES: usize = 2 * 1024 * 1024;

/// SAML authentication gate for protected routes.
///
/// A POST carrying `SAMLResponse` is validated; on success the profile is put
/// in the request extensions for the handler, otherwise the browser goes back
/// to the retry path. Every other request is sent to the IdP. Nothing is kept
/// between requests.
pub async fn saml_authenticate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::POST {
        let relay_state = query_field(request.uri(), "RelayState");
        return redirect_to_idp(&state, relay_state.as_deref());
    }

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_SAML_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, path = %parts.uri.path(), "Failed to read SAML form body");
            return found(FAILURE_REDIRECT);
        }
    };

    let Some(saml_response) = form_field(&bytes, "SAMLResponse") else {
        let relay_state =
            form_field(&bytes, "RelayState").or_else(|| query_field(&parts.uri, "RelayState"));
        return redirect_to_idp(&state, relay_state.as_deref());
    };

    match state.saml.authenticate(&saml_response) {
        Ok(profile) => {
            state.metrics.saml_assertion("accepted");
            let mut request = Request::from_parts(parts, Body::from(bytes));
            request.extensions_mut().insert(profile);
            next.run(request).await
        }
        Err(err) => {
            state.metrics.saml_assertion("rejected");
            warn!(error = %err, path = %parts.uri.path(), "SAML authentication failed");
            found(FAILURE_REDIRECT)
        }
    }
}

fn redirect_to_idp(state: &AppState, relay_state: Option<&str>) -> Response {
    match state.saml.authorize_url(relay_state) {
        Ok(url) => found(&url),
        Err(err) => {
            error!(error = %err, "Unable to build SAML AuthnRequest");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn form_field(body: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(body)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn query_field(uri: &Uri, name: &str) -> Option<String> {
    uri.query()
        .and_then(|query| form_field(query.as_bytes(), name))
}
