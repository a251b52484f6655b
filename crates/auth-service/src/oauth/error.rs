//! RFC 6749 §5.2 error responses

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use grant_engine::{OAuthError, RegistryError};
use serde::Serialize;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// An engine error rendered in-band as JSON
#[derive(Debug)]
pub struct OAuthRejection(pub OAuthError);

impl From<OAuthError> for OAuthRejection {
    fn from(error: OAuthError) -> Self {
        Self(error)
    }
}

impl IntoResponse for OAuthRejection {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OAuthError::InvalidClient => StatusCode::UNAUTHORIZED,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = Json(ErrorBody {
            error: self.0.code().to_string(),
            error_description: self.0.description(),
        });

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"auth-service\""),
            );
        }
        response
    }
}

/// Registry failures on the management endpoints
#[derive(Debug)]
pub struct RegistryRejection(pub RegistryError);

impl From<RegistryError> for RegistryRejection {
    fn from(error: RegistryError) -> Self {
        Self(error)
    }
}

impl IntoResponse for RegistryRejection {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            RegistryError::DuplicateClientId(_) => (StatusCode::CONFLICT, "invalid_client_metadata"),
            RegistryError::InvalidRedirectUri(_) => (StatusCode::BAD_REQUEST, "invalid_redirect_uri"),
            RegistryError::InvalidMetadata(_) | RegistryError::UnexpectedSecret => {
                (StatusCode::BAD_REQUEST, "invalid_client_metadata")
            }
            RegistryError::Hashing(_) | RegistryError::Store(_) => {
                tracing::error!("Registry failure: {}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
            }
        };
        let error_description = (status != StatusCode::INTERNAL_SERVER_ERROR).then(|| self.0.to_string());

        (
            status,
            Json(ErrorBody {
                error: error.to_string(),
                error_description,
            }),
        )
            .into_response()
    }
}
