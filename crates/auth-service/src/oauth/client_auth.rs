//! Client authentication at the token, revocation and introspection endpoints
//!
//! RFC 6749 §2.3.1: `client_secret_basic` (HTTP Basic with form-encoded id and
//! secret) or `client_secret_post` (form fields). Public clients send only
//! `client_id`. Using more than one method in a request is an error.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};
use grant_engine::{ClientCredentials, OAuthError};
use serde::Deserialize;
use url::form_urlencoded;

/// Client fields that may accompany any authenticated form request
#[derive(Debug, Default, Deserialize)]
pub struct ClientForm {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

pub fn client_credentials(
    headers: &HeaderMap,
    form: &ClientForm,
) -> Result<ClientCredentials, OAuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let (client_id, secret) = parse_basic(value.to_str().ok()).ok_or(OAuthError::InvalidClient)?;
        if form.client_secret.is_some() {
            return Err(OAuthError::InvalidRequest(
                "multiple client authentication methods".to_string(),
            ));
        }
        if form.client_id.as_deref().is_some_and(|id| id != client_id) {
            return Err(OAuthError::InvalidRequest(
                "client_id does not match the Authorization header".to_string(),
            ));
        }
        return Ok(ClientCredentials::basic(client_id, secret));
    }

    let client_id = form
        .client_id
        .clone()
        .filter(|id| !id.is_empty())
        .ok_or(OAuthError::InvalidClient)?;
    Ok(match &form.client_secret {
        Some(secret) => ClientCredentials::post(client_id, secret),
        None => ClientCredentials::public(client_id),
    })
}

fn parse_basic(value: Option<&str>) -> Option<(String, String)> {
    let encoded = value?.strip_prefix("Basic ")?.trim();
    let decoded = String::from_utf8(STANDARD.decode(encoded).ok()?).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((form_decode(id), form_decode(secret)))
}

/// Undo `application/x-www-form-urlencoded` encoding of a single component.
fn form_decode(raw: &str) -> String {
    let escaped = raw.replace('&', "%26").replace('=', "%3D");
    form_urlencoded::parse(escaped.as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use grant_engine::AuthMethod;

    fn basic(id: &str, secret: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{}:{}", id, secret)));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    #[test]
    fn test_basic_credentials_are_form_decoded() {
        let creds = client_credentials(&basic("my%20app", "s%3Acret+x"), &ClientForm::default()).unwrap();
        assert_eq!(creds.client_id, "my app");
        assert_eq!(creds.secret.as_deref(), Some("s:cret x"));
        assert_eq!(creds.method, AuthMethod::ClientSecretBasic);
    }

    #[test]
    fn test_post_and_public_credentials() {
        let form = ClientForm {
            client_id: Some("abc".into()),
            client_secret: Some("xyz".into()),
        };
        let creds = client_credentials(&HeaderMap::new(), &form).unwrap();
        assert_eq!(creds.method, AuthMethod::ClientSecretPost);

        let form = ClientForm {
            client_id: Some("abc".into()),
            client_secret: None,
        };
        let creds = client_credentials(&HeaderMap::new(), &form).unwrap();
        assert_eq!(creds.method, AuthMethod::None);
        assert!(creds.secret.is_none());
    }

    #[test]
    fn test_rejects_ambiguous_or_missing_credentials() {
        let form = ClientForm {
            client_id: None,
            client_secret: Some("xyz".into()),
        };
        assert!(matches!(
            client_credentials(&basic("abc", "xyz"), &form),
            Err(OAuthError::InvalidRequest(_))
        ));
        assert_eq!(
            client_credentials(&HeaderMap::new(), &ClientForm::default()).unwrap_err(),
            OAuthError::InvalidClient
        );

        let mut garbage = HeaderMap::new();
        garbage.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic !!!"));
        assert_eq!(
            client_credentials(&garbage, &ClientForm::default()).unwrap_err(),
            OAuthError::InvalidClient
        );
    }
}
