//! Authorization page URL for the user API key flow

use crate::error::{Error, Result};
use url::Url;

/// Inputs for [`AuthorizationRequest::url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Forum base URL
    pub base_url: String,
    /// Application name shown on the authorization page
    pub application_name: String,
    /// Client id the forum binds the user API key to
    pub client_id: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// PEM public key the forum encrypts the reply with
    pub public_key: String,
    /// Handshake nonce echoed back in the encrypted payload
    pub nonce: String,
    /// Where the forum redirects after approval
    pub auth_redirect: Option<String>,
}

impl AuthorizationRequest {
    /// `GET {base}/user-api-key/new?client_id=…&application_name=…&public_key=…&nonce=…&scopes=…`
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/user-api-key/new",
            self.base_url.trim_end_matches('/')
        ))
        .map_err(|e| Error::Config(format!("invalid base URL '{}': {}", self.base_url, e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.client_id)
                .append_pair("application_name", &self.application_name)
                .append_pair("public_key", &self.public_key)
                .append_pair("nonce", &self.nonce)
                .append_pair("scopes", &normalize_scopes(&self.scopes));
            if let Some(redirect) = &self.auth_redirect {
                query.append_pair("auth_redirect", redirect);
            }
        }

        Ok(url)
    }
}

/// Trim, lowercase, drop empties, dedupe, sort and comma-join.
pub fn normalize_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    let mut normalized: Vec<String> = scopes
        .iter()
        .map(|s| s.as_ref().trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request() -> AuthorizationRequest {
        AuthorizationRequest {
            base_url: "https://forum.example.com/".into(),
            application_name: "Wallet Link".into(),
            client_id: "bridge".into(),
            scopes: vec!["Write".into(), " read ".into(), "write".into(), "".into()],
            public_key: "-----BEGIN PUBLIC KEY-----\nAB+C/=\n-----END PUBLIC KEY-----\n".into(),
            nonce: "n0nce".into(),
            auth_redirect: None,
        }
    }

    #[test]
    fn test_normalize_scopes() {
        assert_eq!(normalize_scopes(&["Write", " read ", "write", ""]), "read,write");
        assert_eq!(normalize_scopes::<&str>(&[]), "");
    }

    #[test]
    fn test_url_contains_every_parameter() {
        let url = request().url().unwrap();

        assert_eq!(url.path(), "/user-api-key/new");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".into(), "bridge".into()),
                ("application_name".into(), "Wallet Link".into()),
                (
                    "public_key".into(),
                    "-----BEGIN PUBLIC KEY-----\nAB+C/=\n-----END PUBLIC KEY-----\n".into()
                ),
                ("nonce".into(), "n0nce".into()),
                ("scopes".into(), "read,write".into()),
            ]
        );
    }

    #[test]
    fn test_auth_redirect_is_appended() {
        let mut request = request();
        request.auth_redirect = Some("https://app.example.com/linked".into());

        let url = request.url().unwrap();
        assert!(
            url.query_pairs()
                .any(|(k, v)| k == "auth_redirect" && v == "https://app.example.com/linked")
        );
    }

    #[test]
    fn test_bad_base_url_is_config_error() {
        let mut request = request();
        request.base_url = "not a url".into();
        assert!(matches!(request.url(), Err(Error::Config(_))));
    }
}
