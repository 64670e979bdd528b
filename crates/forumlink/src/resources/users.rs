//! Users API endpoint

use crate::error::{Error, Result};
use forumlink_transport::{RequestOptions, Transport, fetch_json};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Path of the current-session endpoint.
pub const CURRENT_SESSION_PATH: &str = "/session/current.json";

/// The forum account behind a set of credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumUser {
    /// Numeric user id (the system user is negative)
    pub id: i64,
    /// Login name
    pub username: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL template with a `{size}` placeholder
    #[serde(default)]
    pub avatar_template: Option<String>,
    /// Site administrator
    #[serde(default)]
    pub admin: bool,
    /// Site moderator
    #[serde(default)]
    pub moderator: bool,
}

#[derive(Deserialize)]
struct CurrentSession {
    #[serde(default)]
    current_user: Option<ForumUser>,
}

/// Users API resource.
#[derive(Clone)]
pub struct Users {
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Users {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Users").finish_non_exhaustive()
    }
}

impl Users {
    /// Create a new Users resource.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// The user that owns `user_api_key`.
    pub async fn current(&self, user_api_key: &SecretString) -> Result<ForumUser> {
        self.current_for_client(user_api_key, None).await
    }

    /// Like [`current`](Self::current), sending `client_id` as
    /// `User-Api-Client-Id` instead of the configured default.
    pub async fn current_for_client(
        &self,
        user_api_key: &SecretString,
        client_id: Option<&str>,
    ) -> Result<ForumUser> {
        let mut options = RequestOptions::get().user_api_key(user_api_key.clone());
        if let Some(client_id) = client_id {
            options = options.user_api_client_id(client_id);
        }

        let session: CurrentSession =
            fetch_json(self.transport.as_ref(), CURRENT_SESSION_PATH, options).await?;

        session
            .current_user
            .ok_or_else(|| Error::Unexpected("session has no current_user".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forumlink_transport::{ApiError, Response, ResponseBody, TransportError};
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeTransport {
        body: ResponseBody,
        status: Option<u16>,
        paths: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn ok(body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                body: ResponseBody::Json(body),
                status: None,
                paths: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn fetch(&self, path: &str, _options: RequestOptions) -> forumlink_transport::Result<Response> {
            self.paths.lock().unwrap().push(path.to_string());
            if let Some(status) = self.status {
                return Err(TransportError::Api(ApiError::new(status, "GET", path, "")));
            }
            Ok(Response {
                status: 200,
                headers: Default::default(),
                request_id: None,
                body: self.body.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_current_maps_user() {
        let transport = FakeTransport::ok(json!({
            "current_user": {
                "id": 12,
                "username": "alice",
                "name": "Alice",
                "avatar_template": "/user_avatar/forum/alice/{size}/1.png",
                "admin": false,
                "moderator": true,
                "trust_level": 2
            }
        }));
        let users = Users::new(transport.clone());

        let user = users.current(&SecretString::from("k")).await.unwrap();

        assert_eq!(
            user,
            ForumUser {
                id: 12,
                username: "alice".into(),
                name: Some("Alice".into()),
                avatar_template: Some("/user_avatar/forum/alice/{size}/1.png".into()),
                admin: false,
                moderator: true,
            }
        );
        assert_eq!(*transport.paths.lock().unwrap(), vec![CURRENT_SESSION_PATH.to_string()]);
    }

    #[tokio::test]
    async fn test_optional_fields_default() {
        let users = Users::new(FakeTransport::ok(json!({
            "current_user": {"id": 3, "username": "bob"}
        })));

        let user = users.current(&SecretString::from("k")).await.unwrap();
        assert_eq!(user.name, None);
        assert!(!user.admin);
        assert!(!user.moderator);
    }

    #[tokio::test]
    async fn test_missing_current_user_is_unexpected() {
        let users = Users::new(FakeTransport::ok(json!({})));
        let err = users.current(&SecretString::from("k")).await.unwrap_err();
        assert!(matches!(err, Error::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let users = Users::new(Arc::new(FakeTransport {
            body: ResponseBody::Empty,
            status: Some(403),
            paths: Mutex::new(Vec::new()),
        }));

        let err = users.current(&SecretString::from("k")).await.unwrap_err();
        assert_eq!(err.api_error().map(|e| e.status()), Some(403));
    }
}
