//! Typed HTTP client for the SkillQuest API.
//!
//! [`ApiClient`] keeps the current session and attaches its access token to
//! every request. A 401 from the server ends the session locally.

pub mod error;
pub mod gateway;

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use quest_types::api::{AuthResponse, CompleteTaskResponse, ErrorBody, MessageResponse, Page};
use quest_types::models::{Notification, Task, TaskPriority, User};

pub use error::{ClientError, ClientResult};
pub use gateway::{ReconnectPolicy, Subscription, subscribe_notifications};

#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl From<AuthResponse> for Session {
    fn from(auth: AuthResponse) -> Self {
        Self {
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
            user: auth.user,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<TaskPriority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<i64>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl ApiClient {
    /// `base_url` is the server origin, e.g. `http://localhost:5000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// The gateway endpoint matching `base_url`.
    pub fn gateway_url(&self) -> String {
        let origin = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{origin}/ws")
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/api/v1{}", self.base_url, path));
        match self.session() {
            Some(session) => builder.bearer_auth(session.access_token),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let text = response.text().await?;
        let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: text,
        });

        if status == StatusCode::UNAUTHORIZED {
            debug!("Server answered 401, clearing session");
            self.set_session(None);
            return Err(ClientError::Unauthorized(body.message));
        }
        Err(ClientError::Api {
            status: status.as_u16(),
            error: body.error,
            message: body.message,
        })
    }

    async fn start_session(&self, builder: RequestBuilder) -> ClientResult<User> {
        let auth: AuthResponse = self.execute(builder).await?;
        let user = auth.user.clone();
        self.set_session(Some(auth.into()));
        Ok(user)
    }

    // -- Auth --

    pub async fn register(&self, name: &str, email: &str, password: &str) -> ClientResult<User> {
        let body = json!({
            "name": name,
            "email": email,
            "password": password,
            "confirmPassword": password,
        });
        self.start_session(self.request(Method::POST, "/auth/register").json(&body))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> ClientResult<User> {
        let body = json!({ "email": email, "password": password });
        self.start_session(self.request(Method::POST, "/auth/login").json(&body))
            .await
    }

    /// Revokes outstanding refresh tokens server-side. The local session is
    /// cleared even if the call fails.
    pub async fn logout(&self) -> ClientResult<()> {
        let result: ClientResult<MessageResponse> =
            self.execute(self.request(Method::POST, "/auth/logout")).await;
        self.set_session(None);
        result.map(|_| ())
    }

    pub async fn me(&self) -> ClientResult<User> {
        self.execute(self.request(Method::GET, "/auth/me")).await
    }

    /// Swap the stored refresh token for a fresh pair.
    pub async fn refresh(&self) -> ClientResult<User> {
        let session = self.session().ok_or(ClientError::NoSession)?;
        let body = json!({ "refreshToken": session.refresh_token });
        self.start_session(self.request(Method::POST, "/auth/refresh").json(&body))
            .await
    }

    // -- Tasks --

    pub async fn create_task(&self, task: &NewTask) -> ClientResult<Task> {
        self.execute(self.request(Method::POST, "/tasks").json(task))
            .await
    }

    pub async fn list_tasks(&self, page: u32, limit: u32) -> ClientResult<Page<Task>> {
        let query = [("page", page), ("limit", limit)];
        self.execute(self.request(Method::GET, "/tasks").query(&query))
            .await
    }

    pub async fn complete_task(&self, id: &str) -> ClientResult<CompleteTaskResponse> {
        self.execute(self.request(Method::POST, &format!("/tasks/{id}/complete")))
            .await
    }

    // -- Notifications --

    pub async fn list_notifications(
        &self,
        unread_only: bool,
        page: u32,
    ) -> ClientResult<Page<Notification>> {
        let mut builder = self
            .request(Method::GET, "/notifications")
            .query(&[("page", page)]);
        if unread_only {
            builder = builder.query(&[("unread", "true")]);
        }
        self.execute(builder).await
    }

    pub async fn mark_notification_read(&self, id: &str) -> ClientResult<()> {
        let _: MessageResponse = self
            .execute(self.request(Method::PATCH, &format!("/notifications/{id}/read")))
            .await?;
        Ok(())
    }

    /// Open the live notification feed with the current access token.
    pub fn subscribe(&self, policy: ReconnectPolicy) -> ClientResult<Subscription> {
        let session = self.session().ok_or(ClientError::NoSession)?;
        Ok(subscribe_notifications(
            &self.gateway_url(),
            &session.access_token,
            policy,
        ))
    }
}
