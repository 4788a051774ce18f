use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::AUTHORIZATION, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::client::error::ClientError;
use crate::client::session::{AuthOutcome, SessionController};
use crate::client::store::ClientSession;
use crate::db::{Account, Post};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:8000/api/v1`.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = ClientConfig::default();
        if let Ok(url) = std::env::var("API_URL") {
            config.base_url = url;
        }
        config
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Response to `DELETE /posts/{id}`.
#[derive(Debug, Deserialize)]
pub struct Deleted {
    pub id: String,
}

/// Result of a successful login or registration.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub session: ClientSession,
    /// Page the user was sent away from before signing in.
    pub return_to: Option<String>,
}

/// A post plus whether the current user may edit or delete it.
#[derive(Debug, Clone)]
pub struct PostView {
    pub post: Post,
    pub can_mutate: bool,
}

/// HTTP client for the blog API.
///
/// Every request passes through two stages: [`ApiClient::attach_bearer`]
/// on the way out and [`ApiClient::inspect`] on the way back. Callers never
/// see or handle the token.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionController>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<SessionController>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(ApiClient {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    /// Starts a request to `path` with the outbound stage applied.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        self.attach_bearer(self.http.request(method, url))
    }

    /// Outbound stage: adds the bearer credential when a session exists.
    fn attach_bearer(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    /// Inbound stage: any 401 invalidates the session, other failures are
    /// normalized into [`ClientError`].
    async fn inspect(&self, response: Result<Response, reqwest::Error>) -> Result<Response, ClientError> {
        let response = response.map_err(|e| {
            tracing::warn!(error = %e, "request failed without a response");
            ClientError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            tracing::debug!(url = %response.url(), "request rejected with 401");
            self.session.reject();
            return Err(ClientError::Unauthenticated);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_default();

        tracing::debug!(status = status.as_u16(), %message, "api error");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Sends `request` through the inbound stage and decodes the JSON body.
    pub async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.inspect(request.send().await).await?;
        Ok(response.json::<T>().await?)
    }

    async fn authenticate(&self, path: &str, body: serde_json::Value) -> Result<SignedIn, ClientError> {
        let attempt = self.session.begin_attempt();
        let result = self
            .send::<ClientSession>(self.request(Method::POST, path).json(&body))
            .await;

        match self.session.complete(attempt, result) {
            AuthOutcome::Authenticated { session, return_to } => Ok(SignedIn { session, return_to }),
            AuthOutcome::Failed(e) => Err(e),
            AuthOutcome::Stale => Err(ClientError::Superseded),
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<SignedIn, ClientError> {
        self.authenticate(
            "/users",
            json!({ "name": name, "email": email, "password": password }),
        )
        .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SignedIn, ClientError> {
        self.authenticate("/users/login", json!({ "email": email, "password": password }))
            .await
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    pub async fn me(&self) -> Result<Account, ClientError> {
        self.send(self.request(Method::GET, "/users/me")).await
    }

    pub async fn list_users(&self) -> Result<Vec<Account>, ClientError> {
        self.send(self.request(Method::GET, "/users")).await
    }

    pub async fn list_posts(&self) -> Result<Vec<PostView>, ClientError> {
        let posts: Vec<Post> = self.send(self.request(Method::GET, "/posts")).await?;
        Ok(posts.into_iter().map(|post| self.view(post)).collect())
    }

    pub async fn get_post(&self, id: &str) -> Result<PostView, ClientError> {
        let post: Post = self
            .send(self.request(Method::GET, &format!("/posts/{}", id)))
            .await?;
        Ok(self.view(post))
    }

    pub async fn create_post(&self, title: &str, content: &str) -> Result<Post, ClientError> {
        self.send(
            self.request(Method::POST, "/posts")
                .json(&json!({ "title": title, "content": content })),
        )
        .await
    }

    pub async fn update_post(
        &self,
        id: &str,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Post, ClientError> {
        self.send(
            self.request(Method::PUT, &format!("/posts/{}", id))
                .json(&json!({ "title": title, "content": content })),
        )
        .await
    }

    pub async fn delete_post(&self, id: &str) -> Result<Deleted, ClientError> {
        self.send(self.request(Method::DELETE, &format!("/posts/{}", id)))
            .await
    }

    fn view(&self, post: Post) -> PostView {
        let can_mutate = self.session.can_mutate(&post.user);
        PostView { post, can_mutate }
    }
}
