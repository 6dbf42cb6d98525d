use crate::error::ApiError;
use crate::models::{ExistsResponse, PageRequest, SubTodo, Todo, TodoCollection, User};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Called with the status of every 401/403 response.
pub type AuthFailureHook = Arc<dyn Fn(StatusCode) + Send + Sync>;

// Error payload shapes the server uses
#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Client for the todolist REST API.
///
/// Every method issues exactly one request. The session cookie set by
/// `login` lives in the client's cookie store and rides along on every
/// later request, including those made through clones.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    on_auth_failure: Option<AuthFailureHook>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<ApiClient, ApiError> {
        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(ApiClient {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            on_auth_failure: None,
        })
    }

    pub fn with_auth_failure_hook(mut self, hook: AuthFailureHook) -> ApiClient {
        self.on_auth_failure = Some(hook);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, path);
        self.client.request(method, &url)
    }

    async fn check(&self, res: Response) -> Result<Response, ApiError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let error_text = res.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&error_text).unwrap_or_default();
        let err = ApiError::Http {
            status,
            message: body.message.or(body.error),
        };

        if err.is_auth_failure() {
            tracing::warn!("Request rejected with {}", status);
            if let Some(hook) = &self.on_auth_failure {
                hook(status);
            }
        }
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let res = self.check(req.send().await?).await?;
        let text = res.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_empty(&self, req: RequestBuilder) -> Result<(), ApiError> {
        self.check(req.send().await?).await?;
        Ok(())
    }

    // Todos

    pub async fn list_todos(&self, page: Option<PageRequest>) -> Result<TodoCollection, ApiError> {
        let mut req = self.request(Method::GET, "/todos");
        if let Some(page) = page {
            req = req.query(&page);
        }
        self.send_json(req).await
    }

    pub async fn list_my_todos(
        &self,
        page: Option<PageRequest>,
    ) -> Result<TodoCollection, ApiError> {
        let mut req = self.request(Method::GET, "/todos/my");
        if let Some(page) = page {
            req = req.query(&page);
        }
        self.send_json(req).await
    }

    pub async fn create_todo(&self, title: &str) -> Result<Todo, ApiError> {
        let req = self
            .request(Method::POST, "/todos")
            .json(&json!({ "title": title }));
        self.send_json(req).await
    }

    pub async fn update_todo(&self, id: i64, title: &str) -> Result<Todo, ApiError> {
        let req = self
            .request(Method::PATCH, &format!("/todos/{}", id))
            .json(&json!({ "title": title }));
        self.send_json(req).await
    }

    pub async fn delete_todo(&self, id: i64) -> Result<(), ApiError> {
        let req = self.request(Method::DELETE, &format!("/todos/{}", id));
        self.send_empty(req).await
    }

    pub async fn toggle_todo(&self, id: i64) -> Result<Todo, ApiError> {
        let req = self
            .request(Method::PATCH, &format!("/todos/{}/check", id))
            .json(&json!({}));
        self.send_json(req).await
    }

    // Sub-todos

    pub async fn list_subtodos(&self, todo_id: i64) -> Result<Vec<SubTodo>, ApiError> {
        let req = self.request(Method::GET, &format!("/subtodos/{}", todo_id));
        self.send_json(req).await
    }

    pub async fn create_subtodo(&self, todo_id: i64, title: &str) -> Result<SubTodo, ApiError> {
        let req = self
            .request(Method::POST, &format!("/subtodos/{}", todo_id))
            .json(&json!({ "title": title }));
        self.send_json(req).await
    }

    pub async fn update_subtodo(&self, id: i64, title: &str) -> Result<SubTodo, ApiError> {
        let req = self
            .request(Method::PATCH, &format!("/subtodos/{}", id))
            .json(&json!({ "title": title }));
        self.send_json(req).await
    }

    pub async fn toggle_subtodo(&self, id: i64) -> Result<SubTodo, ApiError> {
        let req = self.request(Method::PATCH, &format!("/subtodos/{}/check", id));
        self.send_json(req).await
    }

    pub async fn delete_subtodo(&self, id: i64) -> Result<(), ApiError> {
        let req = self.request(Method::DELETE, &format!("/subtodos/{}", id));
        self.send_empty(req).await
    }

    // Auth

    /// The logged-in user, or `None` when the server answers with an empty body.
    pub async fn current_user(&self) -> Result<Option<User>, ApiError> {
        let res = self
            .check(self.request(Method::GET, "/auth/me").send().await?)
            .await?;
        let text = res.text().await?;
        if text.trim().is_empty() || text.trim() == "null" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let req = self
            .request(Method::POST, "/auth/login")
            .json(&json!({ "username": username, "password": password }));
        self.send_empty(req).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::POST, "/auth/logout"))
            .await
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<(), ApiError> {
        let mut user_data = json!({
            "username": username,
            "password": password
        });

        if let Some(email) = email {
            user_data["email"] = json!(email);
        }

        let req = self.request(Method::POST, "/auth/register").json(&user_data);
        self.send_empty(req).await
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool, ApiError> {
        let req = self
            .request(Method::GET, "/auth/check-username")
            .query(&[("username", username)]);
        let res: ExistsResponse = self.send_json(req).await?;
        Ok(res.exists)
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, ApiError> {
        let req = self
            .request(Method::GET, "/auth/check-email")
            .query(&[("email", email)]);
        let res: ExistsResponse = self.send_json(req).await?;
        Ok(res.exists)
    }
}
