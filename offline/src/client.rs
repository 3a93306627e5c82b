//! Page-side model of the mobile shell.
//!
//! API answers are decoded once, at the boundary, from the `{success, ...}`
//! envelope into a typed `Result`. Screen changes go through [`AppState`],
//! which knows who is signed in and what their role may open.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, NavError};
use crate::http::{Method, Request, Response};
use crate::offline::SERVED_FROM_HEADER;
use crate::worker::{FetchOutcome, ServiceWorker};

// ── Envelope ────────────────────────────────────────────────

/// The `{success, message?, offline?, ...}` wrapper around every answer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiEnvelope {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub offline: bool,
    /// Every other field; the endpoint's payload.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Decode an API answer. The payload type is read from the envelope's
/// remaining fields.
pub fn decode<T: DeserializeOwned>(status: u16, body: &[u8]) -> Result<T, ApiError> {
    let envelope: ApiEnvelope =
        serde_json::from_slice(body).map_err(|e| ApiError::Malformed(e.to_string()))?;

    if envelope.offline {
        return Err(ApiError::Offline {
            message: envelope.message.unwrap_or_default(),
        });
    }
    if !envelope.success || !(200..300).contains(&status) {
        return Err(ApiError::Rejected {
            status,
            message: envelope.message.unwrap_or_default(),
        });
    }
    serde_json::from_value(Value::Object(envelope.rest)).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// A decoded answer and whether it came from the offline cache.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply<T> {
    pub data: T,
    pub from_cache: bool,
}

// ── Endpoint payloads ───────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub projects: u64,
    #[serde(default)]
    pub documents: u64,
    #[serde(default)]
    pub recent_uploads: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Activity {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// `/api/dashboard/stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Dashboard {
    #[serde(default)]
    pub data: DashboardStats,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

/// Nothing beyond `success`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Ack {}

// ── Roles and screens ───────────────────────────────────────

/// User role, from the account's `category`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    User,
    Registrar,
    Admin,
}

impl From<String> for Role {
    fn from(category: String) -> Self {
        Self::from_category(&category)
    }
}

impl Role {
    pub fn from_category(category: &str) -> Self {
        match category {
            "admin" => Self::Admin,
            "registrar" => Self::Registrar,
            _ => Self::User,
        }
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Admin => "관리자",
            Self::Registrar => "등록자",
            Self::User => "사용자",
        }
    }

    pub fn allows(&self, gate: MenuGate) -> bool {
        match gate {
            MenuGate::Everyone => true,
            MenuGate::RegistrarOnly => matches!(self, Self::Registrar | Self::Admin),
            MenuGate::AdminOnly => *self == Self::Admin,
        }
    }
}

/// Who may see a menu entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuGate {
    Everyone,
    RegistrarOnly,
    AdminOnly,
}

/// Application screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Screen {
    Login,
    Dashboard,
    Projects,
    Documents,
    Drawings,
    Schedule,
    Users,
}

impl Screen {
    pub const ALL: [Screen; 7] = [
        Screen::Login,
        Screen::Dashboard,
        Screen::Projects,
        Screen::Documents,
        Screen::Drawings,
        Screen::Schedule,
        Screen::Users,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Dashboard => "dashboard",
            Self::Projects => "projects",
            Self::Documents => "documents",
            Self::Drawings => "drawings",
            Self::Schedule => "schedule",
            Self::Users => "users",
        }
    }

    /// Parse a navigation target such as `#projects`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches('#');
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn gate(&self) -> MenuGate {
        match self {
            Self::Drawings => MenuGate::RegistrarOnly,
            Self::Users => MenuGate::AdminOnly,
            _ => MenuGate::Everyone,
        }
    }

    /// Endpoint loaded when the screen opens.
    pub fn data_endpoint(&self) -> Option<&'static str> {
        match self {
            Self::Dashboard => Some("/api/dashboard/stats"),
            Self::Projects => Some("/api/projects"),
            Self::Documents => Some("/api/documents"),
            _ => None,
        }
    }
}

// ── AppState ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub category: Role,
}

fn default_role() -> Role {
    Role::User
}

/// Signed-in user, token and current screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    user: Option<User>,
    token: Option<String>,
    screen: Screen,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            user: None,
            token: None,
            screen: Screen::Login,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Sign in and land on the dashboard.
    pub fn login(&mut self, user: User, token: impl Into<String>) {
        self.user = Some(user);
        self.token = Some(token.into());
        self.screen = Screen::Dashboard;
    }

    /// Sign out and return to the login screen.
    pub fn logout(&mut self) {
        self.user = None;
        self.token = None;
        self.screen = Screen::Login;
    }

    /// Switch screens. Opening `Login` signs out.
    pub fn navigate(&mut self, screen: Screen) -> Result<Screen, NavError> {
        if screen == Screen::Login {
            self.logout();
            return Ok(Screen::Login);
        }
        let Some(user) = &self.user else {
            return Err(NavError::NotSignedIn(screen));
        };
        if !user.category.allows(screen.gate()) {
            return Err(NavError::Forbidden {
                screen,
                role: user.category,
            });
        }
        self.screen = screen;
        Ok(screen)
    }

    /// Screens the current user can open from the menu.
    pub fn visible_menus(&self) -> Vec<Screen> {
        let Some(user) = &self.user else {
            return Vec::new();
        };
        Screen::ALL
            .into_iter()
            .filter(|s| *s != Screen::Login && user.category.allows(s.gate()))
            .collect()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

// ── ApiClient ───────────────────────────────────────────────

/// Issues API requests the way the page does: through the worker, with a
/// bearer token when signed in.
pub struct ApiClient {
    worker: Arc<ServiceWorker>,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(worker: Arc<ServiceWorker>) -> Self {
        Self { worker, token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Request, ApiError> {
        let url = self
            .worker
            .origin()
            .join(endpoint)
            .map_err(|e| ApiError::Transport(format!("{endpoint}: {e}")))?;
        let mut request = Request::new(method, url)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.with_header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = body {
            request = request.with_body(body.to_string());
        }
        Ok(request)
    }

    /// Send through the worker; bypassed requests go to the network.
    async fn send(&self, request: Request) -> Result<Response, ApiError> {
        match self.worker.fetch(request.clone()).await {
            FetchOutcome::Respond(handled) => Ok(handled.response),
            FetchOutcome::Bypass => self
                .worker
                .network()
                .fetch(&request)
                .await
                .map_err(|e| ApiError::Transport(e.to_string())),
        }
    }

    fn reply<T: DeserializeOwned>(response: &Response) -> Result<ApiReply<T>, ApiError> {
        Ok(ApiReply {
            data: decode(response.status, &response.body)?,
            from_cache: response.header(SERVED_FROM_HEADER) == Some("cache"),
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiReply<T>, ApiError> {
        let response = self.send(self.request(Method::Get, endpoint, None)?).await?;
        Self::reply(&response)
    }

    pub async fn post<T: DeserializeOwned>(&self, endpoint: &str, body: &Value) -> Result<ApiReply<T>, ApiError> {
        let response = self.send(self.request(Method::Post, endpoint, Some(body))?).await?;
        Self::reply(&response)
    }

    /// Like [`post`](Self::post), but a write that cannot reach the server
    /// is queued for the next background sync.
    pub async fn submit<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: &Value,
    ) -> Result<ApiReply<T>, ApiError> {
        let request = self.request(method, endpoint, Some(body))?;
        match self.send(request.clone()).await {
            Ok(response) => Self::reply(&response),
            Err(ApiError::Transport(_)) => {
                let id = self
                    .worker
                    .outbox()
                    .enqueue_request(&request)
                    .map_err(|e| ApiError::Transport(e.to_string()))?;
                Err(ApiError::Deferred { id })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn dashboard(&self) -> Result<ApiReply<Dashboard>, ApiError> {
        self.get("/api/dashboard/stats").await
    }
}
