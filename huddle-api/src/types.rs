//! Request and response bodies

use serde::{Deserialize, Serialize};

use huddle_core::core_identity::User;
use huddle_core::core_space::{Channel, Workspace};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub errors: Vec<Notice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesBody {
    pub messages: Vec<Notice>,
}

impl MessagesBody {
    pub fn single(msg: impl Into<String>) -> Self {
        MessagesBody { messages: vec![Notice { msg: msg.into() }] }
    }
}

// ===== Users & auth =====

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkResponse {
    pub link: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

// ===== Workspaces & channels =====

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub logo: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub logo: String,
    pub workspace: String,
}

/// Partial update of a workspace or channel
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRequest {
    pub name: Option<String>,
    pub logo: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkspaceResponse {
    pub workspace: Workspace,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkspacesResponse {
    pub workspaces: Vec<Workspace>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub channel: Channel,
}

#[derive(Debug, Deserialize)]
pub struct InviteMailRequest {
    #[serde(default)]
    pub emails: Vec<String>,
}

// ===== Messages =====

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    #[serde(default)]
    pub message: String,
}
