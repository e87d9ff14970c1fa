//! Command bridge: exposes server control to a desktop or web UI.
//!
//! Every command is a plain `async fn` taking the shared [`AppState`] and
//! returning a [`CommandResult`].  A UI shell (Tauri, a WebSocket bridge, a
//! test) maps its own invocation mechanism onto these functions and forwards
//! the serialized result unchanged.
//!
//! # Data Transfer Objects (DTOs)
//!
//! The server's internal types (`ServerStatus`, `Uuid`, `SocketAddr`) are
//! converted into DTOs made only of JSON-friendly fields (`String`, `bool`,
//! `u16`).  `ClientDto` and `StatusDto` are what a UI renders as the client
//! list and the start/stop/test-mode controls.
//!
//! # `CommandResult<T>` wrapper
//!
//! All commands return `CommandResult<T>` rather than `Result<T, E>`, so
//! every response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::application::event_loop::{ListenerState, ServerStatus};
use crate::infrastructure::network::advertisement::ServiceAdvertisement;
use crate::infrastructure::storage::config::AppConfig;
use crate::server::AudioSyncServer;
use audiosync_core::{ClientId, ClientInfo};

// ── Shared application state ──────────────────────────────────────────────────

/// State shared by every command invocation.
pub struct AppState {
    pub server: AudioSyncServer,
    /// The configuration the server was built from.
    pub config: Mutex<AppConfig>,
}

impl AppState {
    pub fn new(server: AudioSyncServer, config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            server,
            config: Mutex::new(config),
        })
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One row of the client list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientDto {
    pub client_id: String,
    pub name: String,
    pub is_connected: bool,
    pub is_selected: bool,
}

impl From<&ClientInfo> for ClientDto {
    fn from(c: &ClientInfo) -> Self {
        Self {
            client_id: c.id.to_string(),
            name: c.name.clone(),
            is_connected: c.is_connected,
            is_selected: c.is_selected,
        }
    }
}

/// Everything the main window shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusDto {
    pub clients: Vec<ClientDto>,
    pub is_capturing: bool,
    pub is_test_mode: bool,
    /// `"idle"`, `"starting"`, `"ready"`, `"failed"` or `"cancelled"`.
    pub listener: String,
    /// Failure reason while `listener == "failed"`.
    pub listener_error: Option<String>,
    pub local_addr: Option<String>,
}

impl From<&ServerStatus> for StatusDto {
    fn from(s: &ServerStatus) -> Self {
        let (listener, listener_error) = match &s.listener {
            ListenerState::Idle => ("idle", None),
            ListenerState::Starting => ("starting", None),
            ListenerState::Ready => ("ready", None),
            ListenerState::Failed(reason) => ("failed", Some(reason.clone())),
            ListenerState::Cancelled => ("cancelled", None),
        };
        Self {
            clients: s.clients.iter().map(ClientDto::from).collect(),
            is_capturing: s.is_capturing,
            is_test_mode: s.is_test_mode,
            listener: listener.to_string(),
            listener_error,
            local_addr: s.local_addr.map(|a| a.to_string()),
        }
    }
}

/// Listener settings as configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfigDto {
    pub port: u16,
    pub bind_address: String,
    pub reuse_address: bool,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns the latest published server state.
///
/// # Example (frontend)
/// ```ts
/// const status = await invoke<CommandResult<StatusDto>>('get_status');
/// ```
pub async fn get_status(state: Arc<AppState>) -> CommandResult<StatusDto> {
    CommandResult::ok(StatusDto::from(&state.server.status()))
}

/// Starts listening and capturing.
pub async fn start_streaming(state: Arc<AppState>) -> CommandResult<()> {
    match state.server.start().await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Stops capturing, closes the listener and drops all clients.
pub async fn stop_streaming(state: Arc<AppState>) -> CommandResult<()> {
    match state.server.stop().await {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Flips test mode; `data` is the new value.
pub async fn toggle_test_mode(state: Arc<AppState>) -> CommandResult<bool> {
    match state.server.toggle_test_mode().await {
        Ok(enabled) => CommandResult::ok(enabled),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Marks a client as selected (or not) in the UI.
pub async fn select_client(
    state: Arc<AppState>,
    client_id: String,
    selected: bool,
) -> CommandResult<()> {
    let id = match client_id.parse::<ClientId>() {
        Ok(id) => id,
        Err(e) => return CommandResult::err(format!("invalid client_id UUID: {e}")),
    };
    match state.server.select_client(id, selected) {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

/// Returns the configured listener settings.
pub async fn get_network_config(state: Arc<AppState>) -> CommandResult<NetworkConfigDto> {
    let cfg = state.config.lock().await;
    CommandResult::ok(NetworkConfigDto {
        port: cfg.network.port,
        bind_address: cfg.network.bind_address.clone(),
        reuse_address: cfg.network.reuse_address,
    })
}

/// Returns the advertised service identity while listening.
pub async fn get_service_info(state: Arc<AppState>) -> CommandResult<Option<ServiceAdvertisement>> {
    CommandResult::ok(state.server.advertisement().await)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
