//! Request and response bodies of the HTTP API.
//!
//! Session ids travel as decimal strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use named_lock_core::coordinator::LockStatus;
use named_lock_core::timeout::LockTimeout;
use named_lock_core::traits::{FreeState, SessionId};

fn default_timeout() -> i64 {
    -1
}

fn default_hold_duration() -> u64 {
    5
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquireRequest {
    pub lock_name: String,
    /// Seconds; negative waits forever, zero does not wait.
    #[serde(default = "default_timeout")]
    pub timeout: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HoldReleaseRequest {
    pub lock_name: String,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
    /// Seconds to hold the lock before releasing it.
    #[serde(default = "default_hold_duration")]
    pub hold_duration: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessRequest {
    /// Doubles as the lock name.
    pub product_code: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderRequest {
    pub product_code: String,
    #[serde(default = "default_timeout")]
    pub timeout: i64,
}

impl AcquireRequest {
    pub fn lock_timeout(&self) -> LockTimeout {
        LockTimeout::from_secs(self.timeout)
    }
}

impl HoldReleaseRequest {
    pub fn lock_timeout(&self) -> LockTimeout {
        LockTimeout::from_secs(self.timeout)
    }
}

impl ProcessRequest {
    pub fn lock_timeout(&self) -> LockTimeout {
        LockTimeout::from_secs(self.timeout)
    }
}

impl OrderRequest {
    pub fn lock_timeout(&self) -> LockTimeout {
        LockTimeout::from_secs(self.timeout)
    }
}

/// Body shared by every lock-mutating endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LockResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Value>,
}

impl LockResponse {
    pub fn ok(session_id: SessionId, message: impl Into<String>) -> Self {
        Self {
            success: true,
            session_id: Some(session_id.to_string()),
            message: Some(message.into()),
            item: None,
        }
    }

    pub fn failed(session_id: Option<SessionId>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            session_id: session_id.map(|id| id.to_string()),
            message: Some(message.into()),
            item: None,
        }
    }

    pub fn with_item(mut self, item: Value) -> Self {
        self.item = Some(item);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LockStatusResponse {
    pub success: bool,
    pub lock_name: String,
    pub is_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_session_id: Option<String>,
    pub current_session_id: String,
    pub is_owned_by_current_session: bool,
    /// `free`, `held` or `unknown`, as the store reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LockStatusResponse {
    pub fn from_status(status: &LockStatus, free: FreeState) -> Self {
        Self {
            success: true,
            lock_name: status.lock_name.clone(),
            is_locked: status.is_locked(),
            owner_session_id: status.owner.map(|id| id.to_string()),
            current_session_id: status.current_session.to_string(),
            is_owned_by_current_session: status.is_owned_by_current_session(),
            free_state: Some(free_state_str(free).to_string()),
            message: None,
        }
    }

    pub fn failed(lock_name: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            lock_name: lock_name.to_string(),
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

fn free_state_str(free: FreeState) -> &'static str {
    match free {
        FreeState::Free => "free",
        FreeState::Held => "held",
        FreeState::Unknown => "unknown",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
}
