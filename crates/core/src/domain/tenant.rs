use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One hotel running the assistant on its own transport session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// Transport identity that receives order summaries and ratings.
    pub admin_target: String,
    /// Greet straight into the main menu instead of asking for a room first.
    pub skip_room_capture: bool,
}

impl Tenant {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        admin_target: impl Into<String>,
    ) -> Self {
        Self {
            id: TenantId(id.into()),
            name: name.into(),
            admin_target: admin_target.into(),
            skip_room_capture: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reauthenticating,
    Destroying,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reauthenticating => "reauthenticating",
            Self::Destroying => "destroying",
        }
    }
}

/// Opaque session blob handed out by the transport. Never printed.
#[derive(Clone)]
pub struct Credentials(SecretString);

impl Credentials {
    pub fn new(blob: impl Into<String>) -> Self {
        Self(SecretString::from(blob.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credentials {}
