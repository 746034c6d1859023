use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Role of a peer within a room.
///
/// A host publishes media on a send transport; a viewer receives
/// forwarded media on a receive transport. Host-only and viewer-only
/// operations are enforced at the call sites through this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Viewer,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "host" => Ok(Self::Host),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!("Invalid role: {other}")),
        }
    }
}

/// Direction of a WebRTC transport relative to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

impl TransportDirection {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Recv => "recv",
        }
    }

    /// The only direction a peer of the given role may allocate.
    #[must_use]
    pub const fn allowed_for(role: Role) -> Self {
        match role {
            Role::Host => Self::Send,
            Role::Viewer => Self::Recv,
        }
    }
}

impl std::fmt::Display for TransportDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
