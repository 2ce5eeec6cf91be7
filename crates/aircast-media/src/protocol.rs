use serde::{Deserialize, Serialize};

/// Control traffic between relay, host, and guest. Text frames on the wire
/// are exactly one of these as JSON; binary frames are raw PCM and never
/// pass through this enum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// host -> relay: publish a pairing code.
    RegisterHost { host_id: String },
    /// guest -> relay: request pairing with a host.
    ConnectGuest {
        target_host_id: String,
        caller_name: String,
    },
    /// relay -> guest: pairing succeeded.
    Status { status: LinkStatus },
    /// relay -> either: pairing or protocol failure.
    Error { message: String },
    /// relay -> host: a guest joined.
    GuestConnected { caller_name: String },
    /// relay -> either: the paired peer left.
    GuestDisconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkStatus {
    Connected,
}

impl ControlMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Log-safe message tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::RegisterHost { .. } => "REGISTER_HOST",
            Self::ConnectGuest { .. } => "CONNECT_GUEST",
            Self::Status { .. } => "STATUS",
            Self::Error { .. } => "ERROR",
            Self::GuestConnected { .. } => "GUEST_CONNECTED",
            Self::GuestDisconnected => "GUEST_DISCONNECTED",
        }
    }
}
