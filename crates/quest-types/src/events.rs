use serde::{Deserialize, Serialize};

use crate::models::Notification;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready {
        #[serde(rename = "userId")]
        user_id: String,
    },

    /// A notification was created for the connected user
    Notification(Notification),

    /// Reply to a client `Ping`
    Pong,
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Application-level liveness check
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_adjacently_tagged() {
        let ready = GatewayEvent::Ready {
            user_id: "0".repeat(24),
        };
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["type"], "Ready");
        assert_eq!(json["data"]["userId"], "0".repeat(24));

        let cmd: GatewayCommand = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(cmd, GatewayCommand::Ping));
    }
}
