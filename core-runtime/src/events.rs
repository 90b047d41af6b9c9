//! # Event Bus System
//!
//! Broadcasts credential lifecycle events using `tokio::sync::broadcast` so a
//! host UI can react to sign-in, refresh and sign-out without polling.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! let event_bus = EventBus::new(16);
//! let mut stream = event_bus.subscribe();
//!
//! let _ = event_bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
//!     provider: "dropbox".to_string(),
//! }));
//!
//! assert!(matches!(stream.try_recv(), Ok(CoreEvent::Auth(_))));
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender was dropped.
//!
//! Emitting with no subscribers returns `Err`. Publishers treat that as
//! a no-op.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authentication-related events
    Auth(AuthEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError {
                recoverable: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. } | AuthEvent::SignedOut { .. }) => {
                EventSeverity::Info
            }
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Credential lifecycle events.
///
/// `connection` identifies a provider account as `<provider>:<slot>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Stored credentials were removed.
    SignedOut { connection: String },
    /// An interactive authorization is in progress.
    SigningIn { provider: String },
    /// A connection is live.
    SignedIn {
        connection: String,
        /// Back-end account identifier.
        account_id: String,
    },
    /// Access token is being refreshed.
    TokenRefreshing { connection: String },
    /// Token refresh completed.
    TokenRefreshed {
        connection: String,
        /// Expiry of the new access token (Unix epoch seconds).
        expires_at: i64,
    },
    /// Authentication failed.
    AuthError {
        connection: Option<String>,
        message: String,
        /// Whether calling `connect` again may succeed without user action.
        recoverable: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::SignedOut { .. } => "Signed out",
            AuthEvent::SigningIn { .. } => "Authorization in progress",
            AuthEvent::SignedIn { .. } => "Signed in",
            AuthEvent::TokenRefreshing { .. } => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Access token refreshed",
            AuthEvent::AuthError { .. } => "Authentication error",
        }
    }
}

impl fmt::Display for CoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Central broadcast channel for [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// Subscribers that fall behind by more than `capacity` events receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = CoreEvent::Auth(AuthEvent::SignedIn {
            connection: "google_drive:default".to_string(),
            account_id: "1234".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::default();
        let result = bus.emit(CoreEvent::Auth(AuthEvent::SigningIn {
            provider: "onedrive".to_string(),
        }));

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_keeps_receiving() {
        let bus = EventBus::new(1);
        let mut stream = bus.subscribe();

        for expires_at in 0..3 {
            let _ = bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                connection: "dropbox:default".to_string(),
                expires_at,
            }));
        }

        assert!(matches!(stream.recv().await, Err(RecvError::Lagged(_))));
        assert!(stream.recv().await.is_ok());
    }

    #[test]
    fn test_severity() {
        let revoked = CoreEvent::Auth(AuthEvent::AuthError {
            connection: None,
            message: "grant revoked".to_string(),
            recoverable: false,
        });
        let transient = CoreEvent::Auth(AuthEvent::AuthError {
            connection: None,
            message: "timeout".to_string(),
            recoverable: true,
        });

        assert_eq!(revoked.severity(), EventSeverity::Error);
        assert_eq!(transient.severity(), EventSeverity::Warning);
        assert_eq!(
            CoreEvent::Auth(AuthEvent::SignedOut {
                connection: "dropbox:default".to_string()
            })
            .severity(),
            EventSeverity::Info
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Auth(AuthEvent::TokenRefreshing {
            connection: "onedrive:work".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Auth\""));
        assert!(json.contains("\"event\":\"TokenRefreshing\""));

        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
