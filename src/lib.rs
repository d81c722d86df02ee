// Core building blocks
pub mod endpoint;
pub mod event;
pub mod observer;

// Realtime surfaces
pub mod channel;
pub mod mailbox;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use channel::{BackoffConfig, ChannelConfig, ChannelError, ChannelSupervisor, EventChannel};
pub use config::Settings;
pub use endpoint::{resolve, Endpoint, EndpointError, LocationSource, PageLocation};
pub use error::{Result, SyncError};
pub use event::{DecodeError, EventCell, InfoKind};
pub use mailbox::{
    forward_events, MailboxConfig, MailboxStats, Notification, NotificationLevel,
    NotificationMailbox, NotificationSink,
};
pub use observer::{Subscription, SubscriptionId};
