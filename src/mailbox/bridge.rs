//! Turns info events into user-facing notifications.

use crate::event::{EventCell, InfoKind};
use crate::observer::Subscription;

use super::{Notification, NotificationSink};

/// Notification announcing `kind`, if it is worth showing to the user.
///
/// `None` and the fixture/universe/endpoint refresh hints only trigger
/// data reloads and produce nothing.
pub fn notification_for(kind: &InfoKind) -> Option<Notification> {
    let notification = match kind {
        InfoKind::ProjectSaved => {
            Notification::info("Project saved", "The project was written to disk")
        }
        InfoKind::ProjectLoaded => {
            Notification::info("Project loaded", "A project was loaded into the engine")
        }
        InfoKind::EffectListChanged => {
            Notification::info("Effects changed", "The effect list was updated")
        }
        InfoKind::SystemShutdown => {
            Notification::warning("Engine shutting down", "The lighting engine is stopping")
        }
        InfoKind::None
        | InfoKind::FixtureTypesUpdated
        | InfoKind::UniversesUpdated
        | InfoKind::EndpointConfigChanged
        | InfoKind::UniversePatchChanged { .. } => return None,
    };
    Some(notification)
}

/// Subscribe `sink` to `cell`, pushing a notification for every event
/// [`notification_for`] maps.
///
/// Only events published after the call are forwarded; the cell's current
/// value is an event that already happened.
pub fn forward_events<S>(cell: &EventCell, sink: S) -> Subscription
where
    S: NotificationSink + Send + Sync + 'static,
{
    cell.subscribe_updates(move |kind| {
        if let Some(notification) = notification_for(kind) {
            sink.notify(notification);
        }
    })
}
