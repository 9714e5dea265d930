//! The event bus a [`crate::manager`] job publishes to, and a
//! [`crate::adapter::ObjectModelAdapter`] ultimately forwards into the host's
//! object model.

use tokio::sync::broadcast;

use crate::model::SopInstanceRef;

/// One lifecycle or data event raised while a series is loading.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// A task moved from queued to actively downloading.
    LoadingStart { series_instance_uid: String },
    /// A task finished, successfully or not.
    LoadingStop {
        series_instance_uid: String,
        succeeded: bool,
    },
    /// A task was cancelled by the host.
    LoadingCancel { series_instance_uid: String },
    /// One instance finished downloading and is available at `path`.
    Add {
        series_instance_uid: String,
        instance: SopInstanceRef,
        path: std::path::PathBuf,
    },
    /// The owning patient or study UID for a series was reconciled against
    /// an existing local object, and the series should be re-parented.
    UpdateParent {
        series_instance_uid: String,
        patient_uid: String,
        study_instance_uid: String,
    },
    /// An instance that was previously added should be discarded (e.g. it
    /// turned out to duplicate one already present under a sibling split
    /// series).
    Remove {
        series_instance_uid: String,
        instance: SopInstanceRef,
    },
}

/// A cheap-to-clone publisher; every subscriber receives every event.
/// Lagging subscribers drop the oldest events rather than stall the sender,
/// consistent with this being a best-effort notification channel rather than
/// the authoritative record (the cache directory is authoritative).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DownloadEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns `Ok` with the number of receivers that
    /// were still listening, or `Err` if there were none.
    pub fn publish(&self, event: DownloadEvent) -> Result<usize, DownloadEvent> {
        self.sender.send(event.clone()).map_err(|_| event)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DownloadEvent::LoadingStart {
            series_instance_uid: "1.2.3".to_string(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        matches!(event, DownloadEvent::LoadingStart { .. });
    }

    #[test]
    fn publish_with_no_subscribers_reports_the_event_back() {
        let bus = EventBus::new(16);
        let result = bus.publish(DownloadEvent::LoadingCancel {
            series_instance_uid: "1.2.3".to_string(),
        });
        assert!(result.is_err());
    }
}
