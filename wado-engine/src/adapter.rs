//! The seam between the engine and the host's clinical object model.
//! The engine only ever asks three questions of it: who is the parent of
//! this series, does this SOP instance already exist somewhere in the
//! model, and here is an event to record. The host can plug in whatever
//! patient/study/series hierarchy it actually keeps without the engine
//! knowing its shape.

use async_trait::async_trait;
use dicom_core::{PrimitiveValue, Tag};

use crate::events::DownloadEvent;

/// A patient/study pair a series is reconciled against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    pub patient_uid: String,
    pub study_instance_uid: String,
}

/// The object model seam a [`crate::manager::DownloadManager`] calls into to
/// reconcile an in-flight series against what the host already knows.
#[async_trait]
pub trait ObjectModelAdapter: Send + Sync {
    /// Resolves the owning patient/study for a series, if the host has
    /// already recorded one (e.g. from a prior QIDO-RS query).
    async fn get_parent(&self, series_instance_uid: &str) -> Option<ParentRef>;

    /// Reports whether a SOP instance UID is already present anywhere in the
    /// host's model, used to detect duplicates across split series.
    async fn has_media_with_uid(&self, sop_instance_uid: &str) -> bool;

    /// Merges a newly-discovered patient UID for a series with whatever the
    /// host already has on file. Patient-level identity always wins over a
    /// study-level guess (see DESIGN.md).
    async fn merge_patient_uid(&self, series_instance_uid: &str, patient_uid: &str);

    /// Merges a newly-discovered study UID for a series, following the same
    /// precedence as [`ObjectModelAdapter::merge_patient_uid`].
    async fn merge_study_uid(&self, series_instance_uid: &str, study_instance_uid: &str);

    /// Resolves the authoritative value of a tag-override candidate at both
    /// the patient and study level for a series, so the
    /// [`crate::rewriter`] can write it in place of whatever the server
    /// sent. Either side may be absent if the host has no value on file;
    /// precedence between the two is the rewriter's concern, not the
    /// adapter's.
    async fn tag_value(
        &self,
        series_instance_uid: &str,
        tag: Tag,
    ) -> (Option<PrimitiveValue>, Option<PrimitiveValue>);

    /// Publishes one lifecycle or data event to the host.
    async fn publish(&self, event: DownloadEvent);
}

/// An in-memory [`ObjectModelAdapter`] sufficient for tests and the
/// demonstration CLI; not meant to back a real clinical object model.
pub mod reference {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;
    use crate::events::EventBus;

    #[derive(Default)]
    struct State {
        parents: HashMap<String, ParentRef>,
        known_sop_uids: HashSet<String>,
        patient_values: HashMap<(String, Tag), PrimitiveValue>,
        study_values: HashMap<(String, Tag), PrimitiveValue>,
    }

    pub struct InMemoryObjectModel {
        state: Mutex<State>,
        bus: EventBus,
    }

    impl InMemoryObjectModel {
        pub fn new(bus: EventBus) -> Self {
            InMemoryObjectModel {
                state: Mutex::new(State::default()),
                bus,
            }
        }

        pub fn seed_parent(&self, series_instance_uid: &str, parent: ParentRef) {
            self.state
                .lock()
                .unwrap()
                .parents
                .insert(series_instance_uid.to_string(), parent);
        }

        pub fn seed_known_sop_uid(&self, sop_instance_uid: &str) {
            self.state
                .lock()
                .unwrap()
                .known_sop_uids
                .insert(sop_instance_uid.to_string());
        }

        pub fn seed_patient_value(&self, series_instance_uid: &str, tag: Tag, value: PrimitiveValue) {
            self.state
                .lock()
                .unwrap()
                .patient_values
                .insert((series_instance_uid.to_string(), tag), value);
        }

        pub fn seed_study_value(&self, series_instance_uid: &str, tag: Tag, value: PrimitiveValue) {
            self.state
                .lock()
                .unwrap()
                .study_values
                .insert((series_instance_uid.to_string(), tag), value);
        }
    }

    #[async_trait]
    impl ObjectModelAdapter for InMemoryObjectModel {
        async fn get_parent(&self, series_instance_uid: &str) -> Option<ParentRef> {
            self.state.lock().unwrap().parents.get(series_instance_uid).cloned()
        }

        async fn has_media_with_uid(&self, sop_instance_uid: &str) -> bool {
            self.state.lock().unwrap().known_sop_uids.contains(sop_instance_uid)
        }

        async fn merge_patient_uid(&self, series_instance_uid: &str, patient_uid: &str) {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .parents
                .entry(series_instance_uid.to_string())
                .or_insert_with(|| ParentRef {
                    patient_uid: patient_uid.to_string(),
                    study_instance_uid: String::new(),
                });
            entry.patient_uid = patient_uid.to_string();
        }

        async fn merge_study_uid(&self, series_instance_uid: &str, study_instance_uid: &str) {
            let mut state = self.state.lock().unwrap();
            let entry = state
                .parents
                .entry(series_instance_uid.to_string())
                .or_insert_with(|| ParentRef {
                    patient_uid: String::new(),
                    study_instance_uid: study_instance_uid.to_string(),
                });
            entry.study_instance_uid = study_instance_uid.to_string();
        }

        async fn tag_value(
            &self,
            series_instance_uid: &str,
            tag: Tag,
        ) -> (Option<PrimitiveValue>, Option<PrimitiveValue>) {
            let state = self.state.lock().unwrap();
            let key = (series_instance_uid.to_string(), tag);
            (
                state.patient_values.get(&key).cloned(),
                state.study_values.get(&key).cloned(),
            )
        }

        async fn publish(&self, event: DownloadEvent) {
            let _ = self.bus.publish(event);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn duplicate_sop_uid_is_reported() {
            let model = InMemoryObjectModel::new(EventBus::new(4));
            model.seed_known_sop_uid("1.2.3.4");
            assert!(model.has_media_with_uid("1.2.3.4").await);
            assert!(!model.has_media_with_uid("9.9.9.9").await);
        }

        #[tokio::test]
        async fn merging_patient_uid_preserves_existing_study_uid() {
            let model = InMemoryObjectModel::new(EventBus::new(4));
            model.seed_parent(
                "1.1",
                ParentRef {
                    patient_uid: String::new(),
                    study_instance_uid: "2.2".to_string(),
                },
            );
            model.merge_patient_uid("1.1", "3.3").await;
            let parent = model.get_parent("1.1").await.unwrap();
            assert_eq!(parent.patient_uid, "3.3");
            assert_eq!(parent.study_instance_uid, "2.2");
        }

        #[tokio::test]
        async fn patient_value_is_returned_alongside_study_value() {
            use dicom_core::dicom_value;

            let model = InMemoryObjectModel::new(EventBus::new(4));
            let tag = Tag(0x0010, 0x0010);
            model.seed_patient_value("1.1", tag, dicom_value!(Str, "Doe^Jane"));
            model.seed_study_value("1.1", tag, dicom_value!(Str, "Doe^John"));

            let (patient, study) = model.tag_value("1.1", tag).await;
            assert_eq!(patient.unwrap().to_str(), "Doe^Jane");
            assert_eq!(study.unwrap().to_str(), "Doe^John");

            let (patient, _) = model.tag_value("unknown-series", tag).await;
            assert!(patient.is_none());
        }
    }
}
