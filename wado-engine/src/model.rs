//! The value types shared by every layer of the download engine: endpoints,
//! series/instance references, cache entries and the scheduler's priority key.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::Instant;

/// Describes how a series' instances are to be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WadoEndpoint {
    /// Absolute base URL (e.g. `http://pacs.example.org/wado`).
    pub base_url: String,
    /// Extra query string appended to every request, starting with `&`,
    /// or empty.
    pub additional_query: String,
    /// `true` for WADO-RS (multipart), `false` for WADO-URI (single object).
    pub wado_rs: bool,
    /// When set, `studyUID`/`seriesUID` are omitted from WADO-URI requests.
    pub sop_only: bool,
    /// Top-level tags to override with patient/study metadata on download.
    pub tag_overrides: Vec<dicom_core::Tag>,
}

impl WadoEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        WadoEndpoint {
            base_url: base_url.into(),
            additional_query: String::new(),
            wado_rs: false,
            sop_only: false,
            tag_overrides: Vec::new(),
        }
    }

    pub fn wado_rs(mut self, wado_rs: bool) -> Self {
        self.wado_rs = wado_rs;
        self
    }

    pub fn sop_only(mut self, sop_only: bool) -> Self {
        self.sop_only = sop_only;
        self
    }

    pub fn with_tag_overrides(mut self, tags: Vec<dicom_core::Tag>) -> Self {
        self.tag_overrides = tags;
        self
    }
}

/// One DICOM object referenced by a series, possibly a single frame of a
/// multiframe instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SopInstanceRef {
    pub sop_instance_uid: String,
    pub frame: Option<u32>,
    /// A URL relative to the endpoint that can be downloaded directly,
    /// bypassing the usual WADO-URI/WADO-RS URL construction.
    pub direct_url: Option<String>,
}

impl SopInstanceRef {
    pub fn new(sop_instance_uid: impl Into<String>) -> Self {
        SopInstanceRef {
            sop_instance_uid: sop_instance_uid.into(),
            frame: None,
            direct_url: None,
        }
    }

    /// The (uid, frame) identity used for intra-series deduplication.
    pub fn identity(&self) -> (&str, Option<u32>) {
        (&self.sop_instance_uid, self.frame)
    }
}

/// The enumerated instances of one DICOM series and the endpoint used to
/// retrieve them.
#[derive(Debug, Clone)]
pub struct SeriesRef {
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub patient_pseudo_uid: String,
    pub instances: Vec<SopInstanceRef>,
    pub contains_multiframes: bool,
    pub preferred_transfer_syntax: Option<String>,
    pub endpoint: WadoEndpoint,
}

impl SeriesRef {
    pub fn new(
        series_instance_uid: impl Into<String>,
        study_instance_uid: impl Into<String>,
        patient_pseudo_uid: impl Into<String>,
        endpoint: WadoEndpoint,
    ) -> Self {
        SeriesRef {
            series_instance_uid: series_instance_uid.into(),
            study_instance_uid: study_instance_uid.into(),
            patient_pseudo_uid: patient_pseudo_uid.into(),
            instances: Vec::new(),
            contains_multiframes: false,
            preferred_transfer_syntax: None,
            endpoint,
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// A locally-written copy of a DICOM instance.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub source: SopInstanceRef,
    pub is_temp: bool,
}

/// Handle used by the scheduler to order competing series downloads.
///
/// Total order: the "currently selected" bit beats everything else, then
/// patient/study/series UIDs, then a monotonic enqueue sequence breaks ties
/// for otherwise-equal keys so FIFO order is preserved among peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityKey {
    pub is_user_selected: bool,
    pub patient: String,
    pub study: String,
    pub series: String,
    pub weight: i64,
    pub enqueue_seq: u64,
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the *highest priority* item on
        // top, so "greater" here means "should be served sooner".
        other
            .is_user_selected
            .cmp(&self.is_user_selected)
            .then_with(|| self.patient.cmp(&other.patient))
            .then_with(|| self.study.cmp(&other.study))
            .then_with(|| self.series.cmp(&other.series))
            .then_with(|| other.weight.cmp(&self.weight))
            .then_with(|| self.enqueue_seq.cmp(&other.enqueue_seq))
            .reverse()
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Strategy hint for how a `LoadSeriesTask` should behave once opened by the
/// host (kept opaque to the engine, which only threads it through).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpeningStrategy {
    /// Open as soon as the first instance is available.
    Eager,
    /// Wait for the whole series before surfacing it to the host.
    WholeSeries,
}

impl Default for OpeningStrategy {
    fn default() -> Self {
        OpeningStrategy::Eager
    }
}

/// Monotonic status of a `LoadSeriesTask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Downloading,
    Paused,
    Complete,
    Error,
    Cancelled,
}

/// Monotonic status of a single `DownloadJob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Downloading,
    Complete,
    Error,
    Cancelled,
}

/// A snapshot of a task's progress counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub max: usize,
    pub indeterminate: bool,
}

impl Progress {
    pub fn new(max: usize) -> Self {
        Progress {
            current: 0,
            max,
            indeterminate: max < 3,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.max
    }
}

/// Wall-clock bookkeeping kept alongside a task, recorded with [`Instant`]
/// rather than a wall clock so duration arithmetic never depends on system
/// time adjustments.
#[derive(Debug, Clone, Copy)]
pub struct StartedAt(pub Instant);
