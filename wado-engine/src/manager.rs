//! The series download manager — the engine's core.
//!
//! Owns one [`crate::task::LoadSeriesTask`] end to end: it orders the
//! series' instances, downloads each one under a per-series concurrency
//! limit held for the task's whole lifetime, deduplicates against
//! multiframe siblings and the host's object model, writes instances into
//! the cache with tmp-then-rename semantics, reconciles the series' parent
//! metadata against the first successfully downloaded instance, and
//! publishes events as instances complete.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dicom_core::Tag;
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, OnceCell, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::adapter::ObjectModelAdapter;
use crate::config::WadoEngineConfig;
use crate::error::{
    CacheIoSnafu, DecodeError, JobError, NetworkUnavailableSnafu, RewriteError, TransientHttpSnafu,
};
use crate::events::DownloadEvent;
use crate::model::{
    CacheEntry, JobStatus, Progress, SeriesRef, SopInstanceRef, TaskStatus, WadoEndpoint,
};
use crate::multipart::{boundary_from_content_type, MultipartReader};
use crate::rewriter::{self, TagOverride, TagValueSource};
use crate::scheduler::midpoint_of_largest_gap_order;
use crate::task::{LoadSeriesTask, TaskHandle};
use crate::transport::{byte_stream, Transport};

/// The transfer syntax requested on the one-shot retry after the rewriter
/// reports [`RewriteError::UnsupportedTsuid`]: Explicit VR Little Endian,
/// which every conformant DICOM receiver supports.
const DEFAULT_TRANSFER_SYNTAX: &str = "1.2.840.10008.1.2.1";

const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);

/// Everything one [`DownloadManager::run`] invocation needs that is shared
/// across every job it spawns for a series.
pub struct DownloadManager {
    transport: Arc<Transport>,
    adapter: Arc<dyn ObjectModelAdapter>,
    config: Arc<WadoEngineConfig>,
}

impl DownloadManager {
    pub fn new(
        transport: Arc<Transport>,
        adapter: Arc<dyn ObjectModelAdapter>,
        config: Arc<WadoEngineConfig>,
    ) -> Self {
        DownloadManager {
            transport,
            adapter,
            config,
        }
    }

    /// Runs a series' task to completion (or cancellation). Intended to be
    /// spawned as its own tokio task by the scheduler once a concurrency
    /// permit is available for it.
    pub async fn run(&self, task: &LoadSeriesTask, handle: &TaskHandle) {
        let series = task.series();
        let cancel = task.cancellation_token();
        let mut pause_rx = task.pause_receiver();

        handle.set_status(TaskStatus::Downloading);
        let _ = self
            .adapter
            .publish(DownloadEvent::LoadingStart {
                series_instance_uid: series.series_instance_uid.clone(),
            })
            .await;

        let overrides = Arc::new(self.resolve_overrides(series).await);
        let order = midpoint_of_largest_gap_order(series.len());
        let permits = Arc::new(Semaphore::new(self.config.series_concurrency.max(1)));
        let completed = Arc::new(AtomicUsize::new(0));
        let reconciled: Arc<OnceCell<()>> = Arc::new(OnceCell::new());
        let mut errored = false;
        let mut seen_multiframe_sop: Option<String> = None;

        let mut join_set = tokio::task::JoinSet::new();

        for index in order {
            if cancel.is_cancelled() {
                break;
            }
            let Some(instance) = series.instances.get(index) else {
                continue;
            };

            // Skip subsequent frames of a multiframe instance once one frame
            // of it has already been scheduled: the manager downloads a
            // multiframe object once and the host slices frames out of the
            // local copy.
            if series.contains_multiframes && instance.frame.is_some() {
                if seen_multiframe_sop.as_deref() == Some(instance.sop_instance_uid.as_str()) {
                    continue;
                }
                seen_multiframe_sop = Some(instance.sop_instance_uid.clone());
            }

            // Cross-split-series UID dedup: the adapter knows about
            // sibling series under the same study, so a single
            // `has_media_with_uid` call covers both "already in this
            // series" and "already in a split sibling".
            if self
                .adapter
                .has_media_with_uid(&instance.sop_instance_uid)
                .await
            {
                debug!(sop_instance_uid = %instance.sop_instance_uid, "skipping duplicate instance");
                completed.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            wait_while_paused(&mut pause_rx, &cancel, handle).await;
            if cancel.is_cancelled() {
                break;
            }

            let permit = permits.clone().acquire_owned().await.expect("semaphore open");
            let transport = self.transport.clone();
            let adapter = self.adapter.clone();
            let config = self.config.clone();
            let series_uid = series.series_instance_uid.clone();
            let patient_pseudo_uid = series.patient_pseudo_uid.clone();
            let study_instance_uid = series.study_instance_uid.clone();
            let endpoint = series.endpoint.clone();
            let instance = instance.clone();
            let child_cancel = cancel.clone();
            let completed = completed.clone();
            let overrides = overrides.clone();
            let reconciled = reconciled.clone();
            let total = series.len();

            join_set.spawn(async move {
                let _permit = permit;
                let result = download_one(
                    &transport,
                    &config,
                    &endpoint,
                    &series_uid,
                    &study_instance_uid,
                    &instance,
                    overrides.as_ref(),
                    &child_cancel,
                )
                .await;
                match &result {
                    Ok(entry) => {
                        // The first successful instance of the series
                        // reconciles the in-memory patient/study UIDs
                        // against the file's actual header before any `Add`
                        // is published; the `OnceCell` makes every other
                        // racing job await the same reconciliation rather
                        // than repeat it.
                        let path = entry.path.clone();
                        reconciled
                            .get_or_init(|| {
                                reconcile_parent(
                                    adapter.clone(),
                                    series_uid.clone(),
                                    patient_pseudo_uid,
                                    study_instance_uid,
                                    path,
                                )
                            })
                            .await;

                        adapter
                            .publish(DownloadEvent::Add {
                                series_instance_uid: series_uid.clone(),
                                instance: instance.clone(),
                                path: entry.path.clone(),
                            })
                            .await;
                    }
                    Err(JobError::JobCancelled) => {}
                    Err(err) => {
                        warn!(sop_instance_uid = %instance.sop_instance_uid, error = %err, "instance download failed");
                    }
                }
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                (result, done, total)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            let Ok((result, done, total)) = joined else {
                errored = true;
                handle.record_error();
                continue;
            };
            handle.set_progress(Progress {
                current: done,
                max: total,
                indeterminate: false,
            });
            match result {
                Ok(_) => {}
                Err(_) => {
                    errored = true;
                    handle.record_error();
                }
            }
        }

        let final_status = if cancel.is_cancelled() {
            TaskStatus::Cancelled
        } else if errored {
            TaskStatus::Error
        } else {
            TaskStatus::Complete
        };
        handle.set_status(final_status);

        self.adapter
            .publish(DownloadEvent::LoadingStop {
                series_instance_uid: series.series_instance_uid.clone(),
                succeeded: final_status == TaskStatus::Complete,
            })
            .await;
        if matches!(final_status, TaskStatus::Cancelled) {
            self.adapter
                .publish(DownloadEvent::LoadingCancel {
                    series_instance_uid: series.series_instance_uid.clone(),
                })
                .await;
        }
    }

    /// Resolves the series' endpoint-configured tag overrides into concrete
    /// patient/study values up front, once per series rather than once per
    /// instance: the values are the same for every instance in the series.
    async fn resolve_overrides(&self, series: &SeriesRef) -> Vec<TagOverride> {
        let mut overrides = Vec::with_capacity(series.endpoint.tag_overrides.len());
        for tag in &series.endpoint.tag_overrides {
            let (patient_value, study_value) = self
                .adapter
                .tag_value(&series.series_instance_uid, *tag)
                .await;
            overrides.push(TagOverride {
                tag: *tag,
                patient_value,
                study_value,
            });
        }
        overrides
    }
}

/// Reads the patient/study UIDs actually recorded in the first downloaded
/// file and, if either differs from what the series was enumerated with,
/// asks the adapter to merge the groups. This reconciles a worklist entry
/// against the real image headers, e.g. after anonymization changed the
/// patient UID server-side.
async fn reconcile_parent(
    adapter: Arc<dyn ObjectModelAdapter>,
    series_instance_uid: String,
    expected_patient_uid: String,
    expected_study_instance_uid: String,
    path: PathBuf,
) {
    let read = tokio::task::spawn_blocking(move || {
        let object = dicom_object::open_file(&path).ok()?;
        let patient = object
            .element(PATIENT_ID)
            .ok()
            .and_then(|e| e.value().to_str().ok())
            .map(|c| c.into_owned());
        let study = object
            .element(STUDY_INSTANCE_UID)
            .ok()
            .and_then(|e| e.value().to_str().ok())
            .map(|c| c.into_owned());
        Some((patient, study))
    })
    .await
    .ok()
    .flatten();

    let Some((patient, study)) = read else {
        return;
    };

    let mut changed = false;
    if let Some(patient) = &patient {
        if !patient.is_empty() && patient != &expected_patient_uid {
            adapter.merge_patient_uid(&series_instance_uid, patient).await;
            changed = true;
        }
    }
    if let Some(study) = &study {
        if !study.is_empty() && study != &expected_study_instance_uid {
            adapter.merge_study_uid(&series_instance_uid, study).await;
            changed = true;
        }
    }

    if changed {
        adapter
            .publish(DownloadEvent::UpdateParent {
                series_instance_uid,
                patient_uid: patient.unwrap_or(expected_patient_uid),
                study_instance_uid: study.unwrap_or(expected_study_instance_uid),
            })
            .await;
    }
}

/// Blocks the dispatch loop while the task is paused, reporting
/// [`TaskStatus::Paused`]/`Downloading` as it enters and leaves the wait.
/// `paused` is reversible and does not cancel in-flight work, it only
/// withholds new jobs.
async fn wait_while_paused(
    pause_rx: &mut watch::Receiver<bool>,
    cancel: &CancellationToken,
    handle: &TaskHandle,
) {
    if !*pause_rx.borrow() {
        return;
    }
    handle.set_status(TaskStatus::Paused);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = pause_rx.changed() => {
                if changed.is_err() || !*pause_rx.borrow() {
                    break;
                }
            }
        }
    }
    if !cancel.is_cancelled() {
        handle.set_status(TaskStatus::Downloading);
    }
}

async fn download_one(
    transport: &Transport,
    config: &WadoEngineConfig,
    endpoint: &WadoEndpoint,
    series_instance_uid: &str,
    study_instance_uid: &str,
    instance: &SopInstanceRef,
    overrides: &[TagOverride],
    cancel: &CancellationToken,
) -> Result<CacheEntry, JobError> {
    std::fs::create_dir_all(config.downloading_dir()).context(CacheIoSnafu {
        path: config.downloading_dir().display().to_string(),
    })?;
    std::fs::create_dir_all(&config.export_dir).context(CacheIoSnafu {
        path: config.export_dir.display().to_string(),
    })?;

    let tmp_path = config
        .downloading_dir()
        .join(format!("{}.part", uuid::Uuid::new_v4()));
    let final_path = config
        .export_dir
        .join(format!("{}.dcm", sanitize(&instance.sop_instance_uid)));

    let mut url = build_url(endpoint, series_instance_uid, study_instance_uid, instance);
    let mut retry_with_default_tsuid = true;

    loop {
        let headers = vec![(
            "Accept".to_string(),
            if endpoint.wado_rs {
                "multipart/related; type=\"application/dicom\"".to_string()
            } else {
                "application/dicom".to_string()
            },
        )];

        let response = transport
            .get(&url, &headers, cancel)
            .await
            .context(TransientHttpSnafu)?;

        let write_result = if endpoint.wado_rs {
            write_wado_rs(response, &tmp_path, overrides).await
        } else {
            write_wado_uri(response, &tmp_path, &url, overrides).await
        };

        match write_result {
            Ok(()) => break,
            Err(JobError::Decode {
                source: DecodeError::UnsupportedTransferSyntax { .. },
            }) if retry_with_default_tsuid => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                url = force_transfer_syntax(&url, DEFAULT_TRANSFER_SYNTAX);
                retry_with_default_tsuid = false;
                continue;
            }
            Err(err) => {
                let _ = tokio::fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        }
    }

    if config.write_in_cache {
        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .context(CacheIoSnafu {
                path: final_path.display().to_string(),
            })?;
    } else {
        tokio::fs::copy(&tmp_path, &final_path)
            .await
            .context(CacheIoSnafu {
                path: final_path.display().to_string(),
            })?;
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }

    Ok(CacheEntry {
        path: final_path,
        source: instance.clone(),
        is_temp: !config.write_in_cache,
    })
}

/// Writes a WADO-URI response's single DICOM body to `tmp_path`.
///
/// The body is always routed through the rewriter, even with an empty
/// override list: this is what lets a transfer-syntax failure surface
/// uniformly as [`JobError::Decode`] regardless of whether the endpoint
/// configured tag overrides, which the fallback-retry guarantee needs (see
/// DESIGN.md).
async fn write_wado_uri(
    response: reqwest::Response,
    tmp_path: &Path,
    url: &str,
    overrides: &[TagOverride],
) -> Result<(), JobError> {
    let bytes = response
        .bytes()
        .await
        .context(NetworkUnavailableSnafu { url: url.to_string() })
        .context(TransientHttpSnafu)?;
    rewrite_bytes(&bytes, tmp_path, overrides)
}

/// Writes a WADO-RS `multipart/related` response to `tmp_path`. The first
/// part is parsed and rewritten; any further parts (the rare multi-part
/// case) are appended to the target verbatim, without reparsing.
async fn write_wado_rs(
    response: reqwest::Response,
    tmp_path: &Path,
    overrides: &[TagOverride],
) -> Result<(), JobError> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let boundary = boundary_from_content_type(&content_type)
        .map_err(|source| JobError::Decode { source: DecodeError::MalformedMultipart { source } })?;

    let stream = byte_stream(response);
    let mut reader = MultipartReader::new(stream, &boundary);
    reader
        .skip_first_boundary()
        .await
        .map_err(|source| JobError::Decode { source: DecodeError::MalformedMultipart { source } })?;

    let mut first_part = Vec::new();
    {
        let _headers = reader
            .read_headers()
            .await
            .map_err(|source| JobError::Decode { source: DecodeError::MalformedMultipart { source } })?;
        let mut part = reader.new_part_input_stream();
        while let Some(chunk) = part
            .read_chunk()
            .await
            .map_err(|source| JobError::Decode { source: DecodeError::MalformedMultipart { source } })?
        {
            first_part.extend_from_slice(&chunk);
        }
    }
    rewrite_bytes(&first_part, tmp_path, overrides)?;

    while reader
        .read_boundary()
        .await
        .map_err(|source| JobError::Decode { source: DecodeError::MalformedMultipart { source } })?
    {
        let _headers = reader
            .read_headers()
            .await
            .map_err(|source| JobError::Decode { source: DecodeError::MalformedMultipart { source } })?;
        let mut extra = Vec::new();
        {
            let mut part = reader.new_part_input_stream();
            while let Some(chunk) = part
                .read_chunk()
                .await
                .map_err(|source| JobError::Decode { source: DecodeError::MalformedMultipart { source } })?
            {
                extra.extend_from_slice(&chunk);
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(tmp_path)
            .await
            .context(CacheIoSnafu {
                path: tmp_path.display().to_string(),
            })?;
        file.write_all(&extra).await.context(CacheIoSnafu {
            path: tmp_path.display().to_string(),
        })?;
    }

    Ok(())
}

fn rewrite_bytes(bytes: &[u8], tmp_path: &Path, overrides: &[TagOverride]) -> Result<(), JobError> {
    let source = FixedOverrides(overrides.to_vec());
    rewriter::rewrite(std::io::Cursor::new(bytes.to_vec()), tmp_path, &source).map_err(|source| {
        match source {
            RewriteError::UnsupportedTsuid { uid } => JobError::Decode {
                source: DecodeError::UnsupportedTransferSyntax { uid },
            },
            other => JobError::Decode {
                source: DecodeError::Rewrite { source: other },
            },
        }
    })
}

struct FixedOverrides(Vec<TagOverride>);

impl TagValueSource for FixedOverrides {
    fn overrides(&self) -> Vec<TagOverride> {
        self.0.clone()
    }
}

/// Replaces (or appends) the `transferSyntax` query parameter on `url`,
/// used for the one-shot fallback retry after an `UnsupportedTsuid` error.
fn force_transfer_syntax(url: &str, tsuid: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            let remaining: Vec<(String, String)> = parsed
                .query_pairs()
                .filter(|(k, _)| k != "transferSyntax")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            {
                let mut pairs = parsed.query_pairs_mut();
                pairs.clear();
                for (k, v) in &remaining {
                    pairs.append_pair(k, v);
                }
                pairs.append_pair("transferSyntax", tsuid);
            }
            parsed.to_string()
        }
        Err(_) => format!("{url}&transferSyntax={tsuid}"),
    }
}

fn build_url(
    endpoint: &WadoEndpoint,
    series_instance_uid: &str,
    study_instance_uid: &str,
    instance: &SopInstanceRef,
) -> String {
    if let Some(direct) = &instance.direct_url {
        return direct.clone();
    }
    let mut url = if endpoint.wado_rs {
        format!(
            "{}/series/{}/instances/{}",
            endpoint.base_url, series_instance_uid, instance.sop_instance_uid
        )
    } else {
        let mut url = format!("{}?requestType=WADO", endpoint.base_url);
        if !endpoint.sop_only {
            url.push_str(&format!(
                "&studyUID={}&seriesUID={}",
                study_instance_uid, series_instance_uid
            ));
        }
        url.push_str(&format!(
            "&objectUID={}&contentType=application%2Fdicom",
            instance.sop_instance_uid
        ));
        url
    };
    if let Some(frame) = instance.frame {
        url.push_str(&format!("/frames/{frame}"));
    }
    if !endpoint.additional_query.is_empty() {
        url.push_str(&endpoint.additional_query);
    }
    url
}

fn sanitize(sop_instance_uid: &str) -> String {
    sop_instance_uid.chars().map(|c| if c == '/' { '_' } else { c }).collect()
}

/// A terminal job status along with the instance it concerned, used by
/// callers that want a per-instance report rather than only the aggregate
/// task status.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub instance: SopInstanceRef,
    pub status: JobStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_appends_frame_and_query() {
        let mut endpoint = WadoEndpoint::new("http://pacs/wado").wado_rs(true);
        endpoint.additional_query = "&contentType=application/dicom".to_string();
        let mut instance = SopInstanceRef::new("1.2.3");
        instance.frame = Some(2);
        let url = build_url(&endpoint, "9.9.9", "8.8.8", &instance);
        assert_eq!(
            url,
            "http://pacs/wado/series/9.9.9/instances/1.2.3/frames/2&contentType=application/dicom"
        );
    }

    #[test]
    fn build_url_prefers_direct_url_when_present() {
        let endpoint = WadoEndpoint::new("http://pacs/wado");
        let mut instance = SopInstanceRef::new("1.2.3");
        instance.direct_url = Some("http://pacs/other/1.2.3".to_string());
        let url = build_url(&endpoint, "9.9.9", "8.8.8", &instance);
        assert_eq!(url, "http://pacs/other/1.2.3");
    }

    #[test]
    fn build_url_includes_study_and_series_uid_for_wado_uri() {
        let endpoint = WadoEndpoint::new("http://pacs/wado");
        let instance = SopInstanceRef::new("1.2.3");
        let url = build_url(&endpoint, "9.9.9", "8.8.8", &instance);
        assert_eq!(
            url,
            "http://pacs/wado?requestType=WADO&studyUID=8.8.8&seriesUID=9.9.9&objectUID=1.2.3&contentType=application%2Fdicom"
        );
    }

    #[test]
    fn build_url_omits_study_and_series_uid_when_sop_only() {
        let endpoint = WadoEndpoint::new("http://pacs/wado").sop_only(true);
        let instance = SopInstanceRef::new("1.2.3");
        let url = build_url(&endpoint, "9.9.9", "8.8.8", &instance);
        assert_eq!(
            url,
            "http://pacs/wado?requestType=WADO&objectUID=1.2.3&contentType=application%2Fdicom"
        );
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize("1.2/3"), "1.2_3");
    }

    #[test]
    fn force_transfer_syntax_replaces_existing_parameter() {
        let url = "http://pacs/wado?requestType=WADO&objectUID=1.2.3&transferSyntax=1.2.840.10008.1.2.4.70";
        let replaced = force_transfer_syntax(url, DEFAULT_TRANSFER_SYNTAX);
        assert!(replaced.contains("transferSyntax=1.2.840.10008.1.2.1"));
        assert!(!replaced.contains("1.2.4.70"));
        assert!(replaced.contains("objectUID=1.2.3"));
    }

    #[test]
    fn force_transfer_syntax_appends_when_absent() {
        let url = "http://pacs/wado?requestType=WADO&objectUID=1.2.3";
        let replaced = force_transfer_syntax(url, DEFAULT_TRANSFER_SYNTAX);
        assert!(replaced.contains("transferSyntax=1.2.840.10008.1.2.1"));
        assert!(replaced.contains("objectUID=1.2.3"));
    }
}
