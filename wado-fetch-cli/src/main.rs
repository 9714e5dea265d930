//! Command-line front end for the WADO series download engine: fetches one
//! series' instances from a WADO-URI or WADO-RS endpoint into a local
//! directory, reporting progress the way `storescu` reports its C-STORE
//! transfers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dicom_core::Tag;
use indicatif::{ProgressBar, ProgressStyle};
use snafu::{Report, Whatever};
use tracing::{error, info, Level};

use wado_engine::adapter::reference::InMemoryObjectModel;
use wado_engine::config::WadoEngineConfig;
use wado_engine::events::{DownloadEvent, EventBus};
use wado_engine::manager::DownloadManager;
use wado_engine::model::{OpeningStrategy, SeriesRef, SopInstanceRef, WadoEndpoint};
use wado_engine::task::new_task;
use wado_engine::transport::Transport;

/// Fetch a DICOM series over WADO-URI/WADO-RS
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// base WADO endpoint URL (e.g. "http://pacs.example.org/wado")
    endpoint: String,
    /// SOP Instance UIDs to fetch, in enumeration order
    #[arg(required = true)]
    instances: Vec<String>,
    /// the series' own Series Instance UID
    #[arg(long = "series-uid")]
    series_instance_uid: String,
    /// the owning Study Instance UID
    #[arg(long = "study-uid")]
    study_instance_uid: String,
    /// the owning patient's pseudo UID, as already known to the host
    #[arg(long = "patient-uid")]
    patient_pseudo_uid: String,
    /// use WADO-RS (`multipart/related`) instead of WADO-URI
    #[arg(long = "wado-rs")]
    wado_rs: bool,
    /// extra query string appended to every request, e.g. "&foo=bar"
    #[arg(long = "additional-query", default_value = "")]
    additional_query: String,
    /// top-level tags to override with patient/study metadata, as
    /// "GGGG,EEEE" hex pairs; may be repeated
    #[arg(long = "tag-override")]
    tag_overrides: Vec<String>,
    /// directory instances are written into
    #[arg(long = "out", default_value = "./wado-out")]
    export_dir: PathBuf,
    /// max concurrent downloads within this series
    #[arg(long = "concurrency")]
    concurrency: Option<usize>,
    /// verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let app = App::parse();

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if app.verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .unwrap_or_else(|e| {
        eprintln!("[ERROR] could not set up global logging subscriber: {e}");
    });

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async move {
            run(app).await.unwrap_or_else(|e: Whatever| {
                error!("{}", Report::from_error(e));
                std::process::exit(-2);
            });
        });
}

async fn run(app: App) -> Result<(), Whatever> {
    use snafu::ResultExt;

    let App {
        endpoint,
        instances,
        series_instance_uid,
        study_instance_uid,
        patient_pseudo_uid,
        wado_rs,
        additional_query,
        tag_overrides,
        export_dir,
        concurrency,
        verbose: _,
    } = app;

    let tag_overrides = tag_overrides
        .iter()
        .map(|s| parse_tag(s))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Whatever::without_source(format!("invalid --tag-override value: {e}")))?;

    let mut config = WadoEngineConfig::default();
    config.export_dir = export_dir;
    if let Some(concurrency) = concurrency {
        config.series_concurrency = concurrency;
    }
    let config = Arc::new(config);

    let transport = Arc::new(
        Transport::new(config.connect_timeout(), config.read_timeout(), config.max_redirects, None)
            .whatever_context("could not build HTTP transport")?,
    );

    let bus = EventBus::default();
    let mut events = bus.subscribe();
    let adapter = Arc::new(InMemoryObjectModel::new(bus));

    let mut endpoint = WadoEndpoint::new(endpoint).wado_rs(wado_rs);
    endpoint.additional_query = additional_query;
    endpoint.tag_overrides = tag_overrides;

    let mut series = SeriesRef::new(
        series_instance_uid,
        study_instance_uid,
        patient_pseudo_uid,
        endpoint,
    );
    for instance in instances {
        series.instances.push(SopInstanceRef::new(instance));
    }

    let progress = ProgressBar::new(series.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let (mut task, handle) = new_task(series, OpeningStrategy::Eager);
    let manager = DownloadManager::new(transport, adapter, config);

    let progress_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                DownloadEvent::Add { instance, .. } => {
                    progress.inc(1);
                    progress.set_message(instance.sop_instance_uid);
                }
                DownloadEvent::LoadingStop { succeeded, .. } => {
                    if succeeded {
                        progress.finish_with_message("done");
                    } else {
                        progress.abandon_with_message("failed");
                    }
                    break;
                }
                DownloadEvent::LoadingCancel { .. } => {
                    progress.abandon_with_message("cancelled");
                    break;
                }
                _ => {}
            }
        }
    });

    manager.run(&task, &handle).await;
    let status = task.wait_terminal().await;
    let _ = progress_task.await;

    info!("series finished with status {:?}", status);
    if !matches!(status, wado_engine::model::TaskStatus::Complete) {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_tag(s: &str) -> Result<Tag, String> {
    let (group, element) = s
        .split_once(',')
        .ok_or_else(|| format!("expected GGGG,EEEE, got {s}"))?;
    let group = u16::from_str_radix(group.trim(), 16).map_err(|e| e.to_string())?;
    let element = u16::from_str_radix(element.trim(), 16).map_err(|e| e.to_string())?;
    Ok(Tag(group, element))
}
