//! A concurrent, resumable download engine for WADO-URI and WADO-RS DICOM
//! imaging series.
//!
//! Given a [`model::SeriesRef`] describing a series' instances and the
//! endpoint to fetch them from, [`manager::DownloadManager`] downloads every
//! instance under a bounded concurrency, writes each into a local cache
//! directory with tmp-then-rename semantics, deduplicates against
//! multiframe siblings and the caller's object model, and reports progress
//! and completion through an event bus. Authentication is delegated to an
//! [`auth::AuthMethod`] supplied by the host, refreshed on demand and
//! coalesced across concurrent requests.
//!
//! ```no_run
//! use std::sync::Arc;
//! use wado_engine::adapter::reference::InMemoryObjectModel;
//! use wado_engine::config::WadoEngineConfig;
//! use wado_engine::events::EventBus;
//! use wado_engine::manager::DownloadManager;
//! use wado_engine::model::{OpeningStrategy, SeriesRef, SopInstanceRef, WadoEndpoint};
//! use wado_engine::task::new_task;
//! use wado_engine::transport::Transport;
//!
//! async fn fetch_one_series() {
//!     let config = Arc::new(WadoEngineConfig::default());
//!     let transport = Arc::new(
//!         Transport::new(config.connect_timeout(), config.read_timeout(), config.max_redirects, None)
//!             .unwrap(),
//!     );
//!     let bus = EventBus::default();
//!     let adapter = Arc::new(InMemoryObjectModel::new(bus));
//!
//!     let endpoint = WadoEndpoint::new("http://pacs.example.org/wado").wado_rs(true);
//!     let mut series = SeriesRef::new("1.2.3", "1.2.2", "1.2.1", endpoint);
//!     series.instances.push(SopInstanceRef::new("1.2.3.1"));
//!
//!     let (task, handle) = new_task(series, OpeningStrategy::Eager);
//!     let manager = DownloadManager::new(transport, adapter, config);
//!     manager.run(&task, &handle).await;
//! }
//! ```

pub mod adapter;
pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod model;
pub mod multipart;
pub mod rewriter;
pub mod scheduler;
pub mod task;
pub mod transport;
