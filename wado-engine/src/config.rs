//! Engine configuration, layered the way `dicom-rst`'s `ApplicationConfig`
//! is: compiled-in defaults, an optional TOML file, then environment
//! variables (prefix `WADO_ENGINE_`) taking precedence over both.

use std::path::PathBuf;

use serde::Deserialize;

/// The engine's tunables, plus the tmp-root/export-dir settings needed to
/// make the cache layout concrete.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WadoEngineConfig {
    /// `UrlConnectionTimeout`: connect timeout in milliseconds.
    pub url_connection_timeout_ms: u64,
    /// `UrlReadTimeout`: socket read timeout in milliseconds.
    pub url_read_timeout_ms: u64,
    /// `SeriesConcurrency`: max parallel downloads per series.
    pub series_concurrency: usize,
    /// `GlobalSeriesConcurrency`: max parallel series across the scheduler.
    pub global_series_concurrency: usize,
    /// `WriteInCache`: stage to a tmp file then rename into the export dir.
    pub write_in_cache: bool,
    /// `MaxRedirects`: transport redirect cap.
    pub max_redirects: u32,
    /// Root of the process-owned tmp tree; `downloading/` lives under it.
    pub tmp_root: PathBuf,
    /// Directory instances are renamed into once complete.
    pub export_dir: PathBuf,
}

impl Default for WadoEngineConfig {
    fn default() -> Self {
        WadoEngineConfig {
            url_connection_timeout_ms: 5_000,
            url_read_timeout_ms: 15_000,
            series_concurrency: 6,
            global_series_concurrency: 3,
            write_in_cache: true,
            max_redirects: 3,
            tmp_root: std::env::temp_dir().join("wado-engine"),
            export_dir: std::env::temp_dir().join("wado-engine").join("export"),
        }
    }
}

impl WadoEngineConfig {
    /// Load configuration, layering an optional `config.toml` in the
    /// current directory and `WADO_ENGINE_*` environment variables over the
    /// built-in defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let s = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::with_name("config.toml").required(false))
            .add_source(config::Environment::with_prefix("WADO_ENGINE").separator("_"))
            .build()?;
        s.try_deserialize()
    }

    pub fn downloading_dir(&self) -> PathBuf {
        self.tmp_root.join("downloading")
    }

    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.url_connection_timeout_ms)
    }

    pub fn read_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.url_read_timeout_ms)
    }
}

// `config::Config::try_from` requires `Serialize` on the source; rather
// than pull in a second derive we provide the defaults as a literal TOML
// source instead of relying on struct serialization.
impl serde::Serialize for WadoEngineConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("WadoEngineConfig", 8)?;
        s.serialize_field("url_connection_timeout_ms", &self.url_connection_timeout_ms)?;
        s.serialize_field("url_read_timeout_ms", &self.url_read_timeout_ms)?;
        s.serialize_field("series_concurrency", &self.series_concurrency)?;
        s.serialize_field(
            "global_series_concurrency",
            &self.global_series_concurrency,
        )?;
        s.serialize_field("write_in_cache", &self.write_in_cache)?;
        s.serialize_field("max_redirects", &self.max_redirects)?;
        s.serialize_field("tmp_root", &self.tmp_root)?;
        s.serialize_field("export_dir", &self.export_dir)?;
        s.end()
    }
}
