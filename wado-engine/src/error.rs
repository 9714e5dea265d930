//! Per-layer error types, one `snafu`-derived enum per component as in
//! the rest of this workspace (see `dicom-object`'s `ReadError`/`WriteError`
//! for the same per-crate pattern).

use snafu::Snafu;

/// Errors raised by the HTTP transport.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    #[snafu(display("network unavailable while requesting {url}"))]
    NetworkUnavailable { url: String, source: reqwest::Error },
    #[snafu(display("request to {url} timed out"))]
    Timeout { url: String },
    #[snafu(display("server returned status {status} for {url}"))]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[snafu(display("too many redirects ({max}) resolving {url}"))]
    TooManyRedirects { url: String, max: u32 },
    #[snafu(display("redirect response from {url} carried no Location header"))]
    MissingLocation { url: String },
    #[snafu(display("request to {url} was cancelled"))]
    Cancelled { url: String },
}

/// Errors raised by the multipart/related reader.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum MultipartError {
    #[snafu(display("Content-Type header is missing or not multipart/related"))]
    MissingContentType,
    #[snafu(display("could not find a boundary parameter in Content-Type: {content_type}"))]
    MalformedBoundary { content_type: String },
    #[snafu(display("part header block exceeded the {limit}-byte cap"))]
    HeaderTooLarge { limit: usize },
    #[snafu(display("stream ended before the closing boundary"))]
    UnexpectedEof,
    #[snafu(display("failed to read from the underlying byte stream"))]
    StreamRead { source: reqwest::Error },
    #[snafu(display("part headers were not valid UTF-8"))]
    InvalidHeaderEncoding,
}

/// Errors raised by the DICOM stream rewriter.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RewriteError {
    #[snafu(display("transfer syntax {uid} is not supported"))]
    UnsupportedTsuid { uid: String },
    #[snafu(display("failed to parse the incoming DICOM dataset"))]
    Parse { source: dicom_object::ReadError },
    #[snafu(display("failed to write the DICOM dataset"))]
    Write { source: dicom_object::WriteError },
    #[snafu(display("I/O error while rewriting {path}"))]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Errors surfaced by a single `DownloadJob` inside the manager.
///
/// None of these fail the owning task; they are counted and published as
/// events. Only [`ManagerError::Cancelled`] and a fatal endpoint
/// configuration issue stop a task outright (see [`FatalError`]).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum JobError {
    #[snafu(display("transient HTTP failure"))]
    TransientHttp { source: TransportError },
    #[snafu(display("could not decode the response"))]
    Decode { source: DecodeError },
    #[snafu(display("job cancelled"))]
    JobCancelled,
    #[snafu(display("I/O failure writing {path} to cache"))]
    CacheIo { path: String, source: std::io::Error },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("malformed multipart response"))]
    MalformedMultipart { source: MultipartError },
    #[snafu(display("unsupported transfer syntax"))]
    UnsupportedTransferSyntax { uid: String },
    #[snafu(display("DICOM dataset was truncated"))]
    TruncatedDicom,
    #[snafu(display("failed to rewrite DICOM tags"))]
    Rewrite { source: RewriteError },
}

/// A condition that terminates a `LoadSeriesTask` abnormally.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FatalError {
    #[snafu(display("WADO endpoint configuration is invalid: {reason}"))]
    InvalidEndpoint { reason: String },
    #[snafu(display("process tmp directory is unavailable"))]
    TmpDirMissing { source: std::io::Error },
    #[snafu(display("disk is full"))]
    DiskFull,
}
