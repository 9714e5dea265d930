//! A byte-level streaming parser for `multipart/related` responses.
//! Unlike a buffering multipart library, this reader never materializes a
//! whole part: DICOM instances carried in one part can be tens of MiB, so
//! only a small look-ahead window is ever held in memory.

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use snafu::ResultExt;

use crate::error::{
    HeaderTooLargeSnafu, InvalidHeaderEncodingSnafu, MalformedBoundarySnafu, MultipartError,
    StreamReadSnafu, UnexpectedEofSnafu,
};

const HEADER_CAP: usize = 8 * 1024;

/// Extracts the `boundary` parameter from a `multipart/related` Content-Type
/// header, per RFC 2046.
pub fn boundary_from_content_type(content_type: &str) -> Result<Vec<u8>, MultipartError> {
    let mime: mime::Mime = content_type
        .parse()
        .map_err(|_| MalformedBoundarySnafu { content_type }.build())?;
    if mime.type_() != "multipart" {
        return MalformedBoundarySnafu { content_type }.fail();
    }
    let boundary = mime
        .get_param("boundary")
        .ok_or_else(|| MalformedBoundarySnafu { content_type }.build())?;
    Ok(boundary.as_str().as_bytes().to_vec())
}

/// Sequential, lazy access to the parts of a `multipart/related` body.
pub struct MultipartReader<S> {
    stream: S,
    buf: BytesMut,
    stream_done: bool,
    delimiter: Vec<u8>,
    /// Set once `new_part_input_stream`'s reader has located the delimiter
    /// but `read_boundary` has not yet consumed it.
    at_delimiter: bool,
    pub closed: bool,
}

impl<S> MultipartReader<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    pub fn new(stream: S, boundary: &[u8]) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary);
        MultipartReader {
            stream,
            buf: BytesMut::new(),
            stream_done: false,
            delimiter,
            at_delimiter: false,
            closed: false,
        }
    }

    async fn fill(&mut self, want: usize) -> Result<(), MultipartError> {
        while self.buf.len() < want && !self.stream_done {
            match self.stream.next().await {
                Some(chunk_result) => {
                    let chunk = chunk_result.context(StreamReadSnafu)?;
                    self.buf.extend_from_slice(&chunk);
                }
                None => self.stream_done = true,
            }
        }
        Ok(())
    }

    /// Consumes any preamble and the first boundary line. Must be called
    /// before reading the first part.
    pub async fn skip_first_boundary(&mut self) -> Result<(), MultipartError> {
        // The first boundary has no leading CRLF.
        let marker = &self.delimiter[2..]; // "--boundary"
        loop {
            self.fill(marker.len() + 2).await?;
            if let Some(pos) = find(&self.buf, marker) {
                let _ = self.buf.split_to(pos + marker.len());
                break;
            }
            if self.stream_done {
                return UnexpectedEofSnafu.fail();
            }
            // keep filling; nothing matched yet in this window
            self.fill(self.buf.len() + 4096).await?;
        }
        self.consume_boundary_tail().await?;
        Ok(())
    }

    /// After the marker bytes (`--boundary`) are consumed, the line ends in
    /// either `--` (closing boundary) or a bare CRLF (more parts follow).
    async fn consume_boundary_tail(&mut self) -> Result<bool, MultipartError> {
        self.fill(2).await?;
        if self.buf.len() >= 2 && &self.buf[0..2] == b"--" {
            let _ = self.buf.split_to(2);
            self.closed = true;
            return Ok(false);
        }
        self.fill(2).await?;
        if self.buf.len() < 2 || &self.buf[0..2] != b"\r\n" {
            return UnexpectedEofSnafu.fail();
        }
        let _ = self.buf.split_to(2);
        Ok(true)
    }

    /// Reads and removes the part's header block (terminated by CRLFCRLF),
    /// capped at 8 KiB.
    pub async fn read_headers(&mut self) -> Result<Vec<(String, String)>, MultipartError> {
        loop {
            if let Some(pos) = find(&self.buf, b"\r\n\r\n") {
                let header_bytes = self.buf.split_to(pos);
                let _ = self.buf.split_to(4); // consume the CRLFCRLF
                let text = std::str::from_utf8(&header_bytes)
                    .map_err(|_| InvalidHeaderEncodingSnafu.build())?;
                let mut headers = Vec::new();
                for line in text.split("\r\n") {
                    if line.is_empty() {
                        continue;
                    }
                    if let Some((k, v)) = line.split_once(':') {
                        headers.push((k.trim().to_string(), v.trim().to_string()));
                    }
                }
                return Ok(headers);
            }
            if self.buf.len() > HEADER_CAP {
                return HeaderTooLargeSnafu { limit: HEADER_CAP }.fail();
            }
            if self.stream_done {
                return UnexpectedEofSnafu.fail();
            }
            self.fill(self.buf.len() + 4096).await?;
        }
    }

    /// Returns a handle that yields the current part's payload, chunk by
    /// chunk, until the next boundary is reached. The part must be fully
    /// drained (`read_chunk` returning `None`) before calling
    /// [`MultipartReader::read_boundary`].
    pub fn new_part_input_stream(&mut self) -> PartReader<'_, S> {
        PartReader { reader: self }
    }

    /// Advances past the boundary following the current part. Returns
    /// `false` once the closing boundary has been consumed (no more parts).
    pub async fn read_boundary(&mut self) -> Result<bool, MultipartError> {
        debug_assert!(self.at_delimiter, "read_boundary called before part drained");
        self.fill(self.delimiter.len()).await?;
        if find(&self.buf, &self.delimiter) != Some(0) {
            return UnexpectedEofSnafu.fail();
        }
        let _ = self.buf.split_to(self.delimiter.len());
        self.at_delimiter = false;
        self.consume_boundary_tail().await
    }
}

/// A cursor over one part's payload bytes.
pub struct PartReader<'a, S> {
    reader: &'a mut MultipartReader<S>,
}

impl<'a, S> PartReader<'a, S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    /// Returns the next chunk of the part's body, or `None` once the
    /// boundary has been reached.
    pub async fn read_chunk(&mut self) -> Result<Option<Bytes>, MultipartError> {
        let r = &mut *self.reader;
        if r.at_delimiter {
            return Ok(None);
        }
        loop {
            if let Some(pos) = find(&r.buf, &r.delimiter) {
                if pos == 0 {
                    r.at_delimiter = true;
                    return Ok(None);
                }
                let chunk = r.buf.split_to(pos);
                return Ok(Some(chunk.freeze()));
            }
            if r.stream_done {
                return UnexpectedEofSnafu.fail();
            }
            // Keep a safety margin so a delimiter split across two network
            // chunks is never missed: emit everything except the last
            // `delimiter.len() - 1` bytes, which might be a partial match.
            let safe = r.buf.len().saturating_sub(r.delimiter.len().saturating_sub(1));
            if safe > 0 {
                let chunk = r.buf.split_to(safe);
                return Ok(Some(chunk.freeze()));
            }
            r.fill(r.buf.len() + 4096).await?;
        }
    }

    /// Drains the rest of the part without returning its bytes, for callers
    /// that already streamed it elsewhere (e.g. straight to a file).
    pub async fn drain(&mut self) -> Result<(), MultipartError> {
        while self.read_chunk().await?.is_some() {}
        Ok(())
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: Vec<&'static [u8]>) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p))))
    }

    #[tokio::test]
    async fn parses_two_parts() {
        let body = b"--abc\r\nContent-Type: application/dicom\r\n\r\nHELLO\r\n--abc\r\nContent-Type: application/dicom\r\n\r\nWORLD\r\n--abc--\r\n";
        let mut reader = MultipartReader::new(chunks(vec![body]), b"abc");
        reader.skip_first_boundary().await.unwrap();

        let headers = reader.read_headers().await.unwrap();
        assert_eq!(headers[0], ("Content-Type".into(), "application/dicom".into()));
        let mut data = Vec::new();
        {
            let mut part = reader.new_part_input_stream();
            while let Some(chunk) = part.read_chunk().await.unwrap() {
                data.extend_from_slice(&chunk);
            }
        }
        assert_eq!(data, b"HELLO");
        assert!(reader.read_boundary().await.unwrap());

        let headers = reader.read_headers().await.unwrap();
        assert_eq!(headers[0], ("Content-Type".into(), "application/dicom".into()));
        let mut data = Vec::new();
        {
            let mut part = reader.new_part_input_stream();
            while let Some(chunk) = part.read_chunk().await.unwrap() {
                data.extend_from_slice(&chunk);
            }
        }
        assert_eq!(data, b"WORLD");
        assert!(!reader.read_boundary().await.unwrap());
    }

    #[tokio::test]
    async fn splits_data_across_network_chunks() {
        let parts: Vec<&'static [u8]> = vec![
            b"--abc\r\nContent-Type: a\r\n\r\nHEL",
            b"LO\r\n--abc--\r\n",
        ];
        let mut reader = MultipartReader::new(chunks(parts), b"abc");
        reader.skip_first_boundary().await.unwrap();
        let _ = reader.read_headers().await.unwrap();
        let mut data = Vec::new();
        {
            let mut part = reader.new_part_input_stream();
            while let Some(chunk) = part.read_chunk().await.unwrap() {
                data.extend_from_slice(&chunk);
            }
        }
        assert_eq!(data, b"HELLO");
    }

    #[test]
    fn extracts_boundary_from_content_type() {
        let b = boundary_from_content_type(
            r#"multipart/related; boundary=abc123; type="application/dicom""#,
        )
        .unwrap();
        assert_eq!(b, b"abc123");
    }

    #[test]
    fn rejects_non_multipart_content_type() {
        assert!(boundary_from_content_type("application/dicom").is_err());
    }
}
