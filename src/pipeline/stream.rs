use std::{io::Read, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::{Client, Response};

use super::{camera::VideoSource, rgba_converter};
use crate::types::Frame;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const READ_CHUNK: usize = 16 * 1024;
// A single 1080p JPEG stays well below this; anything larger means we lost
// sync with the stream.
const MAX_BUFFERED_BYTES: usize = 8 * 1024 * 1024;

/// Splits a `multipart/x-mixed-replace` MJPEG byte stream into JPEG images by
/// scanning for start/end-of-image markers, ignoring part headers.
pub struct MjpegReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: Read> MjpegReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(READ_CHUNK * 4),
        }
    }

    /// Returns the next complete JPEG, or `None` once the stream ends.
    pub fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(jpeg) = self.take_jpeg() {
                return Ok(Some(jpeg));
            }

            if self.buffer.len() > MAX_BUFFERED_BYTES {
                bail!(
                    "no complete JPEG within {} buffered bytes",
                    MAX_BUFFERED_BYTES
                );
            }

            let read = self
                .reader
                .read(&mut chunk)
                .context("failed to read from video stream")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    fn take_jpeg(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_marker(&self.buffer, SOI, 0) else {
            // Keep a trailing 0xFF in case the marker straddles two reads.
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            self.buffer.drain(..self.buffer.len() - keep);
            return None;
        };
        let end = find_marker(&self.buffer, EOI, start + SOI.len())?;
        let jpeg = self.buffer[start..end + EOI.len()].to_vec();
        self.buffer.drain(..end + EOI.len());
        Some(jpeg)
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(2)
        .position(|pair| pair == marker)
        .map(|pos| pos + from)
}

/// An HTTP MJPEG camera such as a phone running an IP webcam app.
pub struct MjpegStream {
    reader: MjpegReader<Response>,
    url: String,
}

impl MjpegStream {
    /// `read_timeout` bounds the wait for response headers and for every
    /// body read, so a server that goes silent ends the run with an error.
    pub fn connect(url: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        log::info!("connecting to video stream {url}");
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let response = client
            .get(url)
            .send()
            .with_context(|| format!("failed to connect to {url}"))?
            .error_for_status()
            .with_context(|| format!("video stream {url} returned error status"))?;

        Ok(Self {
            reader: MjpegReader::new(response),
            url: url.to_string(),
        })
    }
}

impl VideoSource for MjpegStream {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let jpeg = self
            .reader
            .next_jpeg()?
            .ok_or_else(|| anyhow!("video stream {} ended", self.url))?;

        match rgba_converter::decode_jpeg(&jpeg) {
            Ok(converted) => Ok(Some(converted.into())),
            Err(err) => {
                log::warn!("failed to decode stream frame: {err:?}");
                Ok(None)
            }
        }
    }
}
