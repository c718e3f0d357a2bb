//! Byte input for session construction
//!
//! A [`MusicSource`] wraps any seekable byte stream together with the
//! close-on-finish flag. Backends that load everything at construction release
//! the stream afterwards when the flag is set and otherwise hand it back
//! through the session; streaming backends keep it for the session lifetime.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

/// Seekable byte stream a backend can decode from
pub trait SourceStream: Read + Seek + Send + Sync {
    /// Whether seeking is cheap and reliable
    fn is_seekable(&self) -> bool {
        true
    }

    /// Total length in bytes when known
    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl SourceStream for File {
    fn byte_len(&self) -> Option<u64> {
        self.metadata().ok().map(|m| m.len())
    }
}

impl SourceStream for BufReader<File> {
    fn byte_len(&self) -> Option<u64> {
        self.get_ref().metadata().ok().map(|m| m.len())
    }
}

impl SourceStream for Cursor<Vec<u8>> {
    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().len() as u64)
    }
}

impl SourceStream for Cursor<&'static [u8]> {
    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().len() as u64)
    }
}

/// Input handed to a backend's construction operation
pub struct MusicSource {
    stream: Box<dyn SourceStream>,
    close_on_finish: bool,
}

impl MusicSource {
    /// Wrap a stream.
    ///
    /// # Arguments
    /// - `close_on_finish`: the backend takes ownership and releases the
    ///   stream once it is done with it
    ///
    /// A borrowed stream comes back through
    /// [`MusicSession::take_source`](crate::music::session::MusicSession::take_source)
    /// only when the session is built. A failed load drops it along with the
    /// error; callers that need the handle afterwards keep their own, e.g. via
    /// [`File::try_clone`].
    pub fn new(stream: Box<dyn SourceStream>, close_on_finish: bool) -> Self {
        Self {
            stream,
            close_on_finish,
        }
    }

    /// Open a file; the session owns the handle
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(Box::new(BufReader::new(file)), true))
    }

    /// In-memory source; the session owns the bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Box::new(Cursor::new(bytes)), true)
    }

    pub fn close_on_finish(&self) -> bool {
        self.close_on_finish
    }

    pub fn byte_len(&self) -> Option<u64> {
        self.stream.byte_len()
    }

    /// Read the remaining bytes of the stream
    pub fn read_to_end(&mut self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.stream.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Finish construction-time reading.
    ///
    /// Drops the stream when the backend owns it, otherwise returns it so the
    /// session can give it back to the caller.
    pub fn finish(self) -> Option<Box<dyn SourceStream>> {
        if self.close_on_finish {
            None
        } else {
            Some(self.stream)
        }
    }

    /// Take the stream for a backend that decodes from it continuously
    pub fn into_stream(self) -> Box<dyn SourceStream> {
        self.stream
    }
}

impl std::fmt::Debug for MusicSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicSource")
            .field("close_on_finish", &self.close_on_finish)
            .field("byte_len", &self.stream.byte_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_releases_owned_stream() {
        let source = MusicSource::from_bytes(vec![1, 2, 3]);
        assert!(source.finish().is_none());
    }

    #[test]
    fn test_finish_returns_borrowed_stream() {
        let source = MusicSource::new(Box::new(Cursor::new(vec![1u8, 2, 3])), false);
        let mut stream = source.finish().expect("stream should be handed back");
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_read_to_end() {
        let mut source = MusicSource::from_bytes(b"hello".to_vec());
        assert_eq!(source.byte_len(), Some(5));
        assert_eq!(source.read_to_end().unwrap(), b"hello".to_vec());
    }
}
