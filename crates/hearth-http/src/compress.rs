//! Content-encoding codec registry.
//!
//! Codecs are registered in order before the server starts; the first
//! registered codec whose name appears among the request's `Accept-Encoding`
//! tokens wins, provided the body meets the codec's minimum size. The
//! advertisement string sent back on keep-alive responses is precomputed from
//! the registration order.

use std::io::{self, Write};
use std::sync::Arc;

/// Minimum body size for a codec to activate, unless overridden.
pub const DEFAULT_MIN_COMPRESS_SIZE: usize = 1024;

/// A content-encoding function: body bytes in, encoded bytes out.
pub type CompressorFn = Arc<dyn Fn(&[u8]) -> io::Result<Vec<u8>> + Send + Sync>;

/// One registered codec.
#[derive(Clone)]
pub struct CompressionEntry {
    name: String,
    compress: CompressorFn,
    min_size: usize,
}

impl CompressionEntry {
    /// Codec name as it appears in `Accept-Encoding` / `Content-Encoding`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Minimum body size for this codec to activate.
    #[must_use]
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Encodes a body with this codec.
    pub fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        (self.compress)(data)
    }
}

impl std::fmt::Debug for CompressionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionEntry")
            .field("name", &self.name)
            .field("min_size", &self.min_size)
            .finish()
    }
}

/// Ordered list of content-encoding codecs.
///
/// The registry is immutable once the server starts; registration happens on
/// the builder.
#[derive(Debug, Default, Clone)]
pub struct CompressionRegistry {
    entries: Vec<CompressionEntry>,
    advertised: String,
}

impl CompressionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a codec; insertion order decides selection priority.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        compress: CompressorFn,
        min_size: usize,
    ) {
        let name = name.into();
        if !self.advertised.is_empty() {
            self.advertised.push(',');
        }
        self.advertised.push_str(&name);
        self.entries.push(CompressionEntry {
            name,
            compress,
            min_size,
        });
    }

    /// True when no codec is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Comma-joined codec names in registration order.
    #[must_use]
    pub fn advertisement(&self) -> &str {
        &self.advertised
    }

    /// Picks the codec for a response.
    ///
    /// Walks registered codecs in insertion order and returns the first whose
    /// name appears among the request's `Accept-Encoding` tokens
    /// (case-insensitive, quality parameters ignored) and whose minimum size
    /// is met by `body_len`.
    #[must_use]
    pub fn select(&self, accept_encoding: &str, body_len: usize) -> Option<&CompressionEntry> {
        if accept_encoding.is_empty() {
            return None;
        }
        self.entries.iter().find(|entry| {
            body_len >= entry.min_size && accepts_token(accept_encoding, &entry.name)
        })
    }
}

/// True when `name` appears among the comma-separated tokens of an
/// `Accept-Encoding` value. Quality parameters (`;q=`) are ignored.
fn accepts_token(accept_encoding: &str, name: &str) -> bool {
    accept_encoding.split(',').any(|part| {
        let token = part.trim().split(';').next().unwrap_or("").trim();
        token.eq_ignore_ascii_case(name)
    })
}

/// Returns a gzip codec backed by flate2.
#[must_use]
pub fn gzip_compressor() -> CompressorFn {
    Arc::new(|data: &[u8]| {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    })
}

/// Returns a deflate (zlib-wrapped, per RFC 7230) codec backed by flate2.
#[must_use]
pub fn deflate_compressor() -> CompressorFn {
    Arc::new(|data: &[u8]| {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    })
}
