//! Pluggable file-sending strategies.
//!
//! When a handler sets the static-file sentinel content type, the response
//! writer first offers the file to a configured [`SendFileHook`]. A hook that
//! returns `true` has rewritten the response headers itself (typically
//! delegating the transfer to a front proxy) and the writer skips reading the
//! file. A declining hook falls back to a direct read.

use hearth_core::headers::append_header_line;

/// Strategy invoked for static-file responses before the file is read.
pub trait SendFileHook: Send + Sync {
    /// Offers `file_path` to the strategy.
    ///
    /// On acceptance the implementation rewrites `out_custom_headers` and
    /// `out_content` as needed and returns `true`; the server then sends the
    /// response without reading the file. Returning `false` declines.
    fn send_file(
        &self,
        file_path: &str,
        out_custom_headers: &mut String,
        out_content: &mut Vec<u8>,
    ) -> bool;
}

/// Delegates file transfers to a reverse proxy via `X-Accel-Redirect`.
///
/// Holds an allow-list of path prefixes (case-sensitive left match). When a
/// file path starts with an allowed prefix, the prefix is stripped, an
/// `X-Accel-Redirect` header pointing at the stripped path is appended, and
/// the body is cleared so the proxy serves the file. Paths outside the
/// allow-list decline and the server reads the file directly.
#[derive(Debug, Default, Clone)]
pub struct AccelRedirect {
    prefixes: Vec<String>,
}

impl AccelRedirect {
    /// Creates a strategy with an empty allow-list (declines everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an allowed path prefix.
    #[must_use]
    pub fn allow_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }
}

impl SendFileHook for AccelRedirect {
    fn send_file(
        &self,
        file_path: &str,
        out_custom_headers: &mut String,
        out_content: &mut Vec<u8>,
    ) -> bool {
        for prefix in &self.prefixes {
            if let Some(stripped) = file_path.strip_prefix(prefix.as_str()) {
                append_header_line(out_custom_headers, "X-Accel-Redirect", stripped);
                out_content.clear();
                return true;
            }
        }
        false
    }
}
