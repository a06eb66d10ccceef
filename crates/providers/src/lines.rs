//! Line reassembly for streamed HTTP bodies.
//!
//! Both SSE and NDJSON are line-oriented, but byte chunks from the network
//! cut lines at arbitrary points: one chunk may end mid-line, or carry
//! several lines at once.

/// Accumulates raw bytes and yields complete lines in arrival order.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and drain every complete line (without the trailing
    /// `\n` / `\r\n`).
    ///
    /// Bytes are kept until a newline arrives, so a multi-byte UTF-8
    /// character split across chunks is decoded intact.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop(); // '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Whatever is left after the body ends (a final line without `\n`).
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&line).trim_end_matches('\r').to_string())
    }
}
