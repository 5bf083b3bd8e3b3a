use tokio::io::{AsyncRead, AsyncReadExt};

/// Longest run without a line end that is buffered before it is handed out
/// as a segment of its own
pub const MAX_SEGMENT: usize = 8 * 1024;

/// Splits a diagnostic stream into lines on `\n` and `\r`.
///
/// Progress bars redraw with a bare carriage return, so both count as line
/// ends. Empty segments are skipped, and a run longer than [`MAX_SEGMENT`]
/// is split so the buffer stays bounded. `next_line` is cancel safe: bytes only
/// enter the buffer once a read has completed.
pub struct LineSegments<R> {
    reader: R,
    buffer: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineSegments<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            eof: false,
        }
    }

    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let mut chunk = [0u8; 4096];

        loop {
            while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let segment: Vec<u8> = self.buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&segment[..segment.len() - 1]);
                if !line.trim().is_empty() {
                    return Ok(Some(line.into_owned()));
                }
            }

            if self.buffer.len() >= MAX_SEGMENT {
                let segment: Vec<u8> = self.buffer.drain(..MAX_SEGMENT).collect();
                return Ok(Some(String::from_utf8_lossy(&segment).into_owned()));
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buffer);
                let line = String::from_utf8_lossy(&rest).into_owned();
                if line.trim().is_empty() {
                    return Ok(None);
                }
                return Ok(Some(line));
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buffer.extend_from_slice(&chunk[..n]);
            }
        }
    }
}
