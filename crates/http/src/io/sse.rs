use std::fmt::{self, Display};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ChunksError(err) => {
                write!(f, "failed to read the stream: {err}")
            }
        }
    }
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Multiple `data` lines in one event
/// are joined with a line feed, and comments and other fields are
/// dropped. The buffer holds raw bytes so that a UTF-8 sequence split
/// across two chunks is decoded once the event is complete.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
    eof: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
            eof: false,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain the buffered events before touching the network again.
            if let Some(event) = self.try_parse_event() {
                return Ok(Some(event));
            }

            // An unterminated event at the end of the stream is dropped.
            if self.eof {
                return Ok(None);
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    fn try_parse_event(&mut self) -> Option<String> {
        // event         = *( comment / field ) end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        // end-of-line   = ( cr lf / lf )
        while let Some((block_end, consumed)) = find_block_end(&self.buf) {
            let block: Vec<u8> =
                self.buf.drain(..consumed).take(block_end).collect();
            if block.is_empty() {
                continue;
            }
            let Ok(block) = String::from_utf8(block) else {
                warn!("skipping an event that is not valid UTF-8");
                continue;
            };

            let mut data: Option<String> = None;
            for line in block.lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (name, value) = match line.split_once(':') {
                    Some((name, value)) => {
                        (name, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                if name != "data" {
                    continue;
                }
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }

            match data {
                Some(data) => return Some(data),
                None => trace!("skipping an event without data: {block:?}"),
            }
        }
        None
    }
}

/// Finds the first blank line in `buf`, returning where the event before
/// it ends and how many bytes the event and the blank line occupy.
fn find_block_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    while let Some(pos) = buf[line_start..].iter().position(|&b| b == b'\n') {
        let line_end = line_start + pos;
        let line = &buf[line_start..line_end];
        if line.is_empty() || line == b"\r" {
            return Some((line_start, line_end + 1));
        }
        line_start = line_end + 1;
    }
    None
}
