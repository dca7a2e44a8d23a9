use std::io::Read;

use gitops_core::{ContentType, Error, Result};

use crate::{DEFAULT_MAX_FRAME_SIZE, INITIAL_BUFFER_SIZE};

/// Reads successive frames from a byte stream.
///
/// Implementations are not required to be reusable once `read_frame`
/// returns `Ok(None)`.
pub trait FrameReader: Send {
    fn content_type(&self) -> ContentType;

    /// Read the next frame, or `Ok(None)` at end-of-stream. A frame
    /// exceeding the configured cap fails with `Error::FrameOverflow`.
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>>;

    /// Drain every remaining frame.
    fn read_all(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut frames = Vec::new();
        while let Some(frame) = self.read_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// Construct a `FrameReader` over any `std::io::Read` source, with the
/// default cap and initial buffer size.
pub fn frame_reader<R: Read + Send + 'static>(content_type: ContentType, reader: R) -> Box<dyn FrameReader> {
    Box::new(IoFrameReader::new(content_type, reader))
}

/// A `FrameReader` over an arbitrary `std::io::Read` source.
///
/// Bytes are pulled into a growing buffer (starting at
/// [`INITIAL_BUFFER_SIZE`], doubling on each refill) until a full frame can
/// be split off; on end-of-stream, the underlying reader is dropped and the
/// final buffered frame (if any) is returned together with that
/// end-of-stream signal on the following call.
pub struct IoFrameReader<R> {
    reader: R,
    content_type: ContentType,
    max_frame_size: usize,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<R: Read> IoFrameReader<R> {
    pub fn new(content_type: ContentType, reader: R) -> Self {
        Self::with_max_frame_size(content_type, reader, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(content_type: ContentType, reader: R, max_frame_size: usize) -> Self {
        Self {
            reader,
            content_type,
            max_frame_size,
            buf: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    fn grow(&mut self) -> Result<()> {
        let chunk = if self.buf.is_empty() {
            INITIAL_BUFFER_SIZE
        } else {
            self.buf.len().min(self.max_frame_size)
        };
        let start = self.buf.len();
        self.buf.resize(start + chunk, 0);
        let n = self.reader.read(&mut self.buf[start..])?;
        self.buf.truncate(start + n);
        if n == 0 {
            self.eof = true;
        }
        if self.buf.len() - self.pos > self.max_frame_size {
            return Err(Error::FrameOverflow);
        }
        Ok(())
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
    }

    fn next_yaml_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some((frame, new_pos)) = find_yaml_separator(&self.buf, self.pos) {
                self.pos = new_pos;
                self.compact();
                if !is_blank(&frame) {
                    return Ok(Some(frame));
                }
                continue;
            }
            if self.eof {
                if self.pos < self.buf.len() {
                    let frame = self.buf[self.pos..].to_vec();
                    self.pos = self.buf.len();
                    self.compact();
                    if is_blank(&frame) {
                        return Ok(None);
                    }
                    return Ok(Some(frame));
                }
                return Ok(None);
            }
            self.grow()?;
        }
    }

    fn next_json_frame(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let ws_len = self.buf[self.pos..]
                .iter()
                .take_while(|b| b.is_ascii_whitespace())
                .count();
            self.pos += ws_len;
            self.compact();

            let slice = &self.buf[self.pos..];
            if !slice.is_empty() {
                let mut stream = serde_json::Deserializer::from_slice(slice).into_iter::<serde_json::Value>();
                match stream.next() {
                    Some(Ok(_)) => {
                        let offset = stream.byte_offset();
                        let frame = slice[..offset].to_vec();
                        self.pos += offset;
                        self.compact();
                        return Ok(Some(frame));
                    }
                    Some(Err(e)) if e.is_eof() => {
                        if self.eof {
                            return Err(e.into());
                        }
                        // incomplete value buffered so far; fall through to read more
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        if self.eof {
                            return Ok(None);
                        }
                        // only whitespace remains; more input may still extend it
                    }
                }
            } else if self.eof {
                return Ok(None);
            }
            self.grow()?;
        }
    }
}

impl<R: Read + Send> FrameReader for IoFrameReader<R> {
    fn content_type(&self) -> ContentType {
        self.content_type
    }

    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        match self.content_type {
            ContentType::Yaml => self.next_yaml_frame(),
            ContentType::Json => self.next_json_frame(),
        }
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

/// Find the next `---` separator line at or after `from`, scanning line by
/// line. Returns the frame preceding it and the position right after the
/// separator's trailing newline.
fn find_yaml_separator(buf: &[u8], from: usize) -> Option<(Vec<u8>, usize)> {
    let mut line_start = from;
    loop {
        let rest = &buf[line_start..];
        let rel_newline = rest.iter().position(|&b| b == b'\n')?;
        let newline_at = line_start + rel_newline;
        let line = trim_ascii(&buf[line_start..newline_at]);
        if line == b"---" {
            let frame = buf[from..line_start].to_vec();
            return Some((frame, newline_at + 1));
        }
        line_start = newline_at + 1;
    }
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_of(content_type: ContentType, input: &str) -> Vec<String> {
        let mut reader = IoFrameReader::new(content_type, input.as_bytes());
        reader
            .read_all()
            .unwrap()
            .into_iter()
            .map(|f| String::from_utf8(f).unwrap())
            .collect()
    }

    #[test]
    fn yaml_splits_on_separator_lines() {
        let frames = frames_of(ContentType::Yaml, "foo: 1\n---\nbar: 2\n");
        assert_eq!(frames, vec!["foo: 1\n", "bar: 2\n"]);
    }

    #[test]
    fn yaml_tolerates_leading_separator() {
        let frames = frames_of(ContentType::Yaml, "---\nfoo: 1\n");
        assert_eq!(frames, vec!["foo: 1\n"]);
    }

    #[test]
    fn yaml_skips_empty_frames() {
        let frames = frames_of(ContentType::Yaml, "foo: 1\n---\n---\nbar: 2\n");
        assert_eq!(frames, vec!["foo: 1\n", "bar: 2\n"]);
    }

    #[test]
    fn yaml_single_document_no_separator() {
        let frames = frames_of(ContentType::Yaml, "foo: 1\n");
        assert_eq!(frames, vec!["foo: 1\n"]);
    }

    #[test]
    fn json_splits_concatenated_values() {
        let frames = frames_of(ContentType::Json, r#"{"a":1}{"b":2}"#);
        assert_eq!(frames, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn json_tolerates_whitespace_between_values() {
        let frames = frames_of(ContentType::Json, "{\"a\":1}\n\n{\"b\":2}");
        assert_eq!(frames, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn overflow_fails_past_cap() {
        let input = format!("foo: \"{}\"\n", "x".repeat(200));
        let mut reader = IoFrameReader::with_max_frame_size(ContentType::Yaml, input.as_bytes(), 32);
        assert!(matches!(reader.read_frame(), Err(Error::FrameOverflow)));
    }
}
