use std::io::Write;

use gitops_core::{ContentType, Result};

/// Writes successive frames to a byte stream, applying the content type's
/// separator discipline.
pub trait FrameWriter: Send {
    fn content_type(&self) -> ContentType;
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Construct a `FrameWriter` over any `std::io::Write` sink.
pub fn frame_writer<W: Write + Send + 'static>(content_type: ContentType, writer: W) -> Box<dyn FrameWriter> {
    Box::new(IoFrameWriter::new(content_type, writer))
}

/// A `FrameWriter` over an arbitrary `std::io::Write` sink.
///
/// For YAML, a `---\n` separator is emitted between frames but never
/// before the first or after the last. For JSON, frames are concatenated
/// with no separator.
pub struct IoFrameWriter<W> {
    writer: W,
    content_type: ContentType,
    wrote_any: bool,
}

impl<W: Write> IoFrameWriter<W> {
    pub fn new(content_type: ContentType, writer: W) -> Self {
        Self {
            writer,
            content_type,
            wrote_any: false,
        }
    }
}

impl<W: Write + Send> FrameWriter for IoFrameWriter<W> {
    fn content_type(&self) -> ContentType {
        self.content_type
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        if self.content_type == ContentType::Yaml && self.wrote_any {
            self.writer.write_all(b"---\n")?;
        }
        self.writer.write_all(frame)?;
        self.wrote_any = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_separator_between_not_around() {
        let mut buf = Vec::new();
        {
            let mut writer = IoFrameWriter::new(ContentType::Yaml, &mut buf);
            writer.write_frame(b"foo: 1\n").unwrap();
            writer.write_frame(b"bar: 2\n").unwrap();
        }
        assert_eq!(buf, b"foo: 1\n---\nbar: 2\n");
    }

    #[test]
    fn json_no_separator() {
        let mut buf = Vec::new();
        {
            let mut writer = IoFrameWriter::new(ContentType::Json, &mut buf);
            writer.write_frame(br#"{"a":1}"#).unwrap();
            writer.write_frame(br#"{"b":2}"#).unwrap();
        }
        assert_eq!(buf, br#"{"a":1}{"b":2}"#);
    }
}
