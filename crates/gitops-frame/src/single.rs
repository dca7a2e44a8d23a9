use parking_lot::Mutex;

use gitops_core::{ContentType, Result};

use crate::reader::FrameReader;

/// Wraps a single byte slice as a one-frame reader: returns the whole slice
/// once, then end-of-stream forever. Safe to share across threads — only
/// one caller ever observes the frame.
pub struct SingleFrameReader {
    content_type: ContentType,
    remaining: Mutex<Option<Vec<u8>>>,
}

impl SingleFrameReader {
    pub fn new(content_type: ContentType, content: Vec<u8>) -> Self {
        Self {
            content_type,
            remaining: Mutex::new(Some(content)),
        }
    }
}

impl FrameReader for SingleFrameReader {
    fn content_type(&self) -> ContentType {
        self.content_type
    }

    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.remaining.lock().take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_content_once() {
        let mut reader = SingleFrameReader::new(ContentType::Yaml, b"foo: 1\n".to_vec());
        assert_eq!(reader.read_frame().unwrap(), Some(b"foo: 1\n".to_vec()));
        assert_eq!(reader.read_frame().unwrap(), None);
        assert_eq!(reader.read_frame().unwrap(), None);
    }
}
