// files.rs - Positional input and output used by the VM and the splicer.
//
// Reads never fail at end of input: they come back short or empty. I/O
// errors from the underlying file do propagate.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Random-access input.
pub trait Reader {
    fn size(&self) -> usize;

    fn seek(&mut self, offset: usize) -> io::Result<()>;

    /// Read up to `length` bytes from the current position and advance past
    /// them. Returns fewer bytes (possibly none) at end of input.
    fn read(&mut self, length: usize) -> io::Result<Vec<u8>>;

    fn read_at(&mut self, offset: usize, length: usize) -> io::Result<Vec<u8>> {
        self.seek(offset)?;
        self.read(length)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Positional output.
pub trait Writer {
    fn write_at(&mut self, offset: usize, data: &[u8]) -> io::Result<()>;

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    data: Vec<u8>,
    offset: usize,
}

impl MemoryReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        MemoryReader {
            data: data.into(),
            offset: 0,
        }
    }

    /// Load a whole file. Used when the same file is about to be rewritten.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(MemoryReader::new(std::fs::read(path)?))
    }
}

impl Reader for MemoryReader {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn seek(&mut self, offset: usize) -> io::Result<()> {
        self.offset = offset;
        Ok(())
    }

    fn read(&mut self, length: usize) -> io::Result<Vec<u8>> {
        let start = self.offset.min(self.data.len());
        let end = start.saturating_add(length).min(self.data.len());
        self.offset = end;
        Ok(self.data[start..end].to_vec())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    data: Vec<u8>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        MemoryWriter::default()
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }
}

impl Writer for MemoryWriter {
    fn write_at(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        let end = offset + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }
}

// ============================================================================
// File-backed
// ============================================================================

#[derive(Debug)]
pub struct FileReader {
    file: Option<File>,
    size: usize,
}

impl FileReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len() as usize;
        Ok(FileReader {
            file: Some(file),
            size,
        })
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("reader is closed"))
    }
}

impl Reader for FileReader {
    fn size(&self) -> usize {
        self.size
    }

    fn seek(&mut self, offset: usize) -> io::Result<()> {
        self.file()?.seek(SeekFrom::Start(offset as u64))?;
        Ok(())
    }

    fn read(&mut self, length: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(length.min(self.size));
        self.file()?.take(length as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.file = None;
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileWriter {
    file: Option<File>,
}

impl FileWriter {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileWriter {
            file: Some(File::create(path)?),
        })
    }
}

impl Writer for FileWriter {
    fn write_at(&mut self, offset: usize, data: &[u8]) -> io::Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("writer is closed"))?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(data)
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("vore-files-{}-{}", std::process::id(), name))
    }

    #[test]
    fn memory_reader_short_reads() {
        let mut r = MemoryReader::new("hello");
        assert_eq!(r.size(), 5);
        assert_eq!(r.read(2).unwrap(), b"he");
        assert_eq!(r.read(2).unwrap(), b"ll");
        assert_eq!(r.read(2).unwrap(), b"o");
        assert_eq!(r.read(2).unwrap(), b"");
        assert_eq!(r.read_at(1, 3).unwrap(), b"ell");
        assert_eq!(r.read_at(99, 3).unwrap(), b"");
    }

    #[test]
    fn memory_writer_positions() {
        let mut w = MemoryWriter::new();
        w.write_at(0, b"abc").unwrap();
        w.write_at(3, b"def").unwrap();
        w.write_at(1, b"X").unwrap();
        assert_eq!(w.contents(), b"aXcdef");
    }

    #[test]
    fn file_round_trip() {
        let path = temp_path("round-trip");
        let mut w = FileWriter::create(&path).unwrap();
        w.write_at(0, b"line one\n").unwrap();
        w.write_at(9, b"line two").unwrap();
        w.close().unwrap();
        assert!(w.write_at(0, b"x").is_err());

        let mut r = FileReader::open(&path).unwrap();
        assert_eq!(r.size(), 17);
        assert_eq!(r.read_at(5, 3).unwrap(), b"one");
        assert_eq!(r.read_at(14, 10).unwrap(), b"two");
        r.close().unwrap();
        assert!(r.read(1).is_err());

        let mem = MemoryReader::from_file(&path).unwrap();
        assert_eq!(mem.size(), 17);
        std::fs::remove_file(&path).unwrap();
    }
}
