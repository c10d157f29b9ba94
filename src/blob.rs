//! Sources of the binary loaded into the TD
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;

#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum BlobError {
    #[error("file {filename} error: {e}")]
    File { e: std::io::Error, filename: String },

    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),
}
/// A Result for BlobError
pub type BlobResult<T> = core::result::Result<T, BlobError>;
type Result<T> = BlobResult<T>;

// Content of a file once read
#[derive(Debug)]
enum BlobContent {
    Mapped(Mmap),
    // Empty files cannot be mapped, and streams have no length
    Owned(Vec<u8>),
}

impl BlobContent {
    fn as_slice(&self) -> &[u8] {
        match self {
            BlobContent::Mapped(m) => &m[..],
            BlobContent::Owned(v) => &v[..],
        }
    }
}

/// Blob stored as a file
#[derive(Debug, Default)]
pub struct BlobStorageFile {
    /// The filename
    pub name: String,
    // Opened on first use
    content: Option<BlobContent>,
}

impl BlobStorageFile {
    fn file_error(&self, e: std::io::Error) -> BlobError {
        BlobError::File {
            e,
            filename: self.name.to_string(),
        }
    }

    fn load(&self) -> Result<BlobContent> {
        let mut file = File::open(&self.name).map_err(|e| self.file_error(e))?;
        let metadata = file.metadata().map_err(|e| self.file_error(e))?;

        // Pipes and character devices report a zero length, whatever they
        // contain.
        if metadata.is_file() && metadata.len() > 0 {
            // SAFETY: the file must not be modified while mapped
            // https://docs.rs/memmap2/latest/memmap2/struct.Mmap.html#safety
            let map = unsafe { Mmap::map(&file) }.map_err(|e| self.file_error(e))?;
            return Ok(BlobContent::Mapped(map));
        }

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        log::debug!("Read {} bytes from {}", buf.len(), self.name);
        Ok(BlobContent::Owned(buf))
    }

    fn read(&mut self) -> Result<&[u8]> {
        if self.content.is_none() {
            self.content = Some(self.load()?);
        }
        Ok(self
            .content
            .as_ref()
            .map(BlobContent::as_slice)
            .unwrap_or_default())
    }
}

impl Clone for BlobStorageFile {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            content: None,
        }
    }
}

impl PartialEq for BlobStorageFile {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// The storage of the binary loaded into the guest
#[derive(Clone, Debug, PartialEq)]
pub enum BlobStorage {
    /// A file, a pipe or a device, read in full
    File(BlobStorageFile),
    /// A buffer
    Bytes(Vec<u8>),
}

impl BlobStorage {
    /// Return a new BlobStorage for the given file. The file will be opened
    /// once its content is actually needed.
    pub fn from_file(filename: &str) -> Self {
        BlobStorage::File(BlobStorageFile {
            name: filename.to_string(),
            content: None,
        })
    }

    /// Name of the source, for reports
    pub fn name(&self) -> String {
        match self {
            BlobStorage::File(f) => f.name.clone(),
            BlobStorage::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Return the content of this blob. Since file-based blobs are opened
    /// lazily, this function may return an error.
    pub fn read(&mut self) -> Result<&[u8]> {
        match self {
            BlobStorage::File(f) => f.read(),
            BlobStorage::Bytes(b) => Ok(b),
        }
    }
}

impl Default for BlobStorage {
    fn default() -> Self {
        Self::Bytes(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_storage() {
        let mut b = BlobStorage::from_file("testdata/nonexistent-file.txt");
        let e = b.read();
        assert!(e.is_err());
        // Test our error type while where here
        let BlobError::File { e, filename } = e.as_ref().unwrap_err() else {
            panic!("invalid error, got {e:?}");
        };
        assert!(e.kind() == std::io::ErrorKind::NotFound);
        assert_eq!(filename, "testdata/nonexistent-file.txt");

        let mut b = BlobStorage::from_file("testdata/some-file.txt");
        let s = "This file is used to test file handling code.\n".as_bytes();
        assert_eq!(b.read().unwrap(), s);
        assert_eq!(b.name(), "testdata/some-file.txt");
        // A clone reads the file again
        let mut c = b.clone();
        assert_eq!(c, b);
        assert_eq!(c.read().unwrap(), s);

        let mut b = BlobStorage::Bytes(s.to_vec());
        assert_eq!(b.read().unwrap(), s);
        assert_eq!(b.name(), "<46 bytes>");

        let mut b = BlobStorage::Bytes(vec![]);
        assert_eq!(b.read().unwrap(), &[0; 0]);
    }

    #[test]
    fn test_empty_file() {
        let mut b = BlobStorage::from_file("testdata/empty.bin");
        assert!(b.read().unwrap().is_empty());
        // Still empty on the second read
        assert!(b.read().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_not_a_file() {
        // A directory opens but cannot be read
        let mut b = BlobStorage::from_file("testdata");
        assert!(matches!(b.read(), Err(BlobError::IO(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_fifo() {
        use assert_fs::prelude::*;
        use std::process::Command;

        // A FIFO has no length, its content is only known once read
        let tmp_dir = assert_fs::TempDir::new().unwrap();
        let fifo = tmp_dir.child("fifo");
        let status = Command::new("mkfifo").arg(fifo.path()).status().unwrap();
        assert!(status.success());

        let path = fifo.path().to_path_buf();
        let writer = std::thread::spawn(move || std::fs::write(path, [0x5a; 5000]));

        let mut b = BlobStorage::from_file(fifo.to_str().unwrap());
        assert_eq!(b.read().unwrap(), [0x5a; 5000]);
        writer.join().unwrap().unwrap();
    }
}
