//! Directory trait and the in-memory implementation

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::ops::Range;
use std::sync::Arc;

/// Cheaply cloneable, sliceable view over immutable file bytes.
#[derive(Clone)]
pub struct OwnedBytes {
    data: Arc<Vec<u8>>,
    range: Range<usize>,
}

impl OwnedBytes {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: Arc::new(data),
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.range.start == self.range.end
    }

    /// Sub-slice relative to this view. Fails when out of bounds.
    pub fn slice(&self, range: Range<usize>) -> io::Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range {:?} out of bounds for {} bytes", range, self.len()),
            ));
        }
        Ok(Self {
            data: Arc::clone(&self.data),
            range: self.range.start + range.start..self.range.start + range.end,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }
}

impl AsRef<[u8]> for OwnedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for OwnedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnedBytes({} bytes)", self.len())
    }
}

/// A file being written. Data becomes visible to readers on `finish`.
pub trait IndexOutput: io::Write + Send {
    fn finish(self: Box<Self>) -> io::Result<()>;

    /// Bytes written so far.
    fn bytes_written(&self) -> u64;
}

/// Flat namespace of write-once files.
pub trait Directory: Send + Sync {
    fn exists(&self, name: &str) -> io::Result<bool>;

    fn file_length(&self, name: &str) -> io::Result<u64>;

    /// Open a whole file for reading
    fn open_input(&self, name: &str) -> io::Result<OwnedBytes>;

    /// Create/overwrite a file. Call `finish` on the returned output.
    fn create_output(&self, name: &str) -> io::Result<Box<dyn IndexOutput>>;

    fn delete_file(&self, name: &str) -> io::Result<()>;

    /// All file names, sorted
    fn list_all(&self) -> io::Result<Vec<String>>;
}

impl<D: Directory + ?Sized> Directory for Arc<D> {
    fn exists(&self, name: &str) -> io::Result<bool> {
        (**self).exists(name)
    }
    fn file_length(&self, name: &str) -> io::Result<u64> {
        (**self).file_length(name)
    }
    fn open_input(&self, name: &str) -> io::Result<OwnedBytes> {
        (**self).open_input(name)
    }
    fn create_output(&self, name: &str) -> io::Result<Box<dyn IndexOutput>> {
        (**self).create_output(name)
    }
    fn delete_file(&self, name: &str) -> io::Result<()> {
        (**self).delete_file(name)
    }
    fn list_all(&self) -> io::Result<Vec<String>> {
        (**self).list_all()
    }
}

type FileMap = Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>;

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("file not found: {}", name))
}

/// In-memory directory for testing
#[derive(Debug, Default, Clone)]
pub struct RamDirectory {
    files: FileMap,
}

impl RamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes across all files
    pub fn size_in_bytes(&self) -> u64 {
        self.files.read().values().map(|f| f.len() as u64).sum()
    }
}

impl Directory for RamDirectory {
    fn exists(&self, name: &str) -> io::Result<bool> {
        Ok(self.files.read().contains_key(name))
    }

    fn file_length(&self, name: &str) -> io::Result<u64> {
        self.files
            .read()
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| not_found(name))
    }

    fn open_input(&self, name: &str) -> io::Result<OwnedBytes> {
        let files = self.files.read();
        let data = files.get(name).ok_or_else(|| not_found(name))?;
        Ok(OwnedBytes {
            data: Arc::clone(data),
            range: 0..data.len(),
        })
    }

    fn create_output(&self, name: &str) -> io::Result<Box<dyn IndexOutput>> {
        Ok(Box::new(RamOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
        }))
    }

    fn delete_file(&self, name: &str) -> io::Result<()> {
        self.files
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    fn list_all(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = self.files.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Output backed by a Vec<u8>, published into the directory on finish.
struct RamOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
}

impl io::Write for RamOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IndexOutput for RamOutput {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let RamOutput {
            name,
            buffer,
            files,
        } = *self;
        files.write().insert(name, Arc::new(buffer));
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.buffer.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_ram_directory() {
        let dir = RamDirectory::new();

        let mut out = dir.create_output("_0.pst").unwrap();
        out.write_all(b"hello world").unwrap();
        assert_eq!(out.bytes_written(), 11);
        // Not visible until finished
        assert!(!dir.exists("_0.pst").unwrap());
        out.finish().unwrap();

        assert!(dir.exists("_0.pst").unwrap());
        assert_eq!(dir.file_length("_0.pst").unwrap(), 11);
        let data = dir.open_input("_0.pst").unwrap();
        assert_eq!(data.as_slice(), b"hello world");
        assert_eq!(data.slice(0..5).unwrap().as_slice(), b"hello");
        assert!(data.slice(6..12).is_err());

        dir.delete_file("_0.pst").unwrap();
        assert!(!dir.exists("_0.pst").unwrap());
        assert!(dir.delete_file("_0.pst").is_err());
        assert!(dir.open_input("_0.pst").is_err());
    }

    #[test]
    fn test_list_all_sorted() {
        let dir = RamDirectory::new();
        for name in ["b", "a", "c"] {
            dir.create_output(name).unwrap().finish().unwrap();
        }
        assert_eq!(dir.list_all().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_owned_bytes_nested_slice() {
        let bytes = OwnedBytes::new(vec![1, 2, 3, 4, 5]);
        let sliced = bytes.slice(1..4).unwrap();
        assert_eq!(sliced.as_slice(), &[2, 3, 4]);
        assert_eq!(sliced.slice(1..3).unwrap().as_slice(), &[3, 4]);
        assert_eq!(bytes.as_slice(), &[1, 2, 3, 4, 5]);
    }
}
