//! File partitioning and reassembly.
//!
//! Chunk `i` of a file of `F` bytes with chunk size `C` covers the byte range
//! `[i*C, min((i+1)*C, F))`. Every chunk is exactly `C` bytes except the
//! last, which holds whatever remains.

use crate::chunk_count;
use crate::integrity::{Digest128, FileDigest};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

/// Sequential reader over a file's chunks.
pub struct FileChunker {
    file: File,
    chunk_size: u32,
    total_size: u64,
    current_offset: u64,
}

impl FileChunker {
    /// Open `path` for chunked reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, its metadata cannot be
    /// read, or `chunk_size` is zero.
    pub fn new<P: AsRef<Path>>(path: P, chunk_size: u32) -> io::Result<Self> {
        if chunk_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Chunk size must be non-zero",
            ));
        }

        let file = File::open(path)?;
        let total_size = file.metadata()?.len();

        Ok(Self {
            file,
            chunk_size,
            total_size,
            current_offset: 0,
        })
    }

    /// Get total number of chunks
    #[must_use]
    pub fn num_chunks(&self) -> u64 {
        chunk_count(self.total_size, self.chunk_size)
    }

    /// Get total file size
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Read next chunk sequentially
    ///
    /// Returns `Ok(None)` once every byte has been read.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from the file fails.
    pub fn read_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.current_offset >= self.total_size {
            return Ok(None);
        }

        let remaining = self.total_size - self.current_offset;
        let chunk_len = remaining.min(u64::from(self.chunk_size)) as usize;

        let mut buffer = vec![0u8; chunk_len];
        self.file.read_exact(&mut buffer)?;
        self.current_offset += chunk_len as u64;

        Ok(Some(buffer))
    }
}

/// Give up on finding a free name after this many candidates.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Create a new file for `name` inside `dir`, never replacing one that
/// already exists.
///
/// `name` itself is tried first, then `name` with `2`, `3`, ... inserted
/// before its first extension (`report.pdf` becomes `report2.pdf`).
///
/// # Errors
///
/// Returns `AlreadyExists` if no free name is found, or any other error from
/// creating the file.
fn create_unique(dir: &Path, name: &str) -> io::Result<(PathBuf, File)> {
    for n in 1..=MAX_NAME_ATTEMPTS {
        let candidate = if n == 1 {
            name.to_string()
        } else {
            numbered_name(name, n)
        };
        let path = dir.join(&candidate);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!("{} exists, trying another name", path.display());
            }
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name for {name} in {}", dir.display()),
    ))
}

fn numbered_name(name: &str, n: u32) -> String {
    match name.find('.') {
        Some(dot) if dot > 0 => format!("{}{}{}", &name[..dot], n, &name[dot..]),
        _ => format!("{name}{n}"),
    }
}

/// Write the in-order concatenation of `blocks` to a new file for `name`
/// inside `dir`.
///
/// An existing file is never replaced: `name` gets a number inserted
/// before its first extension until it is free. Returns the path
/// actually written and the digest of the bytes written. A file that fails
/// part way is removed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_reassembled<I, B>(dir: &Path, name: &str, blocks: I) -> io::Result<(PathBuf, Digest128)>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let (path, file) = create_unique(dir, name)?;
    match write_blocks(file, blocks) {
        Ok(digest) => {
            tracing::debug!(
                "Wrote reassembled file {} ({} bytes)",
                path.display(),
                digest.bytes_digested()
            );
            Ok((path, digest.finalize()))
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&path) {
                tracing::warn!("Could not remove partial {}: {}", path.display(), rm);
            }
            Err(e)
        }
    }
}

fn write_blocks<I, B>(file: File, blocks: I) -> io::Result<FileDigest>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut writer = BufWriter::new(file);
    let mut digest = FileDigest::new();
    for block in blocks {
        let block = block.as_ref();
        writer.write_all(block)?;
        digest.update(block);
    }
    writer.flush()?;
    Ok(digest)
}

/// Reduce a peer-supplied file name to a safe final path component.
///
/// Any directory part is discarded. Returns `None` if nothing usable remains.
#[must_use]
pub fn sanitize_file_name(name: &str) -> Option<String> {
    // Treat both separators as separators regardless of platform
    let last = name.rsplit(['/', '\\']).next()?;

    match Path::new(last).components().next() {
        Some(Component::Normal(part)) if part == last => Some(last.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir, len: usize) -> (std::path::PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let path = dir.path().join("source.bin");
        fs::write(&path, &data).unwrap();
        (path, data)
    }

    fn read_all(chunker: &mut FileChunker) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = chunker.read_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn test_partition_2500_by_1024() {
        let dir = TempDir::new().unwrap();
        let (path, data) = fixture(&dir, 2500);

        let mut chunker = FileChunker::new(&path, 1024).unwrap();
        assert_eq!(chunker.num_chunks(), 3);

        let chunks = read_all(&mut chunker);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn test_exact_multiple_has_no_short_chunk() {
        let dir = TempDir::new().unwrap();
        let (path, _) = fixture(&dir, 4096);

        let mut chunker = FileChunker::new(&path, 1024).unwrap();
        assert_eq!(chunker.num_chunks(), 4);
        assert!(read_all(&mut chunker).iter().all(|c| c.len() == 1024));
    }

    #[test]
    fn test_large_file_partition_uses_byte_offsets() {
        // Many more bytes than chunks: every chunk but the last is full size
        let dir = TempDir::new().unwrap();
        let (path, data) = fixture(&dir, 100 * 1024 + 7);

        let mut chunker = FileChunker::new(&path, 1024).unwrap();
        assert_eq!(chunker.num_chunks(), 101);

        let chunks = read_all(&mut chunker);
        assert_eq!(chunks.len(), 101);
        assert!(chunks[..100].iter().all(|c| c.len() == 1024));
        assert_eq!(chunks[100].len(), 7);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn test_empty_file_has_no_chunks() {
        let dir = TempDir::new().unwrap();
        let (path, _) = fixture(&dir, 0);

        let mut chunker = FileChunker::new(&path, 1024).unwrap();
        assert_eq!(chunker.num_chunks(), 0);
        assert!(chunker.read_chunk().unwrap().is_none());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let dir = TempDir::new().unwrap();
        let (path, _) = fixture(&dir, 10);
        let err = FileChunker::new(&path, 0).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_write_reassembled() {
        let dir = TempDir::new().unwrap();
        let blocks = vec![b"abc".to_vec(), b"defg".to_vec(), Vec::new(), b"h".to_vec()];

        let (path, digest) = write_reassembled(dir.path(), "out.bin", &blocks).unwrap();
        assert_eq!(path, dir.path().join("out.bin"));
        assert_eq!(fs::read(&path).unwrap(), b"abcdefgh");
        assert_eq!(digest, crate::digest([b"abcdefgh".as_slice()]));
    }

    #[test]
    fn test_write_reassembled_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("keep.txt");
        fs::write(&existing, b"local data").unwrap();

        let (path, _) = write_reassembled(dir.path(), "keep.txt", [b"incoming".as_slice()]).unwrap();
        assert_eq!(path, dir.path().join("keep2.txt"));
        assert_eq!(fs::read(&existing).unwrap(), b"local data");
        assert_eq!(fs::read(&path).unwrap(), b"incoming");

        let (third, _) = write_reassembled(dir.path(), "keep.txt", [b"again".as_slice()]).unwrap();
        assert_eq!(third, dir.path().join("keep3.txt"));
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("report.pdf", 2), "report2.pdf");
        assert_eq!(numbered_name("archive.tar.gz", 3), "archive3.tar.gz");
        assert_eq!(numbered_name("README", 2), "README2");
        assert_eq!(numbered_name(".bashrc", 2), ".bashrc2");
    }

    #[test]
    fn test_create_unique_gives_up() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x"), b"").unwrap();
        for n in 2..=MAX_NAME_ATTEMPTS {
            fs::write(dir.path().join(numbered_name("x", n)), b"").unwrap();
        }

        let err = create_unique(dir.path(), "x").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_file_name("/etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(
            sanitize_file_name("../../secret.txt").as_deref(),
            Some("secret.txt")
        );
        assert_eq!(
            sanitize_file_name("C:\\Users\\me\\notes.txt").as_deref(),
            Some("notes.txt")
        );
    }

    #[test]
    fn test_sanitize_file_name_rejects_unusable() {
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("a/.."), None);
        assert_eq!(sanitize_file_name("."), None);
    }
}
