//! Per-chunk checksum and whole-file digest.
//!
//! The checksum is an Internet-style 16-bit one's complement sum over
//! big-endian words and only guards a single chunk in transit. The digest is
//! a 128-bit BLAKE3 output over the entire file and is compared end to end.

use std::fmt;

/// Size of [`Digest128`] in bytes.
pub const DIGEST_SIZE: usize = 16;

/// 16-bit one's complement checksum of `block`.
///
/// Bytes are read as big-endian 16-bit words; an odd trailing byte is padded
/// with a zero low byte. Carries out of the low 16 bits are folded back in
/// after every addition.
#[must_use]
pub fn checksum(block: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for pair in block.chunks(2) {
        let hi = u32::from(pair[0]) << 8;
        let lo = pair.get(1).copied().map_or(0, u32::from);
        sum += hi | lo;
        if sum > 0xFFFF {
            sum = (sum & 0xFFFF) + 1;
        }
    }

    !(sum as u16)
}

/// 128-bit whole-file digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest128([u8; DIGEST_SIZE]);

impl Digest128 {
    /// Create from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest128 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest128({})", self.to_hex())
    }
}

/// Incremental digest over the concatenation of all blocks fed to it.
#[derive(Clone, Default)]
pub struct FileDigest {
    hasher: blake3::Hasher,
    bytes: u64,
}

impl FileDigest {
    /// Start an empty digest.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block.
    pub fn update(&mut self, block: &[u8]) {
        self.hasher.update(block);
        self.bytes += block.len() as u64;
    }

    /// Number of bytes digested so far.
    #[must_use]
    pub fn bytes_digested(&self) -> u64 {
        self.bytes
    }

    /// Finish and return the 128-bit digest.
    #[must_use]
    pub fn finalize(&self) -> Digest128 {
        let mut out = [0u8; DIGEST_SIZE];
        self.hasher.finalize_xof().fill(&mut out);
        Digest128(out)
    }
}

/// Digest of the in-order concatenation of `blocks`.
#[must_use]
pub fn digest<I, B>(blocks: I) -> Digest128
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut acc = FileDigest::new();
    for block in blocks {
        acc.update(block.as_ref());
    }
    acc.finalize()
}
