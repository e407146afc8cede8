//! Wire messages exchanged by sender and receiver.
//!
//! Every message is one transport frame. All integers are big-endian.
//!
//! ```text
//!  Offset  Size  Field
//!  0       1     Version (0x01)
//!  1       1     Tag
//!  2       ...   Body
//!
//!  Start (0x01):      name_len u16 | name | file_size u64 | chunk_size u32 | key_len u16 | wrapped_key
//!  Chunk (0x02):      sequence u32 | checksum u16 | ct_len u32 | ciphertext
//!  Ack (0x03):        next_expected i32
//!  Stop (0x04):       (empty)
//!  Disconnect (0x05): (empty)
//! ```

use thiserror::Error;

/// Wire format version.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the version + tag prefix.
pub const MESSAGE_HEADER_SIZE: usize = 2;

/// Negative acknowledgment value: the receiver rejected or stopped the session.
pub const ACK_REJECT: i32 = -1;

/// Message decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    /// Input ended before a field was complete
    #[error("Message too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Bytes needed
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Version byte is not [`PROTOCOL_VERSION`]
    #[error("Unsupported protocol version: 0x{0:02x}")]
    UnsupportedVersion(u8),

    /// Tag byte names no known message
    #[error("Unknown message tag: 0x{0:02x}")]
    UnknownTag(u8),

    /// File name is not valid UTF-8
    #[error("File name is not valid UTF-8")]
    InvalidFileName,

    /// A variable-length field does not fit its length prefix
    #[error("Field too long: {field} is {len} bytes (max {max})")]
    FieldTooLong {
        /// Field name
        field: &'static str,
        /// Actual length
        len: usize,
        /// Maximum encodable length
        max: usize,
    },

    /// Bytes left over after the message body
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

/// Message tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    /// Session start with wrapped key
    Start = 0x01,
    /// Encrypted file chunk
    Chunk = 0x02,
    /// Acknowledgment
    Ack = 0x03,
    /// Stop the transfer
    Stop = 0x04,
    /// Sender is done with the connection
    Disconnect = 0x05,
}

impl TryFrom<u8> for MessageTag {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Start),
            0x02 => Ok(Self::Chunk),
            0x03 => Ok(Self::Ack),
            0x04 => Ok(Self::Stop),
            0x05 => Ok(Self::Disconnect),
            other => Err(MessageError::UnknownTag(other)),
        }
    }
}

impl From<MessageTag> for u8 {
    fn from(tag: MessageTag) -> Self {
        tag as u8
    }
}

/// Protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Opens a session: names the file, carries the wrapped session key.
    Start {
        /// Name of the file being sent
        file_name: String,
        /// Session key wrapped under the receiver's public key
        wrapped_key: Vec<u8>,
        /// Plaintext bytes per chunk (the last chunk may be shorter)
        chunk_size: u32,
        /// Total plaintext size of the file
        file_size: u64,
    },
    /// One encrypted chunk.
    Chunk {
        /// Zero-based chunk index
        sequence: u32,
        /// Encrypted chunk (nonce, ciphertext and tag)
        ciphertext: Vec<u8>,
        /// Checksum of the plaintext chunk
        checksum: u16,
    },
    /// Acknowledgment carrying the next expected sequence number.
    /// Negative values signal rejection.
    Ack {
        /// Next sequence the receiver expects, or [`ACK_REJECT`]
        next_expected: i32,
    },
    /// Stop the transfer.
    Stop,
    /// Sender is leaving.
    Disconnect,
}

impl Message {
    /// Tag for this message.
    #[must_use]
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::Start { .. } => MessageTag::Start,
            Self::Chunk { .. } => MessageTag::Chunk,
            Self::Ack { .. } => MessageTag::Ack,
            Self::Stop => MessageTag::Stop,
            Self::Disconnect => MessageTag::Disconnect,
        }
    }

    /// Negative acknowledgment.
    #[must_use]
    pub fn reject() -> Self {
        Self::Ack {
            next_expected: ACK_REJECT,
        }
    }

    /// Encode into a single frame.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::FieldTooLong` if a variable-length field does
    /// not fit its length prefix.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(PROTOCOL_VERSION);
        buf.push(self.tag().into());

        match self {
            Self::Start {
                file_name,
                wrapped_key,
                chunk_size,
                file_size,
            } => {
                put_len_u16(&mut buf, "file_name", file_name.len())?;
                buf.extend_from_slice(file_name.as_bytes());
                buf.extend_from_slice(&file_size.to_be_bytes());
                buf.extend_from_slice(&chunk_size.to_be_bytes());
                put_len_u16(&mut buf, "wrapped_key", wrapped_key.len())?;
                buf.extend_from_slice(wrapped_key);
            }
            Self::Chunk {
                sequence,
                ciphertext,
                checksum,
            } => {
                buf.extend_from_slice(&sequence.to_be_bytes());
                buf.extend_from_slice(&checksum.to_be_bytes());
                let len = u32::try_from(ciphertext.len()).map_err(|_| {
                    MessageError::FieldTooLong {
                        field: "ciphertext",
                        len: ciphertext.len(),
                        max: u32::MAX as usize,
                    }
                })?;
                buf.extend_from_slice(&len.to_be_bytes());
                buf.extend_from_slice(ciphertext);
            }
            Self::Ack { next_expected } => {
                buf.extend_from_slice(&next_expected.to_be_bytes());
            }
            Self::Stop | Self::Disconnect => {}
        }

        Ok(buf)
    }

    /// Decode a single frame.
    ///
    /// # Errors
    ///
    /// Returns a `MessageError` if the frame is truncated, has an unknown
    /// version or tag, an invalid file name, or trailing bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        let mut r = Reader::new(buf);
        let version = r.u8()?;
        if version != PROTOCOL_VERSION {
            return Err(MessageError::UnsupportedVersion(version));
        }

        let msg = match MessageTag::try_from(r.u8()?)? {
            MessageTag::Start => {
                let name_len = usize::from(r.u16()?);
                let file_name = String::from_utf8(r.bytes(name_len)?.to_vec())
                    .map_err(|_| MessageError::InvalidFileName)?;
                let file_size = r.u64()?;
                let chunk_size = r.u32()?;
                let key_len = usize::from(r.u16()?);
                let wrapped_key = r.bytes(key_len)?.to_vec();
                Self::Start {
                    file_name,
                    wrapped_key,
                    chunk_size,
                    file_size,
                }
            }
            MessageTag::Chunk => {
                let sequence = r.u32()?;
                let checksum = r.u16()?;
                let len = r.u32()? as usize;
                let ciphertext = r.bytes(len)?.to_vec();
                Self::Chunk {
                    sequence,
                    ciphertext,
                    checksum,
                }
            }
            MessageTag::Ack => Self::Ack {
                next_expected: r.i32()?,
            },
            MessageTag::Stop => Self::Stop,
            MessageTag::Disconnect => Self::Disconnect,
        };

        match r.remaining() {
            0 => Ok(msg),
            n => Err(MessageError::TrailingBytes(n)),
        }
    }

    fn encoded_len(&self) -> usize {
        MESSAGE_HEADER_SIZE
            + match self {
                Self::Start {
                    file_name,
                    wrapped_key,
                    ..
                } => 2 + file_name.len() + 8 + 4 + 2 + wrapped_key.len(),
                Self::Chunk { ciphertext, .. } => 4 + 2 + 4 + ciphertext.len(),
                Self::Ack { .. } => 4,
                Self::Stop | Self::Disconnect => 0,
            }
    }
}

fn put_len_u16(buf: &mut Vec<u8>, field: &'static str, len: usize) -> Result<(), MessageError> {
    let len16 = u16::try_from(len).map_err(|_| MessageError::FieldTooLong {
        field,
        len,
        max: u16::MAX as usize,
    })?;
    buf.extend_from_slice(&len16.to_be_bytes());
    Ok(())
}

/// Bounds-checked big-endian cursor.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8], MessageError> {
        if self.remaining() < n {
            return Err(MessageError::TooShort {
                expected: self.pos + n,
                actual: self.buf.len(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], MessageError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, MessageError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, MessageError> {
        self.array().map(u16::from_be_bytes)
    }

    fn u32(&mut self) -> Result<u32, MessageError> {
        self.array().map(u32::from_be_bytes)
    }

    fn i32(&mut self) -> Result<i32, MessageError> {
        self.array().map(i32::from_be_bytes)
    }

    fn u64(&mut self) -> Result<u64, MessageError> {
        self.array().map(u64::from_be_bytes)
    }
}
