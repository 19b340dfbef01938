use crate::error::{BridgeError, Result};
use crate::files::FileType;
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, TimeZone, Utc};

// File mode constants
const S_IFMT: u32 = 0o170000; // bit mask for the file type bit field
const S_IFSOCK: u32 = 0o140000; // socket
const S_IFLNK: u32 = 0o120000; // symbolic link
const S_IFREG: u32 = 0o100000; // regular file
const S_IFBLK: u32 = 0o060000; // block device
const S_IFDIR: u32 = 0o040000; // directory
const S_IFCHR: u32 = 0o020000; // character device
const S_IFIFO: u32 = 0o010000; // FIFO

/// Largest payload a 4-hex-digit length prefix can describe.
pub const MAX_REQUEST_LENGTH: usize = 0xFFFF;

pub const OKAY: &[u8; 4] = b"OKAY";
pub const FAIL: &[u8; 4] = b"FAIL";

/// Frame a request as `<4 hex digits of length><payload>`.
///
/// The payload is sent as Latin-1, one byte per character; characters outside
/// that range are replaced by `?`.
pub fn format_request(payload: &str) -> Result<Bytes> {
    let encoded = latin1_encode(payload);
    if encoded.len() > MAX_REQUEST_LENGTH {
        return Err(BridgeError::RequestTooLong(encoded.len()));
    }

    let mut buf = BytesMut::with_capacity(4 + encoded.len());
    buf.put_slice(format!("{:04X}", encoded.len()).as_bytes());
    buf.put_slice(&encoded);
    Ok(buf.freeze())
}

/// Parse a 4-digit hex length field. `None` when the field is malformed.
pub fn parse_frame_length(field: &[u8]) -> Option<usize> {
    if field.len() != 4 {
        return None;
    }
    let text = std::str::from_utf8(field).ok()?;
    usize::from_str_radix(text, 16).ok()
}

pub fn is_okay(status: &[u8]) -> bool {
    status == OKAY
}

pub fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if (c as u32) <= 0xFF { c as u8 } else { b'?' })
        .collect()
}

pub fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Sync protocol commands
pub mod sync {
    pub const DATA: &[u8; 4] = b"DATA";
    pub const DONE: &[u8; 4] = b"DONE";
    pub const SEND: &[u8; 4] = b"SEND";
    pub const RECV: &[u8; 4] = b"RECV";
    pub const STAT: &[u8; 4] = b"STAT";
    pub use super::{FAIL, OKAY};

    /// Largest DATA payload either side may send.
    pub const MAX_CHUNK: usize = 64 * 1024;
    /// Longest remote path RECV and SEND accept, in encoded bytes.
    pub const MAX_PATH_LENGTH: usize = 1024;
    /// Permission suffix appended to SEND paths: 0644 written in decimal.
    pub const DEFAULT_MODE_SUFFIX: &str = ",420";

    pub const HEADER_SIZE: usize = 8;
    pub const STAT_REPLY_SIZE: usize = 16;
}

/// `tag + LE u32 value`, the shape of DONE and bare DATA headers.
pub fn sync_request(tag: &[u8; 4], value: u32) -> [u8; sync::HEADER_SIZE] {
    let mut out = [0u8; sync::HEADER_SIZE];
    out[..4].copy_from_slice(tag);
    out[4..].copy_from_slice(&value.to_le_bytes());
    out
}

/// `tag + LE u32 path length + path`, used by STAT and RECV.
pub fn file_request(tag: &[u8; 4], path: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(sync::HEADER_SIZE + path.len());
    buf.put_slice(tag);
    buf.put_u32_le(path.len() as u32);
    buf.put_slice(path);
    buf.freeze()
}

/// SEND request: the mode suffix is folded into the length-prefixed path blob.
pub fn send_file_request(path: &[u8], mode_suffix: &str) -> Bytes {
    let mut blob = Vec::with_capacity(path.len() + mode_suffix.len());
    blob.extend_from_slice(path);
    blob.extend_from_slice(mode_suffix.as_bytes());
    file_request(sync::SEND, &blob)
}

/// An 8-byte sync header: a tag followed by a little-endian length or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncHeader {
    pub tag: [u8; 4],
    pub length: u32,
}

impl SyncHeader {
    pub fn parse(bytes: &[u8; sync::HEADER_SIZE]) -> Self {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&bytes[..4]);
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self { tag, length }
    }

    pub fn is(&self, tag: &[u8; 4]) -> bool {
        &self.tag == tag
    }

    pub fn tag_str(&self) -> String {
        latin1_decode(&self.tag)
    }
}

/// File metadata from a STAT reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FileStat {
    pub mode: u32,
    pub size: u32,
    pub mtime: u32,
}

impl FileStat {
    /// Decode `STAT + mode + size + mtime`. `None` if the tag is not `STAT`.
    pub fn from_reply(reply: &[u8; sync::STAT_REPLY_SIZE]) -> Option<Self> {
        if &reply[..4] != sync::STAT {
            return None;
        }
        let word = |at: usize| {
            u32::from_le_bytes([reply[at], reply[at + 1], reply[at + 2], reply[at + 3]])
        };
        Some(Self {
            mode: word(4),
            size: word(8),
            mtime: word(12),
        })
    }

    /// A zero mode is how the daemon reports a path that does not exist.
    pub fn exists(&self) -> bool {
        self.mode != 0
    }

    pub fn file_type(&self) -> FileType {
        match self.mode & S_IFMT {
            S_IFSOCK => FileType::Socket,
            S_IFLNK => FileType::Link,
            S_IFREG => FileType::File,
            S_IFBLK => FileType::Block,
            S_IFDIR => FileType::Directory,
            S_IFCHR => FileType::Character,
            S_IFIFO => FileType::Fifo,
            _ => FileType::Other,
        }
    }

    pub fn is_dir(&self) -> bool {
        (self.mode & S_IFMT) == S_IFDIR
    }

    pub fn permissions(&self) -> String {
        format!("{:03o}", self.mode & 0o777)
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.mtime), 0).single()
    }
}
