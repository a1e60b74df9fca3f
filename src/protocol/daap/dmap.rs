//! DMAP (Digital Media Access Protocol) encoding and decoding

use std::fmt;

use thiserror::Error;

/// DMAP content codes (tags)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmapTag {
    /// Item name (track title)
    ItemName,
    /// Song artist
    SongArtist,
    /// Song album
    SongAlbum,
    /// Song genre
    SongGenre,
    /// Song comment
    SongComment,
    /// Song composer
    SongComposer,
    /// Song description (file kind, e.g. "MPEG audio file")
    SongDescription,
    /// Sort name
    SortName,
    /// Listing item (container)
    ListingItem,
    /// Unknown tag
    Unknown([u8; 4]),
}

impl DmapTag {
    /// Get 4-character code for tag
    #[must_use]
    pub fn code(&self) -> [u8; 4] {
        match self {
            Self::ItemName => *b"minm",
            Self::SongArtist => *b"asar",
            Self::SongAlbum => *b"asal",
            Self::SongGenre => *b"asgn",
            Self::SongComment => *b"ascm",
            Self::SongComposer => *b"ascp",
            Self::SongDescription => *b"asdt",
            Self::SortName => *b"assn",
            Self::ListingItem => *b"mlit",
            Self::Unknown(code) => *code,
        }
    }

    /// Create tag from bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"minm" => Self::ItemName,
            b"asar" => Self::SongArtist,
            b"asal" => Self::SongAlbum,
            b"asgn" => Self::SongGenre,
            b"ascm" => Self::SongComment,
            b"ascp" => Self::SongComposer,
            b"asdt" => Self::SongDescription,
            b"assn" => Self::SortName,
            b"mlit" => Self::ListingItem,
            _ => Self::Unknown(bytes),
        }
    }

    /// Check if this tag represents a container
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::ListingItem)
    }
}

impl fmt::Display for DmapTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.code()))
    }
}

/// DMAP value types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DmapValue {
    /// Text value (UTF-8, lossily decoded)
    Text(String),
    /// Container (nested DMAP)
    Container(Vec<(DmapTag, DmapValue)>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DmapDecodeError {
    #[error("unexpected end of data: record needs {needed} bytes, {have} left")]
    UnexpectedEnd { needed: usize, have: usize },

    #[error("containers nested deeper than {max} levels")]
    TooDeep { max: usize },
}

/// DMAP parser
pub struct DmapParser;

impl DmapParser {
    /// Record header size (code + length)
    const HEADER: usize = 8;

    /// Deepest container nesting accepted; senders use one level
    pub const MAX_DEPTH: usize = 16;

    /// Parse DMAP data into a list of records
    ///
    /// # Errors
    ///
    /// Returns `DmapDecodeError` if a record is truncated or containers nest
    /// deeper than [`Self::MAX_DEPTH`].
    pub fn parse(data: &[u8]) -> Result<Vec<(DmapTag, DmapValue)>, DmapDecodeError> {
        Self::parse_nested(data, 0)
    }

    fn parse_nested(
        data: &[u8],
        depth: usize,
    ) -> Result<Vec<(DmapTag, DmapValue)>, DmapDecodeError> {
        if depth > Self::MAX_DEPTH {
            return Err(DmapDecodeError::TooDeep {
                max: Self::MAX_DEPTH,
            });
        }

        let mut items = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            if rest.len() < Self::HEADER {
                return Err(DmapDecodeError::UnexpectedEnd {
                    needed: Self::HEADER,
                    have: rest.len(),
                });
            }

            let tag = DmapTag::from_bytes([rest[0], rest[1], rest[2], rest[3]]);
            let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
            rest = &rest[Self::HEADER..];

            if len > rest.len() {
                return Err(DmapDecodeError::UnexpectedEnd {
                    needed: len,
                    have: rest.len(),
                });
            }

            let (value_bytes, tail) = rest.split_at(len);
            rest = tail;

            let value = if tag.is_container() {
                DmapValue::Container(Self::parse_nested(value_bytes, depth + 1)?)
            } else {
                DmapValue::Text(String::from_utf8_lossy(value_bytes).into_owned())
            };

            items.push((tag, value));
        }

        Ok(items)
    }

    /// Parse and flatten containers into `(tag, text)` pairs in wire order
    ///
    /// # Errors
    ///
    /// Returns `DmapDecodeError` under the same conditions as [`Self::parse`].
    pub fn parse_flat(data: &[u8]) -> Result<Vec<(DmapTag, String)>, DmapDecodeError> {
        fn flatten(items: Vec<(DmapTag, DmapValue)>, acc: &mut Vec<(DmapTag, String)>) {
            for (tag, value) in items {
                match value {
                    DmapValue::Text(text) => acc.push((tag, text)),
                    DmapValue::Container(inner) => flatten(inner, acc),
                }
            }
        }

        let mut result = Vec::new();
        flatten(Self::parse(data)?, &mut result);
        Ok(result)
    }
}

/// DMAP encoder
#[derive(Debug, Default)]
pub struct DmapEncoder {
    buffer: Vec<u8>,
}

impl DmapEncoder {
    /// Create new encoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string record
    pub fn string(&mut self, tag: DmapTag, value: &str) {
        self.raw(tag, value.as_bytes());
    }

    /// Add a container record holding everything `inner` encoded
    pub fn container(&mut self, tag: DmapTag, inner: DmapEncoder) {
        self.raw(tag, &inner.finish());
    }

    /// Add a record with raw value bytes
    pub fn raw(&mut self, tag: DmapTag, value: &[u8]) {
        self.buffer.extend_from_slice(&tag.code());
        #[allow(clippy::cast_possible_truncation)]
        let len = value.len() as u32;
        self.buffer.extend_from_slice(&len.to_be_bytes());
        self.buffer.extend_from_slice(value);
    }

    /// Finish encoding and return bytes
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.buffer
    }
}
