//! Flat key encoding
//!
//! A position in a JSON document is the list of segments from the root to
//! that node. Each segment is written as the separator byte followed by its
//! text, so the root encodes to the empty key and `{"a":{"b":[true]}}`
//! stores its only leaf under `/a/b/0`.
//!
//! Key `a` is an ancestor of key `b` exactly when `a` followed by the
//! separator is a byte prefix of `b`. A field name that contains the
//! separator breaks this; such names are stored verbatim and reported by the
//! importer rather than escaped.

use crate::types::IndexEncoding;
use std::fmt;

/// One step from a container into a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Object field name
    Field(&'a str),
    /// Array position
    Index(usize),
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Encodes segment lists into flat keys and splits them back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCodec {
    separator: u8,
    index_encoding: IndexEncoding,
}

impl Default for KeyCodec {
    fn default() -> Self {
        KeyCodec::new(b'/', IndexEncoding::Decimal)
    }
}

impl KeyCodec {
    pub fn new(separator: u8, index_encoding: IndexEncoding) -> Self {
        KeyCodec {
            separator,
            index_encoding,
        }
    }

    pub fn separator(&self) -> u8 {
        self.separator
    }

    pub fn index_encoding(&self) -> IndexEncoding {
        self.index_encoding
    }

    /// Append one segment to a key under construction
    pub fn push_segment(&self, key: &mut Vec<u8>, segment: &Segment<'_>) {
        key.push(self.separator);
        match *segment {
            Segment::Field(name) => key.extend_from_slice(name.as_bytes()),
            Segment::Index(index) => key.extend_from_slice(self.index_text(index).as_bytes()),
        }
    }

    /// Encode a full root-to-node path
    pub fn encode(&self, segments: &[Segment<'_>]) -> Vec<u8> {
        let mut key = Vec::new();
        for segment in segments {
            self.push_segment(&mut key, segment);
        }
        key
    }

    /// Split an encoded key back into segment texts
    ///
    /// The empty key is the root and splits into no segments.
    pub fn split<'k>(&self, key: &'k [u8]) -> Vec<&'k [u8]> {
        match key.split_first() {
            None => Vec::new(),
            Some((&first, rest)) if first == self.separator => self.split_relative(rest),
            Some(_) => self.split_relative(key),
        }
    }

    /// Split the part of a key that follows a child prefix
    ///
    /// Always yields at least one segment, possibly an empty field name.
    pub fn split_relative<'k>(&self, rest: &'k [u8]) -> Vec<&'k [u8]> {
        rest.split(|&b| b == self.separator).collect()
    }

    /// Prefix shared by every key strictly below `key`
    pub fn child_prefix(&self, key: &[u8]) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(key.len() + 1);
        prefix.extend_from_slice(key);
        prefix.push(self.separator);
        prefix
    }

    /// True when `ancestor` is a proper ancestor of `descendant`
    pub fn is_ancestor(&self, ancestor: &[u8], descendant: &[u8]) -> bool {
        descendant.len() > ancestor.len()
            && descendant.starts_with(ancestor)
            && descendant[ancestor.len()] == self.separator
    }

    /// True when a field name would blur key boundaries
    pub fn is_ambiguous(&self, name: &str) -> bool {
        name.as_bytes().contains(&self.separator)
    }

    fn index_text(&self, index: usize) -> String {
        match self.index_encoding {
            IndexEncoding::Decimal => index.to_string(),
            IndexEncoding::Padded { width } => format!("{:0width$}", index, width = width),
        }
    }
}

/// A query path as received from a caller, e.g. `users/3/name`
///
/// Segments are kept as text; an array element is addressed by the same text
/// the importer wrote for its index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryPath {
    segments: Vec<String>,
}

impl QueryPath {
    /// Parse a `/`-joined path; leading and trailing `/` are ignored
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return QueryPath::root();
        }
        QueryPath {
            segments: trimmed.split('/').map(str::to_string).collect(),
        }
    }

    pub fn root() -> Self {
        QueryPath::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        self.segments.iter().map(|s| Segment::Field(s.as_str()))
    }

    /// Flat key of the node this path names
    pub fn encode(&self, codec: &KeyCodec) -> Vec<u8> {
        let segments: Vec<Segment<'_>> = self.segments().collect();
        codec.encode(&segments)
    }
}

impl fmt::Display for QueryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
