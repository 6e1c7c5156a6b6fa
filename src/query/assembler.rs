//! Rebuilding nested objects from an ordered record scan
//!
//! Records arrive sorted by key, so all records below one container are
//! contiguous. The assembler only remembers the chain of containers that is
//! currently open; memory is proportional to depth, not to output size.

use crate::error::QueryError;
use std::io::Write;

/// Writes `{...}` output for a sorted stream of `(segments, scalar)` records
#[derive(Debug)]
pub struct ObjectAssembler {
    /// Names of the containers currently open below the top-level object
    open: Vec<Vec<u8>>,
    /// One flag per open level plus the top level; true until a member is written
    first_child: Vec<bool>,
    records: usize,
}

impl Default for ObjectAssembler {
    fn default() -> Self {
        ObjectAssembler::new()
    }
}

impl ObjectAssembler {
    pub fn new() -> Self {
        ObjectAssembler {
            open: Vec::new(),
            first_child: vec![true],
            records: 0,
        }
    }

    /// Open the top-level object
    pub fn begin<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<(), QueryError> {
        out.write_all(b"{")?;
        Ok(())
    }

    /// Emit one record given its segments relative to the queried node
    pub fn push<W: Write + ?Sized>(
        &mut self,
        segments: &[&[u8]],
        value: &[u8],
        out: &mut W,
    ) -> Result<(), QueryError> {
        let Some((leaf, containers)) = segments.split_last() else {
            return Err(QueryError::InvalidKey("record has no path segments".to_string()));
        };

        let divergence = self
            .open
            .iter()
            .zip(containers)
            .take_while(|(open, segment)| open.as_slice() == **segment)
            .count();

        while self.open.len() > divergence {
            out.write_all(b"}")?;
            self.open.pop();
            self.first_child.pop();
        }

        for segment in &containers[divergence..] {
            self.separate(out)?;
            write_name(out, segment)?;
            out.write_all(b":{")?;
            self.open.push(segment.to_vec());
            self.first_child.push(true);
        }

        self.separate(out)?;
        write_name(out, leaf)?;
        out.write_all(b":")?;
        out.write_all(value)?;

        self.records += 1;
        Ok(())
    }

    /// Close every open level and the top-level object
    pub fn finish<W: Write + ?Sized>(self, out: &mut W) -> Result<usize, QueryError> {
        for _ in &self.open {
            out.write_all(b"}")?;
        }
        out.write_all(b"}\n")?;
        Ok(self.records)
    }

    /// Number of containers currently open below the top level
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    fn separate<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<(), QueryError> {
        if let Some(first) = self.first_child.last_mut() {
            if !*first {
                out.write_all(b",")?;
            }
            *first = false;
        }
        Ok(())
    }
}

fn write_name<W: Write + ?Sized>(out: &mut W, name: &[u8]) -> Result<(), QueryError> {
    let name = std::str::from_utf8(name)
        .map_err(|_| QueryError::InvalidKey(format!("segment is not UTF-8: {:?}", name)))?;
    serde_json::to_writer(out, name).map_err(|err| QueryError::Io(err.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records given as `/`-joined relative paths
    fn assemble(records: &[(&str, &str)]) -> String {
        let mut out = Vec::new();
        let mut assembler = ObjectAssembler::new();
        assembler.begin(&mut out).unwrap();
        for (path, value) in records {
            let segments: Vec<&[u8]> = path.split('/').map(str::as_bytes).collect();
            assembler.push(&segments, value.as_bytes(), &mut out).unwrap();
        }
        assembler.finish(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_flat_members() {
        let out = assemble(&[("a", "1"), ("b", "\"x\"")]);
        assert_eq!(out, "{\"a\":1,\"b\":\"x\"}\n");
    }

    #[test]
    fn test_nested_containers() {
        let out = assemble(&[
            ("b/0", "1"),
            ("b/1", "2"),
            ("c", "\"x\""),
        ]);
        assert_eq!(out, "{\"b\":{\"0\":1,\"1\":2},\"c\":\"x\"}\n");
    }

    #[test]
    fn test_close_several_levels_at_once() {
        let out = assemble(&[
            ("a/b/c", "1"),
            ("a/d", "2"),
            ("e/f/g", "3"),
        ]);
        assert_eq!(
            out,
            "{\"a\":{\"b\":{\"c\":1},\"d\":2},\"e\":{\"f\":{\"g\":3}}}\n"
        );
    }

    #[test]
    fn test_sibling_containers_share_parent() {
        let out = assemble(&[("a/x/1", "1"), ("a/y/2", "2")]);
        assert_eq!(out, "{\"a\":{\"x\":{\"1\":1},\"y\":{\"2\":2}}}\n");
    }

    #[test]
    fn test_names_are_json_escaped() {
        let out = assemble(&[("say \"hi\"", "true")]);
        assert_eq!(out, "{\"say \\\"hi\\\"\":true}\n");
    }

    #[test]
    fn test_depth_tracks_open_levels() {
        let mut out = Vec::new();
        let mut assembler = ObjectAssembler::new();
        assembler.begin(&mut out).unwrap();
        assembler.push(&[&b"a"[..], &b"b"[..], &b"c"[..]], b"1", &mut out).unwrap();
        assert_eq!(assembler.depth(), 2);
        assembler.push(&[&b"d"[..]], b"2", &mut out).unwrap();
        assert_eq!(assembler.depth(), 0);
        assert_eq!(assembler.finish(&mut out).unwrap(), 2);
    }

    #[test]
    fn test_rejects_non_utf8_segment() {
        let mut out = Vec::new();
        let mut assembler = ObjectAssembler::new();
        let err = assembler.push(&[&[0xff][..]], b"1", &mut out).unwrap_err();
        assert!(matches!(err, QueryError::InvalidKey(_)));
    }
}
