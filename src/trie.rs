//! Export trie parsing.
//!
//! The export trie is a compact prefix tree of the symbols a Mach-O image
//! exports, produced by the linker and consumed by dyld. Each node carries
//! an optional terminal payload (the export itself) followed by its child
//! edges:
//!
//! ```text
//! <terminal_size: ULEB128>
//! <terminal_payload: terminal_size bytes>     absent when terminal_size == 0
//! <child_count: 1 byte>
//! child_count x { <edge_label: NUL-terminated> <child_offset: ULEB128> }
//! ```
//!
//! Child offsets are relative to the start of the trie region. Two access
//! patterns are supported: [`parse_trie_exports`] enumerates every export,
//! and [`walk_trie`] locates a single symbol without materialising the tree.

use std::fmt;

use crate::error::{Error, Result};
use crate::leb128::read_uleb128;

// =============================================================================
// Export Flags
// =============================================================================

/// Export symbol kind mask.
pub const EXPORT_SYMBOL_FLAGS_KIND_MASK: u64 = 0x03;

/// Regular export.
pub const EXPORT_SYMBOL_FLAGS_KIND_REGULAR: u64 = 0x00;

/// Thread-local variable.
pub const EXPORT_SYMBOL_FLAGS_KIND_THREAD_LOCAL: u64 = 0x01;

/// Absolute symbol (not relative to any section).
pub const EXPORT_SYMBOL_FLAGS_KIND_ABSOLUTE: u64 = 0x02;

/// Weak definition.
pub const EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION: u64 = 0x04;

/// Re-export from another dylib.
pub const EXPORT_SYMBOL_FLAGS_REEXPORT: u64 = 0x08;

/// Stub with a resolver function.
pub const EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER: u64 = 0x10;

/// Flags carried by a trie terminal payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFlags(pub u64);

impl ExportFlags {
    /// Returns the symbol kind bits.
    #[inline]
    pub fn kind(self) -> u64 {
        self.0 & EXPORT_SYMBOL_FLAGS_KIND_MASK
    }

    /// Returns true for a regular export.
    #[inline]
    pub fn is_regular(self) -> bool {
        self.kind() == EXPORT_SYMBOL_FLAGS_KIND_REGULAR
    }

    /// Returns true for a thread-local variable.
    #[inline]
    pub fn is_thread_local(self) -> bool {
        self.kind() == EXPORT_SYMBOL_FLAGS_KIND_THREAD_LOCAL
    }

    /// Returns true for an absolute symbol.
    #[inline]
    pub fn is_absolute(self) -> bool {
        self.kind() == EXPORT_SYMBOL_FLAGS_KIND_ABSOLUTE
    }

    /// Returns true for a weak definition.
    #[inline]
    pub fn is_weak_definition(self) -> bool {
        self.0 & EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION != 0
    }

    /// Returns true for a re-export from another dylib.
    #[inline]
    pub fn is_reexport(self) -> bool {
        self.0 & EXPORT_SYMBOL_FLAGS_REEXPORT != 0
    }

    /// Returns true for a stub with a resolver function.
    #[inline]
    pub fn is_stub_and_resolver(self) -> bool {
        self.0 & EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER != 0
    }
}

// =============================================================================
// Trie Types
// =============================================================================

/// Longest accumulated edge path accepted before a trie is considered
/// malformed.
pub const MAX_TRIE_PATH: usize = 32_768;

/// A terminal node discovered by [`parse_trie`].
#[derive(Debug, Clone)]
pub struct TrieNode {
    /// Offset of the terminal payload within the trie region.
    pub offset: usize,
    /// Edge bytes accumulated from the root to this node (the symbol name).
    pub path: Vec<u8>,
}

/// An exported symbol decoded from a terminal payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieExport {
    /// Symbol name (the accumulated trie path).
    pub name: String,
    /// Imported name for re-exports that rename the symbol.
    pub reexport: Option<String>,
    /// Export flags.
    pub flags: ExportFlags,
    /// Re-export ordinal, or resolver address for stub-and-resolver exports.
    pub other: u64,
    /// Symbol address, biased by the load address for regular and
    /// thread-local exports.
    pub address: u64,
    /// Label of the dylib the export was found in, when enumerated across
    /// images.
    pub found_in_dylib: Option<String>,
}

impl fmt::Display for TrieExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.is_reexport() {
            let dylib = self.found_in_dylib.as_deref().unwrap_or("");
            match &self.reexport {
                Some(re) => write!(
                    f,
                    "{:#09x}:\t({} re-exported from {})\t{}",
                    self.address, re, dylib, self.name
                ),
                None => write!(f, "{:#09x}:\t(from {})\t{}", self.address, dylib, self.name),
            }
        } else if self.flags.is_stub_and_resolver() {
            write!(
                f,
                "{:#09x}:\t(resolver={:#8x})\t{}",
                self.address, self.other, self.name
            )
        } else if let Some(dylib) = &self.found_in_dylib {
            write!(f, "{:#09x}: {}\t{}", self.address, self.name, dylib)
        } else {
            write!(f, "{:#09x}:\t{}", self.address, self.name)
        }
    }
}

// =============================================================================
// Enumeration
// =============================================================================

/// Collects every terminal node in the trie.
///
/// Traversal is depth-first from offset 0 with an explicit stack. A node
/// whose accumulated path grows beyond [`MAX_TRIE_PATH`] bytes fails with
/// [`Error::MalformedTrie`]; a child offset outside the region fails with
/// [`Error::InvalidTrieNode`].
pub fn parse_trie(data: &[u8]) -> Result<Vec<TrieNode>> {
    let mut terminals = Vec::new();
    if data.is_empty() {
        return Ok(terminals);
    }

    let mut stack = vec![TrieNode {
        offset: 0,
        path: Vec::new(),
    }];

    while let Some(node) = stack.pop() {
        if node.offset >= data.len() {
            return Err(Error::InvalidTrieNode {
                offset: node.offset,
            });
        }

        let (terminal_size, uleb_len) = read_uleb128(&data[node.offset..])?;
        let payload_offset = node.offset + uleb_len;

        if terminal_size != 0 {
            terminals.push(TrieNode {
                offset: payload_offset,
                path: node.path.clone(),
            });
        }

        let mut cursor = payload_offset + terminal_size as usize;
        if cursor >= data.len() {
            // Truncated node: no child list to walk.
            continue;
        }

        let child_count = data[cursor];
        cursor += 1;

        for _ in 0..child_count {
            let label_end = match memchr::memchr(0, &data[cursor..]) {
                Some(i) => cursor + i,
                None => data.len(),
            };

            let mut path = node.path.clone();
            path.extend_from_slice(&data[cursor..label_end]);
            if path.len() > MAX_TRIE_PATH {
                return Err(Error::MalformedTrie {
                    length: path.len(),
                    max: MAX_TRIE_PATH,
                });
            }
            cursor = (label_end + 1).min(data.len());

            let (child_offset, n) = read_uleb128(&data[cursor..])?;
            cursor += n;

            stack.push(TrieNode {
                offset: child_offset as usize,
                path,
            });
        }
    }

    Ok(terminals)
}

/// Enumerates every export in the trie, biasing addresses by
/// `load_address`.
pub fn parse_trie_exports(data: &[u8], load_address: u64) -> Result<Vec<TrieExport>> {
    let nodes = parse_trie(data)?;
    let mut exports = Vec::with_capacity(nodes.len());

    for node in nodes {
        let name = String::from_utf8_lossy(&node.path);
        exports.push(read_export(&data[node.offset..], &name, load_address)?);
    }

    Ok(exports)
}

/// Decodes a terminal payload into an export record.
///
/// `data` must start at the payload (the offset returned by [`walk_trie`]
/// or recorded in a [`TrieNode`]). Regular and thread-local addresses and
/// stub resolver addresses are biased by `load_address`; re-exports keep
/// their symbolic reference, with the ordinal in `other`.
pub fn read_export(data: &[u8], name: &str, load_address: u64) -> Result<TrieExport> {
    let (raw_flags, mut cursor) = read_uleb128(data)?;
    let flags = ExportFlags(raw_flags);

    let mut other = 0u64;
    let mut reexport = None;

    if flags.is_reexport() {
        let (ordinal, n) = read_uleb128(&data[cursor..])?;
        cursor += n;
        other = ordinal;

        let name_end = match memchr::memchr(0, &data[cursor..]) {
            Some(i) => cursor + i,
            None => data.len(),
        };
        if name_end > cursor {
            reexport = Some(String::from_utf8_lossy(&data[cursor..name_end]).into_owned());
        }
        cursor = (name_end + 1).min(data.len());
    } else if flags.is_stub_and_resolver() {
        let (resolver, n) = read_uleb128(&data[cursor..])?;
        cursor += n;
        other = resolver.wrapping_add(load_address);
    }

    let (mut address, _) = read_uleb128(&data[cursor..])?;
    if (flags.is_regular() || flags.is_thread_local()) && !flags.is_reexport() {
        address = address.wrapping_add(load_address);
    }

    Ok(TrieExport {
        name: name.to_string(),
        reexport,
        flags,
        other,
        address,
        found_in_dylib: None,
    })
}

// =============================================================================
// Lookup
// =============================================================================

/// Locates a single symbol in the trie without materialising the tree.
///
/// Returns the offset of the symbol's terminal payload within `data`,
/// suitable for [`read_export`]. An absent symbol is
/// [`Error::SymbolNotInTrie`].
pub fn walk_trie(data: &[u8], symbol: &str) -> Result<usize> {
    let target = symbol.as_bytes();
    let mut str_index = 0usize;
    let mut offset = 0usize;

    loop {
        if offset >= data.len() {
            return Err(Error::InvalidTrieNode { offset });
        }

        // Historical producers wrote the terminal size as a plain byte;
        // anything above 127 is a multi-byte ULEB128 and is re-read with
        // the full codec.
        let first = data[offset];
        let (terminal_size, uleb_len) = if first > 0x7F {
            read_uleb128(&data[offset..])?
        } else {
            (u64::from(first), 1)
        };

        if str_index == target.len() && terminal_size != 0 {
            return Ok(offset + uleb_len);
        }

        let mut cursor = offset + uleb_len + terminal_size as usize;
        if cursor >= data.len() {
            return Err(Error::SymbolNotInTrie);
        }

        let child_count = data[cursor];
        cursor += 1;

        let mut next_offset = None;

        for _ in 0..child_count {
            let mut search_index = str_index;
            let mut wrong_edge = false;

            // Consume the edge label up to its NUL even once it stops
            // matching, so the cursor lands on the child-offset ULEB.
            while cursor < data.len() {
                let c = data[cursor];
                cursor += 1;
                if c == 0 {
                    break;
                }
                if !wrong_edge {
                    if search_index < target.len() && c == target[search_index] {
                        search_index += 1;
                    } else {
                        wrong_edge = true;
                    }
                }
            }

            let (child_offset, n) = read_uleb128(&data[cursor..])?;
            cursor += n;

            if !wrong_edge {
                next_offset = Some(child_offset as usize);
                str_index = search_index;
                break;
            }
        }

        match next_offset {
            Some(next) => offset = next,
            None => return Err(Error::SymbolNotInTrie),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leb128::write_uleb128;

    struct TrieBuilder {
        data: Vec<u8>,
    }

    // Hand-assembled nodes with explicit child offsets; callers lay the
    // nodes out back to front so offsets are known up front.
    impl TrieBuilder {
        fn new() -> Self {
            Self { data: Vec::new() }
        }

        fn node(
            &mut self,
            terminal: Option<&[u8]>,
            children: &[(&[u8], usize)],
        ) -> &mut Self {
            match terminal {
                Some(payload) => {
                    write_uleb128(payload.len() as u64, &mut self.data);
                    self.data.extend_from_slice(payload);
                }
                None => self.data.push(0),
            }
            self.data.push(children.len() as u8);
            for (label, offset) in children {
                self.data.extend_from_slice(label);
                self.data.push(0);
                write_uleb128(*offset as u64, &mut self.data);
            }
            self
        }

        fn offset(&self) -> usize {
            self.data.len()
        }
    }

    fn regular_payload(address: u64) -> Vec<u8> {
        let mut p = Vec::new();
        write_uleb128(EXPORT_SYMBOL_FLAGS_KIND_REGULAR, &mut p);
        write_uleb128(address, &mut p);
        p
    }

    /// Root -> "_a" (terminal, 0x1000) -> "b" (terminal, 0x1010).
    fn sample_trie() -> Vec<u8> {
        let mut b = TrieBuilder::new();
        b.node(None, &[(b"_a", 8)]);
        while b.offset() < 8 {
            b.data.push(0);
        }
        let node_a = b.offset();
        assert_eq!(node_a, 8);
        b.node(Some(&regular_payload(0x1000)), &[(b"b", 16)]);
        while b.offset() < 16 {
            b.data.push(0);
        }
        assert_eq!(b.offset(), 16);
        b.node(Some(&regular_payload(0x1010)), &[]);
        b.data
    }

    #[test]
    fn test_enumerate_exports() {
        let trie = sample_trie();
        let mut exports = parse_trie_exports(&trie, 0).unwrap();
        exports.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(exports.len(), 2);
        assert_eq!(exports[0].name, "_a");
        assert_eq!(exports[0].address, 0x1000);
        assert!(exports[0].flags.is_regular());
        assert_eq!(exports[1].name, "_ab");
        assert_eq!(exports[1].address, 0x1010);
    }

    #[test]
    fn test_load_address_bias() {
        let trie = sample_trie();
        let exports = parse_trie_exports(&trie, 0x1_0000_0000).unwrap();
        for export in exports {
            assert!(export.address >= 0x1_0000_0000);
        }
    }

    #[test]
    fn test_walk_finds_every_enumerated_export() {
        let trie = sample_trie();
        for export in parse_trie_exports(&trie, 0).unwrap() {
            let offset = walk_trie(&trie, &export.name).unwrap();
            let again = read_export(&trie[offset..], &export.name, 0).unwrap();
            assert_eq!(again, export);
        }
    }

    #[test]
    fn test_walk_miss() {
        let trie = sample_trie();
        assert!(matches!(
            walk_trie(&trie, "_ac"),
            Err(Error::SymbolNotInTrie)
        ));
        // A strict prefix of an export with no terminal of its own.
        assert!(matches!(walk_trie(&trie, "_"), Err(Error::SymbolNotInTrie)));
        // A name longer than any path in the trie.
        assert!(matches!(
            walk_trie(&trie, "_abc"),
            Err(Error::SymbolNotInTrie)
        ));
    }

    #[test]
    fn test_multibyte_terminal_size() {
        // Root terminal payload of 130 bytes forces a two-byte ULEB size.
        let mut payload = regular_payload(0x2000);
        payload.resize(130, 0);

        let mut b = TrieBuilder::new();
        b.node(Some(&payload), &[(b"x", 144)]);
        while b.offset() < 144 {
            b.data.push(0);
        }
        b.node(Some(&regular_payload(0x2010)), &[]);
        let trie = b.data;

        assert_eq!(trie[0], 0x82);
        assert_eq!(trie[1], 0x01);

        // The root payload starts after both size bytes.
        let root = walk_trie(&trie, "").unwrap();
        assert_eq!(root, 2);
        let export = read_export(&trie[root..], "", 0).unwrap();
        assert_eq!(export.address, 0x2000);

        // Offsets past the oversized payload stay consistent.
        let child = walk_trie(&trie, "x").unwrap();
        let export = read_export(&trie[child..], "x", 0).unwrap();
        assert_eq!(export.address, 0x2010);
    }

    #[test]
    fn test_reexport_payload() {
        let mut payload = Vec::new();
        write_uleb128(EXPORT_SYMBOL_FLAGS_REEXPORT, &mut payload);
        write_uleb128(2, &mut payload); // ordinal
        payload.extend_from_slice(b"_orig\0");
        write_uleb128(0, &mut payload); // address field

        let mut b = TrieBuilder::new();
        b.node(None, &[(b"_re", 8)]);
        while b.offset() < 8 {
            b.data.push(0);
        }
        b.node(Some(&payload), &[]);
        let trie = b.data;

        let exports = parse_trie_exports(&trie, 0x5000).unwrap();
        assert_eq!(exports.len(), 1);
        let e = &exports[0];
        assert_eq!(e.name, "_re");
        assert!(e.flags.is_reexport());
        assert_eq!(e.other, 2);
        assert_eq!(e.reexport.as_deref(), Some("_orig"));
        // Re-exports are never biased by the load address.
        assert_eq!(e.address, 0);
    }

    #[test]
    fn test_stub_and_resolver_payload() {
        let mut payload = Vec::new();
        write_uleb128(EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER, &mut payload);
        write_uleb128(0x100, &mut payload); // resolver offset
        write_uleb128(0x80, &mut payload); // stub address

        let mut b = TrieBuilder::new();
        b.node(None, &[(b"_r", 8)]);
        while b.offset() < 8 {
            b.data.push(0);
        }
        b.node(Some(&payload), &[]);
        let trie = b.data;

        let exports = parse_trie_exports(&trie, 0x4000).unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].other, 0x4100);
        // The kind bits are regular, so the address is biased.
        assert_eq!(exports[0].address, 0x4080);
    }

    #[test]
    fn test_path_bound() {
        // A single edge label longer than the bound.
        let mut data = vec![0u8, 1];
        data.extend(std::iter::repeat(b'a').take(MAX_TRIE_PATH + 1));
        data.push(0);
        let child = data.len() + 1;
        write_uleb128(child as u64, &mut data);
        data.extend_from_slice(&[0, 0]);

        assert!(matches!(
            parse_trie(&data),
            Err(Error::MalformedTrie { .. })
        ));
    }

    #[test]
    fn test_child_offset_out_of_range() {
        let mut b = TrieBuilder::new();
        b.node(None, &[(b"_a", 200)]);
        assert!(matches!(
            parse_trie(&b.data),
            Err(Error::InvalidTrieNode { offset: 200 })
        ));
    }

    #[test]
    fn test_empty_trie() {
        assert!(parse_trie(&[]).unwrap().is_empty());
        assert!(parse_trie_exports(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        let export = TrieExport {
            name: "_malloc".into(),
            reexport: None,
            flags: ExportFlags(EXPORT_SYMBOL_FLAGS_KIND_REGULAR),
            other: 0,
            address: 0x1000,
            found_in_dylib: None,
        };
        assert_eq!(export.to_string(), "0x0001000:\t_malloc");
    }
}
