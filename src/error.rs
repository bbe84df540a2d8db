//! Error types for Mach-O parsing and trie decoding.
//!
//! Format errors carry the byte offset at which the defect was detected and,
//! where one exists, the offending value, so callers can report defects
//! against the raw file.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for Mach-O reading operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory map file '{path}': {source}")]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==================== Header Errors ====================
    #[error("invalid magic number in record at byte 0x0")]
    InvalidMagic,

    // ==================== Load Command Errors ====================
    #[error("command block too small in record at byte {offset:#x}")]
    CommandBlockTooSmall { offset: u64 },

    #[error("invalid command block size '{size}' in record at byte {offset:#x}")]
    InvalidCommandSize { offset: u64, size: u32 },

    #[error("truncated {command} in record at byte {offset:#x}")]
    TruncatedCommand {
        command: &'static str,
        offset: u64,
    },

    #[error("invalid {field} in {command} '{value}' in record at byte {offset:#x}")]
    InvalidStringOffset {
        field: &'static str,
        command: &'static str,
        value: u64,
        offset: u64,
    },

    #[error("build tool entries exceed command size in record at byte {offset:#x}")]
    InvalidBuildToolCount { offset: u64 },

    // ==================== Symbol Errors ====================
    #[error("invalid name in symbol table '{value}' in record at byte {offset:#x}")]
    InvalidSymbolName { value: u64, offset: u64 },

    #[error("undefined symbol range {start}..{end} out of bounds (nsyms: {nsyms})")]
    SymbolRangeOutOfBounds {
        start: usize,
        end: usize,
        nsyms: usize,
    },

    #[error("missing symbol table")]
    MissingSymbolTable,

    #[error("symbol not found in symbol table")]
    SymbolNotFound,

    // ==================== LEB128 Errors ====================
    #[error("unexpected end of input while decoding LEB128 value")]
    LebUnexpectedEof,

    #[error("LEB128 value exceeds 64 bits")]
    LebOverflow,

    // ==================== Export Trie Errors ====================
    #[error("invalid export trie node at offset {offset:#x}")]
    InvalidTrieNode { offset: usize },

    #[error("possible malformed export trie: accumulated path length {length} > {max}")]
    MalformedTrie { length: usize, max: usize },

    #[error("symbol not in trie")]
    SymbolNotInTrie,

    // ==================== DWARF Errors ====================
    #[error("DWARF parse error: {0}")]
    Dwarf(#[from] gimli::Error),
}

/// A specialized Result type for Mach-O reading operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the file offset the error was detected at, for errors that
    /// are anchored to a specific record.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Error::CommandBlockTooSmall { offset }
            | Error::InvalidCommandSize { offset, .. }
            | Error::TruncatedCommand { offset, .. }
            | Error::InvalidStringOffset { offset, .. }
            | Error::InvalidBuildToolCount { offset }
            | Error::InvalidSymbolName { offset, .. } => Some(*offset),
            Error::InvalidMagic => Some(0),
            Error::InvalidTrieNode { offset } => Some(*offset as u64),
            _ => None,
        }
    }

    /// Returns the offending value for errors that carry one.
    pub fn value(&self) -> Option<u64> {
        match self {
            Error::InvalidCommandSize { size, .. } => Some(u64::from(*size)),
            Error::InvalidStringOffset { value, .. }
            | Error::InvalidSymbolName { value, .. } => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_display() {
        let err = Error::InvalidStringOffset {
            field: "name",
            command: "dynamic library command",
            value: 52,
            offset: 0x20,
        };
        assert_eq!(
            err.to_string(),
            "invalid name in dynamic library command '52' in record at byte 0x20"
        );
        assert_eq!(err.offset(), Some(0x20));
        assert_eq!(err.value(), Some(52));
    }
}
