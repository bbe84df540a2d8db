//! machfile - a reader for Mach-O object files and the dyld export trie.
//!
//! This library parses the binary format used by Apple platforms into an
//! in-memory object model: header, load commands, segments and sections
//! with lazy payload readers, symbol tables, and dynamic linker metadata.
//! It also decodes the export trie, the packed prefix tree of exported
//! symbols the linker emits for dyld.
//!
//! # Features
//!
//! - 32-bit and 64-bit files, little- or big-endian
//! - Typed views over every common load command; unknown commands are
//!   retained raw
//! - Lazy, bounded segment/section readers that never fight over a file
//!   cursor
//! - Export trie enumeration and single-symbol lookup
//! - ULEB128/SLEB128 codecs
//! - DWARF section collection (ZLIB-compressed included) for gimli
//!
//! # Example
//!
//! ```no_run
//! use machfile::MachFile;
//!
//! fn main() -> machfile::Result<()> {
//!     let file = MachFile::open("/usr/lib/libSystem.B.dylib")?;
//!
//!     println!("{:?} {}", file.header.magic, file.byte_order);
//!     for lib in file.imported_libraries() {
//!         println!("links {lib}");
//!     }
//!     for export in file.exports(0)? {
//!         println!("{export}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bytes;
pub mod error;
pub mod leb128;
pub mod macho;
pub mod source;
pub mod trie;

// Re-export main types
pub use bytes::ByteOrder;
pub use error::{Error, Result};
pub use macho::{FileHeader, LoadCommand, MachFile, Magic, ParseOptions, Section, Segment};
pub use source::{ReadAt, SectionReader, SourceCursor};
pub use trie::{TrieExport, TrieNode};
