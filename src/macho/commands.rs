//! Typed load commands and the records they decode to.
//!
//! Every variant keeps the raw command bytes alongside the decoded fields,
//! so callers that need exact fidelity (hashing, diffing, re-emitting
//! diagnostics) can get at the original encoding. Commands the parser does
//! not understand are retained as [`LoadCommand::Unknown`].

use std::fmt;

use uuid::Uuid;

use super::constants::*;
use crate::source::{SectionReader, SourceCursor};
use crate::error::Result;

// =============================================================================
// Packed Versions
// =============================================================================

/// An `X.Y.Z` version packed into 32 bits as `xxxx.yy.zz` nibbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Version(pub u32);

impl Version {
    /// Major component.
    #[inline]
    pub fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Minor component.
    #[inline]
    pub fn minor(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Patch component.
    #[inline]
    pub fn patch(self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// An `A.B.C.D.E` version packed into 64 bits (24.10.10.10.10 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PackedVersion64(pub u64);

impl fmt::Display for PackedVersion64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.0 >> 40,
            (self.0 >> 30) & 0x3FF,
            (self.0 >> 20) & 0x3FF,
            (self.0 >> 10) & 0x3FF,
            self.0 & 0x3FF
        )
    }
}

/// Platform identifier used by build-version and version-min commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS
    MacOs,
    /// iOS
    IOs,
    /// tvOS
    TvOs,
    /// watchOS
    WatchOs,
    /// bridgeOS
    BridgeOs,
    /// Mac Catalyst
    MacCatalyst,
    /// iOS simulator
    IOsSimulator,
    /// tvOS simulator
    TvOsSimulator,
    /// watchOS simulator
    WatchOsSimulator,
    /// DriverKit
    DriverKit,
    /// A platform code this library does not know.
    Unknown(u32),
}

impl Platform {
    /// Maps a platform code from an LC_BUILD_VERSION payload.
    pub fn from_code(code: u32) -> Self {
        match code {
            PLATFORM_MACOS => Platform::MacOs,
            PLATFORM_IOS => Platform::IOs,
            PLATFORM_TVOS => Platform::TvOs,
            PLATFORM_WATCHOS => Platform::WatchOs,
            PLATFORM_BRIDGEOS => Platform::BridgeOs,
            PLATFORM_MACCATALYST => Platform::MacCatalyst,
            PLATFORM_IOSSIMULATOR => Platform::IOsSimulator,
            PLATFORM_TVOSSIMULATOR => Platform::TvOsSimulator,
            PLATFORM_WATCHOSSIMULATOR => Platform::WatchOsSimulator,
            PLATFORM_DRIVERKIT => Platform::DriverKit,
            other => Platform::Unknown(other),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::MacOs => f.write_str("macOS"),
            Platform::IOs => f.write_str("iOS"),
            Platform::TvOs => f.write_str("tvOS"),
            Platform::WatchOs => f.write_str("watchOS"),
            Platform::BridgeOs => f.write_str("bridgeOS"),
            Platform::MacCatalyst => f.write_str("Mac Catalyst"),
            Platform::IOsSimulator => f.write_str("iOS Simulator"),
            Platform::TvOsSimulator => f.write_str("tvOS Simulator"),
            Platform::WatchOsSimulator => f.write_str("watchOS Simulator"),
            Platform::DriverKit => f.write_str("DriverKit"),
            Platform::Unknown(code) => write!(f, "platform {code}"),
        }
    }
}

// =============================================================================
// Segments and Sections
// =============================================================================

/// A 32-bit or 64-bit load segment command. 32-bit fields are widened.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Raw command bytes, section headers included.
    pub raw: Vec<u8>,
    /// LC_SEGMENT or LC_SEGMENT_64.
    pub cmd: u32,
    /// Segment name.
    pub name: String,
    /// Virtual memory address.
    pub vmaddr: u64,
    /// Virtual memory size.
    pub vmsize: u64,
    /// File offset of the mapped range.
    pub fileoff: u64,
    /// Size of the mapped range in the file.
    pub filesize: u64,
    /// Maximum VM protection.
    pub maxprot: VmProt,
    /// Initial VM protection.
    pub initprot: VmProt,
    /// Number of section headers following the segment header.
    pub nsects: u32,
    /// Segment flags (SG_*).
    pub flags: u32,
    pub(crate) reader: SectionReader,
}

impl Segment {
    /// Reads and returns the full contents of the segment.
    pub fn data(&self) -> Result<Vec<u8>> {
        self.reader.data()
    }

    /// Returns a new independent cursor reading the segment from its start.
    pub fn open(&self) -> SourceCursor {
        self.reader.open()
    }

    /// Reads bytes at `offset` relative to the segment start.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.reader.read_at(buf, offset)
    }
}

/// A section within a segment. 32-bit fields are widened.
#[derive(Debug, Clone)]
pub struct Section {
    /// Section name.
    pub name: String,
    /// Name of the containing segment.
    pub seg: String,
    /// Virtual memory address.
    pub addr: u64,
    /// Size in bytes.
    pub size: u64,
    /// File offset.
    pub offset: u32,
    /// Alignment as a power of 2.
    pub align: u32,
    /// File offset of relocation entries.
    pub reloff: u32,
    /// Number of relocation entries.
    pub nreloc: u32,
    /// Section type and attributes.
    pub flags: u32,
    /// Parsed relocation entries, when `nreloc > 0`.
    pub relocs: Vec<Reloc>,
    pub(crate) reader: SectionReader,
}

impl Section {
    /// Section type bits of `flags`.
    #[inline]
    pub fn section_type(&self) -> u32 {
        self.flags & SECTION_TYPE
    }

    /// Reads and returns the full contents of the section.
    pub fn data(&self) -> Result<Vec<u8>> {
        self.reader.data()
    }

    /// Returns a new independent cursor reading the section from its start.
    pub fn open(&self) -> SourceCursor {
        self.reader.open()
    }

    /// Reads bytes at `offset` relative to the section start.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        self.reader.read_at(buf, offset)
    }
}

/// A relocation entry.
///
/// For the non-scattered form, `value` is a symbol index when `external`
/// and a section index otherwise. The scattered form has no external bit;
/// `value` is the address the relocation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reloc {
    /// Offset of the item to relocate.
    pub addr: u32,
    /// Symbol index, section index, or referenced value (see above).
    pub value: u32,
    /// Relocation type (machine specific).
    pub r_type: u8,
    /// Item length: 0=byte, 1=word, 2=long, 3=quad.
    pub len: u8,
    /// PC-relative.
    pub pcrel: bool,
    /// References an external symbol. Meaningless when `scattered`.
    pub external: bool,
    /// Scattered relocation.
    pub scattered: bool,
}

// =============================================================================
// Symbol Tables
// =============================================================================

/// A symbol table command with its decoded symbols.
#[derive(Debug, Clone)]
pub struct Symtab {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// File offset of the symbol records.
    pub symoff: u32,
    /// Number of symbol records.
    pub nsyms: u32,
    /// File offset of the string table.
    pub stroff: u32,
    /// Size of the string table in bytes.
    pub strsize: u32,
    /// Decoded symbols, in on-disk order.
    pub syms: Vec<Symbol>,
}

/// A 32-bit or 64-bit symbol table entry. 32-bit values are widened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name, resolved from the string table.
    pub name: String,
    /// Type byte (N_* masks apply).
    pub typ: u8,
    /// Section number, or 0 for none.
    pub sect: u8,
    /// Descriptor.
    pub desc: u16,
    /// Symbol value.
    pub value: u64,
}

impl Symbol {
    /// Returns true for an external symbol.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.typ & N_EXT != 0
    }

    /// Returns true for an undefined symbol.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.typ & N_TYPE == N_UNDF
    }

    /// Returns true for a symbol defined in a section.
    #[inline]
    pub fn is_defined(&self) -> bool {
        self.typ & N_TYPE == N_SECT
    }

    /// Returns true for a symbolic debugging entry.
    #[inline]
    pub fn is_debug(&self) -> bool {
        self.typ & N_STAB != 0
    }
}

/// A dynamic symbol table command.
#[derive(Debug, Clone)]
pub struct Dysymtab {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Index of the first local symbol.
    pub ilocalsym: u32,
    /// Number of local symbols.
    pub nlocalsym: u32,
    /// Index of the first externally defined symbol.
    pub iextdefsym: u32,
    /// Number of externally defined symbols.
    pub nextdefsym: u32,
    /// Index of the first undefined symbol.
    pub iundefsym: u32,
    /// Number of undefined symbols.
    pub nundefsym: u32,
    /// File offset of the table of contents.
    pub tocoff: u32,
    /// Number of table of contents entries.
    pub ntoc: u32,
    /// File offset of the module table.
    pub modtaboff: u32,
    /// Number of module table entries.
    pub nmodtab: u32,
    /// File offset of the referenced symbol table.
    pub extrefsymoff: u32,
    /// Number of referenced symbol table entries.
    pub nextrefsyms: u32,
    /// File offset of the indirect symbol table.
    pub indirectsymoff: u32,
    /// Number of indirect symbol table entries.
    pub nindirectsyms: u32,
    /// File offset of external relocation entries.
    pub extreloff: u32,
    /// Number of external relocation entries.
    pub nextrel: u32,
    /// File offset of local relocation entries.
    pub locreloff: u32,
    /// Number of local relocation entries.
    pub nlocrel: u32,
    /// Indirect symbol table: indices into the symbol table.
    pub indirect_syms: Vec<u32>,
}

// =============================================================================
// Dylib and String Commands
// =============================================================================

/// A dynamic library reference (shared by the whole dylib command family).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dylib {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Library install path.
    pub name: String,
    /// Build timestamp.
    pub timestamp: u32,
    /// Current version.
    pub current_version: Version,
    /// Compatibility version.
    pub compat_version: Version,
}

/// A sub-framework command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubFramework {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Umbrella framework name.
    pub framework: String,
}

/// A sub-client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubClient {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Client name.
    pub name: String,
}

/// An rpath command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rpath {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Runpath addition.
    pub path: String,
}

// =============================================================================
// Link-edit Metadata
// =============================================================================

/// A UUID command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UuidCommand {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// The image's unique identifier.
    pub id: Uuid,
}

/// A generic link-edit data command: a `(offset, size)` window into the
/// LINKEDIT segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEditData {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// File offset of the data.
    pub offset: u32,
    /// Size of the data in bytes.
    pub size: u32,
}

/// A data-in-code command with its decoded entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataInCode {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// File offset of the entry table.
    pub offset: u32,
    /// Size of the entry table in bytes.
    pub size: u32,
    /// Decoded entries.
    pub entries: Vec<DataInCodeEntry>,
}

/// A range of non-instruction bytes inside `__text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataInCodeEntry {
    /// Offset from the start of __TEXT.
    pub offset: u32,
    /// Length of the range.
    pub length: u16,
    /// Kind of data (DICE_KIND_*).
    pub kind: u16,
}

/// A dyld info command describing the compressed LINKEDIT regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DyldInfo {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// File offset to rebase info.
    pub rebase_off: u32,
    /// Size of rebase info.
    pub rebase_size: u32,
    /// File offset to binding info.
    pub bind_off: u32,
    /// Size of binding info.
    pub bind_size: u32,
    /// File offset to weak binding info.
    pub weak_bind_off: u32,
    /// Size of weak binding info.
    pub weak_bind_size: u32,
    /// File offset to lazy binding info.
    pub lazy_bind_off: u32,
    /// Size of lazy binding info.
    pub lazy_bind_size: u32,
    /// File offset to the export trie.
    pub export_off: u32,
    /// Size of the export trie.
    pub export_size: u32,
}

/// A source version command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVersion {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Version of the sources the binary was built from.
    pub version: PackedVersion64,
}

/// A version-min command (one of the four LC_VERSION_MIN_* kinds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMin {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Platform the command targets, implied by the command code.
    pub platform: Platform,
    /// Minimum OS version.
    pub version: Version,
    /// SDK version.
    pub sdk: Version,
}

/// A build version command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildVersion {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Target platform.
    pub platform: Platform,
    /// Minimum OS version.
    pub minos: Version,
    /// SDK version.
    pub sdk: Version,
    /// Number of tool entries.
    pub ntools: u32,
    /// Tools that produced the binary.
    pub tools: Vec<BuildTool>,
}

/// A tool entry of a build version command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTool {
    /// Tool identifier (TOOL_CLANG, TOOL_SWIFT, TOOL_LD, ...).
    pub tool: u32,
    /// Tool version.
    pub version: Version,
}

/// A 64-bit routines command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routines64 {
    /// Raw command bytes.
    pub raw: Vec<u8>,
    /// Address of the initialization routine.
    pub init_address: u64,
    /// Module index of the initialization routine.
    pub init_module: u64,
}

/// A unix thread command, retained uninterpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnixThread {
    /// Raw command bytes.
    pub raw: Vec<u8>,
}

// =============================================================================
// The Command List
// =============================================================================

/// A decoded Mach-O load command.
#[derive(Debug, Clone)]
pub enum LoadCommand {
    /// LC_SEGMENT / LC_SEGMENT_64
    Segment(Segment),
    /// LC_SYMTAB
    Symtab(Symtab),
    /// LC_DYSYMTAB
    Dysymtab(Dysymtab),
    /// LC_LOAD_DYLIB
    LoadDylib(Dylib),
    /// LC_ID_DYLIB
    DylibId(Dylib),
    /// LC_LOAD_WEAK_DYLIB
    WeakDylib(Dylib),
    /// LC_REEXPORT_DYLIB
    ReexportDylib(Dylib),
    /// LC_LOAD_UPWARD_DYLIB
    UpwardDylib(Dylib),
    /// LC_LAZY_LOAD_DYLIB
    LazyLoadDylib(Dylib),
    /// LC_SUB_FRAMEWORK
    SubFramework(SubFramework),
    /// LC_SUB_CLIENT
    SubClient(SubClient),
    /// LC_UUID
    Uuid(UuidCommand),
    /// LC_RPATH
    Rpath(Rpath),
    /// LC_CODE_SIGNATURE
    CodeSignature(LinkEditData),
    /// LC_SEGMENT_SPLIT_INFO
    SplitInfo(LinkEditData),
    /// LC_FUNCTION_STARTS
    FunctionStarts(LinkEditData),
    /// LC_DYLD_EXPORTS_TRIE
    DyldExportsTrie(LinkEditData),
    /// LC_DATA_IN_CODE
    DataInCode(DataInCode),
    /// LC_DYLD_INFO / LC_DYLD_INFO_ONLY
    DyldInfo(DyldInfo),
    /// LC_SOURCE_VERSION
    SourceVersion(SourceVersion),
    /// LC_VERSION_MIN_*
    VersionMin(VersionMin),
    /// LC_BUILD_VERSION
    BuildVersion(BuildVersion),
    /// LC_ROUTINES_64
    Routines64(Routines64),
    /// LC_UNIXTHREAD
    UnixThread(UnixThread),
    /// Any command code this library does not decode.
    Unknown {
        /// Command code.
        cmd: u32,
        /// Raw command bytes.
        raw: Vec<u8>,
    },
}

impl LoadCommand {
    /// Returns the raw bytes of the command as they appear in the file.
    pub fn raw(&self) -> &[u8] {
        match self {
            LoadCommand::Segment(c) => &c.raw,
            LoadCommand::Symtab(c) => &c.raw,
            LoadCommand::Dysymtab(c) => &c.raw,
            LoadCommand::LoadDylib(c)
            | LoadCommand::DylibId(c)
            | LoadCommand::WeakDylib(c)
            | LoadCommand::ReexportDylib(c)
            | LoadCommand::UpwardDylib(c)
            | LoadCommand::LazyLoadDylib(c) => &c.raw,
            LoadCommand::SubFramework(c) => &c.raw,
            LoadCommand::SubClient(c) => &c.raw,
            LoadCommand::Uuid(c) => &c.raw,
            LoadCommand::Rpath(c) => &c.raw,
            LoadCommand::CodeSignature(c)
            | LoadCommand::SplitInfo(c)
            | LoadCommand::FunctionStarts(c)
            | LoadCommand::DyldExportsTrie(c) => &c.raw,
            LoadCommand::DataInCode(c) => &c.raw,
            LoadCommand::DyldInfo(c) => &c.raw,
            LoadCommand::SourceVersion(c) => &c.raw,
            LoadCommand::VersionMin(c) => &c.raw,
            LoadCommand::BuildVersion(c) => &c.raw,
            LoadCommand::Routines64(c) => &c.raw,
            LoadCommand::UnixThread(c) => &c.raw,
            LoadCommand::Unknown { raw, .. } => raw,
        }
    }

    /// Returns the size of the command in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        self.raw().len() as u32
    }
}
