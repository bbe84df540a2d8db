//! On-disk Mach-O structures.
//!
//! These structs match the file format byte for byte. They are generic over
//! the byte order so a single definition covers both encodings; the parser
//! instantiates them for the order discovered from the magic number. Every
//! multi-byte field is an unaligned `U16`/`U32`/`U64`, so the structs have
//! no padding and can be read from any offset.

use zerocopy::byteorder::{ByteOrder, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, KnownLayout};

// =============================================================================
// File Header
// =============================================================================

/// 32-bit Mach-O header, without the magic (already consumed during byte
/// order detection).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawHeader32<O: ByteOrder> {
    /// Magic number
    pub magic: U32<O>,
    /// CPU type
    pub cputype: U32<O>,
    /// CPU subtype
    pub cpusubtype: U32<O>,
    /// File type
    pub filetype: U32<O>,
    /// Number of load commands
    pub ncmds: U32<O>,
    /// Total size of load commands
    pub sizeofcmds: U32<O>,
    /// Flags
    pub flags: U32<O>,
}

impl<O: ByteOrder> RawHeader32<O> {
    /// Size of the 32-bit header; load commands start here.
    pub const SIZE: usize = 28;
}

/// 64-bit Mach-O header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawHeader64<O: ByteOrder> {
    /// Magic number
    pub magic: U32<O>,
    /// CPU type
    pub cputype: U32<O>,
    /// CPU subtype
    pub cpusubtype: U32<O>,
    /// File type
    pub filetype: U32<O>,
    /// Number of load commands
    pub ncmds: U32<O>,
    /// Total size of load commands
    pub sizeofcmds: U32<O>,
    /// Flags
    pub flags: U32<O>,
    /// Reserved
    pub reserved: U32<O>,
}

impl<O: ByteOrder> RawHeader64<O> {
    /// Size of the 64-bit header; load commands start here.
    pub const SIZE: usize = 32;
}

// =============================================================================
// Load Command Header
// =============================================================================

/// The `(cmd, cmdsize)` pair every load command begins with.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawLoadCommand<O: ByteOrder> {
    /// Type of load command
    pub cmd: U32<O>,
    /// Size of load command, including this header
    pub cmdsize: U32<O>,
}

impl<O: ByteOrder> RawLoadCommand<O> {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

// =============================================================================
// Segments and Sections
// =============================================================================

/// 32-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSegment32<O: ByteOrder> {
    /// LC_SEGMENT
    pub cmd: U32<O>,
    /// Size of this load command, including section headers
    pub cmdsize: U32<O>,
    /// Segment name (null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: U32<O>,
    /// Virtual memory size
    pub vmsize: U32<O>,
    /// File offset
    pub fileoff: U32<O>,
    /// Amount of file mapped
    pub filesize: U32<O>,
    /// Maximum VM protection
    pub maxprot: U32<O>,
    /// Initial VM protection
    pub initprot: U32<O>,
    /// Number of sections following
    pub nsects: U32<O>,
    /// Flags
    pub flags: U32<O>,
}

impl<O: ByteOrder> RawSegment32<O> {
    /// Size of the segment command without its sections.
    pub const SIZE: usize = 56;
}

/// 64-bit segment command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSegment64<O: ByteOrder> {
    /// LC_SEGMENT_64
    pub cmd: U32<O>,
    /// Size of this load command, including section headers
    pub cmdsize: U32<O>,
    /// Segment name (null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: U64<O>,
    /// Virtual memory size
    pub vmsize: U64<O>,
    /// File offset
    pub fileoff: U64<O>,
    /// Amount of file mapped
    pub filesize: U64<O>,
    /// Maximum VM protection
    pub maxprot: U32<O>,
    /// Initial VM protection
    pub initprot: U32<O>,
    /// Number of sections following
    pub nsects: U32<O>,
    /// Flags
    pub flags: U32<O>,
}

impl<O: ByteOrder> RawSegment64<O> {
    /// Size of the segment command without its sections.
    pub const SIZE: usize = 72;
}

/// 32-bit section header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSection32<O: ByteOrder> {
    /// Section name (null-padded)
    pub sectname: [u8; 16],
    /// Containing segment name (null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: U32<O>,
    /// Size in bytes
    pub size: U32<O>,
    /// File offset
    pub offset: U32<O>,
    /// Alignment (power of 2)
    pub align: U32<O>,
    /// File offset of relocation entries
    pub reloff: U32<O>,
    /// Number of relocation entries
    pub nreloc: U32<O>,
    /// Flags
    pub flags: U32<O>,
    /// Reserved
    pub reserved1: U32<O>,
    /// Reserved
    pub reserved2: U32<O>,
}

impl<O: ByteOrder> RawSection32<O> {
    /// Size of a 32-bit section header.
    pub const SIZE: usize = 68;
}

/// 64-bit section header.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSection64<O: ByteOrder> {
    /// Section name (null-padded)
    pub sectname: [u8; 16],
    /// Containing segment name (null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: U64<O>,
    /// Size in bytes
    pub size: U64<O>,
    /// File offset
    pub offset: U32<O>,
    /// Alignment (power of 2)
    pub align: U32<O>,
    /// File offset of relocation entries
    pub reloff: U32<O>,
    /// Number of relocation entries
    pub nreloc: U32<O>,
    /// Flags
    pub flags: U32<O>,
    /// Reserved
    pub reserved1: U32<O>,
    /// Reserved
    pub reserved2: U32<O>,
    /// Reserved
    pub reserved3: U32<O>,
}

impl<O: ByteOrder> RawSection64<O> {
    /// Size of a 64-bit section header.
    pub const SIZE: usize = 80;
}

// =============================================================================
// Symbol Tables
// =============================================================================

/// Symbol table command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSymtab<O: ByteOrder> {
    /// LC_SYMTAB
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// Symbol table offset
    pub symoff: U32<O>,
    /// Number of symbol table entries
    pub nsyms: U32<O>,
    /// String table offset
    pub stroff: U32<O>,
    /// String table size in bytes
    pub strsize: U32<O>,
}

/// Dynamic symbol table command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawDysymtab<O: ByteOrder> {
    /// LC_DYSYMTAB
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// Index of local symbols
    pub ilocalsym: U32<O>,
    /// Number of local symbols
    pub nlocalsym: U32<O>,
    /// Index of externally defined symbols
    pub iextdefsym: U32<O>,
    /// Number of externally defined symbols
    pub nextdefsym: U32<O>,
    /// Index of undefined symbols
    pub iundefsym: U32<O>,
    /// Number of undefined symbols
    pub nundefsym: U32<O>,
    /// File offset to table of contents
    pub tocoff: U32<O>,
    /// Number of entries in table of contents
    pub ntoc: U32<O>,
    /// File offset to module table
    pub modtaboff: U32<O>,
    /// Number of module table entries
    pub nmodtab: U32<O>,
    /// Offset to referenced symbol table
    pub extrefsymoff: U32<O>,
    /// Number of referenced symbol table entries
    pub nextrefsyms: U32<O>,
    /// File offset to the indirect symbol table
    pub indirectsymoff: U32<O>,
    /// Number of indirect symbol table entries
    pub nindirectsyms: U32<O>,
    /// Offset to external relocation entries
    pub extreloff: U32<O>,
    /// Number of external relocation entries
    pub nextrel: U32<O>,
    /// Offset to local relocation entries
    pub locreloff: U32<O>,
    /// Number of local relocation entries
    pub nlocrel: U32<O>,
}

/// 32-bit symbol table entry.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawNlist32<O: ByteOrder> {
    /// Index into string table
    pub n_strx: U32<O>,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Descriptor
    pub n_desc: U16<O>,
    /// Value
    pub n_value: U32<O>,
}

impl<O: ByteOrder> RawNlist32<O> {
    /// Size of a 32-bit nlist entry.
    pub const SIZE: usize = 12;
}

/// 64-bit symbol table entry.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawNlist64<O: ByteOrder> {
    /// Index into string table
    pub n_strx: U32<O>,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Descriptor
    pub n_desc: U16<O>,
    /// Value
    pub n_value: U64<O>,
}

impl<O: ByteOrder> RawNlist64<O> {
    /// Size of a 64-bit nlist entry.
    pub const SIZE: usize = 16;
}

// =============================================================================
// Dylib and String Commands
// =============================================================================

/// Dylib load command (load, id, weak, reexport, upward, lazy).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawDylib<O: ByteOrder> {
    /// LC_LOAD_DYLIB, LC_ID_DYLIB, etc.
    pub cmd: U32<O>,
    /// Total size, including the path string
    pub cmdsize: U32<O>,
    /// Path string offset within the command
    pub name: U32<O>,
    /// Build timestamp
    pub timestamp: U32<O>,
    /// Current version (X.Y.Z packed)
    pub current_version: U32<O>,
    /// Compatibility version (X.Y.Z packed)
    pub compatibility_version: U32<O>,
}

/// Sub-framework command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSubFramework<O: ByteOrder> {
    /// LC_SUB_FRAMEWORK
    pub cmd: U32<O>,
    /// Total size, including the umbrella string
    pub cmdsize: U32<O>,
    /// Umbrella framework name offset within the command
    pub umbrella: U32<O>,
}

/// Sub-client command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSubClient<O: ByteOrder> {
    /// LC_SUB_CLIENT
    pub cmd: U32<O>,
    /// Total size, including the client string
    pub cmdsize: U32<O>,
    /// Client name offset within the command
    pub client: U32<O>,
}

/// Rpath command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawRpath<O: ByteOrder> {
    /// LC_RPATH
    pub cmd: U32<O>,
    /// Total size, including the path string
    pub cmdsize: U32<O>,
    /// Path offset within the command
    pub path: U32<O>,
}

// =============================================================================
// Link-edit Metadata
// =============================================================================

/// UUID command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawUuid<O: ByteOrder> {
    /// LC_UUID
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// 128-bit unique identifier
    pub uuid: [u8; 16],
}

/// Generic link-edit data command (code signature, split info, function
/// starts, data-in-code, exports trie, chained fixups).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawLinkEditData<O: ByteOrder> {
    /// Command type
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// File offset of the data
    pub dataoff: U32<O>,
    /// Size of the data
    pub datasize: U32<O>,
}

/// Dyld info command (compressed LINKEDIT information).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawDyldInfo<O: ByteOrder> {
    /// LC_DYLD_INFO or LC_DYLD_INFO_ONLY
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// File offset to rebase info
    pub rebase_off: U32<O>,
    /// Size of rebase info
    pub rebase_size: U32<O>,
    /// File offset to binding info
    pub bind_off: U32<O>,
    /// Size of binding info
    pub bind_size: U32<O>,
    /// File offset to weak binding info
    pub weak_bind_off: U32<O>,
    /// Size of weak binding info
    pub weak_bind_size: U32<O>,
    /// File offset to lazy binding info
    pub lazy_bind_off: U32<O>,
    /// Size of lazy binding info
    pub lazy_bind_size: U32<O>,
    /// File offset to export trie
    pub export_off: U32<O>,
    /// Size of export trie
    pub export_size: U32<O>,
}

/// Source version command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawSourceVersion<O: ByteOrder> {
    /// LC_SOURCE_VERSION
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// A.B.C.D.E packed into 64 bits
    pub version: U64<O>,
}

/// Version-min command (macOS, iOS, tvOS, watchOS).
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawVersionMin<O: ByteOrder> {
    /// LC_VERSION_MIN_*
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// Minimum OS version (X.Y.Z packed)
    pub version: U32<O>,
    /// SDK version (X.Y.Z packed)
    pub sdk: U32<O>,
}

/// Build version command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawBuildVersion<O: ByteOrder> {
    /// LC_BUILD_VERSION
    pub cmd: U32<O>,
    /// Size of this load command, including tool entries
    pub cmdsize: U32<O>,
    /// Platform
    pub platform: U32<O>,
    /// Minimum OS version (X.Y.Z packed)
    pub minos: U32<O>,
    /// SDK version (X.Y.Z packed)
    pub sdk: U32<O>,
    /// Number of tool entries following
    pub ntools: U32<O>,
}

impl<O: ByteOrder> RawBuildVersion<O> {
    /// Size of the command without tool entries.
    pub const SIZE: usize = 24;
}

/// Tool entry following a build version command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawBuildTool<O: ByteOrder> {
    /// Tool that produced the binary
    pub tool: U32<O>,
    /// Tool version (X.Y.Z packed)
    pub version: U32<O>,
}

impl<O: ByteOrder> RawBuildTool<O> {
    /// Size of a tool entry.
    pub const SIZE: usize = 8;
}

/// 64-bit routines command.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawRoutines64<O: ByteOrder> {
    /// LC_ROUTINES_64
    pub cmd: U32<O>,
    /// Size of this load command
    pub cmdsize: U32<O>,
    /// Address of the initialization routine
    pub init_address: U64<O>,
    /// Module index of the initialization routine
    pub init_module: U64<O>,
    /// Reserved
    pub reserved1: U64<O>,
    /// Reserved
    pub reserved2: U64<O>,
    /// Reserved
    pub reserved3: U64<O>,
    /// Reserved
    pub reserved4: U64<O>,
    /// Reserved
    pub reserved5: U64<O>,
    /// Reserved
    pub reserved6: U64<O>,
}

/// Data-in-code entry in the link-edit region.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RawDataInCodeEntry<O: ByteOrder> {
    /// Offset from the start of __TEXT
    pub offset: U32<O>,
    /// Length of the data range
    pub length: U16<O>,
    /// Kind of data (DICE_KIND_*)
    pub kind: U16<O>,
}

impl<O: ByteOrder> RawDataInCodeEntry<O> {
    /// Size of a data-in-code entry.
    pub const SIZE: usize = 8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::size_of;
    use zerocopy::byteorder::{BigEndian, LittleEndian};

    #[test]
    fn test_struct_sizes() {
        assert_eq!(size_of::<RawHeader32<LittleEndian>>(), RawHeader32::<LittleEndian>::SIZE);
        assert_eq!(size_of::<RawHeader64<LittleEndian>>(), RawHeader64::<LittleEndian>::SIZE);
        assert_eq!(size_of::<RawSegment32<LittleEndian>>(), RawSegment32::<LittleEndian>::SIZE);
        assert_eq!(size_of::<RawSegment64<LittleEndian>>(), RawSegment64::<LittleEndian>::SIZE);
        assert_eq!(size_of::<RawSection32<LittleEndian>>(), RawSection32::<LittleEndian>::SIZE);
        assert_eq!(size_of::<RawSection64<LittleEndian>>(), RawSection64::<LittleEndian>::SIZE);
        assert_eq!(size_of::<RawSymtab<LittleEndian>>(), 24);
        assert_eq!(size_of::<RawDysymtab<LittleEndian>>(), 80);
        assert_eq!(size_of::<RawNlist32<LittleEndian>>(), 12);
        assert_eq!(size_of::<RawNlist64<LittleEndian>>(), 16);
        assert_eq!(size_of::<RawDylib<LittleEndian>>(), 24);
        assert_eq!(size_of::<RawDyldInfo<LittleEndian>>(), 48);
        assert_eq!(size_of::<RawLinkEditData<LittleEndian>>(), 16);
        assert_eq!(size_of::<RawUuid<LittleEndian>>(), 24);
        assert_eq!(size_of::<RawBuildVersion<LittleEndian>>(), 24);
        assert_eq!(size_of::<RawRoutines64<LittleEndian>>(), 72);
        assert_eq!(size_of::<RawDataInCodeEntry<LittleEndian>>(), 8);
    }

    #[test]
    fn test_endian_fields() {
        let bytes = [
            0xCEu8, 0xFA, 0xED, 0xFE, // magic
            0x00, 0x00, 0x00, 0x0C, // cputype
            0x00, 0x00, 0x00, 0x00, // cpusubtype
            0x00, 0x00, 0x00, 0x02, // filetype
            0x00, 0x00, 0x00, 0x05, // ncmds
            0x00, 0x00, 0x01, 0x00, // sizeofcmds
            0x00, 0x00, 0x00, 0x85, // flags
        ];
        let (hdr, _) = RawHeader32::<BigEndian>::read_from_prefix(&bytes).unwrap();
        assert_eq!(hdr.magic.get(), 0xCEFA_EDFE);
        assert_eq!(hdr.cputype.get(), 12);
        assert_eq!(hdr.ncmds.get(), 5);
        assert_eq!(hdr.sizeofcmds.get(), 0x100);
    }
}
