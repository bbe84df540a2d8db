//! Mach-O constants and flags.

use bitflags::bitflags;

// =============================================================================
// Magic Numbers
// =============================================================================

/// 32-bit Mach-O magic.
pub const MH_MAGIC: u32 = 0xFEED_FACE;

/// 32-bit Mach-O magic, byte-swapped.
pub const MH_CIGAM: u32 = 0xCEFA_EDFE;

/// 64-bit Mach-O magic.
pub const MH_MAGIC_64: u32 = 0xFEED_FACF;

/// 64-bit Mach-O magic, byte-swapped.
pub const MH_CIGAM_64: u32 = 0xCFFA_EDFE;

// =============================================================================
// File Types
// =============================================================================

/// Relocatable object file
pub const MH_OBJECT: u32 = 0x1;
/// Executable
pub const MH_EXECUTE: u32 = 0x2;
/// Fixed VM shared library
pub const MH_FVMLIB: u32 = 0x3;
/// Core dump
pub const MH_CORE: u32 = 0x4;
/// Preloaded executable
pub const MH_PRELOAD: u32 = 0x5;
/// Dynamically bound shared library
pub const MH_DYLIB: u32 = 0x6;
/// Dynamic link editor
pub const MH_DYLINKER: u32 = 0x7;
/// Bundle
pub const MH_BUNDLE: u32 = 0x8;
/// Shared library stub
pub const MH_DYLIB_STUB: u32 = 0x9;
/// Debug symbols file
pub const MH_DSYM: u32 = 0xA;
/// Kernel extension bundle
pub const MH_KEXT_BUNDLE: u32 = 0xB;
/// File set (kernel cache)
pub const MH_FILESET: u32 = 0xC;

// =============================================================================
// CPU Types
// =============================================================================

/// 64-bit architecture flag
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;

/// ARM CPU type
pub const CPU_TYPE_ARM: u32 = 12;
/// ARM64 CPU type
pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
/// x86 CPU type
pub const CPU_TYPE_X86: u32 = 7;
/// x86_64 CPU type
pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
/// PowerPC CPU type
pub const CPU_TYPE_POWERPC: u32 = 18;
/// PowerPC 64 CPU type
pub const CPU_TYPE_POWERPC64: u32 = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;

/// ARM64 all
pub const CPU_SUBTYPE_ARM64_ALL: u32 = 0;
/// ARM64 v8
pub const CPU_SUBTYPE_ARM64_V8: u32 = 1;
/// ARM64e (pointer authentication)
pub const CPU_SUBTYPE_ARM64E: u32 = 2;

// =============================================================================
// Load Commands
// =============================================================================

/// Load command understood only by dyld-aware linkers.
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// 32-bit segment of this file
pub const LC_SEGMENT: u32 = 0x1;
/// Link-edit symbol table info
pub const LC_SYMTAB: u32 = 0x2;
/// Link-edit gdb symbol table info (obsolete)
pub const LC_SYMSEG: u32 = 0x3;
/// Thread
pub const LC_THREAD: u32 = 0x4;
/// Unix thread
pub const LC_UNIXTHREAD: u32 = 0x5;
/// Load a fixed VM shared library
pub const LC_LOADFVMLIB: u32 = 0x6;
/// Fixed VM shared library identification
pub const LC_IDFVMLIB: u32 = 0x7;
/// Object identification (obsolete)
pub const LC_IDENT: u32 = 0x8;
/// Fixed VM file inclusion
pub const LC_FVMFILE: u32 = 0x9;
/// Prepage command
pub const LC_PREPAGE: u32 = 0xA;
/// Dynamic link-edit symbol table info
pub const LC_DYSYMTAB: u32 = 0xB;
/// Load a dynamically linked shared library
pub const LC_LOAD_DYLIB: u32 = 0xC;
/// Dynamically linked shared lib identification
pub const LC_ID_DYLIB: u32 = 0xD;
/// Load a dynamic linker
pub const LC_LOAD_DYLINKER: u32 = 0xE;
/// Dynamic linker identification
pub const LC_ID_DYLINKER: u32 = 0xF;
/// Prebound modules
pub const LC_PREBOUND_DYLIB: u32 = 0x10;
/// Image routines
pub const LC_ROUTINES: u32 = 0x11;
/// Sub framework
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
/// Sub umbrella
pub const LC_SUB_UMBRELLA: u32 = 0x13;
/// Sub client
pub const LC_SUB_CLIENT: u32 = 0x14;
/// Sub library
pub const LC_SUB_LIBRARY: u32 = 0x15;
/// Two-level namespace hints
pub const LC_TWOLEVEL_HINTS: u32 = 0x16;
/// Prebind checksum
pub const LC_PREBIND_CKSUM: u32 = 0x17;
/// Load a weak dynamically linked shared library
pub const LC_LOAD_WEAK_DYLIB: u32 = 0x18 | LC_REQ_DYLD;
/// 64-bit segment
pub const LC_SEGMENT_64: u32 = 0x19;
/// 64-bit image routines
pub const LC_ROUTINES_64: u32 = 0x1A;
/// UUID
pub const LC_UUID: u32 = 0x1B;
/// Runpath additions
pub const LC_RPATH: u32 = 0x1C | LC_REQ_DYLD;
/// Location of code signature
pub const LC_CODE_SIGNATURE: u32 = 0x1D;
/// Location of segment split info
pub const LC_SEGMENT_SPLIT_INFO: u32 = 0x1E;
/// Load and re-export dylib
pub const LC_REEXPORT_DYLIB: u32 = 0x1F | LC_REQ_DYLD;
/// Delay load of dylib until first use
pub const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
/// Encrypted segment information
pub const LC_ENCRYPTION_INFO: u32 = 0x21;
/// Compressed dyld info
pub const LC_DYLD_INFO: u32 = 0x22;
/// Compressed dyld info only
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
/// Load upward dylib
pub const LC_LOAD_UPWARD_DYLIB: u32 = 0x23 | LC_REQ_DYLD;
/// Build for macOS min version
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
/// Build for iOS min version
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
/// Location of function starts
pub const LC_FUNCTION_STARTS: u32 = 0x26;
/// Environment variable string for dyld
pub const LC_DYLD_ENVIRONMENT: u32 = 0x27;
/// Main entry point (replacement for LC_UNIXTHREAD)
pub const LC_MAIN: u32 = 0x28 | LC_REQ_DYLD;
/// Table of non-instructions in __text
pub const LC_DATA_IN_CODE: u32 = 0x29;
/// Source version
pub const LC_SOURCE_VERSION: u32 = 0x2A;
/// Code signing DRs copied from linked dylibs
pub const LC_DYLIB_CODE_SIGN_DRS: u32 = 0x2B;
/// 64-bit encrypted segment information
pub const LC_ENCRYPTION_INFO_64: u32 = 0x2C;
/// Linker options
pub const LC_LINKER_OPTION: u32 = 0x2D;
/// Optimization hints
pub const LC_LINKER_OPTIMIZATION_HINT: u32 = 0x2E;
/// Build for tvOS min version
pub const LC_VERSION_MIN_TVOS: u32 = 0x2F;
/// Build for watchOS min version
pub const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
/// Arbitrary data included within a Mach-O file
pub const LC_NOTE: u32 = 0x31;
/// Build for platform min version
pub const LC_BUILD_VERSION: u32 = 0x32;
/// Used with linkedit_data_command, payload is trie
pub const LC_DYLD_EXPORTS_TRIE: u32 = 0x33 | LC_REQ_DYLD;
/// Used with linkedit_data_command
pub const LC_DYLD_CHAINED_FIXUPS: u32 = 0x34 | LC_REQ_DYLD;
/// File set entry
pub const LC_FILESET_ENTRY: u32 = 0x35 | LC_REQ_DYLD;

// =============================================================================
// Segment Flags
// =============================================================================

/// File contents occupy the high part of the VM space
pub const SG_HIGHVM: u32 = 0x1;
/// Segment is a fixed VM library
pub const SG_FVMLIB: u32 = 0x2;
/// Segment has nothing relocated in it
pub const SG_NORELOC: u32 = 0x4;
/// Segment is protected version 1
pub const SG_PROTECTED_VERSION_1: u32 = 0x8;
/// Segment is made read-only after fixups
pub const SG_READ_ONLY: u32 = 0x10;

// =============================================================================
// Section Types and Attributes
// =============================================================================

/// Section type mask
pub const SECTION_TYPE: u32 = 0x0000_00FF;
/// Section attributes mask
pub const SECTION_ATTRIBUTES: u32 = 0xFFFF_FF00;

/// Regular section
pub const S_REGULAR: u32 = 0x0;
/// Zero fill on demand
pub const S_ZEROFILL: u32 = 0x1;
/// Section with literal C strings
pub const S_CSTRING_LITERALS: u32 = 0x2;
/// Section with non-lazy symbol pointers
pub const S_NON_LAZY_SYMBOL_POINTERS: u32 = 0x6;
/// Section with lazy symbol pointers
pub const S_LAZY_SYMBOL_POINTERS: u32 = 0x7;
/// Section with symbol stubs
pub const S_SYMBOL_STUBS: u32 = 0x8;
/// Section with lazy symbol pointers to lazy loaded dylibs
pub const S_LAZY_DYLIB_SYMBOL_POINTERS: u32 = 0x10;
/// Thread local variable section
pub const S_THREAD_LOCAL_VARIABLES: u32 = 0x13;

/// Section contains only true machine instructions
pub const S_ATTR_PURE_INSTRUCTIONS: u32 = 0x8000_0000;
/// Debug section
pub const S_ATTR_DEBUG: u32 = 0x0200_0000;
/// Section contains some machine instructions
pub const S_ATTR_SOME_INSTRUCTIONS: u32 = 0x0000_0400;

// =============================================================================
// Symbol Types
// =============================================================================

/// If any of these bits are set, a symbolic debugging entry
pub const N_STAB: u8 = 0xE0;
/// Private external symbol bit
pub const N_PEXT: u8 = 0x10;
/// Mask for the type bits
pub const N_TYPE: u8 = 0x0E;
/// External symbol bit
pub const N_EXT: u8 = 0x01;

/// Undefined symbol
pub const N_UNDF: u8 = 0x0;
/// Absolute symbol
pub const N_ABS: u8 = 0x2;
/// Defined in section number n_sect
pub const N_SECT: u8 = 0xE;
/// Prebound undefined
pub const N_PBUD: u8 = 0xC;
/// Indirect
pub const N_INDR: u8 = 0xA;

// =============================================================================
// Indirect Symbol Table
// =============================================================================

/// Indirect symbol is local
pub const INDIRECT_SYMBOL_LOCAL: u32 = 0x8000_0000;
/// Indirect symbol is absolute
pub const INDIRECT_SYMBOL_ABS: u32 = 0x4000_0000;

// =============================================================================
// Platforms (LC_BUILD_VERSION)
// =============================================================================

/// macOS
pub const PLATFORM_MACOS: u32 = 1;
/// iOS
pub const PLATFORM_IOS: u32 = 2;
/// tvOS
pub const PLATFORM_TVOS: u32 = 3;
/// watchOS
pub const PLATFORM_WATCHOS: u32 = 4;
/// bridgeOS
pub const PLATFORM_BRIDGEOS: u32 = 5;
/// Mac Catalyst
pub const PLATFORM_MACCATALYST: u32 = 6;
/// iOS simulator
pub const PLATFORM_IOSSIMULATOR: u32 = 7;
/// tvOS simulator
pub const PLATFORM_TVOSSIMULATOR: u32 = 8;
/// watchOS simulator
pub const PLATFORM_WATCHOSSIMULATOR: u32 = 9;
/// DriverKit
pub const PLATFORM_DRIVERKIT: u32 = 10;

// =============================================================================
// Flag Sets
// =============================================================================

bitflags! {
    /// Mach-O header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MachFlags: u32 {
        /// The object file has no undefined references
        const NOUNDEFS = 0x1;
        /// The object file is the output of an incremental link
        const INCRLINK = 0x2;
        /// The object file is input for the dynamic linker
        const DYLDLINK = 0x4;
        /// Undefined references are bound by the dynamic linker at load
        const BINDATLOAD = 0x8;
        /// Dynamic undefined references are prebound
        const PREBOUND = 0x10;
        /// Read-only and read-write segments are split
        const SPLIT_SEGS = 0x20;
        /// The shared library init routine runs lazily
        const LAZY_INIT = 0x40;
        /// The image uses two-level name space bindings
        const TWOLEVEL = 0x80;
        /// The executable forces flat name space bindings on all images
        const FORCE_FLAT = 0x100;
        /// No multiple definitions of symbols in sub-images
        const NOMULTIDEFS = 0x200;
        /// Do not notify the prebinding agent about this executable
        const NOFIXPREBINDING = 0x400;
        /// Not prebound but prebinding can be redone
        const PREBINDABLE = 0x800;
        /// Binds to all two-level namespace modules of dependents
        const ALLMODSBOUND = 0x1000;
        /// Safe to divide sections into sub-sections via symbols
        const SUBSECTIONS_VIA_SYMBOLS = 0x2000;
        /// Canonicalized via the unprebind operation
        const CANONICAL = 0x4000;
        /// The final linked image contains external weak symbols
        const WEAK_DEFINES = 0x8000;
        /// The final linked image uses weak symbols
        const BINDS_TO_WEAK = 0x10000;
        /// All stacks in the task get stack execution privilege
        const ALLOW_STACK_EXECUTION = 0x20000;
        /// Safe for use in processes with uid zero
        const ROOT_SAFE = 0x40000;
        /// Safe for use in processes when issetugid() is true
        const SETUID_SAFE = 0x80000;
        /// Static linker need not examine dependents for re-exports
        const NO_REEXPORTED_DYLIBS = 0x100000;
        /// The OS loads the main executable at a random address
        const PIE = 0x200000;
        /// No LC_LOAD_DYLIB is created if no symbols are referenced
        const DEAD_STRIPPABLE_DYLIB = 0x400000;
        /// Contains a section of type S_THREAD_LOCAL_VARIABLES
        const HAS_TLV_DESCRIPTORS = 0x800000;
        /// The main executable runs with a non-executable heap
        const NO_HEAP_EXECUTION = 0x1000000;
        /// Linked for use in an application extension
        const APP_EXTENSION_SAFE = 0x2000000;
        /// nlist symbols do not include all symbols in the dyld info
        const NLIST_OUTOFSYNC_WITH_DYLDINFO = 0x4000000;
        /// Simulator platforms are allowed in version load commands
        const SIM_SUPPORT = 0x8000000;
        /// The dylib is part of the dyld shared cache
        const DYLIB_IN_CACHE = 0x80000000;
    }
}

bitflags! {
    /// VM protection of a segment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmProt: u32 {
        /// Readable
        const READ = 0x1;
        /// Writable
        const WRITE = 0x2;
        /// Executable
        const EXECUTE = 0x4;
    }
}
