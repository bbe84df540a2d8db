//! High level access to Mach-O files.
//!
//! [`MachFile`] discovers the byte order and word size from the magic
//! number, walks the load command block, and materialises typed views over
//! every command it understands. Segments and sections come with lazy
//! readers bounded to their file ranges, so payloads are only touched when
//! asked for.

use std::fmt;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::warn;
use zerocopy::byteorder::{BigEndian, ByteOrder as Endianness, LittleEndian};
use zerocopy::FromBytes;

use super::commands::*;
use super::constants::*;
use super::structs::*;
use crate::bytes::{cstring, ByteOrder};
use crate::error::{Error, Result};
use crate::source::{ReadAt, SectionReader};
use crate::trie::{self, TrieExport};

// =============================================================================
// Header
// =============================================================================

/// Word size of a Mach-O file, from its magic number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
    /// 32-bit Mach-O.
    Mach32,
    /// 64-bit Mach-O.
    Mach64,
}

impl Magic {
    /// Returns true for the 64-bit format.
    #[inline]
    pub fn is_64(self) -> bool {
        matches!(self, Magic::Mach64)
    }

    /// The canonical magic value.
    #[inline]
    pub fn value(self) -> u32 {
        match self {
            Magic::Mach32 => MH_MAGIC,
            Magic::Mach64 => MH_MAGIC_64,
        }
    }

    /// Size of the fixed file header; the command block starts here.
    #[inline]
    pub fn header_size(self) -> usize {
        match self {
            Magic::Mach32 => 28,
            Magic::Mach64 => 32,
        }
    }
}

/// The fixed Mach-O file header.
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    /// Word size discovered from the magic number.
    pub magic: Magic,
    /// CPU type (CPU_TYPE_*).
    pub cputype: u32,
    /// CPU subtype.
    pub cpusubtype: u32,
    /// File type (MH_EXECUTE, MH_DYLIB, ...).
    pub filetype: u32,
    /// Number of load commands.
    pub ncmds: u32,
    /// Total size of the load command block in bytes.
    pub sizeofcmds: u32,
    /// Header flags.
    pub flags: MachFlags,
    /// Reserved word, present in the 64-bit header only.
    pub reserved: u32,
}

/// Knobs for [`MachFile::new_with_options`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Fail on symbol records whose name offset is outside the string
    /// table instead of skipping them.
    pub strict_symbols: bool,
}

// =============================================================================
// MachFile
// =============================================================================

/// A parsed Mach-O file.
pub struct MachFile {
    /// The fixed file header.
    pub header: FileHeader,
    /// Byte order discovered from the magic number.
    pub byte_order: ByteOrder,
    /// Load commands in source order.
    pub loads: Vec<LoadCommand>,
    /// Sections flattened across segments, in parse order.
    pub sections: Vec<Section>,
    symtab: Option<usize>,
    dysymtab: Option<usize>,
    source: Arc<dyn ReadAt>,
}

impl MachFile {
    /// Opens the named file, memory-maps it, and parses it.
    ///
    /// The mapping is owned by the returned file and the readers borrowed
    /// from it; it is released when the last of them is dropped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|e| Error::FileOpen {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MemoryMap {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_source(Arc::new(mmap), ParseOptions::default())
    }

    /// Parses a Mach-O binary from a random-access source. The binary is
    /// expected to start at offset 0.
    pub fn new<R: ReadAt + 'static>(source: R) -> Result<Self> {
        Self::from_source(Arc::new(source), ParseOptions::default())
    }

    /// Like [`MachFile::new`], with explicit options.
    pub fn new_with_options<R: ReadAt + 'static>(source: R, options: ParseOptions) -> Result<Self> {
        Self::from_source(Arc::new(source), options)
    }

    /// Parses a Mach-O binary from a source the caller keeps ownership of.
    pub fn new_shared(source: Arc<dyn ReadAt>) -> Result<Self> {
        Self::from_source(source, ParseOptions::default())
    }

    fn from_source(source: Arc<dyn ReadAt>, options: ParseOptions) -> Result<Self> {
        // Read and decode the magic to determine byte order and word size.
        // The 32-bit and 64-bit magics differ only in the bottom bit.
        let mut ident = [0u8; 4];
        source.read_exact_at(&mut ident, 0)?;
        let be = u32::from_be_bytes(ident);
        let le = u32::from_le_bytes(ident);

        let (byte_order, magic_value) = if be & !1 == MH_MAGIC & !1 {
            (ByteOrder::Big, be)
        } else if le & !1 == MH_MAGIC & !1 {
            (ByteOrder::Little, le)
        } else {
            return Err(Error::InvalidMagic);
        };
        let magic = if magic_value == MH_MAGIC_64 {
            Magic::Mach64
        } else {
            Magic::Mach32
        };

        match byte_order {
            ByteOrder::Little => Parser::<LittleEndian>::parse(source, byte_order, magic, options),
            ByteOrder::Big => Parser::<BigEndian>::parse(source, byte_order, magic, options),
        }
    }

    // ==================== Accessors ====================

    /// Returns the symbol table, when present and readable.
    pub fn symtab(&self) -> Option<&Symtab> {
        match self.symtab.map(|i| &self.loads[i]) {
            Some(LoadCommand::Symtab(st)) => Some(st),
            _ => None,
        }
    }

    /// Returns the dynamic symbol table, when present.
    pub fn dysymtab(&self) -> Option<&Dysymtab> {
        match self.dysymtab.map(|i| &self.loads[i]) {
            Some(LoadCommand::Dysymtab(dt)) => Some(dt),
            _ => None,
        }
    }

    /// Returns the first segment with the given name.
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments().find(|s| s.name == name)
    }

    /// Returns all segments, in source order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.loads.iter().filter_map(|lc| match lc {
            LoadCommand::Segment(seg) => Some(seg),
            _ => None,
        })
    }

    /// Returns the first section with the given name, across all segments.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Returns the UUID load command, if any.
    pub fn uuid(&self) -> Option<&UuidCommand> {
        self.loads.iter().find_map(|lc| match lc {
            LoadCommand::Uuid(u) => Some(u),
            _ => None,
        })
    }

    /// Returns the dylib ident load command, if any.
    pub fn dylib_id(&self) -> Option<&Dylib> {
        self.loads.iter().find_map(|lc| match lc {
            LoadCommand::DylibId(d) => Some(d),
            _ => None,
        })
    }

    /// Returns the dyld info load command, if any.
    pub fn dyld_info(&self) -> Option<&DyldInfo> {
        self.loads.iter().find_map(|lc| match lc {
            LoadCommand::DyldInfo(d) => Some(d),
            _ => None,
        })
    }

    /// Returns the exports trie load command, if any.
    pub fn dyld_exports_trie(&self) -> Option<&LinkEditData> {
        self.loads.iter().find_map(|lc| match lc {
            LoadCommand::DyldExportsTrie(d) => Some(d),
            _ => None,
        })
    }

    /// Returns the source version load command, if any.
    pub fn source_version(&self) -> Option<&SourceVersion> {
        self.loads.iter().find_map(|lc| match lc {
            LoadCommand::SourceVersion(v) => Some(v),
            _ => None,
        })
    }

    /// Returns the build version load command, if any.
    pub fn build_version(&self) -> Option<&BuildVersion> {
        self.loads.iter().find_map(|lc| match lc {
            LoadCommand::BuildVersion(v) => Some(v),
            _ => None,
        })
    }

    /// Returns the install paths of the libraries this binary links
    /// against at load time (plain LC_LOAD_DYLIB commands only).
    pub fn imported_libraries(&self) -> Vec<&str> {
        self.loads
            .iter()
            .filter_map(|lc| match lc {
                LoadCommand::LoadDylib(d) => Some(d.name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns the names of the symbols this binary expects other
    /// libraries to satisfy at dynamic load time.
    pub fn imported_symbols(&self) -> Result<Vec<String>> {
        let st = self.symtab().ok_or(Error::MissingSymbolTable)?;
        let dt = self.dysymtab().ok_or(Error::MissingSymbolTable)?;

        let start = dt.iundefsym as usize;
        let end = start + dt.nundefsym as usize;
        let syms = st
            .syms
            .get(start..end)
            .ok_or(Error::SymbolRangeOutOfBounds {
                start,
                end,
                nsyms: st.syms.len(),
            })?;
        Ok(syms.iter().map(|s| s.name.clone()).collect())
    }

    /// Returns the value of the first symbol matching `symbol`
    /// case-insensitively.
    pub fn find_symbol_address(&self, symbol: &str) -> Result<u64> {
        let st = self.symtab().ok_or(Error::MissingSymbolTable)?;
        st.syms
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(symbol))
            .map(|s| s.value)
            .ok_or(Error::SymbolNotFound)
    }

    /// Returns the name of the first symbol whose value equals `addr`.
    pub fn find_address_symbol(&self, addr: u64) -> Result<String> {
        let st = self.symtab().ok_or(Error::MissingSymbolTable)?;
        st.syms
            .iter()
            .find(|s| s.value == addr)
            .map(|s| s.name.clone())
            .ok_or(Error::SymbolNotFound)
    }

    /// Enumerates the export trie, from LC_DYLD_INFO or
    /// LC_DYLD_EXPORTS_TRIE, whichever the binary carries. Returns an empty
    /// list when it has neither.
    pub fn exports(&self, load_address: u64) -> Result<Vec<TrieExport>> {
        let (off, size) = if let Some(info) = self.dyld_info() {
            (info.export_off, info.export_size)
        } else if let Some(led) = self.dyld_exports_trie() {
            (led.offset, led.size)
        } else {
            return Ok(Vec::new());
        };

        let mut buf = vec![0u8; size as usize];
        self.source.read_exact_at(&mut buf, u64::from(off))?;
        trie::parse_trie_exports(&buf, load_address)
    }
}

impl fmt::Debug for MachFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachFile")
            .field("header", &self.header)
            .field("byte_order", &self.byte_order)
            .field("loads", &self.loads.len())
            .field("sections", &self.sections.len())
            .finish()
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<O: Endianness> {
    source: Arc<dyn ReadAt>,
    byte_order: ByteOrder,
    magic: Magic,
    options: ParseOptions,
    loads: Vec<LoadCommand>,
    sections: Vec<Section>,
    symtab: Option<usize>,
    dysymtab: Option<usize>,
    _order: PhantomData<O>,
}

impl<O: Endianness> Parser<O> {
    fn parse(
        source: Arc<dyn ReadAt>,
        byte_order: ByteOrder,
        magic: Magic,
        options: ParseOptions,
    ) -> Result<MachFile> {
        let mut parser = Parser {
            source,
            byte_order,
            magic,
            options,
            loads: Vec::new(),
            sections: Vec::new(),
            symtab: None,
            dysymtab: None,
            _order: PhantomData::<O>,
        };

        let header = parser.read_header()?;
        parser.read_commands(&header)?;

        Ok(MachFile {
            header,
            byte_order: parser.byte_order,
            loads: parser.loads,
            sections: parser.sections,
            symtab: parser.symtab,
            dysymtab: parser.dysymtab,
            source: parser.source,
        })
    }

    fn read_header(&self) -> Result<FileHeader> {
        if self.magic.is_64() {
            let mut buf = [0u8; 32];
            self.source.read_exact_at(&mut buf, 0)?;
            let (h, _) = RawHeader64::<O>::read_from_prefix(&buf).map_err(|_| {
                Error::TruncatedCommand {
                    command: "mach header",
                    offset: 0,
                }
            })?;
            Ok(FileHeader {
                magic: self.magic,
                cputype: h.cputype.get(),
                cpusubtype: h.cpusubtype.get(),
                filetype: h.filetype.get(),
                ncmds: h.ncmds.get(),
                sizeofcmds: h.sizeofcmds.get(),
                flags: MachFlags::from_bits_retain(h.flags.get()),
                reserved: h.reserved.get(),
            })
        } else {
            let mut buf = [0u8; 28];
            self.source.read_exact_at(&mut buf, 0)?;
            let (h, _) = RawHeader32::<O>::read_from_prefix(&buf).map_err(|_| {
                Error::TruncatedCommand {
                    command: "mach header",
                    offset: 0,
                }
            })?;
            Ok(FileHeader {
                magic: self.magic,
                cputype: h.cputype.get(),
                cpusubtype: h.cpusubtype.get(),
                filetype: h.filetype.get(),
                ncmds: h.ncmds.get(),
                sizeofcmds: h.sizeofcmds.get(),
                flags: MachFlags::from_bits_retain(h.flags.get()),
                reserved: 0,
            })
        }
    }

    fn read_commands(&mut self, header: &FileHeader) -> Result<()> {
        let mut block = vec![0u8; header.sizeofcmds as usize];
        self.source
            .read_exact_at(&mut block, self.magic.header_size() as u64)?;

        let mut rest = block.as_slice();
        let mut offset = self.magic.header_size() as u64;

        for _ in 0..header.ncmds {
            // Each load command begins with a (cmd, cmdsize) pair.
            if rest.len() < RawLoadCommand::<O>::SIZE {
                return Err(Error::CommandBlockTooSmall { offset });
            }
            let (lc, _) = RawLoadCommand::<O>::read_from_prefix(rest)
                .map_err(|_| Error::CommandBlockTooSmall { offset })?;
            let (cmd, size) = (lc.cmd.get(), lc.cmdsize.get());
            if size < 8 || size as usize > rest.len() {
                return Err(Error::InvalidCommandSize { offset, size });
            }

            let (cmddat, tail) = rest.split_at(size as usize);
            rest = tail;

            let decoded = self.command(cmd, cmddat, offset)?;
            match &decoded {
                LoadCommand::Symtab(_) => self.symtab = Some(self.loads.len()),
                LoadCommand::Dysymtab(_) => self.dysymtab = Some(self.loads.len()),
                _ => {}
            }
            self.loads.push(decoded);

            offset += u64::from(size);
        }

        Ok(())
    }

    fn command(&mut self, cmd: u32, data: &[u8], offset: u64) -> Result<LoadCommand> {
        match cmd {
            LC_SEGMENT => self.segment32(data, offset),
            LC_SEGMENT_64 => self.segment64(data, offset),
            LC_SYMTAB => self.symtab_command(data, offset),
            LC_DYSYMTAB => self.dysymtab_command(data, offset),

            LC_LOAD_DYLIB => Ok(LoadCommand::LoadDylib(self.dylib(
                data,
                offset,
                "dynamic library command",
            )?)),
            LC_ID_DYLIB => Ok(LoadCommand::DylibId(self.dylib(
                data,
                offset,
                "dynamic library ident command",
            )?)),
            LC_LOAD_WEAK_DYLIB => Ok(LoadCommand::WeakDylib(self.dylib(
                data,
                offset,
                "weak dynamic library command",
            )?)),
            LC_REEXPORT_DYLIB => Ok(LoadCommand::ReexportDylib(self.dylib(
                data,
                offset,
                "dynamic library command",
            )?)),
            LC_LOAD_UPWARD_DYLIB => Ok(LoadCommand::UpwardDylib(self.dylib(
                data,
                offset,
                "upward dynamic library command",
            )?)),
            LC_LAZY_LOAD_DYLIB => Ok(LoadCommand::LazyLoadDylib(self.dylib(
                data,
                offset,
                "dynamic library command",
            )?)),

            LC_SUB_FRAMEWORK => {
                let (sf, _) = RawSubFramework::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "sub framework command",
                        offset,
                    }
                })?;
                let framework = self.payload_string(
                    data,
                    sf.umbrella.get(),
                    "framework",
                    "sub framework command",
                    offset,
                )?;
                Ok(LoadCommand::SubFramework(SubFramework {
                    raw: data.to_vec(),
                    framework,
                }))
            }

            LC_SUB_CLIENT => {
                let (sc, _) = RawSubClient::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "sub client command",
                        offset,
                    }
                })?;
                let name = self.payload_string(
                    data,
                    sc.client.get(),
                    "path",
                    "sub client command",
                    offset,
                )?;
                Ok(LoadCommand::SubClient(SubClient {
                    raw: data.to_vec(),
                    name,
                }))
            }

            LC_UUID => {
                let (u, _) = RawUuid::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "uuid command",
                        offset,
                    }
                })?;
                Ok(LoadCommand::Uuid(UuidCommand {
                    raw: data.to_vec(),
                    id: uuid::Uuid::from_bytes(u.uuid),
                }))
            }

            LC_RPATH => {
                let (rp, _) = RawRpath::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "rpath command",
                        offset,
                    }
                })?;
                let path =
                    self.payload_string(data, rp.path.get(), "path", "rpath command", offset)?;
                Ok(LoadCommand::Rpath(Rpath {
                    raw: data.to_vec(),
                    path,
                }))
            }

            LC_CODE_SIGNATURE => Ok(LoadCommand::CodeSignature(self.linkedit_data(
                data,
                offset,
                "code signature command",
            )?)),
            LC_SEGMENT_SPLIT_INFO => Ok(LoadCommand::SplitInfo(self.linkedit_data(
                data,
                offset,
                "segment split info command",
            )?)),
            LC_FUNCTION_STARTS => Ok(LoadCommand::FunctionStarts(self.linkedit_data(
                data,
                offset,
                "function starts command",
            )?)),
            LC_DYLD_EXPORTS_TRIE => Ok(LoadCommand::DyldExportsTrie(self.linkedit_data(
                data,
                offset,
                "exports trie command",
            )?)),

            LC_DATA_IN_CODE => self.data_in_code(data, offset),

            LC_DYLD_INFO | LC_DYLD_INFO_ONLY => {
                let (info, _) = RawDyldInfo::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "dyld info command",
                        offset,
                    }
                })?;
                Ok(LoadCommand::DyldInfo(DyldInfo {
                    raw: data.to_vec(),
                    rebase_off: info.rebase_off.get(),
                    rebase_size: info.rebase_size.get(),
                    bind_off: info.bind_off.get(),
                    bind_size: info.bind_size.get(),
                    weak_bind_off: info.weak_bind_off.get(),
                    weak_bind_size: info.weak_bind_size.get(),
                    lazy_bind_off: info.lazy_bind_off.get(),
                    lazy_bind_size: info.lazy_bind_size.get(),
                    export_off: info.export_off.get(),
                    export_size: info.export_size.get(),
                }))
            }

            LC_SOURCE_VERSION => {
                let (sv, _) = RawSourceVersion::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "source version command",
                        offset,
                    }
                })?;
                Ok(LoadCommand::SourceVersion(SourceVersion {
                    raw: data.to_vec(),
                    version: PackedVersion64(sv.version.get()),
                }))
            }

            LC_VERSION_MIN_MACOSX
            | LC_VERSION_MIN_IPHONEOS
            | LC_VERSION_MIN_TVOS
            | LC_VERSION_MIN_WATCHOS => {
                let (vm, _) = RawVersionMin::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "version min command",
                        offset,
                    }
                })?;
                let platform = match cmd {
                    LC_VERSION_MIN_MACOSX => Platform::MacOs,
                    LC_VERSION_MIN_IPHONEOS => Platform::IOs,
                    LC_VERSION_MIN_TVOS => Platform::TvOs,
                    _ => Platform::WatchOs,
                };
                Ok(LoadCommand::VersionMin(VersionMin {
                    raw: data.to_vec(),
                    platform,
                    version: Version(vm.version.get()),
                    sdk: Version(vm.sdk.get()),
                }))
            }

            LC_BUILD_VERSION => self.build_version(data, offset),

            LC_ROUTINES_64 => {
                let (r64, _) = RawRoutines64::<O>::read_from_prefix(data).map_err(|_| {
                    Error::TruncatedCommand {
                        command: "routines command",
                        offset,
                    }
                })?;
                Ok(LoadCommand::Routines64(Routines64 {
                    raw: data.to_vec(),
                    init_address: r64.init_address.get(),
                    init_module: r64.init_module.get(),
                }))
            }

            LC_UNIXTHREAD => Ok(LoadCommand::UnixThread(UnixThread {
                raw: data.to_vec(),
            })),

            _ => {
                warn!("found unknown load command: {cmd:#x}");
                Ok(LoadCommand::Unknown {
                    cmd,
                    raw: data.to_vec(),
                })
            }
        }
    }

    /// Reads a NUL-terminated string at a payload-relative offset,
    /// validating that the offset falls inside the command.
    fn payload_string(
        &self,
        data: &[u8],
        string_offset: u32,
        field: &'static str,
        command: &'static str,
        offset: u64,
    ) -> Result<String> {
        if string_offset as usize >= data.len() {
            return Err(Error::InvalidStringOffset {
                field,
                command,
                value: u64::from(string_offset),
                offset,
            });
        }
        Ok(cstring(&data[string_offset as usize..]))
    }

    fn dylib(&self, data: &[u8], offset: u64, command: &'static str) -> Result<Dylib> {
        let (hdr, _) =
            RawDylib::<O>::read_from_prefix(data).map_err(|_| Error::TruncatedCommand {
                command,
                offset,
            })?;
        let name = self.payload_string(data, hdr.name.get(), "name", command, offset)?;
        Ok(Dylib {
            raw: data.to_vec(),
            name,
            timestamp: hdr.timestamp.get(),
            current_version: Version(hdr.current_version.get()),
            compat_version: Version(hdr.compatibility_version.get()),
        })
    }

    fn linkedit_data(
        &self,
        data: &[u8],
        offset: u64,
        command: &'static str,
    ) -> Result<LinkEditData> {
        let (led, _) =
            RawLinkEditData::<O>::read_from_prefix(data).map_err(|_| Error::TruncatedCommand {
                command,
                offset,
            })?;
        Ok(LinkEditData {
            raw: data.to_vec(),
            offset: led.dataoff.get(),
            size: led.datasize.get(),
        })
    }

    fn segment32(&mut self, data: &[u8], offset: u64) -> Result<LoadCommand> {
        let (seg, _) =
            RawSegment32::<O>::read_from_prefix(data).map_err(|_| Error::TruncatedCommand {
                command: "segment command",
                offset,
            })?;

        let mut headers = &data[RawSegment32::<O>::SIZE..];
        for _ in 0..seg.nsects.get() {
            let (sh, rest) =
                RawSection32::<O>::read_from_prefix(headers).map_err(|_| Error::TruncatedCommand {
                    command: "section header",
                    offset,
                })?;
            headers = rest;
            self.push_section(
                cstring(&sh.sectname),
                cstring(&sh.segname),
                u64::from(sh.addr.get()),
                u64::from(sh.size.get()),
                sh.offset.get(),
                sh.align.get(),
                sh.reloff.get(),
                sh.nreloc.get(),
                sh.flags.get(),
            )?;
        }

        Ok(LoadCommand::Segment(Segment {
            raw: data.to_vec(),
            cmd: seg.cmd.get(),
            name: cstring(&seg.segname),
            vmaddr: u64::from(seg.vmaddr.get()),
            vmsize: u64::from(seg.vmsize.get()),
            fileoff: u64::from(seg.fileoff.get()),
            filesize: u64::from(seg.filesize.get()),
            maxprot: VmProt::from_bits_retain(seg.maxprot.get()),
            initprot: VmProt::from_bits_retain(seg.initprot.get()),
            nsects: seg.nsects.get(),
            flags: seg.flags.get(),
            reader: SectionReader::new(
                Arc::clone(&self.source),
                u64::from(seg.fileoff.get()),
                u64::from(seg.filesize.get()),
            ),
        }))
    }

    fn segment64(&mut self, data: &[u8], offset: u64) -> Result<LoadCommand> {
        let (seg, _) =
            RawSegment64::<O>::read_from_prefix(data).map_err(|_| Error::TruncatedCommand {
                command: "segment command",
                offset,
            })?;

        let mut headers = &data[RawSegment64::<O>::SIZE..];
        for _ in 0..seg.nsects.get() {
            let (sh, rest) =
                RawSection64::<O>::read_from_prefix(headers).map_err(|_| Error::TruncatedCommand {
                    command: "section header",
                    offset,
                })?;
            headers = rest;
            self.push_section(
                cstring(&sh.sectname),
                cstring(&sh.segname),
                sh.addr.get(),
                sh.size.get(),
                sh.offset.get(),
                sh.align.get(),
                sh.reloff.get(),
                sh.nreloc.get(),
                sh.flags.get(),
            )?;
        }

        Ok(LoadCommand::Segment(Segment {
            raw: data.to_vec(),
            cmd: seg.cmd.get(),
            name: cstring(&seg.segname),
            vmaddr: seg.vmaddr.get(),
            vmsize: seg.vmsize.get(),
            fileoff: seg.fileoff.get(),
            filesize: seg.filesize.get(),
            maxprot: VmProt::from_bits_retain(seg.maxprot.get()),
            initprot: VmProt::from_bits_retain(seg.initprot.get()),
            nsects: seg.nsects.get(),
            flags: seg.flags.get(),
            reader: SectionReader::new(
                Arc::clone(&self.source),
                seg.fileoff.get(),
                seg.filesize.get(),
            ),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn push_section(
        &mut self,
        name: String,
        seg: String,
        addr: u64,
        size: u64,
        file_offset: u32,
        align: u32,
        reloff: u32,
        nreloc: u32,
        flags: u32,
    ) -> Result<()> {
        let relocs = self.read_relocs(reloff, nreloc)?;
        self.sections.push(Section {
            name,
            seg,
            addr,
            size,
            offset: file_offset,
            align,
            reloff,
            nreloc,
            flags,
            relocs,
            reader: SectionReader::new(Arc::clone(&self.source), u64::from(file_offset), size),
        });
        Ok(())
    }

    fn read_relocs(&self, reloff: u32, nreloc: u32) -> Result<Vec<Reloc>> {
        if nreloc == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; nreloc as usize * 8];
        self.source.read_exact_at(&mut buf, u64::from(reloff))?;

        let bo = self.byte_order;
        let mut relocs = Vec::with_capacity(nreloc as usize);
        for entry in buf.chunks_exact(8) {
            let addr = bo.read_u32(&entry[..4]);
            let word = bo.read_u32(&entry[4..]);

            relocs.push(if addr & (1 << 31) != 0 {
                // Scattered relocation: everything but the value lives in
                // the address word.
                Reloc {
                    addr: addr & ((1 << 24) - 1),
                    value: word,
                    r_type: ((addr >> 24) & 0xF) as u8,
                    len: ((addr >> 28) & 0x3) as u8,
                    pcrel: addr & (1 << 30) != 0,
                    external: false,
                    scattered: true,
                }
            } else {
                match bo {
                    ByteOrder::Little => Reloc {
                        addr,
                        value: word & ((1 << 24) - 1),
                        pcrel: word & (1 << 24) != 0,
                        len: ((word >> 25) & 0x3) as u8,
                        external: word & (1 << 27) != 0,
                        r_type: ((word >> 28) & 0xF) as u8,
                        scattered: false,
                    },
                    ByteOrder::Big => Reloc {
                        addr,
                        value: word >> 8,
                        pcrel: word & (1 << 7) != 0,
                        len: ((word >> 5) & 0x3) as u8,
                        external: word & (1 << 4) != 0,
                        r_type: (word & 0xF) as u8,
                        scattered: false,
                    },
                }
            });
        }
        Ok(relocs)
    }

    fn symtab_command(&mut self, data: &[u8], offset: u64) -> Result<LoadCommand> {
        let (hdr, _) =
            RawSymtab::<O>::read_from_prefix(data).map_err(|_| Error::TruncatedCommand {
                command: "symtab command",
                offset,
            })?;

        // A string table that cannot be read drops the symbol table but
        // not the file.
        let mut strtab = vec![0u8; hdr.strsize.get() as usize];
        if self
            .source
            .read_exact_at(&mut strtab, u64::from(hdr.stroff.get()))
            .is_err()
        {
            warn!(
                stroff = hdr.stroff.get(),
                "unreadable string table, dropping symbol table"
            );
            return Ok(LoadCommand::Unknown {
                cmd: LC_SYMTAB,
                raw: data.to_vec(),
            });
        }

        let record_size = if self.magic.is_64() {
            RawNlist64::<O>::SIZE
        } else {
            RawNlist32::<O>::SIZE
        };
        let mut symdat = vec![0u8; hdr.nsyms.get() as usize * record_size];
        self.source
            .read_exact_at(&mut symdat, u64::from(hdr.symoff.get()))?;

        let syms = self.parse_symbols(&symdat, &strtab, hdr.nsyms.get(), offset)?;

        Ok(LoadCommand::Symtab(Symtab {
            raw: data.to_vec(),
            symoff: hdr.symoff.get(),
            nsyms: hdr.nsyms.get(),
            stroff: hdr.stroff.get(),
            strsize: hdr.strsize.get(),
            syms,
        }))
    }

    fn parse_symbols(
        &self,
        symdat: &[u8],
        strtab: &[u8],
        nsyms: u32,
        offset: u64,
    ) -> Result<Vec<Symbol>> {
        let mut syms = Vec::with_capacity(nsyms as usize);
        let mut rest = symdat;

        for _ in 0..nsyms {
            let (strx, typ, sect, desc, value) = if self.magic.is_64() {
                let (n, tail) =
                    RawNlist64::<O>::read_from_prefix(rest).map_err(|_| Error::TruncatedCommand {
                        command: "symbol table entry",
                        offset,
                    })?;
                rest = tail;
                (n.n_strx.get(), n.n_type, n.n_sect, n.n_desc.get(), n.n_value.get())
            } else {
                let (n, tail) =
                    RawNlist32::<O>::read_from_prefix(rest).map_err(|_| Error::TruncatedCommand {
                        command: "symbol table entry",
                        offset,
                    })?;
                rest = tail;
                (
                    n.n_strx.get(),
                    n.n_type,
                    n.n_sect,
                    n.n_desc.get(),
                    u64::from(n.n_value.get()),
                )
            };

            if strx as usize >= strtab.len() {
                if self.options.strict_symbols {
                    return Err(Error::InvalidSymbolName {
                        value: u64::from(strx),
                        offset,
                    });
                }
                // Tolerant mode: the record is dropped.
                continue;
            }

            // Toolchains prefix C symbols with "_"; names that contain a
            // package separator get one leading underscore stripped.
            let mut name = cstring(&strtab[strx as usize..]);
            if name.contains('.') && name.starts_with('_') {
                name.remove(0);
            }

            syms.push(Symbol {
                name,
                typ,
                sect,
                desc,
                value,
            });
        }

        Ok(syms)
    }

    fn dysymtab_command(&mut self, data: &[u8], offset: u64) -> Result<LoadCommand> {
        let (hdr, _) =
            RawDysymtab::<O>::read_from_prefix(data).map_err(|_| Error::TruncatedCommand {
                command: "dysymtab command",
                offset,
            })?;

        let count = hdr.nindirectsyms.get() as usize;
        let mut buf = vec![0u8; count * 4];
        self.source
            .read_exact_at(&mut buf, u64::from(hdr.indirectsymoff.get()))?;
        let indirect_syms = buf
            .chunks_exact(4)
            .map(|c| self.byte_order.read_u32(c))
            .collect();

        Ok(LoadCommand::Dysymtab(Dysymtab {
            raw: data.to_vec(),
            ilocalsym: hdr.ilocalsym.get(),
            nlocalsym: hdr.nlocalsym.get(),
            iextdefsym: hdr.iextdefsym.get(),
            nextdefsym: hdr.nextdefsym.get(),
            iundefsym: hdr.iundefsym.get(),
            nundefsym: hdr.nundefsym.get(),
            tocoff: hdr.tocoff.get(),
            ntoc: hdr.ntoc.get(),
            modtaboff: hdr.modtaboff.get(),
            nmodtab: hdr.nmodtab.get(),
            extrefsymoff: hdr.extrefsymoff.get(),
            nextrefsyms: hdr.nextrefsyms.get(),
            indirectsymoff: hdr.indirectsymoff.get(),
            nindirectsyms: hdr.nindirectsyms.get(),
            extreloff: hdr.extreloff.get(),
            nextrel: hdr.nextrel.get(),
            locreloff: hdr.locreloff.get(),
            nlocrel: hdr.nlocrel.get(),
            indirect_syms,
        }))
    }

    fn data_in_code(&mut self, data: &[u8], offset: u64) -> Result<LoadCommand> {
        let led = self.linkedit_data(data, offset, "data in code command")?;

        let mut table = vec![0u8; led.size as usize];
        self.source
            .read_exact_at(&mut table, u64::from(led.offset))?;

        let count = led.size as usize / RawDataInCodeEntry::<O>::SIZE;
        let mut entries = Vec::with_capacity(count);
        let mut rest = table.as_slice();
        for _ in 0..count {
            let (e, tail) = RawDataInCodeEntry::<O>::read_from_prefix(rest).map_err(|_| {
                Error::TruncatedCommand {
                    command: "data in code entry",
                    offset,
                }
            })?;
            rest = tail;
            entries.push(DataInCodeEntry {
                offset: e.offset.get(),
                length: e.length.get(),
                kind: e.kind.get(),
            });
        }

        Ok(LoadCommand::DataInCode(DataInCode {
            raw: led.raw,
            offset: led.offset,
            size: led.size,
            entries,
        }))
    }

    fn build_version(&mut self, data: &[u8], offset: u64) -> Result<LoadCommand> {
        let (bv, _) =
            RawBuildVersion::<O>::read_from_prefix(data).map_err(|_| Error::TruncatedCommand {
                command: "build version command",
                offset,
            })?;

        let ntools = bv.ntools.get();
        let tools_end = RawBuildVersion::<O>::SIZE + ntools as usize * RawBuildTool::<O>::SIZE;
        if tools_end > data.len() {
            return Err(Error::InvalidBuildToolCount { offset });
        }

        let mut tools = Vec::with_capacity(ntools as usize);
        let mut rest = &data[RawBuildVersion::<O>::SIZE..];
        for _ in 0..ntools {
            let (tool, tail) =
                RawBuildTool::<O>::read_from_prefix(rest).map_err(|_| Error::TruncatedCommand {
                    command: "build tool entry",
                    offset,
                })?;
            rest = tail;
            tools.push(BuildTool {
                tool: tool.tool.get(),
                version: Version(tool.version.get()),
            });
        }

        Ok(LoadCommand::BuildVersion(BuildVersion {
            raw: data.to_vec(),
            platform: Platform::from_code(bv.platform.get()),
            minos: Version(bv.minos.get()),
            sdk: Version(bv.sdk.get()),
            ntools,
            tools,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leb128::write_uleb128;

    /// Little image builder: sequential writes for the header and command
    /// block, absolute writes for link-edit payloads.
    struct Image {
        buf: Vec<u8>,
        big: bool,
    }

    impl Image {
        fn new(big: bool) -> Self {
            Self {
                buf: Vec::new(),
                big,
            }
        }

        fn u8(&mut self, v: u8) {
            self.buf.push(v);
        }

        fn u16(&mut self, v: u16) {
            let b = if self.big {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            };
            self.buf.extend_from_slice(&b);
        }

        fn u32(&mut self, v: u32) {
            let b = if self.big {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            };
            self.buf.extend_from_slice(&b);
        }

        fn u64(&mut self, v: u64) {
            let b = if self.big {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            };
            self.buf.extend_from_slice(&b);
        }

        fn bytes(&mut self, b: &[u8]) {
            self.buf.extend_from_slice(b);
        }

        fn name16(&mut self, name: &str) {
            let mut field = [0u8; 16];
            field[..name.len()].copy_from_slice(name.as_bytes());
            self.buf.extend_from_slice(&field);
        }

        fn put_at(&mut self, offset: usize, bytes: &[u8]) {
            if self.buf.len() < offset + bytes.len() {
                self.buf.resize(offset + bytes.len(), 0);
            }
            self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        }

        fn put_u32_at(&mut self, offset: usize, v: u32) {
            let b = if self.big {
                v.to_be_bytes()
            } else {
                v.to_le_bytes()
            };
            self.put_at(offset, &b);
        }

        fn header64(&mut self, ncmds: u32, sizeofcmds: u32) {
            self.u32(MH_MAGIC_64);
            self.u32(CPU_TYPE_ARM64);
            self.u32(CPU_SUBTYPE_ARM64_ALL);
            self.u32(MH_DYLIB);
            self.u32(ncmds);
            self.u32(sizeofcmds);
            self.u32(MachFlags::DYLDLINK.bits() | MachFlags::TWOLEVEL.bits());
            self.u32(0);
        }

        fn header32(&mut self, ncmds: u32, sizeofcmds: u32) {
            self.u32(MH_MAGIC);
            self.u32(CPU_TYPE_POWERPC);
            self.u32(0);
            self.u32(MH_EXECUTE);
            self.u32(ncmds);
            self.u32(sizeofcmds);
            self.u32(0);
        }
    }

    fn sample_trie() -> Vec<u8> {
        // Root with a single "_a" edge to a regular export at 0x1000.
        let mut trie = vec![0u8, 1];
        trie.extend_from_slice(b"_a\0");
        trie.push(8);
        while trie.len() < 8 {
            trie.push(0);
        }
        trie.push(3); // terminal size
        trie.push(0); // flags
        write_uleb128(0x1000, &mut trie);
        trie.push(0); // no children
        trie
    }

    /// A 64-bit little-endian dylib exercising most command kinds.
    fn build_le64_image() -> Vec<u8> {
        let mut img = Image::new(false);
        img.header64(11, 584);

        // LC_SEGMENT_64 __TEXT with two sections.
        img.u32(LC_SEGMENT_64);
        img.u32(72 + 2 * 80);
        img.name16("__TEXT");
        img.u64(0x1_0000_0000); // vmaddr
        img.u64(0x1000); // vmsize
        img.u64(0x400); // fileoff
        img.u64(0x100); // filesize
        img.u32(5); // maxprot
        img.u32(5); // initprot
        img.u32(2); // nsects
        img.u32(0); // flags

        img.name16("__text");
        img.name16("__TEXT");
        img.u64(0x1_0000_0400);
        img.u64(8);
        img.u32(0x400);
        img.u32(2);
        img.u32(0x700); // reloff
        img.u32(2); // nreloc
        img.u32(S_REGULAR | S_ATTR_PURE_INSTRUCTIONS);
        img.u32(0);
        img.u32(0);
        img.u32(0);

        img.name16("__cstring");
        img.name16("__TEXT");
        img.u64(0x1_0000_0408);
        img.u64(5);
        img.u32(0x408);
        img.u32(0);
        img.u32(0);
        img.u32(0);
        img.u32(S_CSTRING_LITERALS);
        img.u32(0);
        img.u32(0);
        img.u32(0);

        // LC_LOAD_DYLIB /usr/lib/libSystem.B.dylib
        img.u32(LC_LOAD_DYLIB);
        img.u32(52);
        img.u32(24); // name offset
        img.u32(2); // timestamp
        img.u32(0x0001_0203); // current version 1.2.3
        img.u32(0x0001_0000); // compat version 1.0.0
        img.bytes(b"/usr/lib/libSystem.B.dylib\0\0");

        // LC_RPATH @loader_path/../Frameworks
        img.u32(LC_RPATH);
        img.u32(40);
        img.u32(12);
        img.bytes(b"@loader_path/../Frameworks\0\0");

        // LC_SYMTAB
        img.u32(LC_SYMTAB);
        img.u32(24);
        img.u32(0x500); // symoff
        img.u32(4); // nsyms
        img.u32(0x580); // stroff
        img.u32(33); // strsize

        // LC_DYSYMTAB
        img.u32(LC_DYSYMTAB);
        img.u32(80);
        img.u32(0); // ilocalsym
        img.u32(1); // nlocalsym
        img.u32(1); // iextdefsym
        img.u32(1); // nextdefsym
        img.u32(2); // iundefsym
        img.u32(2); // nundefsym
        for _ in 0..6 {
            img.u32(0);
        }
        img.u32(0x600); // indirectsymoff
        img.u32(3); // nindirectsyms
        for _ in 0..4 {
            img.u32(0);
        }

        // LC_UUID
        img.u32(LC_UUID);
        img.u32(24);
        img.bytes(&[
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x0E, 0x0F,
        ]);

        // LC_BUILD_VERSION with two tools.
        img.u32(LC_BUILD_VERSION);
        img.u32(40);
        img.u32(PLATFORM_MACOS);
        img.u32(0x000D_0100); // minos 13.1.0
        img.u32(0x000E_0000); // sdk 14.0.0
        img.u32(2); // ntools
        img.u32(3); // TOOL_LD
        img.u32(0x0386_0000); // 902.0.0
        img.u32(1); // TOOL_CLANG
        img.u32(0x000F_0000); // 15.0.0

        // LC_SOURCE_VERSION 2100.13.7.0.0
        img.u32(LC_SOURCE_VERSION);
        img.u32(16);
        img.u64((2100u64 << 40) | (13 << 30) | (7 << 20));

        // LC_DYLD_INFO_ONLY with only an export trie.
        let trie = sample_trie();
        img.u32(LC_DYLD_INFO_ONLY);
        img.u32(48);
        for _ in 0..8 {
            img.u32(0);
        }
        img.u32(0x680);
        img.u32(trie.len() as u32);

        // LC_DATA_IN_CODE with two entries.
        img.u32(LC_DATA_IN_CODE);
        img.u32(16);
        img.u32(0x6C0);
        img.u32(16);

        // An unknown command, retained raw.
        img.u32(0x3F);
        img.u32(12);
        img.u32(0xAABB_CCDD);

        assert_eq!(img.buf.len(), 32 + 584);

        // __text and __cstring payloads.
        img.put_at(0x400, &[1, 2, 3, 4, 5, 6, 7, 8]);
        img.put_at(0x408, b"hi!!\0");

        // Symbol records.
        let mut syms = Image::new(false);
        for (strx, typ, sect, value) in [
            (1u32, N_SECT | N_EXT, 1u8, 0x1_0000_0400u64),
            (8, N_SECT, 1, 0x1_0000_0408),
            (17, N_UNDF | N_EXT, 0, 0),
            (25, N_UNDF | N_EXT, 0, 0),
        ] {
            syms.u32(strx);
            syms.u8(typ);
            syms.u8(sect);
            syms.u16(0);
            syms.u64(value);
        }
        let records = syms.buf.clone();
        img.put_at(0x500, &records);
        img.put_at(0x580, b"\0_start\0_foo.bar\0_printf\0_malloc\0");

        // Indirect symbol table.
        img.put_u32_at(0x600, 10);
        img.put_u32_at(0x604, 20);
        img.put_u32_at(0x608, 30);

        // Export trie.
        img.put_at(0x680, &trie);

        // Data-in-code entries.
        let mut dice = Image::new(false);
        dice.u32(0x400);
        dice.u16(8);
        dice.u16(1);
        dice.u32(0x410);
        dice.u16(4);
        dice.u16(2);
        let entries = dice.buf.clone();
        img.put_at(0x6C0, &entries);

        // Relocations: one non-scattered, one scattered.
        img.put_u32_at(0x700, 0x4);
        img.put_u32_at(0x704, 0x1D00_0002);
        img.put_u32_at(0x708, 0xA400_0123);
        img.put_u32_at(0x70C, 0xDEAD);

        img.buf.resize(0x800, 0);
        img.buf
    }

    /// A 32-bit big-endian executable with one segment and a relocation.
    fn build_be32_image() -> Vec<u8> {
        let mut img = Image::new(true);
        img.header32(2, 124 + 16);

        // LC_SEGMENT __DATA with one section.
        img.u32(LC_SEGMENT);
        img.u32(56 + 68);
        img.name16("__DATA");
        img.u32(0x4000); // vmaddr
        img.u32(0x100); // vmsize
        img.u32(0x100); // fileoff
        img.u32(0x10); // filesize
        img.u32(3); // maxprot
        img.u32(3); // initprot
        img.u32(1); // nsects
        img.u32(0); // flags

        img.name16("__data");
        img.name16("__DATA");
        img.u32(0x4000);
        img.u32(4); // size
        img.u32(0x100); // offset
        img.u32(2);
        img.u32(0x180); // reloff
        img.u32(1); // nreloc
        img.u32(S_REGULAR);
        img.u32(0);
        img.u32(0);

        // LC_VERSION_MIN_MACOSX 10.11.0 / sdk 10.12.0
        img.u32(LC_VERSION_MIN_MACOSX);
        img.u32(16);
        img.u32(0x000A_0B00);
        img.u32(0x000A_0C00);

        assert_eq!(img.buf.len(), 28 + 140);

        img.put_at(0x100, &[1, 2, 3, 4]);

        // Non-scattered big-endian relocation: value 5, pcrel, len 2,
        // type 6.
        img.put_u32_at(0x180, 0x10);
        img.put_u32_at(0x184, (5 << 8) | (1 << 7) | (2 << 5) | 6);

        img.buf.resize(0x200, 0);
        img.buf
    }

    #[test]
    fn test_le64_header() {
        let file = MachFile::new(build_le64_image()).unwrap();
        assert_eq!(file.byte_order, ByteOrder::Little);
        assert_eq!(file.header.magic, Magic::Mach64);
        assert_eq!(file.header.cputype, CPU_TYPE_ARM64);
        assert_eq!(file.header.filetype, MH_DYLIB);
        assert_eq!(file.header.ncmds, 11);
        assert!(file.header.flags.contains(MachFlags::TWOLEVEL));
        assert_eq!(file.loads.len(), file.header.ncmds as usize);
        let total: u32 = file.loads.iter().map(|lc| lc.size()).sum();
        assert_eq!(total, file.header.sizeofcmds);
    }

    #[test]
    fn test_magic_detection_all_orders() {
        for (big, is64) in [(false, false), (false, true), (true, false), (true, true)] {
            let mut img = Image::new(big);
            if is64 {
                img.header64(0, 0);
            } else {
                img.header32(0, 0);
            }
            let file = MachFile::new(img.buf).unwrap();
            assert_eq!(
                file.byte_order,
                if big { ByteOrder::Big } else { ByteOrder::Little }
            );
            assert_eq!(file.header.magic.is_64(), is64);
            assert!(file.loads.is_empty());
        }
    }

    #[test]
    fn test_invalid_magic() {
        let data = b"\x7fELF\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0".to_vec();
        assert!(matches!(MachFile::new(data), Err(Error::InvalidMagic)));
    }

    #[test]
    fn test_segments_and_sections() {
        let file = MachFile::new(build_le64_image()).unwrap();

        let seg = file.segment("__TEXT").expect("__TEXT");
        assert_eq!(seg.vmaddr, 0x1_0000_0000);
        assert_eq!(seg.filesize, 0x100);
        assert_eq!(seg.nsects, 2);
        assert_eq!(seg.maxprot, VmProt::READ | VmProt::EXECUTE);
        assert!(file.segment("__NOPE").is_none());

        // Two sections appended in payload order.
        assert_eq!(file.sections.len(), 2);
        assert_eq!(file.sections[0].name, "__text");
        assert_eq!(file.sections[1].name, "__cstring");
        assert_eq!(file.sections[0].seg, "__TEXT");

        // Lazy readers yield exactly the section's window.
        let text = file.section("__text").expect("__text");
        assert_eq!(text.data().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let cstr = file.section("__cstring").unwrap();
        assert_eq!(cstr.data().unwrap(), b"hi!!\0".to_vec());

        // Segment data covers the whole mapped range.
        let seg_data = seg.data().unwrap();
        assert_eq!(seg_data.len(), 0x100);
        assert_eq!(&seg_data[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);

        // Independent cursors over the same segment.
        use std::io::Read;
        let mut a = seg.open();
        let mut b = seg.open();
        let mut buf = [0u8; 4];
        a.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        b.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_relocations_le() {
        let file = MachFile::new(build_le64_image()).unwrap();
        let text = file.section("__text").unwrap();
        assert_eq!(text.relocs.len(), 2);

        assert_eq!(
            text.relocs[0],
            Reloc {
                addr: 0x4,
                value: 2,
                r_type: 1,
                len: 2,
                pcrel: true,
                external: true,
                scattered: false,
            }
        );
        assert_eq!(
            text.relocs[1],
            Reloc {
                addr: 0x123,
                value: 0xDEAD,
                r_type: 4,
                len: 2,
                pcrel: false,
                external: false,
                scattered: true,
            }
        );
    }

    #[test]
    fn test_symbols() {
        let file = MachFile::new(build_le64_image()).unwrap();
        let st = file.symtab().expect("symtab");
        assert_eq!(st.nsyms, 4);
        let names: Vec<&str> = st.syms.iter().map(|s| s.name.as_str()).collect();
        // "_foo.bar" loses its underscore prefix; the others are kept.
        assert_eq!(names, ["_start", "foo.bar", "_printf", "_malloc"]);
        assert_eq!(st.syms[0].value, 0x1_0000_0400);
        assert!(st.syms[0].is_external());
        assert!(st.syms[2].is_undefined());
    }

    #[test]
    fn test_indirect_symbols() {
        let file = MachFile::new(build_le64_image()).unwrap();
        let dt = file.dysymtab().expect("dysymtab");
        assert_eq!(dt.nindirectsyms, 3);
        assert_eq!(dt.indirect_syms, vec![10, 20, 30]);
    }

    #[test]
    fn test_imports() {
        let file = MachFile::new(build_le64_image()).unwrap();
        assert_eq!(
            file.imported_libraries(),
            vec!["/usr/lib/libSystem.B.dylib"]
        );
        assert_eq!(file.imported_symbols().unwrap(), vec!["_printf", "_malloc"]);
    }

    #[test]
    fn test_symbol_lookup() {
        let file = MachFile::new(build_le64_image()).unwrap();
        assert_eq!(
            file.find_symbol_address("_START").unwrap(),
            0x1_0000_0400
        );
        assert_eq!(
            file.find_address_symbol(0x1_0000_0408).unwrap(),
            "foo.bar"
        );
        assert!(matches!(
            file.find_symbol_address("_nothere"),
            Err(Error::SymbolNotFound)
        ));
    }

    #[test]
    fn test_typed_command_accessors() {
        let file = MachFile::new(build_le64_image()).unwrap();

        let uuid = file.uuid().expect("uuid");
        assert_eq!(
            uuid.id.to_string(),
            "00010203-0405-0607-0809-0a0b0c0d0e0f"
        );

        let bv = file.build_version().expect("build version");
        assert_eq!(bv.platform, Platform::MacOs);
        assert_eq!(bv.minos.to_string(), "13.1.0");
        assert_eq!(bv.ntools, 2);
        assert_eq!(bv.tools.len(), 2);
        assert_eq!(bv.tools[1].version.to_string(), "15.0.0");

        let sv = file.source_version().expect("source version");
        assert_eq!(sv.version.to_string(), "2100.13.7.0.0");

        let rpath = file.loads.iter().find_map(|lc| match lc {
            LoadCommand::Rpath(r) => Some(r.path.as_str()),
            _ => None,
        });
        assert_eq!(rpath, Some("@loader_path/../Frameworks"));

        let dylib = file.loads.iter().find_map(|lc| match lc {
            LoadCommand::LoadDylib(d) => Some(d),
            _ => None,
        });
        let dylib = dylib.unwrap();
        assert_eq!(dylib.current_version.to_string(), "1.2.3");
        assert_eq!(dylib.timestamp, 2);
    }

    #[test]
    fn test_data_in_code_entries() {
        let file = MachFile::new(build_le64_image()).unwrap();
        let dic = file.loads.iter().find_map(|lc| match lc {
            LoadCommand::DataInCode(d) => Some(d),
            _ => None,
        });
        let dic = dic.expect("data in code");
        assert_eq!(dic.entries.len(), 2);
        assert_eq!(
            dic.entries[0],
            DataInCodeEntry {
                offset: 0x400,
                length: 8,
                kind: 1
            }
        );
        assert_eq!(dic.entries[1].kind, 2);
    }

    #[test]
    fn test_unknown_command_retained() {
        let file = MachFile::new(build_le64_image()).unwrap();
        let unknown = file.loads.iter().find_map(|lc| match lc {
            LoadCommand::Unknown { cmd, raw } => Some((*cmd, raw.len())),
            _ => None,
        });
        assert_eq!(unknown, Some((0x3F, 12)));
    }

    #[test]
    fn test_exports_via_dyld_info() {
        let file = MachFile::new(build_le64_image()).unwrap();
        let exports = file.exports(0).unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].name, "_a");
        assert_eq!(exports[0].address, 0x1000);

        let biased = file.exports(0x1_0000_0000).unwrap();
        assert_eq!(biased[0].address, 0x1_0000_1000);
    }

    #[test]
    fn test_be32_image() {
        let file = MachFile::new(build_be32_image()).unwrap();
        assert_eq!(file.byte_order, ByteOrder::Big);
        assert_eq!(file.header.magic, Magic::Mach32);
        assert_eq!(file.header.filetype, MH_EXECUTE);

        let seg = file.segment("__DATA").expect("__DATA");
        assert_eq!(seg.vmaddr, 0x4000);
        assert_eq!(seg.filesize, 0x10);

        let sect = file.section("__data").expect("__data");
        assert_eq!(sect.data().unwrap(), vec![1, 2, 3, 4]);

        assert_eq!(
            sect.relocs[0],
            Reloc {
                addr: 0x10,
                value: 5,
                r_type: 6,
                len: 2,
                pcrel: true,
                external: false,
                scattered: false,
            }
        );

        let vm = file.loads.iter().find_map(|lc| match lc {
            LoadCommand::VersionMin(v) => Some(v),
            _ => None,
        });
        let vm = vm.expect("version min");
        assert_eq!(vm.platform, Platform::MacOs);
        assert_eq!(vm.version.to_string(), "10.11.0");
        assert_eq!(vm.sdk.to_string(), "10.12.0");
    }

    #[test]
    fn test_dylib_name_offset_out_of_range() {
        let mut img = Image::new(false);
        img.header64(1, 52);
        img.u32(LC_LOAD_DYLIB);
        img.u32(52);
        img.u32(52); // name offset == cmdsize
        img.u32(0);
        img.u32(0);
        img.u32(0);
        img.bytes(&[0u8; 28]);

        match MachFile::new(img.buf) {
            Err(Error::InvalidStringOffset {
                field,
                command,
                value,
                ..
            }) => {
                assert_eq!(field, "name");
                assert_eq!(command, "dynamic library command");
                assert_eq!(value, 52);
            }
            other => panic!("expected string offset error, got {other:?}"),
        }
    }

    #[test]
    fn test_symtab_tolerance() {
        // String table beyond EOF: the file parses, the symbol table is
        // dropped.
        let mut img = Image::new(false);
        img.header64(1, 24);
        img.u32(LC_SYMTAB);
        img.u32(24);
        img.u32(0x100); // symoff
        img.u32(0); // nsyms
        img.u32(0xFFFF_0000); // stroff beyond EOF
        img.u32(64); // strsize
        img.buf.resize(0x200, 0);

        let file = MachFile::new(img.buf).unwrap();
        assert!(file.symtab().is_none());
        assert!(matches!(
            file.loads[0],
            LoadCommand::Unknown { cmd: LC_SYMTAB, .. }
        ));
        assert!(matches!(
            file.imported_symbols(),
            Err(Error::MissingSymbolTable)
        ));
    }

    fn symtab_only_image(strict_strx: u32) -> Vec<u8> {
        let mut img = Image::new(false);
        img.header64(1, 24);
        img.u32(LC_SYMTAB);
        img.u32(24);
        img.u32(0x100); // symoff
        img.u32(2); // nsyms
        img.u32(0x180); // stroff
        img.u32(8); // strsize

        let mut syms = Image::new(false);
        syms.u32(1);
        syms.u8(N_SECT);
        syms.u8(1);
        syms.u16(0);
        syms.u64(0x40);
        syms.u32(strict_strx); // out of range when >= strsize
        syms.u8(N_SECT);
        syms.u8(1);
        syms.u16(0);
        syms.u64(0x50);
        let records = syms.buf.clone();
        img.put_at(0x100, &records);
        img.put_at(0x180, b"\0_okay\0\0");
        img.buf.resize(0x200, 0);
        img.buf
    }

    #[test]
    fn test_symbol_name_offset_skipped_by_default() {
        let file = MachFile::new(symtab_only_image(200)).unwrap();
        let st = file.symtab().unwrap();
        assert_eq!(st.syms.len(), 1);
        assert_eq!(st.syms[0].name, "_okay");
    }

    #[test]
    fn test_symbol_name_offset_strict() {
        let err = MachFile::new_with_options(
            symtab_only_image(200),
            ParseOptions {
                strict_symbols: true,
            },
        )
        .unwrap_err();
        match err {
            Error::InvalidSymbolName { value, .. } => assert_eq!(value, 200),
            other => panic!("expected symbol name error, got {other:?}"),
        }
    }

    #[test]
    fn test_command_block_too_small() {
        let mut img = Image::new(false);
        img.header64(1, 4);
        img.u32(LC_UUID);
        assert!(matches!(
            MachFile::new(img.buf),
            Err(Error::CommandBlockTooSmall { .. })
        ));
    }

    #[test]
    fn test_invalid_command_size() {
        let mut img = Image::new(false);
        img.header64(1, 16);
        img.u32(LC_UUID);
        img.u32(0xFFFF); // larger than the block
        img.u32(0);
        img.u32(0);
        match MachFile::new(img.buf) {
            Err(Error::InvalidCommandSize { size, .. }) => assert_eq!(size, 0xFFFF),
            other => panic!("expected command size error, got {other:?}"),
        }

        let mut img = Image::new(false);
        img.header64(1, 16);
        img.u32(LC_UUID);
        img.u32(4); // smaller than the command header
        img.u32(0);
        img.u32(0);
        assert!(matches!(
            MachFile::new(img.buf),
            Err(Error::InvalidCommandSize { size: 4, .. })
        ));
    }
}
