//! DWARF debug section collection.
//!
//! Mach-O stores DWARF in sections named `__debug_<kind>`, or
//! `__zdebug_<kind>` when ZLIB-compressed. This shim gathers the sections
//! the decoder needs, inflates compressed ones, and hands the bytes to
//! `gimli`. Bit-exact DWARF interpretation is gimli's business, not ours.

use std::io::Read;
use std::rc::Rc;

use flate2::read::ZlibDecoder;
use gimli::{DebugTypes, Dwarf, EndianRcSlice, RunTimeEndian, SectionId};

use super::commands::Section;
use super::file::MachFile;
use crate::bytes::ByteOrder;
use crate::error::Result;

/// Reader type handed to gimli: refcounted bytes tagged with the file's
/// byte order.
pub type DwarfReader = EndianRcSlice<RunTimeEndian>;

/// The DWARF data of a Mach-O file.
pub struct DwarfData {
    /// The standard section set (abbrev, info, str, line, ranges).
    pub dwarf: Dwarf<DwarfReader>,
    /// DWARF4 `__debug_types` sections, keyed `types-<section index>`.
    pub types: Vec<(String, DebugTypes<DwarfReader>)>,
}

/// Returns the DWARF kind a section holds, going by its name.
fn dwarf_suffix(section: &Section) -> Option<&str> {
    section
        .name
        .strip_prefix("__debug_")
        .or_else(|| section.name.strip_prefix("__zdebug_"))
}

/// Reads a debug section, inflating it when the payload carries the
/// `ZLIB` marker and a big-endian decompressed length.
fn section_data(section: &Section) -> Result<Vec<u8>> {
    let bytes = section.data()?;

    if bytes.len() >= 12 && &bytes[..4] == b"ZLIB" {
        let dlen = ByteOrder::Big.read_u64(&bytes[4..12]);
        let mut inflated = vec![0u8; dlen as usize];
        let mut decoder = ZlibDecoder::new(&bytes[12..]);
        decoder.read_exact(&mut inflated)?;
        return Ok(inflated);
    }

    Ok(bytes)
}

impl MachFile {
    /// Collects the DWARF debug sections of this file and returns them
    /// wrapped in a gimli [`Dwarf`].
    ///
    /// Only the sections the decoder consumes are loaded: `abbrev`,
    /// `info`, `str`, `line`, and `ranges`, plus any DWARF4 `types`
    /// sections as auxiliary type units. Everything else is left on disk.
    pub fn dwarf(&self) -> Result<DwarfData> {
        let endian = match self.byte_order {
            ByteOrder::Little => RunTimeEndian::Little,
            ByteOrder::Big => RunTimeEndian::Big,
        };

        let mut abbrev = Vec::new();
        let mut info = Vec::new();
        let mut strings = Vec::new();
        let mut line = Vec::new();
        let mut ranges = Vec::new();

        for section in &self.sections {
            let dest = match dwarf_suffix(section) {
                Some("abbrev") => &mut abbrev,
                Some("info") => &mut info,
                Some("str") => &mut strings,
                Some("line") => &mut line,
                Some("ranges") => &mut ranges,
                _ => continue,
            };
            *dest = section_data(section)?;
        }

        let reader = |bytes: &Vec<u8>| DwarfReader::new(Rc::from(bytes.as_slice()), endian);

        let dwarf = Dwarf::load(|id| {
            Ok::<_, crate::error::Error>(match id {
                SectionId::DebugAbbrev => reader(&abbrev),
                SectionId::DebugInfo => reader(&info),
                SectionId::DebugStr => reader(&strings),
                SectionId::DebugLine => reader(&line),
                SectionId::DebugRanges => reader(&ranges),
                _ => DwarfReader::new(Rc::from(&[][..]), endian),
            })
        })?;

        let mut types = Vec::new();
        for (index, section) in self.sections.iter().enumerate() {
            if dwarf_suffix(section) != Some("types") {
                continue;
            }
            let bytes = section_data(section)?;
            types.push((
                format!("types-{index}"),
                DebugTypes::from(DwarfReader::new(Rc::from(bytes.as_slice()), endian)),
            ));
        }

        Ok(DwarfData { dwarf, types })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SectionReader;
    use std::io::Write;
    use std::sync::Arc;

    fn section_over(name: &str, bytes: Vec<u8>) -> Section {
        let size = bytes.len() as u64;
        Section {
            name: name.to_string(),
            seg: "__DWARF".to_string(),
            addr: 0,
            size,
            offset: 0,
            align: 0,
            reloff: 0,
            nreloc: 0,
            flags: 0,
            relocs: Vec::new(),
            reader: SectionReader::new(Arc::new(bytes), 0, size),
        }
    }

    #[test]
    fn test_dwarf_suffix() {
        let plain = section_over("__debug_info", vec![]);
        assert_eq!(dwarf_suffix(&plain), Some("info"));
        let compressed = section_over("__zdebug_abbrev", vec![]);
        assert_eq!(dwarf_suffix(&compressed), Some("abbrev"));
        let code = section_over("__text", vec![]);
        assert_eq!(dwarf_suffix(&code), None);
    }

    #[test]
    fn test_section_data_passthrough() {
        let section = section_over("__debug_str", b"plain\0bytes".to_vec());
        assert_eq!(section_data(&section).unwrap(), b"plain\0bytes");
    }

    #[test]
    fn test_section_data_zlib() {
        let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut blob = b"ZLIB".to_vec();
        blob.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        blob.extend_from_slice(&compressed);

        let section = section_over("__zdebug_info", blob);
        assert_eq!(section_data(&section).unwrap(), payload);
    }

    #[test]
    fn test_short_zlib_marker_is_plain_data() {
        // Fewer than 12 bytes cannot carry the marker plus length.
        let section = section_over("__debug_line", b"ZLIB".to_vec());
        assert_eq!(section_data(&section).unwrap(), b"ZLIB");
    }
}
