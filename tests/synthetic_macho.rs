//! End-to-end parse of an in-memory Mach-O image through the public API.

use std::io::{Read, Seek, SeekFrom};

use machfile::leb128::write_uleb128;
use machfile::macho::constants::*;
use machfile::trie;
use machfile::{ByteOrder, LoadCommand, MachFile, Magic};

fn u32le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn u64le(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn name16(buf: &mut Vec<u8>, name: &str) {
    let mut field = [0u8; 16];
    field[..name.len()].copy_from_slice(name.as_bytes());
    buf.extend_from_slice(&field);
}

fn put_at(buf: &mut Vec<u8>, offset: usize, bytes: &[u8]) {
    if buf.len() < offset + bytes.len() {
        buf.resize(offset + bytes.len(), 0);
    }
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// Exports `_a` and `_ab`, both regular.
fn export_trie() -> Vec<u8> {
    let mut trie = vec![0u8, 1];
    trie.extend_from_slice(b"_a\0");
    trie.push(8);
    while trie.len() < 8 {
        trie.push(0);
    }
    // _a at 0x1000, with a "b" edge.
    trie.push(3);
    trie.push(0);
    write_uleb128(0x1000, &mut trie);
    trie.push(1);
    trie.extend_from_slice(b"b\0");
    trie.push(16);
    while trie.len() < 16 {
        trie.push(0);
    }
    // _ab at 0x1010.
    trie.push(3);
    trie.push(0);
    write_uleb128(0x1010, &mut trie);
    trie.push(0);
    trie
}

/// A 64-bit little-endian dylib with one segment, an exports trie command,
/// and a symbol table.
fn build_image() -> Vec<u8> {
    let trie = export_trie();
    let mut img = Vec::new();

    // Header.
    u32le(&mut img, MH_MAGIC_64);
    u32le(&mut img, CPU_TYPE_X86_64);
    u32le(&mut img, 3);
    u32le(&mut img, MH_DYLIB);
    u32le(&mut img, 4); // ncmds
    u32le(&mut img, 152 + 52 + 24 + 16); // sizeofcmds
    u32le(&mut img, MachFlags::DYLDLINK.bits());
    u32le(&mut img, 0);

    // LC_SEGMENT_64 __TEXT with one section.
    u32le(&mut img, LC_SEGMENT_64);
    u32le(&mut img, 72 + 80);
    name16(&mut img, "__TEXT");
    u64le(&mut img, 0x1_0000_0000);
    u64le(&mut img, 0x1000);
    u64le(&mut img, 0x400);
    u64le(&mut img, 0x40);
    u32le(&mut img, 5);
    u32le(&mut img, 5);
    u32le(&mut img, 1);
    u32le(&mut img, 0);

    name16(&mut img, "__text");
    name16(&mut img, "__TEXT");
    u64le(&mut img, 0x1_0000_0400);
    u64le(&mut img, 16);
    u32le(&mut img, 0x400);
    u32le(&mut img, 4);
    u32le(&mut img, 0);
    u32le(&mut img, 0);
    u32le(&mut img, S_REGULAR | S_ATTR_PURE_INSTRUCTIONS);
    u32le(&mut img, 0);
    u32le(&mut img, 0);
    u32le(&mut img, 0);

    // LC_ID_DYLIB
    u32le(&mut img, LC_ID_DYLIB);
    u32le(&mut img, 52);
    u32le(&mut img, 24);
    u32le(&mut img, 1);
    u32le(&mut img, 0x0002_0000);
    u32le(&mut img, 0x0001_0000);
    img.extend_from_slice(b"/usr/lib/libdemo.dylib\0\0\0\0\0\0");

    // LC_SYMTAB
    u32le(&mut img, LC_SYMTAB);
    u32le(&mut img, 24);
    u32le(&mut img, 0x500);
    u32le(&mut img, 1);
    u32le(&mut img, 0x540);
    u32le(&mut img, 7);

    // LC_DYLD_EXPORTS_TRIE
    u32le(&mut img, LC_DYLD_EXPORTS_TRIE);
    u32le(&mut img, 16);
    u32le(&mut img, 0x600);
    u32le(&mut img, trie.len() as u32);

    // __text payload.
    put_at(&mut img, 0x400, &(0u8..16).collect::<Vec<u8>>());

    // One symbol: _demo at 0x1_0000_0400.
    let mut sym = Vec::new();
    u32le(&mut sym, 1);
    sym.push(N_SECT | N_EXT);
    sym.push(1);
    sym.extend_from_slice(&0u16.to_le_bytes());
    u64le(&mut sym, 0x1_0000_0400);
    put_at(&mut img, 0x500, &sym);
    put_at(&mut img, 0x540, b"\0_demo\0");

    put_at(&mut img, 0x600, &trie);
    img.resize(0x700, 0);
    img
}

#[test]
fn parses_the_whole_surface() {
    let file = MachFile::new(build_image()).unwrap();

    assert_eq!(file.header.magic, Magic::Mach64);
    assert_eq!(file.byte_order, ByteOrder::Little);
    assert_eq!(file.loads.len(), 4);
    let total: u32 = file.loads.iter().map(|lc| lc.size()).sum();
    assert_eq!(total, file.header.sizeofcmds);

    // Identity and symbol table.
    assert_eq!(file.dylib_id().unwrap().name, "/usr/lib/libdemo.dylib");
    assert_eq!(file.dylib_id().unwrap().current_version.to_string(), "2.0.0");
    assert_eq!(file.find_symbol_address("_demo").unwrap(), 0x1_0000_0400);

    // Raw bytes are kept for every command.
    for lc in &file.loads {
        assert!(lc.raw().len() >= 8);
    }
    assert!(matches!(file.loads[0], LoadCommand::Segment(_)));
}

#[test]
fn section_reader_streams_the_payload() {
    let file = MachFile::new(build_image()).unwrap();
    let section = file.section("__text").unwrap();
    assert_eq!(section.size, 16);

    let mut cursor = section.open();
    cursor.seek(SeekFrom::Start(4)).unwrap();
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).unwrap();
    assert_eq!(buf, [4, 5, 6, 7]);

    // The full window, via the convenience reader.
    assert_eq!(section.data().unwrap(), (0u8..16).collect::<Vec<u8>>());
}

#[test]
fn exports_come_from_the_trie_command() {
    let file = MachFile::new(build_image()).unwrap();

    let mut exports = file.exports(0).unwrap();
    exports.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(exports.len(), 2);
    assert_eq!(exports[0].name, "_a");
    assert_eq!(exports[0].address, 0x1000);
    assert_eq!(exports[1].name, "_ab");
    assert_eq!(exports[1].address, 0x1010);

    // Every enumerated export is reachable by lookup.
    let region = export_trie();
    for export in &exports {
        let offset = trie::walk_trie(&region, &export.name).unwrap();
        let found = trie::read_export(&region[offset..], &export.name, 0).unwrap();
        assert_eq!(&found, export);
    }
}
