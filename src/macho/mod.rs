//! Mach-O file format handling.
//!
//! This module provides the object model over a Mach-O binary: the fixed
//! header, typed load commands, segments and sections with lazy payload
//! readers, symbol tables, and the DWARF section shim.

pub mod constants;
pub mod structs;

mod commands;
mod dwarf;
mod file;

pub use commands::*;
pub use constants::*;
pub use dwarf::{DwarfData, DwarfReader};
pub use file::{FileHeader, MachFile, Magic, ParseOptions};
