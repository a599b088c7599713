//! Input side of the loader: reading files and parsing rows.
//!
//! `reader` turns a compressed TSV file into raw rows; `parser` validates each
//! row into a [`DeviceRecord`].

pub mod parser;
pub mod reader;

pub use parser::{DeviceRecord, DropReason, decode_fields, parse_record};
pub use reader::{ReadResult, TsvReader};
