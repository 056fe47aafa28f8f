// refgraph - A reflection-based binary object graph serializer.
// Copyright (C) 2026  driedpampas@proton.me
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! A reflection-based binary object graph serializer.
//!
//! `refgraph` writes and reads object graphs with identity-preserving references (shared
//! structure and cycles survive a round trip intact) and an on-wire type schema that lets a
//! reader make sense of a graph's shape even when it has no local type registered for it. See
//! [`reflect`] for how a Rust type opts in, [`value`] for the dynamic representation every value
//! passes through, and [`writer`]/[`reader`] for the codec itself.

pub mod context;
pub mod debug;
pub mod error;
pub mod kind;
pub mod primitive;
pub mod reader;
pub mod reflect;
pub mod settings;
pub mod type_data;
pub mod value;
pub mod writer;

pub use error::{Error, Result};
pub use reader::Reader;
pub use reflect::{Converter, OnDeserialized, Reflected, RuntimeType, Surrogate};
pub use settings::SerializationSettings;
pub use value::Value;
pub use writer::Writer;

use std::io::{Read, Write};

/// Writes `value` as a single root to a fresh byte buffer, using default settings.
pub fn to_bytes<T: Reflected>(value: &T) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    writer.write_root(value)?;
    Ok(writer.into_inner())
}

/// Reads a single root of type `T` from `bytes`.
pub fn from_bytes<T: Reflected>(bytes: &[u8]) -> Result<T> {
    let mut reader = Reader::new(bytes);
    reader.read_root()
}

/// Writes `value` as a single root to `w`.
pub fn write_to<W: Write, T: Reflected>(w: W, value: &T) -> Result<()> {
    Writer::new(w).write_root(value)
}

/// Reads a single root of type `T` from `r`.
pub fn read_from<R: Read, T: Reflected>(r: R) -> Result<T> {
    Reader::new(r).read_root()
}
