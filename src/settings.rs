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

//! Stream-level configuration, written once as a varuint flag word at depth 1.

use crate::error::{Error, Result};
use crate::primitive::{PrimitiveReader, PrimitiveWriter};
use std::io::{Read, Write};

const SKIP_MEMBER_DATA: u64 = 1 << 0;
const IGNORE_CONVERTER: u64 = 1 << 1;
const IGNORE_CUSTOM: u64 = 1 << 2;
const KNOWN_BITS: u64 = SKIP_MEMBER_DATA | IGNORE_CONVERTER | IGNORE_CUSTOM;

/// Toggles that change how the writer/reader treat otherwise-eligible dispatch paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializationSettings {
    /// Write/read a type's schema only; member bodies are skipped (the reader gets `ObjectData`
    /// placeholders back). Useful for inspecting a stream's shape without materializing it.
    pub skip_member_data: bool,
    /// Never use a registered `Converter<T>`, even when one exists; falls back to member-wise
    /// encoding instead.
    pub ignore_converter: bool,
    /// Never use a registered `Converter<T>` or `is_custom_serializable` path, even when one
    /// applies.
    pub ignore_custom: bool,
}

impl SerializationSettings {
    pub fn builder() -> SerializationSettingsBuilder {
        SerializationSettingsBuilder::default()
    }

    fn to_word(self) -> u64 {
        let mut word = 0u64;
        if self.skip_member_data {
            word |= SKIP_MEMBER_DATA;
        }
        if self.ignore_converter {
            word |= IGNORE_CONVERTER;
        }
        if self.ignore_custom {
            word |= IGNORE_CUSTOM;
        }
        word
    }

    fn from_word(word: u64) -> Result<Self> {
        if word & !KNOWN_BITS != 0 {
            return Err(Error::UnknownSettingsBit((word & !KNOWN_BITS).trailing_zeros()));
        }
        Ok(SerializationSettings {
            skip_member_data: word & SKIP_MEMBER_DATA != 0,
            ignore_converter: word & IGNORE_CONVERTER != 0,
            ignore_custom: word & IGNORE_CUSTOM != 0,
        })
    }

    pub fn write<W: Write>(self, w: &mut W) -> Result<()> {
        w.write_varuint(self.to_word())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        Self::from_word(r.read_varuint()?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerializationSettingsBuilder {
    settings: SerializationSettings,
}

impl SerializationSettingsBuilder {
    pub fn skip_member_data(mut self, value: bool) -> Self {
        self.settings.skip_member_data = value;
        self
    }

    pub fn ignore_converter(mut self, value: bool) -> Self {
        self.settings.ignore_converter = value;
        self
    }

    pub fn ignore_custom(mut self, value: bool) -> Self {
        self.settings.ignore_custom = value;
        self
    }

    pub fn build(self) -> SerializationSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_settings_roundtrip_to_zero() {
        let mut buf = Vec::new();
        SerializationSettings::default().write(&mut buf).unwrap();
        assert_eq!(buf, vec![0]);
    }

    #[test]
    fn builder_roundtrips_through_wire() {
        let settings = SerializationSettings::builder()
            .skip_member_data(true)
            .ignore_custom(true)
            .build();
        let mut buf = Vec::new();
        settings.write(&mut buf).unwrap();
        let mut cur = Cursor::new(buf);
        let read_back = SerializationSettings::read(&mut cur).unwrap();
        assert_eq!(read_back, settings);
        assert!(!read_back.ignore_converter);
    }

    #[test]
    fn unknown_bit_is_rejected() {
        let mut buf = Vec::new();
        buf.write_varuint(1 << 10).unwrap();
        let mut cur = Cursor::new(buf);
        assert!(matches!(
            SerializationSettings::read(&mut cur),
            Err(Error::UnknownSettingsBit(_))
        ));
    }
}
