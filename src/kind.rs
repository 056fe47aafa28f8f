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

use crate::error::{Error, Result};

/// The closed set of scalar and well-known reference kinds a [`TypeData`](crate::type_data::TypeData)
/// or [`RuntimeType`](crate::reflect::RuntimeType) can carry. `Object` covers every user-defined
/// reference or value type; `None` marks a type the reader could not make sense of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveKind {
    None = 0,
    Object = 1,
    Type = 2,
    String = 3,
    Bytes = 4,
    Guid = 5,
    Bool = 6,
    Char = 7,
    I8 = 8,
    U8 = 9,
    I16 = 10,
    U16 = 11,
    I32 = 12,
    U32 = 13,
    I64 = 14,
    U64 = 15,
    F32 = 16,
    F64 = 17,
    Decimal = 18,
}

impl PrimitiveKind {
    /// Reference kinds need an id in the wire framing; value kinds are inlined directly.
    /// `Object` is ambiguous on its own; callers must consult the owning `RuntimeType`'s
    /// `is_reference` flag instead, since a user type can be a value type (struct) or a
    /// reference type (class).
    pub fn is_always_reference(self) -> bool {
        matches!(self, PrimitiveKind::String | PrimitiveKind::Bytes | PrimitiveKind::Type)
    }

    pub fn is_scalar_value(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Bool
                | PrimitiveKind::Char
                | PrimitiveKind::I8
                | PrimitiveKind::U8
                | PrimitiveKind::I16
                | PrimitiveKind::U16
                | PrimitiveKind::I32
                | PrimitiveKind::U32
                | PrimitiveKind::I64
                | PrimitiveKind::U64
                | PrimitiveKind::F32
                | PrimitiveKind::F64
                | PrimitiveKind::Decimal
                | PrimitiveKind::Guid
        )
    }
}

impl TryFrom<u8> for PrimitiveKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PrimitiveKind::None,
            1 => PrimitiveKind::Object,
            2 => PrimitiveKind::Type,
            3 => PrimitiveKind::String,
            4 => PrimitiveKind::Bytes,
            5 => PrimitiveKind::Guid,
            6 => PrimitiveKind::Bool,
            7 => PrimitiveKind::Char,
            8 => PrimitiveKind::I8,
            9 => PrimitiveKind::U8,
            10 => PrimitiveKind::I16,
            11 => PrimitiveKind::U16,
            12 => PrimitiveKind::I32,
            13 => PrimitiveKind::U32,
            14 => PrimitiveKind::I64,
            15 => PrimitiveKind::U64,
            16 => PrimitiveKind::F32,
            17 => PrimitiveKind::F64,
            18 => PrimitiveKind::Decimal,
            _ => return Err(Error::MalformedStream(format!("invalid primitive kind {value}"))),
        })
    }
}

/// The shape of a container-bearing `RuntimeType`/`TypeData`. Occupies 3 bits of the flag word,
/// so at most 8 variants are available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CollectionShape {
    #[default]
    None = 0,
    UntypedList = 1,
    UntypedDict = 2,
    TypedCollection = 3,
    TypedDict = 4,
}

impl TryFrom<u8> for CollectionShape {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => CollectionShape::None,
            1 => CollectionShape::UntypedList,
            2 => CollectionShape::UntypedDict,
            3 => CollectionShape::TypedCollection,
            4 => CollectionShape::TypedDict,
            _ => return Err(Error::MalformedStream(format!("invalid collection shape {value}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_kind_roundtrips_through_u8() {
        for raw in 0u8..=18 {
            let kind = PrimitiveKind::try_from(raw).unwrap();
            assert_eq!(kind as u8, raw);
        }
        assert!(PrimitiveKind::try_from(19).is_err());
    }

    #[test]
    fn collection_shape_roundtrips_through_u8() {
        for raw in 0u8..=4 {
            let shape = CollectionShape::try_from(raw).unwrap();
            assert_eq!(shape as u8, raw);
        }
        assert!(CollectionShape::try_from(5).is_err());
    }
}
