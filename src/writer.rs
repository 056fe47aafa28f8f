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

//! Encodes a [`Value`] tree to a byte stream, structured as an `Encoder<W: Write>` over the
//! sink, one `write_*` method per value shape.
//!
//! Every write is driven by an *expected* [`TypeData`] alongside the value, the same way the
//! reader needs one to know what comes next: plain scalar kinds carry no inline tag, so whether
//! a slot can be absent at all is a property of its declared type (`is_nullable`), not of the
//! value being written.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::primitive::PrimitiveWriter;
use crate::reflect::{Reflected, RuntimeType};
use crate::settings::SerializationSettings;
use crate::type_data::TypeData;
use crate::value::{ObjRef, ObjectKind, Value};
use std::io::Write;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// The wire format version this engine reads and writes. The well-known preamble is fixed and
/// part of this version, so any change to it must bump the value.
pub const STREAM_VERSION: u64 = 0x0103;

pub struct Writer<W: Write> {
    inner: W,
    ctx: Context,
    settings: SerializationSettings,
    wrote_header: bool,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self::with_settings(inner, SerializationSettings::default())
    }

    pub fn with_settings(inner: W, settings: SerializationSettings) -> Self {
        Writer {
            inner,
            ctx: Context::new(),
            settings,
            wrote_header: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Writes `value` as a new top-level root, via its [`Reflected::to_value`] conversion.
    /// A `Writer` may write several roots in sequence; they all share one reference table.
    pub fn write_root<T: Reflected>(&mut self, value: &T) -> Result<()> {
        let top = TypeData::from_runtime_type(&RuntimeType::top());
        let v = value.to_value();
        self.write_value(&top, &v)
    }

    /// Writes an already-dynamic [`Value`] against its declared `expected` type.
    pub fn write_value(&mut self, expected: &Rc<TypeData>, value: &Value) -> Result<()> {
        if !self.wrote_header {
            self.inner.write_varuint(STREAM_VERSION)?;
            self.settings.write(&mut self.inner)?;
            self.wrote_header = true;
        }

        let kind = expected.kind.get();
        if expected.flags.get().is_nullable && kind.is_scalar_value() {
            if matches!(value, Value::Null) {
                return self.inner.write_varuint(0);
            }
            self.inner.write_varuint(1)?;
        }

        match value {
            Value::Null => self.inner.write_varuint(0),
            Value::Bool(b) => self.inner.write_bool(*b),
            Value::Char(c) => self.inner.write_u32_fixed(*c as u32),
            Value::I8(v) => self.inner.write_u8_prim(*v as u8),
            Value::U8(v) => self.inner.write_u8_prim(*v),
            Value::I16(v) => self.inner.write_i16(*v),
            Value::U16(v) => self.inner.write_u16(*v),
            Value::I32(v) => self.inner.write_i32_fixed(*v),
            Value::U32(v) => self.inner.write_u32_fixed(*v),
            Value::I64(v) => self.inner.write_i64_fixed(*v),
            Value::U64(v) => self.inner.write_u64_fixed(*v),
            Value::F32(v) => self.inner.write_f32(*v),
            Value::F64(v) => self.inner.write_f64(*v),
            Value::Decimal(v) => self.inner.write_decimal(v),
            Value::Guid(v) => self.inner.write_guid(v),
            Value::Type(td) => TypeData::write_ref(&Some(td.clone()), &mut self.inner, &mut self.ctx),
            Value::String(_) | Value::Bytes(_) => self.write_reference(value),
            Value::Object(obj_ref) => self.write_object(expected, obj_ref),
        }
    }

    fn write_reference(&mut self, value: &Value) -> Result<()> {
        if let Some(id) = self.ctx.try_get_id(value) {
            return self.inner.write_varuint(id);
        }
        let id = self.ctx.new_id();
        self.inner.write_varuint(id)?;
        self.ctx.register(id, value.clone())?;
        match value {
            Value::String(s) => self.inner.write_string_prim(s),
            Value::Bytes(b) => self.inner.write_bytes_blob(b),
            _ => unreachable!("write_reference only called for String/Bytes"),
        }
    }

    /// Dispatches an `Object`-kind value: reference types get id framing (and, if `expected` is
    /// not sealed, an inline actual-type descriptor); value types are inlined directly at
    /// `expected` with no id and no descriptor, since a value type cannot be polymorphic.
    fn write_object(&mut self, expected: &Rc<TypeData>, obj_ref: &ObjRef) -> Result<()> {
        if !expected.flags.get().is_reference {
            let actual_type = obj_ref.borrow().type_data.clone();
            return self.write_object_payload(obj_ref, &actual_type);
        }

        let value = Value::Object(obj_ref.clone());
        if let Some(id) = self.ctx.try_get_id(&value) {
            return self.inner.write_varuint(id);
        }
        let id = self.ctx.new_id();
        self.inner.write_varuint(id)?;
        self.ctx.register(id, value)?;

        let actual_type = obj_ref.borrow().type_data.clone();
        if !expected.flags.get().is_sealed {
            TypeData::write_ref(&Some(actual_type.clone()), &mut self.inner, &mut self.ctx)?;
        }
        self.write_object_payload(obj_ref, &actual_type)
    }

    /// Writes the body of an object once its id (and, if applicable, actual-type descriptor)
    /// have already been written. Dispatch priority is surrogate > converter > custom >
    /// primitive kind, driven entirely by `actual_type`'s flags and the active settings, not by
    /// which `ObjectKind` variant happens to be present, so that a reader deriving the same
    /// branch purely from the wire `TypeData` always agrees.
    fn write_object_payload(&mut self, obj_ref: &ObjRef, actual_type: &Rc<TypeData>) -> Result<()> {
        let kind = obj_ref.borrow().kind.clone();
        let flags = actual_type.flags.get();

        if let Some(surrogate_type) = actual_type.surrogate.borrow().clone() {
            let ObjectKind::Surrogate(inner) = kind else {
                return Err(Error::Custom(
                    "actual type declares a surrogate but the value was not encoded as one".into(),
                ));
            };
            return self.write_value(&surrogate_type, &inner);
        }

        if flags.has_converter && !self.settings.ignore_converter {
            if let ObjectKind::Converter { repr, .. } = kind {
                let string_type = TypeData::from_runtime_type(&RuntimeType::string());
                return self.write_value(&string_type, &Value::string(repr));
            }
        } else if flags.has_converter {
            debug!(type_name = %actual_type.full_name.borrow(), "ignore_converter set; falling back to member-wise encoding");
        }

        if flags.is_custom_serializable && !self.settings.ignore_custom {
            let fields = match kind {
                ObjectKind::Custom(fields) => fields,
                ObjectKind::Converter { fallback, .. } => fallback,
                other => return self.write_plain_body(actual_type, other),
            };
            return self.write_custom_bag(&fields);
        }
        if flags.is_custom_serializable {
            debug!(type_name = %actual_type.full_name.borrow(), "ignore_custom set; falling back to member-wise encoding");
        }

        self.write_plain_body(actual_type, kind)
    }

    /// The primitive-kind fallback: plain member fields, or a container tail. Also the landing
    /// spot when `ignore_converter`/`ignore_custom` forced a fallthrough from a converter/custom
    /// payload that still carries its plain field values.
    fn write_plain_body(&mut self, actual_type: &Rc<TypeData>, kind: ObjectKind) -> Result<()> {
        match kind {
            ObjectKind::Pending => Err(Error::MalformedStream(
                "attempted to write an object still pending construction".into(),
            )),
            ObjectKind::Fields(fields)
            | ObjectKind::Custom(fields)
            | ObjectKind::Converter { fallback: fields, .. } => self.write_fields(actual_type, &fields),
            ObjectKind::Enum(inner) => {
                let underlying = self.element_type_or_top(actual_type.element.borrow().clone());
                self.write_value(&underlying, &inner)
            }
            ObjectKind::List { is_readonly, items } => {
                self.inner.write_bool(is_readonly)?;
                if is_readonly {
                    return Ok(());
                }
                let element_type = self.element_type_or_top(actual_type.collection_key.borrow().clone());
                self.inner.write_varuint(items.len() as u64)?;
                for item in &items {
                    self.write_value(&element_type, item)?;
                }
                Ok(())
            }
            ObjectKind::Dict { is_readonly, items } => {
                self.inner.write_bool(is_readonly)?;
                if is_readonly {
                    return Ok(());
                }
                let key_type = self.element_type_or_top(actual_type.collection_key.borrow().clone());
                let value_type = self.element_type_or_top(actual_type.collection_value.borrow().clone());
                self.inner.write_varuint(items.len() as u64)?;
                for (k, v) in &items {
                    self.write_value(&key_type, k)?;
                    self.write_value(&value_type, v)?;
                }
                Ok(())
            }
            ObjectKind::Array { lengths, elements } => {
                let element_type = self.element_type_or_top(actual_type.element.borrow().clone());
                self.inner.write_varuint(lengths.len() as u64)?;
                for l in &lengths {
                    self.inner.write_varuint(*l as u64)?;
                }
                let expected: usize = lengths.iter().product();
                if expected != elements.len() {
                    return Err(Error::CountMismatch {
                        id: 0,
                        reported: expected,
                        actual: elements.len(),
                    });
                }
                for e in &elements {
                    self.write_value(&element_type, e)?;
                }
                Ok(())
            }
            ObjectKind::Surrogate(_) => Err(Error::Custom(
                "surrogate-kind value reached the plain-body fallback".into(),
            )),
        }
    }

    /// Writes member values in the order the schema (`TypeData::members`) declares them, with no
    /// names on the wire: the reader already has the schema. When a name is shared by more than
    /// one class in the hierarchy (a derived class shadowing a base field), `fields` is expected
    /// to key the shadowed entries `"{name}#{position}"` (base-most is position 0) rather than by
    /// plain name, matching `reader.rs::resolve_member_key`'s degenerate (wire == local) case.
    fn write_fields(&mut self, actual_type: &Rc<TypeData>, fields: &[(String, Value)]) -> Result<()> {
        let members = actual_type.members.borrow().clone();
        for (i, m) in members.iter().enumerate() {
            let chain_len = members.iter().filter(|o| o.name == m.name).count();
            let position = members[..i].iter().filter(|o| o.name == m.name).count();
            let key =
                if chain_len > 1 { format!("{}#{position}", m.name) } else { m.name.clone() };
            let v = fields
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null);
            self.write_value(&m.declared_type, &v)?;
        }
        Ok(())
    }

    /// Writes the custom-serializable dynamic bag framing: `varuint member_count` then
    /// `(string name, object value)` pairs, each value at the universal top type.
    fn write_custom_bag(&mut self, fields: &[(String, Value)]) -> Result<()> {
        let string_type = TypeData::from_runtime_type(&RuntimeType::string());
        let top = TypeData::from_runtime_type(&RuntimeType::top());
        self.inner.write_varuint(fields.len() as u64)?;
        for (name, v) in fields {
            self.write_value(&string_type, &Value::string(name.clone()))?;
            self.write_value(&top, v)?;
        }
        Ok(())
    }

    fn element_type_or_top(&self, slot: Option<Rc<TypeData>>) -> Rc<TypeData> {
        slot.unwrap_or_else(|| TypeData::from_runtime_type(&RuntimeType::top()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_root_writes_version_and_settings_then_raw_value() {
        let mut w = Writer::new(Vec::new());
        let top = TypeData::from_runtime_type(&RuntimeType::i32());
        w.write_value(&top, &Value::I32(7)).unwrap();
        // varuint(STREAM_VERSION=0x0103) = [0x83, 0x02], varuint(settings=0) = [0], then i32 LE.
        assert_eq!(w.into_inner(), vec![0x83, 0x02, 0, 7, 0, 0, 0]);
    }

    #[test]
    fn nullable_scalar_root_carries_a_presence_marker() {
        let rt = Arc::new(RuntimeType { is_nullable: true, ..RuntimeType::unsupported_with_kind(crate::kind::PrimitiveKind::I32) });
        let nullable_i32 = TypeData::from_runtime_type(&rt);

        let mut present = Writer::new(Vec::new());
        present.write_value(&nullable_i32, &Value::I32(5)).unwrap();
        assert_eq!(present.into_inner(), vec![0x83, 0x02, 0, 1, 5, 0, 0, 0]);

        let mut absent = Writer::new(Vec::new());
        absent.write_value(&nullable_i32, &Value::Null).unwrap();
        assert_eq!(absent.into_inner(), vec![0x83, 0x02, 0, 0]);
    }

    #[test]
    fn repeated_string_writes_its_body_once() {
        let mut w = Writer::new(Vec::new());
        let top = TypeData::from_runtime_type(&RuntimeType::top());
        let s = Value::string("shared");
        let list = Value::list(RuntimeType::string(), vec![s.clone(), s]);
        w.write_value(&top, &list).unwrap();
        let out = w.into_inner();
        let needle = b"shared";
        let occurrences = out.windows(needle.len()).filter(|w| *w == needle).count();
        assert_eq!(occurrences, 1);
    }
}
