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

//! Decodes a byte stream back into a [`Value`] tree, structured as a `Decoder<R: Read>` over the
//! source. Unlike the writer, every recursive step here needs an *expected* [`TypeData`] to know
//! what shape comes next on the wire: scalars carry no inline tag, so the decoder relies on a
//! preceding type descriptor to know how to read each field.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::kind::{CollectionShape, PrimitiveKind};
use crate::primitive::PrimitiveReader;
use crate::reflect::{self, RuntimeType};
use crate::settings::SerializationSettings;
use crate::type_data::TypeData;
use crate::value::{ObjectKind, ObjectValue, Value};
use crate::writer::STREAM_VERSION;
use std::cell::RefCell;
use std::io::Read;
use std::rc::Rc;
use tracing::warn;

pub struct Reader<R: Read> {
    inner: R,
    ctx: Context,
    settings: Option<SerializationSettings>,
    /// ids of every object read, in the order their bodies were completed; the order the
    /// post-construction callback pass walks in.
    completed_object_ids: Vec<u64>,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Reader {
            inner,
            ctx: Context::new(),
            settings: None,
            completed_object_ids: Vec::new(),
        }
    }

    /// Lazily reads the one-time header (`varuint VERSION, varuint SETTINGS_FLAGS`) on first use,
    /// then caches the settings for the rest of this reader's lifetime.
    fn settings(&mut self) -> Result<SerializationSettings> {
        if let Some(s) = self.settings {
            return Ok(s);
        }
        let version = self.inner.read_varuint()?;
        if version != STREAM_VERSION {
            return Err(Error::UnsupportedVersion(version as u32));
        }
        let s = SerializationSettings::read(&mut self.inner)?;
        self.settings = Some(s);
        Ok(s)
    }

    /// Reads one top-level root and converts it to `T` via [`Reflected::from_value`].
    pub fn read_root<T: reflect::Reflected>(&mut self) -> Result<T> {
        let top = TypeData::from_runtime_type(&RuntimeType::top());
        let value = self.read_value(&top)?;
        self.run_post_construction_callbacks();
        T::from_value(value)
    }

    /// Reads one top-level root without attempting to construct any particular Rust type.
    pub fn read_root_value(&mut self) -> Result<Value> {
        let top = TypeData::from_runtime_type(&RuntimeType::top());
        let value = self.read_value(&top)?;
        self.run_post_construction_callbacks();
        Ok(value)
    }

    fn read_value(&mut self, expected: &Rc<TypeData>) -> Result<Value> {
        self.settings()?;
        let kind = expected.kind.get();
        if expected.flags.get().is_nullable && kind.is_scalar_value() {
            let present = self.inner.read_varuint()?;
            if present == 0 {
                return Ok(Value::Null);
            }
        }
        match kind {
            PrimitiveKind::Bool => Ok(Value::Bool(self.inner.read_bool()?)),
            PrimitiveKind::Char => {
                let raw = self.inner.read_u32_fixed()?;
                Ok(Value::Char(char::from_u32(raw).unwrap_or('\u{FFFD}')))
            }
            PrimitiveKind::I8 => Ok(Value::I8(self.inner.read_u8_prim()? as i8)),
            PrimitiveKind::U8 => Ok(Value::U8(self.inner.read_u8_prim()?)),
            PrimitiveKind::I16 => Ok(Value::I16(self.inner.read_i16()?)),
            PrimitiveKind::U16 => Ok(Value::U16(self.inner.read_u16()?)),
            PrimitiveKind::I32 => Ok(Value::I32(self.inner.read_i32_fixed()?)),
            PrimitiveKind::U32 => Ok(Value::U32(self.inner.read_u32_fixed()?)),
            PrimitiveKind::I64 => Ok(Value::I64(self.inner.read_i64_fixed()?)),
            PrimitiveKind::U64 => Ok(Value::U64(self.inner.read_u64_fixed()?)),
            PrimitiveKind::F32 => Ok(Value::F32(self.inner.read_f32()?)),
            PrimitiveKind::F64 => Ok(Value::F64(self.inner.read_f64()?)),
            PrimitiveKind::Decimal => Ok(Value::Decimal(self.inner.read_decimal()?)),
            PrimitiveKind::Guid => Ok(Value::Guid(self.inner.read_guid()?)),
            PrimitiveKind::Type => {
                Ok(TypeData::read_ref(&mut self.inner, &mut self.ctx)?.map_or(Value::Null, Value::Type))
            }
            PrimitiveKind::String => self.read_reference(PrimitiveKind::String),
            PrimitiveKind::Bytes => self.read_reference(PrimitiveKind::Bytes),
            PrimitiveKind::None | PrimitiveKind::Object => self.read_object_reference(expected),
        }
    }

    fn read_reference(&mut self, kind: PrimitiveKind) -> Result<Value> {
        let id = self.inner.read_varuint()?;
        if id == 0 {
            return Ok(Value::Null);
        }
        if let Some(existing) = self.ctx.try_get_object(id) {
            return Ok(existing);
        }
        let value = match kind {
            PrimitiveKind::String => Value::string(self.inner.read_string_prim()?),
            PrimitiveKind::Bytes => Value::bytes(self.inner.read_bytes_blob()?),
            _ => unreachable!("read_reference only called for String/Bytes"),
        };
        self.ctx.register(id, value.clone())?;
        Ok(value)
    }

    /// Dispatches an object value: a value type (`!is_reference`) is inlined directly at
    /// `expected` with no id and no actual-type descriptor, mirroring `Writer::write_object`
    /// exactly so both sides agree on when framing is present without negotiating it on the wire.
    fn read_object_reference(&mut self, expected: &Rc<TypeData>) -> Result<Value> {
        if !expected.flags.get().is_reference {
            let body = self.read_object_body(expected)?;
            let obj_ref = Rc::new(RefCell::new(ObjectValue {
                type_data: expected.clone(),
                kind: body,
            }));
            return Ok(Value::Object(obj_ref));
        }

        let id = self.inner.read_varuint()?;
        if id == 0 {
            return Ok(Value::Null);
        }
        if let Some(existing) = self.ctx.try_get_object(id) {
            return Ok(existing);
        }
        let actual_type = if expected.flags.get().is_sealed {
            expected.clone()
        } else {
            TypeData::read_ref(&mut self.inner, &mut self.ctx)?.unwrap_or_else(|| expected.clone())
        };
        let obj_ref = Rc::new(RefCell::new(ObjectValue {
            type_data: actual_type.clone(),
            kind: ObjectKind::Pending,
        }));
        let placeholder = Value::Object(obj_ref.clone());
        self.ctx.register(id, placeholder)?;

        let body = self.read_object_body(&actual_type)?;
        obj_ref.borrow_mut().kind = body;
        self.completed_object_ids.push(id);
        Ok(Value::Object(obj_ref))
    }

    /// Mirrors `Writer::write_object_payload`'s dispatch: surrogate > converter > custom >
    /// primitive kind, derived purely from `actual_type`'s flags and the active settings.
    fn read_object_body(&mut self, actual_type: &Rc<TypeData>) -> Result<ObjectKind> {
        let settings = self.settings()?;
        let flags = actual_type.flags.get();

        if let Some(surrogate_type) = actual_type.surrogate.borrow().clone() {
            let inner = self.read_value(&surrogate_type)?;
            return Ok(ObjectKind::Surrogate(Box::new(inner)));
        }

        if flags.has_converter && !settings.ignore_converter {
            let string_type = TypeData::from_runtime_type(&RuntimeType::string());
            let repr = match self.read_value(&string_type)? {
                Value::String(s) => s.to_string(),
                _ => String::new(),
            };
            return Ok(ObjectKind::Converter { repr, fallback: Vec::new() });
        }

        if flags.is_custom_serializable && !settings.ignore_custom {
            return self.read_custom_body();
        }

        match actual_type.collection_shape.get() {
            CollectionShape::TypedCollection | CollectionShape::UntypedList => {
                return self.read_list_body(actual_type, settings.skip_member_data);
            }
            CollectionShape::TypedDict | CollectionShape::UntypedDict => {
                return self.read_dict_body(actual_type, settings.skip_member_data);
            }
            CollectionShape::None => {}
        }

        if flags.is_array {
            return self.read_array_body(actual_type, settings.skip_member_data);
        }

        if flags.is_enum {
            return self.read_enum_body(actual_type, settings.skip_member_data);
        }

        self.read_fields_body(actual_type, settings.skip_member_data)
    }

    /// Reads the custom-serializable dynamic bag framing: `varuint member_count` then
    /// `(string name, object value)` pairs, each value read at the universal top type.
    fn read_custom_body(&mut self) -> Result<ObjectKind> {
        let settings = self.settings()?;
        let string_type = TypeData::from_runtime_type(&RuntimeType::string());
        let top = TypeData::from_runtime_type(&RuntimeType::top());
        let count = self.inner.read_varuint()? as usize;
        let mut fields = Vec::with_capacity(if settings.skip_member_data { 0 } else { count });
        for _ in 0..count {
            let name = match self.read_value(&string_type)? {
                Value::String(s) => s.to_string(),
                _ => String::new(),
            };
            let v = self.read_value(&top)?;
            if !settings.skip_member_data {
                fields.push((name, v));
            }
        }
        Ok(if settings.skip_member_data {
            ObjectKind::Pending
        } else {
            ObjectKind::Custom(fields)
        })
    }

    fn element_type_or_top(&self, slot: &RefCell<Option<Rc<TypeData>>>) -> Rc<TypeData> {
        slot.borrow()
            .clone()
            .unwrap_or_else(|| TypeData::from_runtime_type(&RuntimeType::top()))
    }

    fn read_list_body(&mut self, actual_type: &Rc<TypeData>, skip: bool) -> Result<ObjectKind> {
        let is_readonly = self.inner.read_bool()?;
        if is_readonly {
            return Ok(if skip {
                ObjectKind::Pending
            } else {
                ObjectKind::List { is_readonly: true, items: Vec::new() }
            });
        }
        let element_type = self.element_type_or_top(&actual_type.collection_key);
        let count = self.inner.read_varuint()? as usize;
        let mut items = Vec::with_capacity(if skip { 0 } else { count });
        for _ in 0..count {
            let v = self.read_value(&element_type)?;
            if !skip {
                items.push(v);
            }
        }
        Ok(if skip {
            ObjectKind::Pending
        } else {
            ObjectKind::List { is_readonly: false, items }
        })
    }

    fn read_dict_body(&mut self, actual_type: &Rc<TypeData>, skip: bool) -> Result<ObjectKind> {
        let is_readonly = self.inner.read_bool()?;
        if is_readonly {
            return Ok(if skip {
                ObjectKind::Pending
            } else {
                ObjectKind::Dict { is_readonly: true, items: Vec::new() }
            });
        }
        let key_type = self.element_type_or_top(&actual_type.collection_key);
        let value_type = self.element_type_or_top(&actual_type.collection_value);
        let count = self.inner.read_varuint()? as usize;
        let mut items = Vec::with_capacity(if skip { 0 } else { count });
        for _ in 0..count {
            let k = self.read_value(&key_type)?;
            let v = self.read_value(&value_type)?;
            if !skip {
                items.push((k, v));
            }
        }
        Ok(if skip {
            ObjectKind::Pending
        } else {
            ObjectKind::Dict { is_readonly: false, items }
        })
    }

    fn read_array_body(&mut self, actual_type: &Rc<TypeData>, skip: bool) -> Result<ObjectKind> {
        let element_type = self.element_type_or_top(&actual_type.element);
        let rank = self.inner.read_varuint()? as usize;
        let declared_rank = actual_type.array_rank.get() as usize;
        if declared_rank != 0 && declared_rank != rank {
            return Err(Error::ArrayRankMismatch {
                declared: declared_rank as u32,
                actual: rank as u32,
            });
        }
        let mut lengths = Vec::with_capacity(rank);
        for _ in 0..rank {
            lengths.push(self.inner.read_varuint()? as usize);
        }
        let total: usize = lengths.iter().product();
        let mut elements = Vec::with_capacity(if skip { 0 } else { total });
        for _ in 0..total {
            let v = self.read_value(&element_type)?;
            if !skip {
                elements.push(v);
            }
        }
        Ok(if skip {
            ObjectKind::Pending
        } else {
            ObjectKind::Array { lengths, elements }
        })
    }

    /// An enum recurses as its underlying integral type rather than being described member-wise.
    fn read_enum_body(&mut self, actual_type: &Rc<TypeData>, skip: bool) -> Result<ObjectKind> {
        let underlying = self.element_type_or_top(&actual_type.element);
        let v = self.read_value(&underlying)?;
        Ok(if skip { ObjectKind::Pending } else { ObjectKind::Enum(Box::new(v)) })
    }

    fn read_fields_body(&mut self, actual_type: &Rc<TypeData>, skip: bool) -> Result<ObjectKind> {
        let members = actual_type.members.borrow().clone();
        let local = reflect::lookup(&actual_type.full_name.borrow(), &actual_type.assembly.borrow());
        let local_members = local.as_ref().map(|r| r.runtime_type.members.clone());
        let mut fields = Vec::with_capacity(if skip { 0 } else { members.len() });
        for (i, m) in members.iter().enumerate() {
            let v = self.read_value(&m.declared_type)?;
            if skip {
                continue;
            }
            let wire_chain_len = members.iter().filter(|o| o.name == m.name).count();
            let wire_position = members[..i].iter().filter(|o| o.name == m.name).count();
            let key = resolve_member_key(&m.name, wire_chain_len, wire_position, local_members.as_deref());
            upsert_field(&mut fields, key, v);
        }
        if skip {
            return Ok(ObjectKind::Pending);
        }
        if local.is_none() {
            warn!(
                type_name = %actual_type.full_name.borrow(),
                "no local type registered for wire type; keeping it as member-wise data"
            );
        }
        Ok(ObjectKind::Fields(fields))
    }

    /// Runs every registered `on_deserialized` callback, in ascending id order, over the objects
    /// read during the last `read_root`/`read_root_value` call. Mutates each object's backing
    /// `RefCell` in place so every outstanding reference to it observes the update.
    fn run_post_construction_callbacks(&mut self) {
        let ids = std::mem::take(&mut self.completed_object_ids);
        for id in ids {
            let Some(Value::Object(obj_ref)) = self.ctx.try_get_object(id) else {
                continue;
            };
            let (name, assembly) = {
                let obj = obj_ref.borrow();
                (
                    obj.type_data.full_name.borrow().clone(),
                    obj.type_data.assembly.borrow().clone(),
                )
            };
            let Some(registered) = reflect::lookup(&name, &assembly) else {
                continue;
            };
            let Some(callback) = registered.on_deserialized else {
                continue;
            };
            let mut scratch = Value::Object(obj_ref.clone());
            callback(&mut scratch);
            if let Value::Object(updated_ref) = scratch {
                if !Rc::ptr_eq(&updated_ref, &obj_ref) {
                    let updated = updated_ref.borrow().clone();
                    *obj_ref.borrow_mut() = updated;
                }
            }
        }
    }
}

/// Same-named members across a class hierarchy (a derived class shadowing a base field) can't be
/// told apart by name alone. Ties a wire member's vertical position in its own same-named chain to
/// the local type's same-named chain, so a shadowed value lands under the local slot it actually
/// belongs to rather than colliding with its shadow. Returns the plain name when no disambiguation
/// is needed (the overwhelming majority of members).
fn resolve_member_key(
    name: &str,
    wire_chain_len: usize,
    wire_position: usize,
    local_members: Option<&[reflect::Member]>,
) -> String {
    if wire_chain_len <= 1 {
        return name.to_string();
    }
    let local_chain_len =
        local_members.map(|ms| ms.iter().filter(|m| m.name == name).count()).unwrap_or(wire_chain_len);
    if local_chain_len <= 1 {
        return name.to_string();
    }
    let offset = (local_chain_len as i64 - wire_chain_len as i64 + wire_position as i64)
        .clamp(0, local_chain_len as i64 - 1);
    format!("{name}#{offset}")
}

/// Inserts `(key, value)`, overwriting a prior entry under the same key instead of appending a
/// duplicate: when several wire positions collapse onto one local slot (see `resolve_member_key`),
/// the most-derived value read last should win.
fn upsert_field(fields: &mut Vec<(String, Value)>, key: String, value: Value) {
    if let Some(entry) = fields.iter_mut().find(|(k, _)| *k == key) {
        entry.1 = value;
    } else {
        fields.push((key, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    #[test]
    fn roundtrips_a_list_of_strings() {
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf);
            let top = TypeData::from_runtime_type(&RuntimeType::top());
            let list = Value::list(
                RuntimeType::string(),
                vec![Value::string("a"), Value::string("b")],
            );
            w.write_value(&top, &list).unwrap();
        }
        let mut r = Reader::new(buf.as_slice());
        let v = r.read_root_value().unwrap();
        match v {
            Value::Object(obj) => match &obj.borrow().kind {
                ObjectKind::List { items, .. } => {
                    assert_eq!(items.len(), 2);
                    assert!(matches!(&items[0], Value::String(s) if &**s == "a"));
                }
                other => panic!("expected a list, got {other:?}"),
            },
            other => panic!("expected an object, got {other:?}"),
        }
    }

    #[test]
    fn shared_reference_resolves_to_the_same_allocation_on_read() {
        let mut buf = Vec::new();
        {
            let mut w = Writer::new(&mut buf);
            let top = TypeData::from_runtime_type(&RuntimeType::top());
            let s = Value::string("shared");
            let list = Value::list(RuntimeType::string(), vec![s.clone(), s]);
            w.write_value(&top, &list).unwrap();
        }
        let mut r = Reader::new(buf.as_slice());
        let v = r.read_root_value().unwrap();
        if let Value::Object(obj) = v {
            if let ObjectKind::List { items, .. } = &obj.borrow().kind {
                assert_eq!(items[0].identity_key(), items[1].identity_key());
                return;
            }
        }
        panic!("expected a list of two identical string references");
    }
}
