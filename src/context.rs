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

//! The per-session reference registry: the id <-> object table a `Writer`/`Reader` share.
//!
//! Kept `Rc`-based and single-threaded by design: a plain `HashMap`-backed registry, keyed by
//! object identity instead of a wire class id.

use crate::error::{Error, Result};
use crate::reflect::RuntimeType;
use crate::type_data::TypeData;
use crate::value::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Well-known ids 1..=21 are pre-registered before a stream's first real reference gets one, so
/// both sides agree on the identity of the built-in scalar/top types without spending any bytes
/// on them. `seed()` is the first id a fresh write/read may assign.
const WELL_KNOWN_COUNT: u64 = 21;

pub struct Context {
    objects_by_id: HashMap<u64, Value>,
    ids_by_identity: HashMap<(u8, usize), u64>,
    next_id: u64,
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Context {
            objects_by_id: HashMap::new(),
            ids_by_identity: HashMap::new(),
            next_id: 1,
        };
        ctx.install_well_known_preamble();
        ctx
    }

    /// Ids 1-5 and 7-21 are `TypeData`; id 6 is the bare empty string value. Slot 4 is the legacy
    /// "RuntimeType-descriptor" slot, kept for wire compatibility rather than renumbered (see
    /// `DESIGN.md`).
    fn install_well_known_preamble(&mut self) {
        let type_slots: [(u64, Rc<TypeData>); 20] = [
            (1, TypeData::from_runtime_type(&RuntimeType::top())),
            (2, TypeData::from_runtime_type(&RuntimeType::string())),
            (3, TypeData::from_runtime_type(&RuntimeType::type_of_type())),
            (4, TypeData::from_runtime_type(&RuntimeType::legacy_runtime_type_descriptor())),
            (5, TypeData::from_runtime_type(&RuntimeType::nullable_marker())),
            (7, TypeData::from_runtime_type(&RuntimeType::bytes())),
            (8, TypeData::from_runtime_type(&RuntimeType::guid())),
            (9, TypeData::from_runtime_type(&RuntimeType::boolean())),
            (10, TypeData::from_runtime_type(&RuntimeType::char_())),
            (11, TypeData::from_runtime_type(&RuntimeType::u8())),
            (12, TypeData::from_runtime_type(&RuntimeType::i8())),
            (13, TypeData::from_runtime_type(&RuntimeType::i16())),
            (14, TypeData::from_runtime_type(&RuntimeType::u16())),
            (15, TypeData::from_runtime_type(&RuntimeType::i32())),
            (16, TypeData::from_runtime_type(&RuntimeType::u32())),
            (17, TypeData::from_runtime_type(&RuntimeType::i64())),
            (18, TypeData::from_runtime_type(&RuntimeType::u64())),
            (19, TypeData::from_runtime_type(&RuntimeType::f32())),
            (20, TypeData::from_runtime_type(&RuntimeType::f64())),
            (21, TypeData::from_runtime_type(&RuntimeType::decimal())),
        ];
        for (id, td) in type_slots {
            let value = Value::Type(td);
            self.ids_by_identity
                .insert(value.identity_key().expect("Type values always have identity"), id);
            self.objects_by_id.insert(id, value);
        }
        let empty_string = Value::string("");
        self.ids_by_identity.insert(
            empty_string.identity_key().expect("String values always have identity"),
            6,
        );
        self.objects_by_id.insert(6, empty_string);
        self.next_id = WELL_KNOWN_COUNT + 1;
    }

    /// The first id a fresh stream may hand out to a non-well-known reference.
    pub fn seed(&self) -> u64 {
        WELL_KNOWN_COUNT + 1
    }

    /// Looks up the id already assigned to `value`'s backing allocation, if any.
    pub fn try_get_id(&self, value: &Value) -> Option<u64> {
        let key = value.identity_key()?;
        self.ids_by_identity.get(&key).copied()
    }

    /// Looks up the object previously registered at `id`.
    pub fn try_get_object(&self, id: u64) -> Option<Value> {
        self.objects_by_id.get(&id).cloned()
    }

    /// Allocates a fresh id without registering anything at it yet.
    pub fn new_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Binds `id` to `value`'s identity. Must be called before the object's body is written or
    /// read, so a cycle back to this object resolves instead of recursing forever.
    pub fn register(&mut self, id: u64, value: Value) -> Result<()> {
        if id == 0 {
            return Err(Error::IdReuse(0));
        }
        if self.objects_by_id.contains_key(&id) {
            return Err(Error::IdReuse(id));
        }
        if let Some(key) = value.identity_key() {
            self.ids_by_identity.insert(key, id);
        }
        self.objects_by_id.insert(id, value);
        Ok(())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectValue;
    use crate::value::ObjectKind;
    use std::cell::RefCell;

    #[test]
    fn well_known_ids_start_at_one_and_seed_follows_them() {
        let ctx = Context::new();
        assert_eq!(ctx.seed(), WELL_KNOWN_COUNT + 1);
        let string_type = Value::Type(TypeData::from_runtime_type(&RuntimeType::string()));
        assert_eq!(ctx.try_get_id(&string_type), Some(2));
        let empty_string = Value::string("");
        assert_eq!(ctx.try_get_id(&empty_string), Some(6));
    }

    #[test]
    fn registering_same_id_twice_is_rejected() {
        let mut ctx = Context::new();
        let obj = Value::Object(Rc::new(RefCell::new(ObjectValue {
            type_data: TypeData::unsupported(),
            kind: ObjectKind::Pending,
        })));
        let id = ctx.new_id();
        ctx.register(id, obj.clone()).unwrap();
        assert!(matches!(ctx.register(id, obj), Err(Error::IdReuse(_))));
    }

    #[test]
    fn object_seen_twice_resolves_to_the_same_id() {
        let mut ctx = Context::new();
        let obj = Value::Object(Rc::new(RefCell::new(ObjectValue {
            type_data: TypeData::unsupported(),
            kind: ObjectKind::Pending,
        })));
        let id = ctx.new_id();
        ctx.register(id, obj.clone()).unwrap();
        assert_eq!(ctx.try_get_id(&obj), Some(id));
    }
}
