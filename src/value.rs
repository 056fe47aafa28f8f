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

//! The engine's internal, always-dynamic object graph representation.
//!
//! Every value the Writer/Reader touch is a [`Value`]; reference kinds (`String`, `Bytes`,
//! `Type`, `Object`) wrap their payload in an `Rc` so identity comparisons (`Rc::ptr_eq`) give
//! the Context exactly the "same object twice" signal its reference registry needs. This doubles
//! as `ObjectData`: an unresolved wire type simply stops here instead of being converted further
//! by a [`Reflected`](crate::reflect::Reflected) impl.

use crate::error::{Error, Result};
use crate::reflect::RuntimeType;
use crate::type_data::TypeData;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

pub type ObjRef = Rc<RefCell<ObjectValue>>;

thread_local! {
    static EMPTY_STRING: Rc<str> = Rc::from("");
}

fn empty_string_singleton() -> Rc<str> {
    EMPTY_STRING.with(|s| s.clone())
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal([u8; 16]),
    Guid(Uuid),
    String(Rc<str>),
    Bytes(Rc<[u8]>),
    Type(Rc<TypeData>),
    Object(ObjRef),
}

/// The payload of an `Object`-kind `Value`: a reference-tracked carrier for class instances,
/// arrays, lists, dictionaries, and the custom-serializable/surrogate/converter side channels.
/// Also referred to as `ObjectData`: the unresolved-type carrier a wire value decodes into when
/// no local Rust type claims it.
#[derive(Debug, Clone)]
pub struct ObjectValue {
    pub type_data: Rc<TypeData>,
    pub kind: ObjectKind,
}

#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// Registered at its id but not yet filled in: the cycle placeholder that lets a reference
    /// back to this object resolve before its own body has finished decoding.
    Pending,
    Fields(Vec<(String, Value)>),
    /// `is_readonly` mirrors the wire's collection-tail flag: a `true` collection stops right
    /// after it, carrying no elements at all, not even a count.
    List {
        is_readonly: bool,
        items: Vec<Value>,
    },
    /// Stored as an insertion-ordered pair list rather than a `HashMap`, so the engine itself
    /// never has to hash or compare keys. A caller reconstructing a real `HashMap` keyed by a
    /// reference-identity-sensitive type should be aware two keys equal-but-not-identical on the
    /// writing side may diverge once rehashed locally (see `DESIGN.md`'s Open Question note).
    Dict {
        is_readonly: bool,
        items: Vec<(Value, Value)>,
    },
    Array {
        lengths: Vec<usize>,
        elements: Vec<Value>,
    },
    /// Dynamic named-value bag, written on the wire with explicit names (unlike `Fields`, whose
    /// names live only in the accompanying `TypeData` schema).
    Custom(Vec<(String, Value)>),
    Surrogate(Box<Value>),
    /// An enum's underlying integral value (the scalar `Value` matching the type's `element`
    /// TypeData). Written/read in place of member fields: an enum recurses as its underlying
    /// integral type rather than being described member-wise.
    Enum(Box<Value>),
    /// A converter's string form, plus the plain member values the type would otherwise be
    /// written with. The fallback is only ever used when `SerializationSettings::ignore_converter`
    /// forces the writer off the converter path for a type that also happens to have a
    /// `Reflected` shape.
    Converter {
        repr: String,
        fallback: Vec<(String, Value)>,
    },
}

impl Value {
    pub fn fields(runtime_type: Arc<RuntimeType>, fields: Vec<(String, Value)>) -> Value {
        Value::Object(Rc::new(RefCell::new(ObjectValue {
            type_data: TypeData::from_runtime_type(&runtime_type),
            kind: ObjectKind::Fields(fields),
        })))
    }

    pub fn list(element_type: Arc<RuntimeType>, items: Vec<Value>) -> Value {
        let rt = Arc::new(RuntimeType {
            collection_shape: crate::kind::CollectionShape::TypedCollection,
            collection_elements: (Some(element_type), None),
            ..RuntimeType::unsupported_with_kind(crate::kind::PrimitiveKind::Object)
        });
        Value::Object(Rc::new(RefCell::new(ObjectValue {
            type_data: TypeData::from_runtime_type(&rt),
            kind: ObjectKind::List { is_readonly: false, items },
        })))
    }

    pub fn dict(key_type: Arc<RuntimeType>, value_type: Arc<RuntimeType>, items: Vec<(Value, Value)>) -> Value {
        let rt = Arc::new(RuntimeType {
            collection_shape: crate::kind::CollectionShape::TypedDict,
            collection_elements: (Some(key_type), Some(value_type)),
            ..RuntimeType::unsupported_with_kind(crate::kind::PrimitiveKind::Object)
        });
        Value::Object(Rc::new(RefCell::new(ObjectValue {
            type_data: TypeData::from_runtime_type(&rt),
            kind: ObjectKind::Dict { is_readonly: false, items },
        })))
    }

    /// The empty string is part of the well-known preamble (`Context` registers it at id 6), so
    /// every call must hand back the exact same `Rc<str>` allocation — identity here is
    /// pointer-based (`identity_key`), and two independently-allocated empty strings would
    /// otherwise never compare equal to the preamble's copy, forcing a full body write instead of
    /// resolving to the well-known id.
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        let rc: Rc<str> = s.into();
        if rc.is_empty() {
            return Value::String(empty_string_singleton());
        }
        Value::String(rc)
    }

    pub fn bytes(b: impl Into<Rc<[u8]>>) -> Value {
        Value::Bytes(b.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Extracts the member list from a `Fields`-shaped object, for use from a
    /// [`Reflected::from_value`](crate::reflect::Reflected::from_value) implementation.
    pub fn into_fields(self) -> Result<Fields> {
        match self {
            Value::Object(obj_ref) => {
                let obj = obj_ref.borrow();
                match &obj.kind {
                    ObjectKind::Fields(fields) | ObjectKind::Custom(fields) => {
                        Ok(Fields(fields.clone()))
                    }
                    ObjectKind::Converter { fallback, .. } => Ok(Fields(fallback.clone())),
                    other => Err(Error::Custom(format!(
                        "expected a member-wise object, found {other:?}"
                    ))),
                }
            }
            other => Err(Error::Custom(format!("expected an object, found {other:?}"))),
        }
    }

    /// Pointer identity used by the `Context` id registry. Two `Value`s that are
    /// `Value::Object`/`Value::String`/`Value::Bytes`/`Value::Type` and share the same backing
    /// allocation return the same key; value-kind scalars have no identity and return `None`.
    pub fn identity_key(&self) -> Option<(u8, usize)> {
        match self {
            Value::Object(r) => Some((0, Rc::as_ptr(r) as usize)),
            Value::String(r) => Some((1, Rc::as_ptr(r) as *const () as usize)),
            Value::Bytes(r) => Some((2, Rc::as_ptr(r) as *const () as usize)),
            Value::Type(r) => Some((3, Rc::as_ptr(r) as usize)),
            _ => None,
        }
    }
}

/// A read-only view over an object's member-value pairs, with typed accessors that tolerate a
/// missing member (additive version tolerance: the field just takes its default).
#[derive(Debug, Clone)]
pub struct Fields(pub Vec<(String, Value)>);

impl Fields {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Looks up a member at a given position in its hierarchy's same-named chain, for a type
    /// whose members shadow a base class's field of the same name (see
    /// `reader.rs::resolve_member_key`). Falls back to the plain name when the type has no such
    /// shadow, so callers can use this unconditionally without checking first.
    pub fn get_shadowed(&self, name: &str, offset: u32) -> Option<&Value> {
        self.get(&format!("{name}#{offset}")).or_else(|| self.get(name))
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        let idx = self.0.iter().position(|(n, _)| n == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(Value::I32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::I64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        match self.get(name) {
            Some(Value::U32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(Value::F64(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(Value::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name) {
            Some(Value::String(s)) => Some(s.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_identity_is_pointer_based_not_structural() {
        let a = Value::fields(RuntimeType::unsupported(), vec![("x".into(), Value::I32(1))]);
        let b = Value::fields(RuntimeType::unsupported(), vec![("x".into(), Value::I32(1))]);
        assert_ne!(a.identity_key(), b.identity_key());

        let c = a.clone();
        assert_eq!(a.identity_key(), c.identity_key());
    }

    #[test]
    fn scalars_have_no_identity() {
        assert_eq!(Value::I32(42).identity_key(), None);
        assert_eq!(Value::Bool(true).identity_key(), None);
    }

    #[test]
    fn fields_accessor_tolerates_missing_member() {
        let fields = Fields(vec![("x".into(), Value::I32(7))]);
        assert_eq!(fields.get_i32("x"), Some(7));
        assert_eq!(fields.get_i32("y"), None);
    }
}
