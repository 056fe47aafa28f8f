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

//! The on-wire type descriptor: a reduced, serializable shadow of a [`RuntimeType`] that is
//! itself a reference-tracked object in the stream.

use crate::context::Context;
use crate::error::Result;
use crate::kind::{CollectionShape, PrimitiveKind};
use crate::primitive::{PrimitiveReader, PrimitiveWriter};
use crate::reflect::RuntimeType;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::rc::Rc;
use std::sync::Arc;

/// Bit positions within the flag word.
mod bits {
    pub const IS_INTERFACE: u64 = 1 << 1;
    pub const IS_CUSTOM_SERIALIZABLE: u64 = 1 << 2;
    pub const IS_REFERENCE: u64 = 1 << 3;
    pub const IS_SEALED: u64 = 1 << 4;
    pub const IS_ARRAY: u64 = 1 << 5;
    pub const IS_NULLABLE: u64 = 1 << 6;
    pub const IS_ENUM: u64 = 1 << 7;
    pub const IS_GENERIC: u64 = 1 << 8;
    pub const IS_GENERIC_PARAMETER: u64 = 1 << 9;
    pub const IS_GENERIC_DEFINITION: u64 = 1 << 10;
    pub const HAS_CONVERTER: u64 = 1 << 11;
    pub const KIND_SHIFT: u32 = 12;
    pub const KIND_MASK: u64 = 0b1_1111 << KIND_SHIFT;
    pub const SHAPE_SHIFT: u32 = 17;
    pub const SHAPE_MASK: u64 = 0b111 << SHAPE_SHIFT;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeDataFlags {
    pub is_interface: bool,
    pub is_custom_serializable: bool,
    pub is_reference: bool,
    pub is_sealed: bool,
    pub is_array: bool,
    pub is_nullable: bool,
    pub is_enum: bool,
    pub is_generic: bool,
    pub is_generic_parameter: bool,
    pub is_generic_definition: bool,
    pub has_converter: bool,
}

#[derive(Debug, Clone)]
pub struct TypeMember {
    pub name: String,
    pub declared_type: Rc<TypeData>,
    /// This member's position, counting from the hierarchy's base-most class, among classes on
    /// the wire that declare a member of this same name. See `reader.rs::read_fields_body`.
    pub declaring_depth: u32,
}

/// The on-wire schema record. Scalar fields are `Cell`/`RefCell`-wrapped so a reader can
/// register a placeholder node at its id *before* its body is known, then fill it in in place,
/// the same register-before-body discipline `ObjectValue` uses, needed here because a type can
/// refer to itself (a linked-list node whose own member is typed as the node).
#[derive(Debug)]
pub struct TypeData {
    pub flags: Cell<TypeDataFlags>,
    pub kind: Cell<PrimitiveKind>,
    pub collection_shape: Cell<CollectionShape>,
    /// An array's element type, or (when `flags.is_enum`) the enum's underlying integral type.
    pub element: RefCell<Option<Rc<TypeData>>>,
    pub surrogate: RefCell<Option<Rc<TypeData>>>,
    pub generic_params: RefCell<Vec<Rc<TypeData>>>,
    pub full_name: RefCell<String>,
    pub assembly: RefCell<String>,
    pub generic_parameter_index: Cell<u32>,
    pub base_type: RefCell<Option<Rc<TypeData>>>,
    pub array_rank: Cell<u32>,
    pub members: RefCell<Vec<TypeMember>>,
    pub collection_key: RefCell<Option<Rc<TypeData>>>,
    pub collection_value: RefCell<Option<Rc<TypeData>>>,
}

impl TypeData {
    /// `kind == None` with no flag bits set: the wire's "unsupported type" marker (flag word 0).
    pub fn unsupported() -> Rc<TypeData> {
        Rc::new(TypeData {
            flags: Cell::new(TypeDataFlags::default()),
            kind: Cell::new(PrimitiveKind::None),
            collection_shape: Cell::new(CollectionShape::None),
            element: RefCell::new(None),
            surrogate: RefCell::new(None),
            generic_params: RefCell::new(Vec::new()),
            full_name: RefCell::new(String::new()),
            assembly: RefCell::new(String::new()),
            generic_parameter_index: Cell::new(0),
            base_type: RefCell::new(None),
            array_rank: Cell::new(0),
            members: RefCell::new(Vec::new()),
            collection_key: RefCell::new(None),
            collection_value: RefCell::new(None),
        })
    }

    fn is_constructed_generic(&self) -> bool {
        let flags = self.flags.get();
        flags.is_generic && !flags.is_generic_definition
    }

    fn describes_members(&self) -> bool {
        let flags = self.flags.get();
        self.surrogate.borrow().is_none()
            && !flags.is_interface
            && !flags.is_array
            && !flags.is_enum
            && !flags.is_generic_parameter
    }

    /// True for the sentinel produced by [`TypeData::unsupported`]: a `None`-kind, flagless,
    /// nameless descriptor standing in for a type the producer could not describe at all.
    /// Distinguished from an ordinary `None`-kind placeholder by having no name: every real
    /// `RuntimeType` carries at least a `full_name`.
    fn is_unsupported_sentinel(&self) -> bool {
        let flags = self.flags.get();
        self.kind.get() == PrimitiveKind::None
            && !flags.is_reference
            && self.full_name.borrow().is_empty()
            && self.assembly.borrow().is_empty()
    }

    fn flag_word(&self) -> u64 {
        if self.is_unsupported_sentinel() {
            return 0;
        }
        let flags = self.flags.get();
        let mut word = 1u64; // bit 0 always set for a "real" TypeData; word 0 means unsupported.
        if flags.is_interface {
            word |= bits::IS_INTERFACE;
        }
        if flags.is_custom_serializable {
            word |= bits::IS_CUSTOM_SERIALIZABLE;
        }
        if flags.is_reference {
            word |= bits::IS_REFERENCE;
        }
        if flags.is_sealed {
            word |= bits::IS_SEALED;
        }
        if flags.is_array {
            word |= bits::IS_ARRAY;
        }
        if flags.is_nullable {
            word |= bits::IS_NULLABLE;
        }
        if flags.is_enum {
            word |= bits::IS_ENUM;
        }
        if flags.is_generic {
            word |= bits::IS_GENERIC;
        }
        if flags.is_generic_parameter {
            word |= bits::IS_GENERIC_PARAMETER;
        }
        if flags.is_generic_definition {
            word |= bits::IS_GENERIC_DEFINITION;
        }
        if flags.has_converter {
            word |= bits::HAS_CONVERTER;
        }
        word |= (self.kind.get() as u64) << bits::KIND_SHIFT & bits::KIND_MASK;
        word |= (self.collection_shape.get() as u64) << bits::SHAPE_SHIFT & bits::SHAPE_MASK;
        word
    }

    fn from_flag_word(word: u64) -> Result<(TypeDataFlags, PrimitiveKind, CollectionShape)> {
        if word == 0 {
            return Ok((TypeDataFlags::default(), PrimitiveKind::None, CollectionShape::None));
        }
        let flags = TypeDataFlags {
            is_interface: word & bits::IS_INTERFACE != 0,
            is_custom_serializable: word & bits::IS_CUSTOM_SERIALIZABLE != 0,
            is_reference: word & bits::IS_REFERENCE != 0,
            is_sealed: word & bits::IS_SEALED != 0,
            is_array: word & bits::IS_ARRAY != 0,
            is_nullable: word & bits::IS_NULLABLE != 0,
            is_enum: word & bits::IS_ENUM != 0,
            is_generic: word & bits::IS_GENERIC != 0,
            is_generic_parameter: word & bits::IS_GENERIC_PARAMETER != 0,
            is_generic_definition: word & bits::IS_GENERIC_DEFINITION != 0,
            has_converter: word & bits::HAS_CONVERTER != 0,
        };
        let kind_bits = ((word & bits::KIND_MASK) >> bits::KIND_SHIFT) as u8;
        let shape_bits = ((word & bits::SHAPE_MASK) >> bits::SHAPE_SHIFT) as u8;
        let kind = PrimitiveKind::try_from(kind_bits)?;
        let shape = CollectionShape::try_from(shape_bits)?;
        Ok((flags, kind, shape))
    }

    /// Converts a `RuntimeType` into its on-wire shadow, reusing one `Rc<TypeData>` per
    /// distinct `RuntimeType` allocation. The cache persists for the lifetime of the calling
    /// thread (not just this call): `RuntimeType`'s well-known constructors (`RuntimeType::top`,
    /// `RuntimeType::string`, ...) are themselves interned to a stable `Arc` per `reflect.rs`, so
    /// a persistent cache here is what makes every call site that asks for "the TypeData of
    /// string" — `Context`'s well-known preamble, a member's declared type, a list's element type
    /// — converge on one `Rc<TypeData>` allocation. That convergence is load-bearing: the id
    /// registry keys on pointer identity (`value.rs::identity_key`), so without it a well-known
    /// type's body would be re-emitted every time it is referenced instead of resolving to its
    /// preamble id. A call-scoped cache would still correctly break cycles/sharing *within* one
    /// conversion; it just wouldn't converge *across* calls, which well-known alignment requires.
    pub fn from_runtime_type(rt: &Arc<RuntimeType>) -> Rc<TypeData> {
        thread_local! {
            static CACHE: RefCell<HashMap<usize, Rc<TypeData>>> = RefCell::new(HashMap::new());
        }
        CACHE.with(|cache| convert(rt, &mut cache.borrow_mut()))
    }

    /// Writes this node's reference framing (id, and if fresh, flags + body) through `ctx`.
    pub fn write_ref<W: Write>(
        slot: &Option<Rc<TypeData>>,
        w: &mut W,
        ctx: &mut Context,
    ) -> Result<()> {
        let Some(td) = slot else {
            w.write_varuint(0)?;
            return Ok(());
        };
        let value = Value::Type(td.clone());
        if let Some(id) = ctx.try_get_id(&value) {
            w.write_varuint(id)?;
            return Ok(());
        }
        let id = ctx.new_id();
        w.write_varuint(id)?;
        ctx.register(id, value)?;
        td.write_body(w, ctx)
    }

    fn write_body<W: Write>(&self, w: &mut W, ctx: &mut Context) -> Result<()> {
        let word = self.flag_word();
        w.write_varuint(word)?;
        if word == 0 {
            return Ok(());
        }
        if matches!(self.kind.get(), PrimitiveKind::None | PrimitiveKind::Object) {
            TypeData::write_ref(&self.element.borrow(), w, ctx)?;
            TypeData::write_ref(&self.surrogate.borrow(), w, ctx)?;
            let params = self.generic_params.borrow();
            w.write_varuint(params.len() as u64)?;
            for p in params.iter() {
                TypeData::write_ref(&Some(p.clone()), w, ctx)?;
            }
        }
        if !self.is_constructed_generic() {
            w.write_string_prim(&self.full_name.borrow())?;
            w.write_string_prim(&self.assembly.borrow())?;
            w.write_varuint(self.generic_parameter_index.get() as u64)?;
            TypeData::write_ref(&self.base_type.borrow(), w, ctx)?;
            w.write_varuint(self.array_rank.get() as u64)?;
        }
        if self.describes_members() && !self.is_constructed_generic() {
            let members = self.members.borrow();
            w.write_varuint(members.len() as u64)?;
            for m in members.iter() {
                w.write_string_prim(&m.name)?;
                TypeData::write_ref(&Some(m.declared_type.clone()), w, ctx)?;
                w.write_varuint(m.declaring_depth as u64)?;
            }
            TypeData::write_ref(&self.collection_key.borrow(), w, ctx)?;
            TypeData::write_ref(&self.collection_value.borrow(), w, ctx)?;
        }
        Ok(())
    }

    /// Reads a reference-framed `TypeData`, resolving shared/self ids through `ctx` exactly the
    /// way any other reference object is resolved.
    pub fn read_ref<R: Read>(r: &mut R, ctx: &mut Context) -> Result<Option<Rc<TypeData>>> {
        let id = r.read_varuint()?;
        if id == 0 {
            return Ok(None);
        }
        if let Some(Value::Type(existing)) = ctx.try_get_object(id) {
            return Ok(Some(existing));
        }
        let placeholder = TypeData::unsupported();
        ctx.register(id, Value::Type(placeholder.clone()))?;
        Self::read_body_into(&placeholder, r, ctx)?;
        Ok(Some(placeholder))
    }

    fn read_body_into<R: Read>(slot: &Rc<TypeData>, r: &mut R, ctx: &mut Context) -> Result<()> {
        let word = r.read_varuint()?;
        let (flags, kind, shape) = TypeData::from_flag_word(word)?;
        slot.flags.set(flags);
        slot.kind.set(kind);
        slot.collection_shape.set(shape);

        if word == 0 {
            // The producer could not describe this type at all; nothing further was written.
            return Ok(());
        }

        if matches!(kind, PrimitiveKind::None | PrimitiveKind::Object) {
            *slot.element.borrow_mut() = TypeData::read_ref(r, ctx)?;
            *slot.surrogate.borrow_mut() = TypeData::read_ref(r, ctx)?;
            let count = r.read_varuint()?;
            let mut params = Vec::with_capacity(count as usize);
            for _ in 0..count {
                if let Some(p) = TypeData::read_ref(r, ctx)? {
                    params.push(p);
                }
            }
            *slot.generic_params.borrow_mut() = params;
        }

        let is_constructed_generic = flags.is_generic && !flags.is_generic_definition;
        if !is_constructed_generic {
            *slot.full_name.borrow_mut() = r.read_string_prim()?;
            *slot.assembly.borrow_mut() = r.read_string_prim()?;
            slot.generic_parameter_index.set(r.read_varuint()? as u32);
            *slot.base_type.borrow_mut() = TypeData::read_ref(r, ctx)?;
            slot.array_rank.set(r.read_varuint()? as u32);
        } else if let Some(element) = slot.element.borrow().clone() {
            substitute_from_definition(slot, &element);
        }

        let describes_members = slot.surrogate.borrow().is_none()
            && !flags.is_interface
            && !flags.is_array
            && !flags.is_enum
            && !flags.is_generic_parameter;
        if describes_members && !is_constructed_generic {
            let count = r.read_varuint()?;
            let mut members = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name = r.read_string_prim()?;
                let declared_type = TypeData::read_ref(r, ctx)?.unwrap_or_else(TypeData::unsupported);
                let declaring_depth = r.read_varuint()? as u32;
                members.push(TypeMember { name, declared_type, declaring_depth });
            }
            *slot.members.borrow_mut() = members;
            *slot.collection_key.borrow_mut() = TypeData::read_ref(r, ctx)?;
            *slot.collection_value.borrow_mut() = TypeData::read_ref(r, ctx)?;
        }
        Ok(())
    }
}

/// Substitutes a constructed generic's argument list into its generic definition's schema: only
/// the definition carries the full member/base/collection schema, and a constructed instance
/// recomputes it by substitution.
fn substitute_from_definition(target: &Rc<TypeData>, definition: &Rc<TypeData>) {
    let args = target.generic_params.borrow().clone();
    let mut mapping: HashMap<u32, Rc<TypeData>> = HashMap::new();
    for (idx, arg) in args.iter().enumerate() {
        mapping.insert(idx as u32, arg.clone());
    }
    let substitute = |slot: &Option<Rc<TypeData>>| -> Option<Rc<TypeData>> {
        slot.as_ref().map(|td| {
            if td.flags.get().is_generic_parameter {
                mapping
                    .get(&td.generic_parameter_index.get())
                    .cloned()
                    .unwrap_or_else(|| td.clone())
            } else {
                td.clone()
            }
        })
    };
    *target.base_type.borrow_mut() = substitute(&definition.base_type.borrow());
    *target.collection_key.borrow_mut() = substitute(&definition.collection_key.borrow());
    *target.collection_value.borrow_mut() = substitute(&definition.collection_value.borrow());
    let members = definition
        .members
        .borrow()
        .iter()
        .map(|m| TypeMember {
            name: m.name.clone(),
            declared_type: substitute(&Some(m.declared_type.clone())).unwrap(),
            declaring_depth: m.declaring_depth,
        })
        .collect();
    *target.members.borrow_mut() = members;
}

fn convert(rt: &Arc<RuntimeType>, cache: &mut HashMap<usize, Rc<TypeData>>) -> Rc<TypeData> {
    let key = Arc::as_ptr(rt) as usize;
    if let Some(existing) = cache.get(&key) {
        return existing.clone();
    }
    let placeholder = Rc::new(TypeData {
        flags: Cell::new(TypeDataFlags {
            is_interface: rt.is_interface,
            is_custom_serializable: rt.is_custom_serializable,
            is_reference: rt.is_reference,
            is_sealed: rt.is_sealed,
            is_array: rt.is_array,
            is_nullable: rt.is_nullable,
            is_enum: rt.is_enum,
            is_generic: rt.is_generic,
            is_generic_parameter: rt.is_generic_parameter,
            is_generic_definition: rt.is_generic_definition,
            has_converter: rt.has_converter,
        }),
        kind: Cell::new(rt.kind),
        collection_shape: Cell::new(rt.collection_shape),
        element: RefCell::new(None),
        surrogate: RefCell::new(None),
        generic_params: RefCell::new(Vec::new()),
        full_name: RefCell::new(rt.full_name.clone()),
        assembly: RefCell::new(rt.assembly.clone()),
        generic_parameter_index: Cell::new(rt.generic_parameter_index),
        base_type: RefCell::new(None),
        array_rank: Cell::new(rt.array_rank),
        members: RefCell::new(Vec::new()),
        collection_key: RefCell::new(None),
        collection_value: RefCell::new(None),
    });
    cache.insert(key, placeholder.clone());

    *placeholder.element.borrow_mut() = rt.element_type.as_ref().map(|t| convert(t, cache));
    *placeholder.surrogate.borrow_mut() = rt.surrogate.as_ref().map(|t| convert(t, cache));
    *placeholder.generic_params.borrow_mut() =
        rt.generic_params.iter().map(|t| convert(t, cache)).collect();
    *placeholder.base_type.borrow_mut() = rt.base_type.as_ref().map(|t| convert(t, cache));
    *placeholder.members.borrow_mut() = rt
        .members
        .iter()
        .map(|m| TypeMember {
            name: m.name.clone(),
            declared_type: convert(&m.declared_type, cache),
            declaring_depth: m.declaring_depth,
        })
        .collect();
    *placeholder.collection_key.borrow_mut() =
        rt.collection_elements.0.as_ref().map(|t| convert(t, cache));
    *placeholder.collection_value.borrow_mut() =
        rt.collection_elements.1.as_ref().map(|t| convert(t, cache));

    placeholder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use std::io::Cursor;

    #[test]
    fn flag_word_roundtrips() {
        let td = TypeData::from_runtime_type(&RuntimeType::i32());
        let word = td.flag_word();
        let (flags, kind, shape) = TypeData::from_flag_word(word).unwrap();
        assert_eq!(kind, PrimitiveKind::I32);
        assert_eq!(shape, CollectionShape::None);
        assert!(flags.is_sealed);
    }

    #[test]
    fn write_then_read_simple_type_data() {
        let td = TypeData::from_runtime_type(&RuntimeType::string());
        let mut buf = Vec::new();
        let mut wctx = Context::new();
        TypeData::write_ref(&Some(td.clone()), &mut buf, &mut wctx).unwrap();

        let mut rctx = Context::new();
        let mut cur = Cursor::new(buf);
        let read_back = TypeData::read_ref(&mut cur, &mut rctx).unwrap().unwrap();
        assert_eq!(*read_back.full_name.borrow(), "string");
        assert_eq!(read_back.kind.get(), PrimitiveKind::String);
    }

    #[test]
    fn shared_element_type_converts_to_one_allocation() {
        let elem = RuntimeType::i32();
        let list_rt = Arc::new(RuntimeType {
            collection_shape: CollectionShape::TypedCollection,
            collection_elements: (Some(elem.clone()), None),
            members: vec![
                crate::reflect::Member::new("a", elem.clone()),
                crate::reflect::Member::new("b", elem.clone()),
            ],
            ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
        });
        let td = TypeData::from_runtime_type(&list_rt);
        let members = td.members.borrow();
        assert!(Rc::ptr_eq(&members[0].declared_type, &members[1].declared_type));
    }
}
