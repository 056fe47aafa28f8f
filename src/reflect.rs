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

//! Local, in-process type reflection.
//!
//! Rust has no ambient runtime reflection, so the "runtime-type introspection facility" the
//! spec treats as an external collaborator has to be something concrete here: a small trait,
//! [`Reflected`], that a type implements by hand (the same way one hand-writes
//! `impl Serialize for T` without `#[derive(Serialize)]`), plus a process-global registry that
//! lets the [`Reader`](crate::reader::Reader) map a wire type name back to a local constructor
//! when one is registered.

use crate::error::Result;
use crate::kind::{CollectionShape, PrimitiveKind};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// A member (field or property) of a [`RuntimeType`], in wire order.
#[derive(Clone)]
pub struct Member {
    pub name: String,
    pub declared_type: Arc<RuntimeType>,
    /// This member's position, counting from the hierarchy's base-most class, among classes
    /// that declare a member of this same `name`. `0` for the overwhelming majority of members,
    /// which have no same-named shadow anywhere in their hierarchy; only needs to be set when a
    /// derived class intentionally shadows a base member of the same name, so the reader can tell
    /// the two apart (see `reader.rs::read_fields_body`'s offset tie-break).
    pub declaring_depth: u32,
}

impl Member {
    /// A plain, unshadowed member at hierarchy depth 0 — the common case.
    pub fn new(name: impl Into<String>, declared_type: Arc<RuntimeType>) -> Member {
        Member { name: name.into(), declared_type, declaring_depth: 0 }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("declared_type", &self.declared_type.full_name)
            .finish()
    }
}

/// The local reflection façade for a type: everything the Writer/Reader dispatch logic needs
/// to know about a declared or actual type, independent of whatever concrete Rust type (if
/// any) backs it.
pub struct RuntimeType {
    pub kind: PrimitiveKind,
    pub is_reference: bool,
    pub is_sealed: bool,
    pub is_enum: bool,
    pub is_array: bool,
    pub array_rank: u32,
    pub is_nullable: bool,
    pub is_generic: bool,
    pub is_generic_definition: bool,
    pub is_generic_parameter: bool,
    pub generic_parameter_index: u32,
    pub is_interface: bool,
    pub base_type: Option<Arc<RuntimeType>>,
    pub element_type: Option<Arc<RuntimeType>>,
    pub surrogate: Option<Arc<RuntimeType>>,
    pub has_converter: bool,
    pub is_custom_serializable: bool,
    pub members: Vec<Member>,
    pub collection_shape: CollectionShape,
    /// (key type, value type) for `TypedDict`; (element type, None) for `TypedCollection`.
    pub collection_elements: (Option<Arc<RuntimeType>>, Option<Arc<RuntimeType>>),
    pub generic_params: Vec<Arc<RuntimeType>>,
    pub full_name: String,
    pub assembly: String,
}

impl fmt::Debug for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeType")
            .field("full_name", &self.full_name)
            .field("kind", &self.kind)
            .field("is_reference", &self.is_reference)
            .field("members", &self.members.len())
            .finish()
    }
}

impl RuntimeType {
    /// The universal top type: every root write is declared at this type.
    pub fn top() -> Arc<RuntimeType> {
        registry_entry("object", "refgraph").runtime_type
    }

    pub fn string() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::String, "string", true)
    }

    pub fn bytes() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::Bytes, "byte[]", true)
    }

    pub fn guid() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::Guid, "guid", false)
    }

    pub fn boolean() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::Bool, "bool", false)
    }

    pub fn char_() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::Char, "char", false)
    }

    pub fn i8() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::I8, "i8", false)
    }
    pub fn u8() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::U8, "u8", false)
    }
    pub fn i16() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::I16, "i16", false)
    }
    pub fn u16() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::U16, "u16", false)
    }
    pub fn i32() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::I32, "i32", false)
    }
    pub fn u32() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::U32, "u32", false)
    }
    pub fn i64() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::I64, "i64", false)
    }
    pub fn u64() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::U64, "u64", false)
    }
    pub fn f32() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::F32, "f32", false)
    }
    pub fn f64() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::F64, "f64", false)
    }
    pub fn decimal() -> Arc<RuntimeType> {
        scalar_entry(PrimitiveKind::Decimal, "decimal", false)
    }

    /// The "type of TypeData itself" well-known entry (preamble slot 3).
    pub fn type_of_type() -> Arc<RuntimeType> {
        registry_entry("type", "refgraph").runtime_type
    }

    /// The legacy "RuntimeType descriptor" well-known entry (preamble slot 4). The original
    /// source this engine's wire format descends from reserved this slot for its own reflection
    /// type, which has since been renamed away; kept for wire compatibility (see `DESIGN.md`).
    pub fn legacy_runtime_type_descriptor() -> Arc<RuntimeType> {
        registry_entry("runtime_type_descriptor", "refgraph").runtime_type
    }

    /// The nullable-wrapper marker type (preamble slot 5).
    pub fn nullable_marker() -> Arc<RuntimeType> {
        interned("nullable", || RuntimeType {
            kind: PrimitiveKind::None,
            is_reference: false,
            is_sealed: true,
            is_enum: false,
            is_array: false,
            array_rank: 0,
            is_nullable: true,
            is_generic: true,
            is_generic_definition: true,
            is_generic_parameter: false,
            generic_parameter_index: 0,
            is_interface: false,
            base_type: None,
            element_type: None,
            surrogate: None,
            has_converter: false,
            is_custom_serializable: false,
            members: Vec::new(),
            collection_shape: CollectionShape::None,
            collection_elements: (None, None),
            generic_params: Vec::new(),
            full_name: "nullable".to_string(),
            assembly: "refgraph".to_string(),
        })
    }

    /// A `RuntimeType` the writer/reader should treat as wholly unknown. Used when a wire
    /// `TypeData`'s flag word is `0`.
    pub fn unsupported() -> Arc<RuntimeType> {
        Arc::new(Self::unsupported_with_kind(PrimitiveKind::None))
    }

    /// A bare, nameless `RuntimeType` scaffold with the given kind and every other field at a
    /// sensible default. Used as a base for small ad hoc descriptors (anonymous lists/dicts)
    /// built outside of a `Reflected` impl, via struct-update syntax.
    pub fn unsupported_with_kind(kind: PrimitiveKind) -> RuntimeType {
        RuntimeType {
            kind,
            is_reference: true,
            is_sealed: false,
            is_enum: false,
            is_array: false,
            array_rank: 0,
            is_nullable: false,
            is_generic: false,
            is_generic_definition: false,
            is_generic_parameter: false,
            generic_parameter_index: 0,
            is_interface: false,
            base_type: None,
            element_type: None,
            surrogate: None,
            has_converter: false,
            is_custom_serializable: false,
            members: Vec::new(),
            collection_shape: CollectionShape::None,
            collection_elements: (None, None),
            generic_params: Vec::new(),
            full_name: String::new(),
            assembly: String::new(),
        }
    }
}

fn scalar_entry(kind: PrimitiveKind, name: &str, is_reference: bool) -> Arc<RuntimeType> {
    interned(name, || RuntimeType {
        kind,
        is_reference,
        is_sealed: true,
        is_enum: false,
        is_array: false,
        array_rank: 0,
        is_nullable: false,
        is_generic: false,
        is_generic_definition: false,
        is_generic_parameter: false,
        generic_parameter_index: 0,
        is_interface: false,
        base_type: None,
        element_type: None,
        surrogate: None,
        has_converter: false,
        is_custom_serializable: false,
        members: Vec::new(),
        collection_shape: CollectionShape::None,
        collection_elements: (None, None),
        generic_params: Vec::new(),
        full_name: name.to_string(),
        assembly: "refgraph".to_string(),
    })
}

/// Interns a well-known, nameable `RuntimeType` behind a process-global cache keyed by name, so
/// that repeated calls (`RuntimeType::string()` from a dozen unrelated call sites) return the
/// exact same `Arc` allocation. This is what lets `Context`'s well-known preamble and a freshly
/// built member's declared type agree on pointer identity, which is what the id registry keys on
/// (see `value.rs::identity_key`, `context.rs`'s well-known preamble). `registry_entry` is the
/// `Object`-kind special case of the same idea, kept separate because it also threads a
/// `RegisteredType` (with a `revalidate` hook) through the same map.
fn interned(name: &str, build: impl FnOnce() -> RuntimeType) -> Arc<RuntimeType> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<RuntimeType>>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().expect("runtime type intern cache poisoned");
    guard.entry(name.to_string()).or_insert_with(|| Arc::new(build())).clone()
}

/// A Rust type that can participate in the engine: it knows its own [`RuntimeType`] shape and
/// can convert to/from the engine's dynamic [`Value`] representation.
///
/// This is the hand-written stand-in for a runtime-type-introspection and fast-member-accessor
/// facility. A future derive macro could generate these three methods mechanically; none is
/// shipped here.
///
/// `runtime_type()` is called once per value written, not once per process, so it must hand back
/// the *same* `Arc` every time rather than building a fresh one — `TypeData::from_runtime_type`
/// caches by `Arc` pointer, and a type that allocates a new `RuntimeType` per call defeats that
/// cache, re-describing its own schema on the wire for every instance instead of once. Stash the
/// `Arc` behind a `OnceLock` (see the impls in `tests/roundtrip.rs`) the way `scalar_entry`/
/// `registry_entry` do for the built-ins.
pub trait Reflected: Sized + 'static {
    fn runtime_type() -> Arc<RuntimeType>;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self>;
}

/// Called once, after a whole read completes, on every constructed object whose local type
/// opted in. Lets a type fix up state that only makes sense once the whole graph is resolved
/// (a cached computed field, a reference back into a parent it couldn't see mid-construction).
pub trait OnDeserialized {
    fn on_deserialized(&mut self);
}

/// Converts between an original value and a surrogate representation written/read in its
/// place. `convert` runs on write, `revert` on read.
pub trait Surrogate<T> {
    fn convert(original: &T) -> Self;
    fn revert(self) -> T;
}

/// A bidirectional, invariant string representation of a value.
pub trait Converter<T> {
    fn to_string_repr(value: &T) -> String;
    fn from_string_repr(repr: &str) -> Result<T>;
}

type FromValueFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;
type OnDeserializedFn = Arc<dyn Fn(&mut Value) + Send + Sync>;

/// Everything the registry needs to resolve a wire type name back to local behavior, without
/// requiring the caller to know the concrete Rust type `T` at the call site.
#[derive(Clone)]
pub struct RegisteredType {
    pub runtime_type: Arc<RuntimeType>,
    /// Reconstructs a boxed `Value::Object` into itself after validating/coercing shape; for
    /// most types this is close to the identity function, but it is the hook `from_value`
    /// validation runs through during `Reader::read_raw` upgrade attempts.
    pub revalidate: Option<FromValueFn>,
    pub on_deserialized: Option<OnDeserializedFn>,
}

struct Registry {
    by_name: HashMap<(String, String), RegisteredType>,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| {
        Mutex::new(Registry {
            by_name: HashMap::new(),
        })
    })
}

/// Registers (or looks up, if already registered) the well-known registry entry for `name`.
/// Used internally for the handful of built-in types (`object`, `type`) that need a stable
/// `RuntimeType` identity without going through a user `Reflected` impl.
fn registry_entry(name: &str, assembly: &str) -> RegisteredType {
    let key = (name.to_string(), assembly.to_string());
    let mut reg = registry().lock().expect("reflection registry poisoned");
    reg.by_name
        .entry(key)
        .or_insert_with(|| RegisteredType {
            runtime_type: Arc::new(RuntimeType {
                kind: PrimitiveKind::Object,
                is_reference: true,
                is_sealed: false,
                is_enum: false,
                is_array: false,
                array_rank: 0,
                is_nullable: false,
                is_generic: false,
                is_generic_definition: false,
                is_generic_parameter: false,
                generic_parameter_index: 0,
                is_interface: false,
                base_type: None,
                element_type: None,
                surrogate: None,
                has_converter: false,
                is_custom_serializable: false,
                members: Vec::new(),
                collection_shape: CollectionShape::None,
                collection_elements: (None, None),
                generic_params: Vec::new(),
                full_name: name.to_string(),
                assembly: assembly.to_string(),
            }),
            revalidate: None,
            on_deserialized: None,
        })
        .clone()
}

/// Registers a concrete `T: Reflected` type so the Reader can resolve wire `TypeData` whose
/// `(full_name, assembly)` matches it back to `T::from_value`, and so that any `OnDeserialized`
/// impl gets invoked. Idempotent: calling it twice for the same name just replaces the entry.
pub fn register_type<T: Reflected>() {
    let rt = T::runtime_type();
    let key = (rt.full_name.clone(), rt.assembly.clone());
    let revalidate: FromValueFn = Arc::new(|v| T::from_value(v).map(|t| t.to_value()));
    let mut reg = registry().lock().expect("reflection registry poisoned");
    reg.by_name.insert(
        key,
        RegisteredType {
            runtime_type: rt,
            revalidate: Some(revalidate),
            on_deserialized: None,
        },
    );
}

/// Registers a concrete `T: Reflected + OnDeserialized` type, additionally wiring up the
/// post-construction callback.
pub fn register_type_with_callback<T>()
where
    T: Reflected + OnDeserialized,
    T: Clone,
{
    register_type::<T>();
    let key = {
        let rt = T::runtime_type();
        (rt.full_name.clone(), rt.assembly.clone())
    };
    let on_deserialized: OnDeserializedFn = Arc::new(|v| {
        if let Ok(mut t) = T::from_value(v.clone()) {
            t.on_deserialized();
            *v = t.to_value();
        }
    });
    let mut reg = registry().lock().expect("reflection registry poisoned");
    if let Some(entry) = reg.by_name.get_mut(&key) {
        entry.on_deserialized = Some(on_deserialized);
    }
}

/// Looks up a previously registered type by its wire name, e.g. during `Reader` construction.
pub fn lookup(full_name: &str, assembly: &str) -> Option<RegisteredType> {
    registry()
        .lock()
        .expect("reflection registry poisoned")
        .by_name
        .get(&(full_name.to_string(), assembly.to_string()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_runtime_types_are_sealed_value_kinds() {
        assert!(RuntimeType::i32().is_sealed);
        assert!(!RuntimeType::i32().is_reference);
        assert!(RuntimeType::string().is_reference);
        assert!(RuntimeType::bytes().is_reference);
    }

    #[test]
    fn register_and_lookup_roundtrip() {
        #[derive(Clone)]
        struct Point {
            x: i32,
            y: i32,
        }
        impl Reflected for Point {
            fn runtime_type() -> Arc<RuntimeType> {
                Arc::new(RuntimeType {
                    kind: PrimitiveKind::Object,
                    is_reference: false,
                    is_sealed: true,
                    is_enum: false,
                    is_array: false,
                    array_rank: 0,
                    is_nullable: false,
                    is_generic: false,
                    is_generic_definition: false,
                    is_generic_parameter: false,
                    generic_parameter_index: 0,
                    is_interface: false,
                    base_type: None,
                    element_type: None,
                    surrogate: None,
                    has_converter: false,
                    is_custom_serializable: false,
                    members: vec![
                        Member::new("x", RuntimeType::i32()),
                        Member::new("y", RuntimeType::i32()),
                    ],
                    collection_shape: CollectionShape::None,
                    collection_elements: (None, None),
                    generic_params: Vec::new(),
                    full_name: "reflect_tests::Point".into(),
                    assembly: "refgraph".into(),
                })
            }
            fn to_value(&self) -> Value {
                Value::fields(
                    Point::runtime_type(),
                    vec![
                        ("x".into(), Value::I32(self.x)),
                        ("y".into(), Value::I32(self.y)),
                    ],
                )
            }
            fn from_value(value: Value) -> Result<Self> {
                let fields = value.into_fields()?;
                Ok(Point {
                    x: fields.get_i32("x").unwrap_or_default(),
                    y: fields.get_i32("y").unwrap_or_default(),
                })
            }
        }

        register_type::<Point>();
        let found = lookup("reflect_tests::Point", "refgraph").unwrap();
        assert_eq!(found.runtime_type.members.len(), 2);
    }
}
