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

//! End-to-end coverage of the testable properties and boundary scenarios (S1-S7): round-trip
//! identity, sharing/cycle preservation, id monotonicity, well-known alignment, version
//! tolerance, unsupported-type safety, and settings round-tripping.

use refgraph::context::Context;
use refgraph::kind::PrimitiveKind;
use refgraph::reflect::{Member, RuntimeType};
use refgraph::settings::SerializationSettings;
use refgraph::type_data::TypeData;
use refgraph::value::{ObjectKind, ObjectValue};
use refgraph::{Reader, Reflected, Result, Value, Writer};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

impl Reflected for Point {
    fn runtime_type() -> Arc<RuntimeType> {
        // Cached rather than rebuilt per call: `TypeData::from_runtime_type` keys its own cache
        // by `Arc` pointer, so two instances of `Point` must hand back the same `Arc` to share one
        // on-wire schema instead of each re-describing it.
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| {
            Arc::new(RuntimeType {
                kind: PrimitiveKind::Object,
                is_reference: true,
                is_sealed: true,
                members: vec![
                    Member::new("x", RuntimeType::i32()),
                    Member::new("y", RuntimeType::i32()),
                ],
                full_name: "roundtrip_tests::Point".into(),
                assembly: "refgraph".into(),
                ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
            })
        })
        .clone()
    }

    fn to_value(&self) -> Value {
        Value::fields(
            Point::runtime_type(),
            vec![("x".into(), Value::I32(self.x)), ("y".into(), Value::I32(self.y))],
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

#[test]
fn round_trip_identity_for_a_reflected_struct() {
    let p = Point { x: 3, y: -7 };
    let bytes = refgraph::to_bytes(&p).unwrap();
    let back: Point = refgraph::from_bytes(&bytes).unwrap();
    assert_eq!(p, back);
}

#[test]
fn sharing_preservation_two_list_slots_sharing_one_string() {
    let shared = Value::string("shared-payload");
    let list = Value::list(RuntimeType::string(), vec![shared.clone(), shared]);

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &list).unwrap();
    let bytes = w.into_inner();

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(obj) = decoded else { panic!("expected a list object") };
    let ObjectKind::List { items, .. } = &obj.borrow().kind else { panic!("expected a list") };
    assert_eq!(items[0].identity_key(), items[1].identity_key());
}

#[test]
fn cycle_tolerance_self_referential_object_round_trips() {
    let rt = Arc::new(RuntimeType {
        full_name: "roundtrip_tests::Cyclic".into(),
        assembly: "refgraph".into(),
        ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
    });
    let type_data = TypeData::from_runtime_type(&rt);
    let obj = Rc::new(RefCell::new(ObjectValue { type_data, kind: ObjectKind::Pending }));
    let value = Value::Object(obj.clone());
    obj.borrow_mut().kind = ObjectKind::Fields(vec![("self".into(), value.clone())]);

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &value).unwrap();
    let bytes = w.into_inner();

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(decoded_obj) = &decoded else { panic!("expected an object") };
    let ObjectKind::Fields(fields) = &decoded_obj.borrow().kind else { panic!("expected fields") };
    let self_ref = &fields[0].1;
    assert_eq!(decoded.identity_key(), self_ref.identity_key());
}

#[test]
fn id_monotonicity_within_a_session() {
    let mut ctx = Context::new();
    let seed = ctx.seed();
    let first = ctx.new_id();
    let second = ctx.new_id();
    assert_eq!(first, seed);
    assert_eq!(second, seed + 1);
}

#[test]
fn well_known_alignment_writing_a_well_known_type_emits_only_its_id() {
    // The `string` RuntimeType is pre-registered at well-known id 2 (see `context.rs`); writing
    // it as a value must resolve straight to that id, with no flag-word/name body on the wire.
    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let string_type_value = Value::Type(TypeData::from_runtime_type(&RuntimeType::string()));
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &string_type_value).unwrap();
    assert_eq!(w.into_inner(), vec![0x83, 0x02, 0, 2]);
}

#[derive(Clone)]
struct PersonV2 {
    name: String,
    age: i32,
}

impl Reflected for PersonV2 {
    fn runtime_type() -> Arc<RuntimeType> {
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| {
            Arc::new(RuntimeType {
                kind: PrimitiveKind::Object,
                is_reference: true,
                is_sealed: true,
                members: vec![
                    Member::new("name", RuntimeType::string()),
                    Member::new("age", RuntimeType::i32()),
                ],
                full_name: "roundtrip_tests::Person".into(),
                assembly: "refgraph".into(),
                ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
            })
        })
        .clone()
    }

    fn to_value(&self) -> Value {
        Value::fields(
            PersonV2::runtime_type(),
            vec![("name".into(), Value::string(self.name.clone())), ("age".into(), Value::I32(self.age))],
        )
    }

    fn from_value(value: Value) -> Result<Self> {
        let fields = value.into_fields()?;
        Ok(PersonV2 {
            name: fields.get_string("name").unwrap_or_default(),
            age: fields.get_i32("age").unwrap_or_default(),
        })
    }
}

/// A local type that only knows about `name`, simulating a reader whose local schema is older
/// than the wire schema (subtractive tolerance): it must still decode without complaint.
struct PersonNameOnly {
    name: String,
}

impl Reflected for PersonNameOnly {
    fn runtime_type() -> Arc<RuntimeType> {
        static TYPE: OnceLock<Arc<RuntimeType>> = OnceLock::new();
        TYPE.get_or_init(|| {
            Arc::new(RuntimeType {
                kind: PrimitiveKind::Object,
                is_reference: true,
                is_sealed: true,
                members: vec![Member::new("name", RuntimeType::string())],
                full_name: "roundtrip_tests::Person".into(),
                assembly: "refgraph".into(),
                ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
            })
        })
        .clone()
    }

    fn to_value(&self) -> Value {
        Value::fields(PersonNameOnly::runtime_type(), vec![("name".into(), Value::string(self.name.clone()))])
    }

    fn from_value(value: Value) -> Result<Self> {
        let fields = value.into_fields()?;
        Ok(PersonNameOnly { name: fields.get_string("name").unwrap_or_default() })
    }
}

#[test]
fn version_tolerance_additive_and_subtractive() {
    // Subtractive: the wire carries {name, age}; the dynamic reader only asks for "name".
    let p = PersonV2 { name: "Ada".into(), age: 36 };
    let bytes = refgraph::to_bytes(&p).unwrap();
    let narrowed: PersonNameOnly = refgraph::from_bytes(&bytes).unwrap();
    assert_eq!(narrowed.name, "Ada");

    // Additive: the wire only carries {name}; the dynamic reader asks for "age" too and gets
    // the field's default rather than an error.
    let narrow = PersonNameOnly { name: "Grace".into() };
    let bytes = refgraph::to_bytes(&narrow).unwrap();
    let widened: PersonV2 = refgraph::from_bytes(&bytes).unwrap();
    assert_eq!(widened.name, "Grace");
    assert_eq!(widened.age, 0);
}

#[test]
fn two_instances_of_the_same_reflected_type_share_one_schema() {
    // Both Points come from the same interned `Point::runtime_type()` Arc, so the second write
    // must resolve to the first's already-registered TypeData instead of re-describing the class.
    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let list = Value::list(
        Arc::new(RuntimeType::unsupported_with_kind(PrimitiveKind::Object)),
        vec![Point { x: 1, y: 2 }.to_value(), Point { x: 3, y: 4 }.to_value()],
    );
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &list).unwrap();
    let out = w.into_inner();
    let needle = b"roundtrip_tests::Point";
    let occurrences = out.windows(needle.len()).filter(|w| *w == needle).count();
    assert_eq!(occurrences, 1);
}

#[test]
fn unsupported_type_is_still_fully_decodable() {
    let obj = Rc::new(RefCell::new(ObjectValue {
        type_data: TypeData::unsupported(),
        kind: ObjectKind::Fields(vec![("anything".into(), Value::I32(1))]),
    }));
    let value = Value::Object(obj);

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &value).unwrap();
    let bytes = w.into_inner();

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(decoded_obj) = decoded else { panic!("expected an object") };
    assert_eq!(decoded_obj.borrow().type_data.kind.get(), PrimitiveKind::None);
}

#[test]
fn settings_round_trip_skip_member_data_yields_placeholders() {
    let p = Point { x: 1, y: 2 };
    let settings = SerializationSettings::builder().skip_member_data(true).build();
    let mut w = Writer::with_settings(Vec::new(), settings);
    let top = TypeData::from_runtime_type(&RuntimeType::top());
    w.write_value(&top, &p.to_value()).unwrap();
    let bytes = w.into_inner();

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(obj) = decoded else { panic!("expected an object") };
    assert!(matches!(obj.borrow().kind, ObjectKind::Pending));
}

#[test]
fn s1_write_null() {
    let mut w = Writer::new(Vec::new());
    let top = TypeData::from_runtime_type(&RuntimeType::top());
    w.write_value(&top, &Value::Null).unwrap();
    let mut r = Reader::new(w.into_inner().as_slice());
    assert!(r.read_root_value().unwrap().is_null());
}

#[test]
fn s2_write_empty_string_resolves_to_the_well_known_id() {
    let mut w = Writer::new(Vec::new());
    let string_type = TypeData::from_runtime_type(&RuntimeType::string());
    w.write_value(&string_type, &Value::string("")).unwrap();
    let bytes = w.into_inner();
    // version(2 bytes) + settings(1 byte) + well-known id 6 (1 byte) = 4 bytes, no body.
    assert_eq!(bytes.len(), 4);

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    assert!(matches!(decoded, Value::String(s) if &*s == ""));
}

#[test]
fn s3_write_scalar_i32() {
    let mut w = Writer::new(Vec::new());
    let i32_type = TypeData::from_runtime_type(&RuntimeType::i32());
    w.write_value(&i32_type, &Value::I32(42)).unwrap();
    let mut r = Reader::new(w.into_inner().as_slice());
    assert!(matches!(r.read_root_value().unwrap(), Value::I32(42)));
}

#[test]
fn s4_write_fixed_size_array() {
    let element_type = RuntimeType::i32();
    let array_rt = Arc::new(RuntimeType {
        is_array: true,
        array_rank: 1,
        element_type: Some(element_type),
        ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
    });
    let obj = Rc::new(RefCell::new(ObjectValue {
        type_data: TypeData::from_runtime_type(&array_rt),
        kind: ObjectKind::Array { lengths: vec![3], elements: vec![Value::I32(1), Value::I32(2), Value::I32(3)] },
    }));
    let value = Value::Object(obj);

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &value).unwrap();
    let bytes = w.into_inner();

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(obj) = decoded else { panic!("expected an array object") };
    let ObjectKind::Array { lengths, elements } = &obj.borrow().kind else { panic!("expected an array") };
    assert_eq!(lengths, &vec![3]);
    assert!(matches!(elements[0], Value::I32(1)));
    assert!(matches!(elements[2], Value::I32(3)));
}

#[test]
fn enum_recurses_as_its_underlying_integral_type() {
    let enum_rt = Arc::new(RuntimeType {
        is_enum: true,
        element_type: Some(RuntimeType::i32()),
        full_name: "roundtrip_tests::Suit".into(),
        assembly: "refgraph".into(),
        ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
    });
    let enum_type = TypeData::from_runtime_type(&enum_rt);
    let obj = Rc::new(RefCell::new(ObjectValue {
        type_data: enum_type,
        kind: ObjectKind::Enum(Box::new(Value::I32(2))),
    }));
    let value = Value::Object(obj);

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &value).unwrap();
    let bytes = w.into_inner();
    // flag word + name + assembly + generic index + base type ref + array rank, then the bare
    // i32 discriminant with no member count and no collection tail.
    assert!(bytes.ends_with(&[2, 0, 0, 0]));

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(obj) = decoded else { panic!("expected an object") };
    let ObjectKind::Enum(inner) = &obj.borrow().kind else { panic!("expected an enum") };
    assert!(matches!(**inner, Value::I32(2)));
}

#[test]
fn s7_ignore_converter_falls_through_to_member_wise_encoding() {
    let rt = Arc::new(RuntimeType {
        has_converter: true,
        members: vec![Member::new("x", RuntimeType::i32())],
        full_name: "roundtrip_tests::WithConverter".into(),
        assembly: "refgraph".into(),
        ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
    });
    let obj = Rc::new(RefCell::new(ObjectValue {
        type_data: TypeData::from_runtime_type(&rt),
        kind: ObjectKind::Converter {
            repr: "5".into(),
            fallback: vec![("x".into(), Value::I32(5))],
        },
    }));
    let value = Value::Object(obj);

    let settings = SerializationSettings::builder().ignore_converter(true).build();
    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut w = Writer::with_settings(Vec::new(), settings);
    w.write_value(&top, &value).unwrap();
    let bytes = w.into_inner();

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(obj) = decoded else { panic!("expected an object") };
    let ObjectKind::Fields(fields) = &obj.borrow().kind else {
        panic!("expected the ignore_converter fallback to decode as plain fields")
    };
    assert!(matches!(fields[0], (ref name, Value::I32(5)) if name == "x"));
}

#[test]
fn shadowed_member_names_across_a_hierarchy_stay_distinguishable() {
    // A base class and a derived class both declare an `id` member; the wire schema carries both
    // at their respective `declaring_depth`. With no local type registered for this name, the
    // reader has no local chain to offset against and falls back to the wire position, keying the
    // two apart as "id#0" (the base member) and "id#1" (the derived shadow).
    let rt = Arc::new(RuntimeType {
        members: vec![
            Member { name: "id".into(), declared_type: RuntimeType::i32(), declaring_depth: 0 },
            Member { name: "id".into(), declared_type: RuntimeType::i64(), declaring_depth: 1 },
        ],
        full_name: "roundtrip_tests::Shadowed".into(),
        assembly: "refgraph".into(),
        ..RuntimeType::unsupported_with_kind(PrimitiveKind::Object)
    });
    let obj = Rc::new(RefCell::new(ObjectValue {
        type_data: TypeData::from_runtime_type(&rt),
        kind: ObjectKind::Fields(vec![("id#0".into(), Value::I32(1)), ("id#1".into(), Value::I64(2))]),
    }));
    let value = Value::Object(obj);

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut w = Writer::new(Vec::new());
    w.write_value(&top, &value).unwrap();
    let bytes = w.into_inner();

    let mut r = Reader::new(bytes.as_slice());
    let decoded = r.read_root_value().unwrap();
    let Value::Object(obj) = decoded else { panic!("expected an object") };
    let ObjectKind::Fields(fields) = &obj.borrow().kind else { panic!("expected plain fields") };
    assert!(fields.iter().any(|(name, v)| name == "id#0" && matches!(v, Value::I32(1))));
    assert!(fields.iter().any(|(name, v)| name == "id#1" && matches!(v, Value::I64(2))));
}
