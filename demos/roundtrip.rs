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

//! Drives a self-referential object graph through `Writer`/`Reader` and checks that identity
//! survives the round trip end to end.
//!
//! The graph is built directly against the dynamic `Value`/`ObjectKind` representation rather
//! than through a hand-written `Reflected` impl: reconstructing a genuine reference cycle back
//! into a concrete Rust type needs its own id-to-allocation memoization (the caller's job, not
//! this engine's), which is a separate concern from what this demo is showing.

use refgraph::reflect::RuntimeType;
use refgraph::type_data::TypeData;
use refgraph::value::{ObjectKind, ObjectValue};
use refgraph::{Reader, Value, Writer};
use std::cell::RefCell;
use std::rc::Rc;

fn main() -> refgraph::Result<()> {
    tracing_subscriber::fmt::init();

    let node_rt = RuntimeType::unsupported_with_kind(refgraph::kind::PrimitiveKind::Object);
    let node_rt = std::sync::Arc::new(refgraph::RuntimeType {
        is_reference: true,
        full_name: "demos::Node".into(),
        assembly: "refgraph".into(),
        ..node_rt
    });
    let node_type = TypeData::from_runtime_type(&node_rt);

    let obj = Rc::new(RefCell::new(ObjectValue {
        type_data: node_type.clone(),
        kind: ObjectKind::Pending,
    }));
    let node = Value::Object(obj.clone());
    obj.borrow_mut().kind = ObjectKind::Fields(vec![
        ("label".into(), Value::string("self-loop")),
        ("next".into(), node.clone()),
    ]);

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut writer = Writer::new(Vec::new());
    writer.write_value(&top, &node)?;
    let bytes = writer.into_inner();
    println!("encoded {} bytes", bytes.len());

    let mut reader = Reader::new(bytes.as_slice());
    let decoded = reader.read_root_value()?;

    let Value::Object(decoded_obj) = &decoded else {
        panic!("expected an object back");
    };
    let ObjectKind::Fields(fields) = &decoded_obj.borrow().kind else {
        panic!("expected member-wise fields");
    };
    let next = fields.iter().find(|(n, _)| n == "next").map(|(_, v)| v.clone()).unwrap();
    assert_eq!(decoded.identity_key(), next.identity_key());
    println!("round trip preserved the self-reference: node.next == node");
    Ok(())
}
