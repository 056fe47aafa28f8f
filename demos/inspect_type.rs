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

//! Decodes a stream written by a type this process has never heard of, and prints the shape it
//! got back anyway: the `ObjectData`/unsupported-type path, a "just show me the metadata" view
//! that dumps the decoded structure to JSON without interpreting it as any particular local type.

use refgraph::reflect::RuntimeType;
use refgraph::type_data::TypeData;
use refgraph::value::{ObjectKind, ObjectValue};
use refgraph::{Reader, Value, Writer};
use std::cell::RefCell;
use std::rc::Rc;

fn main() -> refgraph::Result<()> {
    tracing_subscriber::fmt::init();

    // Simulate a producer that wrote a `remote::Invoice` this process has no local type for.
    let invoice_rt = std::sync::Arc::new(refgraph::RuntimeType {
        full_name: "remote::Invoice".into(),
        assembly: "billing".into(),
        members: vec![
            refgraph::reflect::Member::new("id", RuntimeType::i64()),
            refgraph::reflect::Member::new("total", RuntimeType::f64()),
        ],
        ..RuntimeType::unsupported_with_kind(refgraph::kind::PrimitiveKind::Object)
    });
    let invoice_type = TypeData::from_runtime_type(&invoice_rt);
    let invoice = Value::Object(Rc::new(RefCell::new(ObjectValue {
        type_data: invoice_type,
        kind: ObjectKind::Fields(vec![("id".into(), Value::I64(42)), ("total".into(), Value::F64(19.99))]),
    })));

    let top = TypeData::from_runtime_type(&RuntimeType::top());
    let mut writer = Writer::new(Vec::new());
    writer.write_value(&top, &invoice)?;
    let bytes = writer.into_inner();

    // A fresh process with no knowledge of `remote::Invoice` decodes the same bytes: the wire
    // TypeData is still fully readable, and `reflect::lookup` simply finds nothing registered.
    let mut reader = Reader::new(bytes.as_slice());
    let decoded = reader.read_root_value()?;

    let json = refgraph::debug::to_json(&decoded);
    println!("{}", serde_json::to_string_pretty(&json).expect("json"));
    Ok(())
}
