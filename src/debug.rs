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

//! Renders a [`Value`] tree as `serde_json::Value` for inspection, the same interleaved-view
//! idea the original decoder/encoder pair used, just keyed off the dynamic object model instead
//! of a flat record list.

use crate::type_data::TypeData;
use crate::value::{ObjectKind, Value};
use serde_json::{Map, json};
use std::rc::Rc;

/// Converts `value` into a human-readable JSON tree. Reference cycles are broken by printing a
/// `"$ref"` marker on the second and later visits to the same allocation instead of recursing
/// forever.
pub fn to_json(value: &Value) -> serde_json::Value {
    let mut seen = Vec::new();
    render(value, &mut seen)
}

fn render(value: &Value, seen: &mut Vec<(u8, usize)>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Char(c) => json!(c.to_string()),
        Value::I8(v) => json!(v),
        Value::U8(v) => json!(v),
        Value::I16(v) => json!(v),
        Value::U16(v) => json!(v),
        Value::I32(v) => json!(v),
        Value::U32(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::F32(v) => json!(v),
        Value::F64(v) => json!(v),
        Value::Decimal(v) => json!(hex::encode(v)),
        Value::Guid(v) => json!(v.to_string()),
        Value::String(s) => json!(s.as_ref()),
        Value::Bytes(b) => json!(hex::encode(b.as_ref())),
        Value::Type(td) => render_type_data(td),
        Value::Object(obj_ref) => {
            let key = value.identity_key().expect("Object values always have identity");
            if seen.contains(&key) {
                return json!({ "$ref": format!("{:#x}", key.1) });
            }
            seen.push(key);
            let obj = obj_ref.borrow();
            let mut map = Map::new();
            map.insert("$type".to_string(), json!(obj.type_data.full_name.borrow().clone()));
            match &obj.kind {
                ObjectKind::Pending => {
                    map.insert("$pending".to_string(), json!(true));
                }
                ObjectKind::Fields(fields) | ObjectKind::Custom(fields) => {
                    for (name, v) in fields {
                        map.insert(name.clone(), render(v, seen));
                    }
                }
                ObjectKind::List { is_readonly, items } => {
                    return json!({
                        "$type": obj.type_data.full_name.borrow().clone(),
                        "$readonly": is_readonly,
                        "$list": items.iter().map(|v| render(v, seen)).collect::<Vec<_>>(),
                    });
                }
                ObjectKind::Dict { is_readonly, items } => {
                    let pairs: Vec<serde_json::Value> = items
                        .iter()
                        .map(|(k, v)| json!({"key": render(k, seen), "value": render(v, seen)}))
                        .collect();
                    return json!({
                        "$type": obj.type_data.full_name.borrow().clone(),
                        "$readonly": is_readonly,
                        "$dict": pairs,
                    });
                }
                ObjectKind::Array { lengths, elements } => {
                    return json!({
                        "$type": obj.type_data.full_name.borrow().clone(),
                        "$array_lengths": lengths,
                        "$array_elements": elements.iter().map(|v| render(v, seen)).collect::<Vec<_>>(),
                    });
                }
                ObjectKind::Surrogate(inner) => {
                    return json!({
                        "$type": obj.type_data.full_name.borrow().clone(),
                        "$surrogate": render(inner, seen),
                    });
                }
                ObjectKind::Converter { repr, .. } => {
                    return json!({ "$type": obj.type_data.full_name.borrow().clone(), "$converter": repr });
                }
                ObjectKind::Enum(inner) => {
                    return json!({
                        "$type": obj.type_data.full_name.borrow().clone(),
                        "$enum": render(inner, seen),
                    });
                }
            }
            serde_json::Value::Object(map)
        }
    }
}

fn render_type_data(td: &Rc<TypeData>) -> serde_json::Value {
    json!({
        "$type": "refgraph.TypeData",
        "full_name": td.full_name.borrow().clone(),
        "assembly": td.assembly.borrow().clone(),
        "kind": format!("{:?}", td.kind.get()),
        "members": td.members.borrow().iter().map(|m| m.name.clone()).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::RuntimeType;

    #[test]
    fn scalar_values_render_directly() {
        assert_eq!(to_json(&Value::I32(3)), json!(3));
        assert_eq!(to_json(&Value::Null), serde_json::Value::Null);
    }

    #[test]
    fn cyclic_object_breaks_with_a_ref_marker() {
        let rt = RuntimeType::unsupported();
        let obj = Value::fields(rt, vec![]);
        if let Value::Object(obj_ref) = &obj {
            let cyclic = vec![("self".to_string(), obj.clone())];
            obj_ref.borrow_mut().kind = ObjectKind::Fields(cyclic);
        }
        let rendered = to_json(&obj);
        assert!(rendered["self"]["$ref"].is_string());
    }
}
