//! Attribute resolution.
//!
//! `get_attr` reproduces the runtime's lookup precedence:
//!
//! 1. walk the MRO for a descriptor candidate (a class object's own walk
//!    skips the metatype and itself; its own members are served at step 3)
//! 2. a data descriptor's read path wins outright
//! 3. the owner's own store (instance `__dict__`, or a class object's
//!    member table)
//! 4. native method on the dynamic type's dispatch table
//! 5. generic field loading keyed by attribute name
//! 6. native method on the declared implementation type of the payload
//! 7. a class-dict function candidate wins over a native method wrapper
//! 8. remaining candidate: non-data descriptor read, or the plain value
//! 9. not found — an absence, never an error
//!
//! `Ok(None)` is the absence marker; errors are reserved for broken type
//! graphs (MRO conflicts) and descriptor misuse.

use super::bytecode::Value;
use super::mro::mro_of;
use super::type_def::{TYPE_TYPE, TypeRegistry};
use super::utils::{as_type, make_bound_method, make_type, type_id_of};
use super::value::{Callee, ObjectData};
use super::{VmErrorKind, VmResult, err};

/// Resolves `obj.name`, or `Ok(None)` when the attribute does not exist.
pub fn get_attr(reg: &TypeRegistry, obj: &Value, name: &str) -> VmResult<Option<Value>> {
    let tid = type_id_of(obj);

    // 1. descriptor candidate from the MRO
    let descr = match as_type(obj) {
        Some(owner_tid) => lookup_type_mro(reg, owner_tid, name, true)?,
        None => lookup_type_mro(reg, tid, name, false)?,
    };

    // 2. data descriptors shadow everything else
    if let Some(d) = &descr
        && is_data_descriptor(d)
    {
        return descr_read(reg, d, obj).map(Some);
    }

    // 3. the owner's own store
    let mut found = match as_type(obj) {
        Some(owner_tid) => reg.type_def(owner_tid).dict.borrow().get(name).cloned(),
        None => match obj {
            Value::Object(o) => o.get_attr(name),
            _ => None,
        },
    };

    // 4. native method on the dynamic type
    if found.is_none()
        && let Some(slot) = reg.type_def(tid).methods.get(name)
    {
        found = Some(make_bound_method(
            obj.clone(),
            Callee::Native(slot.func),
            name.to_string(),
        ));
    }

    // 5. generic field loading
    if found.is_none() {
        found = load_field(reg, obj, name)?;
    }

    // 6. native method on the declared implementation type; covers
    //    dynamically constructed subclasses whose own table is empty
    if found.is_none() {
        let owner = reg.type_def(tid).repr.builtin_owner();
        if owner != tid
            && let Some(slot) = reg.type_def(owner).methods.get(name)
        {
            found = Some(make_bound_method(
                obj.clone(),
                Callee::Native(slot.func),
                name.to_string(),
            ));
        }
    }

    // 7. a function defined in a class dict outranks a native wrapper
    if let Some(d) = &descr
        && matches!(value_data(d), Some(ObjectData::Function { .. }))
        && matches!(
            found.as_ref().and_then(value_data),
            Some(ObjectData::BoundMethod { .. })
        )
    {
        return descr_read(reg, d, obj).map(Some);
    }

    if found.is_some() {
        return Ok(found);
    }

    // 8. fall back to the candidate: non-data descriptor or plain value
    if let Some(d) = descr {
        return descr_read(reg, &d, obj).map(Some);
    }

    // 9. absence
    Ok(None)
}

/// Resolves `obj.name = value`.
///
/// A data descriptor found on the type intercepts the write; otherwise the
/// value lands in the owner's own store.
pub fn set_attr(reg: &TypeRegistry, obj: &Value, name: &str, value: Value) -> VmResult<()> {
    let descr = match as_type(obj) {
        Some(owner_tid) => lookup_type_mro(reg, owner_tid, name, true)?,
        None => lookup_type_mro(reg, type_id_of(obj), name, false)?,
    };
    if let Some(d) = descr
        && is_data_descriptor(&d)
    {
        if let Value::Object(o) = &d
            && let ObjectData::Property { cell, .. } = &o.data
        {
            *cell.borrow_mut() = value;
            return Ok(());
        }
        unreachable!("data descriptors are properties");
    }

    if let Some(owner_tid) = as_type(obj) {
        reg.type_def(owner_tid)
            .dict
            .borrow_mut()
            .insert(name.to_string(), value);
        return Ok(());
    }
    if let Value::Object(o) = obj
        && o.set_attr(name.to_string(), value)
    {
        return Ok(());
    }
    Err(err(
        VmErrorKind::TypeError("object"),
        format!(
            "'{}' object does not support attribute assignment",
            reg.type_def(type_id_of(obj)).name
        ),
    ))
}

/// Walks a type's MRO looking for `name` in each ancestor's member table.
///
/// When `skip_self` is set (class-object lookup) the walk excludes the
/// metatype and the type itself, mirroring the type-level lookup of the
/// original runtime.
fn lookup_type_mro(
    reg: &TypeRegistry,
    tid: u16,
    name: &str,
    skip_self: bool,
) -> VmResult<Option<Value>> {
    let mro = mro_of(reg, tid)?;
    for &ancestor in mro.iter() {
        if skip_self && (ancestor == TYPE_TYPE || ancestor == tid) {
            continue;
        }
        if let Some(v) = reg.type_def(ancestor).dict.borrow().get(name) {
            return Ok(Some(v.clone()));
        }
    }
    Ok(None)
}

fn value_data(v: &Value) -> Option<&ObjectData> {
    match v {
        Value::Object(o) => Some(&o.data),
        _ => None,
    }
}

/// Both read and write capability.
fn is_data_descriptor(v: &Value) -> bool {
    matches!(value_data(v), Some(ObjectData::Property { data: true, .. }))
}

/// Computes a descriptor candidate's value for `owner`. Properties yield
/// their cell, functions bind to the owner, anything else is returned
/// as-is (a plain class attribute).
fn descr_read(_reg: &TypeRegistry, d: &Value, owner: &Value) -> VmResult<Value> {
    match value_data(d) {
        Some(ObjectData::Property { cell, .. }) => Ok(cell.borrow().clone()),
        Some(ObjectData::Function { func_id }) => Ok(make_bound_method(
            owner.clone(),
            Callee::Function(*func_id),
            format!("<function #{}>", func_id),
        )),
        _ => Ok(d.clone()),
    }
}

/// Step 5: intrinsic fields of the concrete payload, keyed by name.
fn load_field(reg: &TypeRegistry, obj: &Value, name: &str) -> VmResult<Option<Value>> {
    let Value::Object(o) = obj else {
        return Ok(None);
    };
    match &o.data {
        ObjectData::Slice { start, stop, step } => Ok(match name {
            "start" => Some(start.clone()),
            "stop" => Some(stop.clone()),
            "step" => Some(step.clone()),
            _ => None,
        }),
        ObjectData::Type { type_id } => match name {
            "__name__" => Ok(Some(super::utils::make_string(
                reg.type_def(*type_id).name.clone(),
            ))),
            "__bases__" => Ok(Some(super::utils::make_tuple(
                reg.type_def(*type_id)
                    .bases
                    .iter()
                    .map(|&b| make_type(b))
                    .collect(),
            ))),
            "__mro__" => Ok(Some(super::utils::make_tuple(
                mro_of(reg, *type_id)?.iter().map(|&t| make_type(t)).collect(),
            ))),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::type_def::{TYPE_OBJECT, TYPE_STR};
    use crate::vm::utils::{
        make_dict, make_function, make_instance, make_property, make_slice, make_string,
        make_tuple,
    };
    use crate::vm::value::DictKey;
    use std::collections::HashMap;

    fn synthesize(
        reg: &mut TypeRegistry,
        name: &str,
        bases: Vec<Value>,
        members: Vec<(&str, Value)>,
    ) -> u16 {
        let dict = make_dict(
            members
                .into_iter()
                .map(|(k, v)| (DictKey::Str(k.to_string()), v))
                .collect(),
        );
        let v = reg
            .construct_type(
                &[
                    make_string(name.to_string()),
                    make_tuple(bases),
                    dict,
                ],
                &HashMap::new(),
            )
            .unwrap();
        as_type(&v).unwrap()
    }

    #[test]
    fn test_missing_attribute_is_absence_not_error() {
        let mut reg = TypeRegistry::new();
        let a = synthesize(&mut reg, "A", vec![], vec![]);
        let inst = make_instance(a);
        assert_eq!(get_attr(&reg, &inst, "missing").unwrap(), None);
    }

    #[test]
    fn test_instance_store_hit() {
        let mut reg = TypeRegistry::new();
        let a = synthesize(&mut reg, "A", vec![], vec![]);
        let inst = make_instance(a);
        set_attr(&reg, &inst, "x", Value::Int(7)).unwrap();
        assert_eq!(get_attr(&reg, &inst, "x").unwrap(), Some(Value::Int(7)));
    }

    #[test]
    fn test_plain_class_attribute_via_mro() {
        let mut reg = TypeRegistry::new();
        let a = synthesize(&mut reg, "A", vec![], vec![("answer", Value::Int(42))]);
        let b = synthesize(&mut reg, "B", vec![make_type(a)], vec![]);
        let inst = make_instance(b);
        assert_eq!(
            get_attr(&reg, &inst, "answer").unwrap(),
            Some(Value::Int(42))
        );
    }

    #[test]
    fn test_data_descriptor_beats_instance_store() {
        let mut reg = TypeRegistry::new();
        let descr = make_property(Value::Int(99), true);
        let a = synthesize(&mut reg, "A", vec![], vec![("x", descr)]);
        let inst = make_instance(a);
        // write lands in the descriptor cell, not the instance store
        if let Value::Object(o) = &inst {
            o.set_attr("x".to_string(), Value::Int(1));
        }
        assert_eq!(get_attr(&reg, &inst, "x").unwrap(), Some(Value::Int(99)));
    }

    #[test]
    fn test_non_data_descriptor_loses_to_instance_store() {
        let mut reg = TypeRegistry::new();
        let descr = make_property(Value::Int(99), false);
        let a = synthesize(&mut reg, "A", vec![], vec![("x", descr)]);
        let inst = make_instance(a);
        if let Value::Object(o) = &inst {
            o.set_attr("x".to_string(), Value::Int(1));
        }
        assert_eq!(get_attr(&reg, &inst, "x").unwrap(), Some(Value::Int(1)));
    }

    #[test]
    fn test_non_data_descriptor_read_when_nothing_else() {
        let mut reg = TypeRegistry::new();
        let descr = make_property(Value::Int(5), false);
        let a = synthesize(&mut reg, "A", vec![], vec![("x", descr)]);
        let inst = make_instance(a);
        assert_eq!(get_attr(&reg, &inst, "x").unwrap(), Some(Value::Int(5)));
    }

    #[test]
    fn test_data_descriptor_intercepts_write() {
        let mut reg = TypeRegistry::new();
        let descr = make_property(Value::Int(0), true);
        let a = synthesize(&mut reg, "A", vec![], vec![("x", descr)]);
        let inst = make_instance(a);
        set_attr(&reg, &inst, "x", Value::Int(123)).unwrap();
        assert_eq!(get_attr(&reg, &inst, "x").unwrap(), Some(Value::Int(123)));
        // the instance store stayed empty
        if let Value::Object(o) = &inst {
            assert_eq!(o.get_attr("x"), None);
        }
    }

    #[test]
    fn test_native_method_binds_receiver() {
        let reg = TypeRegistry::new();
        let s = make_string("hello".to_string());
        let bound = get_attr(&reg, &s, "upper").unwrap().unwrap();
        assert!(matches!(
            value_data(&bound),
            Some(ObjectData::BoundMethod { .. })
        ));
    }

    #[test]
    fn test_class_dict_function_binds_on_instance() {
        let mut reg = TypeRegistry::new();
        let a = synthesize(&mut reg, "A", vec![], vec![("f", make_function(3))]);
        let inst = make_instance(a);
        let bound = get_attr(&reg, &inst, "f").unwrap().unwrap();
        match value_data(&bound) {
            Some(ObjectData::BoundMethod { callee, .. }) => {
                assert!(matches!(callee, Callee::Function(3)));
            }
            other => panic!("expected bound method, got {:?}", other),
        }
    }

    #[test]
    fn test_class_dict_function_wins_over_native_wrapper() {
        // a class inherits an "mro" function through its MRO while its
        // dynamic type (type) owns the native mro(); the function wins
        let mut reg = TypeRegistry::new();
        let base = synthesize(&mut reg, "Base", vec![], vec![("mro", make_function(9))]);
        let d = synthesize(&mut reg, "D", vec![make_type(base)], vec![]);
        let cls = make_type(d);
        let got = get_attr(&reg, &cls, "mro").unwrap().unwrap();
        match value_data(&got) {
            Some(ObjectData::BoundMethod { callee, .. }) => {
                assert!(matches!(callee, Callee::Function(9)));
            }
            other => panic!("expected bound function, got {:?}", other),
        }
    }

    #[test]
    fn test_native_wrapper_served_when_no_function_candidate() {
        let reg = TypeRegistry::new();
        let cls = make_type(TYPE_OBJECT);
        let got = get_attr(&reg, &cls, "mro").unwrap().unwrap();
        match value_data(&got) {
            Some(ObjectData::BoundMethod { callee, .. }) => {
                assert!(matches!(callee, Callee::Native(_)));
            }
            other => panic!("expected bound native method, got {:?}", other),
        }
    }

    #[test]
    fn test_slice_field_loading() {
        let reg = TypeRegistry::new();
        let s = make_slice(Value::Int(1), Value::Int(4), Value::None);
        assert_eq!(get_attr(&reg, &s, "start").unwrap(), Some(Value::Int(1)));
        assert_eq!(get_attr(&reg, &s, "stop").unwrap(), Some(Value::Int(4)));
        assert_eq!(get_attr(&reg, &s, "step").unwrap(), Some(Value::None));
    }

    #[test]
    fn test_type_object_fields() {
        let reg = TypeRegistry::new();
        let t = make_type(TYPE_STR);
        assert_eq!(
            get_attr(&reg, &t, "__name__").unwrap(),
            Some(make_string("str".to_string()))
        );
        let mro = get_attr(&reg, &t, "__mro__").unwrap().unwrap();
        if let Some(ObjectData::Tuple { items }) = value_data(&mro) {
            assert_eq!(items.first(), Some(&make_type(TYPE_STR)));
            assert_eq!(items.last(), Some(&make_type(TYPE_OBJECT)));
        } else {
            panic!("__mro__ is not a tuple");
        }
    }

    #[test]
    fn test_class_object_serves_own_member_table() {
        let mut reg = TypeRegistry::new();
        let a = synthesize(&mut reg, "A", vec![], vec![("tag", Value::Int(8))]);
        let cls = make_type(a);
        assert_eq!(get_attr(&reg, &cls, "tag").unwrap(), Some(Value::Int(8)));
    }

    #[test]
    fn test_class_object_inherits_through_mro() {
        let mut reg = TypeRegistry::new();
        let a = synthesize(&mut reg, "A", vec![], vec![("tag", Value::Int(8))]);
        let b = synthesize(&mut reg, "B", vec![make_type(a)], vec![]);
        let cls = make_type(b);
        assert_eq!(get_attr(&reg, &cls, "tag").unwrap(), Some(Value::Int(8)));
    }

    #[test]
    fn test_write_to_immutable_builtin_fails() {
        let reg = TypeRegistry::new();
        let s = make_string("abc".to_string());
        assert!(set_attr(&reg, &s, "x", Value::Int(1)).is_err());
    }
}
