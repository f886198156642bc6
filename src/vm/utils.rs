//! VM helpers: value display, type queries, object constructors and
//! extraction functions shared across the crate.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::bytecode::Value;
use super::type_def::{
    TYPE_BOOL, TYPE_DICT, TYPE_FLOAT, TYPE_FUNCTION, TYPE_INT, TYPE_LIST, TYPE_METHOD, TYPE_NONE,
    TYPE_PROPERTY, TYPE_SLICE, TYPE_STR, TYPE_TUPLE, TYPE_TYPE, TypeRegistry,
};
use super::value::{Callee, DictKey, Object, ObjectData, object_value};
use super::{VmErrorKind, VmResult, err};

/// Dynamic type id of any value, primitives included.
pub fn type_id_of(v: &Value) -> u16 {
    match v {
        Value::Int(_) => TYPE_INT,
        Value::Float(_) => TYPE_FLOAT,
        Value::Bool(_) => TYPE_BOOL,
        Value::None => TYPE_NONE,
        Value::Object(obj) => obj.type_id,
    }
}

/// The type id a class object stands for, if `v` is a class object.
pub fn as_type(v: &Value) -> Option<u16> {
    match v {
        Value::Object(obj) => match &obj.data {
            ObjectData::Type { type_id } => Some(*type_id),
            _ => None,
        },
        _ => None,
    }
}

/// Name of a value's dynamic type.
pub fn type_name(reg: &TypeRegistry, v: &Value) -> String {
    reg.type_def(type_id_of(v)).name.clone()
}

/// Truthiness under the usual rules: zero, empty and `None` are false.
pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::Bool(b) => *b,
        Value::None => false,
        Value::Object(obj) => match &obj.data {
            ObjectData::Str(s) => !s.is_empty(),
            ObjectData::List { items } => !items.borrow().is_empty(),
            ObjectData::Tuple { items } => !items.is_empty(),
            ObjectData::Dict { map } => !map.borrow().is_empty(),
            _ => true,
        },
    }
}

/// `str()`-style rendering of a value.
pub fn display_value(reg: &TypeRegistry, v: &Value) -> String {
    match v {
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
        Value::None => "None".to_string(),
        Value::Object(obj) => match &obj.data {
            ObjectData::Str(s) => s.clone(),
            ObjectData::List { items } => {
                let contents: Vec<String> =
                    items.borrow().iter().map(|x| display_value(reg, x)).collect();
                format!("[{}]", contents.join(", "))
            }
            ObjectData::Tuple { items } => {
                let contents: Vec<String> = items.iter().map(|x| display_value(reg, x)).collect();
                format!("({})", contents.join(", "))
            }
            ObjectData::Dict { map } => {
                let contents: Vec<String> = map
                    .borrow()
                    .iter()
                    .map(|(k, val)| {
                        let key = match k {
                            DictKey::Int(i) => i.to_string(),
                            DictKey::Str(s) => format!("\"{}\"", s),
                            DictKey::Bool(b) => if *b { "True" } else { "False" }.to_string(),
                            DictKey::Type(tid) => {
                                format!("<class '{}'>", reg.type_def(*tid).name)
                            }
                        };
                        format!("{}: {}", key, display_value(reg, val))
                    })
                    .collect();
                format!("{{{}}}", contents.join(", "))
            }
            ObjectData::Slice { start, stop, step } => format!(
                "slice({}, {}, {})",
                display_value(reg, start),
                display_value(reg, stop),
                display_value(reg, step)
            ),
            ObjectData::Type { type_id } => {
                format!("<class '{}'>", reg.type_def(*type_id).name)
            }
            ObjectData::Function { func_id } => format!("<function #{}>", func_id),
            ObjectData::BoundMethod { name, .. } => format!("<bound method {}>", name),
            ObjectData::Property { .. } => "<property>".to_string(),
            ObjectData::Instance => {
                format!("<{} object>", reg.type_def(obj.type_id).name)
            }
        },
    }
}

// ========== object constructors (make_*) ==========

pub fn make_string(s: String) -> Value {
    object_value(Object::new(TYPE_STR, ObjectData::Str(s)))
}

pub fn make_list(items: Vec<Value>) -> Value {
    object_value(Object::new(
        TYPE_LIST,
        ObjectData::List {
            items: RefCell::new(items),
        },
    ))
}

pub fn make_tuple(items: Vec<Value>) -> Value {
    object_value(Object::new(TYPE_TUPLE, ObjectData::Tuple { items }))
}

pub fn make_dict(pairs: Vec<(DictKey, Value)>) -> Value {
    object_value(Object::new(
        TYPE_DICT,
        ObjectData::Dict {
            map: RefCell::new(pairs.into_iter().collect()),
        },
    ))
}

/// Fields must be `Int` or `None` values.
pub fn make_slice(start: Value, stop: Value, step: Value) -> Value {
    object_value(Object::new(
        TYPE_SLICE,
        ObjectData::Slice { start, stop, step },
    ))
}

/// Class object for a registry entry.
pub fn make_type(type_id: u16) -> Value {
    object_value(Object::new(TYPE_TYPE, ObjectData::Type { type_id }))
}

/// Fresh instance of a (user) type, with an empty attribute store.
pub fn make_instance(type_id: u16) -> Value {
    object_value(Object::new_with_attrs(type_id, ObjectData::Instance))
}

pub fn make_function(func_id: u16) -> Value {
    object_value(Object::new(TYPE_FUNCTION, ObjectData::Function { func_id }))
}

pub fn make_bound_method(receiver: Value, callee: Callee, name: String) -> Value {
    object_value(Object::new(
        TYPE_METHOD,
        ObjectData::BoundMethod {
            receiver: Box::new(receiver),
            callee,
            name,
        },
    ))
}

/// Class-level managed attribute; `data` makes it a data descriptor.
pub fn make_property(value: Value, data: bool) -> Value {
    object_value(Object::new(
        TYPE_PROPERTY,
        ObjectData::Property {
            cell: RefCell::new(value),
            data,
        },
    ))
}

// ========== extraction helpers (expect_*) ==========

pub fn expect_int(v: &Value) -> VmResult<i64> {
    match v {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(*b as i64),
        _ => Err(err(VmErrorKind::TypeError("int"), "expected int".into())),
    }
}

pub fn expect_str(v: &Value) -> VmResult<&str> {
    match v {
        Value::Object(obj) => match &obj.data {
            ObjectData::Str(s) => Ok(s.as_str()),
            _ => Err(err(
                VmErrorKind::TypeError("str"),
                "expected string object".into(),
            )),
        },
        _ => Err(err(VmErrorKind::TypeError("str"), "expected str".into())),
    }
}

pub fn expect_list(v: &Value) -> VmResult<&Rc<Object>> {
    match v {
        Value::Object(obj) if matches!(obj.data, ObjectData::List { .. }) => Ok(obj),
        _ => Err(err(VmErrorKind::TypeError("list"), "expected list".into())),
    }
}

/// Extracts `(start, stop, step)` integer bounds from a slice object.
pub fn slice_bounds(v: &Value) -> VmResult<(Option<i64>, Option<i64>, Option<i64>)> {
    let field = |f: &Value| -> VmResult<Option<i64>> {
        match f {
            Value::None => Ok(None),
            other => Ok(Some(expect_int(other)?)),
        }
    };
    match v {
        Value::Object(obj) => match &obj.data {
            ObjectData::Slice { start, stop, step } => {
                Ok((field(start)?, field(stop)?, field(step)?))
            }
            _ => Err(err(
                VmErrorKind::TypeError("slice"),
                "expected slice object".into(),
            )),
        },
        _ => Err(err(VmErrorKind::TypeError("slice"), "expected slice".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_of_primitives() {
        let reg = TypeRegistry::new();
        assert_eq!(type_name(&reg, &Value::Int(1)), "int");
        assert_eq!(type_name(&reg, &Value::Bool(true)), "bool");
        assert_eq!(type_name(&reg, &Value::None), "NoneType");
        assert_eq!(type_name(&reg, &make_string("s".into())), "str");
    }

    #[test]
    fn test_display_value() {
        let reg = TypeRegistry::new();
        assert_eq!(display_value(&reg, &Value::Int(42)), "42");
        assert_eq!(display_value(&reg, &Value::Bool(true)), "True");
        assert_eq!(display_value(&reg, &Value::None), "None");
        assert_eq!(
            display_value(&reg, &make_list(vec![Value::Int(1), Value::Int(2)])),
            "[1, 2]"
        );
        assert_eq!(display_value(&reg, &make_type(TYPE_INT)), "<class 'int'>");
        assert_eq!(
            display_value(
                &reg,
                &make_slice(Value::Int(1), Value::None, Value::Int(2))
            ),
            "slice(1, None, 2)"
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Int(0)));
        assert!(is_truthy(&Value::Int(-1)));
        assert!(!is_truthy(&Value::None));
        assert!(!is_truthy(&make_string(String::new())));
        assert!(is_truthy(&make_string("x".into())));
        assert!(!is_truthy(&make_list(vec![])));
    }

    #[test]
    fn test_slice_bounds() {
        let s = make_slice(Value::Int(1), Value::None, Value::Int(-1));
        assert_eq!(slice_bounds(&s).unwrap(), (Some(1), None, Some(-1)));
        assert!(slice_bounds(&Value::Int(3)).is_err());
    }
}
