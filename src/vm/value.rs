//! Runtime object representation.
//!
//! Every heap value is an [`Object`]: a `type_id` into the type registry,
//! a native payload ([`ObjectData`]) and an optional instance attribute
//! store. Primitives live directly in [`Value`](super::bytecode::Value).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::bytecode::Value;
use super::type_def::NativeMethod;

/// Unified heap object, the analogue of a PyObject.
#[derive(Debug)]
pub struct Object {
    /// Index into the [`TypeRegistry`](super::type_def::TypeRegistry).
    pub type_id: u16,

    /// Native payload of the concrete representation.
    pub data: ObjectData,

    /// Instance attribute store (`__dict__`). Allocated only for objects
    /// that can carry per-instance state.
    pub attributes: Option<RefCell<HashMap<String, Value>>>,
}

impl Object {
    pub fn new(type_id: u16, data: ObjectData) -> Self {
        Self {
            type_id,
            data,
            attributes: None,
        }
    }

    pub fn new_with_attrs(type_id: u16, data: ObjectData) -> Self {
        Self {
            type_id,
            data,
            attributes: Some(RefCell::new(HashMap::new())),
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attributes
            .as_ref()
            .and_then(|attrs| attrs.borrow().get(name).cloned())
    }

    /// Stores into the instance attribute store. Returns `false` when the
    /// object has no store (immutable builtins).
    pub fn set_attr(&self, name: String, value: Value) -> bool {
        match &self.attributes {
            Some(attrs) => {
                attrs.borrow_mut().insert(name, value);
                true
            }
            None => false,
        }
    }
}

/// What a bound method ultimately calls.
#[derive(Debug, Clone)]
pub enum Callee {
    Native(NativeMethod),
    Function(u16),
}

#[derive(Debug)]
pub enum ObjectData {
    Str(String),

    List {
        items: RefCell<Vec<Value>>,
    },

    Tuple {
        items: Vec<Value>,
    },

    Dict {
        map: RefCell<HashMap<DictKey, Value>>,
    },

    /// Slice descriptor. Fields are `Int` or `None` values; two slices
    /// compare equal only by object identity (see `Value`'s `PartialEq`).
    Slice {
        start: Value,
        stop: Value,
        step: Value,
    },

    /// A class object referencing its registry entry.
    Type {
        type_id: u16,
    },

    /// User-defined function (bytecode unit id).
    Function {
        func_id: u16,
    },

    /// Method wrapper produced by attribute lookup.
    BoundMethod {
        receiver: Box<Value>,
        callee: Callee,
        name: String,
    },

    /// Class-level managed attribute. With `data` set it is a data
    /// descriptor: reads win over instance storage and writes go to the
    /// cell. Without it, reads yield the cell but instance storage wins.
    Property {
        cell: RefCell<Value>,
        data: bool,
    },

    /// Plain user-class instance; all state lives in `attributes`.
    Instance,
}

/// Dict key wrapper (hashable values only). Class objects hash by their
/// registry identity.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum DictKey {
    Int(i64),
    Str(String),
    Bool(bool),
    Type(u16),
}

impl DictKey {
    pub fn from_value(v: &Value) -> Option<DictKey> {
        match v {
            Value::Int(i) => Some(DictKey::Int(*i)),
            Value::Bool(b) => Some(DictKey::Bool(*b)),
            Value::Object(obj) => match &obj.data {
                ObjectData::Str(s) => Some(DictKey::Str(s.clone())),
                ObjectData::Type { type_id } => Some(DictKey::Type(*type_id)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Shorthand for wrapping an [`Object`] into a [`Value`].
pub fn object_value(obj: Object) -> Value {
    Value::Object(Rc::new(obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::type_def::TYPE_STR;

    #[test]
    fn test_object_creation() {
        let obj = Object::new(TYPE_STR, ObjectData::Str("hello".to_string()));
        assert_eq!(obj.type_id, TYPE_STR);
        assert!(matches!(obj.data, ObjectData::Str(_)));
        assert!(obj.attributes.is_none());
    }

    #[test]
    fn test_instance_attribute_store() {
        let obj = Object::new_with_attrs(100, ObjectData::Instance);
        assert!(obj.attributes.is_some());
        assert!(obj.set_attr("x".to_string(), Value::Int(42)));
        assert_eq!(obj.get_attr("x"), Some(Value::Int(42)));
        assert_eq!(obj.get_attr("y"), None);
    }

    #[test]
    fn test_no_store_on_plain_objects() {
        let obj = Object::new(TYPE_STR, ObjectData::Str("s".to_string()));
        assert!(!obj.set_attr("x".to_string(), Value::Int(1)));
    }

    #[test]
    fn test_dict_key_from_value() {
        assert_eq!(DictKey::from_value(&Value::Int(3)), Some(DictKey::Int(3)));
        assert_eq!(
            DictKey::from_value(&Value::Bool(true)),
            Some(DictKey::Bool(true))
        );
        assert_eq!(DictKey::from_value(&Value::Float(1.0)), None);
    }

    #[test]
    fn test_class_objects_are_hashable_keys() {
        let cls = object_value(Object::new(
            crate::vm::type_def::TYPE_TYPE,
            ObjectData::Type { type_id: TYPE_STR },
        ));
        assert_eq!(DictKey::from_value(&cls), Some(DictKey::Type(TYPE_STR)));
    }
}
