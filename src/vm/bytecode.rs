use serde::{Deserialize, Serialize};
use std::rc::Rc;
use strum::Display;

/// Constant-pool / operand-stack value.
#[derive(Debug, Clone, Serialize, Deserialize, Display)]
pub enum Value {
    // Primitive
    Int(i64),
    Float(f64),
    Bool(bool),
    None,

    #[serde(skip)]
    Object(Rc<super::value::Object>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => *a as f64 == *b,
            (Value::Float(a), Value::Int(b)) => *a == *b as f64,
            (Value::None, Value::None) => true,
            (Value::Object(a), Value::Object(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                use super::value::ObjectData;
                match (&a.data, &b.data) {
                    // strings compare by content
                    (ObjectData::Str(s1), ObjectData::Str(s2)) => s1 == s2,
                    // types are identical iff they are the same registry entry
                    (ObjectData::Type { type_id: t1 }, ObjectData::Type { type_id: t2 }) => {
                        t1 == t2
                    }
                    // everything else, slices included, compares by identity
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

/// One compiled code unit: the raw variable-length byte stream of a
/// function body. Constants and names are module-wide pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeUnit {
    pub name: String,
    pub arity: u8,
    pub num_locals: u16,
    pub code: Vec<u8>,
}

/// Loadable module container.
///
/// This is the crate's own serialized form (bincode), not the marshal
/// format of any existing toolchain; a container reader producing it is an
/// external concern.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Module {
    /// Constant pool shared by all units.
    pub consts: Vec<Value>,

    /// Name table (attribute, global and local names).
    pub names: Vec<String>,

    /// Code units; unit 0 is the module entry point.
    pub functions: Vec<CodeUnit>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for building a single-unit module in tests and tools.
    pub fn with_entry(code: Vec<u8>, consts: Vec<Value>, names: Vec<String>) -> Self {
        Module {
            consts,
            names,
            functions: vec![CodeUnit {
                name: "<module>".to_string(),
                arity: 0,
                num_locals: 0,
                code,
            }],
        }
    }
}
