//! Rust-implemented methods of the builtin types.
//!
//! Dispatch is a closed enum match; each type's registry entry lists which
//! of these methods it exposes, so lookup never involves reflection.

use super::mro::mro_of;
use super::slice::expand_slice;
use super::type_def::{NativeMethod, TypeRegistry};
use super::utils::{
    as_type, expect_int, expect_list, expect_str, make_list, make_string, make_type, slice_bounds,
};
use super::value::ObjectData;
use super::{VmError, VmErrorKind, err};
use crate::vm::bytecode::Value;

pub type NativeResult = Result<Value, NativeError>;

#[derive(Debug, Clone)]
pub struct NativeError {
    pub message: String,
}

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn type_error(expected: &str, got: &str) -> Self {
        Self::new(format!("expected {}, got {}", expected, got))
    }

    pub fn arity_error(method: &str, expected: usize, got: usize) -> Self {
        Self::new(format!(
            "{} takes {} argument(s) but {} given",
            method, expected, got
        ))
    }
}

impl From<NativeError> for VmError {
    fn from(e: NativeError) -> Self {
        err(VmErrorKind::TypeError("native method"), e.message)
    }
}

/// Calls one native method on `receiver`.
pub fn call_native_method(
    reg: &TypeRegistry,
    method: NativeMethod,
    receiver: &Value,
    args: Vec<Value>,
) -> NativeResult {
    match method {
        NativeMethod::StrUpper => str_upper(receiver, args),
        NativeMethod::StrLower => str_lower(receiver, args),
        NativeMethod::StrFind => str_find(receiver, args),
        NativeMethod::ListAppend => list_append(receiver, args),
        NativeMethod::ListPop => list_pop(receiver, args),
        NativeMethod::SliceIndices => slice_indices(receiver, args),
        NativeMethod::TypeMro => type_mro(reg, receiver, args),
    }
}

// ========== helpers ==========

fn expect_string(v: &Value) -> Result<&str, NativeError> {
    expect_str(v).map_err(|_| NativeError::type_error("str", "other type"))
}

fn expect_integer(v: &Value) -> Result<i64, NativeError> {
    expect_int(v).map_err(|_| NativeError::type_error("int", "other type"))
}

// ========== str methods ==========

fn str_upper(receiver: &Value, args: Vec<Value>) -> NativeResult {
    if !args.is_empty() {
        return Err(NativeError::arity_error("str.upper()", 0, args.len()));
    }
    let s = expect_string(receiver)?;
    Ok(make_string(s.to_uppercase()))
}

fn str_lower(receiver: &Value, args: Vec<Value>) -> NativeResult {
    if !args.is_empty() {
        return Err(NativeError::arity_error("str.lower()", 0, args.len()));
    }
    let s = expect_string(receiver)?;
    Ok(make_string(s.to_lowercase()))
}

fn str_find(receiver: &Value, args: Vec<Value>) -> NativeResult {
    if args.len() != 1 {
        return Err(NativeError::arity_error("str.find()", 1, args.len()));
    }
    let haystack = expect_string(receiver)?;
    let needle = expect_string(&args[0])?;
    // byte offsets; the VM's strings are indexed the same way
    Ok(match haystack.find(needle) {
        Some(at) => Value::Int(at as i64),
        None => Value::Int(-1),
    })
}

// ========== list methods ==========

fn list_append(receiver: &Value, mut args: Vec<Value>) -> NativeResult {
    if args.len() != 1 {
        return Err(NativeError::arity_error("list.append()", 1, args.len()));
    }
    let obj = expect_list(receiver).map_err(|_| NativeError::type_error("list", "other type"))?;
    let ObjectData::List { items } = &obj.data else {
        unreachable!()
    };
    items.borrow_mut().push(args.remove(0));
    Ok(Value::None)
}

fn list_pop(receiver: &Value, args: Vec<Value>) -> NativeResult {
    if args.len() > 1 {
        return Err(NativeError::arity_error("list.pop()", 1, args.len()));
    }
    let obj = expect_list(receiver).map_err(|_| NativeError::type_error("list", "other type"))?;
    let ObjectData::List { items } = &obj.data else {
        unreachable!()
    };
    let mut items = items.borrow_mut();
    let len = items.len() as i64;
    if len == 0 {
        return Err(NativeError::new("pop from empty list"));
    }
    let mut at = match args.first() {
        Some(v) => expect_integer(v)?,
        None => len - 1,
    };
    if at < 0 {
        at += len;
    }
    if at < 0 || at >= len {
        return Err(NativeError::new("pop index out of range"));
    }
    Ok(items.remove(at as usize))
}

// ========== slice methods ==========

/// `s.indices(size)`: the in-range element indices the slice selects over a
/// sequence of that size, in traversal order.
fn slice_indices(receiver: &Value, args: Vec<Value>) -> NativeResult {
    if args.len() != 1 {
        return Err(NativeError::arity_error("slice.indices()", 1, args.len()));
    }
    let (start, stop, step) =
        slice_bounds(receiver).map_err(|_| NativeError::type_error("slice", "other type"))?;
    let size = expect_integer(&args[0])?;
    if size < 0 {
        return Err(NativeError::new("size must be non-negative"));
    }
    let indices = expand_slice(size, start, stop, step).map_err(|e| NativeError::new(e.message))?;
    Ok(make_list(indices.into_iter().map(Value::Int).collect()))
}

// ========== type methods ==========

fn type_mro(reg: &TypeRegistry, receiver: &Value, args: Vec<Value>) -> NativeResult {
    if !args.is_empty() {
        return Err(NativeError::arity_error("type.mro()", 0, args.len()));
    }
    let Some(tid) = as_type(receiver) else {
        return Err(NativeError::type_error("type", "other type"));
    };
    let order = mro_of(reg, tid).map_err(|e| NativeError::new(e.message))?;
    Ok(make_list(order.iter().map(|&t| make_type(t)).collect()))
}
