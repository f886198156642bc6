// Instruction execution.
//
// One method per opcode family; `execute_instruction` is the dispatch
// point called from the run loop.

use super::{Vm, VmErrorKind, VmResult, err};
use crate::vm::attribute::{get_attr, set_attr};
use crate::vm::bytecode::{Module, Value};
use crate::vm::decoder::Instruction;
use crate::vm::native_methods::call_native_method;
use crate::vm::opcode::{Opcode, cmp};
use crate::vm::slice::expand_slice;
use crate::vm::type_def::TYPE_TYPE;
use crate::vm::utils::{
    expect_str, is_truthy, make_dict, make_function, make_instance, make_list, make_slice,
    make_string, make_tuple, slice_bounds, type_id_of, type_name,
};
use crate::vm::value::{Callee, DictKey, ObjectData};
use std::collections::HashMap;

pub(super) enum ExecutionFlow {
    Continue,
    /// Transfer to a byte offset in the current unit.
    Jump(usize),
    Return(Value),
}

impl Vm {
    pub(super) fn execute_instruction(
        &mut self,
        ins: &Instruction,
        next_pos: usize,
        module: &Module,
    ) -> VmResult<ExecutionFlow> {
        use Opcode as Op;
        match ins.opcode {
            Op::Nop => {}
            Op::PopTop => {
                self.pop()?;
            }
            Op::RotTwo => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(a)?;
                self.push(b)?;
            }
            Op::DupTop => {
                let v = self.pop()?;
                self.push(v.clone())?;
                self.push(v)?;
            }

            Op::UnaryPositive => {
                let v = self.pop()?;
                match v {
                    Value::Int(_) | Value::Float(_) => self.push(v)?,
                    Value::Bool(b) => self.push(Value::Int(b as i64))?,
                    _ => return Err(self.type_error("number", &v)),
                }
            }
            Op::UnaryNegative => {
                let v = self.pop()?;
                match v {
                    Value::Int(i) => self.push(Value::Int(-i))?,
                    Value::Float(f) => self.push(Value::Float(-f))?,
                    Value::Bool(b) => self.push(Value::Int(-(b as i64)))?,
                    _ => return Err(self.type_error("number", &v)),
                }
            }
            Op::UnaryNot => {
                let v = self.pop()?;
                self.push(Value::Bool(!is_truthy(&v)))?;
            }

            Op::BinaryAdd
            | Op::BinarySubtract
            | Op::BinaryMultiply
            | Op::BinaryModulo
            | Op::BinaryFloorDivide
            | Op::BinaryTrueDivide => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let out = self.binary_op(ins.opcode, lhs, rhs)?;
                self.push(out)?;
            }
            Op::BinarySubscr => {
                let index = self.pop()?;
                let container = self.pop()?;
                let out = self.subscript(&container, &index)?;
                self.push(out)?;
            }

            Op::CompareOp => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let out = self.compare(ins.arg()?, &lhs, &rhs)?;
                self.push(Value::Bool(out))?;
            }

            Op::LoadConst => {
                let ix = ins.arg()? as usize;
                let c = module.consts.get(ix).cloned().ok_or_else(|| {
                    err(
                        VmErrorKind::MalformedBytecode,
                        format!("constant index {} out of range", ix),
                    )
                })?;
                self.push(c)?;
            }

            Op::LoadName | Op::LoadGlobal => {
                let name = self.name_at(module, ins.arg()?)?;
                let v = self.globals.get(&name).cloned().ok_or_else(|| {
                    err(
                        VmErrorKind::UndefinedName(name.clone()),
                        format!("name '{}' is not defined", name),
                    )
                })?;
                self.push(v)?;
            }
            Op::StoreName | Op::StoreGlobal => {
                let name = self.name_at(module, ins.arg()?)?;
                let v = self.pop()?;
                self.globals.insert(name, v);
            }
            Op::LoadFast => {
                let v = self.get_local(ins.arg()?)?;
                self.push(v)?;
            }
            Op::StoreFast => {
                let v = self.pop()?;
                self.set_local(ins.arg()?, v)?;
            }

            Op::LoadAttr => {
                let name = self.name_at(module, ins.arg()?)?;
                let obj = self.pop()?;
                let v = get_attr(&self.registry, &obj, &name)?.ok_or_else(|| {
                    err(
                        VmErrorKind::AttributeError(name.clone()),
                        format!(
                            "'{}' object has no attribute '{}'",
                            type_name(&self.registry, &obj),
                            name
                        ),
                    )
                })?;
                self.push(v)?;
            }
            Op::StoreAttr => {
                let name = self.name_at(module, ins.arg()?)?;
                let obj = self.pop()?;
                let value = self.pop()?;
                set_attr(&self.registry, &obj, &name, value)?;
            }

            Op::BuildTuple => {
                let items = self.pop_n(ins.arg()? as usize)?;
                self.push(make_tuple(items))?;
            }
            Op::BuildList => {
                let items = self.pop_n(ins.arg()? as usize)?;
                self.push(make_list(items))?;
            }
            Op::BuildMap => {
                let mut flat = self.pop_n(ins.arg()? as usize * 2)?;
                let mut pairs = Vec::with_capacity(flat.len() / 2);
                while !flat.is_empty() {
                    let value = flat.pop().ok_or_else(|| {
                        err(VmErrorKind::StackUnderflow, "stack underflow".into())
                    })?;
                    let key = flat.pop().ok_or_else(|| {
                        err(VmErrorKind::StackUnderflow, "stack underflow".into())
                    })?;
                    let key = DictKey::from_value(&key).ok_or_else(|| self.type_error("hashable key", &key))?;
                    pairs.push((key, value));
                }
                self.push(make_dict(pairs))?;
            }
            Op::BuildSlice => {
                let argc = ins.arg()?;
                if argc != 2 && argc != 3 {
                    return Err(err(
                        VmErrorKind::MalformedBytecode,
                        format!("BUILD_SLICE argument must be 2 or 3, got {}", argc),
                    ));
                }
                let step = if argc == 3 { self.pop()? } else { Value::None };
                let stop = self.pop()?;
                let start = self.pop()?;
                self.push(make_slice(start, stop, step))?;
            }

            Op::JumpAbsolute => return Ok(ExecutionFlow::Jump(ins.arg()? as usize)),
            Op::JumpForward => {
                return Ok(ExecutionFlow::Jump(next_pos + ins.arg()? as usize));
            }
            Op::PopJumpIfFalse => {
                let v = self.pop()?;
                if !is_truthy(&v) {
                    return Ok(ExecutionFlow::Jump(ins.arg()? as usize));
                }
            }
            Op::PopJumpIfTrue => {
                let v = self.pop()?;
                if is_truthy(&v) {
                    return Ok(ExecutionFlow::Jump(ins.arg()? as usize));
                }
            }

            Op::MakeFunction => {
                let func_id = ins.arg()?;
                if func_id as usize >= module.functions.len() {
                    return Err(err(
                        VmErrorKind::MalformedBytecode,
                        format!("no code unit #{}", func_id),
                    ));
                }
                self.push(make_function(func_id as u16))?;
            }
            Op::CallFunction => {
                return self.call_function(ins.arg()?, module);
            }

            Op::ReturnValue => {
                let v = self.pop()?;
                return Ok(ExecutionFlow::Return(v));
            }

            Op::ExtendedArg => {
                // the decoder folds prefixes; one can only get here through
                // a corrupted stream
                return Err(err(
                    VmErrorKind::MalformedBytecode,
                    "stray EXTENDED_ARG".into(),
                ));
            }
        }
        Ok(ExecutionFlow::Continue)
    }

    // ========== calls ==========

    /// `CALL_FUNCTION` operand: positional count in the low byte, keyword
    /// pair count in the high byte. Stack layout (bottom to top): callable,
    /// positional args, then key/value pairs.
    fn call_function(&mut self, arg: u32, module: &Module) -> VmResult<ExecutionFlow> {
        let argc = (arg & 0xff) as usize;
        let kwargc = ((arg >> 8) & 0xff) as usize;

        let mut kwargs = HashMap::new();
        for _ in 0..kwargc {
            let value = self.pop()?;
            let key = self.pop()?;
            kwargs.insert(expect_str(&key)?.to_string(), value);
        }
        let args = self.pop_n(argc)?;
        let callee = self.pop()?;

        let Value::Object(obj) = &callee else {
            return Err(self.type_error("callable", &callee));
        };
        match &obj.data {
            ObjectData::Type { type_id } if *type_id == TYPE_TYPE => {
                let v = self.registry.construct_type(&args, &kwargs)?;
                self.push(v)?;
                Ok(ExecutionFlow::Continue)
            }
            ObjectData::Type { type_id } => {
                if !args.is_empty() || !kwargs.is_empty() {
                    return Err(err(
                        VmErrorKind::ArityError {
                            expected: "0".to_string(),
                            got: args.len() + kwargs.len(),
                        },
                        format!(
                            "{}() takes no arguments",
                            self.registry.type_def(*type_id).name
                        ),
                    ));
                }
                self.push(make_instance(*type_id))?;
                Ok(ExecutionFlow::Continue)
            }
            ObjectData::Function { func_id } => {
                self.reject_kwargs(&kwargs)?;
                self.enter_frame(module, *func_id as usize, args)?;
                Ok(ExecutionFlow::Continue)
            }
            ObjectData::BoundMethod {
                receiver,
                callee: bound,
                name,
            } => match bound {
                Callee::Function(func_id) => {
                    self.reject_kwargs(&kwargs)?;
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push((**receiver).clone());
                    full.extend(args);
                    self.enter_frame(module, *func_id as usize, full)?;
                    Ok(ExecutionFlow::Continue)
                }
                Callee::Native(method) => {
                    self.reject_kwargs(&kwargs)?;
                    self.check_native_arity(receiver, name, args.len())?;
                    let out = call_native_method(&self.registry, *method, receiver, args)?;
                    self.push(out)?;
                    Ok(ExecutionFlow::Continue)
                }
            },
            _ => Err(self.type_error("callable", &callee)),
        }
    }

    fn reject_kwargs(&self, kwargs: &HashMap<String, Value>) -> VmResult<()> {
        if kwargs.is_empty() {
            Ok(())
        } else {
            Err(err(
                VmErrorKind::UsageError,
                "keyword arguments are only supported by type()".into(),
            ))
        }
    }

    /// Checks the declared arity of a native method before dispatch, using
    /// the dispatch table of the receiver's type (or of the builtin that
    /// implements its payload).
    fn check_native_arity(&self, receiver: &Value, name: &str, got: usize) -> VmResult<()> {
        let tid = type_id_of(receiver);
        let slot = self
            .registry
            .type_def(tid)
            .methods
            .get(name)
            .copied()
            .or_else(|| {
                let owner = self.registry.type_def(tid).repr.builtin_owner();
                self.registry.type_def(owner).methods.get(name).copied()
            });
        let Some(slot) = slot else {
            return Ok(());
        };
        if slot.arity.check(got) {
            Ok(())
        } else {
            Err(err(
                VmErrorKind::ArityError {
                    expected: slot.arity.description(),
                    got,
                },
                format!(
                    "{}() takes {} argument(s) but {} given",
                    name,
                    slot.arity.description(),
                    got
                ),
            ))
        }
    }

    // ========== operators ==========

    fn binary_op(&self, op: Opcode, lhs: Value, rhs: Value) -> VmResult<Value> {
        use Opcode as Op;
        // bool participates in arithmetic as 0/1
        let lhs = widen_bool(lhs);
        let rhs = widen_bool(rhs);
        match (op, &lhs, &rhs) {
            (Op::BinaryAdd, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Op::BinarySubtract, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            (Op::BinaryMultiply, Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            (Op::BinaryModulo, Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(self.zero_division("modulo"));
                }
                Ok(Value::Int(a.rem_euclid(*b)))
            }
            (Op::BinaryFloorDivide, Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(self.zero_division("division"));
                }
                Ok(Value::Int(a.div_euclid(*b)))
            }
            (Op::BinaryTrueDivide, Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    return Err(self.zero_division("division"));
                }
                Ok(Value::Float(*a as f64 / *b as f64))
            }

            (_, Value::Float(_), _) | (_, _, Value::Float(_)) => {
                let a = as_f64(&lhs).ok_or_else(|| self.type_error("number", &lhs))?;
                let b = as_f64(&rhs).ok_or_else(|| self.type_error("number", &rhs))?;
                match op {
                    Op::BinaryAdd => Ok(Value::Float(a + b)),
                    Op::BinarySubtract => Ok(Value::Float(a - b)),
                    Op::BinaryMultiply => Ok(Value::Float(a * b)),
                    Op::BinaryModulo => {
                        if b == 0.0 {
                            return Err(self.zero_division("modulo"));
                        }
                        Ok(Value::Float(a.rem_euclid(b)))
                    }
                    Op::BinaryFloorDivide => {
                        if b == 0.0 {
                            return Err(self.zero_division("division"));
                        }
                        Ok(Value::Float((a / b).floor()))
                    }
                    Op::BinaryTrueDivide => {
                        if b == 0.0 {
                            return Err(self.zero_division("division"));
                        }
                        Ok(Value::Float(a / b))
                    }
                    _ => unreachable!(),
                }
            }

            (Op::BinaryAdd, Value::Object(a), Value::Object(b)) => match (&a.data, &b.data) {
                (ObjectData::Str(s1), ObjectData::Str(s2)) => {
                    Ok(make_string(format!("{}{}", s1, s2)))
                }
                (ObjectData::List { items: i1 }, ObjectData::List { items: i2 }) => {
                    let mut out = i1.borrow().clone();
                    out.extend(i2.borrow().iter().cloned());
                    Ok(make_list(out))
                }
                _ => Err(self.type_error("operands", &lhs)),
            },

            _ => Err(self.type_error("operands", &lhs)),
        }
    }

    fn compare(&self, op: u32, lhs: &Value, rhs: &Value) -> VmResult<bool> {
        match op {
            cmp::EQ => Ok(lhs == rhs),
            cmp::NE => Ok(lhs != rhs),
            cmp::LT | cmp::LE | cmp::GT | cmp::GE => {
                let ord = order(lhs, rhs).ok_or_else(|| self.type_error("orderable", lhs))?;
                Ok(match op {
                    cmp::LT => ord.is_lt(),
                    cmp::LE => ord.is_le(),
                    cmp::GT => ord.is_gt(),
                    _ => ord.is_ge(),
                })
            }
            _ => Err(err(
                VmErrorKind::MalformedBytecode,
                format!("unknown comparison operand {}", op),
            )),
        }
    }

    // ========== subscription ==========

    fn subscript(&self, container: &Value, index: &Value) -> VmResult<Value> {
        let Value::Object(obj) = container else {
            return Err(self.type_error("subscriptable", container));
        };
        // slice index: expand once, gather in traversal order
        if matches!(index, Value::Object(o) if matches!(o.data, ObjectData::Slice { .. })) {
            return self.subscript_slice(container, index);
        }
        match &obj.data {
            ObjectData::List { items } => {
                let items = items.borrow();
                let at = self.wrap_index(index, items.len())?;
                Ok(items[at].clone())
            }
            ObjectData::Tuple { items } => {
                let at = self.wrap_index(index, items.len())?;
                Ok(items[at].clone())
            }
            ObjectData::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let at = self.wrap_index(index, chars.len())?;
                Ok(make_string(chars[at].to_string()))
            }
            ObjectData::Dict { map } => {
                let key = DictKey::from_value(index)
                    .ok_or_else(|| self.type_error("hashable key", index))?;
                map.borrow().get(&key).cloned().ok_or_else(|| {
                    err(
                        VmErrorKind::KeyError(format!("{:?}", key)),
                        format!("key {:?} not found", key),
                    )
                })
            }
            _ => Err(self.type_error("subscriptable", container)),
        }
    }

    fn subscript_slice(&self, container: &Value, slice: &Value) -> VmResult<Value> {
        let Value::Object(obj) = container else {
            return Err(self.type_error("subscriptable", container));
        };
        let (start, stop, step) = slice_bounds(slice)?;
        let gather = |len: usize| expand_slice(len as i64, start, stop, step);
        match &obj.data {
            ObjectData::List { items } => {
                let items = items.borrow();
                let picked = gather(items.len())?
                    .into_iter()
                    .map(|i| items[i as usize].clone())
                    .collect();
                Ok(make_list(picked))
            }
            ObjectData::Tuple { items } => {
                let picked = gather(items.len())?
                    .into_iter()
                    .map(|i| items[i as usize].clone())
                    .collect();
                Ok(make_tuple(picked))
            }
            ObjectData::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked: String = gather(chars.len())?
                    .into_iter()
                    .map(|i| chars[i as usize])
                    .collect();
                Ok(make_string(picked))
            }
            _ => Err(self.type_error("sliceable", container)),
        }
    }

    /// Integer index with negative wrap; out of range is an error.
    fn wrap_index(&self, index: &Value, len: usize) -> VmResult<usize> {
        let mut at = match index {
            Value::Int(i) => *i,
            Value::Bool(b) => *b as i64,
            _ => return Err(self.type_error("int index", index)),
        };
        if at < 0 {
            at += len as i64;
        }
        if at < 0 || at >= len as i64 {
            return Err(err(
                VmErrorKind::IndexError,
                format!("index {} out of range for length {}", at, len),
            ));
        }
        Ok(at as usize)
    }

    // ========== error helpers ==========

    fn name_at(&self, module: &Module, ix: u32) -> VmResult<String> {
        module.names.get(ix as usize).cloned().ok_or_else(|| {
            err(
                VmErrorKind::MalformedBytecode,
                format!("name index {} out of range", ix),
            )
        })
    }

    fn type_error(&self, expected: &'static str, got: &Value) -> super::VmError {
        err(
            VmErrorKind::TypeError(expected),
            format!(
                "expected {}, got {}",
                expected,
                type_name(&self.registry, got)
            ),
        )
    }

    fn zero_division(&self, what: &str) -> super::VmError {
        err(
            VmErrorKind::ZeroDivision,
            format!("{} by zero", what),
        )
    }
}

fn widen_bool(v: Value) -> Value {
    match v {
        Value::Bool(b) => Value::Int(b as i64),
        other => other,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn order(lhs: &Value, rhs: &Value) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Value::Object(a), Value::Object(b)) => match (&a.data, &b.data) {
            (ObjectData::Str(s1), ObjectData::Str(s2)) => Some(s1.cmp(s2)),
            _ => None,
        },
        _ => {
            let a = as_f64(&widen_bool(lhs.clone()))?;
            let b = as_f64(&widen_bool(rhs.clone()))?;
            a.partial_cmp(&b)
        }
    }
}
