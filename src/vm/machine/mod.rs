// Execution engine.
//
// The machine drives a `ByteCodeReader` over the current frame's code
// unit. Instruction pointers are byte offsets; control transfers seek the
// reader to a recorded instruction boundary.

use crate::vm::bytecode::{Module, Value};
use crate::vm::decoder::ByteCodeReader;
use crate::vm::type_def::TypeRegistry;
use std::collections::HashMap;

mod instruction;


// ========== errors ==========

#[derive(Debug)]
pub enum VmErrorKind {
    TypeError(&'static str),
    ZeroDivision,
    ArityError { expected: String, got: usize },
    UndefinedName(String),
    AttributeError(String),
    IndexError,
    KeyError(String),
    StackUnderflow,
    StackOverflow,
    MalformedBytecode,
    UnknownOpcode(u8),
    MroConflict,
    UnsatisfiableSlice,
    UsageError,
}

#[derive(Debug)]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
}

pub type VmResult<T> = Result<T, VmError>;

pub fn err(kind: VmErrorKind, message: String) -> VmError {
    VmError { kind, message }
}

// ========== frames ==========

#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Byte offset of the next instruction in the unit's code.
    pub ip: usize,
    pub func_id: usize,
    pub ret_stack_size: usize,
    pub locals: Vec<Value>,
}

pub struct Vm {
    pub stack: Vec<Value>,
    pub frames: Vec<Frame>,
    pub globals: HashMap<String, Value>,
    pub registry: TypeRegistry,
    pub max_stack: usize,
    pub max_frames: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        let registry = TypeRegistry::new();
        // every builtin class object is reachable by its type name
        let mut globals = HashMap::new();
        for tid in 0..registry.len() as u16 {
            globals.insert(
                registry.type_def(tid).name.clone(),
                crate::vm::utils::make_type(tid),
            );
        }
        Self {
            stack: Vec::with_capacity(128),
            frames: Vec::with_capacity(32),
            globals,
            registry,
            max_stack: 1024,
            max_frames: 256,
        }
    }

    /// Runs unit 0 of `module` to completion and returns its value.
    pub fn run(&mut self, module: &Module) -> VmResult<Option<Value>> {
        if module.functions.is_empty() {
            return Ok(None);
        }
        self.enter_frame(module, 0, Vec::new())?;
        loop {
            let (func_id, ip) = {
                let f = match self.frames.last() {
                    Some(f) => f,
                    None => return Ok(None),
                };
                (f.func_id, f.ip)
            };
            let code = &module.functions[func_id].code;

            let mut reader = ByteCodeReader::new(code);
            reader.seek(ip);
            let Some(ins) = reader.decode_next()? else {
                // fell off the end of the unit: implicit None return
                if let Some(v) = self.leave_frame(None)? {
                    return Ok(Some(v));
                }
                continue;
            };
            let next_pos = reader.position();
            if let Some(f) = self.frames.last_mut() {
                f.ip = next_pos;
            }

            use instruction::ExecutionFlow;
            match self.execute_instruction(&ins, next_pos, module)? {
                ExecutionFlow::Continue => {}
                ExecutionFlow::Jump(target) => {
                    if let Some(f) = self.frames.last_mut() {
                        f.ip = target;
                    }
                }
                ExecutionFlow::Return(ret) => {
                    if let Some(v) = self.leave_frame(Some(ret))? {
                        return Ok(Some(v));
                    }
                }
            }
        }
    }

    // ========== stack operations ==========

    fn push(&mut self, v: Value) -> VmResult<()> {
        if self.stack.len() >= self.max_stack {
            return Err(err(VmErrorKind::StackOverflow, "stack overflow".into()));
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "stack underflow".into()))
    }

    fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(err(VmErrorKind::StackUnderflow, "stack underflow".into()));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    // ========== frame management ==========

    fn enter_frame(&mut self, module: &Module, func_id: usize, args: Vec<Value>) -> VmResult<()> {
        if self.frames.len() >= self.max_frames {
            return Err(err(VmErrorKind::StackOverflow, "frame overflow".into()));
        }
        let unit = module.functions.get(func_id).ok_or_else(|| {
            err(
                VmErrorKind::MalformedBytecode,
                format!("no code unit #{}", func_id),
            )
        })?;
        if args.len() != unit.arity as usize {
            return Err(err(
                VmErrorKind::ArityError {
                    expected: unit.arity.to_string(),
                    got: args.len(),
                },
                format!(
                    "{}() takes {} argument(s) but {} given",
                    unit.name,
                    unit.arity,
                    args.len()
                ),
            ));
        }
        let num_locals = (unit.num_locals as usize).max(args.len());
        let mut locals = vec![Value::None; num_locals];
        for (i, arg) in args.into_iter().enumerate() {
            locals[i] = arg;
        }
        self.frames.push(Frame {
            ip: 0,
            func_id,
            ret_stack_size: self.stack.len(),
            locals,
        });
        Ok(())
    }

    /// Pops the current frame, discarding any operands it leaked. A frame
    /// that fell off the end of its unit returns `None` implicitly.
    ///
    /// Returns `Some(value)` when the popped frame was the last one (the
    /// run is over), `None` when execution continues in the caller with
    /// the value pushed.
    fn leave_frame(&mut self, ret: Option<Value>) -> VmResult<Option<Value>> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "no frame".into()))?;
        self.stack.truncate(frame.ret_stack_size);
        let ret = ret.unwrap_or(Value::None);
        if self.frames.is_empty() {
            return Ok(Some(ret));
        }
        self.push(ret)?;
        Ok(None)
    }

    fn get_local(&self, ix: u32) -> VmResult<Value> {
        let f = self
            .frames
            .last()
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "no frame".into()))?;
        f.locals.get(ix as usize).cloned().ok_or_else(|| {
            err(
                VmErrorKind::MalformedBytecode,
                format!("invalid local index {}", ix),
            )
        })
    }

    fn set_local(&mut self, ix: u32, v: Value) -> VmResult<()> {
        let f = self
            .frames
            .last_mut()
            .ok_or_else(|| err(VmErrorKind::StackUnderflow, "no frame".into()))?;
        let slot = f.locals.get_mut(ix as usize).ok_or_else(|| {
            err(
                VmErrorKind::MalformedBytecode,
                format!("invalid local index {}", ix),
            )
        })?;
        *slot = v;
        Ok(())
    }
}
