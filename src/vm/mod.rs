#![allow(dead_code)]

pub mod attribute;
pub mod bytecode;
pub mod decoder;
pub mod disasm;
pub mod machine; // machine/ directory
pub mod mro;
pub mod native_methods;
pub mod opcode;
pub mod slice;
pub mod type_def;
pub mod utils;
pub mod value;

pub use bytecode::{CodeUnit, Module, Value};
pub use decoder::{ByteCodeReader, Instruction};
pub use machine::{Vm, VmError, VmErrorKind, VmResult, err};
pub use opcode::{EXTENDED_ARG, HAVE_ARGUMENT, Opcode, STOP_CODE};

pub use attribute::{get_attr, set_attr};
pub use mro::{is_subtype, mro_of};
pub use slice::expand_slice;
pub use type_def::{
    Arity, MroState, NativeMethod, TYPE_BOOL, TYPE_DICT, TYPE_FLOAT, TYPE_FUNCTION, TYPE_INT,
    TYPE_LIST, TYPE_NONE, TYPE_OBJECT, TYPE_SLICE, TYPE_STR, TYPE_TUPLE, TYPE_TYPE, TypeDef,
    TypeFlags, TypeRegistry, init_builtin_types,
};
pub use value::{Callee, DictKey, Object, ObjectData};
