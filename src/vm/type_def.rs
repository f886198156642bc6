//! Type registry and reflective type construction.
//!
//! - **TypeDef**: per-type metadata (name, bases, member table, native
//!   dispatch table, cached MRO)
//! - **TypeRegistry**: dense table of all live types; builtins are
//!   installed eagerly at indices fixed by the `TYPE_*` constants, user
//!   types are appended by [`TypeRegistry::construct_type`]
//! - **NativeMethod**: Rust-implemented methods, dispatched through
//!   pre-built per-type tables instead of reflective lookup

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::bytecode::Value;
use super::utils::{expect_str, make_string, make_type, type_id_of};
use super::value::{DictKey, ObjectData};
use super::{VmErrorKind, VmResult, err};

// ========== type id constants ==========
// Builtins occupy fixed slots; user types are appended after them.
pub const TYPE_OBJECT: u16 = 0;
pub const TYPE_TYPE: u16 = 1;
pub const TYPE_INT: u16 = 2;
pub const TYPE_FLOAT: u16 = 3;
pub const TYPE_BOOL: u16 = 4;
pub const TYPE_STR: u16 = 5;
pub const TYPE_NONE: u16 = 6;
pub const TYPE_LIST: u16 = 7;
pub const TYPE_TUPLE: u16 = 8;
pub const TYPE_DICT: u16 = 9;
pub const TYPE_SLICE: u16 = 10;
pub const TYPE_FUNCTION: u16 = 11;
pub const TYPE_METHOD: u16 = 12;
pub const TYPE_PROPERTY: u16 = 13;

/// Which native payload variant instances of a type use.
///
/// Dynamically constructed types always get [`ReprTag::Instance`]; the tag
/// also names the builtin type whose native dispatch table serves as the
/// declared implementation class of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReprTag {
    Object,
    Type,
    Int,
    Float,
    Bool,
    Str,
    None,
    List,
    Tuple,
    Dict,
    Slice,
    Function,
    Method,
    Property,
    Instance,
}

impl ReprTag {
    /// The builtin type that declares the native methods of this payload.
    pub fn builtin_owner(self) -> u16 {
        match self {
            ReprTag::Object | ReprTag::Instance => TYPE_OBJECT,
            ReprTag::Type => TYPE_TYPE,
            ReprTag::Int => TYPE_INT,
            ReprTag::Float => TYPE_FLOAT,
            ReprTag::Bool => TYPE_BOOL,
            ReprTag::Str => TYPE_STR,
            ReprTag::None => TYPE_NONE,
            ReprTag::List => TYPE_LIST,
            ReprTag::Tuple => TYPE_TUPLE,
            ReprTag::Dict => TYPE_DICT,
            ReprTag::Slice => TYPE_SLICE,
            ReprTag::Function => TYPE_FUNCTION,
            ReprTag::Method => TYPE_METHOD,
            ReprTag::Property => TYPE_PROPERTY,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeFlags: u32 {
        /// Instances cannot be mutated after construction.
        const IMMUTABLE = 1 << 0;

        /// `obj(args...)` is meaningful for instances of this type.
        const CALLABLE  = 1 << 1;

        /// `for x in obj:` is meaningful for instances of this type.
        const ITERABLE  = 1 << 2;
    }
}

/// Linearization cache: either never computed or computed exactly once.
#[derive(Debug, Clone, Default)]
pub enum MroState {
    #[default]
    NotComputed,
    Computed(Rc<[u16]>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeMethod {
    StrUpper,
    StrLower,
    StrFind,
    ListAppend,
    ListPop,
    SliceIndices,
    TypeMro,
}

impl NativeMethod {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StrUpper => "upper",
            Self::StrLower => "lower",
            Self::StrFind => "find",
            Self::ListAppend => "append",
            Self::ListPop => "pop",
            Self::SliceIndices => "indices",
            Self::TypeMro => "mro",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    Variadic,
}

impl Arity {
    pub fn check(&self, got: usize) -> bool {
        match self {
            Arity::Exact(n) => got == *n,
            Arity::Range(min, max) => got >= *min && got <= *max,
            Arity::Variadic => true,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Arity::Exact(n) => format!("{}", n),
            Arity::Range(min, max) if min == max => format!("{}", min),
            Arity::Range(min, max) => format!("{}-{}", min, max),
            Arity::Variadic => "any".to_string(),
        }
    }
}

/// Entry of a per-type native dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct NativeSlot {
    pub func: NativeMethod,
    pub arity: Arity,
}

#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: String,

    /// Declared parents, insertion order significant. Structurally fixed
    /// after registration.
    pub bases: Vec<u16>,

    /// Native payload variant of instances.
    pub repr: ReprTag,

    /// Member table (own entries only); may gain entries after
    /// construction.
    pub dict: RefCell<HashMap<String, Value>>,

    /// Pre-built native dispatch table.
    pub methods: HashMap<String, NativeSlot>,

    /// Lazily computed, cached linearization.
    pub mro: RefCell<MroState>,

    pub flags: TypeFlags,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, repr: ReprTag, flags: TypeFlags) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            repr,
            dict: RefCell::new(HashMap::new()),
            methods: HashMap::new(),
            mro: RefCell::new(MroState::NotComputed),
            flags,
        }
    }

    pub fn with_bases(mut self, bases: Vec<u16>) -> Self {
        self.bases = bases;
        self
    }

    pub fn with_methods(mut self, methods: Vec<(NativeMethod, Arity)>) -> Self {
        for (func, arity) in methods {
            self.methods
                .insert(func.name().to_string(), NativeSlot { func, arity });
        }
        self
    }
}

/// All live types. Builtins are installed at construction and live for the
/// registry's lifetime; user types are appended at runtime.
#[derive(Debug)]
pub struct TypeRegistry {
    types: Vec<TypeDef>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut reg = TypeRegistry { types: Vec::new() };
        for def in init_builtin_types() {
            reg.register(def);
        }
        debug_assert_eq!(reg.types[TYPE_SLICE as usize].name, "slice");
        reg
    }

    pub fn type_def(&self, tid: u16) -> &TypeDef {
        &self.types[tid as usize]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Installs a type. Every type except the universal root is guaranteed
    /// to reach the root: it is appended to `bases` if absent.
    pub fn register(&mut self, mut def: TypeDef) -> u16 {
        let tid = self.types.len() as u16;
        if tid != TYPE_OBJECT && !def.bases.contains(&TYPE_OBJECT) {
            def.bases.push(TYPE_OBJECT);
        }
        self.types.push(def);
        tid
    }

    /// The metaclass call: `type(x)` or `type(name, bases, dict)`.
    ///
    /// The one-argument form is an introspection shortcut returning a
    /// display string for the argument's type. The constructing form takes
    /// `name`, `bases` and `dict` positionally or by keyword; the new
    /// type's member table is a copy of `dict`, its bases are the
    /// materialized iterable with the universal root appended if missing,
    /// and its MRO is left uncomputed until first queried.
    pub fn construct_type(
        &mut self,
        args: &[Value],
        kwargs: &HashMap<String, Value>,
    ) -> VmResult<Value> {
        if args.len() == 1 && kwargs.is_empty() {
            let tid = type_id_of(&args[0]);
            return Ok(make_string(format!("<class '{}'>", self.type_def(tid).name)));
        }

        let name = args.first().cloned().or_else(|| kwargs.get("name").cloned());
        let bases = args.get(1).cloned().or_else(|| kwargs.get("bases").cloned());
        let dict = args.get(2).cloned().or_else(|| kwargs.get("dict").cloned());
        let (Some(name), Some(bases), Some(dict)) = (name, bases, dict) else {
            return Err(err(
                VmErrorKind::UsageError,
                "type() requires 3 arguments: name str, tuple or list of base classes, \
                 dict of attributes"
                    .into(),
            ));
        };

        let name = expect_str(&name)?.to_string();
        let base_ids = self.materialize_bases(&bases)?;
        let members = copy_member_dict(&dict)?;

        let mut def = TypeDef::new(name, ReprTag::Instance, TypeFlags::CALLABLE);
        def.bases = base_ids;
        *def.dict.borrow_mut() = members;
        let tid = self.register(def);
        Ok(make_type(tid))
    }

    /// Turns a bases iterable into a fixed ordered set of type ids.
    fn materialize_bases(&self, bases: &Value) -> VmResult<Vec<u16>> {
        let items: Vec<Value> = match bases {
            Value::Object(obj) => match &obj.data {
                ObjectData::Tuple { items } => items.clone(),
                ObjectData::List { items } => items.borrow().clone(),
                _ => {
                    return Err(err(
                        VmErrorKind::UsageError,
                        "type() bases must be a tuple or list of classes".into(),
                    ));
                }
            },
            _ => {
                return Err(err(
                    VmErrorKind::UsageError,
                    "type() bases must be a tuple or list of classes".into(),
                ));
            }
        };
        let mut ids = Vec::with_capacity(items.len());
        for item in &items {
            match item {
                Value::Object(obj) => match &obj.data {
                    ObjectData::Type { type_id } if !ids.contains(type_id) => {
                        ids.push(*type_id);
                    }
                    ObjectData::Type { .. } => {}
                    _ => {
                        return Err(err(
                            VmErrorKind::UsageError,
                            "type() bases must contain only classes".into(),
                        ));
                    }
                },
                _ => {
                    return Err(err(
                        VmErrorKind::UsageError,
                        "type() bases must contain only classes".into(),
                    ));
                }
            }
        }
        Ok(ids)
    }
}

/// Copies a dict object into a member table; keys must be strings.
fn copy_member_dict(dict: &Value) -> VmResult<HashMap<String, Value>> {
    let Value::Object(obj) = dict else {
        return Err(err(
            VmErrorKind::UsageError,
            "type() dict must be a dict of attributes".into(),
        ));
    };
    let ObjectData::Dict { map } = &obj.data else {
        return Err(err(
            VmErrorKind::UsageError,
            "type() dict must be a dict of attributes".into(),
        ));
    };
    let mut members = HashMap::new();
    for (k, v) in map.borrow().iter() {
        match k {
            DictKey::Str(s) => {
                members.insert(s.clone(), v.clone());
            }
            _ => {
                return Err(err(
                    VmErrorKind::UsageError,
                    "type() dict keys must be strings".into(),
                ));
            }
        }
    }
    Ok(members)
}

/// Builds the builtin type table, in `TYPE_*` constant order.
pub fn init_builtin_types() -> Vec<TypeDef> {
    vec![
        TypeDef::new("object", ReprTag::Object, TypeFlags::empty()),
        TypeDef::new("type", ReprTag::Type, TypeFlags::CALLABLE)
            .with_methods(vec![(NativeMethod::TypeMro, Arity::Exact(0))]),
        TypeDef::new("int", ReprTag::Int, TypeFlags::IMMUTABLE),
        TypeDef::new("float", ReprTag::Float, TypeFlags::IMMUTABLE),
        // bool subclasses int
        TypeDef::new("bool", ReprTag::Bool, TypeFlags::IMMUTABLE).with_bases(vec![TYPE_INT]),
        TypeDef::new("str", ReprTag::Str, TypeFlags::IMMUTABLE | TypeFlags::ITERABLE)
            .with_methods(vec![
                (NativeMethod::StrUpper, Arity::Exact(0)),
                (NativeMethod::StrLower, Arity::Exact(0)),
                (NativeMethod::StrFind, Arity::Exact(1)),
            ]),
        TypeDef::new("NoneType", ReprTag::None, TypeFlags::IMMUTABLE),
        TypeDef::new("list", ReprTag::List, TypeFlags::ITERABLE).with_methods(vec![
            (NativeMethod::ListAppend, Arity::Exact(1)),
            (NativeMethod::ListPop, Arity::Range(0, 1)),
        ]),
        TypeDef::new("tuple", ReprTag::Tuple, TypeFlags::IMMUTABLE | TypeFlags::ITERABLE),
        TypeDef::new("dict", ReprTag::Dict, TypeFlags::ITERABLE),
        TypeDef::new("slice", ReprTag::Slice, TypeFlags::IMMUTABLE)
            .with_methods(vec![(NativeMethod::SliceIndices, Arity::Exact(1))]),
        TypeDef::new("function", ReprTag::Function, TypeFlags::CALLABLE),
        TypeDef::new("method", ReprTag::Method, TypeFlags::CALLABLE),
        TypeDef::new("property", ReprTag::Property, TypeFlags::empty()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::utils::{as_type, make_dict, make_tuple};

    #[test]
    fn test_builtin_table_layout() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.type_def(TYPE_OBJECT).name, "object");
        assert_eq!(reg.type_def(TYPE_TYPE).name, "type");
        assert_eq!(reg.type_def(TYPE_INT).name, "int");
        assert_eq!(reg.type_def(TYPE_BOOL).name, "bool");
        assert_eq!(reg.type_def(TYPE_STR).name, "str");
        assert_eq!(reg.type_def(TYPE_NONE).name, "NoneType");
        assert_eq!(reg.type_def(TYPE_SLICE).name, "slice");
        assert_eq!(reg.type_def(TYPE_PROPERTY).name, "property");
    }

    #[test]
    fn test_root_has_no_bases() {
        let reg = TypeRegistry::new();
        assert!(reg.type_def(TYPE_OBJECT).bases.is_empty());
    }

    #[test]
    fn test_register_appends_root() {
        let mut reg = TypeRegistry::new();
        let tid = reg.register(TypeDef::new("A", ReprTag::Instance, TypeFlags::CALLABLE));
        assert_eq!(reg.type_def(tid).bases, vec![TYPE_OBJECT]);
    }

    #[test]
    fn test_bool_subclasses_int() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.type_def(TYPE_BOOL).bases, vec![TYPE_INT, TYPE_OBJECT]);
    }

    #[test]
    fn test_str_dispatch_table() {
        let reg = TypeRegistry::new();
        let str_type = reg.type_def(TYPE_STR);
        assert!(str_type.methods.contains_key("upper"));
        assert!(str_type.methods.contains_key("lower"));
        assert!(str_type.methods.contains_key("find"));
        let slot = &str_type.methods["find"];
        assert_eq!(slot.arity, Arity::Exact(1));
    }

    #[test]
    fn test_arity_check() {
        assert!(Arity::Exact(2).check(2));
        assert!(!Arity::Exact(2).check(3));
        assert!(Arity::Range(0, 1).check(0));
        assert!(!Arity::Range(0, 1).check(2));
        assert!(Arity::Variadic.check(100));
    }

    #[test]
    fn test_one_argument_type_call() {
        let mut reg = TypeRegistry::new();
        let v = reg
            .construct_type(&[Value::Int(1)], &HashMap::new())
            .unwrap();
        assert_eq!(v, make_string("<class 'int'>".to_string()));
    }

    #[test]
    fn test_too_few_arguments_is_usage_error() {
        let mut reg = TypeRegistry::new();
        let e = reg
            .construct_type(
                &[make_string("A".to_string()), make_tuple(vec![])],
                &HashMap::new(),
            )
            .unwrap_err();
        assert!(matches!(e.kind, VmErrorKind::UsageError));
    }

    #[test]
    fn test_keyword_arguments_fill_missing_positions() {
        let mut reg = TypeRegistry::new();
        let mut kwargs = HashMap::new();
        kwargs.insert("dict".to_string(), make_dict(vec![]));
        let v = reg
            .construct_type(
                &[make_string("A".to_string()), make_tuple(vec![])],
                &kwargs,
            )
            .unwrap();
        let tid = as_type(&v).unwrap();
        assert_eq!(reg.type_def(tid).name, "A");
    }

    #[test]
    fn test_constructed_type_copies_dict() {
        let mut reg = TypeRegistry::new();
        let dict = make_dict(vec![(DictKey::Str("x".to_string()), Value::Int(1))]);
        let v = reg
            .construct_type(
                &[make_string("A".to_string()), make_tuple(vec![]), dict.clone()],
                &HashMap::new(),
            )
            .unwrap();
        let tid = as_type(&v).unwrap();
        // mutating the source dict afterwards must not leak into the type
        if let Value::Object(obj) = &dict
            && let ObjectData::Dict { map } = &obj.data
        {
            map.borrow_mut()
                .insert(DictKey::Str("y".to_string()), Value::Int(2));
        }
        let member_table = reg.type_def(tid).dict.borrow();
        assert_eq!(member_table.get("x"), Some(&Value::Int(1)));
        assert!(!member_table.contains_key("y"));
    }

    #[test]
    fn test_constructed_type_gets_instance_repr() {
        let mut reg = TypeRegistry::new();
        let v = reg
            .construct_type(
                &[
                    make_string("A".to_string()),
                    make_tuple(vec![]),
                    make_dict(vec![]),
                ],
                &HashMap::new(),
            )
            .unwrap();
        let tid = as_type(&v).unwrap();
        assert_eq!(reg.type_def(tid).repr, ReprTag::Instance);
        assert!(matches!(
            &*reg.type_def(tid).mro.borrow(),
            MroState::NotComputed
        ));
    }
}
