//! CPython-style opcode table.
//!
//! Opcode numbers follow the classic numbering: everything at or above
//! `HAVE_ARGUMENT` carries a one-byte operand, `EXTENDED_ARG` supplies
//! high-order operand bits for the instruction that follows it.

use strum::{Display, FromRepr, IntoStaticStr};

/// Opcodes at or above this value read one operand byte.
pub const HAVE_ARGUMENT: u8 = 90;

/// Extension prefix: contributes high bits to the next instruction's operand.
pub const EXTENDED_ARG: u8 = 144;

/// Opcode 0 is never emitted by a compiler; the decoder treats it as an
/// early stream terminator (trailing padding).
pub const STOP_CODE: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, FromRepr)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    PopTop = 1,
    RotTwo = 2,
    DupTop = 4,
    Nop = 9,

    UnaryPositive = 10,
    UnaryNegative = 11,
    UnaryNot = 12,

    BinaryMultiply = 20,
    BinaryModulo = 22,
    BinaryAdd = 23,
    BinarySubtract = 24,
    BinarySubscr = 25,
    BinaryFloorDivide = 26,
    BinaryTrueDivide = 27,

    ReturnValue = 83,

    // >= HAVE_ARGUMENT from here on
    StoreName = 90,
    StoreAttr = 95,
    StoreGlobal = 97,
    LoadConst = 100,
    LoadName = 101,
    BuildTuple = 102,
    BuildList = 103,
    BuildMap = 105,
    LoadAttr = 106,
    CompareOp = 107,
    JumpForward = 110,
    JumpAbsolute = 113,
    PopJumpIfFalse = 114,
    PopJumpIfTrue = 115,
    LoadGlobal = 116,
    LoadFast = 124,
    StoreFast = 125,
    CallFunction = 131,
    MakeFunction = 132,
    BuildSlice = 133,
    ExtendedArg = 144,
}

impl Opcode {
    /// Mnemonic, e.g. `LOAD_CONST`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn has_argument(self) -> bool {
        (self as u8) >= HAVE_ARGUMENT
    }
}

/// `COMPARE_OP` operand values (subset of CPython's cmp_op table).
pub mod cmp {
    pub const LT: u32 = 0;
    pub const LE: u32 = 1;
    pub const EQ: u32 = 2;
    pub const NE: u32 = 3;
    pub const GT: u32 = 4;
    pub const GE: u32 = 5;

    pub fn name(op: u32) -> &'static str {
        match op {
            LT => "<",
            LE => "<=",
            EQ => "==",
            NE => "!=",
            GT => ">",
            GE => ">=",
            _ => "?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_names() {
        assert_eq!(Opcode::LoadConst.name(), "LOAD_CONST");
        assert_eq!(Opcode::ReturnValue.name(), "RETURN_VALUE");
        assert_eq!(Opcode::ExtendedArg.name(), "EXTENDED_ARG");
    }

    #[test]
    fn test_has_argument_threshold() {
        assert!(!Opcode::ReturnValue.has_argument());
        assert!(!Opcode::BinaryAdd.has_argument());
        assert!(Opcode::StoreName.has_argument());
        assert!(Opcode::LoadConst.has_argument());
        assert!(Opcode::ExtendedArg.has_argument());
    }

    #[test]
    fn test_from_repr() {
        assert_eq!(Opcode::from_repr(100), Some(Opcode::LoadConst));
        assert_eq!(Opcode::from_repr(83), Some(Opcode::ReturnValue));
        // 0 is the stop sentinel, not a real opcode
        assert_eq!(Opcode::from_repr(STOP_CODE), None);
        assert_eq!(Opcode::from_repr(255), None);
    }
}
