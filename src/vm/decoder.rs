//! Variable-length bytecode decoder.
//!
//! `ByteCodeReader` turns a raw code buffer into a lazy stream of
//! [`Instruction`]s. Iteration is forward-only; control transfers are done
//! by calling [`ByteCodeReader::seek`] with a previously recorded
//! instruction position before resuming iteration.

use super::opcode::{EXTENDED_ARG, HAVE_ARGUMENT, Opcode, STOP_CODE};
use super::{VmErrorKind, VmResult, err};

/// One decoded logical instruction.
///
/// `pos` is the byte offset at which the instruction (including any
/// `EXTENDED_ARG` prefixes) starts, so a jump back to `pos` re-decodes the
/// full operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub pos: usize,
    pub opcode: Opcode,
    pub oparg: Option<u32>,
}

impl Instruction {
    /// Mnemonic of the opcode, e.g. `LOAD_CONST`.
    pub fn opname(&self) -> &'static str {
        self.opcode.name()
    }

    /// Operand of an argument-carrying instruction.
    pub fn arg(&self) -> VmResult<u32> {
        self.oparg.ok_or_else(|| {
            err(
                VmErrorKind::MalformedBytecode,
                format!("{} has no operand", self.opname()),
            )
        })
    }
}

pub struct ByteCodeReader<'a> {
    code: &'a [u8],
    cursor: usize,
}

impl<'a> ByteCodeReader<'a> {
    pub fn new(code: &'a [u8]) -> Self {
        Self { code, cursor: 0 }
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Repositions the cursor to an instruction boundary recorded earlier.
    /// The execution loop calls this for every control transfer.
    pub fn seek(&mut self, pos: usize) {
        self.cursor = pos;
    }

    fn read_byte(&mut self) -> VmResult<u8> {
        let b = self.code.get(self.cursor).copied().ok_or_else(|| {
            err(
                VmErrorKind::MalformedBytecode,
                format!("code buffer ends mid-instruction at offset {}", self.cursor),
            )
        })?;
        self.cursor += 1;
        Ok(b)
    }

    /// Decodes the next logical instruction.
    ///
    /// Returns `Ok(None)` when the buffer is exhausted or the stop sentinel
    /// (opcode 0) is reached. `EXTENDED_ARG` prefixes are folded into the
    /// operand of the instruction they precede and never emitted themselves.
    /// The extension accumulator is scoped to a single logical instruction;
    /// running off the end of the buffer mid-instruction is an error.
    pub fn decode_next(&mut self) -> VmResult<Option<Instruction>> {
        if self.cursor >= self.code.len() {
            return Ok(None);
        }
        let pos = self.cursor;
        let mut extended: u32 = 0;
        loop {
            let byte = self.read_byte()?;
            if byte == STOP_CODE {
                // trailing padding terminator
                self.cursor = self.code.len();
                return Ok(None);
            }
            let opcode = Opcode::from_repr(byte).ok_or_else(|| {
                err(
                    VmErrorKind::UnknownOpcode(byte),
                    format!("unknown opcode {} at offset {}", byte, pos),
                )
            })?;
            if byte >= HAVE_ARGUMENT {
                let oparg = self.read_byte()? as u32 | extended;
                if byte == EXTENDED_ARG {
                    extended = oparg << 8;
                    continue;
                }
                return Ok(Some(Instruction {
                    pos,
                    opcode,
                    oparg: Some(oparg),
                }));
            }
            // no-argument opcode; pending extension bits are discarded
            return Ok(Some(Instruction {
                pos,
                opcode,
                oparg: None,
            }));
        }
    }
}

impl Iterator for ByteCodeReader<'_> {
    type Item = VmResult<Instruction>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOAD_CONST: u8 = 100;
    const RETURN_VALUE: u8 = 83;
    const POP_TOP: u8 = 1;

    fn decode_all(code: &[u8]) -> Vec<Instruction> {
        ByteCodeReader::new(code)
            .collect::<VmResult<Vec<_>>>()
            .expect("decode failed")
    }

    #[test]
    fn test_two_instruction_buffer() {
        let ins = decode_all(&[LOAD_CONST, 0, RETURN_VALUE]);
        assert_eq!(ins.len(), 2);
        assert_eq!(ins[0].opcode, Opcode::LoadConst);
        assert_eq!(ins[0].oparg, Some(0));
        assert_eq!(ins[0].pos, 0);
        assert_eq!(ins[1].opcode, Opcode::ReturnValue);
        assert_eq!(ins[1].oparg, None);
        assert_eq!(ins[1].pos, 2);
    }

    #[test]
    fn test_extended_arg_merging() {
        // EXTENDED_ARG 0x01, LOAD_CONST 0x02 -> one instruction, arg 0x0102
        let ins = decode_all(&[EXTENDED_ARG, 0x01, LOAD_CONST, 0x02]);
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].opcode, Opcode::LoadConst);
        assert_eq!(ins[0].oparg, Some(0x0102));
        // position points at the start of the prefix chain
        assert_eq!(ins[0].pos, 0);
    }

    #[test]
    fn test_chained_extended_args() {
        let ins = decode_all(&[EXTENDED_ARG, 0x01, EXTENDED_ARG, 0x02, LOAD_CONST, 0x03]);
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].oparg, Some(0x010203));
    }

    #[test]
    fn test_extension_discarded_by_no_arg_opcode() {
        let ins = decode_all(&[EXTENDED_ARG, 0x01, POP_TOP, LOAD_CONST, 0x02]);
        assert_eq!(ins.len(), 2);
        assert_eq!(ins[0].opcode, Opcode::PopTop);
        assert_eq!(ins[0].oparg, None);
        // accumulator does not leak into the following instruction
        assert_eq!(ins[1].oparg, Some(2));
    }

    #[test]
    fn test_stop_sentinel_terminates() {
        let ins = decode_all(&[LOAD_CONST, 7, 0, LOAD_CONST, 9]);
        assert_eq!(ins.len(), 1);
        assert_eq!(ins[0].oparg, Some(7));
    }

    #[test]
    fn test_seek_restarts_iteration() {
        let mut r = ByteCodeReader::new(&[LOAD_CONST, 0, LOAD_CONST, 1, RETURN_VALUE]);
        let first = r.decode_next().unwrap().unwrap();
        let second = r.decode_next().unwrap().unwrap();
        assert_eq!(second.pos, 2);
        r.seek(first.pos);
        let again = r.decode_next().unwrap().unwrap();
        assert_eq!(again, first);
    }

    #[test]
    fn test_truncated_operand_is_error() {
        let mut r = ByteCodeReader::new(&[LOAD_CONST]);
        let e = r.decode_next().unwrap_err();
        assert!(matches!(e.kind, VmErrorKind::MalformedBytecode));
    }

    #[test]
    fn test_truncated_extension_chain_is_error() {
        let mut r = ByteCodeReader::new(&[EXTENDED_ARG, 0x01]);
        let e = r.decode_next().unwrap_err();
        assert!(matches!(e.kind, VmErrorKind::MalformedBytecode));
    }

    #[test]
    fn test_unknown_opcode_is_error() {
        let mut r = ByteCodeReader::new(&[200, 0]);
        let e = r.decode_next().unwrap_err();
        assert!(matches!(e.kind, VmErrorKind::UnknownOpcode(200)));
    }

    #[test]
    fn test_empty_buffer() {
        let mut r = ByteCodeReader::new(&[]);
        assert_eq!(r.decode_next().unwrap(), None);
    }
}
