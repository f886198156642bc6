use super::bytecode::{CodeUnit, Module};
use super::decoder::{ByteCodeReader, Instruction};
use super::opcode::{Opcode, cmp};
use std::fmt::{self, Write};

pub fn disassemble_module_to_string(module: &Module) -> String {
    let mut output = String::new();
    let _ = disassemble_module(module, &mut output);
    output
}

pub fn disassemble_module(module: &Module, w: &mut impl Write) -> fmt::Result {
    writeln!(w, "=== Module Disassembly ===")?;
    writeln!(w)?;

    writeln!(w, "Names ({}):", module.names.len())?;
    for (i, name) in module.names.iter().enumerate() {
        writeln!(w, "  {}: \"{}\"", i, name)?;
    }
    writeln!(w)?;

    writeln!(w, "Constants ({}):", module.consts.len())?;
    for (i, c) in module.consts.iter().enumerate() {
        writeln!(w, "  {}: {:?}", i, c)?;
    }
    writeln!(w)?;

    writeln!(w, "Code units ({}):", module.functions.len())?;
    for (i, unit) in module.functions.iter().enumerate() {
        disassemble_unit(module, i, unit, w)?;
        writeln!(w)?;
    }

    Ok(())
}

pub fn disassemble_unit(
    module: &Module,
    func_id: usize,
    unit: &CodeUnit,
    w: &mut impl Write,
) -> fmt::Result {
    writeln!(
        w,
        "Unit #{} - {} (arity={}, locals={}, {} bytes)",
        func_id,
        unit.name,
        unit.arity,
        unit.num_locals,
        unit.code.len()
    )?;

    let mut reader = ByteCodeReader::new(&unit.code);
    loop {
        match reader.decode_next() {
            Ok(Some(ins)) => {
                write!(w, "    {:4}  ", ins.pos)?;
                disassemble_instruction(module, &ins, reader.position(), w)?;
                writeln!(w)?;
            }
            Ok(None) => break,
            Err(e) => {
                // annotate the defect and stop; the remaining bytes cannot
                // be decoded meaningfully
                writeln!(w, "    !!! {}", e.message)?;
                break;
            }
        }
    }

    Ok(())
}

fn disassemble_instruction(
    module: &Module,
    ins: &Instruction,
    next_pos: usize,
    w: &mut impl Write,
) -> fmt::Result {
    let Some(arg) = ins.oparg else {
        return write!(w, "{}", ins.opname());
    };
    write!(w, "{:<20} {:5}", ins.opname(), arg)?;
    match ins.opcode {
        Opcode::LoadConst => match module.consts.get(arg as usize) {
            Some(c) => write!(w, "  ({:?})", c),
            None => write!(w, "  (const index out of range)"),
        },
        Opcode::LoadName
        | Opcode::StoreName
        | Opcode::LoadGlobal
        | Opcode::StoreGlobal
        | Opcode::LoadAttr
        | Opcode::StoreAttr => match module.names.get(arg as usize) {
            Some(name) => write!(w, "  (\"{}\")", name),
            None => write!(w, "  (name index out of range)"),
        },
        Opcode::CompareOp => write!(w, "  ({})", cmp::name(arg)),
        Opcode::JumpForward => write!(w, "  (to {})", next_pos + arg as usize),
        Opcode::MakeFunction => match module.functions.get(arg as usize) {
            Some(unit) => write!(w, "  ({})", unit.name),
            None => write!(w, "  (unit index out of range)"),
        },
        _ => Ok(()),
    }
}
