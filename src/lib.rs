pub mod vm;

pub use vm::{Module, Value, Vm, VmError, VmResult};

/// Runs a module on a fresh machine, printing the entry unit's result (if
/// any) and runtime failures. Returns `false` on a runtime error.
pub fn exec_module(module: &vm::bytecode::Module) -> bool {
    let mut machine = vm::Vm::new();
    match machine.run(module) {
        Ok(Some(ret)) => {
            println!("{}", vm::utils::display_value(&machine.registry, &ret));
            true
        }
        Ok(None) => true,
        Err(err) => {
            eprintln!("VM Runtime Error: {:?}: {}", err.kind, err.message);
            false
        }
    }
}

pub fn disassemble(module: &vm::bytecode::Module) -> String {
    vm::disasm::disassemble_module_to_string(module)
}

pub fn save_module(module: &vm::bytecode::Module, path: &str) -> std::io::Result<()> {
    let cfg = bincode::config::standard();
    let bytes = bincode::serde::encode_to_vec(module, cfg)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    std::fs::write(path, bytes)
}

pub fn load_module(path: &str) -> std::io::Result<vm::bytecode::Module> {
    let bytes = std::fs::read(path)?;
    let cfg = bincode::config::standard();
    let (module, _consumed): (vm::bytecode::Module, usize) =
        bincode::serde::decode_from_slice(&bytes, cfg)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(module)
}
