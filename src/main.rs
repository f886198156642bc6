use rpvm as lib;
use std::env;
use std::process::ExitCode;

// Usage:
//   rpvm exec module.rpb
//   rpvm dis module.rpb
fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<String>>();
    let (subcmd, path) = match args.as_slice() {
        [cmd, path] if cmd == "exec" || cmd == "dis" => (cmd.as_str(), path.as_str()),
        [path] => ("exec", path.as_str()),
        _ => {
            eprintln!("usage: rpvm [exec|dis] <module file>");
            return ExitCode::FAILURE;
        }
    };

    let module = match lib::load_module(path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("failed to load {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    match subcmd {
        "dis" => {
            print!("{}", lib::disassemble(&module));
            ExitCode::SUCCESS
        }
        _ => {
            if lib::exec_module(&module) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
