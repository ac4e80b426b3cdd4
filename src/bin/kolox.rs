//! Interpreter command-line.
//!
//! When called without argument it drops into an interactive
//! read-evaluate-print loop; each line runs as its own program.
//!
//! When called with a script path, it runs that file.

use std::env;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::process;

use anyhow::{self, Context};

use kolox::interpreter::Interpreter;

fn main() -> Result<(), anyhow::Error> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    match args.as_slice() {
        [] => run_prompt()?,
        [path] => run_file(path)?,
        _ => {
            println!("Usage: kolox [script]");
            process::exit(2);
        }
    }
    Ok(())
}

fn run_file(path: &str) -> Result<(), anyhow::Error> {
    let source = fs::read_to_string(path).with_context(|| format!("failed to open {}", path))?;

    let mut stdout = io::stdout();
    Interpreter::new(&mut stdout).run(path, &source);
    Ok(())
}

fn run_prompt() -> Result<(), io::Error> {
    let stdin = io::stdin();
    let mut repl_stdout = io::stdout();
    let mut interp_stdout = io::stdout();

    let mut input = String::new();
    loop {
        repl_stdout.write_all("> ".as_bytes())?;
        repl_stdout.flush()?;

        input.clear();
        let nbytes = stdin.read_line(&mut input)?;
        if nbytes == 0 {
            break;
        }

        Interpreter::new(&mut interp_stdout).run("REPL", &input);
    }

    Ok(())
}
