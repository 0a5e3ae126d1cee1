// Copyright 2014 Nick Fitzgerald
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The CLI driver: `persimmon [source-file]`. With no argument, runs a REPL
//! over stdin; with one, reads and evaluates every top-level form in the
//! file in order. Grounded on the source's `src/main.c`: `try_shift_args`,
//! `run_repl`, `try_eval_file`, and the file-open error message format.

mod dict;
mod environment;
mod error;
mod eval;
mod heap;
mod object;
mod parser;
mod primitives;
mod reader;
mod scanner;
mod stack;
mod vm;

use std::io::{self, Write as _};
use std::process;

use log::error as log_error;

use object::ObjRef;
use vm::Vm;

fn main() {
    env_logger::init();

    let config = match vm::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    };

    let mut vm = Vm::new(config);
    let args: Vec<String> = std::env::args().skip(1).collect();

    let code = match args.first() {
        Some(path) => run_file(&mut vm, path),
        None => {
            run_repl(&mut vm);
            0
        }
    };
    process::exit(code);
}

/// The outcome of evaluating one top-level form.
enum Outcome {
    /// Evaluated successfully; keep going.
    Continue,
    /// `(exit)` was called; stop, successfully.
    Exit,
    /// An uncaught error propagated to the top level; already printed.
    Errored,
}

/// Evaluate one top-level form, printing its result or its error.
fn run_one(vm: &mut Vm, expr: ObjRef) -> Outcome {
    let env = vm.globals();
    match eval::eval_top_level(vm, env, expr) {
        Ok(value) => {
            println!("{}", object::repr(vm.heap(), value));
            if vm.exit_requested() {
                Outcome::Exit
            } else {
                Outcome::Continue
            }
        }
        Err(err) => {
            let rendered = error::format_error(vm, err);
            log_error!("uncaught error: {}", rendered.trim_end());
            eprint!("{rendered}");
            Outcome::Errored
        }
    }
}

fn run_file(vm: &mut Vm, path: &str) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(io_err) => {
            eprintln!("Could not open \"{path}\": {io_err}");
            return 1;
        }
    };

    match reader::read_all_display(vm, &text) {
        Ok(exprs) => {
            for expr in exprs {
                // Reading the whole file up front left every later form
                // sitting only in this `Vec`; each is a root only as long
                // as it stays in `Vm::pending_expressions`, so hand off
                // that rooting to `run_one`'s own frame right before use.
                vm.pop_pending_expression();
                match run_one(vm, expr) {
                    Outcome::Continue => {}
                    Outcome::Exit => return 0,
                    Outcome::Errored => return 1,
                }
            }
            0
        }
        Err(display) => {
            eprintln!("{}", display.render());
            1
        }
    }
}

fn run_repl(vm: &mut Vm) {
    let stdin = io::stdin();
    let mut line_reader = reader::LineReader::new(stdin.lock());
    let mut reader_state = reader::Reader::new();

    loop {
        print!("{}", reader_state.prompt());
        let _ = io::stdout().flush();

        let line = match line_reader.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                if reader_state.is_inside_expression() {
                    eprintln!("unexpected end of input: incomplete expression");
                }
                println!();
                return;
            }
            Err(io_err) => {
                eprintln!("error reading stdin: {io_err}");
                return;
            }
        };

        match reader_state.feed_line(vm, line_reader.lineno(), &line) {
            Ok(exprs) => {
                for expr in exprs {
                    vm.pop_pending_expression();
                    match run_one(vm, expr) {
                        Outcome::Continue | Outcome::Errored => {}
                        Outcome::Exit => return,
                    }
                }
            }
            Err(display) => {
                eprintln!("{}", display.render());
                // The scanner/parser state after a syntax error is not
                // trustworthy to keep accumulating into; start the next
                // top-level form fresh.
                reader_state = reader::Reader::new();
            }
        }
    }
}
