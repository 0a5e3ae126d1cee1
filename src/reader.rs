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

//! Line reader and the top-level reading driver that combines the
//! [`crate::scanner::Scanner`] and [`crate::parser::Parser`] into complete
//! expressions, for both the REPL (one line at a time, tracking whether a
//! `... ` continuation prompt is needed) and file/`import` reading (the
//! whole text at once).
//!
//! Grounded on the source's `line_reader.c` (tab expansion, trailing-newline
//! patching) and `reader.c` (`try_parse_line`, `reader_try_prompt`,
//! `reader_try_read_all`, `reader_print_error`'s caret-underline display).

use std::io::BufRead;

use crate::error::set_syntax_error;
use crate::object::ObjRef;
use crate::parser::{ParseError, Parser};
use crate::scanner::{Position, Scanner, Token, TokenKind};
use crate::vm::Vm;

pub const PROMPT_NEW: &str = ">>> ";
pub const PROMPT_CONTINUE: &str = "... ";

/// A syntax error with enough context (the offending line's text and column
/// span) to render the caret-underline display the source's
/// `reader_print_error` produces.
#[derive(Debug, Clone)]
pub struct SyntaxErrorDisplay {
    pub lineno: usize,
    pub col: usize,
    pub end_col: usize,
    pub line_text: String,
    pub message: String,
}

impl SyntaxErrorDisplay {
    /// `-->`/`|` gutter framing with a caret underline beneath the offending
    /// span, matching `reader_print_error`.
    pub fn render(&self) -> String {
        let gutter = format!("{}", self.lineno);
        let pad = " ".repeat(gutter.len());
        let mut out = String::new();
        out.push_str(&format!("{pad}--> line {lineno}\n", pad = pad, lineno = self.lineno));
        out.push_str(&format!("{pad} |\n", pad = pad));
        out.push_str(&format!("{gutter} | {line}\n", gutter = gutter, line = self.line_text.trim_end_matches('\n')));
        let col = self.col.max(1);
        let end_col = self.end_col.max(col);
        let underline = "^".repeat((end_col - col + 1).max(1));
        out.push_str(&format!("{pad} | {}{}\n", " ".repeat(col - 1), underline));
        out.push_str(&format!("{pad} | {}\n", self.message));
        out
    }
}

/// Reads lines one at a time from any `BufRead`, expanding tabs to four
/// spaces and guaranteeing a trailing `\n` on the final line even if the
/// underlying source doesn't end with one. Tracks a 1-based line number.
pub struct LineReader<R> {
    inner: R,
    lineno: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> LineReader<R> {
        LineReader { inner, lineno: 0 }
    }

    pub fn lineno(&self) -> usize {
        self.lineno
    }

    /// `Ok(None)` at end of input.
    pub fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let mut raw = String::new();
        let n = self.inner.read_line(&mut raw)?;
        if n == 0 {
            return Ok(None);
        }
        self.lineno += 1;
        let expanded: String = raw.chars().flat_map(|c| if c == '\t' { " ".repeat(4).chars().collect::<Vec<_>>() } else { vec![c] }).collect();
        if expanded.ends_with('\n') {
            Ok(Some(expanded))
        } else {
            Ok(Some(format!("{expanded}\n")))
        }
    }
}

/// Owns the scanner and parser state that spans multiple lines of input.
pub struct Reader {
    scanner: Scanner,
    parser: Parser,
}

impl Reader {
    pub fn new() -> Reader {
        Reader { scanner: Scanner::new(), parser: Parser::new() }
    }

    pub fn is_inside_expression(&self) -> bool {
        self.parser.is_inside_expression()
    }

    /// The prompt the REPL should show for the next line of input.
    pub fn prompt(&self) -> &'static str {
        if self.is_inside_expression() {
            PROMPT_CONTINUE
        } else {
            PROMPT_NEW
        }
    }

    fn display_error(&self, lineno: usize, line: &str, col: usize, end_col: usize, message: String) -> SyntaxErrorDisplay {
        SyntaxErrorDisplay {
            lineno,
            col,
            end_col,
            line_text: line.to_string(),
            message,
        }
    }

    /// Feed one line's characters through the scanner then the parser,
    /// collecting zero or more completed top-level expressions.
    pub fn feed_line(&mut self, vm: &mut Vm, lineno: usize, line: &str) -> Result<Vec<ObjRef>, SyntaxErrorDisplay> {
        let mut out = Vec::new();
        let mut col = 0usize;
        for c in line.chars() {
            col += 1;
            let pos = Position { lineno, col, end_col: col };
            match self.scanner.accept(pos, Some(c)) {
                Ok(Some(token)) => self.dispatch(vm, token, lineno, line, &mut out)?,
                Ok(None) => {}
                Err(se) => return Err(self.display_error(lineno, line, se.pos.col, se.pos.end_col, se.message())),
            }
        }
        Ok(out)
    }

    /// Signal end of input (EOF for file mode, or stdin closing in the
    /// REPL): flush any token the scanner was still assembling and run the
    /// parser's unbalanced-paren / dangling-quote check.
    pub fn finish(&mut self, vm: &mut Vm, lineno: usize, line: &str) -> Result<Vec<ObjRef>, SyntaxErrorDisplay> {
        let mut out = Vec::new();
        let col = line.chars().count() + 1;
        let pos = Position { lineno, col, end_col: col };
        match self.scanner.accept(pos, None) {
            Ok(Some(token)) => self.dispatch(vm, token, lineno, line, &mut out)?,
            Ok(None) => {}
            Err(se) => return Err(self.display_error(lineno, line, se.pos.col, se.pos.end_col, se.message())),
        }
        match self.parser.accept(vm, Token { kind: TokenKind::Eof, pos }) {
            Ok(_) => Ok(out),
            Err(pe) => Err(self.parse_error_display(pe, line)),
        }
    }

    fn dispatch(&mut self, vm: &mut Vm, token: Token, lineno: usize, line: &str, out: &mut Vec<ObjRef>) -> Result<(), SyntaxErrorDisplay> {
        match self.parser.accept(vm, token) {
            Ok(Some(expr)) => {
                // Rooted until the caller evaluates (or otherwise anchors)
                // it and calls `Vm::pop_pending_expression` /
                // `Vm::drop_recent_pending_expressions` — until then it
                // lives only in `out`, which isn't a GC root.
                vm.push_pending_expression(expr);
                out.push(expr);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(pe) => Err(self.parse_error_display_with_lineno(pe, lineno, line)),
        }
    }

    fn parse_error_display(&self, pe: ParseError, line: &str) -> SyntaxErrorDisplay {
        self.parse_error_display_with_lineno(pe, pe.pos.lineno, line)
    }

    fn parse_error_display_with_lineno(&self, pe: ParseError, lineno: usize, line: &str) -> SyntaxErrorDisplay {
        self.display_error(lineno, line, pe.pos.col, pe.pos.end_col, pe.message())
    }
}

impl Default for Reader {
    fn default() -> Self {
        Reader::new()
    }
}

/// Read every top-level expression out of `text` in one pass, preserving the
/// full caret-displayable error on failure instead of converting it into a
/// VM-level `SyntaxError` Dict. Used by the CLI driver for file-mode reading,
/// where there is no enclosing `try` to catch a VM error and the caret
/// display is worth showing directly.
pub fn read_all_display(vm: &mut Vm, text: &str) -> Result<Vec<ObjRef>, SyntaxErrorDisplay> {
    let mut reader = Reader::new();
    let mut out = Vec::new();
    let mut lineno = 0usize;
    let mut last_line = String::new();

    for raw_line in text.split_inclusive('\n') {
        lineno += 1;
        let expanded: String = raw_line.chars().flat_map(|c| if c == '\t' { " ".repeat(4).chars().collect::<Vec<_>>() } else { vec![c] }).collect();
        last_line = expanded.clone();
        out.extend(reader.feed_line(vm, lineno, &expanded)?);
    }

    if text.is_empty() || !text.ends_with('\n') {
        lineno += 1;
    }
    out.extend(reader.finish(vm, lineno, &last_line)?);
    Ok(out)
}

/// Read every top-level expression out of `text` in one pass, for `import`.
/// On a syntax error, builds a `SyntaxError` Dict in the VM's error slot (so
/// `try` can catch it like any other interpreter error) and logs the caret
/// display at `warn!` level.
pub fn read_all(vm: &mut Vm, text: &str) -> Result<Vec<ObjRef>, ()> {
    read_all_display(vm, text).map_err(|display| report_and_set_error(vm, display))
}

fn report_and_set_error(vm: &mut Vm, display: SyntaxErrorDisplay) {
    crate::error::report_syntax_error(&display.message);
    let message = format!("line {}, column {}: {}", display.lineno, display.col, display.message);
    set_syntax_error(vm, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{list_len, HeapObject};
    use crate::vm::{Config, Vm};

    #[test]
    fn read_all_parses_multiple_top_level_forms() {
        let mut vm = Vm::new(Config::default());
        let exprs = read_all(&mut vm, "(+ 1 2)\n(* 3 4)\n").unwrap();
        assert_eq!(exprs.len(), 2);
    }

    #[test]
    fn read_all_parses_quote_prefix() {
        let mut vm = Vm::new(Config::default());
        let exprs = read_all(&mut vm, "'(1 2 3)\n").unwrap();
        assert_eq!(exprs.len(), 1);
        assert!(matches!(vm.heap().get(exprs[0]), HeapObject::Cons { .. }));
    }

    #[test]
    fn read_all_reports_unbalanced_paren() {
        let mut vm = Vm::new(Config::default());
        assert!(read_all(&mut vm, "(+ 1 2\n").is_err());
        assert!(vm.has_error());
    }

    #[test]
    fn read_all_reports_unterminated_string() {
        let mut vm = Vm::new(Config::default());
        assert!(read_all(&mut vm, "\"abc\n").is_err());
    }

    #[test]
    fn reader_prompt_reflects_in_progress_expression() {
        let mut vm = Vm::new(Config::default());
        let mut reader = Reader::new();
        assert_eq!(reader.prompt(), PROMPT_NEW);
        reader.feed_line(&mut vm, 1, "(+ 1\n").unwrap();
        assert_eq!(reader.prompt(), PROMPT_CONTINUE);
        let exprs = reader.feed_line(&mut vm, 2, "2)\n").unwrap();
        assert_eq!(list_len(vm.heap(), exprs[0]), Some(3));
        assert_eq!(reader.prompt(), PROMPT_NEW);
    }
}
