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

//! Character stream to positioned tokens. A small state machine grounded on
//! the source's `scanner.c`: `Whitespace, Int, String, Atom, OpenParen,
//! CloseParen` states, fed one character at a time, each carrying its
//! `(lineno, col, end_col)` position for syntax-error reporting.
//!
//! Two additions over the literal source revision, both required by §6's
//! external contract: a `Quote` token for the `'` prefix (the retained source
//! revisions fold `'` into ordinary atom characters and never desugar it in
//! the scanner), and integer-overflow/leading-zero detection via checked
//! arithmetic rather than `__builtin_mul_overflow`/`__builtin_add_overflow`.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub lineno: usize,
    pub col: usize,
    pub end_col: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Int(i64),
    String(String),
    Symbol(String),
    OpenParen,
    CloseParen,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxErrorCode {
    InvalidCharacter,
    IntegerLeadingZero,
    IntegerTooLarge,
    IntegerInvalid,
    StringUnterminated,
    StringUnknownEscapeSequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub code: SyntaxErrorCode,
    pub pos: Position,
    pub bad_char: Option<char>,
}

impl SyntaxError {
    pub fn message(&self) -> String {
        match self.code {
            SyntaxErrorCode::InvalidCharacter => match self.bad_char {
                Some(c) => format!("invalid character {c:?}"),
                None => "invalid character".to_string(),
            },
            SyntaxErrorCode::IntegerLeadingZero => "integer literal has a leading zero".to_string(),
            SyntaxErrorCode::IntegerTooLarge => "integer literal is too large".to_string(),
            SyntaxErrorCode::IntegerInvalid => "invalid integer literal".to_string(),
            SyntaxErrorCode::StringUnterminated => "unterminated string literal".to_string(),
            SyntaxErrorCode::StringUnknownEscapeSequence => match self.bad_char {
                Some(c) => format!("unknown escape sequence '\\{c}'"),
                None => "unknown escape sequence".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Whitespace,
    Int,
    String,
    Atom,
    OpenParen,
    CloseParen,
    Quote,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || "~!@#$%^&*_+-=./<>?".contains(c)
}

fn is_whitespace(c: Option<char>) -> bool {
    match c {
        None => true,
        Some(c) => c.is_whitespace() || c == ',',
    }
}

fn escape_value(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        'r' => Some('\r'),
        't' => Some('\t'),
        '\\' => Some('\\'),
        '"' => Some('"'),
        _ => None,
    }
}

/// Feeds one character (or `None` for EOF) at a time; `accept` returns the
/// completed token, if the character closed one, or a syntax error.
pub struct Scanner {
    state: State,
    buf: String,
    escape_sequence: bool,
    int_value: i64,
    negative: bool,
    token_pos: Position,
}

impl Scanner {
    pub fn new() -> Scanner {
        Scanner {
            state: State::Whitespace,
            buf: String::new(),
            escape_sequence: false,
            int_value: 0,
            negative: false,
            token_pos: Position::default(),
        }
    }

    pub fn reset(&mut self) {
        *self = Scanner::new();
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.escape_sequence = false;
        self.int_value = 0;
        self.negative = false;
    }

    /// Feed one character (`None` means end-of-input) at `pos`. Returns
    /// `Some(token)` if a token was just completed, `None` if the scanner is
    /// still accumulating one, or a syntax error.
    pub fn accept(&mut self, pos: Position, c: Option<char>) -> Result<Option<Token>, SyntaxError> {
        match self.state {
            State::Whitespace | State::OpenParen | State::CloseParen | State::Quote => self.accept_any(pos, c),
            State::Int => self.accept_int(pos, c),
            State::String => self.accept_string(pos, c),
            State::Atom => self.accept_atom(pos, c),
        }
    }

    fn transition(&mut self, pos: Position, new_state: State) -> Option<Token> {
        let old_state = std::mem::replace(&mut self.state, new_state);
        let token_pos = std::mem::replace(&mut self.token_pos, pos);

        let token = match old_state {
            State::Whitespace => None,
            State::Int => Some(Token {
                kind: TokenKind::Int(if self.negative { -self.int_value } else { self.int_value }),
                pos: token_pos,
            }),
            State::String => Some(Token {
                kind: TokenKind::String(self.buf.clone()),
                pos: token_pos,
            }),
            State::Atom => Some(Token {
                kind: TokenKind::Symbol(self.buf.clone()),
                pos: token_pos,
            }),
            State::OpenParen => Some(Token { kind: TokenKind::OpenParen, pos: token_pos }),
            State::CloseParen => Some(Token { kind: TokenKind::CloseParen, pos: token_pos }),
            State::Quote => Some(Token { kind: TokenKind::Quote, pos: token_pos }),
        };
        self.clear();
        token
    }

    fn accept_any(&mut self, pos: Position, c: Option<char>) -> Result<Option<Token>, SyntaxError> {
        match c {
            Some(c) if c.is_ascii_digit() => {
                let token = self.transition(pos, State::Int);
                self.int_value = c as i64 - '0' as i64;
                Ok(token)
            }
            Some('\'') => Ok(self.transition(pos, State::Quote)),
            Some('(') => Ok(self.transition(pos, State::OpenParen)),
            Some(')') => Ok(self.transition(pos, State::CloseParen)),
            Some('"') => Ok(self.transition(pos, State::String)),
            Some(c) if is_name_char(c) => {
                let token = self.transition(pos, State::Atom);
                self.buf.push(c);
                Ok(token)
            }
            c if is_whitespace(c) => Ok(self.transition(pos, State::Whitespace)),
            _ => {
                let err = SyntaxError { code: SyntaxErrorCode::InvalidCharacter, pos, bad_char: c };
                self.reset();
                Err(err)
            }
        }
    }

    /// Accumulates the unsigned magnitude only; the sign (from `self.negative`)
    /// is applied once, when the token is finally emitted in `transition`.
    fn try_add_digit(&mut self, digit: i64) -> bool {
        match self.int_value.checked_mul(10).and_then(|shifted| shifted.checked_add(digit)) {
            Some(v) => {
                self.int_value = v;
                true
            }
            None => false,
        }
    }

    fn accept_int(&mut self, pos: Position, c: Option<char>) -> Result<Option<Token>, SyntaxError> {
        match c {
            Some(c) if c.is_ascii_digit() => {
                let digit = c as i64 - '0' as i64;
                if self.int_value == 0 {
                    let err = SyntaxError {
                        code: SyntaxErrorCode::IntegerLeadingZero,
                        pos: Position { lineno: pos.lineno, col: self.token_pos.col, end_col: pos.end_col },
                        bad_char: Some(c),
                    };
                    self.reset();
                    return Err(err);
                }
                self.token_pos.end_col = pos.end_col;
                if !self.try_add_digit(digit) {
                    let err = SyntaxError {
                        code: SyntaxErrorCode::IntegerTooLarge,
                        pos: Position { lineno: pos.lineno, col: self.token_pos.col, end_col: pos.end_col },
                        bad_char: Some(c),
                    };
                    self.reset();
                    return Err(err);
                }
                Ok(None)
            }
            c if is_whitespace(c) => Ok(self.transition(pos, State::Whitespace)),
            Some('(') => Ok(self.transition(pos, State::OpenParen)),
            Some(')') => Ok(self.transition(pos, State::CloseParen)),
            _ => {
                let err = SyntaxError {
                    code: SyntaxErrorCode::IntegerInvalid,
                    pos: Position { lineno: pos.lineno, col: self.token_pos.col, end_col: pos.end_col },
                    bad_char: c,
                };
                self.reset();
                Err(err)
            }
        }
    }

    fn accept_string(&mut self, pos: Position, c: Option<char>) -> Result<Option<Token>, SyntaxError> {
        if self.escape_sequence {
            self.escape_sequence = false;
            match c.and_then(escape_value) {
                Some(real) => {
                    self.buf.push(real);
                    Ok(None)
                }
                None => {
                    let err = SyntaxError {
                        code: SyntaxErrorCode::StringUnknownEscapeSequence,
                        pos: Position { lineno: pos.lineno, col: pos.col.saturating_sub(1), end_col: pos.end_col },
                        bad_char: c,
                    };
                    self.reset();
                    Err(err)
                }
            }
        } else {
            match c {
                Some('\\') => {
                    self.escape_sequence = true;
                    Ok(None)
                }
                Some('"') => {
                    self.token_pos.end_col = pos.end_col;
                    Ok(self.transition(pos, State::Whitespace))
                }
                Some(c) if !c.is_control() || c == ' ' => {
                    self.token_pos.end_col = pos.end_col;
                    self.buf.push(c);
                    Ok(None)
                }
                Some('\n') | Some('\r') | None => {
                    let err = SyntaxError { code: SyntaxErrorCode::StringUnterminated, pos, bad_char: c };
                    self.reset();
                    Err(err)
                }
                _ => {
                    let err = SyntaxError { code: SyntaxErrorCode::InvalidCharacter, pos, bad_char: c };
                    self.reset();
                    Err(err)
                }
            }
        }
    }

    fn accept_atom(&mut self, pos: Position, c: Option<char>) -> Result<Option<Token>, SyntaxError> {
        // A bare sign followed by a digit turns this atom into a signed
        // integer, exactly like an unsigned integer's first digit: no
        // leading-zero check on this first digit, just like `0` alone is a
        // valid unsigned integer. Any other single-character atom (`x0`,
        // `a1`, ...) followed by a digit is just another atom character.
        if (self.buf == "-" || self.buf == "+") && matches!(c, Some(c) if c.is_ascii_digit()) {
            let c = c.unwrap();
            self.negative = self.buf == "-";
            self.int_value = c as i64 - '0' as i64;
            self.token_pos.end_col = pos.end_col;
            self.state = State::Int;
            return Ok(None);
        }

        match c {
            Some('\'') => Ok(self.transition(pos, State::Quote)),
            Some(c) if is_name_char(c) => {
                self.token_pos.end_col = pos.end_col;
                self.buf.push(c);
                Ok(None)
            }
            c if is_whitespace(c) => Ok(self.transition(pos, State::Whitespace)),
            Some('(') => Ok(self.transition(pos, State::OpenParen)),
            Some(')') => Ok(self.transition(pos, State::CloseParen)),
            _ => {
                let err = SyntaxError { code: SyntaxErrorCode::InvalidCharacter, pos, bad_char: c };
                self.reset();
                Err(err)
            }
        }
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Scanner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(src: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new();
        let mut tokens = Vec::new();
        let mut pos = Position { lineno: 1, col: 0, end_col: 0 };
        for c in src.chars() {
            pos = Position { lineno: pos.lineno, col: pos.col + 1, end_col: pos.end_col + 1 };
            if let Some(t) = scanner.accept(pos, Some(c)).unwrap() {
                tokens.push(t.kind);
            }
        }
        if let Some(t) = scanner.accept(pos, None).unwrap() {
            tokens.push(t.kind);
        }
        tokens
    }

    #[test]
    fn scans_ints_atoms_and_parens() {
        let tokens = scan_all("(+ 1 -2)");
        assert_eq!(
            tokens,
            vec![
                TokenKind::OpenParen,
                TokenKind::Symbol("+".to_string()),
                TokenKind::Int(1),
                TokenKind::Int(-2),
                TokenKind::CloseParen,
            ]
        );
    }

    #[test]
    fn scans_multi_digit_negative_integer() {
        assert_eq!(scan_all("-123"), vec![TokenKind::Int(-123)]);
        assert_eq!(scan_all("-1"), vec![TokenKind::Int(-1)]);
        assert_eq!(scan_all("+42"), vec![TokenKind::Int(42)]);
    }

    #[test]
    fn atom_starting_with_a_letter_may_contain_digits() {
        assert_eq!(scan_all("x0"), vec![TokenKind::Symbol("x0".to_string())]);
        assert_eq!(scan_all("a10b20"), vec![TokenKind::Symbol("a10b20".to_string())]);
    }

    #[test]
    fn lone_sign_followed_by_zero_is_just_zero() {
        assert_eq!(scan_all("-0"), vec![TokenKind::Int(0)]);
    }

    #[test]
    fn scans_quote_prefix() {
        assert_eq!(scan_all("'x"), vec![TokenKind::Quote, TokenKind::Symbol("x".to_string())]);
    }

    #[test]
    fn scans_string_with_escapes() {
        assert_eq!(scan_all("\"a\\nb\""), vec![TokenKind::String("a\nb".to_string())]);
    }

    #[test]
    fn rejects_leading_zero() {
        let mut scanner = Scanner::new();
        let pos1 = Position { lineno: 1, col: 1, end_col: 1 };
        let pos2 = Position { lineno: 1, col: 2, end_col: 2 };
        scanner.accept(pos1, Some('0')).unwrap();
        let err = scanner.accept(pos2, Some('1')).unwrap_err();
        assert_eq!(err.code, SyntaxErrorCode::IntegerLeadingZero);
    }

    #[test]
    fn rejects_integer_overflow() {
        let mut scanner = Scanner::new();
        let mut pos = Position { lineno: 1, col: 0, end_col: 0 };
        let mut last = Ok(None);
        for c in "99999999999999999999".chars() {
            pos = Position { lineno: 1, col: pos.col + 1, end_col: pos.end_col + 1 };
            last = scanner.accept(pos, Some(c));
            if last.is_err() {
                break;
            }
        }
        assert_eq!(last.unwrap_err().code, SyntaxErrorCode::IntegerTooLarge);
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let mut scanner = Scanner::new();
        scanner.accept(Position { lineno: 1, col: 1, end_col: 1 }, Some('"')).unwrap();
        let err = scanner.accept(Position { lineno: 1, col: 2, end_col: 2 }, Some('\n')).unwrap_err();
        assert_eq!(err.code, SyntaxErrorCode::StringUnterminated);
    }
}
