//! FILENAME: parser/src/lexer.rs
//! PURPOSE: Scans a raw formula string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. Token classes
//! are tried in a fixed order: separators and parens, sign sigils,
//! arithmetic operators, comparisons (two-character forms first), dates,
//! numbers, cell addresses and ranges, function heads, and finally the
//! string fallback. The date, number, and cell probes save and restore the
//! cursor on mismatch, so a failed probe never consumes input.
//!
//! The lexer never fails: anything that matches no other class is returned
//! as a string token, terminated by `)`, `,`, or `"`.

use crate::ast::{BinaryOp, CellCoord, Comparison, Func, RangeRef, UnaryOp, col_to_index};
use crate::calendar;
use crate::token::Token;

/// Function-name table. Each entry carries the opening paren so that a bare
/// prefix never matches: `SIN(` cannot fire on `SINH(30)` because the fourth
/// byte differs. Matching is case-insensitive.
const FUNCTIONS: &[(&str, Func)] = &[
    ("SQRT(", Func::Sqrt),
    ("ABS(", Func::Abs),
    ("ACOS(", Func::Acos),
    ("ASIN(", Func::Asin),
    ("ATAN(", Func::Atan),
    ("CEILING(", Func::Ceil),
    ("CEIL(", Func::Ceil),
    ("FLOOR(", Func::Floor),
    ("COSH(", Func::Cosh),
    ("COS(", Func::Cos),
    ("EXP(", Func::Exp),
    ("LOG(", Func::Log),
    ("ROUND(", Func::Round),
    ("SIGN(", Func::Sign),
    ("SINH(", Func::Sinh),
    ("SIN(", Func::Sin),
    ("TANH(", Func::Tanh),
    ("TAN(", Func::Tan),
    ("TRUNCATE(", Func::Truncate),
    ("TRUNC(", Func::Truncate),
    ("SUM(", Func::Sum),
    ("AVERAGE(", Func::Avg),
    ("AVG(", Func::Avg),
    ("MAX(", Func::Max),
    ("MIN(", Func::Min),
    ("PI(", Func::Pi),
    ("TODAY(", Func::Today),
    ("DATE(", Func::Date),
    ("POWER(", Func::Power),
    ("POW(", Func::Power),
    ("STOCK(", Func::Stock),
    ("DATASUM(", Func::DataSum),
    ("DATAAVG(", Func::DataAvg),
    ("DATAMIN(", Func::DataMin),
    ("DATAMAX(", Func::DataMax),
    ("DATA(", Func::Data),
    ("GETDATAVAL(", Func::GetDataVal),
    ("PUTDATAVAL(", Func::PutDataVal),
    ("TIMEDGETDATAVAL(", Func::TimedGetDataVal),
    ("TIMEDPUTDATAVAL(", Func::TimedPutDataVal),
    ("PMT(", Func::Pmt),
    ("FV(", Func::Fv),
    ("NPV(", Func::Npv),
    ("PV(", Func::Pv),
    ("IF(", Func::If),
];

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let Some(&b) = self.input.get(self.pos) else {
            return Token::Eof;
        };

        match b {
            b',' => self.single(Token::ArgSep),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),

            // Sign sigils always lex as Unary; the parser demotes + and -
            // to binary operators when a value is not expected.
            b'+' => self.single(Token::Unary(UnaryOp::Plus)),
            b'-' => self.single(Token::Unary(UnaryOp::Minus)),
            b'~' => self.single(Token::Unary(UnaryOp::Complement)),
            b'!' => self.single(Token::Unary(UnaryOp::Not)),

            b'*' => self.single(Token::Operator(BinaryOp::Mul)),
            b'/' => self.single(Token::Operator(BinaryOp::Div)),
            b'^' => self.single(Token::Operator(BinaryOp::Pow)),

            b'=' => self.single(Token::Comparison(Comparison::Equal)),
            b'<' => {
                self.pos += 1;
                self.read_less_than_operator()
            }
            b'>' => {
                self.pos += 1;
                self.read_greater_than_operator()
            }

            _ => {
                if b.is_ascii_digit() {
                    if let Some(tok) = self.scan_date() {
                        return tok;
                    }
                    if let Some(tok) = self.scan_number() {
                        return tok;
                    }
                }
                if b.is_ascii_alphabetic() {
                    if let Some(tok) = self.scan_cell_or_range() {
                        return tok;
                    }
                }
                if let Some(func) = self.scan_function() {
                    return Token::Function(func);
                }
                self.scan_string()
            }
        }
    }

    fn single(&mut self, tok: Token) -> Token {
        self.pos += 1;
        tok
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// Handles operators starting with '<': <, <=, <>
    fn read_less_than_operator(&mut self) -> Token {
        match self.peek() {
            Some(b'=') => {
                self.pos += 1;
                Token::Comparison(Comparison::LessEqual)
            }
            Some(b'>') => {
                self.pos += 1;
                Token::Comparison(Comparison::NotEqual)
            }
            _ => Token::Comparison(Comparison::Less),
        }
    }

    /// Handles operators starting with '>': >, >=
    fn read_greater_than_operator(&mut self) -> Token {
        match self.peek() {
            Some(b'=') => {
                self.pos += 1;
                Token::Comparison(Comparison::GreaterEqual)
            }
            _ => Token::Comparison(Comparison::Greater),
        }
    }

    /// Consumes between `min` and `max` ASCII digits and returns their value.
    /// Returns None (cursor untouched beyond what it consumed) when fewer
    /// than `min` digits are present; callers restore the cursor themselves.
    fn scan_uint(&mut self, min: usize, max: usize) -> Option<i64> {
        let start = self.pos;
        while self.pos - start < max && self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos - start < min {
            return None;
        }
        // Digits only, so the UTF-8 slice and the parse are both infallible.
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    /// Probes for a date of the form M/D/YYYY or MM/DD/YYYY.
    /// Month must be 1..=12 and day 1..=31; the year clamps to >= 1900 when
    /// folded to a serial day. Restores the cursor on mismatch.
    fn scan_date(&mut self) -> Option<Token> {
        let save = self.pos;
        let result = (|| {
            let month = self.scan_uint(1, 2)?;
            if self.peek() != Some(b'/') {
                return None;
            }
            self.pos += 1;
            let day = self.scan_uint(1, 2)?;
            if self.peek() != Some(b'/') {
                return None;
            }
            self.pos += 1;
            let year = self.scan_uint(4, 4)?;
            if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
                return None;
            }
            Some(Token::Date(calendar::serial_day(year, month, day)))
        })();
        if result.is_none() {
            self.pos = save;
        }
        result
    }

    /// Probes for a decimal number: digits, optionally a dot and more digits.
    /// The number is only accepted when followed by end-of-input, whitespace,
    /// `,`, `)`, an operator sigil, or a comparator; otherwise the cursor is
    /// restored and the input falls through to the string class.
    fn scan_number(&mut self) -> Option<Token> {
        let save = self.pos;
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.')
            && self
                .input
                .get(self.pos + 1)
                .is_some_and(|b| b.is_ascii_digit())
        {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if !is_number_boundary(self.peek()) {
            self.pos = save;
            return None;
        }
        match std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
        {
            Some(n) => Some(Token::Number(n)),
            None => {
                self.pos = save;
                None
            }
        }
    }

    /// Probes for a cell address: one or two letters then one to eight
    /// digits, not followed by another letter or digit. Row input is
    /// 1-based; rows are stored 0-based. Restores the cursor on mismatch.
    fn scan_cell(&mut self) -> Option<CellCoord> {
        let save = self.pos;
        let result = (|| {
            let letters_start = self.pos;
            while self.pos - letters_start < 2
                && self.peek().is_some_and(|b| b.is_ascii_alphabetic())
            {
                self.pos += 1;
            }
            let letter_count = self.pos - letters_start;
            if letter_count == 0 || self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
                return None; // zero or three-plus letters
            }
            let col_str = std::str::from_utf8(&self.input[letters_start..self.pos]).ok()?;
            let row_input = self.scan_uint(1, 8)?;
            if self.peek().is_some_and(|b| b.is_ascii_alphanumeric()) {
                return None; // trailing junk like A1B or a ninth digit
            }
            if row_input < 1 {
                return None;
            }
            Some(CellCoord::new(col_to_index(col_str)?, row_input as u32 - 1))
        })();
        if result.is_none() {
            self.pos = save;
        }
        result
    }

    /// Probes for a cell address, then extends it into a range when a colon
    /// and a second address follow immediately.
    fn scan_cell_or_range(&mut self) -> Option<Token> {
        let first = self.scan_cell()?;
        if self.peek() == Some(b':') {
            let save = self.pos;
            self.pos += 1;
            if let Some(second) = self.scan_cell() {
                return Some(Token::Range(RangeRef::new(first, second)));
            }
            self.pos = save;
        }
        Some(Token::CellRef(first))
    }

    /// Case-insensitive match against the function-name table.
    fn scan_function(&mut self) -> Option<Func> {
        for (name, func) in FUNCTIONS {
            let end = self.pos + name.len();
            if end <= self.input.len()
                && self.input[self.pos..end].eq_ignore_ascii_case(name.as_bytes())
            {
                self.pos = end;
                return Some(*func);
            }
        }
        None
    }

    /// The fallback class; never fails. A leading double quote delimits the
    /// string exactly; otherwise characters accumulate up to the first `)`,
    /// `,`, or `"`, with surrounding whitespace trimmed.
    fn scan_string(&mut self) -> Token {
        if self.peek() == Some(b'"') {
            self.pos += 1;
            let start = self.pos;
            while self.peek().is_some_and(|b| b != b'"') {
                self.pos += 1;
            }
            let text = String::from_utf8_lossy(&self.input[start..self.pos]).into_owned();
            if self.peek() == Some(b'"') {
                self.pos += 1; // consume the closing quote
            }
            return Token::String(text);
        }

        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !matches!(b, b')' | b',' | b'"'))
        {
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.input[start..self.pos]);
        Token::String(text.trim().to_string())
    }
}

/// True when `b` may legally follow a number literal.
fn is_number_boundary(b: Option<u8>) -> bool {
    match b {
        None => true,
        Some(b) => {
            b.is_ascii_whitespace()
                || matches!(
                    b,
                    b',' | b')'
                        | b'+'
                        | b'-'
                        | b'*'
                        | b'/'
                        | b'^'
                        | b'~'
                        | b'!'
                        | b'='
                        | b'<'
                        | b'>'
                )
        }
    }
}

/// Parses a standalone A1-style address like "B12". The whole string must be
/// a single address. Useful for hosts that accept addresses outside formulas.
pub fn parse_address(s: &str) -> Option<CellCoord> {
    let mut lexer = Lexer::new(s.trim());
    let coord = lexer.scan_cell()?;
    if lexer.pos == lexer.input.len() {
        Some(coord)
    } else {
        None
    }
}
