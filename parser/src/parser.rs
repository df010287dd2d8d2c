//! FILENAME: parser/src/parser.rs
//! PURPOSE: Recursive-descent driver that assembles tokens into the
//! operand/operator tree.
//! CONTEXT: This is the second stage of the parsing pipeline. The parser
//! owns an explicit stack of open sub-contexts (frames); nodes in the
//! finished tree only hold downward references.
//!
//! DRIVER RULES:
//! - `(` and function heads open a new frame; `)` closes back to the
//!   nearest explicit frame, implicitly sealing any promoted or
//!   unary-seeded frames in between.
//! - `+` and `-` lex as unary sigils. When a value is expected they seed a
//!   new sub-context; otherwise they demote to binary operators.
//! - Precedence promotion: when *, /, or ^ (code >= 2) arrives while the
//!   pending operator has code < 2, the most recent operand moves into a
//!   fresh sub-context seeded with the new operator. Evaluation order then
//!   falls out of the tree shape alone.
//! - Argument promotion: at each `,` the operands and operators gathered
//!   since the previous separator collapse into one sub-context, so every
//!   function argument is a single sub-tree. The trailing argument is
//!   promoted the same way when the function's `)` arrives.
//! - Comparisons are only meaningful while an IF condition is pending;
//!   anywhere else the token is dropped.

use crate::ast::{BinaryOp, Context, Formula, Func, Node, OpNode, UnaryOp};
use crate::lexer::Lexer;
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// What kind of sub-context a frame is building. Group and Function frames
/// are closed by an explicit `)`; Promoted and UnarySeed frames seal
/// themselves when the surrounding context ends.
#[derive(Debug, PartialEq, Clone, Copy)]
enum FrameKind {
    Root,
    Group,
    Function(Func),
    Promoted,
    UnarySeed,
}

/// One open sub-context on the parser's stack.
#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    ctx: Context,
}

impl Frame {
    fn open(kind: FrameKind) -> Self {
        Frame {
            kind,
            ctx: Context::open(),
        }
    }
}

/// The Parser holds the lexer, the frame stack, and the two
/// disambiguation flags.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    frames: Vec<Frame>,
    /// True initially and after any operator or argument separator; used to
    /// tell unary sigils apart from binary + and -.
    expecting_value: bool,
    /// Set when an IF( head is consumed; the next comparison operator is
    /// kept and clears it. Comparisons outside that window are dropped.
    expecting_comparison: bool,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(input),
            frames: vec![Frame::open(FrameKind::Root)],
            expecting_value: true,
            expecting_comparison: false,
        }
    }

    /// Parses the entire input and returns the finished tree.
    /// A leading `+` or `=` sigil is skipped; a leading `-` is a real
    /// negation and parses normally.
    pub fn parse(mut self) -> ParseResult<Formula> {
        let mut token = self.lexer.next_token();
        if matches!(
            token,
            Token::Comparison(crate::ast::Comparison::Equal) | Token::Unary(UnaryOp::Plus)
        ) {
            token = self.lexer.next_token();
        }

        if token == Token::Eof {
            return Err(ParseError::new("Empty expression"));
        }

        while token != Token::Eof {
            self.step(token);
            token = self.lexer.next_token();
        }

        self.seal_implicit_frames();
        if self.frames.len() > 1 {
            return Err(ParseError::new("Unclosed parenthesis in formula"));
        }

        let mut root = self.frames.pop().expect("root frame").ctx;
        root.operands.push(Node::EndMarker);
        Ok(Formula { root })
    }

    /// Dispatches one token against the current frame.
    fn step(&mut self, token: Token) {
        match token {
            Token::Number(n) => self.push_value(Node::Number(n)),
            Token::Date(n) => self.push_value(Node::Date(n)),
            Token::String(s) => self.push_value(Node::Str(s)),
            Token::CellRef(c) => self.push_value(Node::CellRef(c)),
            Token::Range(r) => self.push_value(Node::Range(r)),

            Token::LParen => {
                self.frames.push(Frame::open(FrameKind::Group));
                self.expecting_value = true;
            }

            Token::RParen => self.close_paren(),

            Token::ArgSep => {
                self.seal_implicit_frames();
                self.promote_argument();
                self.top().ctx.operands.push(Node::ArgSep);
                self.expecting_value = true;
            }

            Token::Function(func) => {
                if func == Func::If {
                    self.expecting_comparison = true;
                }
                self.frames.push(Frame::open(FrameKind::Function(func)));
                self.expecting_value = true;
            }

            Token::Unary(op) => {
                if self.expecting_value {
                    let mut frame = Frame::open(FrameKind::UnarySeed);
                    frame.ctx.operators.push(OpNode::Unary(op));
                    self.frames.push(frame);
                } else {
                    // Demote to a binary operator. Only + and - have a
                    // binary meaning; ~ and ! are dropped here.
                    match op {
                        UnaryOp::Plus => self.push_operator(BinaryOp::Add),
                        UnaryOp::Minus => self.push_operator(BinaryOp::Sub),
                        UnaryOp::Complement | UnaryOp::Not => {}
                    }
                }
            }

            Token::Operator(op) => self.push_operator(op),

            Token::Comparison(cmp) => {
                if self.expecting_comparison {
                    self.top().ctx.operators.push(OpNode::Comparison(cmp));
                    self.expecting_comparison = false;
                    self.expecting_value = true;
                }
            }

            Token::Eof => {}
        }
    }

    fn top(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack never empties")
    }

    fn push_value(&mut self, node: Node) {
        self.top().ctx.operands.push(node);
        self.expecting_value = false;
    }

    /// Appends a binary operator, first applying precedence promotion: when
    /// the new operator binds tighter (code >= 2) than the pending one
    /// (code < 2), the most recent operand is moved into a fresh
    /// sub-context seeded with the new operator. The pending operator stays
    /// behind and will pair with the promoted sub-context.
    fn push_operator(&mut self, op: BinaryOp) {
        let promotable = {
            let frame = self.frames.last().expect("frame stack never empties");
            op.code() >= 2
                && frame.ctx.operators.last().is_some_and(|last| last.code() < 2)
                && frame.ctx.operands.last().is_some_and(|n| !n.is_marker())
        };

        if promotable {
            let seed = self.top().ctx.operands.pop().expect("checked non-empty");
            let mut promoted = Frame::open(FrameKind::Promoted);
            promoted.ctx.operands.push(seed);
            promoted.ctx.operators.push(OpNode::Binary(op));
            self.frames.push(promoted);
        } else {
            self.top().ctx.operators.push(OpNode::Binary(op));
        }
        self.expecting_value = true;
    }

    /// Seals promoted and unary-seeded frames: each is closed with an
    /// EndMarker and wrapped as a SubContext operand of its parent.
    fn seal_implicit_frames(&mut self) {
        while matches!(
            self.frames.last().map(|f| f.kind),
            Some(FrameKind::Promoted | FrameKind::UnarySeed)
        ) {
            let mut frame = self.frames.pop().expect("matched above");
            frame.ctx.operands.push(Node::EndMarker);
            self.top().ctx.operands.push(Node::SubContext(frame.ctx));
        }
    }

    /// Collapses everything gathered since the previous argument separator
    /// (or the StartMarker) into a single sub-context, together with the
    /// pending operators. The collapsed argument replaces the raw slice on
    /// the operand sequence.
    fn promote_argument(&mut self) {
        let frame = self.frames.last_mut().expect("frame stack never empties");
        let start = frame
            .ctx
            .operands
            .iter()
            .rposition(|n| matches!(n, Node::ArgSep))
            .map(|i| i + 1)
            .unwrap_or(1); // index 0 is the StartMarker

        let slice: Vec<Node> = frame.ctx.operands.drain(start..).collect();
        let operators = std::mem::take(&mut frame.ctx.operators);

        let mut ctx = Context::open();
        ctx.operands.extend(slice);
        ctx.operands.push(Node::EndMarker);
        ctx.operators = operators;
        frame.ctx.operands.push(Node::SubContext(ctx));
    }

    /// True when the current frame has gathered anything since the last
    /// argument separator. Guards the trailing-argument promotion so that
    /// `PI()` does not grow an empty argument.
    fn has_trailing_argument(&self) -> bool {
        let frame = self.frames.last().expect("frame stack never empties");
        if !frame.ctx.operators.is_empty() {
            return true;
        }
        match frame
            .ctx
            .operands
            .iter()
            .rposition(|n| matches!(n, Node::ArgSep))
        {
            Some(i) => i + 1 < frame.ctx.operands.len(),
            None => frame.ctx.operands.len() > 1,
        }
    }

    /// Handles `)`: seals implicit frames, then closes the nearest group or
    /// function frame. A stray `)` with nothing open is dropped, since
    /// there is no parent context to return to.
    fn close_paren(&mut self) {
        self.seal_implicit_frames();
        match self.top().kind {
            FrameKind::Group => {
                let mut frame = self.frames.pop().expect("just inspected");
                frame.ctx.operands.push(Node::EndMarker);
                self.top().ctx.operands.push(Node::SubContext(frame.ctx));
            }
            FrameKind::Function(func) => {
                if self.has_trailing_argument() {
                    self.promote_argument();
                }
                let mut frame = self.frames.pop().expect("just inspected");
                frame.ctx.operands.push(Node::EndMarker);
                self.top().ctx.operands.push(Node::Function {
                    func,
                    ctx: frame.ctx,
                });
            }
            FrameKind::Root => {}
            FrameKind::Promoted | FrameKind::UnarySeed => unreachable!("sealed above"),
        }
        self.expecting_value = false;
    }
}

/// Convenience entry point: parse a formula string in one call.
pub fn parse(input: &str) -> ParseResult<Formula> {
    Parser::new(input).parse()
}
