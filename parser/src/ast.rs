//! FILENAME: parser/src/ast.rs
//! PURPOSE: Defines the parse tree for formula expressions.
//! CONTEXT: After the Lexer tokenizes a formula string, the Parser converts
//! those tokens into this tree structure. The Evaluator then walks the tree
//! to compute the final result.
//!
//! TREE SHAPE: A formula is a sub-context: an operand sequence and an
//! operator sequence, consumed left to right with operators paired against
//! operands in arrival order. Precedence is represented structurally: the
//! parser opens a nested sub-context when a higher-precedence operator
//! appears, so the evaluator never reorders anything. Every closed
//! sub-context's operand sequence begins with a StartMarker and ends with an
//! EndMarker.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literals: numbers, dates (serial days), strings
//! - Cell references: A1, ZZ99999999 (columns A=0 .. ZZ=701)
//! - Ranges: A1:B10, normalized so top-left <= bottom-right
//! - Function calls: SUM(A1:A10), IF(A1>0, 1, 0)
//! - Unary sigils: + (absolute value), - (negation), ~, !

/// A single cell address with 0-based column and row indices.
/// Column "A" = 0, "B" = 1, ..., "Z" = 25, "AA" = 26, ..., "ZZ" = 701.
/// Row 1 in A1 notation = row 0 internally.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CellCoord {
    pub col: u32,
    pub row: u32,
}

impl CellCoord {
    pub fn new(col: u32, row: u32) -> Self {
        CellCoord { col, row }
    }

    /// Packs the address into a single word: row in the high 32 bits,
    /// column in the low 32 bits.
    pub fn encode(&self) -> u64 {
        ((self.row as u64) << 32) | self.col as u64
    }

    /// Inverse of [`CellCoord::encode`].
    pub fn decode(addr: u64) -> Self {
        CellCoord {
            col: (addr & 0xFFFF_FFFF) as u32,
            row: (addr >> 32) as u32,
        }
    }
}

impl std::fmt::Display for CellCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", index_to_col(self.col), self.row + 1)
    }
}

/// Converts a 1-2 letter column string to a 0-based column index.
/// "A" -> 0, "Z" -> 25, "AA" -> 26, "ZZ" -> 701.
/// Returns None for anything longer or non-alphabetic.
pub fn col_to_index(col_str: &str) -> Option<u32> {
    let bytes = col_str.as_bytes();
    if bytes.is_empty() || bytes.len() > 2 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let letter = |b: u8| (b.to_ascii_uppercase() - b'A') as u32;
    match bytes.len() {
        1 => Some(letter(bytes[0])),
        _ => Some((letter(bytes[0]) + 1) * 26 + letter(bytes[1])),
    }
}

/// Converts a 0-based column index back to its letter form.
/// 0 -> "A", 25 -> "Z", 26 -> "AA", 701 -> "ZZ".
pub fn index_to_col(col_index: u32) -> String {
    if col_index < 26 {
        ((b'A' + col_index as u8) as char).to_string()
    } else {
        let first = (col_index / 26) - 1;
        let second = col_index % 26;
        format!(
            "{}{}",
            (b'A' + first as u8) as char,
            (b'A' + second as u8) as char
        )
    }
}

/// Shape of a range: a single column, a single row, or a full rectangle.
/// ThreeD is reserved for cross-sheet ranges and currently unused.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Orientation {
    Vertical,
    Horizontal,
    Rectangular,
    ThreeD,
}

/// A rectangular cell region defined by two corners, normalized so that
/// `start` is the top-left and `end` the bottom-right corner.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RangeRef {
    pub start: CellCoord,
    pub end: CellCoord,
    pub orientation: Orientation,
}

impl RangeRef {
    /// Builds a range from two corners in any order.
    pub fn new(a: CellCoord, b: CellCoord) -> Self {
        let start = CellCoord::new(a.col.min(b.col), a.row.min(b.row));
        let end = CellCoord::new(a.col.max(b.col), a.row.max(b.row));
        let orientation = if start.col == end.col {
            Orientation::Vertical
        } else if start.row == end.row {
            Orientation::Horizontal
        } else {
            Orientation::Rectangular
        };
        RangeRef {
            start,
            end,
            orientation,
        }
    }

    /// Number of cells covered by the range (always at least one).
    pub fn cell_count(&self) -> u64 {
        let rows = (self.end.row - self.start.row) as u64 + 1;
        let cols = (self.end.col - self.start.col) as u64 + 1;
        rows * cols
    }

    /// Iterates the covered cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        let (c0, c1) = (self.start.col, self.end.col);
        (self.start.row..=self.end.row)
            .flat_map(move |row| (c0..=c1).map(move |col| CellCoord::new(col, row)))
    }
}

impl std::fmt::Display for RangeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Infix arithmetic operators, in operator-code order. The code order
/// matters: the parser promotes an in-progress expression into a nested
/// sub-context when an operator with code >= 2 follows one with code < 2.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinaryOp {
    Add, // +  code 0
    Sub, // -  code 1
    Mul, // *  code 2
    Div, // /  code 3
    Pow, // ^  code 4
}

impl BinaryOp {
    pub fn code(&self) -> u8 {
        match self {
            BinaryOp::Add => 0,
            BinaryOp::Sub => 1,
            BinaryOp::Mul => 2,
            BinaryOp::Div => 3,
            BinaryOp::Pow => 4,
        }
    }
}

/// Sign sigils. Only + and - are fully honored by evaluation: + takes the
/// absolute value of its operand and - negates it. ~ complements the
/// truncated integer value and ! maps zero/non-zero to 1/0.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Plus,       // +  code 0
    Minus,      // -  code 1
    Complement, // ~  code 2
    Not,        // !  code 3
}

impl UnaryOp {
    pub fn code(&self) -> u8 {
        match self {
            UnaryOp::Plus => 0,
            UnaryOp::Minus => 1,
            UnaryOp::Complement => 2,
            UnaryOp::Not => 3,
        }
    }
}

/// Comparison operators in textual code order.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Comparison {
    Equal,        // =   code 0
    Greater,      // >   code 1
    Less,         // <   code 2
    GreaterEqual, // >=  code 3
    LessEqual,    // <=  code 4
    NotEqual,     // <>  code 5
}

impl Comparison {
    pub fn code(&self) -> u8 {
        match self {
            Comparison::Equal => 0,
            Comparison::Greater => 1,
            Comparison::Less => 2,
            Comparison::GreaterEqual => 3,
            Comparison::LessEqual => 4,
            Comparison::NotEqual => 5,
        }
    }
}

/// An entry on a sub-context's operator sequence.
/// The operand sequence and the operator sequence are separate by
/// construction, so operators can never leak into the operand side.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum OpNode {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Comparison(Comparison),
}

impl OpNode {
    /// Raw operator code used by the parser's precedence-promotion test.
    pub fn code(&self) -> u8 {
        match self {
            OpNode::Binary(op) => op.code(),
            OpNode::Unary(op) => op.code(),
            OpNode::Comparison(op) => op.code(),
        }
    }
}

/// Built-in functions resolved at lex time.
/// Using an enum instead of a String avoids heap allocations and enables
/// fast dispatch in the evaluator.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Func {
    // Single-argument math
    Sqrt,
    Abs,
    Acos,
    Asin,
    Atan,
    Ceil,
    Floor,
    Cos,
    Cosh,
    Exp,
    Log,
    Round,
    Sign,
    Sin,
    Sinh,
    Tan,
    Tanh,
    Truncate,

    // Aggregates
    Sum,
    Avg,
    Max,
    Min,

    // Constants and dates
    Pi,
    Today,
    Date,

    // Two-argument power (covers both POW( and POWER( spellings)
    Power,

    // External data
    Stock,
    Data,
    GetDataVal,
    PutDataVal,
    TimedGetDataVal,
    TimedPutDataVal,
    DataSum,
    DataAvg,
    DataMin,
    DataMax,

    // Financial
    Pmt,
    Fv,
    Pv,
    Npv,

    // Conditional
    If,
}

impl Func {
    /// The canonical upper-case name, used in error messages and display.
    pub fn name(&self) -> &'static str {
        match self {
            Func::Sqrt => "SQRT",
            Func::Abs => "ABS",
            Func::Acos => "ACOS",
            Func::Asin => "ASIN",
            Func::Atan => "ATAN",
            Func::Ceil => "CEIL",
            Func::Floor => "FLOOR",
            Func::Cos => "COS",
            Func::Cosh => "COSH",
            Func::Exp => "EXP",
            Func::Log => "LOG",
            Func::Round => "ROUND",
            Func::Sign => "SIGN",
            Func::Sin => "SIN",
            Func::Sinh => "SINH",
            Func::Tan => "TAN",
            Func::Tanh => "TANH",
            Func::Truncate => "TRUNCATE",
            Func::Sum => "SUM",
            Func::Avg => "AVG",
            Func::Max => "MAX",
            Func::Min => "MIN",
            Func::Pi => "PI",
            Func::Today => "TODAY",
            Func::Date => "DATE",
            Func::Power => "POWER",
            Func::Stock => "STOCK",
            Func::Data => "DATA",
            Func::GetDataVal => "GETDATAVAL",
            Func::PutDataVal => "PUTDATAVAL",
            Func::TimedGetDataVal => "TIMEDGETDATAVAL",
            Func::TimedPutDataVal => "TIMEDPUTDATAVAL",
            Func::DataSum => "DATASUM",
            Func::DataAvg => "DATAAVG",
            Func::DataMin => "DATAMIN",
            Func::DataMax => "DATAMAX",
            Func::Pmt => "PMT",
            Func::Fv => "FV",
            Func::Pv => "PV",
            Func::Npv => "NPV",
            Func::If => "IF",
        }
    }
}

impl std::fmt::Display for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Complement => "~",
            UnaryOp::Not => "!",
        };
        write!(f, "{}", s)
    }
}

impl std::fmt::Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Comparison::Equal => "=",
            Comparison::Greater => ">",
            Comparison::Less => "<",
            Comparison::GreaterEqual => ">=",
            Comparison::LessEqual => "<=",
            Comparison::NotEqual => "<>",
        };
        write!(f, "{}", s)
    }
}

/// An entry on a sub-context's operand sequence.
#[derive(Debug, PartialEq, Clone)]
pub enum Node {
    /// Numeric literal.
    Number(f64),
    /// Date literal, folded to a 1900-based serial day at lex time.
    Date(f64),
    /// String literal or fallback text (function names pass symbols this way).
    Str(String),
    /// Single cell address; its value comes from the injected cell source.
    CellRef(CellCoord),
    /// Rectangular region; only meaningful inside aggregate functions.
    Range(RangeRef),
    /// Nested sub-context: a parenthesized group, a promoted argument, or a
    /// precedence-promoted sub-expression.
    SubContext(Context),
    /// Function call; the context holds the promoted argument sub-trees.
    Function { func: Func, ctx: Context },
    /// Sentinel opening a closed sub-context's operand sequence.
    StartMarker,
    /// Sentinel closing a closed sub-context's operand sequence.
    EndMarker,
    /// Argument separator, kept in place so argument slices stay delimited.
    ArgSep,
}

impl Node {
    /// True for the bookkeeping nodes evaluation skips over.
    pub fn is_marker(&self) -> bool {
        matches!(self, Node::StartMarker | Node::EndMarker | Node::ArgSep)
    }
}

/// A sub-context: one operand sequence plus one operator sequence.
/// Evaluation consumes operands left to right with operators interleaved in
/// arrival order.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Context {
    pub operands: Vec<Node>,
    pub operators: Vec<OpNode>,
}

impl Context {
    /// A freshly opened sub-context, with the StartMarker already in place.
    pub fn open() -> Self {
        Context {
            operands: vec![Node::StartMarker],
            operators: Vec::new(),
        }
    }

    /// Iterates the meaningful operands, skipping markers and separators.
    pub fn items(&self) -> impl Iterator<Item = &Node> {
        self.operands.iter().filter(|n| !n.is_marker())
    }
}

/// A fully parsed formula: the root sub-context produced by the parser.
#[derive(Debug, PartialEq, Clone)]
pub struct Formula {
    pub root: Context,
}
