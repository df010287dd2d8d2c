//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: Walks the parsed tree and reduces it to a numeric result.
//! CONTEXT: After a formula is parsed into operand/operator sequences, this
//! module consumes them left to right, dispatches built-in functions, and
//! evaluates IF conditions. Precedence was already encoded structurally by
//! the parser, so evaluation never reorders anything.
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, ^ consumed in arrival order
//! - Unary sigils: + (absolute value), - (negation), ~ (integer
//!   complement), ! (logical not)
//! - Cell lookups through the injected CellSource (missing cells read NaN)
//! - Range reduction (sum/avg/min/max) inside aggregate functions
//! - Functions: SQRT, ABS, ACOS, ASIN, ATAN, CEIL, FLOOR, COS, COSH, EXP,
//!              LOG, ROUND, SIGN, SIN, SINH, TAN, TANH, TRUNCATE, SUM, AVG,
//!              MAX, MIN, PI, TODAY, DATE, POWER, STOCK, DATA, GETDATAVAL,
//!              PMT, FV, PV, NPV, IF (plus the reserved data builtins)
//!
//! Collaborator failures (quote fetch, table load) are recoverable: the
//! message is recorded on the evaluator and the function returns NaN.

use std::cell::RefCell;

use tracing::{debug, warn};

use crate::sources::{CellSource, QuoteSource, TableLoader};
use crate::table::DataTable;
use parser::ast::{BinaryOp, Comparison, Context, Formula, Func, Node, OpNode, RangeRef, UnaryOp};
use parser::calendar;

/// Evaluator errors with descriptive messages.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EvalError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Syntax error: {0} is missing argument {1}")]
    MissingArgument(&'static str, usize),

    #[error("Syntax error: range reference is only valid inside an aggregate function")]
    RangeOutsideAggregate,
}

pub type EvalResult<T> = Result<T, EvalError>;

/// How to fold a range's cell values into one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    Sum,
    Avg,
    Min,
    Max,
}

/// The formula evaluator. Holds the three injected collaborators plus the
/// session state DATA()/GETDATAVAL() share. Evaluation takes &self, so the
/// mutable bits use RefCell for interior mutability.
pub struct Evaluator<'a> {
    cells: &'a dyn CellSource,
    quotes: &'a dyn QuoteSource,
    tables: &'a dyn TableLoader,
    /// Table loaded by the most recent DATA() call; queried by GETDATAVAL.
    data_table: RefCell<Option<DataTable>>,
    /// Message from the most recent collaborator failure, if any.
    source_error: RefCell<Option<String>>,
}

impl<'a> Evaluator<'a> {
    /// Creates a new Evaluator over the injected collaborators.
    pub fn new(
        cells: &'a dyn CellSource,
        quotes: &'a dyn QuoteSource,
        tables: &'a dyn TableLoader,
    ) -> Self {
        Evaluator {
            cells,
            quotes,
            tables,
            data_table: RefCell::new(None),
            source_error: RefCell::new(None),
        }
    }

    /// The message recorded by the most recent collaborator failure.
    /// Cleared at the start of each evaluation.
    pub fn last_source_error(&self) -> Option<String> {
        self.source_error.borrow().clone()
    }

    /// Evaluates a parsed formula to a single number.
    pub fn evaluate(&self, formula: &Formula) -> EvalResult<f64> {
        self.source_error.borrow_mut().take();
        self.eval_worker(&formula.root)
    }

    /// Reduces one sub-context: the first operand seeds the result, then
    /// operators consume it in arrival order. Unary operators transform the
    /// running result in place; binary operators pair with the next operand.
    /// Comparisons only matter to IF conditions and are skipped here.
    fn eval_worker(&self, ctx: &Context) -> EvalResult<f64> {
        let operands: Vec<&Node> = ctx.items().collect();
        let first = operands
            .first()
            .copied()
            .ok_or_else(|| EvalError::Syntax("expression has no operands".to_string()))?;

        let mut result = self.value_of(first, None)?;
        let mut next = 1;

        for op in &ctx.operators {
            match op {
                OpNode::Unary(unary) => {
                    result = match unary {
                        UnaryOp::Plus => result.abs(),
                        UnaryOp::Minus => -result,
                        UnaryOp::Complement => !(result as i64) as f64,
                        UnaryOp::Not => {
                            if result == 0.0 {
                                1.0
                            } else {
                                0.0
                            }
                        }
                    };
                }
                OpNode::Binary(binary) => {
                    let rhs_node = operands.get(next).copied().ok_or_else(|| {
                        EvalError::Syntax(format!("operator {} has no right-hand operand", binary))
                    })?;
                    next += 1;
                    let rhs = self.value_of(rhs_node, None)?;
                    result = match binary {
                        BinaryOp::Add => result + rhs,
                        BinaryOp::Sub => result - rhs,
                        BinaryOp::Mul => result * rhs,
                        BinaryOp::Div => result / rhs,
                        BinaryOp::Pow => result.powf(rhs),
                    };
                }
                OpNode::Comparison(_) => {}
            }
        }

        Ok(result)
    }

    /// Computes the numeric value of one operand. Ranges are only legal when
    /// the caller supplies a reducer; a sub-context wrapping a single
    /// operand passes the reducer through, so promoted aggregate arguments
    /// like SUM(A1:A10) still reduce.
    fn value_of(&self, node: &Node, reducer: Option<Reduce>) -> EvalResult<f64> {
        match node {
            Node::Number(n) | Node::Date(n) => Ok(*n),
            Node::Str(_) => Ok(f64::NAN),
            Node::CellRef(coord) => Ok(self
                .cells
                .read(coord.col, coord.row)
                .unwrap_or(f64::NAN)),
            Node::Range(range) => match reducer {
                Some(op) => Ok(self.reduce_range(range, op)),
                None => Err(EvalError::RangeOutsideAggregate),
            },
            Node::SubContext(ctx) => {
                if reducer.is_some() && ctx.operators.is_empty() && ctx.items().count() == 1 {
                    return self.value_of(ctx.items().next().expect("counted above"), reducer);
                }
                self.eval_worker(ctx)
            }
            Node::Function { func, ctx } => self.eval_function(*func, ctx),
            Node::StartMarker | Node::EndMarker | Node::ArgSep => Ok(f64::NAN),
        }
    }

    /// Folds the values of a range without mutating the node. Cells missing
    /// from the source are skipped, so a sparse column still sums cleanly.
    fn reduce_range(&self, range: &RangeRef, op: Reduce) -> f64 {
        let values = range
            .cells()
            .filter_map(|coord| self.cells.read(coord.col, coord.row));

        match op {
            Reduce::Sum => values.sum(),
            Reduce::Avg => {
                let (count, total) = values.fold((0u64, 0.0), |(c, t), v| (c + 1, t + v));
                if count == 0 {
                    f64::NAN
                } else {
                    total / count as f64
                }
            }
            Reduce::Min => values.fold(f64::NAN, |acc, v| if v < acc || acc.is_nan() { v } else { acc }),
            Reduce::Max => values.fold(f64::NAN, |acc, v| if v > acc || acc.is_nan() { v } else { acc }),
        }
    }

    // ==================== Function Dispatch ====================

    fn eval_function(&self, func: Func, ctx: &Context) -> EvalResult<f64> {
        let args: Vec<&Node> = ctx.items().collect();

        match func {
            // Single-argument math
            Func::Sqrt => Ok(self.num_arg(&args, func, 0)?.sqrt()),
            Func::Abs => Ok(self.num_arg(&args, func, 0)?.abs()),
            Func::Acos => Ok(self.num_arg(&args, func, 0)?.acos()),
            Func::Asin => Ok(self.num_arg(&args, func, 0)?.asin()),
            Func::Atan => Ok(self.num_arg(&args, func, 0)?.atan()),
            Func::Ceil => Ok(self.num_arg(&args, func, 0)?.ceil()),
            Func::Floor => Ok(self.num_arg(&args, func, 0)?.floor()),
            Func::Cos => Ok(self.num_arg(&args, func, 0)?.cos()),
            Func::Cosh => Ok(self.num_arg(&args, func, 0)?.cosh()),
            Func::Exp => Ok(self.num_arg(&args, func, 0)?.exp()),
            Func::Log => Ok(self.num_arg(&args, func, 0)?.ln()),
            Func::Round => Ok(self.num_arg(&args, func, 0)?.round()),
            Func::Sign => {
                let v = self.num_arg(&args, func, 0)?;
                Ok(if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    0.0
                })
            }
            Func::Sin => Ok(self.num_arg(&args, func, 0)?.sin()),
            Func::Sinh => Ok(self.num_arg(&args, func, 0)?.sinh()),
            Func::Tan => Ok(self.num_arg(&args, func, 0)?.tan()),
            Func::Tanh => Ok(self.num_arg(&args, func, 0)?.tanh()),
            Func::Truncate => Ok(self.num_arg(&args, func, 0)?.trunc()),

            Func::Power => {
                let base = self.num_arg(&args, func, 0)?;
                let exponent = self.num_arg(&args, func, 1)?;
                Ok(base.powf(exponent))
            }

            // Aggregates
            Func::Sum => args.iter().copied().try_fold(0.0, |acc, arg| {
                Ok(acc + self.value_of(arg, Some(Reduce::Sum))?)
            }),
            Func::Avg => {
                if args.is_empty() {
                    return Err(EvalError::MissingArgument(func.name(), 0));
                }
                let total = args.iter().copied().try_fold(0.0, |acc, arg| {
                    Ok(acc + self.value_of(arg, Some(Reduce::Avg))?)
                })?;
                Ok(total / args.len() as f64)
            }
            Func::Max => self.fold_extreme(&args, func, Reduce::Max, f64::max),
            Func::Min => self.fold_extreme(&args, func, Reduce::Min, f64::min),

            // Constants and dates
            Func::Pi => Ok(3.141592654),
            Func::Today => {
                use chrono::Datelike;
                let today = chrono::Local::now().date_naive();
                Ok(calendar::serial_day(
                    today.year() as i64,
                    today.month() as i64,
                    today.day() as i64,
                ))
            }
            Func::Date => {
                let year = self.num_arg(&args, func, 0)?;
                let month = self.num_arg(&args, func, 1)?;
                let day = self.num_arg(&args, func, 2)?;
                if year < 0.0 || month < 0.0 || day < 0.0 {
                    return Err(EvalError::Syntax(
                        "DATE arguments must be non-negative".to_string(),
                    ));
                }
                Ok(calendar::serial_day(year as i64, month as i64, day as i64))
            }

            // External data
            Func::Stock => self.fn_stock(&args, func),
            Func::Data => self.fn_data(&args, func),
            Func::GetDataVal => self.fn_get_data_val(&args, func),

            // Financial
            Func::Pmt => {
                let rate = self.num_arg(&args, func, 0)?;
                let periods = self.num_arg(&args, func, 1)?;
                let principal = self.num_arg(&args, func, 2)?;
                Ok((rate * principal) / (1.0 - (1.0 + rate).powf(-periods)))
            }
            Func::Fv => {
                let rate = self.num_arg(&args, func, 0)?;
                let periods = self.num_arg(&args, func, 1)?;
                let payment = self.num_arg(&args, func, 2)?;
                Ok(payment * ((1.0 + rate).powf(periods) - 1.0) / rate)
            }
            Func::Pv => {
                let rate = self.num_arg(&args, func, 0)?;
                let periods = self.num_arg(&args, func, 1)?;
                let payment = self.num_arg(&args, func, 2)?;
                Ok(payment / (1.0 + rate).powf(periods))
            }
            Func::Npv => Ok(0.0), // stub

            // Conditional
            Func::If => {
                let condition = self.eval_logical(self.arg(&args, func, 0)?)?;
                if condition {
                    self.value_of(self.arg(&args, func, 1)?, None)
                } else {
                    self.value_of(self.arg(&args, func, 2)?, None)
                }
            }

            // Reserved data builtins: recognized, not yet implemented
            Func::PutDataVal
            | Func::TimedGetDataVal
            | Func::TimedPutDataVal
            | Func::DataSum
            | Func::DataAvg
            | Func::DataMin
            | Func::DataMax => Ok(0.0),
        }
    }

    /// MAX/MIN: the first argument seeds the fold.
    fn fold_extreme(
        &self,
        args: &[&Node],
        func: Func,
        reducer: Reduce,
        pick: fn(f64, f64) -> f64,
    ) -> EvalResult<f64> {
        let mut result = self.value_of(self.arg(args, func, 0)?, Some(reducer))?;
        for &arg in &args[1..] {
            result = pick(result, self.value_of(arg, Some(reducer))?);
        }
        Ok(result)
    }

    // ==================== External Data Functions ====================

    /// STOCK(symbol): fetch the quote text and parse it as a decimal.
    fn fn_stock(&self, args: &[&Node], func: Func) -> EvalResult<f64> {
        let symbol = self.text_arg(args, func, 0)?;
        match self.quotes.fetch(&symbol) {
            Ok(body) => match body.trim().parse::<f64>() {
                Ok(price) => Ok(price),
                Err(_) => Ok(self.record_failure(format!(
                    "STOCK({}): quote response is not a number: {:?}",
                    symbol,
                    body.trim()
                ))),
            },
            Err(e) => Ok(self.record_failure(format!("STOCK({}): {}", symbol, e))),
        }
    }

    /// DATA(name): load a table and report how many cells it holds. The
    /// table sticks to the evaluator session for GETDATAVAL to query.
    fn fn_data(&self, args: &[&Node], func: Func) -> EvalResult<f64> {
        let name = self.text_arg(args, func, 0)?;
        match self.tables.load(&name) {
            Ok(table) => {
                let count = table.cell_count() as f64;
                debug!(name = %name, cells = count, "DATA loaded table");
                *self.data_table.borrow_mut() = Some(table);
                Ok(count)
            }
            Err(e) => Ok(self.record_failure(format!("DATA({}): {}", name, e))),
        }
    }

    /// GETDATAVAL(cell, keyCol, key, col): scan the loaded table's keyCol
    /// for the key text; 1.0 on a match, 0.0 otherwise. The matched-cell
    /// lookup itself is not implemented yet, so 1.0 stands in for it.
    fn fn_get_data_val(&self, args: &[&Node], func: Func) -> EvalResult<f64> {
        let key_col = self.num_arg(args, func, 1)? as usize;
        let key = self.text_arg(args, func, 2)?;

        let table = self.data_table.borrow();
        let Some(table) = table.as_ref() else {
            return Ok(0.0); // nothing loaded, nothing matches
        };
        for row in 0..table.rows() {
            if table.at(row, key_col) == key {
                return Ok(1.0);
            }
        }
        Ok(0.0)
    }

    // ==================== Logical Evaluation ====================

    /// Evaluates an IF condition. A promoted condition sub-context holding
    /// two values and a comparison compares them; anything else reduces to
    /// its numeric value, with non-zero meaning true.
    fn eval_logical(&self, node: &Node) -> EvalResult<bool> {
        if let Node::SubContext(ctx) = node {
            let comparison = ctx.operators.iter().find_map(|op| match op {
                OpNode::Comparison(cmp) => Some(*cmp),
                _ => None,
            });
            let values: Vec<&Node> = ctx.items().collect();

            if let (Some(cmp), true) = (comparison, values.len() >= 2) {
                let lhs = self.value_of(values[0], None)?;
                let rhs = self.value_of(values[1], None)?;
                return Ok(match cmp {
                    Comparison::Equal => lhs == rhs,
                    Comparison::Greater => lhs > rhs,
                    Comparison::Less => lhs < rhs,
                    Comparison::GreaterEqual => lhs >= rhs,
                    Comparison::LessEqual => lhs <= rhs,
                    Comparison::NotEqual => lhs != rhs,
                });
            }
        }

        Ok(self.value_of(node, None)? != 0.0)
    }

    // ==================== Argument Helpers ====================

    /// Returns the i-th argument node, or a syntax error past the end.
    fn arg<'n>(&self, args: &[&'n Node], func: Func, index: usize) -> EvalResult<&'n Node> {
        args.get(index)
            .copied()
            .ok_or(EvalError::MissingArgument(func.name(), index))
    }

    fn num_arg(&self, args: &[&Node], func: Func, index: usize) -> EvalResult<f64> {
        let node = self.arg(args, func, index)?;
        self.value_of(node, None)
    }

    /// The literal text of an argument, unwrapping promoted sub-contexts.
    /// STOCK and DATA take their symbol/name this way, so both quoted
    /// strings and bare fallback text work.
    fn text_arg(&self, args: &[&Node], func: Func, index: usize) -> EvalResult<String> {
        let node = self.arg(args, func, index)?;
        text_of(node).ok_or_else(|| {
            EvalError::Syntax(format!("{} argument {} must be text", func.name(), index))
        })
    }

    /// Records a collaborator failure and returns the in-band NaN signal.
    fn record_failure(&self, message: String) -> f64 {
        warn!("{}", message);
        *self.source_error.borrow_mut() = Some(message);
        f64::NAN
    }
}

/// Extracts literal text from an operand, looking through sub-context
/// wrappers. Numbers render without a trailing ".0" so DATA(42) finds the
/// file named "42".
fn text_of(node: &Node) -> Option<String> {
    match node {
        Node::Str(s) => Some(s.clone()),
        Node::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                Some(format!("{}", *n as i64))
            } else {
                Some(format!("{}", n))
            }
        }
        Node::SubContext(ctx) | Node::Function { ctx, .. } => ctx.items().next().and_then(text_of),
        _ => None,
    }
}
