//! FILENAME: engine/src/tests.rs
//! PURPOSE: Consolidated unit tests for the evaluation engine.

use crate::evaluator::{EvalError, EvalResult, Evaluator};
use crate::sources::{CellSource, QuoteSource, SheetSource, SourceError, TableLoader};
use crate::table::{DataTable, FileTableLoader};
use parser::parse;

// ========================================
// FIXTURE COLLABORATORS
// ========================================

struct NoQuotes;

impl QuoteSource for NoQuotes {
    fn fetch(&self, symbol: &str) -> Result<String, SourceError> {
        Err(SourceError::Unavailable(format!(
            "no quote backend for {}",
            symbol
        )))
    }
}

struct FixedQuotes(&'static str);

impl QuoteSource for FixedQuotes {
    fn fetch(&self, _symbol: &str) -> Result<String, SourceError> {
        Ok(self.0.to_string())
    }
}

struct NoTables;

impl TableLoader for NoTables {
    fn load(&self, name: &str) -> Result<DataTable, SourceError> {
        Err(SourceError::Unavailable(format!("no table backend for {}", name)))
    }
}

struct StaticTables(DataTable);

impl TableLoader for StaticTables {
    fn load(&self, _name: &str) -> Result<DataTable, SourceError> {
        Ok(self.0.clone())
    }
}

fn eval_with(sheet: &SheetSource, input: &str) -> EvalResult<f64> {
    let formula = parse(input).unwrap();
    Evaluator::new(sheet, &NoQuotes, &NoTables).evaluate(&formula)
}

fn eval(input: &str) -> f64 {
    eval_with(&SheetSource::new(), input).unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {} to be close to {}",
        actual,
        expected
    );
}

// ========================================
// END-TO-END SCENARIOS
// ========================================

#[test]
fn evaluates_simple_addition() {
    assert_eq!(eval("=3+4"), 7.0);
}

#[test]
fn evaluates_with_precedence() {
    assert_eq!(eval("=1+2*3"), 7.0);
    assert_eq!(eval("=2*3+4*5"), 26.0);
    assert_eq!(eval("=1+2*3+5"), 12.0);
}

#[test]
fn evaluates_sum_of_literals() {
    assert_eq!(eval("=Sum(1,2,3,4,5)"), 15.0);
}

#[test]
fn evaluates_mortgage_payment() {
    let rate: f64 = 0.05 / 12.0;
    let expected = (rate * 500000.0) / (1.0 - (1.0 + rate).powf(-360.0));
    let actual = eval("=Pmt(0.05/12, 360, 500000)");
    assert_close(actual, expected);
    assert!((actual - 2684.11).abs() < 0.01);
}

#[test]
fn evaluates_if_with_comparisons() {
    assert_eq!(eval("=If(3>4, 1, 0)"), 0.0);
    assert_eq!(eval("=If(2=2, 10, 20)"), 10.0);
    assert_eq!(eval("=If(1<2, 1, 0)"), 1.0);
    assert_eq!(eval("=If(2<=2, 1, 0)"), 1.0);
    assert_eq!(eval("=If(3>=4, 1, 0)"), 0.0);
    assert_eq!(eval("=If(1<>2, 1, 0)"), 1.0);
}

#[test]
fn pi_returns_the_literal_constant() {
    assert_eq!(eval("=Pi()"), 3.141592654);
}

// ========================================
// ARITHMETIC AND UNARY SIGILS
// ========================================

#[test]
fn parenthesized_value_equals_bare_value() {
    assert_eq!(eval("=(2)"), 2.0);
    assert_eq!(eval("=((2))"), 2.0);
    assert_eq!(eval("=(1+2)*3"), 9.0);
}

#[test]
fn division_produces_fractions() {
    assert_close(eval("=1/4"), 0.25);
}

#[test]
fn infix_power_is_honored() {
    assert_eq!(eval("=2^3"), 8.0);
    assert_eq!(eval("=2+3^2"), 11.0);
    // * / ^ share a tier and evaluate in arrival order.
    assert_eq!(eval("=2*3^2"), 36.0);
}

#[test]
fn leading_minus_negates() {
    assert_eq!(eval("-5"), -5.0);
    assert_eq!(eval("=-(2+3)"), -5.0);
    assert_eq!(eval("=-2*3"), -6.0);
}

#[test]
fn unary_plus_is_absolute_value() {
    assert_eq!(eval("=(+(1-4))"), 3.0);
}

#[test]
fn complement_and_not_sigils() {
    assert_eq!(eval("=~0"), -1.0);
    assert_eq!(eval("=!5"), 0.0);
    assert_eq!(eval("=!0"), 1.0);
}

#[test]
fn string_literal_evaluates_to_nan() {
    assert!(eval("=\"abc\"").is_nan());
}

#[test]
fn operator_without_operand_is_a_syntax_error() {
    assert!(matches!(
        eval_with(&SheetSource::new(), "=3+"),
        Err(EvalError::Syntax(_))
    ));
}

// ========================================
// CELLS AND RANGES
// ========================================

#[test]
fn cell_refs_read_from_the_injected_source() {
    let sheet = SheetSource::new();
    assert!(sheet.set_addr("A1", 10.0));
    assert_eq!(eval_with(&sheet, "=A1*2").unwrap(), 20.0);
}

#[test]
fn missing_cell_reads_nan() {
    assert!(eval("=B7").is_nan());
}

#[test]
fn aggregates_reduce_ranges() {
    let sheet = SheetSource::new();
    sheet.set_addr("A1", 1.0);
    sheet.set_addr("A2", 2.0);
    sheet.set_addr("A3", 3.0);

    assert_eq!(eval_with(&sheet, "=Sum(A1:A3)").unwrap(), 6.0);
    assert_eq!(eval_with(&sheet, "=Avg(A1:A3)").unwrap(), 2.0);
    assert_eq!(eval_with(&sheet, "=Min(A1:A3)").unwrap(), 1.0);
    assert_eq!(eval_with(&sheet, "=Max(A1:A3)").unwrap(), 3.0);
    assert_eq!(eval_with(&sheet, "=Sum(A1:A3, 10)").unwrap(), 16.0);
}

#[test]
fn avg_divides_by_argument_count_not_cell_count() {
    // AVG(range, x) reduces the range to its own average first, then
    // divides the total by the number of arguments.
    let sheet = SheetSource::new();
    sheet.set_addr("A1", 1.0);
    sheet.set_addr("A2", 2.0);
    sheet.set_addr("A3", 3.0);
    assert_eq!(eval_with(&sheet, "=Avg(A1:A3, 10)").unwrap(), 6.0);
}

#[test]
fn reducers_skip_cells_missing_from_the_source() {
    let sheet = SheetSource::new();
    sheet.set_addr("A1", 5.0);
    assert_eq!(eval_with(&sheet, "=Sum(A1:A10)").unwrap(), 5.0);
}

#[test]
fn bare_range_outside_aggregate_is_an_error() {
    assert_eq!(
        eval_with(&SheetSource::new(), "=A1:A3"),
        Err(EvalError::RangeOutsideAggregate)
    );
}

// ========================================
// MATH AND FINANCIAL FUNCTIONS
// ========================================

#[test]
fn single_argument_math_functions() {
    assert_eq!(eval("=Sqrt(16)"), 4.0);
    assert_eq!(eval("=Abs(0-3)"), 3.0);
    assert_eq!(eval("=Round(2.4)"), 2.0);
    assert_eq!(eval("=Truncate(2.9)"), 2.0);
    assert_eq!(eval("=Floor(2.9)"), 2.0);
    assert_eq!(eval("=Ceil(2.1)"), 3.0);
    assert_eq!(eval("=Sign(0-7)"), -1.0);
    assert_eq!(eval("=Sign(0)"), 0.0);
    assert_close(eval("=Log(Exp(1))"), 1.0);
    assert_close(eval("=Sin(0)"), 0.0);
    assert_close(eval("=Cos(0)"), 1.0);
}

#[test]
fn power_function_and_alias() {
    assert_eq!(eval("=Power(2, 10)"), 1024.0);
    assert_eq!(eval("=Pow(2, 3)"), 8.0);
}

#[test]
fn nested_function_calls() {
    assert_eq!(eval("=Sum(1, Max(2, 3))"), 4.0);
    assert_eq!(eval("=Sqrt(Sum(9, 16))"), 5.0);
    assert_eq!(eval("=Sum(1+2, 3)"), 6.0);
}

#[test]
fn future_and_present_value() {
    let expected_fv = 100.0 * ((1.05f64).powf(10.0) - 1.0) / 0.05;
    assert_close(eval("=Fv(0.05, 10, 100)"), expected_fv);

    let expected_pv = 100.0 / (1.05f64).powf(10.0);
    assert_close(eval("=Pv(0.05, 10, 100)"), expected_pv);
}

#[test]
fn npv_and_reserved_builtins_return_zero() {
    assert_eq!(eval("=Npv(0.05, 100)"), 0.0);
    assert_eq!(eval("=PutDataVal(1, 2)"), 0.0);
    assert_eq!(eval("=DataSum(1)"), 0.0);
    assert_eq!(eval("=DataMax(1)"), 0.0);
}

// ========================================
// DATES
// ========================================

#[test]
fn date_function_uses_serial_days() {
    assert_eq!(eval("=Date(2020, 1, 1)"), 43832.0);
    assert_eq!(eval("=Date(2020, 1, 1) - Date(2020, 1, 1)"), 0.0);
}

#[test]
fn date_rejects_negative_arguments() {
    assert!(matches!(
        eval_with(&SheetSource::new(), "=Date(2020, 1, -1)"),
        Err(EvalError::Syntax(_))
    ));
}

#[test]
fn date_literals_support_arithmetic() {
    assert_eq!(eval("=1/15/2020+5"), 43851.0);
}

#[test]
fn today_is_a_plausible_serial_day() {
    // 40000 was passed around 2009; any current clock lands beyond it.
    assert!(eval("=Today()") > 40000.0);
}

// ========================================
// IF SEMANTICS
// ========================================

#[test]
fn if_accepts_single_value_conditions() {
    assert_eq!(eval("=If(5, 1, 2)"), 1.0);
    assert_eq!(eval("=If(0, 1, 2)"), 2.0);
}

#[test]
fn if_only_evaluates_the_taken_branch() {
    // The else branch holds a bare range, which would error if evaluated.
    assert_eq!(eval("=If(1=1, 2, A1:A2)"), 2.0);
}

#[test]
fn if_with_missing_branch_is_an_error() {
    assert!(eval_with(&SheetSource::new(), "=If(1>2, 5)").is_err());
}

// ========================================
// EXTERNAL DATA: STOCK, DATA, GETDATAVAL
// ========================================

#[test]
fn stock_parses_the_quote_body() {
    let sheet = SheetSource::new();
    let quotes = FixedQuotes("123.45\n");
    let evaluator = Evaluator::new(&sheet, &quotes, &NoTables);

    let formula = parse("=Stock(MSFT)").unwrap();
    assert_eq!(evaluator.evaluate(&formula).unwrap(), 123.45);
    assert!(evaluator.last_source_error().is_none());

    let formula = parse("=Stock(\"IBM\")").unwrap();
    assert_eq!(evaluator.evaluate(&formula).unwrap(), 123.45);
}

#[test]
fn stock_failure_records_error_and_returns_nan() {
    let sheet = SheetSource::new();
    let evaluator = Evaluator::new(&sheet, &NoQuotes, &NoTables);

    let formula = parse("=Stock(MSFT)").unwrap();
    assert!(evaluator.evaluate(&formula).unwrap().is_nan());
    let message = evaluator.last_source_error().unwrap();
    assert!(message.contains("MSFT"));
}

#[test]
fn unparseable_quote_body_returns_nan() {
    let sheet = SheetSource::new();
    let quotes = FixedQuotes("<html>oops</html>");
    let evaluator = Evaluator::new(&sheet, &quotes, &NoTables);

    let formula = parse("=Stock(MSFT)").unwrap();
    assert!(evaluator.evaluate(&formula).unwrap().is_nan());
    assert!(evaluator.last_source_error().is_some());
}

fn quotes_table() -> DataTable {
    DataTable::from_rows(vec![
        vec!["AAPL".to_string(), "150".to_string()],
        vec!["MSFT".to_string(), "310".to_string()],
    ])
}

#[test]
fn data_loads_a_table_and_reports_cell_count() {
    let sheet = SheetSource::new();
    let tables = StaticTables(quotes_table());
    let evaluator = Evaluator::new(&sheet, &NoQuotes, &tables);

    let formula = parse("=Data(stocks.csv)").unwrap();
    assert_eq!(evaluator.evaluate(&formula).unwrap(), 4.0);
}

#[test]
fn getdataval_matches_against_the_loaded_table() {
    let sheet = SheetSource::new();
    let tables = StaticTables(quotes_table());
    let evaluator = Evaluator::new(&sheet, &NoQuotes, &tables);

    // The table persists on the evaluator between formulas.
    let load = parse("=Data(stocks.csv)").unwrap();
    assert_eq!(evaluator.evaluate(&load).unwrap(), 4.0);

    let hit = parse("=GetDataVal(0, 0, MSFT, 1)").unwrap();
    assert_eq!(evaluator.evaluate(&hit).unwrap(), 1.0);

    let miss = parse("=GetDataVal(0, 0, TSLA, 1)").unwrap();
    assert_eq!(evaluator.evaluate(&miss).unwrap(), 0.0);
}

#[test]
fn getdataval_without_a_loaded_table_misses() {
    assert_eq!(eval("=GetDataVal(0, 0, MSFT, 1)"), 0.0);
}

#[test]
fn data_failure_records_error_and_returns_nan() {
    let sheet = SheetSource::new();
    let evaluator = Evaluator::new(&sheet, &NoQuotes, &NoTables);

    let formula = parse("=Data(missing.csv)").unwrap();
    assert!(evaluator.evaluate(&formula).unwrap().is_nan());
    assert!(evaluator.last_source_error().unwrap().contains("missing.csv"));
}

// ========================================
// SHEET SOURCE AND TABLE LOADER
// ========================================

#[test]
fn sheet_source_addresses_round_trip() {
    let sheet = SheetSource::new();
    assert!(sheet.set_addr("b2", 7.0));
    assert_eq!(sheet.read(1, 1), Some(7.0));
    assert!(!sheet.set_addr("not-an-address", 1.0));
    assert_eq!(sheet.len(), 1);
}

#[test]
fn file_loader_parses_csv() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("t.csv"), "AAPL, 150\nMSFT, 310\n").unwrap();

    let loader = FileTableLoader::new(dir.path());
    let table = loader.load("t.csv").unwrap();
    assert_eq!(table.rows(), 2);
    assert_eq!(table.cols(), 2);
    assert_eq!(table.at(1, 0), "MSFT");
    assert_eq!(table.at(1, 1), "310");
}

#[test]
fn file_loader_splits_whitespace_columns() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("t.dat"), "1 2\n3 4 5\n").unwrap();

    let loader = FileTableLoader::new(dir.path());
    let table = loader.load("t.dat").unwrap();
    assert_eq!(table.rows(), 2);
    assert_eq!(table.cols(), 3);
    assert_eq!(table.at(0, 2), ""); // short rows pad rectangular
    assert_eq!(table.at(1, 2), "5");
}

#[test]
fn file_loader_reports_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let loader = FileTableLoader::new(dir.path());
    assert!(matches!(loader.load("absent.csv"), Err(SourceError::Io(_))));
}

#[test]
fn end_to_end_data_pipeline_through_the_file_loader() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("stocks.csv"), "AAPL,150\nMSFT,310\n").unwrap();

    let sheet = SheetSource::new();
    let loader = FileTableLoader::new(dir.path());
    let evaluator = Evaluator::new(&sheet, &NoQuotes, &loader);

    let load = parse("=Data(stocks.csv)").unwrap();
    assert_eq!(evaluator.evaluate(&load).unwrap(), 4.0);

    let hit = parse("=GetDataVal(0, 0, AAPL, 1)").unwrap();
    assert_eq!(evaluator.evaluate(&hit).unwrap(), 1.0);
}
