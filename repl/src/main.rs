//! FILENAME: repl/src/main.rs
//! PURPOSE: Thin interactive front-end for the formula engine.
//! CONTEXT: Reads one formula per line from stdin, parses and evaluates it,
//! and prints `Result = <number>` or `Error: <message>`. The heavy lifting
//! lives in the parser and engine crates; this binary only wires up the
//! collaborators: an in-memory sheet, an HTTP quote source, and the
//! file-backed table loader.
//!
//! COMMANDS (everything else is treated as a formula):
//!   set <addr> <value>   store a number in the sheet, e.g. `set A1 3.5`
//!   quit / exit          leave the shell

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser as ClapParser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

use engine::{Evaluator, FileTableLoader, QuoteSource, SheetSource, SourceError};
use parser::parse;

/// Interactive formula calculator.
///
/// Formulas use spreadsheet syntax: `=1+2*3`, `=Sum(A1:A10)`,
/// `=Pmt(0.05/12, 360, 500000)`, `=If(A1>0, 1, 0)`.
#[derive(ClapParser, Debug)]
#[command(name = "repl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Interactive formula calculator", long_about = None)]
struct Cli {
    /// URL template for STOCK(); `{symbol}` is replaced with the ticker
    #[arg(
        long,
        env = "FORMULA_QUOTE_URL",
        default_value = "https://stooq.com/q/l/?s={symbol}&f=c&e=csv"
    )]
    quote_url: String,

    /// Directory DATA() resolves table names against
    #[arg(long, env = "FORMULA_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true, env = "FORMULA_VERBOSE")]
    verbose: bool,
}

/// Fetches quote text over HTTP from a URL template.
struct HttpQuoteSource {
    client: reqwest::blocking::Client,
    url_template: String,
}

impl HttpQuoteSource {
    fn new(url_template: String) -> Self {
        HttpQuoteSource {
            client: reqwest::blocking::Client::new(),
            url_template,
        }
    }
}

impl QuoteSource for HttpQuoteSource {
    fn fetch(&self, symbol: &str) -> Result<String, SourceError> {
        let url = self.url_template.replace("{symbol}", symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        response
            .text()
            .map_err(|e| SourceError::Unavailable(e.to_string()))
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    fmt().with_env_filter(filter).with_target(false).init();
    debug!(quote_url = %cli.quote_url, data_dir = %cli.data_dir.display(), "collaborators configured");

    let sheet = SheetSource::new();
    let quotes = HttpQuoteSource::new(cli.quote_url);
    let tables = FileTableLoader::new(cli.data_dir);
    let evaluator = Evaluator::new(&sheet, &quotes, &tables);

    println!("Formula calculator. Enter a formula, `set A1 3.5`, or `quit`.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if let Some(rest) = line.strip_prefix("set ") {
            handle_set(&sheet, rest);
            continue;
        }

        match parse(line) {
            Ok(formula) => match evaluator.evaluate(&formula) {
                Ok(value) => println!("Result = {}", value),
                Err(e) => println!("Error: {}", e),
            },
            Err(e) => println!("Error: {}", e),
        }
        if let Some(warning) = evaluator.last_source_error() {
            println!("Warning: {}", warning);
        }
    }

    Ok(())
}

/// Handles `set <addr> <value>`.
fn handle_set(sheet: &SheetSource, rest: &str) {
    let mut parts = rest.split_whitespace();
    let (addr, value) = (parts.next(), parts.next());
    match (addr, value.and_then(|v| v.parse::<f64>().ok())) {
        (Some(addr), Some(value)) => {
            if sheet.set_addr(addr, value) {
                println!("{} = {}", addr.to_uppercase(), value);
            } else {
                println!("Error: invalid cell address {:?}", addr);
            }
        }
        _ => println!("Usage: set <addr> <value>, e.g. `set A1 3.5`"),
    }
}
