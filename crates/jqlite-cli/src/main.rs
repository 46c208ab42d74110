//! `jqlite` CLI: run a jq filter over JSON documents from files or stdin.
//!
//! ## Usage
//!
//! ```sh
//! # Pretty-print every input
//! echo '{"b":1,"a":[1,2]}' | jqlite .
//!
//! # Extract raw strings
//! jqlite -r '.items[].name' data.json
//!
//! # Treat each line as a string, collect them into one array
//! printf 'a\nb\n' | jqlite -R -s 'split("\n")'
//!
//! # Bind variables
//! jqlite -n --arg who world --argjson n 3 '"hello \($who)" * $n'
//! ```
//!
//! Exit status is 0 on success, 1 when `-e` sees a false, null or missing
//! last output, 2 for filter errors, 3 when some input raised an uncaught
//! error and 4 when an input could not be read or decoded. The worst
//! outcome wins.

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use jqlite_core::{compile_with_vars, Program, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "jqlite",
    version,
    about = "Command-line JSON processor for a subset of the jq language"
)]
struct Cli {
    /// Filter to run on each input
    filter: String,

    /// Input files (reads stdin if omitted)
    files: Vec<PathBuf>,

    /// Print top-level strings without quotes
    #[arg(short = 'r', long)]
    raw_output: bool,

    /// Like --raw-output, without a newline after each output
    #[arg(short = 'j', long)]
    join_output: bool,

    /// Print each output on a single line
    #[arg(short = 'c', long)]
    compact_output: bool,

    /// Indent with a tab
    #[arg(long, conflicts_with = "indent")]
    tab: bool,

    /// Indent with N spaces (0 means compact)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u8).range(0..=7))]
    indent: Option<u8>,

    /// Use `null` as the only input
    #[arg(short = 'n', long)]
    null_input: bool,

    /// Collect all inputs into one array and run the filter once
    #[arg(short = 's', long)]
    slurp: bool,

    /// Read each input line as a string
    #[arg(short = 'R', long)]
    raw_input: bool,

    /// Exit 1 when the last output is false or null, or there is none
    #[arg(short = 'e', long)]
    exit_status: bool,

    /// Bind $NAME to the string VALUE
    #[arg(long, num_args = 2, value_names = ["NAME", "VALUE"], action = ArgAction::Append)]
    arg: Vec<String>,

    /// Bind $NAME to the parsed JSON text
    #[arg(long, num_args = 2, value_names = ["NAME", "JSON"], action = ArgAction::Append)]
    argjson: Vec<String>,
}

/// Process outcome, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Status {
    Success = 0,
    Falsy = 1,
    Usage = 2,
    Runtime = 3,
    Input = 4,
}

/// Decoding, evaluating and encoding recurse once per nesting level, and
/// input may nest up to `jqlite_core::value::MAX_DEPTH` levels.
const WORKER_STACK_SIZE: usize = 256 * 1024 * 1024;

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(status as u8)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("JQLITE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = thread::Builder::new()
        .name("jqlite".to_string())
        .stack_size(WORKER_STACK_SIZE)
        .spawn(move || run(&cli))
        .context("failed to start worker thread")
        .and_then(|worker| {
            worker
                .join()
                .unwrap_or_else(|_| Err(anyhow!("worker thread panicked")))
        });
    match outcome {
        Ok(status) => status.into(),
        Err(e) => {
            eprintln!("jqlite: error: {:#}", e);
            Status::Input.into()
        }
    }
}

fn run(cli: &Cli) -> Result<Status> {
    let vars = match variables(cli) {
        Ok(vars) => vars,
        Err(e) => {
            eprintln!("jqlite: error: {:#}", e);
            return Ok(Status::Usage);
        }
    };
    let program = match compile_with_vars(&cli.filter, &vars) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("jqlite: error: {}", e);
            return Ok(Status::Usage);
        }
    };

    let mut runner = Runner::new(cli, &program);
    if cli.null_input {
        runner.process(Value::Null)?;
    } else {
        let sources = read_sources(&cli.files)?;
        let decoded = decode_inputs(cli, &sources, |value| runner.process(value))?;
        if let Err(e) = decoded {
            eprintln!("jqlite: error: cannot parse input: {}", e);
            runner.status = runner.status.max(Status::Input);
        }
    }
    runner.finish()
}

/// `--arg` and `--argjson` bindings in command-line order of each flag.
fn variables(cli: &Cli) -> Result<Vec<(String, Value)>> {
    let mut vars: Vec<(String, Value)> = cli
        .arg
        .chunks(2)
        .filter_map(|pair| match pair {
            [name, value] => Some((name.clone(), Value::from(value.as_str()))),
            _ => None,
        })
        .collect();
    for pair in cli.argjson.chunks(2) {
        if let [name, text] = pair {
            let value = Value::from_json(text)
                .with_context(|| format!("invalid JSON text passed to --argjson {}", name))?;
            vars.push((name.clone(), value));
        }
    }
    Ok(vars)
}

fn read_sources(files: &[PathBuf]) -> Result<Vec<String>> {
    if files.is_empty() {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("failed to read standard input")?;
        return Ok(vec![text]);
    }
    files
        .iter()
        .map(|path| {
            fs::read_to_string(path).with_context(|| format!("could not open {}", path.display()))
        })
        .collect()
}

/// Decode every input document and hand it to `sink`, slurping first if
/// requested. The inner result is the first malformed document, which stops
/// decoding; the outer one is a failure inside `sink`.
fn decode_inputs(
    cli: &Cli,
    sources: &[String],
    mut sink: impl FnMut(Value) -> Result<()>,
) -> Result<jqlite_core::Result<()>> {
    if cli.raw_input {
        if cli.slurp {
            sink(Value::String(sources.concat()))?;
        } else {
            for line in sources.iter().flat_map(|source| source.lines()) {
                sink(Value::from(line))?;
            }
        }
        return Ok(Ok(()));
    }

    let mut slurped = Vec::new();
    for source in sources {
        for document in Value::from_json_stream(source) {
            let value = match document {
                Ok(value) => value,
                Err(e) => return Ok(Err(e)),
            };
            if cli.slurp {
                slurped.push(value);
            } else {
                sink(value)?;
            }
        }
    }
    if cli.slurp {
        sink(Value::Array(slurped))?;
    }
    Ok(Ok(()))
}

/// Runs the program per input and writes the encoded outputs.
struct Runner<'p> {
    program: &'p Program,
    out: BufWriter<io::Stdout>,
    indent: Option<String>,
    raw: bool,
    separator: &'static str,
    exit_status: bool,
    inputs: usize,
    last: Option<Value>,
    status: Status,
}

impl<'p> Runner<'p> {
    fn new(cli: &Cli, program: &'p Program) -> Self {
        let indent = if cli.compact_output {
            None
        } else if cli.tab {
            Some("\t".to_string())
        } else {
            match cli.indent {
                Some(0) => None,
                Some(n) => Some(" ".repeat(usize::from(n))),
                None => Some("  ".to_string()),
            }
        };
        Self {
            program,
            out: BufWriter::new(io::stdout()),
            indent,
            raw: cli.raw_output || cli.join_output,
            separator: if cli.join_output { "" } else { "\n" },
            exit_status: cli.exit_status,
            inputs: 0,
            last: None,
            status: Status::Success,
        }
    }

    fn process(&mut self, input: Value) -> Result<()> {
        self.inputs += 1;
        tracing::debug!(input = self.inputs, "processing input");
        for result in self.program.run(input) {
            match result {
                Ok(value) => {
                    self.write(&value)?;
                    self.last = Some(value);
                }
                Err(e) => {
                    self.out.flush().context("failed to write output")?;
                    eprintln!("jqlite: error (at <input #{}>): {}", self.inputs, e);
                    self.status = self.status.max(Status::Runtime);
                }
            }
        }
        Ok(())
    }

    fn write(&mut self, value: &Value) -> Result<()> {
        let text = match (value, &self.indent) {
            (Value::String(s), _) if self.raw => s.clone(),
            (_, Some(indent)) => value.to_json_pretty(indent)?,
            (_, None) => value.to_string(),
        };
        write!(self.out, "{}{}", text, self.separator).context("failed to write output")
    }

    fn finish(mut self) -> Result<Status> {
        self.out.flush().context("failed to write output")?;
        if self.exit_status && self.last.as_ref().is_none_or(|v| !v.is_truthy()) {
            self.status = self.status.max(Status::Falsy);
        }
        Ok(self.status)
    }
}
