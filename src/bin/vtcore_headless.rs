//! vtcore headless runner
//!
//! Feeds a byte stream from stdin or a file through the input handler and
//! prints the resulting viewport as text or as a JSON snapshot.

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vtcore::parser::ParseStatus;
use vtcore::{InputHandler, Snapshot, TerminalConfig};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut cols: Option<usize> = None;
    let mut rows: Option<usize> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut input_file: Option<String> = None;
    let mut output_format = OutputFormat::Text;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--cols" => {
                i += 1;
                cols = args.get(i).and_then(|v| v.parse().ok());
            },
            "-r" | "--rows" => {
                i += 1;
                rows = args.get(i).and_then(|v| v.parse().ok());
            },
            "--config" => {
                i += 1;
                config_path = args.get(i).map(PathBuf::from);
            },
            "-j" | "--json" => output_format = OutputFormat::Json,
            "-t" | "--text" => output_format = OutputFormat::Text,
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            },
            arg => {
                if input_file.is_none() && !arg.starts_with('-') {
                    input_file = Some(arg.to_string());
                } else {
                    warn!(arg, "ignoring argument");
                }
            },
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => match TerminalConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            },
        },
        None => TerminalConfig::default(),
    };
    if let Some(cols) = cols {
        config.cols = cols;
    }
    if let Some(rows) = rows {
        config.rows = rows;
    }

    let input_data = match &input_file {
        Some(path) => match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path, e);
                return ExitCode::FAILURE;
            },
        },
        None => {
            let mut data = Vec::new();
            if let Err(e) = io::stdin().read_to_end(&mut data) {
                eprintln!("Error reading stdin: {}", e);
                return ExitCode::FAILURE;
            }
            data
        },
    };

    let mut handler = match InputHandler::from_config(&config) {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("Error creating terminal: {}", e);
            return ExitCode::FAILURE;
        },
    };
    match handler.parse_bytes(&input_data) {
        Ok(ParseStatus::Done) => {},
        Ok(status) => warn!(?status, "input ended early"),
        Err(e) => {
            eprintln!("Error parsing input: {}", e);
            return ExitCode::FAILURE;
        },
    }
    let replies = handler.drain_replies();
    if !replies.is_empty() {
        info!(count = replies.len(), "discarding terminal replies");
    }

    let buffer = handler.buffer();
    match output_format {
        OutputFormat::Text => {
            println!("Terminal State ({}x{}):", buffer.cols(), buffer.rows());
            println!("Cursor: ({}, {})", buffer.y, buffer.x);
            println!("---");
            for line in buffer.viewport_text() {
                println!("{}", line);
            }
            println!("---");
        },
        OutputFormat::Json => match Snapshot::from_buffer(buffer).to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing snapshot: {}", e);
                return ExitCode::FAILURE;
            },
        },
    }

    ExitCode::SUCCESS
}

#[derive(Clone, Copy)]
enum OutputFormat {
    Text,
    Json,
}

fn print_help() {
    println!("vtcore headless runner");
    println!();
    println!("Usage: vtcore-headless [OPTIONS] [INPUT_FILE]");
    println!();
    println!("Options:");
    println!("  -c, --cols <N>       Set terminal width (default: 80)");
    println!("  -r, --rows <N>       Set terminal height (default: 24)");
    println!("      --config <PATH>  Load a JSON terminal config");
    println!("  -j, --json           Output snapshot as JSON");
    println!("  -t, --text           Output snapshot as text (default)");
    println!("  -h, --help           Show this help message");
    println!();
    println!("If no input file is specified, reads from stdin.");
    println!();
    println!("Examples:");
    println!("  printf 'Hello\\033[31mWorld\\033[0m' | vtcore-headless");
    println!("  vtcore-headless -c 120 -r 40 input.txt");
    println!("  vtcore-headless --json < test.bin > snapshot.json");
}
