//! Readify main entry point
//!
//! Reads an HTML page aloud: loads the file, scans it into units, and
//! reads continuously from the first unit until the end of the document.
//! With --extract it prints the extracted text instead of speaking it.

use log::{error, info};
use readify::background::tts::OpenAiTts;
use readify::config::Config;
use readify::message::{PageAction, Response};
use readify::page::player::create_player;
use readify::runtime::Runtime;
use readify::{ReadifyError, Result};
use std::process;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let debug_mode = args.iter().any(|arg| arg == "--debug" || arg == "-d");

    // Initialize logger
    if debug_mode {
        // Debug mode: write to readify.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("readify.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to open readify.log for debug logging: {}",
                    e
                );
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "Readify version {} starting (debug mode, logging to readify.log)",
            readify::VERSION
        );
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Error)
            .init();
    }

    if let Err(e) = run() {
        error!("Fatal error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut extract_only = false;
    let mut file = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--debug" | "-d" => {}
            "--extract" | "-x" => extract_only = true,
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => file = Some(other.to_string()),
        }
    }

    let Some(file) = file else {
        print_usage();
        return Err(ReadifyError::InvalidInput("No input file given".to_string()));
    };

    let config = Config::load()?;
    info!("Config loaded from {:?}", config.path());

    let html = std::fs::read_to_string(&file)?;
    let client = Arc::new(OpenAiTts::new(config.endpoint(), config.model()));
    let player = create_player();

    let runtime = Runtime::start(&config, client, player);
    runtime.load_document(html)?;
    let units = runtime.wait_for_units(Duration::from_secs(2))?;
    info!("Found {} readable units", units.len());

    if extract_only {
        match runtime.request_page(PageAction::ExtractPageText)? {
            Response::Extract(result) if result.success => {
                println!("{}", result.text.unwrap_or_default());
            }
            Response::Extract(result) => {
                runtime.shutdown();
                return Err(ReadifyError::InvalidInput(
                    result.error.unwrap_or_else(|| "Extraction failed".to_string()),
                ));
            }
            _ => {
                runtime.shutdown();
                return Err(ReadifyError::Other("Unexpected reply".to_string()));
            }
        }
        runtime.shutdown();
        return Ok(());
    }

    if config.api_key().is_none() {
        runtime.shutdown();
        return Err(ReadifyError::MissingCredential);
    }

    let first = units[0].0.clone();
    info!("Reading from unit {}", first);
    runtime.read_from(&first, true)?;

    let done = runtime.wait_reading_done()?;
    runtime.shutdown();

    match done.error {
        Some(e) => Err(ReadifyError::Other(e)),
        None => Ok(()),
    }
}

fn print_usage() {
    println!("Usage: readify [OPTIONS] <page.html>");
    println!();
    println!("Options:");
    println!("  -x, --extract   Print the extracted text instead of reading it aloud");
    println!("  -d, --debug     Write debug logs to readify.log");
    println!("  -h, --help      Show this help");
    println!();
    println!("Configuration lives in ~/.readify.cfg (set your API key there).");
}
