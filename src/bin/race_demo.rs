//! Coroutine Race Demo
//!
//! Generates race puzzles and prints each program next to its expected output.
//!
//! Usage:
//!   cargo run --bin race_demo -- --difficulty sync --statements 12
//!   cargo run --bin race_demo -- --seed 7 --count 3 --separate
//!
//! Difficulties:
//!   simple           - launches, scopes, delays and prints
//!   sync             - adds joins, cancels, awaits and bare jobs
//!   exceptions       - adds throws, try/catch and supervisor scopes
//!   sync-exceptions  - everything
//!
//! Pass --verbose to watch the simplifier work.

use coroutine_races::{render, Difficulty, Session, SessionConfig};
use std::env;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn print_usage() {
    println!("Coroutine Races - Puzzle Generator");
    println!("==================================");
    println!();
    println!("Usage:");
    println!("  cargo run --bin race_demo -- [options]");
    println!();
    println!("Options:");
    println!("  --difficulty, -d NAME   simple | sync | exceptions | sync-exceptions");
    println!("  --statements, -n N      program size, root included (default 10)");
    println!("  --seed, -s N            session seed (default 0)");
    println!("  --count, -c N           puzzles to generate (default 1)");
    println!("  --separate              never print two values at the same instant");
    println!("  --verbose, -v           debug logging on stderr");
    println!("  --help, -h              show this message");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let mut difficulty = Difficulty::Simple;
    let mut statements: usize = 10;
    let mut seed: u64 = 0;
    let mut count: usize = 1;
    let mut separate = false;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--difficulty" | "-d" => {
                i += 1;
                let name = args.get(i).map(String::as_str).unwrap_or("");
                difficulty = Difficulty::from_name(name)
                    .ok_or_else(|| format!("Unknown difficulty '{}'", name))?;
            }
            "--statements" | "-n" => {
                i += 1;
                if i < args.len() {
                    statements = args[i].parse()?;
                }
            }
            "--seed" | "-s" => {
                i += 1;
                if i < args.len() {
                    seed = args[i].parse()?;
                }
            }
            "--count" | "-c" => {
                i += 1;
                if i < args.len() {
                    count = args[i].parse()?;
                }
            }
            "--separate" => {
                separate = true;
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                print_usage();
                return Err(format!("Unknown argument '{}'", other).into());
            }
        }
        i += 1;
    }

    // Set up logging
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    for n in 0..count {
        let config = SessionConfig {
            separate_simultaneous_prints: separate,
            ..SessionConfig::for_difficulty(difficulty, statements, seed.wrapping_add(n as u64))
        };
        let challenge = Session::new(config)?.run()?;
        info!(
            difficulty = %difficulty,
            statements = challenge.program.count_statements(),
            rounds = challenge.rounds,
            "generated puzzle"
        );

        println!("--- Puzzle {} ({}) ---", n + 1, difficulty);
        println!("{}", render(&challenge.program));
        println!();
        println!("Expected output:");
        for line in challenge.expected.lines() {
            println!("  {}", line);
        }
        println!();
    }

    Ok(())
}
