use std::{
    env,
    io::{self, BufRead, Write},
    process,
};

use lntopo_capacity::{
    CapacityError,
    cli::{Command, CommandLineConfig},
    enrich::{CapacityEnricher, add_capacities},
    resolver::HttpResolver,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg.with_env(|key| env::var(key).ok()),
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("{}", CommandLineConfig::help());
            process::exit(2);
        }
    };

    let default_level = if config.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run_command(&config) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn run_command(config: &CommandLineConfig) -> Result<(), CapacityError> {
    match &config.command {
        Command::BuildCapacities {
            input_graph,
            output_cache,
        } => {
            let resolver = HttpResolver::new(config.capacity_url.as_str())?;
            let report = CapacityEnricher::new(resolver)
                .with_policy(config.overwrite)
                .with_confirm(confirm_on_stdin)
                .build_from_file(input_graph, config.format, output_cache)?;
            if config.json {
                print_json(&report)
            } else {
                println!(
                    "edges={} resolved={} cached={} records={}",
                    report.edges_visited, report.resolved, report.already_cached, report.total_records
                );
                Ok(())
            }
        }
        Command::AddCapacities {
            input_graph,
            output_graph,
            capacities_file,
        } => {
            let report = add_capacities(input_graph, config.format, output_graph, capacities_file)?;
            if config.json {
                print_json(&report)
            } else {
                println!("edges={} channels={}", report.edges_updated, report.channels);
                Ok(())
            }
        }
    }
}

fn print_json<T: Serialize>(report: &T) -> Result<(), CapacityError> {
    let text = serde_json::to_string(report)
        .map_err(|e| CapacityError::parse(format!("report serialization failed: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Repeats the question until the answer is y or n (case-insensitive).
fn confirm_on_stdin(message: &str) -> bool {
    eprintln!("{message}");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        eprint!("Continue [Y/N]? ");
        let _ = io::stderr().flush();
        match lines.next() {
            Some(Ok(answer)) => match answer.trim().to_ascii_lowercase().as_str() {
                "y" => return true,
                "n" => return false,
                _ => continue,
            },
            _ => return false,
        }
    }
}
