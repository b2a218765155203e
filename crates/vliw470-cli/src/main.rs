use std::process::ExitCode;

use vliw470_common::error::Error;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    match parse_args(&args) {
        ArgsResult::Run { input, output_loop, output_pip } => run(&input, &output_loop, &output_pip),
        ArgsResult::Help => {
            print_usage();
            ExitCode::SUCCESS
        }
        ArgsResult::Version => {
            println!("vliw470 {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        ArgsResult::Invalid => {
            print_usage();
            ExitCode::FAILURE
        }
    }
}

enum ArgsResult {
    Run { input: String, output_loop: String, output_pip: String },
    Help,
    Version,
    Invalid,
}

fn parse_args(args: &[String]) -> ArgsResult {
    match args.get(1).map(String::as_str) {
        Some("--help") | Some("-h") => ArgsResult::Help,
        Some("--version") | Some("-V") => ArgsResult::Version,
        Some(_) if args.len() == 4 => ArgsResult::Run {
            input: args[1].clone(),
            output_loop: args[2].clone(),
            output_pip: args[3].clone(),
        },
        _ => ArgsResult::Invalid,
    }
}

fn print_usage() {
    eprintln!("vliw470 — static VLIW scheduler and register renamer");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  vliw470 <INPUT> <OUTPUT_LOOP> <OUTPUT_PIP>");
    eprintln!("  vliw470 --help");
    eprintln!("  vliw470 --version");
    eprintln!();
    eprintln!("INPUT is a JSON array of instruction-text strings.");
    eprintln!("OUTPUT_LOOP/OUTPUT_PIP receive the JSON-encoded bundle rows for the");
    eprintln!("baseline `loop` schedule and the software-pipelined `loop.pip` schedule.");
}

fn run(input: &str, output_loop: &str, output_pip: &str) -> ExitCode {
    let lines = match read_input(input) {
        Ok(lines) => lines,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let projections = match vliw470_driver::compile(&lines) {
        Ok(projections) => projections,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = write_rows(output_loop, &projections.loop_schedule.to_rows()) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }
    if let Err(err) = write_rows(output_pip, &projections.loop_pip_schedule.to_rows()) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn read_input(path: &str) -> Result<Vec<String>, Error> {
    let text = std::fs::read_to_string(path)?;
    let lines: Vec<String> = serde_json::from_str(&text)?;
    Ok(lines)
}

fn write_rows(path: &str, rows: &[[String; 5]]) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(rows)?;
    std::fs::write(path, json)?;
    Ok(())
}
