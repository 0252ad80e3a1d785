//! Build automation tasks for the wifi-kit project.
//!
//! Run with: `cargo xtask <command>`

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use std::process::{Command, ExitCode};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation for wifi-kit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the library for both boards and run the host tests
    CheckAll,
    /// Build the library for a board
    Build {
        #[arg(long, default_value = "pico1")]
        board: Board,
    },
    /// Build a demo application
    Demo {
        /// Demo name (e.g., provision)
        name: String,
        #[arg(long, default_value = "pico1")]
        board: Board,
    },
    /// Run the hardware-independent tests on the host
    TestHost,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Board {
    Pico1,
    Pico2,
}

impl Board {
    fn feature(self) -> &'static str {
        match self {
            Board::Pico1 => "pico1",
            Board::Pico2 => "pico2",
        }
    }

    fn target(self) -> &'static str {
        match self {
            Board::Pico1 => "thumbv6m-none-eabi",
            Board::Pico2 => "thumbv8m.main-none-eabihf",
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::CheckAll => check_all(),
        Commands::Build { board } => build_lib(board),
        Commands::Demo { name, board } => build_demo(&name, board),
        Commands::TestHost => test_host(),
    };
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn check_all() -> bool {
    if !build_lib(Board::Pico1) {
        eprintln!("{} build pico1", "FAILED:".red().bold());
        return false;
    }
    if !build_lib(Board::Pico2) {
        eprintln!("{} build pico2", "FAILED:".red().bold());
        return false;
    }
    if !test_host() {
        eprintln!("{} host tests", "FAILED:".red().bold());
        return false;
    }
    eprintln!("{}", "all checks passed".green().bold());
    true
}

fn build_lib(board: Board) -> bool {
    let features = format!("defmt,arm,wifi,{}", board.feature());
    run(Command::new("cargo").args([
        "build",
        "--lib",
        "--no-default-features",
        "--features",
        &features,
        "--target",
        board.target(),
    ]))
}

fn build_demo(name: &str, board: Board) -> bool {
    let features = format!("defmt,arm,wifi,{}", board.feature());
    run(Command::new("cargo").args([
        "build",
        "--example",
        name,
        "--no-default-features",
        "--features",
        &features,
        "--target",
        board.target(),
        "--release",
    ]))
}

fn test_host() -> bool {
    run(Command::new("cargo").args(["test", "--no-default-features", "--features", "host"]))
}

fn run(command: &mut Command) -> bool {
    eprintln!("{} {:?}", "running".cyan().bold(), command);
    match command.status() {
        Ok(status) => status.success(),
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            false
        }
    }
}
