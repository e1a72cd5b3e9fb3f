//! Main entry point for the meshanim CLI

mod cli;
mod commands;
mod utils;

use anyhow::Result;
use clap::CommandFactory;
use clap::Parser;
use clap_complete::{Generator, generate};
use std::io;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    utils::logging::init(level);

    match cli.command {
        Commands::Info { file, detailed } => commands::info::execute(&file, detailed),
        Commands::Joints {
            file,
            depth,
            no_color,
        } => commands::joints::execute(&file, depth, no_color),
        Commands::Sample {
            file,
            frame,
            joint,
            constant,
        } => commands::sample::execute(&file, frame, joint.as_deref(), constant),
        Commands::Validate { file, strict } => commands::validate::execute(&file, strict),
        Commands::Completions { shell } => {
            print_completions(shell, &mut Cli::command());
            Ok(())
        }
    }
}

fn print_completions<G: Generator>(generator: G, cmd: &mut clap::Command) {
    generate(
        generator,
        cmd,
        cmd.get_name().to_string(),
        &mut io::stdout(),
    );
}
