mod api;
mod cli;
mod commands;
mod config;
mod connector;
mod inventory;
mod logging;
mod paths;
mod progress;
mod server;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match dispatch_command(&ctx, cli.command) {
        Ok(code) => code,
        Err(e) => {
            ui::error(&format!("{e:#}"));
            ExitCode::from(2)
        }
    }
}

fn dispatch_command(ctx: &Context, command: Command) -> Result<ExitCode> {
    log::debug!("fleetrun {} (verbosity {})", env!("CARGO_PKG_VERSION"), ctx.verbose);
    match command {
        Command::Render(args) => commands::render::run(ctx, args).map(|()| ExitCode::SUCCESS),
        Command::Run(args) => commands::run::run(ctx, args),
        Command::Serve(args) => commands::serve::run(ctx, args).map(|()| ExitCode::SUCCESS),
        Command::Config(cmd) => commands::config::run(ctx, cmd).map(|()| ExitCode::SUCCESS),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "fleetrun", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
