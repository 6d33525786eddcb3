use anyhow::{Result, bail};

use crate::Context;
use crate::cli::ConfigCommand;
use crate::config::Config;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => show(ctx),
        ConfigCommand::Path => path(),
        ConfigCommand::Init { force } => init(ctx, force),
    }
}

fn show(ctx: &Context) -> Result<()> {
    let file = paths::config_file()?;
    let config = Config::load_from(&file)?;

    if !ctx.quiet {
        ui::header("Configuration");
        ui::kv("File", &file.display().to_string());
        ui::kv("Templates", &config.templates_dir()?.display().to_string());
        if !file.exists() {
            ui::dim("No config file, showing defaults. Use 'fleetrun config init' to create one.");
        }
        println!();
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

fn path() -> Result<()> {
    println!("{}", paths::config_file()?.display());
    Ok(())
}

fn init(ctx: &Context, force: bool) -> Result<()> {
    let file = paths::config_file()?;
    write_default(&file, force)?;
    if !ctx.quiet {
        ui::success(&format!("Wrote {}", file.display()));
    }
    Ok(())
}

fn write_default(file: &std::path::Path, force: bool) -> Result<()> {
    if file.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", file.display());
    }
    Config::default().save_to(file)
}
