use anyhow::{Context, Result};
use std::fs;

use crate::Context as AppContext;
use crate::cli::RenderArgs;
use crate::config::Config;
use crate::ui;

pub fn run(ctx: &AppContext, args: RenderArgs) -> Result<()> {
    let config = Config::load()?;
    let (source, variables) = super::source_from_args(&args.source)?;
    let payload = source.resolve(&variables, &config.templates_dir()?)?;

    match args.output {
        Some(path) => {
            fs::write(&path, payload.as_str())
                .with_context(|| format!("Could not write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!(
                    "Wrote {} bytes to {}",
                    payload.len(),
                    path.display()
                ));
            }
        }
        None => println!("{payload}"),
    }
    Ok(())
}
