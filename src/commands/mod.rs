pub mod config;
pub mod render;
pub mod run;
pub mod serve;

use crate::api::PayloadSource;
use crate::cli::SourceArgs;
use crate::inventory;
use anyhow::{Context, Result};
use std::fs;
use template::Variables;

/// Payload source and variables described by the CLI flags
pub(crate) fn source_from_args(args: &SourceArgs) -> Result<(PayloadSource, Variables)> {
    let template = args
        .template
        .as_ref()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("Could not read template {}", path.display()))
        })
        .transpose()?;
    let source = PayloadSource {
        template,
        template_name: args.template_name.clone(),
        commands: (!args.commands.is_empty()).then(|| args.commands.clone()),
    };
    let variables = inventory::collect_variables(args.vars.as_deref(), &args.set)?;
    Ok((source, variables))
}
