use anyhow::{Context, Result};
use dispatch::Engine;
use std::sync::Arc;

use crate::Context as AppContext;
use crate::cli::ServeArgs;
use crate::config::Config;
use crate::connector::Transports;
use crate::server::{self, AppState};
use crate::ui;

pub fn run(ctx: &AppContext, args: ServeArgs) -> Result<()> {
    let config = Config::load()?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let root_path = args
        .root_path
        .unwrap_or_else(|| config.server.root_path.clone());

    let run_config = config.run_config();
    run_config
        .validate()
        .context("Invalid [dispatch] settings in config")?;

    let transports = Transports::from_config(&config);
    let engine = Arc::new(Engine::new(Arc::new(transports)));
    let state = Arc::new(AppState::new(engine, run_config, config.templates_dir()?));

    if !ctx.quiet {
        ui::info(&format!(
            "Listening on {bind}{} (ctrl-c to stop)",
            server::normalize_root(&root_path).unwrap_or_default()
        ));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(state, &bind, &root_path))
}
