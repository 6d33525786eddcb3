use anyhow::{Context, Result, bail};
use dialoguer::Confirm;
use dispatch::{CancelToken, Engine, RunMode, RunReport};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use crate::Context as AppContext;
use crate::api::{PayloadSource, RunOptions, RunRequest, TargetMode};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::connector::Transports;
use crate::inventory;
use crate::progress::RunProgress;
use crate::ui;
use template::Variables;

pub fn run(ctx: &AppContext, args: RunArgs) -> Result<ExitCode> {
    let config = Config::load()?;
    let templates_dir = config.templates_dir()?;
    let request = build_request(&args)?;

    if request.mode == TargetMode::RenderOnly {
        let payload = request.source.resolve(&request.variables, &templates_dir)?;
        println!("{payload}");
        return Ok(ExitCode::SUCCESS);
    }

    let prepared = request.prepare(&config.run_config(), &templates_dir)?;
    if prepared.mode == RunMode::Push && !args.yes && !confirm_push(prepared.devices.len())? {
        bail!("Push aborted");
    }

    let cancel = CancelToken::new();
    watch_ctrl_c(cancel.clone())?;

    let progress = if args.json || ctx.quiet {
        RunProgress::hidden()
    } else {
        RunProgress::new()
    };
    let engine = Engine::new(Arc::new(Transports::from_config(&config)));
    let report = prepared.execute(&engine, cancel, &progress)?;

    if let Some(path) = &args.output {
        write_report(&report, path)?;
    }
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else if !ctx.quiet {
        ui::print_report(&report, args.show_output);
        if let Some(path) = &args.output {
            ui::dim(&format!("Report written to {}", path.display()));
        }
    }

    Ok(exit_code(&report))
}

/// Start from `--request` when given, then apply the remaining flags.
fn build_request(args: &RunArgs) -> Result<RunRequest> {
    let mut request = match &args.request {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            serde_json::from_str::<RunRequest>(&content)
                .with_context(|| format!("Invalid run request in {}", path.display()))?
        }
        None => {
            let mode = args
                .mode
                .context("--mode is required unless --request is given")?;
            RunRequest {
                run_id: None,
                source: PayloadSource::default(),
                variables: Variables::new(),
                mode: mode.into(),
                devices: Vec::new(),
                options: RunOptions::default(),
            }
        }
    };

    if let Some(mode) = args.mode {
        request.mode = mode.into();
    }
    let (source, variables) = super::source_from_args(&args.source)?;
    if !args.source.is_empty() {
        request.source = source;
    }
    request.variables.merge(variables);
    if let Some(path) = &args.inventory {
        request.devices = inventory::load_devices(path)?;
    }
    if let Some(run_id) = &args.run_id {
        request.run_id = Some(run_id.clone());
    }

    let options = &mut request.options;
    if let Some(jobs) = args.jobs {
        options.max_concurrency = Some(jobs);
    }
    if let Some(secs) = args.timeout {
        options.per_device_timeout_ms = Some(secs.saturating_mul(1000));
    }
    if let Some(retries) = args.retries {
        options.max_retries = Some(retries);
    }
    if let Some(ms) = args.backoff_ms {
        options.retry_backoff_ms = Some(ms);
    }
    Ok(request)
}

fn confirm_push(count: usize) -> Result<bool> {
    if !console::Term::stderr().is_term() {
        bail!("Refusing to push without --yes outside an interactive terminal");
    }
    let confirmed = Confirm::new()
        .with_prompt(format!("Push to {count} device(s)?"))
        .default(false)
        .interact()?;
    Ok(confirmed)
}

/// Cancel the run on the first ctrl-c.
fn watch_ctrl_c(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupted, cancelling run");
                    cancel.cancel();
                }
            });
        })
        .context("Failed to start signal thread")?;
    Ok(())
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Could not write {}", path.display()))
}

/// 0 when every device succeeded, 1 otherwise
pub fn exit_code(report: &RunReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
