use std::path::{Path, PathBuf};

use aiwhisper_core::config::{AppConfig, OutputFormat};
use aiwhisper_core::dispatch::AiSettings;
use aiwhisper_core::{ExecutionEngine, Plan, RunSummary, StateManager};
use aiwhisper_plugins::factory;

use super::cli::{FormatArg, RunArgs};
use crate::error::CliError;

/// Fold `run` flags into the loaded config. Flags win.
pub fn apply_run_overrides(cfg: &mut AppConfig, args: &RunArgs) {
    if let Some(model) = args.model.as_ref().filter(|m| !m.trim().is_empty()) {
        cfg.ai.model = model.clone();
    }
    if args.no_stream {
        cfg.ai.stream = false;
    }
    if let Some(format) = args.format {
        cfg.output.format = match format {
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Jsonl => OutputFormat::Jsonl,
        };
    }
    if let Some(events) = &args.events {
        cfg.output.events_path = Some(events.clone());
    }
    if let Some(root) = &args.workspace {
        cfg.workspace.root = root.to_string_lossy().into_owned();
    }
    if let Some(state) = &args.state {
        cfg.state.path = Some(state.to_string_lossy().into_owned());
    }
}

#[tracing::instrument(name = "cli.run", skip(args, cfg), fields(plan = %args.plan.display()))]
pub async fn run(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    apply_run_overrides(&mut cfg, &args);

    let plan = Plan::load(&args.plan)?;
    let state_path = cfg.state.path.as_ref().map(PathBuf::from);
    let state = prepare_state(&plan, &cfg, state_path.as_deref(), &args).await?;

    let workspace_root = PathBuf::from(&cfg.workspace.root);
    let mut builder = ExecutionEngine::builder(plan, factory::build_dispatcher()?)
        .state(state)
        .ai(factory::build_ai(&cfg)?)
        .ai_settings(AiSettings::from_config(&cfg.ai))
        .workspace(factory::build_workspace(&workspace_root))
        .tools(factory::build_tools(&workspace_root))
        .checkpoint(cfg.state.checkpoint);
    for observer in factory::build_observers(
        cfg.output.format,
        cfg.output.events_path.as_deref(),
        cfg.output.progress,
        cfg.ai.stream,
    )? {
        builder = builder.observer(observer);
    }
    if let Some(path) = &state_path {
        builder = builder.snapshot_path(path);
    }
    let engine = builder.build();

    let control = engine.control();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current task");
            control.stop();
        }
    });

    let summary = engine.run().await;
    interrupt.abort();
    let summary = summary?;

    Ok(exit_code_for_summary(&summary))
}

async fn prepare_state(
    plan: &Plan,
    cfg: &AppConfig,
    state_path: Option<&Path>,
    args: &RunArgs,
) -> Result<StateManager, CliError> {
    let state = StateManager::with_lock_timeout(cfg.state.lock_timeout());
    if !args.resume {
        return Ok(state);
    }

    let Some(path) = state_path else {
        return Err(CliError::Command("--resume needs a snapshot path".into()));
    };
    if path.exists() {
        state.load_snapshot(path).await?;
    } else {
        tracing::warn!(path = %path.display(), "no snapshot to resume from, starting fresh");
    }
    state.register_plan(plan).await;
    if args.retry_failed {
        let reset = state.reset_failed().await;
        tracing::info!(tasks = ?reset, "failed and skipped tasks reset for retry");
    }
    Ok(state)
}

/// 0 when every task completed, 2 otherwise.
pub fn exit_code_for_summary(summary: &RunSummary) -> i32 {
    if summary.is_success() {
        0
    } else {
        2
    }
}
