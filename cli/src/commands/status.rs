use aiwhisper_core::config::AppConfig;
use aiwhisper_core::state::StateSnapshot;

use super::cli::StatusArgs;
use crate::error::CliError;

pub async fn status(args: &StatusArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let path = args.state.clone();
    let timeout = cfg.state.lock_timeout();
    let snapshot =
        tokio::task::spawn_blocking(move || StateSnapshot::load_from_file(&path, timeout))
            .await
            .map_err(|e| CliError::Command(e.to_string()))??;
    println!("{}", render_status(&snapshot));
    Ok(0)
}

pub fn render_status(snapshot: &StateSnapshot) -> String {
    let run_state = snapshot
        .global_state
        .get("last_run_state")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let mut out = format!(
        "snapshot saved {} (last run: {})",
        snapshot.saved_at.to_rfc3339(),
        run_state
    );
    for (id, state) in &snapshot.tasks {
        out.push_str(&format!("\n  {:<24} {}", id, state.status));
        if let Some(err) = &state.error {
            out.push_str(&format!("  {}", err));
        }
    }
    out
}
