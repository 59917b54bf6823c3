use aiwhisper_core::Plan;

use super::cli::ValidateArgs;
use crate::error::CliError;

pub fn validate(args: &ValidateArgs) -> Result<i32, CliError> {
    let plan = Plan::load(&args.plan)?;
    println!("{}", render_stages(&plan));
    Ok(0)
}

pub fn render_stages(plan: &Plan) -> String {
    let mut out = format!("PLAN OK {} tasks", plan.len());
    if !plan.goal().is_empty() {
        out.push_str(&format!(": {}", plan.goal()));
    }
    for (idx, stage) in plan.stages().iter().enumerate() {
        out.push_str(&format!("\n  stage {}: {}", idx, stage.join(", ")));
    }
    out
}
