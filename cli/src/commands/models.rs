use aiwhisper_core::ai::AiServiceClient;
use aiwhisper_core::config::AppConfig;

use crate::error::CliError;

pub async fn models(cfg: &AppConfig) -> Result<i32, CliError> {
    let client = AiServiceClient::from_config(&cfg.ai)?;
    let models = client.list_models().await?;
    for model in &models {
        match &model.name {
            Some(name) => println!("{}\t{}", model.id, name),
            None => println!("{}", model.id),
        }
    }
    tracing::info!(count = models.len(), base_url = %client.base_url(), "models listed");
    Ok(0)
}
