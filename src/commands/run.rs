use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::scheduler::Scheduler;

pub async fn run(config: AppConfig) -> Result<()> {
    let ctx = super::connect(&config).await?;

    Scheduler::new(Arc::new(ctx), config.schedule)
        .run_until_shutdown()
        .await
}
