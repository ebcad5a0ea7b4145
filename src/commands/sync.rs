use anyhow::Result;
use tasksync_core::reconcile;

use crate::config::AppConfig;
use crate::render::Render;

pub async fn run(config: AppConfig) -> Result<()> {
    let ctx = super::connect(&config).await?;

    let outcome = reconcile::run(&ctx).await?;
    println!("{}", outcome.render());

    Ok(())
}
