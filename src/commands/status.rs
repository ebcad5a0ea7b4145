use anyhow::Result;
use owo_colors::OwoColorize;
use tasksync_core::reconcile;

use crate::config::AppConfig;
use crate::render::ClassificationRender;

pub async fn run(config: AppConfig, verbose: bool) -> Result<()> {
    let ctx = super::connect(&config).await?;

    let plan = reconcile::plan(&ctx).await?;

    println!(
        "{} {}",
        ctx.events_sheet().title().bold(),
        format!("({} events in feed, {} rows)", plan.fetched, plan.persisted).dimmed()
    );
    println!("{}", plan.classification.render(verbose));

    Ok(())
}
