use anyhow::Result;
use courier::app::AppMode;
use courier::common::run_cli;

#[tokio::main]
async fn main() -> Result<()> {
    run_cli(
        "courier-coordinator",
        "courier job queue - dispatch coordinator",
        "Runs the dispatch coordinator: HTTP API, completion-event listener and worker process supervisor",
        vec![],
        |_| Ok(AppMode::Coordinator),
    )
    .await
}
