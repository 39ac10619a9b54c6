use anyhow::{Context, Result};
use clap::Arg;
use courier::app::AppMode;
use courier::common::run_cli;
use courier_domain::entities::JobType;

#[tokio::main]
async fn main() -> Result<()> {
    // Worker-specific arguments, passed by the supervisor on spawn.
    let custom_args = vec![
        Arg::new("worker-id")
            .short('w')
            .long("worker-id")
            .value_name("ID")
            .help("Registry id of this worker")
            .required(true)
            .value_parser(clap::value_parser!(i64)),
        Arg::new("worker-type")
            .short('t')
            .long("worker-type")
            .value_name("TYPE")
            .help("Job type this worker handles for life")
            .required(true)
            .value_parser(["email", "whatsapp", "sms", "notification", "cronjob"]),
    ];

    run_cli(
        "courier-worker",
        "courier job queue - worker process",
        "Runs a single worker: polls the coordinator for its job type, executes jobs and reports results",
        custom_args,
        |matches| {
            let worker_id = *matches
                .get_one::<i64>("worker-id")
                .context("worker-id is required")?;
            let worker_type: JobType = matches
                .get_one::<String>("worker-type")
                .context("worker-type is required")?
                .parse()?;
            Ok(AppMode::Worker {
                worker_id,
                worker_type,
            })
        },
    )
    .await
}
