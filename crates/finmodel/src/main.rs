use std::io::Write;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use finmodel::cli::Args;
use finmodel::data::{self, DataDirectory};
use finmodel::init_logging;
use finmodel::run::{build_request, run_job};
use finmodel_core::Orchestrator;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let data_dir = DataDirectory::new(args.data_dir.unwrap_or_else(DataDirectory::default_path));

    init_logging(data_dir.root(), &args.log_level)?;

    let config = data_dir.load_config()?;
    let (model_id, store) = data::load_model(&args.model)?;
    let request = build_request(&args.command, &model_id)?;

    let repo = data_dir.open_repository(config.repository)?;
    let mut orchestrator = Orchestrator::new(store.clone(), repo, config.orchestrator);
    let output = run_job(&orchestrator, store.as_ref(), request, args.dedupe_key);
    orchestrator.shutdown();
    let output = output?;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &output).wrap_err("failed to write output")?;
    writeln!(stdout)?;

    tracing::info!("finmodel finished");
    Ok(())
}
