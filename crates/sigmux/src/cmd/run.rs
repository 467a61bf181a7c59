use std::sync::Arc;

use sigmux_repo::FsRepository;
use sigmux_stream::{Pipeline, PipelineOptions};
use sigmux_transport::Interrupt;
use tracing::debug;

use crate::cmd::{read_definitions, RunArgs};
use crate::exit::{stream_error, CliError, CliResult, INTERNAL, RESOURCE_ERROR, SUCCESS};

pub fn run(args: RunArgs) -> CliResult<i32> {
    let definitions = read_definitions(args.definitions.as_deref(), args.file.as_deref())?;

    let repo = FsRepository::open(&args.repo)
        .map_err(|err| CliError::new(RESOURCE_ERROR, format!("repository open failed: {err}")))?;
    debug!(root = %args.repo.display(), "using file repository");

    let pipeline = Pipeline::new(
        Arc::new(repo),
        PipelineOptions {
            metadata: args.metadata.into(),
            stream_data: !args.no_stream,
            ..PipelineOptions::default()
        },
    );
    install_ctrlc_handler(pipeline.interrupt())?;

    pipeline
        .run(&definitions)
        .map_err(|err| stream_error("pipeline failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(interrupt: Interrupt) -> CliResult<()> {
    ctrlc::set_handler(move || {
        interrupt.set();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
