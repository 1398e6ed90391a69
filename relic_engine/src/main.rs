use anyhow::{Context, Result};
use log::info;
use relic_engine::trace_program;
use relic_formats::{ArchiveCodec, ArchiveFile, OpcodeRegistry};

mod cli;

fn main() -> Result<()> {
    env_logger::init();
    let request = cli::parse()?;

    let registry = OpcodeRegistry::standard().context("building opcode registry")?;
    let codec = ArchiveCodec::with_options(&registry, request.config.decode_options());
    let archive = ArchiveFile::open(&codec, &request.archive)?;
    if !archive.report().failures.is_empty() {
        info!(
            "{} entries failed to decode in {}",
            archive.report().failures.len(),
            archive.path().display()
        );
    }

    let trace = trace_program(archive.database(), request.program, &request.config)
        .with_context(|| format!("running program {}", request.program))?;

    if request.json {
        let json = serde_json::to_string_pretty(&trace).context("serializing trace")?;
        println!("{json}");
        return Ok(());
    }

    println!(
        "program {} ({} steps, {} unhandled)",
        trace.program,
        trace.steps.len(),
        trace.unhandled()
    );
    for step in &trace.steps {
        println!("{step}");
    }
    Ok(())
}
