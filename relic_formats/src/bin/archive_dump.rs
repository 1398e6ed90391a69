use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use relic_formats::{
    ArchiveCodec, ArchiveFile, DecodeOptions, LoadReport, OpcodeRegistry, TableSummary,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(about = "Inspect RDAT resource archives", version)]
struct Args {
    /// Archive to inspect
    #[arg(value_name = "ARCHIVE", required_unless_present = "opcodes")]
    archive: Option<PathBuf>,

    /// Print a JSON summary instead of the table listing
    #[arg(long)]
    json: bool,

    /// List the opcode table
    #[arg(long)]
    opcodes: bool,

    /// Disassemble the program with this id
    #[arg(long, value_name = "ID")]
    disassemble: Option<u16>,

    /// Decode entries on the calling thread only
    #[arg(long)]
    sequential: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    path: &'a Path,
    tables: Vec<TableSummary>,
    report: &'a LoadReport,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let registry = OpcodeRegistry::standard().context("building opcode registry")?;

    if args.opcodes {
        for descriptor in registry.descriptors() {
            println!(
                "{opcode:#04x}  {name:<20} {width} byte(s)",
                opcode = descriptor.opcode,
                name = descriptor.name,
                width = descriptor.width
            );
        }
        if args.archive.is_none() {
            return Ok(());
        }
    }

    let Some(path) = args.archive.as_deref() else {
        bail!("usage: archive_dump <ARCHIVE>");
    };
    let codec = ArchiveCodec::with_options(
        &registry,
        DecodeOptions {
            parallel: !args.sequential,
        },
    );
    let archive = ArchiveFile::open(&codec, path)?;

    if let Some(id) = args.disassemble {
        let programs = &archive.database().programs;
        match programs.get(id) {
            Some(program) => print!("{}", program.disassemble()),
            None => match programs.failure(id) {
                Some(message) => bail!("program {id} failed to decode: {message}"),
                None => bail!("no program {id} in {}", path.display()),
            },
        }
        return Ok(());
    }

    let tables = archive.database().summary();
    if args.json {
        let summary = Summary {
            path: archive.path(),
            tables,
            report: archive.report(),
        };
        let json = serde_json::to_string_pretty(&summary).context("serializing summary")?;
        println!("{json}");
        return Ok(());
    }

    println!("{}", archive.path().display());
    for table in tables {
        if table.loaded == 0 && table.failed == 0 {
            continue;
        }
        println!(
            "{kind:<14} {loaded:>6} loaded {failed:>6} failed",
            kind = table.kind.name(),
            loaded = table.loaded,
            failed = table.failed
        );
    }
    for failure in &archive.report().failures {
        println!("failed {} {}: {}", failure.kind, failure.id, failure.message);
    }
    for warning in &archive.report().warnings {
        println!("warning: {warning}");
    }
    Ok(())
}
