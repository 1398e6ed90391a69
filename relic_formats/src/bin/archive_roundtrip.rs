use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use relic_formats::{ArchiveCodec, ArchiveFile, OpcodeRegistry, ResourceKind};

#[derive(Parser, Debug)]
#[command(about = "Load an archive, save it again, and check the reload matches", version)]
struct Args {
    /// Archive to round-trip
    #[arg(value_name = "ARCHIVE")]
    archive: PathBuf,

    /// Write the re-encoded archive here
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let registry = OpcodeRegistry::standard().context("building opcode registry")?;
    let codec = ArchiveCodec::new(&registry);

    let original = ArchiveFile::open(&codec, &args.archive)?;
    let reloaded = match &args.output {
        Some(output) => {
            ArchiveFile::save_to_path(&codec, original.database(), output)?;
            ArchiveFile::open(&codec, output)?.into_loaded()
        }
        None => {
            let bytes = codec
                .save(original.database())
                .context("re-encoding archive")?;
            codec.load(&bytes).context("reloading re-encoded archive")?
        }
    };

    let mut expected = original.database().clone();
    expected.clear_failures();
    if reloaded.database != expected {
        let changed: Vec<&str> = ResourceKind::ALL
            .iter()
            .filter(|&&kind| expected.counts(kind) != reloaded.database.counts(kind))
            .map(|kind| kind.name())
            .collect();
        if changed.is_empty() {
            bail!("round trip changed resource contents");
        }
        bail!("round trip changed tables: {}", changed.join(", "));
    }

    println!(
        "{}: round trip ok ({} failed entries dropped)",
        args.archive.display(),
        original.report().failures.len()
    );
    Ok(())
}
