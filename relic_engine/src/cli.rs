use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use relic_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(about = "Step a script program from an RDAT archive", version)]
pub struct Args {
    /// Archive holding the program
    #[arg(long, value_name = "PATH")]
    pub archive: PathBuf,

    /// Id of the program to run
    #[arg(long, value_name = "ID")]
    pub program: u16,

    /// Optional JSON engine config; flags below override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Stop after this many steps
    #[arg(long, value_name = "N")]
    pub max_steps: Option<usize>,

    /// Operand stack slots
    #[arg(long, value_name = "N")]
    pub stack_capacity: Option<usize>,

    /// Decode archive tables on a single thread
    #[arg(long)]
    pub sequential: bool,

    /// Print the trace as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug)]
pub struct RunRequest {
    pub archive: PathBuf,
    pub program: u16,
    pub config: EngineConfig,
    pub json: bool,
}

impl Args {
    pub fn into_request(self) -> Result<RunRequest> {
        let mut config = EngineConfig::from_json_file(self.config.as_deref())
            .context("loading engine config")?;
        config.apply_env();

        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        if let Some(stack_capacity) = self.stack_capacity {
            config.stack_capacity = stack_capacity;
        }
        if self.sequential {
            config.parallel_decode = false;
        }
        if config.max_steps == 0 {
            bail!("--max-steps must be at least 1");
        }

        Ok(RunRequest {
            archive: self.archive,
            program: self.program,
            config,
            json: self.json,
        })
    }
}

pub fn parse() -> Result<RunRequest> {
    Args::parse().into_request()
}
