use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use x64gen_rs::{instructions, GenConfig, Unit};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Generate C encoding tables and parameter accessors for x64"
)]
struct Opts {
    /// JSON instruction table; the built-in table is used when omitted
    #[arg(short, long, value_name = "FILE")]
    table: Option<PathBuf>,
    /// JSON generator config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(short, long, value_name = "DIR")]
    out: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            GenConfig::from_json(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => GenConfig::default(),
    };
    let descs = match &opts.table {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            instructions::load_table_json(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => instructions::x64_table(),
    };

    let artifacts = Unit::from_descs(config, &descs)?.translate()?;

    fs::create_dir_all(&opts.out)?;
    for (phase, text) in &artifacts.blocks {
        fs::write(opts.out.join(format!("{}.c.inc", phase.name())), text)?;
    }
    for (name, text) in &artifacts.files {
        fs::write(opts.out.join(name), text)?;
    }
    fs::write(opts.out.join("scalars.json"), serde_json::to_string_pretty(&artifacts.scalars)?)?;

    info!(out = %opts.out.display(), insts = artifacts.scalars.n_insts, "wrote artifacts");
    Ok(())
}
