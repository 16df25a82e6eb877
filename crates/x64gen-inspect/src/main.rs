use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use x64gen_inspect::{domains_text, layout_text, load_config, load_table, operands_text, DomainOut, OperandOut};
use x64gen_rs::isa::x64::Param;
use x64gen_rs::layout::LayoutCompiler;
use x64gen_rs::{operands, Unit};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect operand parsing, parameter layouts and domains")]
struct Opts {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Parse an operand specification string such as "rm32:rw; imm8:r"
    Operands {
        spec: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show the packed parameter struct
    Layout {
        /// Basic parameter set instead of the full one
        #[arg(long)]
        basic: bool,
        /// JSON generator config
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Run generation and list the registered parameter domains
    Domains {
        /// JSON instruction table; the built-in table is used when omitted
        #[arg(long)]
        table: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Opts::parse().cmd {
        Cmd::Operands { spec, format } => {
            let ops = operands::parse(&spec)?;
            match format {
                OutputFormat::Text => print!("{}", operands_text(&ops)),
                OutputFormat::Json => {
                    let rows: Vec<OperandOut> = ops.iter().map(OperandOut::from).collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
        Cmd::Layout { basic, config, format } => {
            let config = load_config(config.as_deref())?;
            let params: &[Param] = if basic { &Param::BASIC } else { &Param::ALL };
            let layout = LayoutCompiler::for_params(params, basic, config.params_bit_budget)?.compile()?;
            match format {
                OutputFormat::Text => print!("{}", layout_text(&layout)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&layout)?),
            }
        }
        Cmd::Domains { table, config, format } => {
            let config = load_config(config.as_deref())?;
            let descs = load_table(table.as_deref())?;
            let artifacts = Unit::from_descs(config, &descs)?.translate()?;
            match format {
                OutputFormat::Text => print!("{}", domains_text(&artifacts.domains)),
                OutputFormat::Json => {
                    let rows: Vec<DomainOut> = artifacts.domains.iter().map(DomainOut::from).collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
            }
        }
    }
    Ok(())
}
