//! Binary entry point for the pgq-csr command line tool.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pgq_csr::cli::init_tracing;
use pgq_csr::cli::loader::{load_and_build, BuildReport, EdgeListConfig, LoaderConfig};
use pgq_csr::storage::{Csr, Weight};
use pgq_csr::{CsrId, LogicalType};

#[derive(Parser, Debug)]
#[command(
    name = "pgq-csr",
    version,
    about = "Build CSR adjacency structures from edge lists",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "TOML config file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a CSR and print a summary.
    Build(BuildCmd),
    /// Build a CSR and print its arrays and adjacency lists.
    Dump(BuildCmd),
}

#[derive(Args, Debug)]
struct BuildCmd {
    #[arg(value_name = "EDGES", help = "CSV file containing edges")]
    edges: PathBuf,

    #[arg(long, help = "Vertex count (default: largest id + 1)")]
    vertices: Option<i64>,

    #[arg(long, default_value = "src", help = "Edge source column name")]
    src_column: String,

    #[arg(long, default_value = "dst", help = "Edge destination column name")]
    dst_column: String,

    #[arg(long, help = "Edge weight column name")]
    weight_column: Option<String>,

    #[arg(
        long,
        default_value = "bigint",
        value_parser = parse_logical_type,
        help = "Declared weight column type (bigint or double)"
    )]
    weight_type: LogicalType,

    #[arg(long, env = "PGQ_CSR_WORKERS", help = "Worker threads feeding batches")]
    workers: Option<usize>,

    #[arg(long, help = "Rows per batch")]
    batch_size: Option<usize>,

    #[arg(long, default_value_t = 0, help = "Structure id to build")]
    id: i32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_logical_type(raw: &str) -> Result<LogicalType, String> {
    LogicalType::parse(raw).ok_or_else(|| format!("unknown column type '{raw}'"))
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = LoaderConfig::load(cli.config.as_deref())?;
    init_tracing(config.log_filter.as_deref());

    match cli.command {
        Command::Build(cmd) => {
            apply_overrides(&mut config, &cmd);
            let (_registry, report) =
                load_and_build(&edge_list_config(&cmd), &config, CsrId(cmd.id))?;
            emit(cli.format, &report, || print_report_text(&report))?;
        }
        Command::Dump(cmd) => {
            apply_overrides(&mut config, &cmd);
            let id = CsrId(cmd.id);
            let (registry, report) = load_and_build(&edge_list_config(&cmd), &config, id)?;
            let csr = registry
                .lookup(id)
                .ok_or_else(|| format!("csr {id} missing after build"))?;
            let snapshot = csr.snapshot();
            emit(cli.format, &snapshot, || {
                print_report_text(&report);
                println!("{csr}");
                print_adjacency(&csr);
            })?;
        }
    }
    Ok(())
}

fn apply_overrides(config: &mut LoaderConfig, cmd: &BuildCmd) {
    if let Some(workers) = cmd.workers {
        config.workers = workers;
    }
    if let Some(batch_size) = cmd.batch_size {
        config.batch_size = batch_size;
    }
}

fn edge_list_config(cmd: &BuildCmd) -> EdgeListConfig {
    EdgeListConfig {
        path: cmd.edges.clone(),
        src_column: cmd.src_column.clone(),
        dst_column: cmd.dst_column.clone(),
        weight_column: cmd.weight_column.clone(),
        weight_type: cmd.weight_type,
        vertex_count: cmd.vertices,
    }
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: serde::Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_report_text(report: &BuildReport) {
    println!(
        "csr {}: vertices={} edges={} weights={}",
        report.id,
        report.vertex_count,
        report.edge_count,
        report
            .weight_kind
            .map_or_else(|| "none".to_string(), |kind| kind.to_string())
    );
    println!(
        "  workers={} degree_batches={} edge_batches={} elapsed_ms={}",
        report.workers, report.degree_batches, report.edge_batches, report.elapsed_ms
    );
}

fn print_adjacency(csr: &Csr) {
    for vertex in 0..csr.vertex_count() as i64 {
        let Ok(neighbors) = csr.neighbors(vertex) else {
            continue;
        };
        let entries: Vec<String> = neighbors
            .map(|n| match n.weight {
                Some(Weight::Int(w)) => format!("{}#{}({w})", n.destination, n.edge_id),
                Some(Weight::Double(w)) => format!("{}#{}({w})", n.destination, n.edge_id),
                None => format!("{}#{}", n.destination, n.edge_id),
            })
            .collect();
        println!("{vertex} -> [{}]", entries.join(", "));
    }
}
