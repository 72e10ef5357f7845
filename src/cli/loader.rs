use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use csv::{ReaderBuilder, StringRecord};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::query::functions::{
    build_edges, build_vertex_degrees, EdgeBatch, EdgeShape, WeightColumn,
};
use crate::storage::{Csr, CsrRegistry, RegistryOptions};
use crate::types::{CsrError, CsrId, LogicalType, WeightKind};

/// Rows per batch when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Error type for CLI loading operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Configuration file could not be parsed.
    #[error("invalid config file: {0}")]
    Config(#[from] toml::de::Error),
    /// CSR build error.
    #[error(transparent)]
    Csr(#[from] CsrError),
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}

/// Tunables read from the optional TOML config file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Worker threads feeding batches.
    pub workers: usize,
    /// Rows per batch.
    pub batch_size: usize,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    /// Largest element count any CSR array may be sized to.
    pub max_elements: Option<usize>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, |n| n.get()),
            batch_size: DEFAULT_BATCH_SIZE,
            log_filter: None,
            max_elements: None,
        }
    }
}

impl LoaderConfig {
    /// Loads the config from `explicit`, or from the per-user default path
    /// when that file exists, or falls back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|path| path.exists()),
        };
        match path {
            Some(path) => {
                let text = fs::read_to_string(&path)?;
                let config: LoaderConfig = toml::from_str(&text)?;
                debug!(path = %path.display(), "loader.config_loaded");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Registry options derived from this config.
    pub fn registry_options(&self) -> RegistryOptions {
        match self.max_elements {
            Some(max) => RegistryOptions::new().max_elements(max),
            None => RegistryOptions::new(),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("pgq-csr").join("config.toml"))
}

/// Where and how to read an edge list.
#[derive(Clone, Debug)]
pub struct EdgeListConfig {
    /// CSV file with one edge per row.
    pub path: PathBuf,
    /// Source vertex column.
    pub src_column: String,
    /// Destination vertex column.
    pub dst_column: String,
    /// Optional weight column.
    pub weight_column: Option<String>,
    /// Declared type of the weight column.
    pub weight_type: LogicalType,
    /// Vertex count; defaults to the largest id seen plus one.
    pub vertex_count: Option<i64>,
}

impl EdgeListConfig {
    /// Unweighted edge list with `src`/`dst` columns.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            src_column: "src".into(),
            dst_column: "dst".into(),
            weight_column: None,
            weight_type: LogicalType::BigInt,
            vertex_count: None,
        }
    }
}

/// Weight values of an edge list.
#[derive(Clone, Debug)]
pub enum EdgeWeights {
    /// `BIGINT` weights.
    Int(Vec<i64>),
    /// `DOUBLE` weights.
    Double(Vec<f64>),
}

/// Parsed edge list. Edge ids are row numbers.
#[derive(Clone, Debug, Default)]
pub struct EdgeList {
    /// Source per edge.
    pub sources: Vec<i64>,
    /// Destination per edge.
    pub destinations: Vec<i64>,
    /// Optional weight per edge.
    pub weights: Option<EdgeWeights>,
    /// Number of vertices.
    pub vertex_count: i64,
}

impl EdgeList {
    /// Number of edge rows read.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no rows were read.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Reads an edge list from CSV.
pub fn read_edge_list(config: &EdgeListConfig) -> Result<EdgeList, CliError> {
    let weight_kind = match config.weight_column {
        Some(_) => Some(WeightKind::from_logical(config.weight_type)?),
        None => None,
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&config.path)?;
    let headers = reader.headers()?.clone();
    let src_idx = column_index(&headers, &config.src_column)?;
    let dst_idx = column_index(&headers, &config.dst_column)?;
    let weight_idx = match &config.weight_column {
        Some(name) => Some(column_index(&headers, name)?),
        None => None,
    };

    let mut list = EdgeList {
        weights: weight_kind.map(|kind| match kind {
            WeightKind::Int => EdgeWeights::Int(Vec::new()),
            WeightKind::Double => EdgeWeights::Double(Vec::new()),
        }),
        ..EdgeList::default()
    };
    let mut max_vertex = -1i64;
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let line = row + 2;
        let src = parse_field::<i64>(&record, src_idx, line)?;
        let dst = parse_field::<i64>(&record, dst_idx, line)?;
        if src < 0 || dst < 0 {
            return Err(format!("line {line}: vertex ids must be non-negative").into());
        }
        max_vertex = max_vertex.max(src).max(dst);
        list.sources.push(src);
        list.destinations.push(dst);
        if let (Some(idx), Some(weights)) = (weight_idx, list.weights.as_mut()) {
            match weights {
                EdgeWeights::Int(values) => values.push(parse_field(&record, idx, line)?),
                EdgeWeights::Double(values) => values.push(parse_field(&record, idx, line)?),
            }
        }
    }
    list.vertex_count = config.vertex_count.unwrap_or(max_vertex + 1);
    debug!(
        path = %config.path.display(),
        edges = list.len(),
        vertices = list.vertex_count,
        "loader.edge_list_read"
    );
    Ok(list)
}

fn column_index(headers: &StringRecord, name: &str) -> Result<usize, CliError> {
    headers
        .iter()
        .position(|header| header == name)
        .ok_or_else(|| CliError::Message(format!("missing column '{name}'")))
}

fn parse_field<T: std::str::FromStr>(
    record: &StringRecord,
    idx: usize,
    line: usize,
) -> Result<T, CliError> {
    let raw = record
        .get(idx)
        .ok_or_else(|| CliError::Message(format!("line {line}: missing field {idx}")))?;
    raw.parse()
        .map_err(|_| CliError::Message(format!("line {line}: cannot parse '{raw}'")))
}

/// Summary of one CSR build.
#[derive(Clone, Debug, Serialize)]
pub struct BuildReport {
    /// Structure id that was built.
    pub id: CsrId,
    /// Number of vertices.
    pub vertex_count: usize,
    /// Number of edges stored.
    pub edge_count: usize,
    /// Active weight representation.
    pub weight_kind: Option<WeightKind>,
    /// Degree batches processed.
    pub degree_batches: usize,
    /// Edge batches processed.
    pub edge_batches: usize,
    /// Worker threads used.
    pub workers: usize,
    /// Wall-clock build time.
    pub elapsed_ms: u64,
}

/// Plays the relational layer for an in-memory edge list: aggregates
/// degrees over the edges whose endpoints both exist, compares them with the
/// raw edge count, and drives the batched entry points from a pool of
/// workers. Any edge referring to a missing vertex fails the build.
pub fn build_csr(
    registry: &CsrRegistry,
    id: CsrId,
    edges: &EdgeList,
    config: &LoaderConfig,
) -> Result<(Arc<Csr>, BuildReport), CliError> {
    let started = Instant::now();
    let batch_size = config.batch_size.max(1);
    let workers = config.workers.max(1);
    let vertex_count = edges.vertex_count;
    let in_range = |v: i64| (0..vertex_count).contains(&v);

    let vertices = usize::try_from(vertex_count)
        .map_err(|_| CliError::Message(format!("invalid vertex count {vertex_count}")))?;
    // Edge table joined with the vertex table on both endpoints.
    let joined: Vec<usize> = (0..edges.len())
        .filter(|&row| in_range(edges.sources[row]) && in_range(edges.destinations[row]))
        .collect();
    let mut degrees = vec![0i64; vertices];
    for &row in &joined {
        degrees[edges.sources[row] as usize] += 1;
    }
    let expected_edges: i64 = degrees.iter().sum();
    let vertex_ids: Vec<i64> = (0..vertex_count).collect();

    let sources: Vec<i64> = joined.iter().map(|&row| edges.sources[row]).collect();
    let destinations: Vec<i64> = joined.iter().map(|&row| edges.destinations[row]).collect();
    let edge_ids: Vec<i64> = joined.iter().map(|&row| row as i64).collect();
    let weights = edges.weights.as_ref().map(|weights| match weights {
        EdgeWeights::Int(values) => {
            EdgeWeights::Int(joined.iter().map(|&row| values[row]).collect())
        }
        EdgeWeights::Double(values) => {
            EdgeWeights::Double(joined.iter().map(|&row| values[row]).collect())
        }
    });

    let degree_batches = batch_count(vertices, batch_size);
    run_batches(workers, degree_batches, |batch| {
        let range = batch_range(batch, batch_size, vertices);
        build_vertex_degrees(
            registry,
            id,
            vertex_count,
            &vertex_ids[range.clone()],
            &degrees[range],
        )
        .map(|_| ())
    })?;

    let shape = EdgeShape {
        vertex_count,
        expected_edges,
        observed_edges: edges.len() as i64,
    };
    let edge_batches = batch_count(joined.len(), batch_size);
    run_batches(workers, edge_batches, |batch| {
        let range = batch_range(batch, batch_size, joined.len());
        let mut rows = EdgeBatch::new(
            &sources[range.clone()],
            &destinations[range.clone()],
            &edge_ids[range.clone()],
        );
        rows.weights = weights.as_ref().map(|weights| match weights {
            EdgeWeights::Int(values) => WeightColumn::Int(&values[range.clone()]),
            EdgeWeights::Double(values) => WeightColumn::Double(&values[range.clone()]),
        });
        build_edges(registry, id, shape, rows).map(|_| ())
    })?;

    let csr = registry
        .lookup(id)
        .ok_or_else(|| CliError::Message(format!("csr {id} vanished after its build")))?;
    csr.verify_complete()?;
    let report = BuildReport {
        id,
        vertex_count: csr.vertex_count(),
        edge_count: csr.edge_count(),
        weight_kind: csr.weight_kind(),
        degree_batches,
        edge_batches,
        workers,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        csr = id.0,
        vertices = report.vertex_count,
        edges = report.edge_count,
        elapsed_ms = report.elapsed_ms,
        "loader.csr_built"
    );
    Ok((csr, report))
}

/// At least one batch, so an empty input still erects the skeleton.
fn batch_count(rows: usize, batch_size: usize) -> usize {
    rows.div_ceil(batch_size).max(1)
}

fn batch_range(batch: usize, batch_size: usize, rows: usize) -> std::ops::Range<usize> {
    let start = (batch * batch_size).min(rows);
    start..(start + batch_size).min(rows)
}

/// Runs `task` for every batch index on up to `workers` threads. Returns the
/// first failure; remaining batches are skipped once one fails.
fn run_batches<F>(workers: usize, batches: usize, task: F) -> Result<(), CsrError>
where
    F: Fn(usize) -> Result<(), CsrError> + Sync,
{
    let next = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let failure: Mutex<Option<CsrError>> = Mutex::new(None);
    thread::scope(|scope| {
        for _ in 0..workers.min(batches).max(1) {
            scope.spawn(|| {
                while !stop.load(Ordering::Acquire) {
                    let batch = next.fetch_add(1, Ordering::Relaxed);
                    if batch >= batches {
                        break;
                    }
                    if let Err(err) = task(batch) {
                        stop.store(true, Ordering::Release);
                        failure.lock().get_or_insert(err);
                        break;
                    }
                }
            });
        }
    });
    match failure.into_inner() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Reads `config.path` and builds it into a fresh registry.
pub fn load_and_build(
    edge_list: &EdgeListConfig,
    config: &LoaderConfig,
    id: CsrId,
) -> Result<(CsrRegistry, BuildReport), CliError> {
    let edges = read_edge_list(edge_list)?;
    let registry = CsrRegistry::new(config.registry_options());
    let (_, report) = build_csr(&registry, id, &edges, config)?;
    Ok((registry, report))
}
