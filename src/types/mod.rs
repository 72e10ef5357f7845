//! Identifiers, declared column types and the error model shared by every
//! CSR build phase.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CsrError>;

/// Identifier of one CSR build, assigned by the query layer and scoped to a
/// single query execution.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CsrId(pub i32);

impl fmt::Display for CsrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declared logical type of an input column, as reported by the execution layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    /// Untyped NULL column (no weights supplied).
    Null,
    /// Boolean column.
    Boolean,
    /// 32-bit signed integer column.
    Integer,
    /// 64-bit signed integer column.
    BigInt,
    /// Single-precision floating point column.
    Float,
    /// Double-precision floating point column.
    Double,
    /// Variable-length string column.
    Varchar,
}

impl LogicalType {
    /// Returns the SQL spelling of the type.
    pub fn name(self) -> &'static str {
        match self {
            LogicalType::Null => "NULL",
            LogicalType::Boolean => "BOOLEAN",
            LogicalType::Integer => "INTEGER",
            LogicalType::BigInt => "BIGINT",
            LogicalType::Float => "FLOAT",
            LogicalType::Double => "DOUBLE",
            LogicalType::Varchar => "VARCHAR",
        }
    }

    /// Parses a SQL type name, accepting the usual aliases.
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "null" => LogicalType::Null,
            "bool" | "boolean" => LogicalType::Boolean,
            "int" | "int4" | "integer" => LogicalType::Integer,
            "bigint" | "int8" | "int64" => LogicalType::BigInt,
            "float" | "float4" | "real" => LogicalType::Float,
            "double" | "float8" | "f64" => LogicalType::Double,
            "varchar" | "text" | "string" => LogicalType::Varchar,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric representation of an edge weight column.
///
/// The two representations are mutually exclusive per CSR instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightKind {
    /// 64-bit signed integer weights.
    Int,
    /// Double-precision floating point weights.
    Double,
}

impl WeightKind {
    /// Selects the weight representation for a declared column type.
    ///
    /// Only `BIGINT` and `DOUBLE` columns can carry weights.
    pub fn from_logical(ty: LogicalType) -> Result<Self> {
        match ty {
            LogicalType::BigInt => Ok(WeightKind::Int),
            LogicalType::Double => Ok(WeightKind::Double),
            other => Err(CsrError::UnsupportedWeightKind(other)),
        }
    }

    /// Returns the declared column type backing this representation.
    pub fn logical_type(self) -> LogicalType {
        match self {
            WeightKind::Int => LogicalType::BigInt,
            WeightKind::Double => LogicalType::Double,
        }
    }
}

impl fmt::Display for WeightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_type().name())
    }
}

/// One of the three one-shot skeleton phases of a CSR build.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Offset array allocation.
    Vertex,
    /// Edge store allocation and prefix sum.
    Edge,
    /// Weight array allocation.
    Weight,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Vertex => "vertex",
            Phase::Edge => "edge",
            Phase::Weight => "weight",
        })
    }
}

/// Coarse classification of [`CsrError`], matching how the caller's query
/// is expected to surface the failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Fatal internal failure (allocation, broken structure).
    Internal,
    /// The input graph violates a constraint (dangling or duplicate vertices).
    Constraint,
    /// The requested configuration is not implemented.
    NotImplemented,
    /// The caller passed malformed arguments or broke the phase ordering.
    InvalidInput,
}

/// Errors raised while building or reading a CSR.
#[derive(Debug, Error)]
pub enum CsrError {
    /// An array of the CSR could not be sized.
    #[error("unable to allocate {len} slots for csr {what}")]
    AllocationFailure {
        /// Which array failed.
        what: &'static str,
        /// Requested element count.
        len: usize,
    },
    /// The edge count derived from vertex degrees disagrees with the number of
    /// edge rows produced by the join.
    #[error(
        "non-existent/non-unique vertices detected in csr {id} (expected {expected} edges, \
         observed {observed}); make sure all vertices referred by edge tables exist and are unique"
    )]
    CardinalityMismatch {
        /// The abandoned build.
        id: CsrId,
        /// Sum of all vertex degrees.
        expected: i64,
        /// Number of edge rows actually produced.
        observed: i64,
    },
    /// The id was discarded after a failed build and cannot be used again
    /// within the same query.
    #[error(
        "non-existent/non-unique vertices detected in csr {0}; the build was abandoned and \
         cannot be resumed"
    )]
    AlreadyDeleted(CsrId),
    /// The weight column type has no CSR representation.
    #[error("unsupported weight type {0}, expected BIGINT or DOUBLE")]
    UnsupportedWeightKind(LogicalType),
    /// A phase was invoked before the phase it depends on.
    #[error("csr {id}: {phase} phase has not been built")]
    PhaseNotReady {
        /// The build in question.
        id: CsrId,
        /// The missing prerequisite.
        phase: Phase,
    },
    /// Malformed arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A finished structure failed verification.
    #[error("corruption detected: {0}")]
    Corruption(String),
}

impl CsrError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CsrError::AllocationFailure { .. } | CsrError::Corruption(_) => ErrorKind::Internal,
            CsrError::CardinalityMismatch { .. } | CsrError::AlreadyDeleted(_) => {
                ErrorKind::Constraint
            }
            CsrError::UnsupportedWeightKind(_) => ErrorKind::NotImplemented,
            CsrError::PhaseNotReady { .. } | CsrError::InvalidArgument(_) => {
                ErrorKind::InvalidInput
            }
        }
    }

    /// Whether the input graph failed validation.
    pub fn is_constraint_violation(&self) -> bool {
        self.kind() == ErrorKind::Constraint
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CsrError::InvalidArgument(msg.into())
    }
}
