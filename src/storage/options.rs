use std::sync::Arc;

use super::metrics::{default_metrics, BuildMetrics};

/// Configuration options supplied when creating a [`super::CsrRegistry`].
#[derive(Clone)]
pub struct RegistryOptions {
    /// Largest element count any single CSR array may be sized to
    pub max_elements: Option<usize>,
    /// Metrics sink for build events
    pub metrics: Arc<dyn BuildMetrics>,
}

impl RegistryOptions {
    /// Creates options with no allocation ceiling and no-op metrics.
    pub fn new() -> Self {
        Self {
            max_elements: None,
            metrics: default_metrics(),
        }
    }

    /// Caps the element count of every array; larger requests fail as
    /// allocation failures.
    pub fn max_elements(mut self, max: usize) -> Self {
        self.max_elements = Some(max);
        self
    }

    /// Sets the metrics collection implementation.
    pub fn metrics(mut self, metrics: Arc<dyn BuildMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::new()
    }
}
