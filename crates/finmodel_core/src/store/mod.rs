//! Assumption Store Adapter
//!
//! Read-only access to assumption sets and historical actuals. Raw model input
//! is normalized into the canonical [`AssumptionSet`] exactly once, when it
//! enters a store; engines only ever see the canonical shape.

use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{AssumptionSet, HistoricalSeries, ModelId};

mod memory;
mod raw;

pub use memory::MemoryAssumptionStore;
pub use raw::{RawCostLine, RawModel, normalize_metric};

/// Source of assumption sets and historical series
pub trait AssumptionStore: Send + Sync {
    /// Current assumption set of a model
    fn assumption_set(&self, model_id: &ModelId) -> Result<Arc<AssumptionSet>, StoreError>;

    /// Ordered historical actuals for `metric`. Metric names are normalized
    /// with [`normalize_metric`] before lookup.
    fn historical_series(
        &self,
        model_id: &ModelId,
        metric: &str,
    ) -> Result<HistoricalSeries, StoreError>;
}

impl<S: AssumptionStore + ?Sized> AssumptionStore for Arc<S> {
    fn assumption_set(&self, model_id: &ModelId) -> Result<Arc<AssumptionSet>, StoreError> {
        (**self).assumption_set(model_id)
    }

    fn historical_series(
        &self,
        model_id: &ModelId,
        metric: &str,
    ) -> Result<HistoricalSeries, StoreError> {
        (**self).historical_series(model_id, metric)
    }
}
