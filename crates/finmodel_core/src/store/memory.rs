use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use super::raw::{RawModel, normalize_metric};
use super::AssumptionStore;
use crate::error::StoreError;
use crate::model::{AssumptionSet, HistoricalSeries, ModelId};

#[derive(Debug, Default)]
struct Inner {
    models: FxHashMap<ModelId, Arc<AssumptionSet>>,
    series: FxHashMap<(ModelId, String), Vec<f64>>,
}

/// In-process store, used by the CLI and in tests
#[derive(Debug, Default)]
pub struct MemoryAssumptionStore {
    inner: RwLock<Inner>,
}

impl MemoryAssumptionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a model's assumption set
    pub fn insert(&self, model_id: ModelId, set: AssumptionSet) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.models.insert(model_id, Arc::new(set));
    }

    pub fn insert_series(&self, model_id: ModelId, metric: &str, values: Vec<f64>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.series.insert((model_id, normalize_metric(metric)), values);
    }

    /// Normalize a raw model and register it with its history
    pub fn load_raw(&self, model_id: ModelId, raw: RawModel) -> Result<(), StoreError> {
        let (set, history) = raw.normalize()?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .series
            .retain(|(id, _), _| id != &model_id);
        for (metric, values) in history {
            inner.series.insert((model_id.clone(), metric), values);
        }
        inner.models.insert(model_id, Arc::new(set));
        Ok(())
    }

    pub fn remove(&self, model_id: &ModelId) -> Option<Arc<AssumptionSet>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.series.retain(|(id, _), _| id != model_id);
        inner.models.remove(model_id)
    }

    #[must_use]
    pub fn model_ids(&self) -> Vec<ModelId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<ModelId> = inner.models.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }
}

impl AssumptionStore for MemoryAssumptionStore {
    fn assumption_set(&self, model_id: &ModelId) -> Result<Arc<AssumptionSet>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .models
            .get(model_id)
            .cloned()
            .ok_or_else(|| StoreError::ModelNotFound(model_id.clone()))
    }

    fn historical_series(
        &self,
        model_id: &ModelId,
        metric: &str,
    ) -> Result<HistoricalSeries, StoreError> {
        let metric = normalize_metric(metric);
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if !inner.models.contains_key(model_id) {
            return Err(StoreError::ModelNotFound(model_id.clone()));
        }
        inner
            .series
            .get(&(model_id.clone(), metric.clone()))
            .map(|values| HistoricalSeries {
                metric: metric.clone(),
                values: values.clone(),
            })
            .ok_or(StoreError::SeriesNotFound {
                model_id: model_id.clone(),
                metric,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssumptionsBuilder;

    #[test]
    fn test_unknown_model() {
        let store = MemoryAssumptionStore::new();
        assert_eq!(
            store.assumption_set(&ModelId::new("nope")),
            Err(StoreError::ModelNotFound(ModelId::new("nope")))
        );
    }

    #[test]
    fn test_series_lookup_normalizes_metric() {
        let store = MemoryAssumptionStore::new();
        let id = ModelId::new("acme");
        store.insert(id.clone(), AssumptionsBuilder::top_down("acme").build());
        store.insert_series(id.clone(), "Revenue", vec![1.0, 2.0, 3.0]);

        let series = store.historical_series(&id, " MRR ").unwrap();
        assert_eq!(series.metric, "revenue");
        assert_eq!(series.values, vec![1.0, 2.0, 3.0]);

        assert!(matches!(
            store.historical_series(&id, "customers"),
            Err(StoreError::SeriesNotFound { .. })
        ));
    }

    #[test]
    fn test_sets_are_shared_not_copied() {
        let store = MemoryAssumptionStore::new();
        let id = ModelId::new("acme");
        store.insert(id.clone(), AssumptionsBuilder::top_down("acme").build());
        let a = store.assumption_set(&id).unwrap();
        let b = store.assumption_set(&id).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
