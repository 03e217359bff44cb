//! Scenario Engine
//!
//! Applies an [`Override`] on top of a stored baseline, projects both and
//! compares them metric by metric.

use std::sync::{Arc, PoisonError, RwLock};

use rustc_hash::FxHashMap;

use crate::error::{EngineError, Result, StoreError};
use crate::model::{
    AssumptionSet, DeltaMetric, MetricDelta, ModelId, Override, Param, PatchOp, ProjectionResult,
    ScenarioRun, ScenarioRunId, Slot,
};
use crate::projection::project;
use crate::store::AssumptionStore;

/// Deep-merge `patch` over `baseline`, returning a new set.
///
/// `Set` replaces, `Delta` adds (to every month of a schedule, or to zero when
/// the value is absent), `Schedule` installs a month-indexed schedule.
pub fn derive_scenario(baseline: &AssumptionSet, patch: &Override) -> Result<AssumptionSet> {
    let mut derived = baseline.clone();
    for (path, op) in &patch.patches {
        match (derived.slot_mut(path)?, op) {
            (Slot::Scalar(value), PatchOp::Set(x)) => *value = Some(*x),
            (Slot::Scalar(value), PatchOp::Delta(d)) => *value = Some(value.unwrap_or(0.0) + d),
            (Slot::Amount(amount), PatchOp::Set(x)) => *amount = *x,
            (Slot::Amount(amount), PatchOp::Delta(d)) => *amount += d,
            (Slot::Scalar(_) | Slot::Amount(_), PatchOp::Schedule(_)) => {
                return Err(EngineError::InvalidOverridePath(format!(
                    "{path} does not vary by month"
                )));
            }
            (Slot::Param(param), PatchOp::Set(x)) => *param = Some(Param::Constant(*x)),
            (Slot::Param(param), PatchOp::Delta(d)) => {
                *param = Some(match param.take() {
                    Some(p) => p.shifted(*d),
                    None => Param::Constant(*d),
                });
            }
            (Slot::Param(param), PatchOp::Schedule(values)) => {
                *param = Some(Param::Schedule(values.clone()));
            }
        }
    }
    Ok(derived)
}

type BaselineKey = (ModelId, u32);

/// Most baseline projections kept at once
const MAX_CACHED_BASELINES: usize = 64;

/// A baseline projection and the exact set it was computed from
struct CachedBaseline {
    set: Arc<AssumptionSet>,
    projection: Arc<ProjectionResult>,
    stamp: u64,
}

impl CachedBaseline {
    /// A hit only counts when the stored set still has the same content
    fn matches(&self, set: &Arc<AssumptionSet>) -> bool {
        Arc::ptr_eq(&self.set, set) || *self.set == **set
    }
}

#[derive(Default)]
struct BaselineCache {
    entries: FxHashMap<BaselineKey, CachedBaseline>,
    next_stamp: u64,
}

impl BaselineCache {
    fn insert(&mut self, key: BaselineKey, entry: CachedBaseline) -> Arc<ProjectionResult> {
        if !self.entries.contains_key(&key) && self.entries.len() >= MAX_CACHED_BASELINES {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.stamp)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        let projection = Arc::clone(&entry.projection);
        self.entries.insert(key, entry);
        projection
    }
}

/// Runs scenarios against models held in an [`AssumptionStore`].
///
/// Baseline projections are cached per (model, horizon) together with the set
/// they came from. A cached projection is reused only while the store still
/// returns an identical set, so replacing a model never serves a stale
/// baseline. The cache holds at most `MAX_CACHED_BASELINES` entries and drops
/// the least recently stored one first.
pub struct ScenarioEngine {
    store: Arc<dyn AssumptionStore>,
    baselines: RwLock<BaselineCache>,
}

impl ScenarioEngine {
    pub fn new(store: Arc<dyn AssumptionStore>) -> Self {
        Self {
            store,
            baselines: RwLock::new(BaselineCache::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn AssumptionStore> {
        &self.store
    }

    /// Number of cached baseline projections
    pub fn cached_baselines(&self) -> usize {
        self.baselines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Current baseline set of a model and its (cached) projection
    pub fn baseline(
        &self,
        model_id: &ModelId,
        horizon: u32,
    ) -> Result<(Arc<AssumptionSet>, Arc<ProjectionResult>)> {
        let set = match self.store.assumption_set(model_id) {
            Ok(set) => set,
            Err(e) => {
                if matches!(e, StoreError::ModelNotFound(_)) {
                    self.evict(model_id);
                }
                return Err(e.into());
            }
        };
        let key = (model_id.clone(), horizon);

        if let Some(hit) = self
            .baselines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&key)
            .filter(|cached| cached.matches(&set))
        {
            return Ok((set, Arc::clone(&hit.projection)));
        }

        let projection = Arc::new(project(&set, horizon)?);
        let mut cache = self
            .baselines
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Entries computed from an older set of this model can never be hit again
        cache
            .entries
            .retain(|(id, _), cached| id != model_id || cached.matches(&set));
        if let Some(raced) = cache.entries.get(&key) {
            return Ok((set, Arc::clone(&raced.projection)));
        }
        cache.next_stamp += 1;
        let stamp = cache.next_stamp;
        let projection = cache.insert(
            key,
            CachedBaseline {
                set: Arc::clone(&set),
                projection,
                stamp,
            },
        );
        Ok((set, projection))
    }

    /// Drop every cached baseline of a model
    pub fn evict(&self, model_id: &ModelId) {
        self.baselines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .retain(|(id, _), _| id != model_id);
    }

    /// Project a model with `patch` applied and compare against its baseline
    pub fn run_scenario(
        &self,
        model_id: &ModelId,
        patch: &Override,
        horizon: u32,
    ) -> Result<ScenarioRun> {
        if horizon == 0 {
            return Err(EngineError::InvalidHorizon(horizon));
        }
        let (baseline_set, baseline) = self.baseline(model_id, horizon)?;
        let derived = derive_scenario(&baseline_set, patch)?;
        let projection = project(&derived, horizon)?;

        let deltas = DeltaMetric::ALL
            .iter()
            .map(|&metric| MetricDelta::compare(metric, &baseline, &projection))
            .collect();

        tracing::debug!(
            model_id = %model_id,
            horizon,
            patches = patch.patches.len(),
            "scenario projected"
        );

        Ok(ScenarioRun {
            id: ScenarioRunId::new(),
            baseline_model_id: model_id.clone(),
            horizon,
            patch: patch.clone(),
            projection,
            deltas,
        })
    }
}
