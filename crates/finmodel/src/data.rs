//! Data directory layout and file loading
//!
//! Directory structure:
//! ~/.finmodel/
//!   config.yaml          # Orchestrator settings and repository choice
//!   jobs.db              # Job records when the SQLite repository is selected
//!   finmodel.log         # Rotated log file

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use finmodel_core::model::{ModelId, ParameterDistributions};
use finmodel_core::repository::JobRepository;
use finmodel_core::store::RawModel;
use finmodel_core::{MemoryAssumptionStore, MemoryJobRepository, OrchestratorConfig};
use serde::{Deserialize, Serialize};

/// Where job records are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    /// In-process only; records vanish when the command exits
    #[default]
    Memory,
    /// `jobs.db` in the data directory
    Sqlite,
}

/// Configuration stored in config.yaml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    pub repository: RepositoryKind,
}

/// Manages the data directory
pub struct DataDirectory {
    root: PathBuf,
}

impl DataDirectory {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Get the default data directory path (~/.finmodel/)
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".finmodel")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    fn jobs_db_path(&self) -> PathBuf {
        self.root.join("jobs.db")
    }

    /// Load config.yaml; a missing file means defaults
    pub fn load_config(&self) -> Result<AppConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = fs::read_to_string(&path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        serde_saphyr::from_str(&content)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))
    }

    /// Open the configured job repository
    pub fn open_repository(&self, kind: RepositoryKind) -> Result<Arc<dyn JobRepository>> {
        match kind {
            RepositoryKind::Memory => Ok(Arc::new(MemoryJobRepository::new())),
            RepositoryKind::Sqlite => {
                fs::create_dir_all(&self.root).wrap_err("failed to create data directory")?;
                let path = self.jobs_db_path();
                let repo = finmodel_core::SqliteJobRepository::open(&path)
                    .wrap_err_with(|| format!("failed to open {}", path.display()))?;
                Ok(Arc::new(repo))
            }
        }
    }
}

/// Model id derived from a model file name (`models/acme.yaml` -> `acme`)
pub fn model_id_for(path: &Path) -> ModelId {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    ModelId::new(stem)
}

/// Read a YAML model file into a fresh store
pub fn load_model(path: &Path) -> Result<(ModelId, Arc<MemoryAssumptionStore>)> {
    let content =
        fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let raw: RawModel = serde_saphyr::from_str(&content)
        .wrap_err_with(|| format!("failed to parse model {}", path.display()))?;

    let model_id = model_id_for(path);
    let store = MemoryAssumptionStore::new();
    store
        .load_raw(model_id.clone(), raw)
        .wrap_err_with(|| format!("invalid model {}", path.display()))?;
    tracing::info!(model_id = %model_id, path = %path.display(), "model loaded");
    Ok((model_id, Arc::new(store)))
}

/// Read a YAML file of sampling rules keyed by parameter path
pub fn load_distributions(path: &Path) -> Result<ParameterDistributions> {
    let content =
        fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
    serde_saphyr::from_str(&content)
        .wrap_err_with(|| format!("failed to parse distributions {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use finmodel_core::AssumptionStore;
    use finmodel_core::model::{FormulaSet, ParamPath, SamplingRule};

    const MODEL: &str = "\
name: Acme
formula: top_down
revenue:
  monthly_revenue: 100000
  growth_pct: 8
costs:
  cogs: 0.2
  fixed:
    payroll: 80000
    Office Rent: { amount: 12000, growth: 0.0 }
cash:
  starting_cash: 1500000
history:
  MRR: [81000, 84500, 90200]
";

    #[test]
    fn test_load_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acme.yaml");
        fs::write(&path, MODEL).unwrap();

        let (id, store) = load_model(&path).unwrap();
        assert_eq!(id, ModelId::new("acme"));
        let set = store.assumption_set(&id).unwrap();
        assert_eq!(set.name, "Acme");
        assert_eq!(set.formula, FormulaSet::TopDown);
        assert_eq!(set.revenue.baseline, Some(100_000.0));
        assert!(set.has(&ParamPath::cost_line("office_rent")));

        let series = store.historical_series(&id, "revenue").unwrap();
        assert_eq!(series.values, vec![81_000.0, 84_500.0, 90_200.0]);
    }

    #[test]
    fn test_missing_model_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read"));
    }

    #[test]
    fn test_config_defaults_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDirectory::new(dir.path().to_path_buf());
        assert_eq!(data.load_config().unwrap(), AppConfig::default());

        fs::write(
            dir.path().join("config.yaml"),
            "repository: sqlite\norchestrator:\n  workers: 3\n  max_retries: 0\n",
        )
        .unwrap();
        let config = data.load_config().unwrap();
        assert_eq!(config.repository, RepositoryKind::Sqlite);
        assert_eq!(config.orchestrator.workers, 3);
        assert_eq!(config.orchestrator.max_retries, 0);
        assert_eq!(config.orchestrator.job_timeout_secs, 900);
    }

    #[test]
    fn test_sqlite_repository_lives_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataDirectory::new(dir.path().join("nested"));
        data.open_repository(RepositoryKind::Sqlite).unwrap();
        assert!(dir.path().join("nested").join("jobs.db").exists());
    }

    #[test]
    fn test_load_distributions_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("risk.yaml");
        fs::write(
            &path,
            "revenue.growth: { type: Normal, mean: 0.05, std_dev: 0.02 }\n",
        )
        .unwrap();
        let dists = load_distributions(&path).unwrap();
        assert_eq!(
            dists.rules[&ParamPath::RevenueGrowth],
            SamplingRule::Normal {
                mean: 0.05,
                std_dev: 0.02
            }
        );
    }
}
