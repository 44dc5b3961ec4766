use anyhow::{Context, Result};
use clap::Args;
use rfwbench_core::{
    DetectorId, DistanceMetric, EnumerationLimits, ModelId, PairMode, RunSettings, RFW_RACES,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Benchmark configuration.
///
/// Layered: defaults, then the TOML file, then `RFWBENCH_*` environment
/// variables, then command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// RFW test root holding `txts/` and `data/`.
    pub dataset_root: PathBuf,
    /// Reports go to `<output_dir>/<model>/`.
    pub output_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub races: Vec<String>,
    pub model: ModelId,
    pub detector: DetectorId,
    pub distance_metric: Option<DistanceMetric>,
    /// Replaces the model's own decision threshold.
    pub threshold: Option<f32>,
    pub mode: PairMode,
    pub limits: EnumerationLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_root: PathBuf::from("rfw/test"),
            output_dir: PathBuf::from("tmp"),
            model_dir: PathBuf::from("models"),
            races: RFW_RACES.iter().map(|r| r.to_string()).collect(),
            model: ModelId::new("ArcFace"),
            detector: DetectorId::new("scrfd"),
            distance_metric: None,
            threshold: None,
            mode: PairMode::Intra,
            limits: EnumerationLimits::default(),
        }
    }
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// RFW test root (contains txts/ and data/)
    #[arg(long, global = true)]
    pub dataset_root: Option<PathBuf>,
    /// Output directory for reports
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,
    /// Directory containing the ONNX models
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,
    /// Races to run, comma-separated
    #[arg(long, global = true, value_delimiter = ',')]
    pub races: Option<Vec<String>>,
    /// Recognition model (e.g. ArcFace)
    #[arg(long, global = true)]
    pub model: Option<String>,
    /// Face detector backend (e.g. scrfd)
    #[arg(long, global = true)]
    pub detector: Option<String>,
    /// cosine, euclidean or euclidean_l2
    #[arg(long, global = true)]
    pub distance_metric: Option<DistanceMetric>,
    /// Decision threshold override
    #[arg(long, global = true)]
    pub threshold: Option<f32>,
    /// intra or cross
    #[arg(long, global = true)]
    pub mode: Option<PairMode>,
    /// Max pairs per folder (intra mode)
    #[arg(long, global = true)]
    pub per_group: Option<usize>,
    /// Max folders per race (intra mode)
    #[arg(long, global = true)]
    pub max_groups: Option<usize>,
    /// Max pairs per race
    #[arg(long, global = true)]
    pub per_partition: Option<usize>,
}

impl Config {
    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Apply `RFWBENCH_*` variables. Values that fail to parse are ignored
    /// with a warning.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("RFWBENCH_DATASET_ROOT") {
            self.dataset_root = PathBuf::from(v);
        }
        if let Some(v) = var("RFWBENCH_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = var("RFWBENCH_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = var("RFWBENCH_RACES") {
            self.races = split_list(&v);
        }
        if let Some(v) = var("RFWBENCH_MODEL") {
            self.model = ModelId::new(v);
        }
        if let Some(v) = var("RFWBENCH_DETECTOR") {
            self.detector = DetectorId::new(v);
        }
        if let Some(metric) = env_parse(&var, "RFWBENCH_DISTANCE_METRIC") {
            self.distance_metric = Some(metric);
        }
        if let Some(threshold) = env_parse(&var, "RFWBENCH_THRESHOLD") {
            self.threshold = Some(threshold);
        }
        if let Some(mode) = env_parse(&var, "RFWBENCH_MODE") {
            self.mode = mode;
        }
        if let Some(n) = env_parse(&var, "RFWBENCH_PER_GROUP") {
            self.limits.per_group = Some(n);
        }
        if let Some(n) = env_parse(&var, "RFWBENCH_MAX_GROUPS") {
            self.limits.max_groups = Some(n);
        }
        if let Some(n) = env_parse(&var, "RFWBENCH_PER_PARTITION") {
            self.limits.per_partition = Some(n);
        }
    }

    pub fn apply_overrides(&mut self, flags: &Overrides) {
        if let Some(v) = &flags.dataset_root {
            self.dataset_root = v.clone();
        }
        if let Some(v) = &flags.output_dir {
            self.output_dir = v.clone();
        }
        if let Some(v) = &flags.model_dir {
            self.model_dir = v.clone();
        }
        if let Some(v) = &flags.races {
            self.races = v.iter().map(|r| r.trim().to_string()).filter(|r| !r.is_empty()).collect();
        }
        if let Some(v) = &flags.model {
            self.model = ModelId::new(v.as_str());
        }
        if let Some(v) = &flags.detector {
            self.detector = DetectorId::new(v.as_str());
        }
        self.distance_metric = flags.distance_metric.or(self.distance_metric);
        self.threshold = flags.threshold.or(self.threshold);
        self.mode = flags.mode.unwrap_or(self.mode);
        self.limits.per_group = flags.per_group.or(self.limits.per_group);
        self.limits.max_groups = flags.max_groups.or(self.limits.max_groups);
        self.limits.per_partition = flags.per_partition.or(self.limits.per_partition);
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            model: self.model.clone(),
            detector: self.detector.clone(),
            distance_metric: self.distance_metric,
            mode: self.mode,
            limits: self.limits,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_parse<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.dataset_root, PathBuf::from("rfw/test"));
        assert_eq!(config.races, vec!["African", "Asian", "Caucasian", "Indian"]);
        assert_eq!(config.model.as_str(), "ArcFace");
        assert_eq!(config.mode, PairMode::Intra);
        assert_eq!(config.limits, EnumerationLimits::default());
    }

    #[test]
    fn test_toml_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfwbench.toml");
        std::fs::write(
            &path,
            r#"
races = ["Asian"]
distance_metric = "euclidean_l2"
mode = "cross-group"

[limits]
per_partition = 50
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.races, vec!["Asian"]);
        assert_eq!(config.distance_metric, Some(DistanceMetric::EuclideanL2));
        assert_eq!(config.mode, PairMode::Cross);
        assert_eq!(config.limits.per_partition, Some(50));
        assert_eq!(config.limits.per_group, None);
        assert_eq!(config.detector.as_str(), "scrfd");
    }

    #[test]
    fn test_toml_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "folder_limit = 3\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("RFWBENCH_RACES", "Indian, African"),
            ("RFWBENCH_THRESHOLD", "0.55"),
            ("RFWBENCH_MODE", "cross"),
            ("RFWBENCH_MAX_GROUPS", "10"),
        ]));
        assert_eq!(config.races, vec!["Indian", "African"]);
        assert_eq!(config.threshold, Some(0.55));
        assert_eq!(config.mode, PairMode::Cross);
        assert_eq!(config.limits.max_groups, Some(10));
    }

    #[test]
    fn test_invalid_env_value_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[("RFWBENCH_PER_GROUP", "lots"), ("RFWBENCH_DISTANCE_METRIC", "manhattan")]));
        assert_eq!(config.limits.per_group, None);
        assert_eq!(config.distance_metric, None);
    }

    #[test]
    fn test_flags_beat_env() {
        let mut config = Config::default();
        config.apply_env(env(&[("RFWBENCH_MODEL", "ArcFace-MobileFaceNet"), ("RFWBENCH_PER_PARTITION", "5")]));
        config.apply_overrides(&Overrides {
            model: Some("ArcFace".into()),
            per_group: Some(2),
            ..Default::default()
        });
        assert_eq!(config.model.as_str(), "ArcFace");
        assert_eq!(config.limits.per_partition, Some(5));
        assert_eq!(config.limits.per_group, Some(2));

        let settings = config.run_settings();
        assert_eq!(settings.limits.per_group, Some(2));
        assert_eq!(settings.mode, PairMode::Intra);
    }
}
