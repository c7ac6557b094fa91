//! Pretrained pixel classifiers.
//!
//! [`Classifier`] is the seam the chunked classification loop talks to. The
//! bundled implementation, [`TreeEnsemble`], is a random-forest style set of
//! binary decision trees loaded from JSON: every tree maps a sample to a
//! per-class distribution, the distributions are averaged, and the label is
//! the class with the highest mean probability (lowest index on ties).
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Inference settings passed explicitly into every prediction call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Worker threads; 1 runs on the calling thread, 0 uses every core
    pub threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

impl InferenceConfig {
    pub fn single_threaded() -> Self {
        Self { threads: 1 }
    }

    pub fn all_cores() -> Self {
        Self { threads: 0 }
    }

    /// Whether `run` has to build a dedicated pool. Jobs already running on
    /// a pool of the requested size (and budgets of 0 or 1) reuse the
    /// current thread.
    fn needs_pool(&self) -> bool {
        self.threads > 1
            && !(rayon::current_thread_index().is_some()
                && rayon::current_num_threads() == self.threads)
    }

    /// Run `job` under this configuration's thread budget. Nested calls
    /// inside a job share the pool of the outermost call.
    pub fn run<R: Send>(&self, job: impl FnOnce() -> R + Send) -> Result<R> {
        if !self.needs_pool() {
            return Ok(job());
        }
        debug!("Building a {}-thread inference pool", self.threads);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| Error::Processing(format!("thread pool: {}", e)))?;
        Ok(pool.install(job))
    }
}

/// A read-only model mapping `(sample, feature)` matrices to class labels
pub trait Classifier: Sync {
    /// Number of features (raster bands) each sample must have
    fn n_features(&self) -> usize;

    /// Class labels, in probability column order
    fn classes(&self) -> &[u8];

    fn n_classes(&self) -> usize {
        self.classes().len()
    }

    fn predict(&self, samples: ArrayView2<'_, f64>, config: &InferenceConfig) -> Result<Array1<u8>>;

    /// Per-class probabilities, one row per sample
    fn predict_proba(
        &self,
        samples: ArrayView2<'_, f64>,
        config: &InferenceConfig,
    ) -> Result<Array2<f32>>;

    /// Labels and probabilities from a single probability pass
    fn predict_with_proba(
        &self,
        samples: ArrayView2<'_, f64>,
        config: &InferenceConfig,
    ) -> Result<(Array1<u8>, Array2<f32>)> {
        let proba = self.predict_proba(samples, config)?;
        let labels = proba
            .axis_iter(Axis(0))
            .map(|row| self.classes()[argmax(row)])
            .collect();
        Ok((labels, proba))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    /// Go to `left` when `sample[feature] <= threshold`, else to `right`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf { value: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Node 0 is the root; children always follow their parent
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn leaf(&self, sample: ArrayView1<'_, f64>) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }

    fn validate(&self, n_features: usize, n_classes: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {} splits on feature {}", i, feature));
                    }
                    for &child in [left, right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", i, child));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(format!(
                            "leaf {} has {} values for {} classes",
                            i,
                            value.len(),
                            n_classes
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_features: usize,
    pub classes: Vec<u8>,
    pub trees: Vec<DecisionTree>,
}

impl TreeEnsemble {
    /// Build and validate an ensemble
    pub fn new(n_features: usize, classes: Vec<u8>, trees: Vec<DecisionTree>) -> Result<Self> {
        let model = Self {
            n_features,
            classes,
            trees,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: TreeEnsemble = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let model = Self::from_json(&json)?;
        info!(
            "Loaded model {:?}: {} trees, {} features, {} classes",
            path,
            model.trees.len(),
            model.n_features,
            model.classes.len()
        );
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Error::config("model", reason);
        if self.classes.is_empty() {
            return Err(invalid("model declares no classes".into()));
        }
        if self.trees.is_empty() {
            return Err(invalid("model has no trees".into()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features, self.classes.len())
                .map_err(|e| invalid(format!("tree {}: {}", i, e)))?;
        }
        Ok(())
    }

    fn check_width(&self, samples: &ArrayView2<'_, f64>) -> Result<()> {
        let width = samples.len_of(Axis(1));
        if width != self.n_features {
            return Err(Error::ModelMismatch {
                expected: self.n_features,
                actual: width,
            });
        }
        Ok(())
    }

    fn sample_proba(&self, sample: ArrayView1<'_, f64>, out: &mut [f32]) {
        let mut acc = vec![0.0f64; self.classes.len()];
        for tree in &self.trees {
            for (a, v) in acc.iter_mut().zip(tree.leaf(sample)) {
                *a += v;
            }
        }
        let n = self.trees.len() as f64;
        for (o, a) in out.iter_mut().zip(acc) {
            *o = (a / n) as f32;
        }
    }
}

fn argmax(row: ArrayView1<'_, f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

impl Classifier for TreeEnsemble {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn classes(&self) -> &[u8] {
        &self.classes
    }

    fn predict(
        &self,
        samples: ArrayView2<'_, f64>,
        config: &InferenceConfig,
    ) -> Result<Array1<u8>> {
        Ok(self.predict_with_proba(samples, config)?.0)
    }

    fn predict_proba(
        &self,
        samples: ArrayView2<'_, f64>,
        config: &InferenceConfig,
    ) -> Result<Array2<f32>> {
        self.check_width(&samples)?;
        let mut out = Array2::<f32>::zeros((samples.nrows(), self.classes.len()));
        if config.threads == 1 {
            for (sample, mut row) in samples.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
                if let Some(slice) = row.as_slice_mut() {
                    self.sample_proba(sample, slice);
                }
            }
        } else {
            config.run(|| {
                out.axis_iter_mut(Axis(0))
                    .into_par_iter()
                    .zip(samples.axis_iter(Axis(0)).into_par_iter())
                    .for_each(|(mut row, sample)| {
                        if let Some(slice) = row.as_slice_mut() {
                            self.sample_proba(sample, slice);
                        }
                    });
            })?;
        }
        Ok(out)
    }
}
