use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::model::InferenceConfig;
use crate::error::Result;
use crate::types::{GeometryMode, MaskOp, OutputFormat, PixelType};

/// Classification parameters suitable for config files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyParams {
    /// Chunk count; None sizes chunks from available memory
    pub chunks: Option<usize>,
    pub nodata: f64,
    /// Also write per-class probabilities
    pub probabilities: bool,
    /// Blank pixels the image's companion mask marks invalid before classifying
    pub apply_mask: bool,
    pub inference: InferenceConfig,
    pub format: OutputFormat,
}

impl Default for ClassifyParams {
    fn default() -> Self {
        Self {
            chunks: Some(10),
            nodata: 0.0,
            probabilities: false,
            apply_mask: false,
            inference: InferenceConfig::all_cores(),
            format: OutputFormat::GTiff,
        }
    }
}

/// Mask building and combination parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    /// Confidence values at or above this are cloud
    pub cloud_conf_threshold: f64,
    /// Square pixel size the confidence mask is resampled to
    pub target_resolution: Option<f64>,
    /// Erosion radius in pixels; 0 disables buffering
    pub buffer_size: usize,
    /// Class value treated as clear in classifier output
    pub model_clear: f64,
    pub combine_op: MaskOp,
    pub geometry_mode: GeometryMode,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            cloud_conf_threshold: 30.0,
            target_resolution: Some(10.0),
            buffer_size: 0,
            model_clear: 0.0,
            combine_op: MaskOp::And,
            geometry_mode: GeometryMode::Intersect,
        }
    }
}

/// Stacking, mosaicking and compositing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeParams {
    pub format: OutputFormat,
    pub pixel_type: PixelType,
    /// Mosaic sources never overwrite with this value
    pub nodata: Option<f64>,
}

impl Default for CompositeParams {
    fn default() -> Self {
        Self {
            format: OutputFormat::GTiff,
            pixel_type: PixelType::I32,
            nodata: Some(0.0),
        }
    }
}

/// Read any parameter struct from a JSON file; missing fields keep defaults
pub fn load_params<P: DeserializeOwned>(path: &Path) -> Result<P> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
