//! Shared types and enums used across eostack.
//! Includes `GeometryMode`, `MaskOp`, `PixelType` and `OutputFormat`.
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// How the extents of several rasters are combined into one footprint
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryMode {
    Intersect,
    Union,
}

impl std::fmt::Display for GeometryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryMode::Intersect => write!(f, "intersect"),
            GeometryMode::Union => write!(f, "union"),
        }
    }
}

impl FromStr for GeometryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "intersect" | "intersection" => Ok(GeometryMode::Intersect),
            "union" => Ok(GeometryMode::Union),
            _ => Err(Error::config("geometry_mode", s)),
        }
    }
}

/// Boolean operation applied when combining masks
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskOp {
    And,
    Or,
    Nor,
}

impl MaskOp {
    /// Value the destination mask starts from before any input is folded in
    pub fn initial_value(self) -> u8 {
        match self {
            MaskOp::And | MaskOp::Nor => 1,
            MaskOp::Or => 0,
        }
    }

    pub fn apply(self, acc: u8, value: u8) -> u8 {
        let (acc, value) = (acc != 0, value != 0);
        let out = match self {
            MaskOp::And => acc && value,
            MaskOp::Or => acc || value,
            MaskOp::Nor => !(acc || value),
        };
        out as u8
    }
}

impl std::fmt::Display for MaskOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaskOp::And => write!(f, "and"),
            MaskOp::Or => write!(f, "or"),
            MaskOp::Nor => write!(f, "nor"),
        }
    }
}

impl FromStr for MaskOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(MaskOp::And),
            "or" => Ok(MaskOp::Or),
            "nor" => Ok(MaskOp::Nor),
            _ => Err(Error::config("boolean_op", s)),
        }
    }
}

/// Storage pixel type of a raster on disk
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl PixelType {
    pub fn byte_width(self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 | PixelType::I16 => 2,
            PixelType::U32 | PixelType::I32 | PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PixelType::U8 => "u8",
            PixelType::U16 => "u16",
            PixelType::I16 => "i16",
            PixelType::U32 => "u32",
            PixelType::I32 => "i32",
            PixelType::F32 => "f32",
            PixelType::F64 => "f64",
        };
        write!(f, "{}", s)
    }
}

/// Raster file formats the writer can produce
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Serialize, Deserialize)]
pub enum OutputFormat {
    GTiff,
    Envi,
}

impl OutputFormat {
    pub fn driver_name(self) -> &'static str {
        match self {
            OutputFormat::GTiff => "GTiff",
            OutputFormat::Envi => "ENVI",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::GTiff => "tif",
            OutputFormat::Envi => "bsq",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.driver_name())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gtiff" | "tif" | "tiff" => Ok(OutputFormat::GTiff),
            "envi" => Ok(OutputFormat::Envi),
            _ => Err(Error::config("format", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_policy_values() {
        assert_eq!("Intersect".parse::<GeometryMode>().unwrap(), GeometryMode::Intersect);
        assert_eq!("union".parse::<GeometryMode>().unwrap(), GeometryMode::Union);
        assert_eq!("NOR".parse::<MaskOp>().unwrap(), MaskOp::Nor);
        assert_eq!("GTiff".parse::<OutputFormat>().unwrap(), OutputFormat::GTiff);
    }

    #[test]
    fn test_unknown_policy_values_are_config_errors() {
        assert_eq!("xor".parse::<MaskOp>().unwrap_err().kind(), ErrorKind::Config);
        assert_eq!("overlap".parse::<GeometryMode>().unwrap_err().kind(), ErrorKind::Config);
        assert_eq!("png".parse::<OutputFormat>().unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn test_mask_op_truth_tables() {
        assert_eq!(MaskOp::And.apply(1, 0), 0);
        assert_eq!(MaskOp::And.apply(1, 1), 1);
        assert_eq!(MaskOp::Or.apply(0, 1), 1);
        assert_eq!(MaskOp::Or.apply(0, 0), 0);
        assert_eq!(MaskOp::Nor.apply(0, 0), 1);
        assert_eq!(MaskOp::Nor.apply(1, 0), 0);
    }
}
