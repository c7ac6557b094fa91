use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use eostack::types::{GeometryMode, MaskOp, OutputFormat, PixelType};

#[derive(Parser)]
#[command(name = "eostack", version, about = "eostack CLI")]
pub struct CliArgs {
    /// Enable logging
    #[arg(long, default_value_t = false, global = true)]
    pub log: bool,

    /// JSON file with `classify`, `mask` and `composite` parameter sections
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Overrides for the stacking, mosaicking and compositing parameters
#[derive(Args, Debug, Clone, Default)]
pub struct CompositeArgs {
    /// Output format (gtiff or envi)
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Pixel type the inputs are read and written as
    #[arg(long, value_enum)]
    pub pixel_type: Option<PixelType>,

    /// Value mosaic sources never overwrite with
    #[arg(long)]
    pub nodata: Option<f64>,
}

/// Overrides for the mask parameters
#[derive(Args, Debug, Clone, Default)]
pub struct MaskArgs {
    /// Cloud confidence at or above this is cloud
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Erosion radius in pixels
    #[arg(long)]
    pub buffer: Option<usize>,

    /// Class value treated as clear in model output
    #[arg(long)]
    pub model_clear: Option<f64>,
}

/// Overrides for the classification parameters
#[derive(Args, Debug, Clone, Default)]
pub struct ClassifyArgs {
    /// Number of chunks; 0 sizes chunks from available memory
    #[arg(long)]
    pub chunks: Option<usize>,

    /// Inference threads; 0 uses every core
    #[arg(long)]
    pub threads: Option<usize>,

    /// Blank pixels the image's mask marks invalid before classifying
    #[arg(long, default_value_t = false)]
    pub apply_mask: bool,

    /// Output format of class and probability rasters
    #[arg(long, value_enum)]
    pub class_format: Option<OutputFormat>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Stack images band-wise over their common intersection
    Stack {
        #[arg(short, long, num_args = 2.., required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        composite: CompositeArgs,
    },
    /// Mosaic images over their union, later inputs on top
    Mosaic {
        #[arg(short, long, num_args = 1.., required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        composite: CompositeArgs,
    },
    /// Cloud-free composite of masked images (explicit list, oldest first, or a directory)
    Composite {
        #[arg(short, long, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Composite every .tif in this directory in acquisition order
        #[arg(long)]
        input_dir: Option<PathBuf>,
        /// Output file (with --inputs) or directory (with --input-dir)
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        composite: CompositeArgs,
    },
    /// Mask an image from its SAFE product's cloud confidence layer
    MaskConfidence {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        safe: PathBuf,
        #[command(flatten)]
        mask: MaskArgs,
    },
    /// Mask an image from a cloud classification model
    MaskModel {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        mask: MaskArgs,
        #[command(flatten)]
        classify: ClassifyArgs,
    },
    /// Combine mask files
    CombineMasks {
        #[arg(short, long, num_args = 1.., required = true)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum)]
        op: Option<MaskOp>,
        #[arg(long, value_enum)]
        geometry: Option<GeometryMode>,
    },
    /// Erode a mask in place
    BufferMask {
        #[arg(long)]
        mask: PathBuf,
        #[arg(long)]
        radius: usize,
    },
    /// Stack each image of every tile with the next more recent one
    StackPairs {
        #[arg(long)]
        image_dir: PathBuf,
        #[arg(long)]
        stack_dir: PathBuf,
        #[command(flatten)]
        composite: CompositeArgs,
    },
    /// Stack and mask the 10 m bands of every SAFE product in a directory
    Aggregate {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
        /// Optional cloud model ORed into the confidence mask
        #[arg(long)]
        model: Option<PathBuf>,
        /// Batch mode: continue with other products after a data error
        #[arg(long, default_value_t = false)]
        batch: bool,
        #[command(flatten)]
        composite: CompositeArgs,
        #[command(flatten)]
        mask: MaskArgs,
        #[command(flatten)]
        classify: ClassifyArgs,
    },
    /// Classify one image
    Classify {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        class_out: PathBuf,
        #[arg(long)]
        prob_out: Option<PathBuf>,
        #[command(flatten)]
        classify: ClassifyArgs,
    },
    /// Classify every .tif in a directory
    ClassifyDir {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        class_dir: PathBuf,
        /// Also write probabilities into this directory
        #[arg(long)]
        prob_dir: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        batch: bool,
        #[command(flatten)]
        classify: ClassifyArgs,
    },
    /// Classify the stack of a composite and a new image
    Change {
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        composite_image: PathBuf,
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        class_out: PathBuf,
        #[arg(long)]
        prob_out: Option<PathBuf>,
        #[command(flatten)]
        composite: CompositeArgs,
        #[command(flatten)]
        classify: ClassifyArgs,
    },
    /// Clip a raster to the polygon of a vector AOI file
    Clip {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        aoi: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        composite: CompositeArgs,
    },
    /// Clip an old and a new image to an AOI and stack them
    StackTrim {
        #[arg(long)]
        old: PathBuf,
        #[arg(long)]
        new: PathBuf,
        #[arg(long)]
        aoi: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[command(flatten)]
        composite: CompositeArgs,
    },
    /// Write the intersection of a raster and an AOI as a polygon file
    AoiIntersection {
        #[arg(long)]
        raster: PathBuf,
        #[arg(long)]
        aoi: PathBuf,
        /// Shapefile, GeoJSON (.geojson) or GeoPackage (.gpkg)
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Reduce a probability raster to its per-pixel maximum
    FlattenProb {
        #[arg(long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::GTiff)]
        format: OutputFormat,
    },
    /// Resample a raster in place with gdalwarp (nearest neighbour)
    Resample {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        resolution: f64,
    },
}
