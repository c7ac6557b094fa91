//! High-level, file-level library API: stack, mosaic and composite images on
//! disk, build and combine their masks, classify them, and batch helpers for
//! whole directories. Prefer these entry points over the low-level
//! processing modules when integrating eostack.
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::allocate::clip_to_polygon;
use crate::core::footprint::{Footprint, grid_footprint};
use crate::core::grid::GeoGrid;
use crate::core::model::{Classifier, TreeEnsemble};
use crate::core::params::{ClassifyParams, CompositeParams, MaskParams};
use crate::core::processing::classify::{Classification, classify, flatten_probability};
use crate::core::processing::composite::masked_composite;
use crate::core::processing::mask::{
    apply_mask, combine_masks, mask_from_confidence, mask_from_model_output,
};
use crate::core::processing::morphology::buffer_mask;
use crate::core::processing::mosaic::mosaic;
use crate::core::processing::resample::align_to;
use crate::core::processing::stack::{check_tile_identity, stack, stack_and_trim};
use crate::core::raster::{Mask, Pixel, Raster};
use crate::error::{Error, Result};
use crate::io::gdal::{raster_info, read_raster, write_raster};
use crate::io::naming::{granule_id, mask_path, s2_tile, s2_timestamp, sort_by_timestamp};
use crate::io::sentinel2::{band_paths, cloud_confidence_path};
use crate::io::vector::{read_polygon, write_polygon};
use crate::types::{GeometryMode, MaskOp, OutputFormat, PixelType};

pub use crate::io::gdal::resample_file_in_place;

/// Masks are always written as single-band byte GeoTIFFs
const MASK_FORMAT: OutputFormat = OutputFormat::GTiff;

/// Bind `$t` to the Rust type of a runtime [`PixelType`] and evaluate `$body`
macro_rules! with_pixel_type {
    ($pixel_type:expr, $t:ident => $body:expr) => {
        match $pixel_type {
            PixelType::U8 => {
                type $t = u8;
                $body
            }
            PixelType::U16 => {
                type $t = u16;
                $body
            }
            PixelType::I16 => {
                type $t = i16;
                $body
            }
            PixelType::U32 => {
                type $t = u32;
                $body
            }
            PixelType::I32 => {
                type $t = i32;
                $body
            }
            PixelType::F32 => {
                type $t = f32;
                $body
            }
            PixelType::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// Outcome counts of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl BatchReport {
    /// Count one item's outcome. Errors are swallowed only when
    /// `continue_on_error` is set and the error is a per-item data defect.
    fn record<T>(
        &mut self,
        item: &Path,
        outcome: Result<T>,
        continue_on_error: bool,
    ) -> Result<()> {
        match outcome {
            Ok(_) => {
                self.processed += 1;
                Ok(())
            }
            Err(e) => {
                self.errors += 1;
                if continue_on_error && e.is_continuable() {
                    warn!("Error processing {:?}: {}", item, e);
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Return an iterator over immediate subdirectories of `input_dir` (candidate SAFE products)
pub fn iterate_safe_products(input_dir: &Path) -> Result<std::vec::IntoIter<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs.into_iter())
}

/// `.tif` files directly inside `dir`, sorted by name
pub fn tif_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "tif") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Tile identifiers of `inputs` when every name carries one
fn input_tiles<P: AsRef<Path>>(inputs: &[P]) -> Option<Vec<String>> {
    inputs
        .iter()
        .map(|p| {
            let name = file_name(p.as_ref());
            s2_tile(&name)
                .ok()
                .filter(|t| t.len() == 6 && t.starts_with('T'))
                .map(str::to_string)
        })
        .collect()
}

fn read_all<T, P>(paths: &[P]) -> Result<Vec<Raster<T>>>
where
    T: Pixel + gdal::raster::GdalType,
    P: AsRef<Path>,
{
    paths.iter().map(|p| read_raster::<T>(p.as_ref())).collect()
}

fn read_mask(path: &Path) -> Result<Mask> {
    if !path.exists() {
        return Err(Error::incomplete("mask", path.display()));
    }
    read_raster::<u8>(path)
}

fn write_mask(mask: &Mask, path: &Path) -> Result<()> {
    write_raster(mask, path, MASK_FORMAT)
}

/// Stack `inputs` band-wise over their intersection into `output`.
/// Inputs named after Sentinel-2 products must share one tile.
pub fn stack_images<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    params: &CompositeParams,
) -> Result<()> {
    if let Some(tiles) = input_tiles(inputs) {
        check_tile_identity(&tiles)?;
    }
    info!("Stacking {} images into {:?}", inputs.len(), output);
    with_pixel_type!(params.pixel_type, T => {
        let rasters = read_all::<T, P>(inputs)?;
        let refs: Vec<&Raster<T>> = rasters.iter().collect();
        write_raster(&stack(&refs)?, output, params.format)
    })
}

/// Mosaic `inputs` over their union into `output`; later inputs win
pub fn mosaic_images<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    params: &CompositeParams,
) -> Result<()> {
    info!("Mosaicking {} images into {:?}", inputs.len(), output);
    with_pixel_type!(params.pixel_type, T => {
        let rasters = read_all::<T, P>(inputs)?;
        let refs: Vec<&Raster<T>> = rasters.iter().collect();
        write_raster(&mosaic(&refs, params.nodata)?, output, params.format)
    })
}

/// Composite `inputs` (oldest first) using the mask stored beside each one.
/// The union of the masks is written beside `output`; returns its path.
pub fn composite_images_with_mask<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    params: &CompositeParams,
) -> Result<PathBuf> {
    let masks = inputs
        .iter()
        .map(|p| read_mask(&mask_path(p.as_ref())))
        .collect::<Result<Vec<_>>>()?;
    let out_mask = mask_path(output);
    info!("Creating composite at {:?}", output);
    with_pixel_type!(params.pixel_type, T => {
        let images = read_all::<T, P>(inputs)?;
        let sources: Vec<(&Raster<T>, &Mask)> = images.iter().zip(masks.iter()).collect();
        let (composite, mask) = masked_composite(&sources)?;
        write_raster(&composite, output, params.format)?;
        write_mask(&mask, &out_mask)
    })?;
    Ok(out_mask)
}

/// Composite every `.tif` in `image_dir` in acquisition order into
/// `composite_<latest timestamp>` inside `out_dir`; returns the output path.
pub fn composite_directory(
    image_dir: &Path,
    out_dir: &Path,
    params: &CompositeParams,
) -> Result<PathBuf> {
    info!("Compositing {:?}", image_dir);
    let mut names: Vec<String> = tif_files(image_dir)?.iter().map(|p| file_name(p)).collect();
    sort_by_timestamp(&mut names, false)?;
    let Some(latest) = names.last() else {
        return Err(Error::incomplete("images", image_dir.display()));
    };
    let output = out_dir.join(format!(
        "composite_{}.{}",
        s2_timestamp(latest)?,
        params.format.extension()
    ));
    fs::create_dir_all(out_dir)?;
    let inputs: Vec<PathBuf> = names.iter().map(|n| image_dir.join(n)).collect();
    composite_images_with_mask(&inputs, &output, params)?;
    Ok(output)
}

/// Combine the mask files in `inputs` into `output`
pub fn combine_mask_files<P: AsRef<Path>>(
    inputs: &[P],
    output: &Path,
    op: MaskOp,
    mode: GeometryMode,
) -> Result<()> {
    let masks = inputs
        .iter()
        .map(|p| read_mask(p.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let refs: Vec<&Mask> = masks.iter().collect();
    info!("Combining {} masks ({}, {}) into {:?}", refs.len(), op, mode, output);
    write_mask(&combine_masks(&refs, op, mode)?, output)
}

/// Build the mask of `image` from the cloud confidence layer of the SAFE
/// product it came from; returns the mask path.
pub fn create_mask_from_confidence_layer(
    image: &Path,
    safe: &Path,
    params: &MaskParams,
) -> Result<PathBuf> {
    info!(
        "Creating mask for {:?} with {} confidence threshold",
        image, params.cloud_conf_threshold
    );
    let confidence = read_raster::<f32>(&cloud_confidence_path(safe)?)?;
    let mut mask = mask_from_confidence(
        &confidence,
        params.cloud_conf_threshold,
        params.target_resolution,
    )?;
    if params.buffer_size > 0 {
        mask = buffer_mask(&mask, params.buffer_size)?;
    }
    let out = mask_path(image);
    write_mask(&mask, &out)?;
    info!("Mask created at {:?}", out);
    Ok(out)
}

/// Classify `image` with the model at `model_path` and keep its clear class
/// as the valid part of the mask written to `output`.
pub fn create_mask_from_model(
    image: &Path,
    model_path: &Path,
    output: &Path,
    mask_params: &MaskParams,
    classify_params: &ClassifyParams,
) -> Result<()> {
    info!("Building cloud mask for {:?} with model {:?}", image, model_path);
    let model = TreeEnsemble::load(model_path)?;
    let classification = classify_file(image, &model, classify_params, false)?;
    let mut mask = mask_from_model_output(&classification.classes, mask_params.model_clear)?;
    if mask_params.buffer_size > 0 {
        mask = buffer_mask(&mask, mask_params.buffer_size)?;
    }
    write_mask(&mask, output)?;
    info!("Cloud mask for {:?} saved in {:?}", image, output);
    Ok(())
}

/// Erode the mask at `path` by a disk of `radius` pixels, overwriting it
pub fn buffer_mask_in_place(path: &Path, radius: usize) -> Result<()> {
    info!("Buffering {:?} with buffer size {}", path, radius);
    let mask = read_mask(path)?;
    write_mask(&buffer_mask(&mask, radius)?, path)
}

/// Stack two acquisitions of one tile into `<tile>_<old ts>_<new ts>` inside
/// `out_dir`, optionally writing the AND of their masks beside it.
pub fn stack_old_and_new_images(
    old: &Path,
    new: &Path,
    out_dir: &Path,
    params: &CompositeParams,
    create_combined_mask: bool,
) -> Result<PathBuf> {
    let (old_name, new_name) = (file_name(old), file_name(new));
    let (tile_old, tile_new) = (s2_tile(&old_name)?, s2_tile(&new_name)?);
    if tile_old != tile_new {
        return Err(Error::alignment(format!(
            "tiles of {} and {} do not match",
            old_name, new_name
        )));
    }
    let output = out_dir.join(format!(
        "{}_{}_{}.{}",
        tile_new,
        s2_timestamp(&old_name)?,
        s2_timestamp(&new_name)?,
        params.format.extension()
    ));
    info!("Stacking {:?} and {:?} into {:?}", old, new, output);
    stack_images(&[old, new], &output, params)?;
    if create_combined_mask {
        combine_mask_files(
            &[mask_path(old), mask_path(new)],
            &mask_path(&output),
            MaskOp::And,
            GeometryMode::Intersect,
        )?;
    }
    Ok(output)
}

/// For every tile in `image_dir`, stack each image with the next more
/// recent one. Returns the stacks created.
pub fn create_new_stacks(
    image_dir: &Path,
    stack_dir: &Path,
    params: &CompositeParams,
) -> Result<Vec<PathBuf>> {
    let names: Vec<String> = tif_files(image_dir)?.iter().map(|p| file_name(p)).collect();
    let tiles: BTreeSet<&str> = names.iter().filter_map(|n| s2_tile(n).ok()).collect();
    info!("Found {} unique tile IDs for stacking", tiles.len());
    fs::create_dir_all(stack_dir)?;

    let mut stacks = Vec::new();
    for tile in tiles {
        let mut images: Vec<&String> = names
            .iter()
            .filter(|n| s2_tile(n).is_ok_and(|t| t == tile))
            .collect();
        sort_by_timestamp(&mut images, true)?;
        info!("Tile {}: {} images for pairwise stacking", tile, images.len());
        for pair in images.windows(2) {
            let (newer, older) = (image_dir.join(pair[0]), image_dir.join(pair[1]));
            stacks.push(stack_old_and_new_images(&older, &newer, stack_dir, params, true)?);
        }
    }
    Ok(stacks)
}

/// Stack the 10 m blue, green, red and NIR bands of a SAFE product
pub fn stack_sentinel2_bands(safe: &Path, output: &Path, params: &CompositeParams) -> Result<()> {
    info!("Merging 10m bands in SAFE dir: {:?}", safe);
    let bands = band_paths(safe, "10m")?;
    stack_images(&bands, output, params)
}

/// Intersection of the raster at `raster` with the AOI polygon in the vector
/// file `aoi`. The AOI must use the raster's coordinate system.
pub fn aoi_intersection(raster: &Path, aoi: &Path) -> Result<Footprint> {
    let info = raster_info(raster)?;
    let grid = GeoGrid::from_gdal(info.geotransform, info.size_x, info.size_y)?;
    let overlap = grid_footprint(&grid).intersection(&read_polygon(aoi)?);
    if overlap.is_empty() {
        return Err(Error::geometry(format!(
            "AOI {:?} does not overlap {:?}",
            aoi, raster
        )));
    }
    Ok(overlap)
}

/// OGR driver for a vector output path, picked from its extension
fn vector_driver(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("geojson") | Some("json") => "GeoJSON",
        Some("gpkg") => "GPKG",
        _ => "ESRI Shapefile",
    }
}

/// Write the intersection of `raster` and `aoi` as a polygon layer
pub fn write_aoi_intersection(raster: &Path, aoi: &Path, output: &Path) -> Result<()> {
    let overlap = aoi_intersection(raster, aoi)?;
    let crs = raster_info(raster)?.projection;
    write_polygon(&overlap, &crs, output, vector_driver(output))
}

/// Clip `raster` to the envelope of its intersection with the AOI polygon
/// in `aoi`, writing the clipped copy to `output`
pub fn clip_raster(
    raster: &Path,
    aoi: &Path,
    output: &Path,
    params: &CompositeParams,
) -> Result<()> {
    let overlap = aoi_intersection(raster, aoi)?;
    info!("Clipping {:?} to AOI {:?}", raster, aoi);
    with_pixel_type!(params.pixel_type, T => {
        let image = read_raster::<T>(raster)?;
        write_raster(&clip_to_polygon(&image, &overlap)?, output, params.format)
    })
}

/// Clip `old` and `new` to the AOI polygon in `aoi` and stack them, old
/// bands first, into `output`. An existing `output` is left untouched.
pub fn stack_and_trim_images(
    old: &Path,
    new: &Path,
    aoi: &Path,
    output: &Path,
    params: &CompositeParams,
) -> Result<()> {
    if output.exists() {
        warn!("{:?} exists, skipping", output);
        return Ok(());
    }
    if let Some(tiles) = input_tiles(&[old, new]) {
        check_tile_identity(&tiles)?;
    }
    let polygon = read_polygon(aoi)?;
    info!("Stacking {:?} and {:?} trimmed to {:?}", old, new, aoi);
    with_pixel_type!(params.pixel_type, T => {
        let old = read_raster::<T>(old)?;
        let new = read_raster::<T>(new)?;
        write_raster(&stack_and_trim(&old, &new, &polygon)?, output, params.format)
    })
}

/// Reduce the per-class probability raster at `input` to a single band of
/// each pixel's highest probability
pub fn flatten_probability_image(input: &Path, output: &Path, format: OutputFormat) -> Result<()> {
    info!("Flattening probabilities of {:?} into {:?}", input, output);
    let probabilities = read_raster::<f32>(input)?;
    write_raster(&flatten_probability(&probabilities)?, output, format)
}

fn aggregate_product(
    safe: &Path,
    out_dir: &Path,
    model_path: Option<&Path>,
    composite_params: &CompositeParams,
    mask_params: &MaskParams,
    classify_params: &ClassifyParams,
) -> Result<PathBuf> {
    let output = out_dir.join(format!(
        "{}.{}",
        granule_id(safe),
        composite_params.format.extension()
    ));
    stack_sentinel2_bands(safe, &output, composite_params)?;
    match model_path {
        Some(model_path) => {
            let tmp_dir = tempfile::TempDir::new()?;
            let model_mask = tmp_dir.path().join("model.msk");
            let confidence_params = MaskParams {
                buffer_size: 0,
                ..mask_params.clone()
            };
            let confidence_mask =
                create_mask_from_confidence_layer(&output, safe, &confidence_params)?;
            create_mask_from_model(&output, model_path, &model_mask, mask_params, classify_params)?;
            combine_mask_files(
                &[model_mask, confidence_mask.clone()],
                &confidence_mask,
                MaskOp::Or,
                GeometryMode::Intersect,
            )?;
        }
        None => {
            create_mask_from_confidence_layer(&output, safe, mask_params)?;
        }
    }
    Ok(output)
}

/// For every SAFE product in `in_dir`, stack its 10 m bands into `out_dir`
/// and mask the result from the confidence layer, ORed with a model-derived
/// cloud mask when `model_path` is given.
pub fn aggregate_and_mask_10m_bands(
    in_dir: &Path,
    out_dir: &Path,
    model_path: Option<&Path>,
    composite_params: &CompositeParams,
    mask_params: &MaskParams,
    classify_params: &ClassifyParams,
    continue_on_error: bool,
) -> Result<BatchReport> {
    fs::create_dir_all(out_dir)?;
    let mut report = BatchReport::default();
    for safe in iterate_safe_products(in_dir)? {
        if !file_name(&safe).ends_with(".SAFE") {
            info!("Skipping non-SAFE directory: {:?}", safe);
            report.skipped += 1;
            continue;
        }
        let outcome = aggregate_product(
            &safe,
            out_dir,
            model_path,
            composite_params,
            mask_params,
            classify_params,
        );
        report.record(&safe, outcome, continue_on_error)?;
    }
    Ok(report)
}

fn classify_file<M: Classifier + ?Sized>(
    image: &Path,
    model: &M,
    params: &ClassifyParams,
    probabilities: bool,
) -> Result<Classification> {
    let pixel_type = raster_info(image)?.pixel_type.unwrap_or(PixelType::F64);
    with_pixel_type!(pixel_type, T => {
        let mut raster = read_raster::<T>(image)?;
        if params.apply_mask {
            let path = mask_path(image);
            info!("Applying mask at {:?}", path);
            let mask = align_to(&read_mask(&path)?, raster.grid(), 0)?;
            apply_mask(&mut raster, &mask, T::from_f64(params.nodata))?;
        }
        classify(&raster, model, params.chunks, params.nodata, probabilities, &params.inference)
    })
}

fn classify_to_paths<M: Classifier + ?Sized>(
    image: &Path,
    model: &M,
    class_out: &Path,
    prob_out: Option<&Path>,
    params: &ClassifyParams,
) -> Result<()> {
    info!("Classifying file: {:?}", image);
    let classification = classify_file(image, model, params, prob_out.is_some())?;
    write_raster(&classification.classes, class_out, params.format)?;
    if let (Some(path), Some(probs)) = (prob_out, classification.probabilities.as_ref()) {
        write_raster(probs, path, params.format)?;
    }
    Ok(())
}

/// Classify `image` with the model at `model_path`. Per-class probabilities
/// are computed and written only when `prob_out` is given.
pub fn classify_image(
    image: &Path,
    model_path: &Path,
    class_out: &Path,
    prob_out: Option<&Path>,
    params: &ClassifyParams,
) -> Result<()> {
    let model = TreeEnsemble::load(model_path)?;
    classify_to_paths(image, &model, class_out, prob_out, params)
}

/// Classify every `.tif` in `in_dir` into `<name>_class` files in
/// `class_dir`, and `<name>_prob` files in `prob_dir` when
/// `params.probabilities` is set.
pub fn classify_directory(
    in_dir: &Path,
    model_path: &Path,
    class_dir: &Path,
    prob_dir: &Path,
    params: &ClassifyParams,
    continue_on_error: bool,
) -> Result<BatchReport> {
    info!("Classifying files in {:?}", in_dir);
    let model = TreeEnsemble::load(model_path)?;
    fs::create_dir_all(class_dir)?;
    if params.probabilities {
        fs::create_dir_all(prob_dir)?;
    }
    let ext = params.format.extension();
    let mut report = BatchReport::default();
    for image in tif_files(in_dir)? {
        let name = file_name(&image);
        let stem = name.split('.').next().unwrap_or_default();
        let class_out = class_dir.join(format!("{}_class.{}", stem, ext));
        let prob_out = prob_dir.join(format!("{}_prob.{}", stem, ext));
        let prob_out = params.probabilities.then_some(prob_out.as_path());
        let outcome = classify_to_paths(&image, &model, &class_out, prob_out, params);
        report.record(&image, outcome, continue_on_error)?;
    }
    info!(
        "Classified {} files ({} errors)",
        report.processed, report.errors
    );
    Ok(report)
}

/// Stack `composite` before `image` in a temporary directory and classify the
/// stack; the directory is removed on every exit path.
pub fn change_from_composite(
    image: &Path,
    composite: &Path,
    model_path: &Path,
    class_out: &Path,
    prob_out: Option<&Path>,
    composite_params: &CompositeParams,
    classify_params: &ClassifyParams,
) -> Result<()> {
    let tmp_dir = tempfile::TempDir::new()?;
    let stacked = tmp_dir
        .path()
        .join(format!("comp_stack.{}", composite_params.format.extension()));
    stack_images(&[composite, image], &stacked, composite_params)?;
    classify_image(&stacked, model_path, class_out, prob_out, classify_params)
}
