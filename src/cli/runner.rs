use std::path::Path;

use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use eostack::api;
use eostack::core::params::{ClassifyParams, CompositeParams, MaskParams, load_params};
use eostack::core::model::InferenceConfig;
use eostack::io::resample_file_in_place;

use super::args::{ClassifyArgs, CliArgs, Command, CompositeArgs, MaskArgs};
use super::errors::AppError;

/// Parameter sections of a `--config` file; absent sections keep defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    classify: ClassifyParams,
    mask: MaskParams,
    composite: CompositeParams,
}

impl ConfigFile {
    fn load(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(path) => {
                info!("Loading parameters from {:?}", path);
                Ok(load_params(path)?)
            }
            None => Ok(Self::default()),
        }
    }

    fn composite(&self, args: &CompositeArgs) -> CompositeParams {
        let mut params = self.composite.clone();
        if let Some(format) = args.format {
            params.format = format;
        }
        if let Some(pixel_type) = args.pixel_type {
            params.pixel_type = pixel_type;
        }
        if args.nodata.is_some() {
            params.nodata = args.nodata;
        }
        params
    }

    fn mask(&self, args: &MaskArgs) -> MaskParams {
        let mut params = self.mask.clone();
        if let Some(threshold) = args.threshold {
            params.cloud_conf_threshold = threshold;
        }
        if let Some(buffer) = args.buffer {
            params.buffer_size = buffer;
        }
        if let Some(clear) = args.model_clear {
            params.model_clear = clear;
        }
        params
    }

    fn classify(&self, args: &ClassifyArgs) -> ClassifyParams {
        let mut params = self.classify.clone();
        match args.chunks {
            Some(0) => params.chunks = None,
            Some(n) => params.chunks = Some(n),
            None => {}
        }
        if let Some(threads) = args.threads {
            params.inference = InferenceConfig { threads };
        }
        if args.apply_mask {
            params.apply_mask = true;
        }
        if let Some(format) = args.class_format {
            params.format = format;
        }
        params
    }
}

/// Filter for `--log`: the `RUST_LOG` directives when they parse, else `debug`
fn log_filter(spec: Option<&str>) -> EnvFilter {
    spec.and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("debug"))
}

fn log_report(report: &api::BatchReport) {
    info!("Batch processing complete!");
    info!("Processed: {}", report.processed);
    info!("Skipped: {}", report.skipped);
    info!("Errors: {}", report.errors);
}

pub fn run(args: CliArgs) -> Result<(), AppError> {
    if args.log {
        let spec = std::env::var(EnvFilter::DEFAULT_ENV).ok();
        tracing_subscriber::fmt()
            .with_env_filter(log_filter(spec.as_deref()))
            .init();
    }
    let config = ConfigFile::load(args.config.as_deref())?;

    match args.command {
        Command::Stack {
            inputs,
            output,
            composite,
        } => api::stack_images(&inputs, &output, &config.composite(&composite))?,
        Command::Mosaic {
            inputs,
            output,
            composite,
        } => api::mosaic_images(&inputs, &output, &config.composite(&composite))?,
        Command::Composite {
            inputs,
            input_dir,
            output,
            composite,
        } => {
            let params = config.composite(&composite);
            match (input_dir, inputs.is_empty()) {
                (Some(_), false) => {
                    return Err(AppError::ConflictingArguments {
                        first: "--inputs".to_string(),
                        second: "--input-dir".to_string(),
                    });
                }
                (Some(dir), true) => {
                    let out = api::composite_directory(&dir, &output, &params)?;
                    info!("Composite written to {:?}", out);
                }
                (None, false) => {
                    api::composite_images_with_mask(&inputs, &output, &params)?;
                }
                (None, true) => {
                    return Err(AppError::MissingArgument {
                        arg: "--inputs or --input-dir".to_string(),
                    });
                }
            }
        }
        Command::MaskConfidence { image, safe, mask } => {
            api::create_mask_from_confidence_layer(&image, &safe, &config.mask(&mask))?;
        }
        Command::MaskModel {
            image,
            model,
            output,
            mask,
            classify,
        } => api::create_mask_from_model(
            &image,
            &model,
            &output,
            &config.mask(&mask),
            &config.classify(&classify),
        )?,
        Command::CombineMasks {
            inputs,
            output,
            op,
            geometry,
        } => api::combine_mask_files(
            &inputs,
            &output,
            op.unwrap_or(config.mask.combine_op),
            geometry.unwrap_or(config.mask.geometry_mode),
        )?,
        Command::BufferMask { mask, radius } => api::buffer_mask_in_place(&mask, radius)?,
        Command::StackPairs {
            image_dir,
            stack_dir,
            composite,
        } => {
            let params = config.composite(&composite);
            let stacks = api::create_new_stacks(&image_dir, &stack_dir, &params)?;
            info!("Created {} stacks in {:?}", stacks.len(), stack_dir);
        }
        Command::Aggregate {
            input_dir,
            output_dir,
            model,
            batch,
            composite,
            mask,
            classify,
        } => {
            info!("Starting batch processing from directory: {:?}", input_dir);
            let report = api::aggregate_and_mask_10m_bands(
                &input_dir,
                &output_dir,
                model.as_deref(),
                &config.composite(&composite),
                &config.mask(&mask),
                &config.classify(&classify),
                batch,
            )?;
            log_report(&report);
        }
        Command::Classify {
            image,
            model,
            class_out,
            prob_out,
            classify,
        } => api::classify_image(
            &image,
            &model,
            &class_out,
            prob_out.as_deref(),
            &config.classify(&classify),
        )?,
        Command::ClassifyDir {
            input_dir,
            model,
            class_dir,
            prob_dir,
            batch,
            classify,
        } => {
            let mut params = config.classify(&classify);
            params.probabilities |= prob_dir.is_some();
            let prob_dir = prob_dir.unwrap_or_else(|| class_dir.clone());
            let report =
                api::classify_directory(&input_dir, &model, &class_dir, &prob_dir, &params, batch)?;
            log_report(&report);
        }
        Command::Change {
            image,
            composite_image,
            model,
            class_out,
            prob_out,
            composite,
            classify,
        } => api::change_from_composite(
            &image,
            &composite_image,
            &model,
            &class_out,
            prob_out.as_deref(),
            &config.composite(&composite),
            &config.classify(&classify),
        )?,
        Command::Clip {
            input,
            aoi,
            output,
            composite,
        } => api::clip_raster(&input, &aoi, &output, &config.composite(&composite))?,
        Command::StackTrim {
            old,
            new,
            aoi,
            output,
            composite,
        } => api::stack_and_trim_images(&old, &new, &aoi, &output, &config.composite(&composite))?,
        Command::AoiIntersection {
            raster,
            aoi,
            output,
        } => api::write_aoi_intersection(&raster, &aoi, &output)?,
        Command::FlattenProb {
            input,
            output,
            format,
        } => api::flatten_probability_image(&input, &output, format)?,
        Command::Resample { path, resolution } => resample_file_in_place(&path, resolution)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_sections() {
        let config = ConfigFile::default();
        let params = config.classify(&ClassifyArgs {
            chunks: Some(0),
            threads: Some(4),
            ..Default::default()
        });
        assert_eq!(params.chunks, None);
        assert_eq!(params.inference.threads, 4);

        let params = config.mask(&MaskArgs {
            threshold: Some(60.0),
            ..Default::default()
        });
        assert_eq!(params.cloud_conf_threshold, 60.0);
        assert_eq!(params.buffer_size, 0);
    }

    #[test]
    fn test_log_filter_defaults_to_debug() {
        assert_eq!(log_filter(None).to_string(), "debug");
        assert_eq!(log_filter(Some("eostack=trace")).to_string(), "eostack=trace");
        assert_eq!(log_filter(Some("eostack=loud")).to_string(), "debug");
    }

    #[test]
    fn test_config_file_sections_are_optional() {
        let config: ConfigFile = serde_json::from_str(r#"{"mask": {"buffer_size": 3}}"#).unwrap();
        assert_eq!(config.mask.buffer_size, 3);
        assert_eq!(config.classify, ClassifyParams::default());
    }
}
