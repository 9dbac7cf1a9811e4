//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::{
    config::{BackgroundMode, PipelineConfig, PipelineConfigBuilder, MATTING_ERODE_RANGE},
    models::SegmentationModel,
    utils::ColorParser,
};
use anyhow::{Context, Result};
use tracing::warn;

/// Convert CLI arguments to a `PipelineConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Overlay the CLI options on the `--config` file, or on the defaults
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let base = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        let mut builder = PipelineConfigBuilder::from(base);

        if cli.as_mask {
            builder = builder.as_mask(true);
        }
        if let Some(model) = &cli.model {
            let model: SegmentationModel = model.parse().context("Invalid model")?;
            builder = builder.model(model);
        }
        if cli.alpha_matting {
            builder = builder.alpha_matting(true);
        }
        if let Some(erode) = cli.matting_erode {
            builder = builder.matting_erode(erode);
        }
        if let Some(mode) = &cli.background {
            let mode: BackgroundMode = mode.parse().context("Invalid background mode")?;
            builder = builder.background_mode(mode);
        }
        if let Some(color) = &cli.background_color {
            builder = builder.background_color(color.clone());
        }
        if cli.make_square {
            builder = builder.make_square(true);
        }
        if cli.all {
            builder = builder.process_all_open(true);
        }
        if let Some(python) = &cli.python {
            builder = builder.segmenter_executable(python.clone());
        }
        if cli.timeout.is_some() {
            builder = builder.segmenter_timeout_secs(cli.timeout);
        }

        builder.build().context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(model) = &cli.model {
            model
                .parse::<SegmentationModel>()
                .context("Invalid model")?;
        }

        if let Some(mode) = &cli.background {
            mode.parse::<BackgroundMode>()
                .context("Invalid background mode")?;
        }

        if let Some(erode) = cli.matting_erode {
            if !MATTING_ERODE_RANGE.contains(&erode) {
                anyhow::bail!("--matting-erode must be between 1 and 100, got {}", erode);
            }
        }

        if cli.timeout == Some(0) {
            anyhow::bail!("--timeout must be at least one second");
        }

        if let Some(color) = &cli.background_color {
            if ColorParser::try_parse_rgba_hex(color).is_none() {
                warn!(
                    "Background color '{}' is not #rrggbb or #rrggbbaa, falling back to white",
                    color
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackgroundSpec;
    use crate::utils::Rgba;
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["layer-bgremove"];
        argv.extend_from_slice(args);
        argv.push("input.png");
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_without_options() {
        let config = CliConfigBuilder::from_cli(&parse(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_cli_config_conversion() {
        let cli = parse(&[
            "--as-mask",
            "-m",
            "3",
            "-a",
            "--matting-erode",
            "40",
            "-b",
            "custom",
            "--background-color",
            "00ff00",
            "--make-square",
            "--all",
            "--python",
            "/opt/rembg/python",
            "--timeout",
            "90",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert!(config.as_mask);
        assert_eq!(config.model, SegmentationModel::U2NetP);
        assert!(config.alpha_matting);
        assert_eq!(config.matting_erode, 40);
        assert_eq!(config.background_spec(), BackgroundSpec::Custom(Rgba::new(0.0, 1.0, 0.0, 1.0)));
        assert!(config.make_square);
        assert!(config.process_all_open);
        assert_eq!(config.segmenter_executable, PathBuf::from("/opt/rembg/python"));
        assert_eq!(config.segmenter_timeout_secs, Some(90));
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "model": "silueta", "background-mode": "black", "make-square": true }"#,
        )
        .unwrap();

        let path_arg = path.to_string_lossy().into_owned();
        let cli = parse(&["--config", &path_arg, "-b", "white"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.model, SegmentationModel::Silueta);
        assert_eq!(config.background_mode, BackgroundMode::White);
        assert!(config.make_square);
    }

    #[test]
    fn test_cli_validation() {
        assert!(CliConfigBuilder::validate_cli(&parse(&[])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["-m", "u2net_human_seg"])).is_ok());

        assert!(CliConfigBuilder::validate_cli(&parse(&["-m", "birefnet"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["-m", "8"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["-b", "grey"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["--matting-erode", "0"])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["--timeout", "0"])).is_err());

        // malformed colors only warn
        assert!(CliConfigBuilder::validate_cli(&parse(&["--background-color", "#12"])).is_ok());
    }
}
