use crate::config::ResampleConfig;
use crate::geometry::{Bounds, Extent, Vec2B};
use crate::logging::LogLevel;
use crate::resample::PixelFormat;
use crate::scheduler::Scheduler;
use crate::source::{SourceImage, SourceRegion};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Sprite resampler - edge-directed upscaling with a persistent cache
#[derive(Parser, Debug)]
#[command(name = "sprite-resample")]
#[command(version = "0.8.0")]
#[command(about = "Upscale a sprite or a region of an atlas", long_about = None)]
pub struct Cli {
    /// Source image
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Where to write the upscaled image
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Requested scale factor (2-6)
    #[arg(short, long, default_value_t = 2)]
    pub scale: u32,

    /// Region of the source to upscale (x,y,w,h)
    #[arg(short, long, value_name = "X,Y,W,H")]
    pub region: Option<String>,

    /// Property file with resampler settings
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Persistent cache directory
    #[arg(long = "cache-dir", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable block compression
    #[arg(long = "no-compress")]
    pub no_compress: bool,

    /// Treat the region as horizontally tiling
    #[arg(long = "wrap-x")]
    pub wrap_x: bool,

    /// Treat the region as vertically tiling
    #[arg(long = "wrap-y")]
    pub wrap_y: bool,

    /// More output (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// What a run produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub input_extent: Extent,
    pub output_extent: Extent,
    pub scale: u32,
    pub format: PixelFormat,
}

impl Cli {
    pub fn log_level(&self) -> LogLevel {
        LogLevel::from_verbosity(self.verbose)
    }

    /// Settings from the config file (if any) with command line overrides
    pub fn build_config(&self) -> Result<ResampleConfig> {
        let mut config = match &self.config {
            Some(path) => ResampleConfig::load(path)?,
            None => ResampleConfig::default(),
        };
        if let Some(dir) = &self.cache_dir {
            config.cache_directory = Some(dir.clone());
        }
        if self.no_compress {
            config.block_compression = false;
        }
        // one synchronous request; workers would sit idle
        config.async_enabled = false;
        config.validate()?;
        Ok(config)
    }

    /// Upscale the input and write the logical result
    pub fn run(&self) -> Result<RunSummary> {
        let config = self.build_config()?;

        let image = image::open(&self.input)
            .with_context(|| format!("Failed to read {}", self.input.display()))?
            .to_rgba8();
        let extent = Extent::new(image.width(), image.height());
        let name = self
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let source = Arc::new(SourceImage::from_rgba8(name, extent, image.as_raw())?);

        let bounds = match &self.region {
            Some(text) => Self::parse_region(text)?,
            None => Bounds::full(extent),
        };
        let region = SourceRegion::new(source, bounds).with_tiling(Vec2B::new(self.wrap_x, self.wrap_y));

        let scheduler = Scheduler::new(config)?;
        let texture = scheduler
            .request(&region, self.scale, true)
            .with_context(|| format!("Invalid request for region {}", bounds))?
            .into_texture()
            .context("Upscale failed; see log for details")?;

        let output_extent = texture.logical_extent();
        let rgba = texture.entry().logical_rgba8()?;
        let out = image::RgbaImage::from_raw(output_extent.width, output_extent.height, rgba)
            .context("Output buffer does not match its dimensions")?;
        out.save(&self.output)
            .with_context(|| format!("Failed to write {}", self.output.display()))?;

        log::info!(
            "Wrote {} ({} {:?}, {} bytes resident)",
            self.output.display(),
            output_extent,
            texture.format(),
            scheduler.memory().resident_bytes()
        );
        Ok(RunSummary {
            input_extent: bounds.extent,
            output_extent,
            scale: texture.scale(),
            format: texture.format(),
        })
    }

    fn parse_region(s: &str) -> Result<Bounds> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, w, h] = parts.as_slice() else {
            anyhow::bail!("Invalid region: {}. Expected x,y,w,h", s);
        };
        let bounds = Bounds::new(
            x.parse().with_context(|| format!("Invalid region x: {}", x))?,
            y.parse().with_context(|| format!("Invalid region y: {}", y))?,
            w.parse().with_context(|| format!("Invalid region width: {}", w))?,
            h.parse().with_context(|| format!("Invalid region height: {}", h))?,
        );
        Ok(bounds)
    }
}
