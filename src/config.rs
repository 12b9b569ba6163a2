//! Resampler configuration
//!
//! Settings are read-only once handed to the core and shared as
//! `Arc<ResampleConfig>`. They can be loaded from a key=value property file:
//!
//! ```text
//! # comments start with '#'
//! resample.max_scale = 4
//! cache.directory = /tmp/sprites
//! ```

use crate::cache::fingerprint::Hasher64;
use crate::resample::edge::PaddingPolicy;
use crate::resample::xbrz::ScalerConfig;
use crate::resample::{MAX_SCALE, MIN_SCALE};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// All tunables of the resampler, the scheduler and the cache
#[derive(Debug, Clone, PartialEq)]
pub struct ResampleConfig {
    // Resampling
    pub max_scale: u32,
    pub preferred_max_dimension: u32,
    pub max_dimension: u32,
    pub premultiply_alpha: bool,
    pub premultiplication_low_pass: u16,
    pub hash_content: bool,
    pub wrapped_addressing: bool,
    pub padding_enabled: bool,
    pub padding_min_size_texels: u32,
    pub padding_allow: Vec<String>,
    pub padding_deny: Vec<String>,
    pub block_compression: bool,
    pub masky_alpha_deviation_threshold: f64,

    // Scaler
    pub luminance_weight: f64,
    pub equal_color_tolerance: f64,
    pub center_direction_bias: f64,
    pub dominant_direction_threshold: f64,
    pub steep_direction_threshold: f64,

    // Scheduling
    pub async_enabled: bool,
    pub worker_threads: usize,
    pub budget_per_frame_texels: u64,
    pub max_loads_per_frame: i32,
    pub can_fetch_and_load_same_frame: bool,
    pub publish_queue_capacity: usize,

    // Cache
    pub cache_directory: Option<PathBuf>,
    pub max_resident_bytes: u64,
    pub eviction_hysteresis: f64,
    pub discard_duplicates: bool,
    pub discard_duplicates_frame_delay: u64,
    pub discard_duplicates_deny: Vec<String>,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            max_scale: MAX_SCALE,
            preferred_max_dimension: 8192,
            max_dimension: 16384,
            premultiply_alpha: true,
            premultiplication_low_pass: 1024,
            hash_content: true,
            wrapped_addressing: true,
            padding_enabled: true,
            padding_min_size_texels: 4,
            padding_allow: Vec::new(),
            padding_deny: Vec::new(),
            block_compression: true,
            masky_alpha_deviation_threshold: 200.0,

            luminance_weight: 1.0,
            equal_color_tolerance: 30.0,
            center_direction_bias: 4.0,
            dominant_direction_threshold: 3.6,
            steep_direction_threshold: 2.2,

            async_enabled: true,
            worker_threads: 0,
            budget_per_frame_texels: 0x10000,
            max_loads_per_frame: 8,
            can_fetch_and_load_same_frame: true,
            publish_queue_capacity: 64,

            cache_directory: None,
            max_resident_bytes: 512 * 1024 * 1024,
            eviction_hysteresis: 1.25,
            discard_duplicates: true,
            discard_duplicates_frame_delay: 2,
            discard_duplicates_deny: Vec::new(),
        }
    }
}

impl ResampleConfig {
    /// Load and validate a property file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_properties(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Build a configuration from property text layered over the defaults
    pub fn from_properties(text: &str) -> Result<Self> {
        let mut config = Self::default();
        for (line, key, value) in parse_properties(text)? {
            config
                .set(key, value)
                .with_context(|| format!("line {}: {} = {}", line, key, value))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply one setting
    ///
    /// Unknown keys are logged and ignored.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "resample.max_scale" => self.max_scale = parse_num(value)?,
            "resample.preferred_max_dimension" => self.preferred_max_dimension = parse_num(value)?,
            "resample.max_dimension" => self.max_dimension = parse_num(value)?,
            "resample.premultiply_alpha" => self.premultiply_alpha = parse_bool(value)?,
            "resample.premultiplication_low_pass" => {
                self.premultiplication_low_pass = parse_num(value)?
            }
            "resample.hash_content" => self.hash_content = parse_bool(value)?,
            "resample.wrapped_addressing" => self.wrapped_addressing = parse_bool(value)?,
            "resample.padding.enabled" => self.padding_enabled = parse_bool(value)?,
            "resample.padding.min_size_texels" => self.padding_min_size_texels = parse_num(value)?,
            "resample.padding.allow" => self.padding_allow = parse_list(value),
            "resample.padding.deny" => self.padding_deny = parse_list(value),
            "resample.block_compression" => self.block_compression = parse_bool(value)?,
            "resample.masky_alpha_deviation_threshold" => {
                self.masky_alpha_deviation_threshold = parse_num(value)?
            }
            "xbrz.luminance_weight" => self.luminance_weight = parse_num(value)?,
            "xbrz.equal_color_tolerance" => self.equal_color_tolerance = parse_num(value)?,
            "xbrz.center_direction_bias" => self.center_direction_bias = parse_num(value)?,
            "xbrz.dominant_direction_threshold" => {
                self.dominant_direction_threshold = parse_num(value)?
            }
            "xbrz.steep_direction_threshold" => self.steep_direction_threshold = parse_num(value)?,
            "async.enabled" => self.async_enabled = parse_bool(value)?,
            "async.worker_threads" => self.worker_threads = parse_num(value)?,
            "async.budget_per_frame_texels" => self.budget_per_frame_texels = parse_num(value)?,
            "async.max_loads_per_frame" => self.max_loads_per_frame = parse_num(value)?,
            "async.can_fetch_and_load_same_frame" => {
                self.can_fetch_and_load_same_frame = parse_bool(value)?
            }
            "async.publish_queue_capacity" => self.publish_queue_capacity = parse_num(value)?,
            "cache.directory" => {
                self.cache_directory = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "cache.max_resident_bytes" => self.max_resident_bytes = parse_num(value)?,
            "cache.eviction_hysteresis" => self.eviction_hysteresis = parse_num(value)?,
            "cache.discard_duplicates" => self.discard_duplicates = parse_bool(value)?,
            "cache.discard_duplicates_frame_delay" => {
                self.discard_duplicates_frame_delay = parse_num(value)?
            }
            "cache.discard_duplicates_deny" => self.discard_duplicates_deny = parse_list(value),
            _ => log::warn!("Ignoring unknown config key '{}'", key),
        }
        Ok(())
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&self.max_scale) {
            anyhow::bail!(
                "resample.max_scale must be between {} and {} (got {})",
                MIN_SCALE,
                MAX_SCALE,
                self.max_scale
            );
        }
        if self.preferred_max_dimension == 0 || self.max_dimension == 0 {
            anyhow::bail!("Texture dimension limits must be positive");
        }
        if self.preferred_max_dimension > self.max_dimension {
            anyhow::bail!(
                "resample.preferred_max_dimension ({}) exceeds resample.max_dimension ({})",
                self.preferred_max_dimension,
                self.max_dimension
            );
        }
        let thresholds = [
            ("xbrz.luminance_weight", self.luminance_weight),
            ("xbrz.equal_color_tolerance", self.equal_color_tolerance),
            ("xbrz.center_direction_bias", self.center_direction_bias),
            ("xbrz.dominant_direction_threshold", self.dominant_direction_threshold),
            ("xbrz.steep_direction_threshold", self.steep_direction_threshold),
            (
                "resample.masky_alpha_deviation_threshold",
                self.masky_alpha_deviation_threshold,
            ),
        ];
        for (key, value) in thresholds {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("{} must be a non-negative number (got {})", key, value);
            }
        }
        if self.eviction_hysteresis < 1.0 {
            anyhow::bail!("cache.eviction_hysteresis must be at least 1.0");
        }
        if self.publish_queue_capacity == 0 {
            anyhow::bail!("async.publish_queue_capacity must be positive");
        }
        Ok(())
    }

    /// Scaler tunables derived from this configuration
    pub fn scaler_config(&self) -> ScalerConfig {
        ScalerConfig {
            luminance_weight: self.luminance_weight,
            equal_color_tolerance: self.equal_color_tolerance,
            center_direction_bias: self.center_direction_bias,
            dominant_direction_threshold: self.dominant_direction_threshold,
            steep_direction_threshold: self.steep_direction_threshold,
            premultiplied: self.premultiply_alpha,
        }
    }

    pub fn padding_policy(&self) -> PaddingPolicy<'_> {
        PaddingPolicy {
            enabled: self.padding_enabled,
            min_size_texels: self.padding_min_size_texels,
            allow: &self.padding_allow,
            deny: &self.padding_deny,
            max_dimension: self.max_dimension,
        }
    }

    /// Number of background workers to start
    pub fn effective_worker_threads(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
    }

    /// Stable hash of every setting that changes output pixels
    pub fn digest(&self) -> u64 {
        let mut hasher = Hasher64::new();
        hasher.write_u32(self.max_scale);
        hasher.write_u32(self.preferred_max_dimension);
        hasher.write_u32(self.max_dimension);
        hasher.write_bool(self.premultiply_alpha);
        hasher.write_u32(u32::from(self.premultiplication_low_pass));
        hasher.write_bool(self.wrapped_addressing);
        hasher.write_bool(self.padding_enabled);
        hasher.write_u32(self.padding_min_size_texels);
        for list in [&self.padding_allow, &self.padding_deny] {
            hasher.write_u64(list.len() as u64);
            for name in list {
                hasher.write_str(name);
            }
        }
        hasher.write_bool(self.block_compression);
        for value in [
            self.masky_alpha_deviation_threshold,
            self.luminance_weight,
            self.equal_color_tolerance,
            self.center_direction_bias,
            self.dominant_direction_threshold,
            self.steep_direction_threshold,
        ] {
            hasher.write_u64(value.to_bits());
        }
        hasher.finish()
    }
}

/// Split property text into `(line, key, value)` triples
///
/// Blank lines and `#` comments are skipped; keys and values are trimmed.
/// A line without `=` is an error.
pub fn parse_properties(text: &str) -> Result<Vec<(usize, &str, &str)>> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = match raw.find('#') {
            Some(pos) => &raw[..pos],
            None => raw,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("line {}: expected key = value", index + 1))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("line {}: missing key", index + 1);
        }
        entries.push((index + 1, key, value.trim()));
    }
    Ok(entries)
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => anyhow::bail!("Invalid boolean value '{}'", value),
    }
}

fn parse_num<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid numeric value '{}'", value))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ResampleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_scale, 6);
        assert_eq!(config.discard_duplicates_frame_delay, 2);
        assert!(config.cache_directory.is_none());
    }

    #[test]
    fn test_parse_properties() {
        let text = "# header\n\n a.b = 1 \nc=two # trailing\n";
        let entries = parse_properties(text).unwrap();
        assert_eq!(entries, vec![(3, "a.b", "1"), (4, "c", "two")]);
        assert!(parse_properties("novalue\n").is_err());
        assert!(parse_properties(" = 3\n").is_err());
    }

    #[test]
    fn test_from_properties() {
        let text = "\
resample.max_scale = 4
resample.padding.allow = hero.png, boss.png
async.enabled = no
cache.directory = /tmp/sprites
xbrz.equal_color_tolerance = 25.5
unknown.key = whatever
";
        let config = ResampleConfig::from_properties(text).unwrap();
        assert_eq!(config.max_scale, 4);
        assert_eq!(config.padding_allow, vec!["hero.png", "boss.png"]);
        assert!(!config.async_enabled);
        assert_eq!(config.cache_directory, Some(PathBuf::from("/tmp/sprites")));
        assert_eq!(config.equal_color_tolerance, 25.5);
    }

    #[test]
    fn test_invalid_values() {
        assert!(ResampleConfig::from_properties("resample.max_scale = 9").is_err());
        assert!(ResampleConfig::from_properties("resample.max_scale = 1").is_err());
        assert!(ResampleConfig::from_properties("async.enabled = maybe").is_err());
        assert!(ResampleConfig::from_properties("resample.max_dimension = -4").is_err());
        assert!(ResampleConfig::from_properties("xbrz.steep_direction_threshold = -1").is_err());
        assert!(ResampleConfig::from_properties("resample.preferred_max_dimension = 32768").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resample.cfg");
        std::fs::write(&path, "cache.max_resident_bytes = 1024\n").unwrap();
        let config = ResampleConfig::load(&path).unwrap();
        assert_eq!(config.max_resident_bytes, 1024);
        assert!(ResampleConfig::load(&dir.path().join("missing.cfg")).is_err());
    }

    #[test]
    fn test_digest_tracks_output_settings() {
        let base = ResampleConfig::default();
        let mut scheduling = base.clone();
        scheduling.budget_per_frame_texels = 1;
        scheduling.async_enabled = false;
        assert_eq!(base.digest(), scheduling.digest());

        let mut scaler = base.clone();
        scaler.equal_color_tolerance = 31.0;
        assert_ne!(base.digest(), scaler.digest());

        let mut compression = base.clone();
        compression.block_compression = false;
        assert_ne!(base.digest(), compression.digest());
    }
}
