//! Depth filter configuration.
//!
//! A [`FilterChain`] is the per-camera list of processing steps run over raw
//! depth data. Steps are plain configuration: the primitives that execute
//! them are built fresh for every capture, because temporal filters carry
//! state that must not leak from one capture into the next.
//!
//! The JSON shape of a step (`Name`, `FilterMagnitude`, `FilterSmoothAlpha`,
//! `FilterSmoothDelta`, `HolesFill`, `MinDistance`, `MaxDistance`, `On`) is
//! shared with existing configuration files and must not change.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Canonical filter names, in activation order.
pub const FILTER_NAMES: [&str; 5] = [
    DecimationParams::NAME,
    SpatialParams::NAME,
    TemporalParams::NAME,
    HoleFillingParams::NAME,
    ThresholdParams::NAME,
];

/// Decimation: downsample by `filter_magnitude` in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DecimationParams {
    pub filter_magnitude: u32,
}

impl DecimationParams {
    pub const NAME: &'static str = "Decimation Filter";
}

impl Default for DecimationParams {
    fn default() -> Self {
        Self { filter_magnitude: 2 }
    }
}

/// Spatial: edge-preserving smoothing with optional horizontal hole filling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpatialParams {
    /// Number of smoothing iterations.
    pub filter_magnitude: u32,
    pub filter_smooth_alpha: f32,
    /// Step size (raw depth units) above which a neighbor is treated as an edge.
    pub filter_smooth_delta: f32,
    /// Horizontal hole-fill radius in pixels; 0 disables it.
    pub holes_fill: u32,
}

impl SpatialParams {
    pub const NAME: &'static str = "Spatial Filter";
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            filter_magnitude: 2,
            filter_smooth_alpha: 0.5,
            filter_smooth_delta: 20.0,
            holes_fill: 0,
        }
    }
}

/// Temporal: smoothing across consecutive frames of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemporalParams {
    pub filter_smooth_alpha: f32,
    pub filter_smooth_delta: f32,
}

impl TemporalParams {
    pub const NAME: &'static str = "Temporal Filter";
}

impl Default for TemporalParams {
    fn default() -> Self {
        Self {
            filter_smooth_alpha: 0.4,
            filter_smooth_delta: 20.0,
        }
    }
}

/// How hole filling picks a replacement for a missing sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoleFillMode {
    /// Use the nearest valid sample to the left.
    FillFromLeft,
    /// Use the farthest of the valid 4-neighbors.
    FarthestFromAround,
    /// Use the nearest of the valid 4-neighbors.
    NearestFromAround,
}

/// Hole filling: replaces missing samples from their neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HoleFillingParams {
    /// 0 = fill from left, 1 = farthest from around, 2 = nearest from around.
    pub holes_fill: u32,
}

impl HoleFillingParams {
    pub const NAME: &'static str = "Hole Filling Filter";

    /// Decodes the numeric mode.
    pub fn mode(&self) -> Result<HoleFillMode> {
        match self.holes_fill {
            0 => Ok(HoleFillMode::FillFromLeft),
            1 => Ok(HoleFillMode::FarthestFromAround),
            2 => Ok(HoleFillMode::NearestFromAround),
            other => Err(ScanError::InvalidFilter {
                filter: Self::NAME,
                reason: format!("unknown hole filling mode {other}"),
            }),
        }
    }
}

impl Default for HoleFillingParams {
    fn default() -> Self {
        Self { holes_fill: 1 }
    }
}

/// Threshold: drops samples outside a metric depth range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThresholdParams {
    /// Minimum kept depth in meters.
    pub min_distance: f32,
    /// Maximum kept depth in meters.
    pub max_distance: f32,
}

impl ThresholdParams {
    pub const NAME: &'static str = "Threshold Filter";
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            min_distance: 0.1,
            max_distance: 4.0,
        }
    }
}

/// The kind of a filter step together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Name")]
pub enum FilterKind {
    #[serde(rename = "Decimation Filter")]
    Decimation(DecimationParams),
    #[serde(rename = "Spatial Filter")]
    Spatial(SpatialParams),
    #[serde(rename = "Temporal Filter")]
    Temporal(TemporalParams),
    #[serde(rename = "Hole Filling Filter")]
    HoleFilling(HoleFillingParams),
    #[serde(rename = "Threshold Filter")]
    Threshold(ThresholdParams),
}

impl FilterKind {
    /// Returns the canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Decimation(_) => DecimationParams::NAME,
            Self::Spatial(_) => SpatialParams::NAME,
            Self::Temporal(_) => TemporalParams::NAME,
            Self::HoleFilling(_) => HoleFillingParams::NAME,
            Self::Threshold(_) => ThresholdParams::NAME,
        }
    }

    /// Position in the canonical activation order.
    ///
    /// Decimation runs before smoothing, smoothing before hole filling, and
    /// thresholding last so it never discards data smoothing could recover.
    pub fn rank(&self) -> usize {
        match self {
            Self::Decimation(_) => 0,
            Self::Spatial(_) => 1,
            Self::Temporal(_) => 2,
            Self::HoleFilling(_) => 3,
            Self::Threshold(_) => 4,
        }
    }

    /// Checks the parameters against what the primitive accepts.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(ScanError::InvalidFilter {
                filter: self.name(),
                reason: reason.to_string(),
            })
        };
        match self {
            Self::Decimation(p) if p.filter_magnitude == 0 => invalid("magnitude must be at least 1"),
            Self::Spatial(p) if p.filter_magnitude == 0 => invalid("magnitude must be at least 1"),
            Self::Spatial(SpatialParams {
                filter_smooth_alpha: alpha,
                ..
            })
            | Self::Temporal(TemporalParams {
                filter_smooth_alpha: alpha,
                ..
            }) if !(*alpha > 0.0 && *alpha <= 1.0) => invalid("smooth alpha must be in (0, 1]"),
            Self::HoleFilling(p) => p.mode().map(|_| ()),
            Self::Threshold(p) if p.min_distance > p.max_distance => {
                invalid("min distance exceeds max distance")
            }
            _ => Ok(()),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// One configured step of a filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterStep {
    /// Whether the step runs.
    #[serde(rename = "On", default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: FilterKind,
}

impl FilterStep {
    /// Creates an enabled step.
    pub fn new(kind: FilterKind) -> Self {
        Self {
            enabled: true,
            kind,
        }
    }

    /// Creates a disabled step.
    pub fn disabled(kind: FilterKind) -> Self {
        Self {
            enabled: false,
            kind,
        }
    }

    /// Returns the canonical name of this step.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// The filter configuration of one camera.
///
/// Steps are kept in canonical order regardless of how they were supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FilterChain {
    steps: Vec<FilterStep>,
}

impl FilterChain {
    /// Creates a chain from steps, sorting them into canonical order.
    pub fn new(mut steps: Vec<FilterStep>) -> Self {
        steps.sort_by_key(|s| s.kind.rank());
        Self { steps }
    }

    /// Creates a chain with no steps.
    pub fn empty() -> Self {
        Self { steps: Vec::new() }
    }

    /// Returns all configured steps, enabled or not.
    pub fn steps(&self) -> &[FilterStep] {
        &self.steps
    }

    /// Returns the number of configured steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step is configured.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns freshly built copies of the enabled steps, in canonical order.
    pub fn active(&self) -> Vec<FilterStep> {
        self.steps.iter().filter(|s| s.enabled).copied().collect()
    }

    /// Returns the temporal parameters configured on this chain, enabled or not.
    pub fn temporal_params(&self) -> Option<TemporalParams> {
        self.steps.iter().find_map(|s| match s.kind {
            FilterKind::Temporal(p) => Some(p),
            _ => None,
        })
    }

    /// Replaces the step of the same kind, or inserts it in canonical position.
    pub fn set(&mut self, step: FilterStep) {
        if let Some(existing) = self.steps.iter_mut().find(|s| s.kind.rank() == step.kind.rank()) {
            *existing = step;
        } else {
            self.steps.push(step);
            self.steps.sort_by_key(|s| s.kind.rank());
        }
    }

    /// Enables or disables every step with the given canonical name.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        if !FILTER_NAMES.contains(&name) {
            return Err(ScanError::UnsupportedFilter(name.to_string()));
        }
        for step in self.steps.iter_mut().filter(|s| s.name() == name) {
            step.enabled = enabled;
        }
        Ok(())
    }

    /// Checks every step's parameters.
    pub fn validate(&self) -> Result<()> {
        self.steps.iter().try_for_each(|s| s.kind.validate())
    }

    /// Parses a chain from its JSON list form.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parses a chain from an already decoded JSON value.
    ///
    /// Unknown filter names are reported as [`ScanError::UnsupportedFilter`]
    /// rather than as a generic decoding error.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        if let Some(items) = value.as_array() {
            for item in items {
                if let Some(name) = item.get("Name").and_then(serde_json::Value::as_str) {
                    if !FILTER_NAMES.contains(&name) {
                        return Err(ScanError::UnsupportedFilter(name.to_string()));
                    }
                }
            }
        }
        let steps: Vec<FilterStep> = serde_json::from_value(value)?;
        Ok(Self::new(steps))
    }

    /// Serializes the chain to its JSON list form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.steps)?)
    }
}

impl Default for FilterChain {
    /// All five filters with their default parameters, switched off.
    fn default() -> Self {
        Self::new(vec![
            FilterStep::disabled(FilterKind::Decimation(DecimationParams::default())),
            FilterStep::disabled(FilterKind::Spatial(SpatialParams::default())),
            FilterStep::disabled(FilterKind::Temporal(TemporalParams::default())),
            FilterStep::disabled(FilterKind::HoleFilling(HoleFillingParams::default())),
            FilterStep::disabled(FilterKind::Threshold(ThresholdParams::default())),
        ])
    }
}

impl<'de> Deserialize<'de> for FilterChain {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}
