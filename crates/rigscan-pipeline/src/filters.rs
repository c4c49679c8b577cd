//! Software depth filters.
//!
//! Each [`FilterKind`] has a primitive here that runs over a [`RawFrame`]
//! directly. Primitives take frames by value and return a new one, so a
//! superseded intermediate is dropped as soon as the next step has run.

use rigscan_core::{
    DecimationParams, FilterChain, FilterKind, FilterStep, HoleFillMode, RawFrame, Result,
    ScanError, SpatialParams, TemporalParams, ThresholdParams,
};

use crate::driver::FilterBackend;

/// A filter primitive built for one capture.
pub trait DepthFilter: Send {
    /// Canonical name of the step this primitive runs.
    fn name(&self) -> &'static str;

    /// Filters one frame.
    fn process(&mut self, frame: RawFrame) -> Result<RawFrame>;
}

/// Builds the software primitive for a step.
pub fn software_filter(step: &FilterStep) -> Result<Box<dyn DepthFilter>> {
    step.kind.validate()?;
    Ok(match step.kind {
        FilterKind::Decimation(params) => Box::new(Decimation(params)),
        FilterKind::Spatial(params) => Box::new(Spatial(params)),
        FilterKind::Temporal(params) => Box::new(Temporal::new(params)),
        FilterKind::HoleFilling(params) => Box::new(HoleFilling(params.mode()?)),
        FilterKind::Threshold(params) => Box::new(Threshold(params)),
    })
}

/// Folds a capture into one representative frame as its frames arrive.
///
/// A temporal filter runs over the sequence oldest to newest and its last
/// output represents the capture. Only the filter's running state and the
/// latest output are held, however many frames are pushed.
pub struct FrameAverager {
    filter: Box<dyn DepthFilter>,
    current: Option<RawFrame>,
    folded: usize,
}

impl FrameAverager {
    /// Builds the averaging filter from the chain's temporal parameters,
    /// enabled or not, falling back to the defaults.
    pub fn new<B: FilterBackend + ?Sized>(backend: &B, chain: &FilterChain) -> Result<Self> {
        let params = chain.temporal_params().unwrap_or_default();
        let filter = backend.create_filter(&FilterStep::new(FilterKind::Temporal(params)))?;
        Ok(Self {
            filter,
            current: None,
            folded: 0,
        })
    }

    /// Folds the next frame in.
    pub fn push(&mut self, frame: RawFrame) -> Result<()> {
        self.current = None;
        self.current = Some(self.filter.process(frame)?);
        self.folded += 1;
        Ok(())
    }

    /// Number of frames folded so far.
    pub fn folded(&self) -> usize {
        self.folded
    }

    /// Returns the representative frame.
    pub fn finish(self) -> Result<RawFrame> {
        self.current
            .ok_or_else(|| ScanError::InvalidConfig("no frames to filter".to_string()))
    }
}

/// Threads a representative frame through every enabled step of `chain`,
/// in order.
pub fn apply_chain<B: FilterBackend + ?Sized>(
    backend: &B,
    chain: &FilterChain,
    frame: RawFrame,
) -> Result<RawFrame> {
    let mut current = frame;
    for step in chain.active() {
        let mut filter = backend.create_filter(&step)?;
        let before = current.valid_count();
        current = filter.process(current)?;
        log::trace!(
            "{} on {}: {} -> {} valid samples",
            filter.name(),
            current.serial,
            before,
            current.valid_count()
        );
    }
    Ok(current)
}

fn to_depth(value: f32) -> u16 {
    value.round().clamp(0.0, f32::from(u16::MAX)) as u16
}

struct Decimation(DecimationParams);

impl DepthFilter for Decimation {
    fn name(&self) -> &'static str {
        DecimationParams::NAME
    }

    fn process(&mut self, frame: RawFrame) -> Result<RawFrame> {
        let m = self.0.filter_magnitude;
        if m == 1 {
            return Ok(frame);
        }
        let (width, height) = (frame.width / m, frame.height / m);
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidFilter {
                filter: DecimationParams::NAME,
                reason: format!("{}x{} frame is smaller than magnitude {m}", frame.width, frame.height),
            });
        }

        let mut depth = Vec::with_capacity((width * height) as usize);
        let mut block = Vec::with_capacity((m * m) as usize);
        for by in 0..height {
            for bx in 0..width {
                block.clear();
                for y in by * m..(by + 1) * m {
                    for x in bx * m..(bx + 1) * m {
                        let d = frame.at(x, y);
                        if d != 0 {
                            block.push(d);
                        }
                    }
                }
                if block.is_empty() {
                    depth.push(0);
                } else {
                    block.sort_unstable();
                    depth.push(block[block.len() / 2]);
                }
            }
        }

        let intrinsics = frame.intrinsics.scaled_down(m);
        Ok(frame.with_depth(width, height, depth, intrinsics))
    }
}

struct Spatial(SpatialParams);

impl Spatial {
    /// One recursive pass in each direction along a line of samples.
    fn smooth_line(&self, buf: &mut [f32], start: usize, stride: usize, len: usize) {
        let alpha = self.0.filter_smooth_alpha;
        let delta = self.0.filter_smooth_delta;
        let blend = |cur: f32, prev: f32| {
            if cur > 0.0 && prev > 0.0 && (cur - prev).abs() < delta {
                alpha * cur + (1.0 - alpha) * prev
            } else {
                cur
            }
        };

        if len < 2 {
            return;
        }
        for i in 1..len {
            let idx = start + i * stride;
            buf[idx] = blend(buf[idx], buf[idx - stride]);
        }
        for i in (0..len - 1).rev() {
            let idx = start + i * stride;
            buf[idx] = blend(buf[idx], buf[idx + stride]);
        }
    }

    fn fill_holes(&self, buf: &mut [f32], width: usize, height: usize) {
        let radius = self.0.holes_fill as usize;
        for y in 0..height {
            let row = &mut buf[y * width..(y + 1) * width];
            let mut last: Option<(usize, f32)> = None;
            for x in 0..width {
                if row[x] > 0.0 {
                    last = Some((x, row[x]));
                } else if let Some((lx, value)) = last {
                    if x - lx <= radius {
                        row[x] = value;
                    }
                }
            }
        }
    }
}

impl DepthFilter for Spatial {
    fn name(&self) -> &'static str {
        SpatialParams::NAME
    }

    fn process(&mut self, frame: RawFrame) -> Result<RawFrame> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        let mut buf: Vec<f32> = frame.depth.iter().map(|&d| f32::from(d)).collect();

        for _ in 0..self.0.filter_magnitude {
            for y in 0..height {
                self.smooth_line(&mut buf, y * width, 1, width);
            }
            for x in 0..width {
                self.smooth_line(&mut buf, x, width, height);
            }
        }
        if self.0.holes_fill > 0 {
            self.fill_holes(&mut buf, width, height);
        }

        let depth = buf.into_iter().map(to_depth).collect();
        let (w, h, intrinsics) = (frame.width, frame.height, frame.intrinsics);
        Ok(frame.with_depth(w, h, depth, intrinsics))
    }
}

/// Exponential smoothing across the frames of one capture.
struct Temporal {
    params: TemporalParams,
    history: Option<(u32, u32, Vec<f32>)>,
}

impl Temporal {
    fn new(params: TemporalParams) -> Self {
        Self {
            params,
            history: None,
        }
    }
}

impl DepthFilter for Temporal {
    fn name(&self) -> &'static str {
        TemporalParams::NAME
    }

    fn process(&mut self, frame: RawFrame) -> Result<RawFrame> {
        let TemporalParams {
            filter_smooth_alpha: alpha,
            filter_smooth_delta: delta,
        } = self.params;

        let out: Vec<f32> = match &self.history {
            Some((w, h, prev)) if *w == frame.width && *h == frame.height => frame
                .depth
                .iter()
                .zip(prev)
                .map(|(&d, &prev)| {
                    let cur = f32::from(d);
                    if cur == 0.0 {
                        prev
                    } else if prev > 0.0 && (cur - prev).abs() < delta {
                        alpha * cur + (1.0 - alpha) * prev
                    } else {
                        cur
                    }
                })
                .collect(),
            _ => frame.depth.iter().map(|&d| f32::from(d)).collect(),
        };

        let depth = out.iter().copied().map(to_depth).collect();
        self.history = Some((frame.width, frame.height, out));
        let (w, h, intrinsics) = (frame.width, frame.height, frame.intrinsics);
        Ok(frame.with_depth(w, h, depth, intrinsics))
    }
}

struct HoleFilling(HoleFillMode);

impl DepthFilter for HoleFilling {
    fn name(&self) -> &'static str {
        rigscan_core::HoleFillingParams::NAME
    }

    fn process(&mut self, frame: RawFrame) -> Result<RawFrame> {
        let (width, height) = (frame.width, frame.height);
        let mut depth = frame.depth.clone();

        match self.0 {
            HoleFillMode::FillFromLeft => {
                for row in depth.chunks_mut(width as usize) {
                    let mut last = 0;
                    for d in row.iter_mut() {
                        if *d == 0 {
                            *d = last;
                        } else {
                            last = *d;
                        }
                    }
                }
            }
            HoleFillMode::FarthestFromAround | HoleFillMode::NearestFromAround => {
                let farthest = self.0 == HoleFillMode::FarthestFromAround;
                for y in 0..height {
                    for x in 0..width {
                        if frame.at(x, y) != 0 {
                            continue;
                        }
                        let neighbors = [
                            (x > 0).then(|| frame.at(x - 1, y)),
                            (x + 1 < width).then(|| frame.at(x + 1, y)),
                            (y > 0).then(|| frame.at(x, y - 1)),
                            (y + 1 < height).then(|| frame.at(x, y + 1)),
                        ];
                        let valid = neighbors.into_iter().flatten().filter(|&d| d != 0);
                        let fill = if farthest { valid.max() } else { valid.min() };
                        depth[(y * width + x) as usize] = fill.unwrap_or(0);
                    }
                }
            }
        }

        let intrinsics = frame.intrinsics;
        Ok(frame.with_depth(width, height, depth, intrinsics))
    }
}

struct Threshold(ThresholdParams);

impl DepthFilter for Threshold {
    fn name(&self) -> &'static str {
        ThresholdParams::NAME
    }

    fn process(&mut self, mut frame: RawFrame) -> Result<RawFrame> {
        let ThresholdParams {
            min_distance,
            max_distance,
        } = self.0;
        let scale = frame.depth_scale;
        for d in &mut frame.depth {
            let meters = f32::from(*d) * scale;
            if meters < min_distance || meters > max_distance {
                *d = 0;
            }
        }
        Ok(frame)
    }
}
