//! Raw depth frames and stream intrinsics.

use glam::Vec3;

/// Pinhole intrinsics of a depth stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Principal point X (pixels).
    pub ppx: f32,
    /// Principal point Y (pixels).
    pub ppy: f32,
    /// Focal length X (pixels).
    pub fx: f32,
    /// Focal length Y (pixels).
    pub fy: f32,
}

impl Intrinsics {
    /// Creates intrinsics with the principal point at the image center.
    pub fn centered(width: u32, height: u32, fx: f32, fy: f32) -> Self {
        Self {
            width,
            height,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
            fx,
            fy,
        }
    }

    /// Creates centered intrinsics matching a horizontal field of view in degrees.
    ///
    /// Pixels are assumed square, so `fy == fx`.
    pub fn from_horizontal_fov(width: u32, height: u32, fov_horizontal_degrees: f32) -> Self {
        let fx = width as f32 / (2.0 * (fov_horizontal_degrees.to_radians() / 2.0).tan());
        Self::centered(width, height, fx, fx)
    }

    /// Returns the full field of view in degrees.
    pub fn fov(&self) -> FieldOfView {
        let h = 2.0 * (self.width as f32 / (2.0 * self.fx)).atan();
        let v = 2.0 * (self.height as f32 / (2.0 * self.fy)).atan();
        FieldOfView {
            horizontal: h.to_degrees(),
            vertical: v.to_degrees(),
        }
    }

    /// Returns these intrinsics for an image downsampled by `factor`.
    #[must_use]
    pub fn scaled_down(&self, factor: u32) -> Self {
        let f = factor as f32;
        Self {
            width: self.width / factor,
            height: self.height / factor,
            ppx: self.ppx / f,
            ppy: self.ppy / f,
            fx: self.fx / f,
            fy: self.fy / f,
        }
    }

    /// Back-projects pixel `(u, v)` at metric depth `z` into camera space.
    pub fn deproject(&self, u: f32, v: f32, z: f32) -> Vec3 {
        Vec3::new((u - self.ppx) / self.fx * z, (v - self.ppy) / self.fy * z, z)
    }
}

/// Field of view of a camera, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    /// Horizontal field of view in degrees.
    pub horizontal: f32,
    /// Vertical field of view in degrees.
    pub vertical: f32,
}

impl FieldOfView {
    /// Creates a new field of view.
    pub fn new(horizontal: f32, vertical: f32) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    /// Half of the horizontal field of view, in radians.
    pub fn half_horizontal_radians(&self) -> f32 {
        (self.horizontal / 2.0).to_radians()
    }
}

/// A depth frame as delivered by a camera stream.
///
/// Depth samples are row-major raw sensor units; multiply by `depth_scale`
/// to get meters. A zero sample means "no return".
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Serial of the camera that captured this frame.
    pub serial: String,
    /// Capture timestamp in milliseconds.
    pub timestamp: f64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw depth samples.
    pub depth: Vec<u16>,
    /// Meters per raw depth unit.
    pub depth_scale: f32,
    /// Intrinsics of the stream that produced this frame.
    pub intrinsics: Intrinsics,
}

impl RawFrame {
    /// Returns the number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.depth.len()
    }

    /// Returns true if the frame holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth.is_empty()
    }

    /// Returns the raw sample at `(x, y)`.
    #[must_use]
    pub fn at(&self, x: u32, y: u32) -> u16 {
        self.depth[(y * self.width + x) as usize]
    }

    /// Returns the metric depth at `(x, y)`.
    #[must_use]
    pub fn meters_at(&self, x: u32, y: u32) -> f32 {
        f32::from(self.at(x, y)) * self.depth_scale
    }

    /// Number of samples carrying a depth return.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.depth.iter().filter(|&&d| d != 0).count()
    }

    /// Returns a frame with the same metadata and new samples and geometry.
    #[must_use]
    pub fn with_depth(&self, width: u32, height: u32, depth: Vec<u16>, intrinsics: Intrinsics) -> Self {
        Self {
            serial: self.serial.clone(),
            timestamp: self.timestamp,
            width,
            height,
            depth,
            depth_scale: self.depth_scale,
            intrinsics,
        }
    }
}
