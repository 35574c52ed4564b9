//! Render-curve smoothing.
//!
//! Raw frames built from particle state are first decimated with
//! Ramer–Douglas–Peucker and then subdivided with Chaikin's corner cutting,
//! evaluated in closed form for any level.
//!
//! ```text
//! particles ──▶ raw frames ──▶ decimate(threshold) ──▶ chaikin(level) ──▶ smooth chunks
//! ```

use strand_solver::Solver;
use strand_types::ParticleArrays;
use strand_types::math::project_point_line;

use crate::actor::Actor;
use crate::frame::{PathFrame, oriented_frames, transport_frames};

/// Decimation thresholds below this skip decimation.
pub const MIN_DECIMATION: f64 = 1e-5;

/// Highest supported subdivision level.
pub const MAX_SMOOTHING: u32 = 3;

/// Remove frames that deviate less than `threshold · 0.1` from the
/// polyline through their neighbors. First and last frames are kept.
///
/// Curves with fewer than three frames or thresholds below
/// [`MIN_DECIMATION`] are returned unchanged.
#[must_use]
pub fn decimate(frames: &[PathFrame], threshold: f64) -> Vec<PathFrame> {
    let n = frames.len();
    if n < 3 || threshold < MIN_DECIMATION {
        return frames.to_vec();
    }
    let tolerance = threshold * threshold * 0.01;

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        let (a, b) = (&frames[start].position, &frames[end].position);
        let mut farthest = start;
        let mut max_distance = 0.0;
        for (i, frame) in frames.iter().enumerate().take(end).skip(start + 1) {
            let (projected, _) = project_point_line(&frame.position, a, b);
            let distance = (frame.position - projected).norm_squared();
            if distance > max_distance {
                farthest = i;
                max_distance = distance;
            }
        }
        if max_distance > tolerance {
            keep[farthest] = true;
            stack.push((start, farthest));
            stack.push((farthest, end));
        }
    }

    frames
        .iter()
        .zip(keep)
        .filter_map(|(frame, keep)| keep.then_some(*frame))
        .collect()
}

/// Chaikin subdivision at `level`, in closed form.
///
/// Produces `(n - 2) · 2^level + 2` frames from `n`, identical to `level`
/// rounds of quarter/three-quarter corner cutting with the original
/// endpoints restored afterwards.
#[must_use]
pub fn chaikin(frames: &[PathFrame], level: u32) -> Vec<PathFrame> {
    let n = frames.len();
    if level == 0 || n < 3 {
        return frames.to_vec();
    }

    let k = f64::from(level);
    let per_point = 1_usize << level;
    let last = n - 1;
    let half_step = 2.0_f64.powf(-(k + 1.0));
    let step = 2.0_f64.powf(-k);
    let step_sq = 2.0_f64.powf(-2.0 * k);
    let half_step_sq = 2.0_f64.powf(-2.0 * k - 1.0);

    let mut output = vec![PathFrame::default(); (last - 1) * per_point + 2];
    for j in 1..=per_point {
        let jf = j as f64;
        let f = 0.5 - half_step - (jf - 1.0) * (step - jf * half_step_sq);
        let g = 0.5 + half_step + (jf - 1.0) * (step - jf * step_sq);
        let h = (jf - 1.0) * jf * half_step_sq;
        for i in 1..last {
            output[(i - 1) * per_point + j] =
                PathFrame::weighted_sum([f, g, h], [&frames[i - 1], &frames[i], &frames[i + 1]]);
        }
    }

    output[0] = frames[0];
    let end = output.len() - 1;
    output[end] = frames[last];
    output
}

/// Arc length of a frame polyline.
#[must_use]
pub fn polyline_length(frames: &[PathFrame]) -> f64 {
    frames
        .windows(2)
        .map(|w| (w[1].position - w[0].position).norm())
        .sum()
}

/// Builds smoothed render curves for an actor.
#[derive(Debug, Clone, Default)]
pub struct PathSmoother {
    /// Decimation threshold in `[0, 1]`. Zero disables decimation.
    pub decimation: f64,
    /// Chaikin subdivision level, clamped to [`MAX_SMOOTHING`].
    pub smoothing: u32,
    /// Twist added per section, in radians.
    pub twist: f64,
    raw_chunks: Vec<Vec<PathFrame>>,
    smooth_chunks: Vec<Vec<PathFrame>>,
    smooth_length: f64,
    smooth_sections: usize,
}

impl PathSmoother {
    /// Create a smoother.
    #[must_use]
    pub fn new(decimation: f64, smoothing: u32) -> Self {
        Self {
            decimation: decimation.clamp(0.0, 1.0),
            smoothing: smoothing.min(MAX_SMOOTHING),
            ..Self::default()
        }
    }

    /// Set the per-section twist.
    #[must_use]
    pub const fn with_twist(mut self, twist: f64) -> Self {
        self.twist = twist;
        self
    }

    /// Rebuild the curves of `actor` from the current solver state.
    pub fn generate(&mut self, solver: &Solver, actor: &impl Actor) {
        let particles = solver.particles();
        let raw = actor
            .path_chunks()
            .iter()
            .map(|chunk| self.raw_frames(particles, chunk, actor.uses_oriented_particles()))
            .collect();
        self.update(raw);
    }

    /// Smooth prebuilt raw frame chunks.
    pub fn update(&mut self, raw_chunks: Vec<Vec<PathFrame>>) {
        let level = self.smoothing.min(MAX_SMOOTHING);
        self.smooth_chunks = raw_chunks
            .iter()
            .map(|chunk| chaikin(&decimate(chunk, self.decimation), level))
            .collect();
        self.raw_chunks = raw_chunks;
        self.smooth_length = self.smooth_chunks.iter().map(|c| polyline_length(c)).sum();
        self.smooth_sections = self.smooth_chunks.iter().map(Vec::len).sum();
    }

    fn raw_frames(&self, particles: &ParticleArrays, chunk: &[usize], oriented: bool) -> Vec<PathFrame> {
        let positions: Vec<_> = chunk.iter().map(|&i| particles.positions[i]).collect();
        let radii: Vec<_> = chunk.iter().map(|&i| particles.principal_radii[i].x).collect();
        let colors: Vec<_> = chunk.iter().map(|&i| particles.colors[i]).collect();
        if oriented {
            let orientations: Vec<_> = chunk.iter().map(|&i| particles.orientations[i]).collect();
            oriented_frames(&positions, &orientations, &radii, &colors)
        } else {
            let closed = chunk.len() > 2 && chunk.first() == chunk.last();
            transport_frames(&positions, &radii, &colors, closed, self.twist)
        }
    }

    /// Frames before smoothing, one list per continuous chunk.
    #[must_use]
    pub fn raw_chunks(&self) -> &[Vec<PathFrame>] {
        &self.raw_chunks
    }

    /// Smoothed frames, one list per continuous chunk.
    #[must_use]
    pub fn smooth_chunks(&self) -> &[Vec<PathFrame>] {
        &self.smooth_chunks
    }

    /// Total length of the smoothed curves.
    #[must_use]
    pub const fn smooth_length(&self) -> f64 {
        self.smooth_length
    }

    /// Total number of smoothed frames.
    #[must_use]
    pub const fn smooth_sections(&self) -> usize {
        self.smooth_sections
    }

    /// Interpolated frame at `mu` along all smoothed chunks, taken in order.
    ///
    /// `mu` is spread over the total section count, so a torn rope maps the
    /// tail of the range onto its later pieces.
    #[must_use]
    pub fn section_at(&self, mu: f64) -> Option<PathFrame> {
        if self.smooth_sections == 0 {
            return None;
        }
        let edge_mu = self.smooth_sections as f64 * mu.clamp(0.0, 0.9999);
        let index = edge_mu.floor() as usize;
        let section_mu = edge_mu - index as f64;

        let mut counter = 0;
        for chunk in &self.smooth_chunks {
            if counter + chunk.len() > index {
                let local = index - counter;
                let next = (local + 1).min(chunk.len() - 1);
                return Some(chunk[local].lerp(&chunk[next], section_mu));
            }
            counter += chunk.len();
        }
        None
    }
}
