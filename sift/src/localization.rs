use crate::pyramid::Octave;
use crate::{Keypoint, Sift};
use log::*;

/// Offsets smaller than this in every component end the refinement; a
/// larger offset moves the integer sample one cell instead.
const CONVERGED: f32 = 0.6;

/// Gradient and Hessian of the DoG function at an integer sample, by
/// central differences across (x, y, s).
struct DogDerivatives {
    fx: f32,
    fy: f32,
    fs: f32,
    dxx: f32,
    dyy: f32,
    dss: f32,
    dxy: f32,
    dxs: f32,
    dys: f32,
}

fn dog_derivatives(octave: &Octave, x: usize, y: usize, is: usize) -> DogDerivatives {
    let below = &octave.dog[is - 1];
    let center = &octave.dog[is];
    let above = &octave.dog[is + 1];
    let value = center.get(x, y);
    DogDerivatives {
        fx: 0.5 * (center.get(x + 1, y) - center.get(x - 1, y)),
        fy: 0.5 * (center.get(x, y + 1) - center.get(x, y - 1)),
        fs: 0.5 * (above.get(x, y) - below.get(x, y)),
        dxx: center.get(x + 1, y) + center.get(x - 1, y) - 2.0 * value,
        dyy: center.get(x, y + 1) + center.get(x, y - 1) - 2.0 * value,
        dss: above.get(x, y) + below.get(x, y) - 2.0 * value,
        dxy: 0.25
            * (center.get(x + 1, y + 1) + center.get(x - 1, y - 1)
                - center.get(x + 1, y - 1)
                - center.get(x - 1, y + 1)),
        dxs: 0.25
            * (above.get(x + 1, y) - above.get(x - 1, y) - below.get(x + 1, y)
                + below.get(x - 1, y)),
        dys: 0.25
            * (above.get(x, y + 1) - above.get(x, y - 1) - below.get(x, y + 1)
                + below.get(x, y - 1)),
    }
}

/// Solve `H * delta = -g` for the symmetric 3x3 Hessian via the adjugate.
///
/// All refinement steps go through this single routine so the floating
/// point operation order is identical everywhere. Returns `None` when the
/// determinant is too close to zero to invert.
fn solve_offset(d: &DogDerivatives) -> Option<(f32, f32, f32)> {
    let det = d.dxx * (d.dyy * d.dss - d.dys * d.dys)
        - d.dxy * (d.dxy * d.dss - d.dys * d.dxs)
        + d.dxs * (d.dxy * d.dys - d.dyy * d.dxs);
    if det.abs() < 1e-15 {
        return None;
    }
    let inv = det.recip();
    // adjugate of the symmetric Hessian, row by row
    let a00 = d.dyy * d.dss - d.dys * d.dys;
    let a01 = d.dxs * d.dys - d.dxy * d.dss;
    let a02 = d.dxy * d.dys - d.dxs * d.dyy;
    let a11 = d.dxx * d.dss - d.dxs * d.dxs;
    let a12 = d.dxy * d.dxs - d.dxx * d.dys;
    let a22 = d.dxx * d.dyy - d.dxy * d.dxy;
    let dx = -inv * (a00 * d.fx + a01 * d.fy + a02 * d.fs);
    let dy = -inv * (a01 * d.fx + a11 * d.fy + a12 * d.fs);
    let ds = -inv * (a02 * d.fx + a12 * d.fy + a22 * d.fs);
    Some((dx, dy, ds))
}

impl Sift {
    /// Refine raw extrema to sub-pixel/sub-scale accuracy and filter out
    /// low-contrast and edge responses.
    ///
    /// Numeric degeneracies (singular Hessian, divergent refinement,
    /// failed tests) silently drop the keypoint in question; they are
    /// never surfaced as errors.
    pub(crate) fn localize_keypoints(&self, octaves: &[Octave], raw: &[Keypoint]) -> Vec<Keypoint> {
        let keypoints: Vec<Keypoint> = raw
            .iter()
            .filter_map(|kp| {
                let octave = &octaves[(kp.octave - self.min_octave) as usize];
                self.localize(octave, kp)
            })
            .collect();
        debug!(
            "{} keypoints of {} raw extrema survived localization",
            keypoints.len(),
            raw.len()
        );
        keypoints
    }

    /// Refine a single raw extremum. Input and output coordinates are in
    /// the keypoint's octave frame.
    fn localize(&self, octave: &Octave, raw: &Keypoint) -> Option<Keypoint> {
        const MAX_STEPS: usize = 5;

        let w = octave.width() as i32;
        let h = octave.height() as i32;
        let s_max = self.samples_per_octave;

        let mut x = raw.ix;
        let mut y = raw.iy;
        let mut s = raw.is;
        let mut converged = None;
        let mut derivs = dog_derivatives(octave, x as usize, y as usize, s as usize);
        for _ in 0..MAX_STEPS {
            let offset = solve_offset(&derivs)?;
            let (dx, dy, ds) = offset;
            if dx.abs() < CONVERGED && dy.abs() < CONVERGED && ds.abs() < CONVERGED {
                converged = Some(offset);
                break;
            }
            // Move the sample one cell toward the fitted optimum, per
            // component. Leaving the interior discards the keypoint.
            x += step(dx);
            y += step(dy);
            s += step(ds);
            if x < 1 || x > w - 2 || y < 1 || y > h - 2 || s < 1 || s > s_max {
                return None;
            }
            derivs = dog_derivatives(octave, x as usize, y as usize, s as usize);
        }
        let (dx, dy, ds) = converged?;

        // Contrast test on the interpolated DoG value.
        let value = octave.dog[s as usize].get(x as usize, y as usize);
        let refined_value =
            value + 0.5 * (derivs.fx * dx + derivs.fy * dy + derivs.fs * ds);
        if refined_value.abs() < self.contrast_threshold {
            return None;
        }

        // Edge test on the spatial 2x2 sub-block of the Hessian: the
        // ratio of principal curvatures must stay below edge_threshold.
        let trace = derivs.dxx + derivs.dyy;
        let det = derivs.dxx * derivs.dyy - derivs.dxy * derivs.dxy;
        let score_threshold =
            (self.edge_threshold + 1.0) * (self.edge_threshold + 1.0) / self.edge_threshold;
        if det <= 0.0 || trace * trace / det >= score_threshold {
            return None;
        }

        let s_refined = s as f32 + ds;
        let mut keypoint = Keypoint {
            x: x as f32 + dx,
            y: y as f32 + dy,
            s: s_refined,
            ..*raw
        };
        keypoint.scale = self.keypoint_absolute_scale(&keypoint);
        Some(keypoint)
    }
}

fn step(offset: f32) -> i32 {
    if offset >= CONVERGED {
        1
    } else if offset <= -CONVERGED {
        -1
    } else {
        0
    }
}
