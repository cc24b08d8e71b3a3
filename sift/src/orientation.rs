use crate::pyramid::Octave;
use crate::{Keypoint, Sift};
use std::f32::consts::PI;

const NBINS: usize = 36;
const SMOOTH_PASSES: usize = 6;

impl Sift {
    /// Find the dominant gradient orientations of a keypoint.
    ///
    /// Gradient samples are taken from the layer nearest to the refined
    /// scale index, inside a square window around the rounded keypoint
    /// position, each weighted by its magnitude and a Gaussian of the
    /// distance to the refined position. The smoothed 36-bin histogram
    /// yields one orientation per local peak reaching 80% of the maximum,
    /// refined by a parabolic fit. A keypoint can therefore produce
    /// several orientations, or none when the window has no energy.
    pub(crate) fn assign_orientations(&self, keypoint: &Keypoint, octave: &Octave) -> Vec<f32> {
        let mut histogram = [0f32; NBINS];

        let sigma = 1.5 * self.keypoint_relative_scale(keypoint);
        let sigma_factor = 2.0 * sigma * sigma;
        let win = (3.0 * sigma) as i32;
        let ix = keypoint.x.round() as i32;
        let iy = keypoint.y.round() as i32;
        let layer = (keypoint.s.round() as i32).clamp(0, self.samples_per_octave + 2) as usize;
        let grad = &octave.grad[layer];
        let ori = &octave.ori[layer];
        let w = grad.width() as i32;
        let h = grad.height() as i32;
        let dxf = keypoint.x - ix as f32;
        let dyf = keypoint.y - iy as f32;

        for dy in -win..=win {
            for dx in -win..=win {
                let x = ix + dx;
                let y = iy + dy;
                // the gradient images carry a zero ring; skip it entirely
                if x < 1 || x >= w - 1 || y < 1 || y >= h - 1 {
                    continue;
                }
                let dist = (dx as f32 - dxf).powi(2) + (dy as f32 - dyf).powi(2);
                let weight = (-dist / sigma_factor).exp();
                let magnitude = grad.get(x as usize, y as usize);
                let angle = ori.get(x as usize, y as usize);
                let bin = ((NBINS as f32 * angle / (2.0 * PI)) as usize).min(NBINS - 1);
                histogram[bin] += magnitude * weight;
            }
        }

        smooth_histogram(&mut histogram);

        let max = histogram.iter().cloned().fold(0f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }
        let mut orientations = Vec::new();
        for i in 0..NBINS {
            let h0 = histogram[(i + NBINS - 1) % NBINS];
            let h1 = histogram[i];
            let h2 = histogram[(i + 1) % NBINS];
            if h1 <= h0 || h1 <= h2 || h1 < 0.8 * max {
                continue;
            }
            // parabola through the peak and its neighbors
            let offset = 0.5 * (h0 - h2) / (h0 - 2.0 * h1 + h2);
            let mut angle = 2.0 * PI * (i as f32 + 0.5 + offset) / NBINS as f32;
            if angle < 0.0 {
                angle += 2.0 * PI;
            } else if angle >= 2.0 * PI {
                angle -= 2.0 * PI;
            }
            orientations.push(angle);
        }
        orientations
    }
}

/// Circular box smoothing of the orientation histogram. A fixed number of
/// passes of the width-3 kernel, applied in one place so every platform
/// accumulates in the same order.
fn smooth_histogram(histogram: &mut [f32; NBINS]) {
    for _ in 0..SMOOTH_PASSES {
        let first = histogram[0];
        let mut previous = histogram[NBINS - 1];
        for i in 0..NBINS - 1 {
            let current = histogram[i];
            histogram[i] = (previous + current + histogram[i + 1]) / 3.0;
            previous = current;
        }
        histogram[NBINS - 1] = (previous + histogram[NBINS - 1] + first) / 3.0;
    }
}
