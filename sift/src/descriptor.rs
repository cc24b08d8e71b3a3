use crate::pyramid::Octave;
use crate::{Descriptor, Keypoint, Sift, DESCRIPTOR_DIM};
use log::*;
use std::f32::consts::PI;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Spatial cells per descriptor axis.
const PXB: usize = 4;
/// Orientation bins per spatial cell.
const OHB: usize = 8;
/// Samples per descriptor axis (PXB cells of 4x4 samples each).
const SAMPLES: usize = 16;
/// No descriptor entry may exceed this after the first normalization.
const CLAMP: f32 = 0.2;

impl Sift {
    /// Generate descriptors for a keypoint list in canonical order.
    ///
    /// Keypoints are processed octave by octave; an octave's gradient and
    /// orientation images are generated on first use and released once its
    /// keypoints are done, so at most one octave's full image set is alive
    /// at a time. Each keypoint contributes one descriptor per dominant
    /// orientation.
    pub(crate) fn generate_descriptors(
        &self,
        octaves: &mut [Octave],
        keypoints: &[Keypoint],
    ) -> Vec<Descriptor> {
        let mut descriptors = Vec::new();
        let mut start = 0;
        while start < keypoints.len() {
            let octave_index = keypoints[start].octave;
            let end = keypoints[start..]
                .iter()
                .position(|kp| kp.octave != octave_index)
                .map_or(keypoints.len(), |p| start + p);
            let octave = &mut octaves[(octave_index - self.min_octave) as usize];
            octave.generate_grad_ori();
            let group = &keypoints[start..end];
            let octave_ref: &Octave = octave;

            #[cfg(not(feature = "rayon"))]
            let batches: Vec<Vec<Descriptor>> = group
                .iter()
                .map(|kp| self.keypoint_descriptors(kp, octave_ref))
                .collect();
            #[cfg(feature = "rayon")]
            let batches: Vec<Vec<Descriptor>> = group
                .par_iter()
                .map(|kp| self.keypoint_descriptors(kp, octave_ref))
                .collect();
            let before = descriptors.len();
            descriptors.extend(batches.into_iter().flatten());
            trace!(
                "Octave {}: {} descriptors from {} keypoints",
                octave_index,
                descriptors.len() - before,
                group.len()
            );

            octave.release_grad_ori();
            start = end;
        }
        descriptors
    }

    fn keypoint_descriptors(&self, keypoint: &Keypoint, octave: &Octave) -> Vec<Descriptor> {
        self.assign_orientations(keypoint, octave)
            .into_iter()
            .filter_map(|orientation| self.build_descriptor(keypoint, orientation, octave))
            .collect()
    }

    /// Build the 128-dimensional feature vector for one (keypoint,
    /// orientation) pair.
    ///
    /// A 16x16 grid of samples covers the descriptor region: sample
    /// coordinates live in cell space [-2, 2], are rotated by the
    /// orientation and scaled by three times the keypoint's octave-relative
    /// sigma per cell, and land in the image plane around the rounded
    /// keypoint position. Every in-bounds sample deposits its Gaussian
    /// weighted gradient magnitude into the neighboring spatial cells and
    /// orientation bins by trilinear interpolation. Returns `None` when no
    /// sample hit the image, which can happen close to the border.
    fn build_descriptor(
        &self,
        keypoint: &Keypoint,
        orientation: f32,
        octave: &Octave,
    ) -> Option<Descriptor> {
        let layer = (keypoint.s.round() as i32).clamp(0, self.samples_per_octave + 2) as usize;
        let grad = &octave.grad[layer];
        let ori = &octave.ori[layer];
        let w = grad.width() as i32;
        let h = grad.height() as i32;

        let center_x = keypoint.x.round();
        let center_y = keypoint.y.round();
        let bin_size = 3.0 * self.keypoint_relative_scale(keypoint);
        let (sin_o, cos_o) = orientation.sin_cos();
        // Gaussian window with sigma of half the descriptor width, in cell
        // units.
        let window_factor = 2.0 * (0.5 * PXB as f32) * (0.5 * PXB as f32);
        let bin_offset = (PXB as f32 - 1.0) / 2.0;

        let mut vector = [0f32; DESCRIPTOR_DIM];
        for j in 0..SAMPLES {
            let sy = (j as f32 + 0.5) * 0.25 - 2.0;
            for i in 0..SAMPLES {
                let sx = (i as f32 + 0.5) * 0.25 - 2.0;

                let px = center_x + bin_size * (cos_o * sx - sin_o * sy);
                let py = center_y + bin_size * (sin_o * sx + cos_o * sy);
                let u = px.round() as i32;
                let v = py.round() as i32;
                if u < 1 || u >= w - 1 || v < 1 || v >= h - 1 {
                    continue;
                }

                let magnitude = grad.get(u as usize, v as usize);
                let mut theta = ori.get(u as usize, v as usize) - orientation;
                if theta < 0.0 {
                    theta += 2.0 * PI;
                }
                let weight = (-(sx * sx + sy * sy) / window_factor).exp();
                let contribution = magnitude * weight;

                trilinear_accumulate(
                    &mut vector,
                    sx + bin_offset,
                    sy + bin_offset,
                    theta * OHB as f32 / (2.0 * PI) - 0.5,
                    contribution,
                );
            }
        }

        normalize_and_clamp(&mut vector)?;
        Some(Descriptor {
            keypoint: *keypoint,
            orientation,
            vector,
        })
    }
}

/// Distribute a contribution over the two nearest spatial cells per axis
/// and the two nearest orientation bins. Spatial cells outside the 4x4
/// grid drop their share; orientation bins wrap.
fn trilinear_accumulate(vector: &mut [f32; DESCRIPTOR_DIM], bx: f32, by: f32, bt: f32, value: f32) {
    let x0 = bx.floor();
    let y0 = by.floor();
    let t0 = bt.floor();
    let fx = bx - x0;
    let fy = by - y0;
    let ft = bt - t0;

    for (cy, wy) in [(y0 as i32, 1.0 - fy), (y0 as i32 + 1, fy)] {
        if cy < 0 || cy >= PXB as i32 {
            continue;
        }
        for (cx, wx) in [(x0 as i32, 1.0 - fx), (x0 as i32 + 1, fx)] {
            if cx < 0 || cx >= PXB as i32 {
                continue;
            }
            for (ct, wt) in [(t0 as i32, 1.0 - ft), (t0 as i32 + 1, ft)] {
                let bin = ct.rem_euclid(OHB as i32) as usize;
                let index = (cy as usize * PXB + cx as usize) * OHB + bin;
                vector[index] += value * wy * wx * wt;
            }
        }
    }
}

/// Normalize to unit length, clamp large entries and renormalize. Returns
/// `None` for a vector without energy.
fn normalize_and_clamp(vector: &mut [f32; DESCRIPTOR_DIM]) -> Option<()> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= f32::EPSILON {
        return None;
    }
    for value in vector.iter_mut() {
        *value = (*value / norm).min(CLAMP);
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    for value in vector.iter_mut() {
        *value /= norm;
    }
    Some(())
}

/// Quantize a descriptor entry for keyfile output.
pub(crate) fn quantize(value: f32) -> u8 {
    (512.0 * value).round().clamp(0.0, 255.0) as u8
}
