use crate::pyramid::Octave;
use crate::{Keypoint, Sift};
use log::*;

impl Sift {
    /// Scan every DoG triple of every octave for local scale-space extrema.
    ///
    /// A pixel qualifies if its value is strictly greater than all 26
    /// neighbors in the 3x3x3 cube around it, or strictly less than all of
    /// them. Ties are rejected, otherwise plateaus would emit duplicates.
    /// Only interior pixels (one pixel away from the border) are
    /// considered, and only DoG layers `1..=S` can host an extremum.
    ///
    /// Returns raw keypoints on the integer sample grid; the refined
    /// fields are filled in by localization.
    pub(crate) fn detect_extrema(&self, octaves: &[Octave]) -> Vec<Keypoint> {
        let mut raw = Vec::new();
        for (index, octave) in octaves.iter().enumerate() {
            let octave_index = self.min_octave + index as i32;
            let before = raw.len();
            for is in 1..=self.samples_per_octave {
                scan_dog_triple(octave, octave_index, is, &mut raw);
            }
            debug!(
                "Octave {}: {} raw extrema",
                octave_index,
                raw.len() - before
            );
        }
        raw
    }
}

/// Scan one DoG layer (with its two neighbors) of one octave.
fn scan_dog_triple(octave: &Octave, octave_index: i32, is: i32, raw: &mut Vec<Keypoint>) {
    let below = &octave.dog[(is - 1) as usize];
    let center = &octave.dog[is as usize];
    let above = &octave.dog[(is + 1) as usize];
    let w = center.width();
    let h = center.height();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let value = center.get(x, y);
            let mut is_max = true;
            let mut is_min = true;
            'neighbors: for (li, layer) in [below, center, above].into_iter().enumerate() {
                for ny in y - 1..=y + 1 {
                    for nx in x - 1..=x + 1 {
                        if li == 1 && nx == x && ny == y {
                            continue;
                        }
                        let neighbor = layer.get(nx, ny);
                        if value <= neighbor {
                            is_max = false;
                        }
                        if value >= neighbor {
                            is_min = false;
                        }
                        if !is_max && !is_min {
                            break 'neighbors;
                        }
                    }
                }
            }
            if is_max || is_min {
                raw.push(Keypoint {
                    octave: octave_index,
                    ix: x as i32,
                    iy: y as i32,
                    is,
                    x: x as f32,
                    y: y as f32,
                    s: is as f32,
                    scale: 0.0,
                });
            }
        }
    }
}
