use crate::image::{gaussian_blur, GrayFloatImage};
use crate::Sift;
use log::*;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// One level of the scale-space pyramid.
///
/// All images share the octave's pixel dimensions. The gradient and
/// orientation stacks start empty and are only generated for octaves that
/// produced at least one candidate keypoint.
pub(crate) struct Octave {
    /// S+3 Gaussian images, layer s at sigma `pre_smoothing * 2^(s/S)`.
    pub gauss: Vec<GrayFloatImage>,
    /// S+2 difference of Gaussian images, `dog[s] = gauss[s+1] - gauss[s]`.
    pub dog: Vec<GrayFloatImage>,
    /// S+3 gradient magnitude images.
    pub grad: Vec<GrayFloatImage>,
    /// S+3 gradient orientation images, values in `[0, 2*PI)`.
    pub ori: Vec<GrayFloatImage>,
}

/// Pointwise difference of two images of identical dimensions.
fn subtract(minuend: &GrayFloatImage, subtrahend: &GrayFloatImage) -> GrayFloatImage {
    GrayFloatImage::from_array2(&minuend.ref_array2() - &subtrahend.ref_array2())
}

/// Gradient magnitude and orientation of one Gaussian layer, by centered
/// finite differences. The one-pixel border ring stays zero; downstream
/// sampling never reads it.
fn gradient_images(gauss: &GrayFloatImage) -> (GrayFloatImage, GrayFloatImage) {
    let w = gauss.width();
    let h = gauss.height();
    let mut grad = GrayFloatImage::new(w, h);
    let mut ori = GrayFloatImage::new(w, h);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let dx = 0.5 * (gauss.get(x + 1, y) - gauss.get(x - 1, y));
            let dy = 0.5 * (gauss.get(x, y + 1) - gauss.get(x, y - 1));
            grad.put(x, y, (dx * dx + dy * dy).sqrt());
            let mut angle = dy.atan2(dx);
            if angle < 0.0 {
                angle += 2.0 * std::f32::consts::PI;
            }
            ori.put(x, y, angle);
        }
    }
    (grad, ori)
}

impl Octave {
    /// Generate the gradient magnitude and orientation stacks from the
    /// Gaussian stack. A second call is a no-op.
    pub(crate) fn generate_grad_ori(&mut self) {
        if !self.grad.is_empty() {
            return;
        }
        #[cfg(not(feature = "rayon"))]
        let pairs: Vec<_> = self.gauss.iter().map(gradient_images).collect();
        #[cfg(feature = "rayon")]
        let pairs: Vec<_> = self.gauss.par_iter().map(gradient_images).collect();
        for (grad, ori) in pairs {
            self.grad.push(grad);
            self.ori.push(ori);
        }
    }

    /// Drop the gradient and orientation stacks once the octave's
    /// descriptors have been generated.
    pub(crate) fn release_grad_ori(&mut self) {
        self.grad.clear();
        self.ori.clear();
    }

    pub(crate) fn width(&self) -> usize {
        self.gauss[0].width()
    }

    pub(crate) fn height(&self) -> usize {
        self.gauss[0].height()
    }
}

impl Sift {
    /// Build the octave pyramid for the configured octave range.
    ///
    /// The first octave is seeded from the input image: upsampled 2x for
    /// octave -1 (which halves the blur it already carries, so the image
    /// arrives at `2 * inherent_blur`), or subsampled by `2^min_octave` for
    /// a non-negative minimum octave. Every following octave is seeded by
    /// subsampling layer S of its predecessor, which already carries the
    /// target sigma in the new frame.
    pub(crate) fn create_octaves(&self, image: &GrayFloatImage) -> Vec<Octave> {
        let mut octaves: Vec<Octave> = Vec::new();
        if self.min_octave < 0 {
            let upsampled = image.double_size();
            self.add_octave(&mut octaves, upsampled, 2.0 * self.inherent_blur);
        } else {
            let mut subsampled = image.clone();
            for _ in 0..self.min_octave {
                subsampled = subsampled.half_size();
            }
            self.add_octave(&mut octaves, subsampled, self.inherent_blur);
        }
        for _ in (self.min_octave + 1)..=self.max_octave {
            let seed = octaves.last().unwrap().gauss[self.samples_per_octave as usize].half_size();
            self.add_octave(&mut octaves, seed, self.pre_smoothing);
        }
        octaves
    }

    /// Append one octave built from `image`, which carries blur
    /// `has_sigma` in the octave's frame.
    ///
    /// The image is first brought up to `pre_smoothing` with an
    /// incremental blur of `sqrt(target^2 - has^2)`, then each further
    /// layer s is produced from its predecessor with incremental sigma
    /// `pre_smoothing * sqrt(2^(2s/S) - 2^(2(s-1)/S))`, so layer s sits at
    /// absolute sigma `pre_smoothing * 2^(s/S)` in this frame.
    fn add_octave(&self, octaves: &mut Vec<Octave>, image: GrayFloatImage, has_sigma: f32) {
        let target_sigma = self.pre_smoothing;
        let base = if target_sigma > has_sigma {
            gaussian_blur(
                &image,
                (target_sigma * target_sigma - has_sigma * has_sigma).sqrt(),
            )
        } else {
            image
        };
        trace!(
            "Octave {}: {}x{} base layer (has_sigma {})",
            octaves.len() as i32 + self.min_octave,
            base.width(),
            base.height(),
            has_sigma
        );
        let samples = self.samples_per_octave;
        let mut gauss = vec![base];
        let mut dog = Vec::with_capacity((samples + 2) as usize);
        for s in 1..samples + 3 {
            let blur_sigma = target_sigma
                * (2f32.powf(2.0 * s as f32 / samples as f32)
                    - 2f32.powf(2.0 * (s - 1) as f32 / samples as f32))
                .sqrt();
            let previous = gauss.last().unwrap();
            let layer = gaussian_blur(previous, blur_sigma);
            dog.push(subtract(&layer, previous));
            gauss.push(layer);
        }
        octaves.push(Octave {
            gauss,
            dog,
            grad: Vec::new(),
            ori: Vec::new(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::subtract;
    use crate::image::GrayFloatImage;
    use crate::Sift;

    #[test]
    fn default_pyramid_shape() {
        let image = GrayFloatImage::new(64, 64);
        let sift = Sift::default();
        let octaves = sift.create_octaves(&image);
        assert_eq!(octaves.len(), 6);
        let mut expected_dim = 128;
        for octave in &octaves {
            assert_eq!(octave.gauss.len(), 6);
            assert_eq!(octave.dog.len(), 5);
            assert_eq!(octave.width(), expected_dim);
            assert_eq!(octave.height(), expected_dim);
            for img in octave.gauss.iter().chain(octave.dog.iter()) {
                assert_eq!(img.width(), expected_dim);
                assert_eq!(img.height(), expected_dim);
            }
            expected_dim /= 2;
        }
    }

    #[test]
    fn incremental_blur_sigmas() {
        // absolute sigmas 1.6 * 2^(s/3) decomposed into per-layer increments
        let sift = Sift::default();
        let expected = [1.2262735, 1.54500779, 1.94658784, 2.452547, 3.09001559f32];
        for (s, &want) in (1..6).zip(expected.iter()) {
            let got = sift.pre_smoothing
                * (2f32.powf(2.0 * s as f32 / 3.0) - 2f32.powf(2.0 * (s - 1) as f32 / 3.0)).sqrt();
            assert!((got - want).abs() < 1e-4, "layer {s}: {got} vs {want}");
        }
    }

    #[test]
    fn dog_is_signed_difference() {
        let mut a = GrayFloatImage::new(3, 3);
        let mut b = GrayFloatImage::new(3, 3);
        a.put(1, 1, 0.25);
        b.put(1, 1, 0.75);
        let d = subtract(&a, &b);
        assert!((d.get(1, 1) + 0.5).abs() < 1e-7);
        assert_eq!(d.get(0, 0), 0.0);
    }

    #[test]
    fn gradient_orientation_range() {
        let mut image = GrayFloatImage::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                image.put(x, y, x as f32 * 0.1 + y as f32 * 0.05);
            }
        }
        let (grad, ori) = super::gradient_images(&image);
        // border ring stays zero
        assert_eq!(grad.get(0, 3), 0.0);
        assert_eq!(ori.get(7, 3), 0.0);
        for y in 1..7 {
            for x in 1..7 {
                let angle = ori.get(x, y);
                assert!((0.0..2.0 * std::f32::consts::PI).contains(&angle));
                assert!(grad.get(x, y) > 0.0);
            }
        }
    }
}
