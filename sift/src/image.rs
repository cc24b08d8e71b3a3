use derive_more::{Deref, DerefMut};
use image::{DynamicImage, ImageBuffer, Luma};
use log::*;
use ndarray::{Array2, ArrayView2};
use nshare::RefNdarray2;

/// Single-channel f32 image with pixel values in [0, 1].
///
/// A contiguous buffer wrapped so the pyramid primitives below (separable
/// blur, stride-2 subsample, bilinear upsample) can index it directly and
/// `nshare` can bridge it into ndarray views for pointwise math. The image
/// crate decodes inputs; resampling is implemented here because the octave
/// transition must pick exact pixels rather than go through a generic
/// resizer, which keeps repeated runs bit-identical.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GrayFloatImage(pub ImageBuffer<Luma<f32>, Vec<f32>>);

impl GrayFloatImage {
    /// Decode a dynamic image into unit floats.
    ///
    /// Color inputs are reduced to luma; 8-bit channels are scaled by
    /// 255, 16-bit channels by 65535, float inputs are taken as-is.
    pub fn from_dynamic(input: &DynamicImage) -> Self {
        let (width, height) = (input.width(), input.height());
        let pixels: Vec<f32> = match input {
            DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_)
            | DynamicImage::ImageRgb16(_)
            | DynamicImage::ImageRgba16(_) => {
                debug!("Decoding a {width}x{height} 16-bit image");
                input
                    .to_luma16()
                    .into_raw()
                    .into_iter()
                    .map(|p| f32::from(p) / 65535.0)
                    .collect()
            }
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                debug!("Decoding a {width}x{height} float image");
                return Self(input.to_luma32f());
            }
            _ => {
                debug!("Decoding a {width}x{height} 8-bit image");
                input
                    .to_luma8()
                    .into_raw()
                    .into_iter()
                    .map(|p| f32::from(p) / 255.0)
                    .collect()
            }
        };
        Self(
            ImageBuffer::from_raw(width, height, pixels)
                .expect("luma conversion preserves the pixel count"),
        )
    }

    pub fn from_array2(arr: Array2<f32>) -> Self {
        let (height, width) = arr.dim();
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, arr.into_raw_vec())
                .expect("array dimensions match the raw length"),
        )
    }

    pub fn ref_array2(&self) -> ArrayView2<f32> {
        self.0.ref_ndarray2()
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    /// A zero-filled image. The gradient pass counts on fresh images
    /// starting at zero for its border ring.
    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::new(width as u32, height as u32))
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self[(x as u32, y as u32)][0]
    }

    pub fn put(&mut self, x: usize, y: usize, value: f32) {
        self[(x as u32, y as u32)][0] = value;
    }

    /// Subsample the image by a factor of two, keeping every second pixel
    /// starting from (0, 0). Output dimensions are halved rounding down,
    /// with a minimum of one pixel.
    pub fn half_size(&self) -> Self {
        let width = (self.width() / 2).max(1);
        let height = (self.height() / 2).max(1);
        let mut output = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                output.put(x, y, self.get(2 * x, 2 * y));
            }
        }
        output
    }

    /// Upsample the image by a factor of two with bilinear interpolation.
    ///
    /// Even output pixels copy the source pixel; odd output pixels are the
    /// midpoint of the two (or four) surrounding source pixels, clamped at
    /// the right and bottom edges.
    pub fn double_size(&self) -> Self {
        let w = self.width();
        let h = self.height();
        let mut output = Self::new(2 * w, 2 * h);
        for y in 0..2 * h {
            let y0 = y / 2;
            let y1 = (y0 + 1).min(h - 1);
            let wy = 0.5 * (y % 2) as f32;
            for x in 0..2 * w {
                let x0 = x / 2;
                let x1 = (x0 + 1).min(w - 1);
                let wx = 0.5 * (x % 2) as f32;
                let value = (1.0 - wy) * ((1.0 - wx) * self.get(x0, y0) + wx * self.get(x1, y0))
                    + wy * ((1.0 - wx) * self.get(x0, y1) + wx * self.get(x1, y1));
                output.put(x, y, value);
            }
        }
        output
    }
}

/// Horizontal image filter for variable kernel sizes.
///
/// Samples beyond the row ends are clamped to the edge pixel.
///
/// # Arguments
/// * `image` - the input image.
/// * `kernel` - the kernel to apply.
/// # Return value
/// The filter result.
pub fn horizontal_filter(image: &GrayFloatImage, kernel: &[f32]) -> GrayFloatImage {
    // Cannot have an even-sized kernel
    debug_assert!(kernel.len() % 2 == 1);
    let radius = (kernel.len() / 2) as isize;
    let w = image.width() as isize;
    let mut output = GrayFloatImage::new(image.width(), image.height());
    for y in 0..image.height() {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, &kernel_value) in kernel.iter().enumerate() {
                let sx = (x + k as isize - radius).clamp(0, w - 1);
                acc += kernel_value * image.get(sx as usize, y);
            }
            output.put(x as usize, y, acc);
        }
    }
    output
}

/// Vertical image filter for variable kernel sizes.
///
/// Samples beyond the column ends are clamped to the edge pixel.
///
/// # Arguments
/// * `image` - the input image.
/// * `kernel` - the kernel to apply.
/// # Return value
/// The filter result.
pub fn vertical_filter(image: &GrayFloatImage, kernel: &[f32]) -> GrayFloatImage {
    // Cannot have an even-sized kernel
    debug_assert!(kernel.len() % 2 == 1);
    let radius = (kernel.len() / 2) as isize;
    let h = image.height() as isize;
    let mut output = GrayFloatImage::new(image.width(), image.height());
    for y in 0..h {
        for x in 0..image.width() {
            let mut acc = 0.0;
            for (k, &kernel_value) in kernel.iter().enumerate() {
                let sy = (y + k as isize - radius).clamp(0, h - 1);
                acc += kernel_value * image.get(x, sy as usize);
            }
            output.put(x, y as usize, acc);
        }
    }
    output
}

/// Build a normalized Gaussian kernel of odd size.
///
/// Taps are the exponential falloff evaluated at integer offsets and
/// divided by their sum; normalization cancels the density prefactor, so
/// it is never computed.
///
/// # Arguments
/// * `sigma` - the standard deviation.
/// * `kernel_size` - the number of taps.
/// # Return value
/// The kernel (a vector).
pub fn gaussian_kernel(sigma: f32, kernel_size: usize) -> Vec<f32> {
    debug_assert!(kernel_size % 2 == 1);
    let radius = (kernel_size / 2) as i32;
    let falloff = -1.0 / (2.0 * sigma * sigma);
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|offset| ((offset * offset) as f32 * falloff).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for tap in kernel.iter_mut() {
        *tap /= sum;
    }
    kernel
}

/// Perform Gaussian blur on an image.
///
/// The kernel radius is `ceil(2.884 * sigma)`, which captures all but a
/// fraction of a percent of the Gaussian mass.
///
/// # Arguments
/// * `image` - the input image.
/// * `sigma` - the standard deviation.
/// # Return value
/// The resulting image after the filter was applied.
pub fn gaussian_blur(image: &GrayFloatImage, sigma: f32) -> GrayFloatImage {
    // a separable Gaussian kernel
    let kernel_size = (f32::ceil(2.884 * sigma) as usize) * 2 + 1;
    let kernel = gaussian_kernel(sigma, kernel_size);
    let img_horizontal = horizontal_filter(image, &kernel);
    vertical_filter(&img_horizontal, &kernel)
}

#[cfg(test)]
mod tests {
    use super::{gaussian_blur, gaussian_kernel, GrayFloatImage};

    #[test]
    fn gaussian_kernel_normalized_and_symmetric() {
        let kernel = gaussian_kernel(1.6, 11);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for i in 0..kernel.len() / 2 {
            assert!((kernel[i] - kernel[kernel.len() - 1 - i]).abs() < 1e-7);
        }
    }

    #[test]
    fn gaussian_kernel_matches_closed_form() {
        // sigma 1.6 at the blur's own truncation radius, ceil(2.884 * 1.6) = 5;
        // expected taps are exp(-k^2 / 5.12) normalized by their sum
        let kernel = gaussian_kernel(1.6, 11);
        let expected = [
            0.0018898, 0.0109606, 0.0430120, 0.1142104, 0.2051983, 0.2494580, 0.2051983, 0.1142104,
            0.0430120, 0.0109606, 0.0018898,
        ];
        for (tap, want) in kernel.iter().zip(expected.iter()) {
            assert!((tap - want).abs() < 1e-4, "{tap} vs {want}");
        }
    }

    #[test]
    fn blur_preserves_flat_image() {
        let mut image = GrayFloatImage::new(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                image.put(x, y, 0.25);
            }
        }
        let blurred = gaussian_blur(&image, 1.6);
        for y in 0..16 {
            for x in 0..16 {
                assert!((blurred.get(x, y) - 0.25).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn half_size_picks_even_pixels() {
        let mut image = GrayFloatImage::new(5, 4);
        for y in 0..4 {
            for x in 0..5 {
                image.put(x, y, (y * 5 + x) as f32);
            }
        }
        let half = image.half_size();
        assert_eq!(half.width(), 2);
        assert_eq!(half.height(), 2);
        assert_eq!(half.get(0, 0), 0.0);
        assert_eq!(half.get(1, 0), 2.0);
        assert_eq!(half.get(0, 1), 10.0);
        assert_eq!(half.get(1, 1), 12.0);
    }

    #[test]
    fn double_size_interpolates_midpoints() {
        let mut image = GrayFloatImage::new(2, 2);
        image.put(0, 0, 0.0);
        image.put(1, 0, 1.0);
        image.put(0, 1, 0.0);
        image.put(1, 1, 1.0);
        let double = image.double_size();
        assert_eq!(double.width(), 4);
        assert_eq!(double.height(), 4);
        assert_eq!(double.get(0, 0), 0.0);
        assert_eq!(double.get(2, 0), 1.0);
        assert!((double.get(1, 0) - 0.5).abs() < 1e-7);
        assert!((double.get(1, 2) - 0.5).abs() < 1e-7);
    }

    #[test]
    fn byte_decode_scales_to_unit_range() {
        let mut bytes = image::GrayImage::new(3, 2);
        bytes.put_pixel(0, 0, image::Luma([0u8]));
        bytes.put_pixel(1, 0, image::Luma([51u8]));
        bytes.put_pixel(2, 1, image::Luma([255u8]));
        let decoded = GrayFloatImage::from_dynamic(&image::DynamicImage::ImageLuma8(bytes));
        assert_eq!(decoded.width(), 3);
        assert_eq!(decoded.height(), 2);
        assert_eq!(decoded.get(0, 0), 0.0);
        assert!((decoded.get(1, 0) - 0.2).abs() < 1e-7);
        assert_eq!(decoded.get(2, 1), 1.0);
    }
}
