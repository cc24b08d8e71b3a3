//! SIFT keypoint detection and descriptor extraction.
//!
//! The detector builds a Gaussian/Difference-of-Gaussians scale-space
//! pyramid over a configurable octave range, finds strict 3x3x3 extrema in
//! the DoG stacks, refines them to sub-pixel/sub-scale accuracy, assigns
//! one or more dominant gradient orientations per keypoint and produces a
//! 128-dimensional unit descriptor per orientation. Descriptor lists can be
//! serialized to and from Lowe-format keypoint text files.

mod descriptor;
mod extrema;
pub mod image;
mod keyfile;
mod localization;
mod orientation;
mod pyramid;

use crate::image::GrayFloatImage;
use ::image::DynamicImage;
use float_ord::FloatOrd;
use log::*;
use std::time::Instant;

pub use keyfile::{read_keyfile, read_keyfile_from, write_keyfile, write_keyfile_to};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The fixed dimension of the feature vector.
pub const DESCRIPTOR_DIM: usize = 128;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(&'static str),
    #[error("octave {octave} would be {width}x{height}, but at least 4x4 is required")]
    ImageTooSmall {
        octave: i32,
        width: usize,
        height: usize,
    },
    #[error("keyfile i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed keyfile: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A scale-space interest point.
///
/// The raw fields locate the detected extremum on the integer sample grid
/// of its octave; the refined fields carry the sub-pixel/sub-scale fit.
/// All coordinates are relative to the octave's resampled frame. To obtain
/// input-image coordinates, multiply `x` and `y` by `2^octave`. The octave
/// index is -1 for the upsampled image, 0 for the input resolution and > 0
/// for subsampled images. `scale` is already relative to the input image.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keypoint {
    /// Octave index of the keypoint.
    pub octave: i32,
    /// Initially detected column on the octave's pixel grid.
    pub ix: i32,
    /// Initially detected row on the octave's pixel grid.
    pub iy: i32,
    /// DoG layer index the extremum was detected in, in `[1, S]`.
    pub is: i32,
    /// Refined x coordinate in the octave's frame.
    pub x: f32,
    /// Refined y coordinate in the octave's frame.
    pub y: f32,
    /// Refined scale index within the octave.
    pub s: f32,
    /// Absolute scale (sigma) in input-image pixel units.
    pub scale: f32,
}

/// A keypoint with a dominant orientation and its feature vector.
///
/// The vector is unit length and laid out as 4x4 spatial cells times 8
/// orientation bins, row-major in (spatial y, spatial x, orientation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Descriptor {
    /// The keypoint this descriptor was generated from.
    pub keypoint: Keypoint,
    /// Dominant orientation in `[0, 2*PI)`.
    pub orientation: f32,
    /// The feature vector.
    pub vector: [f32; DESCRIPTOR_DIM],
}

/// Contains the configuration parameters of the SIFT detector.
///
/// All fields are public and can be adjusted freely; they are validated
/// when extraction starts. The defaults reproduce the standard detector:
/// 3 samples per octave, octaves -1 through 4, pre-smoothing sigma 1.6.
///
/// Note that `contrast_threshold` conventionally scales with the sample
/// count as `0.02 / samples_per_octave`; [`Sift::new`] applies that rule
/// for a given sample count, while field assignment leaves the other
/// fields untouched.
#[derive(Debug, Copy, Clone)]
pub struct Sift {
    /// Samples per octave (S). Each octave holds S+3 Gaussian and S+2 DoG
    /// images.
    pub samples_per_octave: i32,

    /// Minimum octave index. -1 detects on a 2x upsampled image and is the
    /// lowest allowed value.
    pub min_octave: i32,

    /// Maximum octave index.
    pub max_octave: i32,

    /// Absolute DoG value required at a refined keypoint.
    pub contrast_threshold: f32,

    /// Ratio of principal curvatures above which a keypoint is rejected as
    /// an edge response.
    pub edge_threshold: f32,

    /// Sigma of the first Gaussian layer of every octave.
    pub pre_smoothing: f32,

    /// Blur assumed to be inherent in the input image.
    pub inherent_blur: f32,
}

impl Default for Sift {
    fn default() -> Sift {
        Sift {
            samples_per_octave: 3,
            min_octave: -1,
            max_octave: 4,
            contrast_threshold: 0.02 / 3.0,
            edge_threshold: 10.0,
            pre_smoothing: 1.6,
            inherent_blur: 0.5,
        }
    }
}

impl Sift {
    /// This convenience constructor is provided for the common case that
    /// the number of samples per octave needs to be modified; it also
    /// rescales the contrast threshold accordingly.
    pub fn new(samples_per_octave: i32) -> Self {
        Self {
            samples_per_octave,
            contrast_threshold: 0.02 / samples_per_octave as f32,
            ..Default::default()
        }
    }

    /// Scale (sigma) of a keypoint relative to its octave's frame.
    pub fn keypoint_relative_scale(&self, keypoint: &Keypoint) -> f32 {
        self.pre_smoothing
            * 2f32.powf(keypoint.s / self.samples_per_octave as f32)
    }

    /// Scale (sigma) of a keypoint in input-image pixel units.
    pub fn keypoint_absolute_scale(&self, keypoint: &Keypoint) -> f32 {
        self.pre_smoothing
            * 2f32.powf(keypoint.octave as f32 + keypoint.s / self.samples_per_octave as f32)
    }

    fn validate(&self) -> Result<()> {
        if self.samples_per_octave < 1 {
            return Err(Error::ConfigInvalid("samples_per_octave must be at least 1"));
        }
        if self.min_octave < -1 {
            return Err(Error::ConfigInvalid("min_octave must be at least -1"));
        }
        if self.max_octave < self.min_octave {
            return Err(Error::ConfigInvalid(
                "max_octave must not be less than min_octave",
            ));
        }
        if !(self.contrast_threshold >= 0.0) {
            return Err(Error::ConfigInvalid(
                "contrast_threshold must be non-negative",
            ));
        }
        if !(self.edge_threshold > 1.0) {
            return Err(Error::ConfigInvalid("edge_threshold must be greater than 1"));
        }
        if !(self.pre_smoothing > 0.0) {
            return Err(Error::ConfigInvalid("pre_smoothing must be positive"));
        }
        if !(self.inherent_blur >= 0.0) {
            return Err(Error::ConfigInvalid("inherent_blur must be non-negative"));
        }
        Ok(())
    }

    /// Verify that no octave in the configured range degenerates below the
    /// minimum size the detector can work with.
    fn check_image_size(&self, width: usize, height: usize) -> Result<()> {
        let (mut w, mut h) = if self.min_octave < 0 {
            (width * 2, height * 2)
        } else {
            (width >> self.min_octave, height >> self.min_octave)
        };
        for octave in self.min_octave..=self.max_octave {
            if w < 4 || h < 4 {
                return Err(Error::ImageTooSmall {
                    octave,
                    width: w,
                    height: h,
                });
            }
            w /= 2;
            h /= 2;
        }
        Ok(())
    }

    /// Extract keypoints and descriptors from a dynamic image.
    ///
    /// The image is converted to grayscale and normalized to [0, 1]
    /// (8-bit images are divided by 255, 16-bit by 65535).
    ///
    /// # Arguments
    /// * `image` - The input image for which to extract features.
    ///
    /// Returns the keypoints and the descriptors.
    pub fn extract(&self, image: &DynamicImage) -> Result<(Vec<Keypoint>, Vec<Descriptor>)> {
        let float_image = GrayFloatImage::from_dynamic(image);
        self.extract_from_gray_float_image(&float_image)
    }

    /// Extract keypoints and descriptors from an image already in float
    /// grayscale.
    ///
    /// This performs all operations end-to-end: pyramid construction,
    /// extremum detection, keypoint localization, orientation assignment
    /// and descriptor generation. The returned keypoint list is in
    /// canonical order (octave ascending, then raw row, raw column and
    /// scale); descriptors follow their keypoints in the same order. On a
    /// valid input this never fails, although it may return empty lists.
    ///
    /// # Arguments
    /// * `float_image` - The input image, values in [0, 1].
    ///
    /// Returns the keypoints and the descriptors.
    pub fn extract_from_gray_float_image(
        &self,
        float_image: &GrayFloatImage,
    ) -> Result<(Vec<Keypoint>, Vec<Descriptor>)> {
        self.validate()?;
        self.check_image_size(float_image.width(), float_image.height())?;

        let start = Instant::now();
        let mut octaves = self.create_octaves(float_image);
        info!("Created {} octaves in {:?}", octaves.len(), start.elapsed());

        let start = Instant::now();
        let raw = self.detect_extrema(&octaves);
        info!(
            "Detected {} raw extrema in {:?}",
            raw.len(),
            start.elapsed()
        );

        let start = Instant::now();
        let mut keypoints = self.localize_keypoints(&octaves, &raw);
        info!(
            "{}/{} keypoints remain after localization in {:?}",
            keypoints.len(),
            raw.len(),
            start.elapsed()
        );

        // Canonical order; descriptor generation walks this sequence, so
        // the descriptor list inherits it.
        keypoints.sort_unstable_by_key(|kp| (kp.octave, kp.iy, kp.ix, FloatOrd(kp.scale)));

        let start = Instant::now();
        let descriptors = self.generate_descriptors(&mut octaves, &keypoints);
        info!(
            "Generated {} descriptors in {:?}",
            descriptors.len(),
            start.elapsed()
        );

        Ok((keypoints, descriptors))
    }
}
