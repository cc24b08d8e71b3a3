use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sift-bin",
    about = "Extract SIFT keypoints from an image and write a Lowe-format keyfile"
)]
struct Opt {
    /// Samples per octave.
    #[structopt(short, long, default_value = "3")]
    samples: i32,
    /// Minimum octave; -1 detects on a 2x upsampled image.
    #[structopt(long, default_value = "-1")]
    min_octave: i32,
    /// Maximum octave.
    #[structopt(long, default_value = "4")]
    max_octave: i32,
    /// DoG contrast threshold.
    ///
    /// If this is not provided, it defaults to 0.02 divided by the number
    /// of samples per octave.
    #[structopt(short, long)]
    contrast_threshold: Option<f32>,
    /// Edge response threshold (ratio of principal curvatures).
    #[structopt(short, long, default_value = "10")]
    edge_threshold: f32,
    /// The output keyfile path.
    ///
    /// If this is not provided, the keyfile is written next to the input
    /// with a .key extension.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,
    /// The image file to extract keypoints from.
    #[structopt(parse(from_os_str))]
    input: PathBuf,
}

fn main() {
    let opt = Opt::from_args();
    let mut sift = sift::Sift::new(opt.samples);
    sift.min_octave = opt.min_octave;
    sift.max_octave = opt.max_octave;
    sift.edge_threshold = opt.edge_threshold;
    if let Some(threshold) = opt.contrast_threshold {
        sift.contrast_threshold = threshold;
    }

    let image = image::open(&opt.input).expect("failed to open image file");
    let (keypoints, descriptors) = sift.extract(&image).expect("extraction failed");
    eprintln!(
        "{}: {} keypoints, {} descriptors",
        opt.input.display(),
        keypoints.len(),
        descriptors.len()
    );

    let output = opt
        .output
        .unwrap_or_else(|| opt.input.with_extension("key"));
    sift::write_keyfile(&output, &descriptors).expect("failed to write keyfile");
    eprintln!("wrote {}", output.display());
}
