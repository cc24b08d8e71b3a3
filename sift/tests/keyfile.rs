use sift::{Descriptor, Keypoint, DESCRIPTOR_DIM};

/// Hand-built descriptor with a deterministic, already-normalized vector.
fn sample_descriptor(octave: i32, x: f32, y: f32, scale: f32, orientation: f32) -> Descriptor {
    let mut vector = [0f32; DESCRIPTOR_DIM];
    for (i, value) in vector.iter_mut().enumerate() {
        *value = ((i * 13 + octave as usize * 7) % 32) as f32 / 400.0;
    }
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    for value in vector.iter_mut() {
        *value = (*value / norm).min(0.2);
    }
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    for value in vector.iter_mut() {
        *value /= norm;
    }
    Descriptor {
        keypoint: Keypoint {
            octave,
            ix: x.round() as i32,
            iy: y.round() as i32,
            is: 1,
            x,
            y,
            s: 1.25,
            scale,
        },
        orientation,
        vector,
    }
}

#[test]
fn two_records_round_trip() {
    let descriptors = vec![
        sample_descriptor(0, 10.5, 20.25, 2.2627417, 0.75),
        sample_descriptor(1, 7.125, 3.5, 4.525483, 5.5),
    ];
    let mut buffer = Vec::new();
    sift::write_keyfile_to(&mut buffer, &descriptors).unwrap();

    let parsed = sift::read_keyfile_from(buffer.as_slice()).unwrap();
    assert_eq!(parsed.len(), 2);
    for (original, restored) in descriptors.iter().zip(parsed.iter()) {
        let factor = 2f32.powi(original.keypoint.octave);
        assert_eq!(restored.keypoint.x, original.keypoint.x * factor);
        assert_eq!(restored.keypoint.y, original.keypoint.y * factor);
        assert_eq!(restored.keypoint.scale, original.keypoint.scale);
        assert_eq!(restored.orientation, original.orientation);
        // octave and raw grid data are not part of the format
        assert_eq!(restored.keypoint.octave, 0);
    }

    // a second pass through the codec is byte identical: quantization is
    // exact on already-quantized values
    let mut second = Vec::new();
    sift::write_keyfile_to(&mut second, &parsed).unwrap();
    let reparsed = sift::read_keyfile_from(second.as_slice()).unwrap();
    for (a, b) in parsed.iter().zip(reparsed.iter()) {
        assert_eq!(a.vector, b.vector);
    }
}

#[test]
fn quantized_bytes_survive_round_trip() {
    let descriptors = vec![sample_descriptor(0, 4.0, 6.0, 1.6, 1.0)];
    let mut first = Vec::new();
    sift::write_keyfile_to(&mut first, &descriptors).unwrap();
    let parsed = sift::read_keyfile_from(first.as_slice()).unwrap();
    let mut second = Vec::new();
    sift::write_keyfile_to(&mut second, &parsed).unwrap();
    // the integer section of both files must agree token for token
    let tail = |data: &[u8]| -> Vec<String> {
        String::from_utf8(data.to_vec())
            .unwrap()
            .split_whitespace()
            .skip(2 + 4)
            .map(str::to_owned)
            .collect()
    };
    assert_eq!(tail(&first), tail(&second));
}

#[test]
fn keyfile_files_round_trip_on_disk() {
    let dir = std::env::temp_dir();
    let path = dir.join("sift_keyfile_roundtrip_test.key");
    let descriptors = vec![sample_descriptor(0, 12.0, 9.0, 3.2, 2.0)];
    sift::write_keyfile(&path, &descriptors).unwrap();
    let parsed = sift::read_keyfile(&path).unwrap();
    assert_eq!(parsed.len(), 1);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn missing_file_is_io_error() {
    let result = sift::read_keyfile("/nonexistent/path/to/keyfile.key");
    assert!(matches!(result, Err(sift::Error::Io(_))));
}
