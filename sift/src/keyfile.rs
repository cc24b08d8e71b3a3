//! Reading and writing keypoint files in Lowe's text format.
//!
//! The file starts with `<count> <dimension>`, followed by one record per
//! descriptor: the input-frame row and column of the keypoint, its
//! absolute scale and orientation, then the 128 feature values quantized
//! to integers in 0..=255. All tokens are whitespace separated.

use crate::descriptor::quantize;
use crate::{Descriptor, Error, Keypoint, Result, DESCRIPTOR_DIM};
use log::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

/// Write a descriptor list to a keyfile at `path`.
pub fn write_keyfile<P: AsRef<Path>>(path: P, descriptors: &[Descriptor]) -> Result<()> {
    let file = File::create(path)?;
    write_keyfile_to(BufWriter::new(file), descriptors)
}

/// Write a descriptor list in keyfile format to any writer.
///
/// Keypoint coordinates are converted from the octave frame to the input
/// frame by multiplying with `2^octave`. Floats use the shortest exact
/// decimal form, so reading the file back reproduces them bit for bit.
pub fn write_keyfile_to<W: Write>(mut writer: W, descriptors: &[Descriptor]) -> Result<()> {
    writeln!(writer, "{} {}", descriptors.len(), DESCRIPTOR_DIM)?;
    for descriptor in descriptors {
        let keypoint = &descriptor.keypoint;
        let factor = 2f32.powi(keypoint.octave);
        write!(
            writer,
            "{} {} {} {}",
            keypoint.y * factor,
            keypoint.x * factor,
            keypoint.scale,
            descriptor.orientation
        )?;
        for value in &descriptor.vector {
            write!(writer, " {}", quantize(*value))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Read a keyfile from `path`.
pub fn read_keyfile<P: AsRef<Path>>(path: P) -> Result<Vec<Descriptor>> {
    let file = File::open(path)?;
    read_keyfile_from(BufReader::new(file))
}

/// Read descriptors in keyfile format from any reader.
///
/// The octave index and the raw grid position are not stored in the
/// format; reconstructed keypoints report octave 0 with input-frame
/// coordinates, a zero scale index, and raw indices rounded from the
/// refined position. Feature values come back as `byte / 512`, which
/// quantizes to the identical byte when written again.
pub fn read_keyfile_from<R: Read>(mut reader: R) -> Result<Vec<Descriptor>> {
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;
    let mut tokens = contents.split_whitespace();

    let count: usize = parse_token(tokens.next(), "descriptor count")?;
    let dimension: usize = parse_token(tokens.next(), "descriptor dimension")?;
    if dimension != DESCRIPTOR_DIM {
        return Err(Error::Parse(format!(
            "descriptor dimension is {dimension}, only {DESCRIPTOR_DIM} is supported"
        )));
    }

    let mut descriptors = Vec::with_capacity(count);
    for record in 0..count {
        let y: f32 = parse_token(tokens.next(), "keypoint y")?;
        let x: f32 = parse_token(tokens.next(), "keypoint x")?;
        let scale: f32 = parse_token(tokens.next(), "keypoint scale")?;
        let orientation: f32 = parse_token(tokens.next(), "keypoint orientation")?;
        let mut vector = [0f32; DESCRIPTOR_DIM];
        for value in vector.iter_mut() {
            let quantized: u16 = parse_token(tokens.next(), "descriptor value")?;
            if quantized > 255 {
                return Err(Error::Parse(format!(
                    "descriptor value {quantized} in record {record} exceeds 255"
                )));
            }
            *value = quantized as f32 / 512.0;
        }
        descriptors.push(Descriptor {
            keypoint: Keypoint {
                octave: 0,
                ix: x.round() as i32,
                iy: y.round() as i32,
                is: 0,
                x,
                y,
                s: 0.0,
                scale,
            },
            orientation,
            vector,
        });
    }
    debug!("Read {} descriptors", descriptors.len());
    Ok(descriptors)
}

fn parse_token<T: FromStr>(token: Option<&str>, what: &str) -> Result<T> {
    let token = token.ok_or_else(|| Error::Parse(format!("file ended while reading {what}")))?;
    token
        .parse()
        .map_err(|_| Error::Parse(format!("invalid {what}: {token:?}")))
}
