// normal.rs - Normal map normalization
//
// Pipeline per source:
//   1. Decode as linear float (RGB, or RGBA when the file has alpha)
//   2. Remap signed [-1,1] data into [0,1] if any sample is negative
//   3. Clamp to [0,1] and quantize to 16 bits
//   4. Write a 16-bit TIFF for the compressor

use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgb, Rgba};
use ndarray::Array3;

use crate::error::{Error, Result};

/// Float raster laid out as (row, column, channel).
pub struct Raster {
    pub samples: Array3<f32>,
}

impl Raster {
    pub fn width(&self) -> u32 {
        self.samples.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.samples.dim().0 as u32
    }

    pub fn channels(&self) -> usize {
        self.samples.dim().2
    }

    /// Smallest non-NaN sample, `None` for an empty raster.
    pub fn min_sample(&self) -> Option<f32> {
        self.samples
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f32| m.min(v))))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub width: u32,
    pub height: u32,
    pub channels: usize,
    pub min: Option<f32>,
    pub remapped: bool,
}

pub fn decode(path: &Path) -> Result<Raster> {
    let img = image::open(path).map_err(|source| Error::Image { path: path.to_path_buf(), source })?;
    from_image(img, path)
}

pub fn from_image(img: DynamicImage, path: &Path) -> Result<Raster> {
    let (w, h) = img.dimensions();
    let (channels, data) = if img.color().has_alpha() {
        (4, img.into_rgba32f().into_raw())
    } else {
        (3, img.into_rgb32f().into_raw())
    };

    let samples = Array3::from_shape_vec((h as usize, w as usize, channels), data)
        .map_err(|e| Error::Raster { path: path.to_path_buf(), reason: e.to_string() })?;
    Ok(Raster { samples })
}

/// Shift signed data into [0,1] with `0.5 * x + 0.5`.
/// Only applies when some sample is negative; returns whether it did.
pub fn remap_signed(raster: &mut Raster) -> bool {
    match raster.min_sample() {
        Some(min) if min < 0.0 => {
            raster.samples.mapv_inplace(|v| v * 0.5 + 0.5);
            true
        }
        _ => false,
    }
}

/// `round(clamp(x, 0, 1) * 65535)`; NaN maps to 0.
pub fn quantize_sample(v: f32) -> u16 {
    if v.is_nan() {
        return 0;
    }
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

pub fn quantize(raster: &Raster) -> Vec<u16> {
    raster.samples.iter().map(|&v| quantize_sample(v)).collect()
}

pub fn write_tiff16(path: &Path, width: u32, height: u32, channels: usize, data: Vec<u16>) -> Result<()> {
    let len = data.len();
    let bad_size = || Error::Raster {
        path: path.to_path_buf(),
        reason: format!("{} samples do not fill {}x{}x{}", len, width, height, channels),
    };
    let img = match channels {
        4 => DynamicImage::ImageRgba16(ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, data).ok_or_else(bad_size)?),
        3 => DynamicImage::ImageRgb16(ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, data).ok_or_else(bad_size)?),
        n => {
            return Err(Error::Raster { path: path.to_path_buf(), reason: format!("unsupported channel count {}", n) });
        }
    };
    img.save_with_format(path, ImageFormat::Tiff)
        .map_err(|source| Error::Image { path: path.to_path_buf(), source })
}

/// Decode `source`, normalize it, and write the 16-bit intermediate.
pub fn prepare(source: &Path, intermediate: &Path) -> Result<Prepared> {
    let mut raster = decode(source)?;
    let min = raster.min_sample();
    let remapped = remap_signed(&mut raster);

    let (width, height, channels) = (raster.width(), raster.height(), raster.channels());
    write_tiff16(intermediate, width, height, channels, quantize(&raster))?;

    Ok(Prepared { width, height, channels, min, remapped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb32FImage;

    fn raster(values: &[f32]) -> Raster {
        Raster { samples: Array3::from_shape_vec((1, values.len() / 3, 3), values.to_vec()).unwrap() }
    }

    #[test]
    fn negative_data_is_remapped() {
        let input = [-1.0, 0.0, 1.0, 0.25, -0.5, 0.75];
        let mut r = raster(&input);
        assert!(remap_signed(&mut r));
        for (out, inp) in r.samples.iter().zip(input) {
            assert_relative_eq!(*out, 0.5 * inp + 0.5);
        }
    }

    #[test]
    fn non_negative_data_passes_through() {
        let input = [0.0, 0.5, 1.2, 0.1, 0.2, 0.3];
        let mut r = raster(&input);
        assert!(!remap_signed(&mut r));
        assert_eq!(r.samples.iter().copied().collect::<Vec<_>>(), input.to_vec());
    }

    #[test]
    fn quantize_clamps_and_rounds() {
        assert_eq!(quantize_sample(-0.3), 0);
        assert_eq!(quantize_sample(0.0), 0);
        assert_eq!(quantize_sample(1.0), 65535);
        assert_eq!(quantize_sample(7.0), 65535);
        assert_eq!(quantize_sample(0.5), 32768);
        assert_eq!(quantize_sample(f32::NAN), 0);
        for i in 0..=100 {
            let x = i as f32 / 100.0;
            assert_eq!(quantize_sample(x), (x * 65535.0).round() as u16);
        }
    }

    #[test]
    fn min_ignores_nan() {
        let r = raster(&[f32::NAN, 0.2, 0.4]);
        assert_eq!(r.min_sample(), Some(0.2));
    }

    #[test]
    fn prepare_writes_sixteen_bit_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let img = Rgb32FImage::from_fn(4, 2, |x, _| Rgb([x as f32 / 3.0, -1.0, 1.0]));
        let src = dir.path().join("test_nor_gl.exr");
        DynamicImage::ImageRgb32F(img).save(&src).unwrap();

        let tif = dir.path().join("temp_normal.tif");
        let prepared = prepare(&src, &tif).unwrap();
        assert!(prepared.remapped);
        assert_eq!((prepared.width, prepared.height, prepared.channels), (4, 2, 3));

        let back = image::open(&tif).unwrap();
        let back = back.as_rgb16().expect("16-bit RGB");
        // -1 -> 0.0, 1 -> 1.0, x=0 -> 0.5
        assert_eq!(back.get_pixel(0, 0).0, [32768, 0, 65535]);
        assert_eq!(back.get_pixel(3, 1).0, [65535, 0, 65535]);
    }
}
