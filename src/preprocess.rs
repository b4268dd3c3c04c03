use std::path::Path;

use image::{imageops::FilterType, io::Reader as ImageReader, DynamicImage};
use thiserror::Error;

/// Side length the classifier expects.
pub const IMAGE_SIZE: u32 = 224;
pub const CHANNELS: u32 = 3;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Failed to read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A batch of one image in NHWC layout.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    shape: [u64; 4],
    data: Vec<f32>,
}

impl ImageTensor {
    pub fn shape(&self) -> [u64; 4] {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Reads an image from disk and turns it into model input.
///
/// The format is sniffed from the file content so a misnamed upload is
/// still decoded when possible; the extension is only a fallback.
pub fn load_image_tensor(path: &Path) -> Result<ImageTensor, PreprocessError> {
    let io_err = |source| PreprocessError::Io {
        path: path.display().to_string(),
        source,
    };

    let img = ImageReader::open(path)
        .map_err(io_err)?
        .with_guessed_format()
        .map_err(io_err)?
        .decode()?;

    Ok(image_to_tensor(&img))
}

/// Resizes to 224x224 (aspect ratio is not kept) and applies the
/// MobileNetV2 scaling, mapping `[0, 255]` onto `[-1, 1]`.
pub fn image_to_tensor(img: &DynamicImage) -> ImageTensor {
    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::Nearest);

    let mut data = Vec::with_capacity((IMAGE_SIZE * IMAGE_SIZE * CHANNELS) as usize);
    for pixel in resized.pixels() {
        data.push(normalize(pixel[0]));
        data.push(normalize(pixel[1]));
        data.push(normalize(pixel[2]));
    }

    ImageTensor {
        shape: [1, IMAGE_SIZE as u64, IMAGE_SIZE as u64, CHANNELS as u64],
        data,
    }
}

fn normalize(value: u8) -> f32 {
    value as f32 / 127.5 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use std::io::Write;

    #[test]
    fn tensor_has_batch_dimension_and_fixed_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let tensor = image_to_tensor(&img);

        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert_eq!(tensor.data().len(), 224 * 224 * 3);
    }

    #[test]
    fn pixel_values_are_scaled_into_unit_range() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        img.put_pixel(1, 0, Rgb([255, 255, 255]));
        let tensor = image_to_tensor(&DynamicImage::ImageRgb8(img));

        assert_eq!(tensor.data()[0], -1.0);
        assert_eq!(*tensor.data().last().unwrap(), 1.0);
        assert!(tensor.data().iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn grayscale_is_expanded_to_three_channels() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([255])));
        let tensor = image_to_tensor(&img);

        assert_eq!(tensor.data().len(), 224 * 224 * 3);
        assert!(tensor.data().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn loads_png_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        RgbImage::from_pixel(32, 16, Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let tensor = load_image_tensor(&path).unwrap();
        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert_eq!(tensor.data()[0], normalize(10));
        assert_eq!(tensor.data()[2], normalize(30));
    }

    #[test]
    fn non_image_content_fails_to_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.jpg");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"these are my notes, not a picture").unwrap();

        let err = load_image_tensor(&path).unwrap_err();
        assert!(matches!(err, PreprocessError::Decode(_)));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_image_tensor(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, PreprocessError::Io { .. }));
    }
}
