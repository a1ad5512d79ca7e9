// SPDX-License-Identifier: GPL-3.0-only

//! Conversions between `image` crate buffers and [`InterleavedImage`]

use super::{ChannelLayout, InterleavedImage};
use crate::errors::InputError;
use image::{DynamicImage, GrayImage, RgbImage};

/// Take ownership of a decoded image.
///
/// Only 8-bit luma and 8-bit RGB are accepted; everything else is an
/// input error rather than a silent conversion.
pub fn from_dynamic(image: DynamicImage) -> Result<InterleavedImage, InputError> {
    let (width, height) = (image.width(), image.height());
    match image {
        DynamicImage::ImageLuma8(buffer) => {
            InterleavedImage::new(width, height, 1, buffer.into_raw())
        }
        DynamicImage::ImageRgb8(buffer) => InterleavedImage::new(width, height, 3, buffer.into_raw()),
        DynamicImage::ImageLumaA8(_) => Err(InputError::UnsupportedChannelCount(2)),
        DynamicImage::ImageRgba8(_) => Err(InputError::UnsupportedChannelCount(4)),
        other => Err(InputError::UnsupportedSampleFormat(format!(
            "{:?}",
            other.color()
        ))),
    }
}

/// Wrap an equalized image for encoding
pub fn to_dynamic(image: InterleavedImage) -> Result<DynamicImage, InputError> {
    let (width, height, layout) = (image.width(), image.height(), image.layout());
    wrap_samples(width, height, layout, image.into_data())
}

fn wrap_samples(
    width: u32,
    height: u32,
    layout: ChannelLayout,
    data: Vec<u8>,
) -> Result<DynamicImage, InputError> {
    let expected = width as usize * height as usize * layout.channel_count();
    let actual = data.len();
    let wrapped = match layout {
        ChannelLayout::Greyscale => {
            GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8)
        }
        ChannelLayout::Rgb => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
    };
    wrapped.ok_or(InputError::SampleCountMismatch { expected, actual })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luma8_accepted() {
        let buffer = GrayImage::from_raw(2, 1, vec![10, 20]).unwrap();
        let image = from_dynamic(DynamicImage::ImageLuma8(buffer)).unwrap();
        assert_eq!(image.layout(), ChannelLayout::Greyscale);
        assert_eq!(image.data(), &[10, 20]);
    }

    #[test]
    fn test_rgba_rejected() {
        let image = DynamicImage::new_rgba8(2, 2);
        assert_eq!(
            from_dynamic(image),
            Err(InputError::UnsupportedChannelCount(4))
        );
    }

    #[test]
    fn test_sixteen_bit_rejected() {
        let image = DynamicImage::new_luma16(2, 2);
        assert!(matches!(
            from_dynamic(image),
            Err(InputError::UnsupportedSampleFormat(_))
        ));
    }

    #[test]
    fn test_round_trip_rgb() {
        let source = InterleavedImage::new(1, 2, 3, vec![1, 2, 3, 4, 5, 6]).unwrap();
        let back = from_dynamic(to_dynamic(source.clone()).unwrap()).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn test_short_buffer_not_wrapped() {
        assert_eq!(
            wrap_samples(2, 2, ChannelLayout::Rgb, vec![0; 9]).unwrap_err(),
            InputError::SampleCountMismatch {
                expected: 12,
                actual: 9
            }
        );
    }
}
