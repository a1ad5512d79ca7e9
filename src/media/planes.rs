// SPDX-License-Identifier: GPL-3.0-only

//! Image planes and interleaved images

use crate::constants::MAX_PIXELS;
use crate::errors::InputError;
use std::fmt;

/// Color channel a plane belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Grey,
    Red,
    Green,
    Blue,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Grey => "grey",
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Greyscale or color, the only two layouts the pipeline accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Greyscale,
    Rgb,
}

impl ChannelLayout {
    /// Layout for a given samples-per-pixel count
    pub fn from_channel_count(count: u8) -> Result<Self, InputError> {
        match count {
            1 => Ok(ChannelLayout::Greyscale),
            3 => Ok(ChannelLayout::Rgb),
            other => Err(InputError::UnsupportedChannelCount(other)),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    /// Channels in interleaving order
    pub fn channels(&self) -> &'static [Channel] {
        match self {
            ChannelLayout::Greyscale => &[Channel::Grey],
            ChannelLayout::Rgb => &[Channel::Red, Channel::Green, Channel::Blue],
        }
    }
}

/// One 2-D grid of 8-bit samples, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u8>,
}

impl Plane {
    /// Create a plane, checking that the sample count matches the geometry
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, InputError> {
        let expected = pixel_count(width, height)?;
        if samples.len() != expected {
            return Err(InputError::SampleCountMismatch {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Plane where every sample has the same value
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self, InputError> {
        let len = pixel_count(width, height)?;
        Ok(Self {
            width,
            height,
            samples: vec![value; len],
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Image with 1 or 3 interleaved 8-bit samples per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedImage {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    data: Vec<u8>,
}

impl InterleavedImage {
    /// Validate and wrap interleaved samples.
    ///
    /// Rejects zero dimensions, channel counts other than 1 or 3, and data
    /// whose length does not match `width * height * channels`.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, InputError> {
        let layout = ChannelLayout::from_channel_count(channels)?;
        if width == 0 || height == 0 {
            return Err(InputError::ZeroDimensions { width, height });
        }
        let expected = pixel_count(width, height)? * layout.channel_count();
        if data.len() != expected {
            return Err(InputError::SampleCountMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Split into one plane per channel, in interleaving order
    pub fn split_planes(&self) -> Vec<Plane> {
        let stride = self.layout.channel_count();
        (0..stride)
            .map(|offset| Plane {
                width: self.width,
                height: self.height,
                samples: self.data.iter().skip(offset).step_by(stride).copied().collect(),
            })
            .collect()
    }

    /// Interleave planes back into an image.
    ///
    /// All planes must share geometry; their count picks the layout.
    pub fn from_planes(planes: &[Plane]) -> Result<Self, InputError> {
        let layout = u8::try_from(planes.len())
            .map_err(|_| InputError::PlaneCountMismatch(planes.len()))
            .and_then(ChannelLayout::from_channel_count)
            .map_err(|_| InputError::PlaneCountMismatch(planes.len()))?;
        let first = &planes[0];
        let pixels = pixel_count(first.width, first.height)?;
        for plane in planes {
            if plane.width != first.width || plane.height != first.height || plane.len() != pixels
            {
                return Err(InputError::SampleCountMismatch {
                    expected: pixels,
                    actual: plane.len(),
                });
            }
        }

        let data = match layout {
            ChannelLayout::Greyscale => first.samples.clone(),
            ChannelLayout::Rgb => (0..pixels)
                .flat_map(|i| planes.iter().map(move |plane| plane.samples[i]))
                .collect(),
        };

        Self::new(first.width, first.height, layout.channel_count() as u8, data)
    }
}

/// Pixel count for a geometry, bounded by the 32-bit counter limit
fn pixel_count(width: u32, height: u32) -> Result<usize, InputError> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_PIXELS {
        return Err(InputError::TooManyPixels { pixels });
    }
    usize::try_from(pixels).map_err(|_| InputError::TooManyPixels { pixels })
}
