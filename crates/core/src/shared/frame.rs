use image::{imageops, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};

/// A single camera/image frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 3, index)
    }

    /// Copies the pixels into an `RgbImage`. Returns `None` for non-RGB frames.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        if self.channels != 3 {
            return None;
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Flips the frame horizontally in place (webcam mirror view).
    pub fn mirror(&mut self) {
        let (width, height) = (self.width, self.height);
        let data = self.data.as_mut_slice();
        match self.channels {
            1 => flip_horizontal::<Luma<u8>>(width, height, data),
            2 => flip_horizontal::<LumaA<u8>>(width, height, data),
            3 => flip_horizontal::<Rgb<u8>>(width, height, data),
            4 => flip_horizontal::<Rgba<u8>>(width, height, data),
            c => log::warn!("Cannot mirror a {c}-channel frame"),
        }
    }
}

fn flip_horizontal<P: Pixel<Subpixel = u8>>(width: u32, height: u32, data: &mut [u8]) {
    if let Some(mut view) = ImageBuffer::<P, &mut [u8]>::from_raw(width, height, data) {
        imageops::flip_horizontal_in_place(&mut view);
    }
}
