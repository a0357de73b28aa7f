use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Converts a frame to grayscale and equalises its histogram, the input
/// format both the detector and the classifier expect.
pub fn equalized_gray(frame: &Frame) -> Result<GrayImage, Box<dyn std::error::Error>> {
    let gray = match frame.channels() {
        1 => GrayImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("frame data does not match its dimensions")?,
        3 => {
            let rgb = frame
                .to_rgb_image()
                .ok_or("frame data does not match its dimensions")?;
            imageops::grayscale(&rgb)
        }
        n => return Err(format!("unsupported channel count: {n}").into()),
    };
    Ok(imageproc::contrast::equalize_histogram(&gray))
}

/// Cuts the face region out of a grayscale frame and resizes it to the
/// canonical `size x size`. Returns `None` if the region lies outside.
pub fn crop_face(gray: &GrayImage, region: &Region, size: u32) -> Option<GrayImage> {
    let visible = region.clamp(gray.width(), gray.height())?;
    let crop = imageops::crop_imm(
        gray,
        visible.x as u32,
        visible.y as u32,
        visible.width as u32,
        visible.height as u32,
    )
    .to_image();
    Some(resize_to_canonical(&crop, size))
}

/// Resizes any grayscale image to `size x size` (bilinear).
pub fn resize_to_canonical(image: &GrayImage, size: u32) -> GrayImage {
    if image.dimensions() == (size, size) {
        return image.clone();
    }
    imageops::resize(image, size, size, FilterType::Triangle)
}
