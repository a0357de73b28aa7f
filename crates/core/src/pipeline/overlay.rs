use image::{ImageBuffer, Rgb};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::recognition::domain::identity::{Identity, Recognition};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

pub const REGISTRATION_COLOR: Rgb<u8> = Rgb([255, 176, 0]);
pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
pub const DETECTION_COLOR: Rgb<u8> = Rgb([0, 200, 255]);

const LINE_WIDTH: i32 = 2;
const BAR_HEIGHT: u32 = 6;
/// Approximate cap height of the label font, in pixels.
const TEXT_HEIGHT: i32 = 12;
const TEXT_GAP: i32 = 3;

/// Text placed near a face box.
#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
struct Label {
    text: String,
    region: Region,
    color: Rgb<u8>,
}

type FrameCanvas<'a> = ImageBuffer<Rgb<u8>, &'a mut [u8]>;

fn with_canvas(frame: &mut Frame, draw: impl FnOnce(&mut FrameCanvas<'_>)) {
    if frame.channels() != 3 {
        return;
    }
    let (width, height) = (frame.width(), frame.height());
    if let Some(mut canvas) = FrameCanvas::from_raw(width, height, frame.data_mut()) {
        draw(&mut canvas);
    }
}

fn draw_box(canvas: &mut FrameCanvas<'_>, region: &Region, color: Rgb<u8>) {
    for inset in 0..LINE_WIDTH {
        let w = region.width - 2 * inset;
        let h = region.height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(region.x + inset, region.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Horizontal bar just above `region`, filled to `fraction` of its width.
fn draw_bar(canvas: &mut FrameCanvas<'_>, region: &Region, fraction: f64, color: Rgb<u8>) {
    let filled = (region.width as f64 * fraction.clamp(0.0, 1.0)).round() as u32;
    if filled == 0 {
        return;
    }
    let y = (region.y - BAR_HEIGHT as i32 - LINE_WIDTH).max(0);
    draw_filled_rect_mut(canvas, Rect::at(region.x, y).of_size(filled, BAR_HEIGHT), color);
}

/// Baseline origin for a label: above the progress bar, or below the box
/// when the face touches the top edge.
#[cfg_attr(not(feature = "opencv"), allow(dead_code))]
fn label_origin(region: &Region) -> (i32, i32) {
    let above = region.y - BAR_HEIGHT as i32 - LINE_WIDTH - TEXT_GAP;
    if above - TEXT_HEIGHT >= 0 {
        (region.x.max(0), above)
    } else {
        (region.x.max(0), region.y + region.height + TEXT_GAP + TEXT_HEIGHT)
    }
}

#[cfg(feature = "opencv")]
fn draw_labels(frame: &mut Frame, labels: &[Label]) {
    if labels.is_empty() || frame.channels() != 3 {
        return;
    }
    if let Err(e) = put_labels(frame, labels) {
        log::debug!("Overlay text skipped: {e}");
    }
}

/// Renders with OpenCV's built-in Hershey font on a copy of the frame.
#[cfg(feature = "opencv")]
fn put_labels(frame: &mut Frame, labels: &[Label]) -> opencv::Result<()> {
    use opencv::core::{Mat, Point, Scalar, CV_8UC3};
    use opencv::imgproc;
    use opencv::prelude::{MatTraitConstManual, MatTraitManual};

    let (width, height) = (frame.width() as i32, frame.height() as i32);
    let mut mat = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(frame.data());
    for label in labels {
        let (x, y) = label_origin(&label.region);
        let [r, g, b] = label.color.0;
        imgproc::put_text(
            &mut mat,
            &label.text,
            Point::new(x, y),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            // Channel order follows the buffer, which is RGB.
            Scalar::new(r as f64, g as f64, b as f64, 0.0),
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    frame.data_mut().copy_from_slice(mat.data_bytes()?);
    Ok(())
}

#[cfg(not(feature = "opencv"))]
fn draw_labels(_frame: &mut Frame, _labels: &[Label]) {}

pub fn registration_label(captured: usize, target: usize) -> String {
    format!("Capturing {captured}/{target}")
}

/// Plain detection boxes, used when no model is loaded.
pub fn draw_detections(frame: &mut Frame, faces: &[Region]) {
    with_canvas(frame, |canvas| {
        for face in faces {
            draw_box(canvas, face, DETECTION_COLOR);
        }
    });
}

/// Registration boxes plus a capture progress bar and counter over each face.
pub fn draw_registration(frame: &mut Frame, faces: &[Region], captured: usize, target: usize) {
    let fraction = if target == 0 {
        1.0
    } else {
        captured as f64 / target as f64
    };
    with_canvas(frame, |canvas| {
        for face in faces {
            draw_box(canvas, face, REGISTRATION_COLOR);
            draw_bar(canvas, face, fraction, REGISTRATION_COLOR);
        }
    });
    let labels: Vec<Label> = faces
        .iter()
        .map(|face| Label {
            text: registration_label(captured, target),
            region: *face,
            color: REGISTRATION_COLOR,
        })
        .collect();
    draw_labels(frame, &labels);
}

/// Green boxes with an accuracy bar for known faces, red for unknown, each
/// captioned with the identity (`name (93.4%)` or `Unknown`).
pub fn draw_recognitions(frame: &mut Frame, recognitions: &[Recognition]) {
    with_canvas(frame, |canvas| {
        for r in recognitions {
            match &r.identity {
                Identity::Known { accuracy, .. } => {
                    draw_box(canvas, &r.region, KNOWN_COLOR);
                    draw_bar(canvas, &r.region, accuracy / 100.0, KNOWN_COLOR);
                }
                Identity::Unknown => draw_box(canvas, &r.region, UNKNOWN_COLOR),
            }
        }
    });
    let labels: Vec<Label> = recognitions
        .iter()
        .map(|r| Label {
            text: r.identity.to_string(),
            region: r.region,
            color: match r.identity {
                Identity::Known { .. } => KNOWN_COLOR,
                Identity::Unknown => UNKNOWN_COLOR,
            },
        })
        .collect();
    draw_labels(frame, &labels);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::person_name::PersonName;

    fn black(width: u32, height: u32) -> Frame {
        Frame::new(vec![0; (width * height * 3) as usize], width, height, 3, 0)
    }

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * frame.width() + x) * 3) as usize;
        [frame.data()[i], frame.data()[i + 1], frame.data()[i + 2]]
    }

    #[test]
    fn test_detection_box_outline_only() {
        let mut frame = black(50, 50);
        draw_detections(&mut frame, &[Region::new(10, 10, 20, 20)]);
        assert_eq!(pixel(&frame, 10, 10), DETECTION_COLOR.0);
        assert_eq!(pixel(&frame, 11, 20), DETECTION_COLOR.0);
        assert_eq!(pixel(&frame, 20, 20), [0, 0, 0]);
    }

    #[test]
    fn test_recognition_colors() {
        let mut frame = black(100, 50);
        let known = Recognition {
            region: Region::new(5, 20, 20, 20),
            identity: Identity::Known {
                name: PersonName::parse("alice").unwrap(),
                accuracy: 100.0,
            },
            distance: 0.0,
        };
        let unknown = Recognition {
            region: Region::new(60, 20, 20, 20),
            identity: Identity::Unknown,
            distance: 80.0,
        };
        draw_recognitions(&mut frame, &[known, unknown]);
        assert_eq!(pixel(&frame, 5, 20), KNOWN_COLOR.0);
        assert_eq!(pixel(&frame, 60, 20), UNKNOWN_COLOR.0);
        // Full accuracy bar above the known face, none above the unknown.
        assert_eq!(pixel(&frame, 24, 12), KNOWN_COLOR.0);
        assert_eq!(pixel(&frame, 70, 12), [0, 0, 0]);
    }

    #[test]
    fn test_registration_bar_tracks_progress() {
        let mut frame = black(100, 60);
        let face = Region::new(0, 20, 40, 30);
        draw_registration(&mut frame, &[face], 1, 2);
        assert_eq!(pixel(&frame, 0, 12), REGISTRATION_COLOR.0);
        assert_eq!(pixel(&frame, 19, 12), REGISTRATION_COLOR.0);
        assert_eq!(pixel(&frame, 30, 12), [0, 0, 0]);
    }

    fn colored_in_rows(frame: &Frame, rows: std::ops::Range<u32>, color: Rgb<u8>) -> usize {
        rows.flat_map(|y| (0..frame.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| pixel(frame, x, y) == color.0)
            .count()
    }

    #[test]
    fn test_registration_label_text() {
        assert_eq!(registration_label(7, 50), "Capturing 7/50");
    }

    #[test]
    fn test_label_goes_below_box_near_top_edge() {
        assert_eq!(label_origin(&Region::new(10, 60, 40, 40)), (10, 49));
        assert_eq!(label_origin(&Region::new(-5, 5, 40, 40)), (0, 60));
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_recognition_captions_are_drawn() {
        let mut frame = black(240, 100);
        let known = Recognition {
            region: Region::new(10, 50, 40, 40),
            identity: Identity::Known {
                name: PersonName::parse("alice").unwrap(),
                accuracy: 90.0,
            },
            distance: 10.0,
        };
        let unknown = Recognition {
            region: Region::new(150, 50, 40, 40),
            identity: Identity::Unknown,
            distance: 80.0,
        };
        draw_recognitions(&mut frame, &[known, unknown]);
        // Caption band sits above the accuracy bar (rows 42..48).
        assert!(colored_in_rows(&frame, 25..40, KNOWN_COLOR) > 10);
        assert!(colored_in_rows(&frame, 25..40, UNKNOWN_COLOR) > 10);
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_registration_counter_is_drawn() {
        let mut frame = black(200, 100);
        let face = Region::new(20, 50, 40, 40);
        draw_registration(&mut frame, &[face], 3, 50);
        assert!(colored_in_rows(&frame, 25..40, REGISTRATION_COLOR) > 10);
    }

    #[test]
    fn test_boxes_partly_outside_are_clipped() {
        let mut frame = black(30, 30);
        draw_detections(&mut frame, &[Region::new(-10, -10, 100, 100)]);
        draw_registration(&mut frame, &[Region::new(25, 25, 20, 20)], 5, 5);
    }

    #[test]
    fn test_non_rgb_frame_untouched() {
        let mut frame = Frame::new(vec![0; 100], 10, 10, 1, 0);
        draw_detections(&mut frame, &[Region::new(0, 0, 5, 5)]);
        assert!(frame.data().iter().all(|&v| v == 0));
    }
}
