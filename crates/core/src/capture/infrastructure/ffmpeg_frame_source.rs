use std::path::PathBuf;

use crate::capture::domain::frame_source::{FrameSource, SourceInfo};
use crate::shared::frame::Frame;

#[derive(Clone, Debug, PartialEq, Eq)]
enum FfmpegInput {
    Camera { device: String, format: String },
    File(PathBuf),
}

struct DecodeState {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    video_stream_index: usize,
    frame_index: usize,
    flushing: bool,
    done: bool,
}

/// Decodes frames from a capture device or a video file via ffmpeg-next
/// and converts them to RGB24.
pub struct FfmpegFrameSource {
    input: FfmpegInput,
    video_size: Option<(u32, u32)>,
    state: Option<DecodeState>,
}

// Safety: FfmpegFrameSource is owned by a single capture thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    /// `device` is a camera index or a platform device name. `video_size`
    /// is requested from the driver; the device may pick another size.
    pub fn camera(device: &str, video_size: Option<(u32, u32)>) -> Self {
        Self {
            input: FfmpegInput::Camera {
                device: camera_device(device),
                format: default_camera_format().to_string(),
            },
            video_size,
            state: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            input: FfmpegInput::File(path.into()),
            video_size: None,
            state: None,
        }
    }

    fn open_input(
        &self,
    ) -> Result<(ffmpeg_next::format::context::Input, String), Box<dyn std::error::Error>> {
        match &self.input {
            FfmpegInput::File(path) => Ok((
                ffmpeg_next::format::input(path)?,
                path.display().to_string(),
            )),
            FfmpegInput::Camera { device, format } => {
                ffmpeg_next::device::register_all();
                let input_format = ffmpeg_next::device::input::video()
                    .find(|f| f.name() == format.as_str())
                    .ok_or_else(|| format!("capture backend {format} is not available"))?;
                let mut options = ffmpeg_next::Dictionary::new();
                if let Some((w, h)) = self.video_size {
                    options.set("video_size", &format!("{w}x{h}"));
                }
                let ictx = ffmpeg_next::format::open_with(device, &input_format, options)
                    .map_err(|e| format!("cannot open camera {device} ({format}): {e}"))?
                    .input();
                Ok((ictx, format!("{format}:{device}")))
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn open(&mut self) -> Result<SourceInfo, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        self.close();

        let (ictx, description) = self.open_input()?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        log::info!("Opened {description} ({width}x{height})");
        self.state = Some(DecodeState {
            ictx,
            decoder,
            scaler,
            width,
            height,
            video_stream_index,
            frame_index: 0,
            flushing: false,
            done: false,
        });
        Ok(SourceInfo {
            width,
            height,
            description,
        })
    }

    fn read_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let state = self.state.as_mut().ok_or("FfmpegFrameSource: not opened")?;
        state.next_frame()
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::debug!("Closed ffmpeg source");
        }
    }
}

impl DecodeState {
    fn next_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        if self.done {
            return Ok(None);
        }
        if let Some(frame) = self.try_receive()? {
            return Ok(Some(frame));
        }
        if self.flushing {
            self.done = true;
            return Ok(None);
        }

        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                if let Some(frame) = self.try_receive()? {
                    return Ok(Some(frame));
                }
                self.done = true;
                return Ok(None);
            };
            if stream.index() != self.video_stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                continue;
            }
            if let Some(frame) = self.try_receive()? {
                return Ok(Some(frame));
            }
        }
    }

    fn try_receive(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
        self.scaler.run(&decoded, &mut rgb)?;
        let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
        let frame = Frame::new(pixels, self.width, self.height, 3, self.frame_index);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}

fn default_camera_format() -> &'static str {
    if cfg!(target_os = "macos") {
        "avfoundation"
    } else if cfg!(target_os = "windows") {
        "dshow"
    } else {
        "v4l2"
    }
}

/// Maps a camera index to the device name the platform backend expects.
/// Non-numeric values are passed through as device names.
fn camera_device(device: &str) -> String {
    match device.parse::<u32>() {
        Ok(index) if cfg!(target_os = "linux") => format!("/dev/video{index}"),
        Ok(index) if cfg!(target_os = "macos") => index.to_string(),
        _ if cfg!(target_os = "windows") && !device.starts_with("video=") => {
            format!("video={device}")
        }
        _ => device.to_string(),
    }
}

/// Strips row padding (stride > width*3) into a tightly packed buffer.
fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
