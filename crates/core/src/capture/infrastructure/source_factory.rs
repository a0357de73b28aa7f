use crate::capture::domain::frame_source::FrameSource;
use crate::capture::domain::source_spec::SourceSpec;
use crate::shared::config::CaptureConfig;

use super::ffmpeg_frame_source::FfmpegFrameSource;
use super::image_sequence_source::ImageSequenceSource;

/// Builds the frame source for `spec`. The source is not opened yet.
pub fn create_source(spec: &SourceSpec, capture: &CaptureConfig) -> Box<dyn FrameSource> {
    match spec {
        SourceSpec::Camera(device) => {
            let size = (capture.width > 0 && capture.height > 0)
                .then_some((capture.width, capture.height));
            log::debug!("Using camera {device} ({size:?})");
            Box::new(FfmpegFrameSource::camera(device, size))
        }
        SourceSpec::ImageDirectory(dir) => {
            Box::new(ImageSequenceSource::new(dir).looping(capture.loop_images))
        }
        SourceSpec::VideoFile(path) => Box::new(FfmpegFrameSource::file(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_directory_source_opens() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::new(8, 6).save(dir.path().join("a.png")).unwrap();
        let spec = SourceSpec::ImageDirectory(dir.path().to_path_buf());
        let mut source = create_source(&spec, &CaptureConfig::default());
        let info = source.open().unwrap();
        assert_eq!((info.width, info.height), (8, 6));
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_looping_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::new(8, 6).save(dir.path().join("a.png")).unwrap();
        let spec = SourceSpec::ImageDirectory(dir.path().to_path_buf());
        let config = CaptureConfig {
            loop_images: true,
            ..CaptureConfig::default()
        };
        let mut source = create_source(&spec, &config);
        source.open().unwrap();
        for _ in 0..3 {
            assert!(source.read_frame().unwrap().is_some());
        }
    }
}
