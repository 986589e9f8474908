use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::video::domain::frame_source::{Captured, FrameSource, SourceError};

/// Replays a directory of still images as a camera feed.
///
/// Files are taken in file-name order and decoded lazily to RGB. Frame `i`
/// is stamped `start + i / fps`.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    start: NaiveDateTime,
    fps: f64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, start: NaiveDateTime, fps: f64) -> Result<Self, SourceError> {
        let open_error = |reason: String| SourceError::Open {
            path: dir.to_path_buf(),
            reason,
        };
        let entries = fs::read_dir(dir).map_err(|e| open_error(e.to_string()))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image(p))
            .collect();
        if paths.is_empty() {
            return Err(open_error("no images found".to_string()));
        }
        paths.sort();
        log::info!("Found {} frames in {}", paths.len(), dir.display());
        Ok(Self { paths, start, fps })
    }

    fn timestamp(&self, index: usize) -> NaiveDateTime {
        let micros = (index as f64 / self.fps * 1_000_000.0).round() as i64;
        self.start + Duration::microseconds(micros)
    }
}

impl FrameSource for ImageSequenceSource {
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, SourceError>> + '_> {
        Box::new(
            self.paths
                .iter()
                .enumerate()
                .map(|(i, path)| load_frame(path, i, self.timestamp(i))),
        )
    }

    fn capture(&mut self, every: usize) -> Box<dyn Iterator<Item = Captured> + '_> {
        let every = every.max(1);
        let this = &*self;
        Box::new(this.paths.iter().enumerate().map(move |(i, path)| {
            if i % every == 0 {
                Captured::Frame(load_frame(path, i, this.timestamp(i)))
            } else {
                Captured::Skipped
            }
        }))
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.paths.len())
    }
}

/// Decodes one image file into an RGB frame.
pub fn load_frame(path: &Path, index: usize, timestamp: NaiveDateTime) -> Result<Frame, SourceError> {
    let img = image::open(path)
        .map_err(|e| SourceError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .to_rgb8();
    let (width, height) = img.dimensions();
    Ok(Frame::new(img.into_raw(), width, height, 3, index, timestamp))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::test_support::at;

    fn write_image(dir: &Path, name: &str, color: [u8; 3]) {
        let mut img = image::RgbImage::new(4, 3);
        for pixel in img.pixels_mut() {
            *pixel = image::Rgb(color);
        }
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_frames_in_name_order_with_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", [0, 255, 0]);
        write_image(dir.path(), "a.png", [255, 0, 0]);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), at(9, 0, 0), 2.0).unwrap();
        assert_eq!(source.len_hint(), Some(2));
        let frames: Vec<Frame> = source.frames().collect::<Result<_, _>>().unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].data()[..3], &[255, 0, 0]);
        assert_eq!(frames[0].index(), 0);
        assert_eq!(frames[0].timestamp(), at(9, 0, 0));
        assert_eq!(frames[1].timestamp(), at(9, 0, 0) + Duration::milliseconds(500));
        assert_eq!((frames[1].width(), frames[1].height()), (4, 3));
    }

    #[test]
    fn test_directory_without_images_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), at(9, 0, 0), 30.0),
            Err(SourceError::Open { .. })
        ));
    }

    #[test]
    fn test_corrupt_image_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let mut source = ImageSequenceSource::open(dir.path(), at(9, 0, 0), 30.0).unwrap();
        let first = source.frames().next().unwrap();
        assert!(matches!(first, Err(SourceError::Decode { .. })));
    }

    #[test]
    fn test_capture_never_decodes_skipped_frames() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "0.png", [10, 10, 10]);
        fs::write(dir.path().join("1.png"), b"not a png").unwrap();
        write_image(dir.path(), "2.png", [20, 20, 20]);

        let mut source = ImageSequenceSource::open(dir.path(), at(9, 0, 0), 1.0).unwrap();
        let captured: Vec<Captured> = source.capture(2).collect();

        assert_eq!(captured.len(), 3);
        assert!(matches!(&captured[0], Captured::Frame(Ok(f)) if f.index() == 0));
        assert!(matches!(captured[1], Captured::Skipped));
        assert!(matches!(
            &captured[2],
            Captured::Frame(Ok(f)) if f.index() == 2 && f.timestamp() == at(9, 0, 2)
        ));
    }
}
