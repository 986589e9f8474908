use std::path::PathBuf;

use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("cannot open frame source {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("cannot decode frame {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

/// One step of a decimated capture.
#[derive(Debug)]
pub enum Captured {
    /// Passed over by decimation and never decoded.
    Skipped,
    Frame(Result<Frame, SourceError>),
}

/// Produces frames in capture order, each stamped with its capture time.
///
/// Implementations handle device or file I/O; the pipeline only sees
/// `Frame`s.
pub trait FrameSource: Send {
    fn frames(&mut self) -> Box<dyn Iterator<Item = Result<Frame, SourceError>> + '_>;

    /// Every frame position in order, with only every `every`th frame
    /// materialised. Sources that can seek past a frame cheaply should
    /// override this so skipped frames are never decoded.
    fn capture(&mut self, every: usize) -> Box<dyn Iterator<Item = Captured> + '_> {
        let every = every.max(1);
        Box::new(self.frames().enumerate().map(move |(position, frame)| {
            if position % every == 0 {
                Captured::Frame(frame)
            } else {
                Captured::Skipped
            }
        }))
    }

    /// Total frame count when known up front.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}
