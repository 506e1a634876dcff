use opencv::core::{self, Mat};
use opencv::imgproc;
use opencv::prelude::*;

use crate::media::VideoFrame;

/// Classify a frame as visually black: mean luminance below
/// `threshold` of full scale. Stateless.
///
/// A frame that cannot be converted is classified "not black" so one bad
/// decode cannot open or hold a dead-air candidate.
pub fn is_frame_black(frame: &VideoFrame, threshold: f64) -> bool {
    match luminance_mean(frame) {
        Ok(mean) => mean < threshold * 255.0,
        Err(e) => {
            tracing::debug!(
                error = %e,
                time_secs = format!("{:.2}", frame.time_secs),
                "frame classification failed, assuming not black"
            );
            false
        }
    }
}

fn luminance_mean(frame: &VideoFrame) -> opencv::Result<f64> {
    let mat = Mat::from_slice(&frame.data)?;
    let mat = mat.reshape(3, frame.height)?;
    let mut gray = Mat::default();
    imgproc::cvt_color_def(&mat, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    let mean = core::mean_def(&gray)?;
    Ok(mean[0])
}
