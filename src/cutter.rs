use std::path::Path;
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CutError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),
}

/// Cut each closed time range out of the source with a lossless stream copy.
/// A failed range is logged and skipped; the remaining ranges still get
/// written. Returns the number of files produced.
pub fn cut_segments(
    input: &Path,
    out_dir: &Path,
    ranges: &[(f64, f64)],
) -> std::io::Result<usize> {
    std::fs::create_dir_all(out_dir)?;

    let mut written = 0;
    for (index, &(start, end)) in ranges.iter().enumerate() {
        let output = out_dir.join(format!("segment_{:03}.mp4", index + 1));
        match cut_segment(input, &output, start, end) {
            Ok(()) => {
                tracing::info!(
                    start_secs = format!("{:.2}", start),
                    end_secs = format!("{:.2}", end),
                    output = %output.display(),
                    "segment written"
                );
                written += 1;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    output = %output.display(),
                    "failed to cut segment"
                );
            }
        }
    }
    Ok(written)
}

fn cut_segment(input: &Path, output: &Path, start: f64, end: f64) -> Result<(), CutError> {
    let result = Command::new("ffmpeg")
        .arg("-hide_banner")
        .args(["-loglevel", "error"])
        .arg("-i")
        .arg(input)
        .args(["-ss", &format!("{start:.3}"), "-to", &format!("{end:.3}")])
        .args(["-c", "copy", "-movflags", "+faststart", "-y"])
        .arg(output)
        .output()?;

    if !result.status.success() {
        return Err(CutError::Ffmpeg(
            String::from_utf8_lossy(&result.stderr).trim().to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_writes_nothing_but_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("segments");

        let written = cut_segments(
            Path::new("does-not-exist.ts"),
            &out_dir,
            &[(0.0, 10.0), (10.5, 20.0)],
        )
        .unwrap();

        assert_eq!(written, 0);
        assert!(out_dir.is_dir());
    }

    #[test]
    fn empty_ranges_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let written = cut_segments(Path::new("in.ts"), dir.path(), &[]).unwrap();
        assert_eq!(written, 0);
    }
}
