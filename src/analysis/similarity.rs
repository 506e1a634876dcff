use opencv::core::{self, Mat, Size, Vector};
use opencv::imgproc;
use opencv::prelude::*;

use crate::media::VideoFrame;

const GRAY_HIST_BINS: i32 = 64;
const COLOR_HIST_BINS: i32 = 8;

/// Pixel difference above this counts as changed in the identical-region mask.
const IDENTICAL_DIFF_THRESHOLD: f64 = 1.0;
/// Connected components smaller than this are speckle, not logos/letterboxing.
const MIN_IDENTICAL_AREA_PX: i32 = 100;

const MOTION_CORRECTION_RATIO: f64 = 0.2;

/// Relative weight of each similarity signal. The defaults sum to 1.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub gray_correlation: f64,
    pub color_correlation: f64,
    pub pixel_difference: f64,
    pub intersection: f64,
    pub identical_regions: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            gray_correlation: 0.2,
            color_correlation: 0.2,
            pixel_difference: 0.2,
            intersection: 0.2,
            identical_regions: 0.2,
        }
    }
}

/// Combined similarity of two frames, roughly in [0, 1.2]; lower means a
/// scene change is more likely. With no previous frame the pair is identical
/// by convention, so the very first frame can never trigger a cut.
///
/// A conversion failure also reports identical: a frame we could not read is
/// no evidence of a cut.
pub fn frame_similarity(
    current: &VideoFrame,
    previous: Option<&VideoFrame>,
    weights: &SimilarityWeights,
) -> f64 {
    let Some(previous) = previous else {
        return 1.0;
    };
    match compute(current, previous, weights) {
        Ok(similarity) => similarity,
        Err(e) => {
            tracing::warn!(
                error = %e,
                time_secs = format!("{:.2}", current.time_secs),
                "frame similarity failed, treating frames as identical"
            );
            1.0
        }
    }
}

fn compute(
    current: &VideoFrame,
    previous: &VideoFrame,
    weights: &SimilarityWeights,
) -> opencv::Result<f64> {
    let cur = bgr_mat(current)?;
    let prev = bgr_mat(previous)?;
    let cur_gray = to_gray(&cur)?;
    let prev_gray = to_gray(&prev)?;

    let cur_hist_gray = gray_histogram(&cur_gray)?;
    let prev_hist_gray = gray_histogram(&prev_gray)?;
    let cur_hist_color = color_histogram(&cur)?;
    let prev_hist_color = color_histogram(&prev)?;

    let correl_gray =
        imgproc::compare_hist(&cur_hist_gray, &prev_hist_gray, imgproc::HISTCMP_CORREL)?;
    let correl_color =
        imgproc::compare_hist(&cur_hist_color, &prev_hist_color, imgproc::HISTCMP_CORREL)?;

    let mad_normalized = mean_absolute_difference(&cur_gray, &prev_gray)? / 255.0;

    let intersection =
        imgproc::compare_hist(&cur_hist_gray, &prev_hist_gray, imgproc::HISTCMP_INTERSECT)?;
    let hist_mass = core::sum_elems(&cur_hist_gray)?[0];
    let intersection_normalized = if hist_mass > 0.0 {
        intersection / hist_mass
    } else {
        0.0
    };

    let identical_regions = identical_region_ratio(&cur, &prev)?;

    let combined = weights.gray_correlation * correl_gray
        + weights.color_correlation * correl_color
        + weights.pixel_difference * (1.0 - mad_normalized)
        + weights.intersection * intersection_normalized
        + weights.identical_regions * identical_regions;

    // High-motion pairs are judged slightly more similar than the raw
    // metrics suggest, damping false cuts on fast pans
    Ok(combined * (1.0 + mad_normalized * MOTION_CORRECTION_RATIO))
}

fn bgr_mat(frame: &VideoFrame) -> opencv::Result<Mat> {
    let mat = Mat::from_slice(&frame.data)?;
    mat.reshape(3, frame.height)?.try_clone()
}

fn to_gray(bgr: &Mat) -> opencv::Result<Mat> {
    let mut gray = Mat::default();
    imgproc::cvt_color_def(bgr, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

fn gray_histogram(gray: &Mat) -> opencv::Result<Mat> {
    let images = Vector::<Mat>::from_iter([gray.try_clone()?]);
    let channels = Vector::from_slice(&[0]);
    let hist_size = Vector::from_slice(&[GRAY_HIST_BINS]);
    let ranges = Vector::from_slice(&[0f32, 256f32]);
    let mut hist = Mat::default();
    imgproc::calc_hist_def(
        &images,
        &channels,
        &core::no_array(),
        &mut hist,
        &hist_size,
        &ranges,
    )?;
    let mut normalized = Mat::default();
    core::normalize_def(&hist, &mut normalized)?;
    Ok(normalized)
}

fn color_histogram(bgr: &Mat) -> opencv::Result<Mat> {
    let images = Vector::<Mat>::from_iter([bgr.try_clone()?]);
    let channels = Vector::from_slice(&[0, 1, 2]);
    let hist_size = Vector::from_slice(&[COLOR_HIST_BINS; 3]);
    let ranges = Vector::from_slice(&[0f32, 256f32, 0f32, 256f32, 0f32, 256f32]);
    let mut hist = Mat::default();
    imgproc::calc_hist_def(
        &images,
        &channels,
        &core::no_array(),
        &mut hist,
        &hist_size,
        &ranges,
    )?;
    let mut normalized = Mat::default();
    core::normalize_def(&hist, &mut normalized)?;
    Ok(normalized)
}

fn mean_absolute_difference(a: &Mat, b: &Mat) -> opencv::Result<f64> {
    let mut diff = Mat::default();
    core::absdiff(a, b, &mut diff)?;
    Ok(core::mean_def(&diff)?[0])
}

/// Share of the frame covered by regions that did not change between the two
/// frames: static logos and letterboxing that should not read as "different".
fn identical_region_ratio(cur: &Mat, prev: &Mat) -> opencv::Result<f64> {
    let mut diff = Mat::default();
    core::absdiff(cur, prev, &mut diff)?;
    let mut diff_gray = Mat::default();
    imgproc::cvt_color_def(&diff, &mut diff_gray, imgproc::COLOR_BGR2GRAY)?;

    let mut identical = Mat::default();
    imgproc::threshold(
        &diff_gray,
        &mut identical,
        IDENTICAL_DIFF_THRESHOLD,
        255.0,
        imgproc::THRESH_BINARY_INV,
    )?;

    // Close small holes so speckle noise does not fragment the regions
    let kernel = imgproc::get_structuring_element_def(imgproc::MORPH_RECT, Size::new(3, 3))?;
    let mut closed = Mat::default();
    imgproc::morphology_ex_def(&identical, &mut closed, imgproc::MORPH_CLOSE, &kernel)?;

    let mut labels = Mat::default();
    let mut stats = Mat::default();
    let mut centroids = Mat::default();
    let num_labels = imgproc::connected_components_with_stats(
        &closed,
        &mut labels,
        &mut stats,
        &mut centroids,
        8,
        core::CV_32S,
    )?;

    let mut total_area = 0i64;
    for label in 1..num_labels {
        let area = *stats.at_2d::<i32>(label, imgproc::CC_STAT_AREA)?;
        if area >= MIN_IDENTICAL_AREA_PX {
            total_area += area as i64;
        }
    }

    let frame_area = (cur.rows() * cur.cols()) as f64;
    Ok(total_area as f64 / frame_area)
}
