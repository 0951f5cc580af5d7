//! Global thresholding used as the optional contrast-enhancement step.

use crate::{GrayImage, GrayImageView};

/// Otsu threshold over all pixels of `img`.
pub fn otsu_threshold(img: &GrayImageView<'_>) -> u8 {
    if img.data.is_empty() {
        return 127;
    }

    let mut hist = [0u32; 256];
    for &v in img.data {
        hist[v as usize] += 1;
    }

    let occupied: Vec<usize> = (0..256).filter(|&i| hist[i] > 0).collect();
    let (min_v, max_v) = (occupied[0], occupied[occupied.len() - 1]);
    if min_v == max_v {
        return min_v as u8;
    }
    if occupied.len() <= 2 {
        return ((min_v + max_v) / 2) as u8;
    }

    let total = img.data.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }

    best_t
}

/// Binarize to `{0, 255}` around the Otsu threshold (pixels above it become white).
pub fn binarize_otsu(img: &GrayImageView<'_>) -> GrayImage {
    let t = otsu_threshold(img);
    GrayImage {
        width: img.width,
        height: img.height,
        data: img.data.iter().map(|&v| if v > t { 255 } else { 0 }).collect(),
    }
}
