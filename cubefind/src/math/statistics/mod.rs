//! Statistical functions: median, MAD and standard deviation.
//!
//! Inputs are expected to be NaN-free; callers filter flagged voxels first.


/// Scale from median absolute deviation to Gaussian sigma, `1 / 0.6745`.
pub const MAD_TO_SIGMA: f64 = 1.0 / 0.6745;

/// Convert MAD to standard deviation (assuming normal distribution).
#[inline]
pub fn mad_to_sigma(mad: f64) -> f64 {
    mad * MAD_TO_SIGMA
}

/// Median of `data`, reordering it in place.
///
/// Even-length inputs average the two middle values.
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;
    let (left_part, median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *median;

    if len & 1 == 1 {
        upper
    } else {
        let lower = left_part.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        (lower + upper) * 0.5
    }
}

/// Median and MAD together. Mutates the input buffer.
pub fn median_and_mad_f32_mut(data: &mut [f32]) -> (f32, f32) {
    debug_assert!(!data.is_empty());

    let median = median_f32_mut(data);
    for v in data.iter_mut() {
        *v = (*v - median).abs();
    }
    let mad = median_f32_mut(data);

    (median, mad)
}

/// Robust sigma from the MAD, or `None` for an empty input.
pub fn mad_sigma_f32_mut(data: &mut [f32]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let (_, mad) = median_and_mad_f32_mut(data);
    Some(mad_to_sigma(mad as f64))
}

/// Mean and sample standard deviation (`n - 1` denominator), accumulated in
/// f64. A single value has zero spread.
///
/// Returns `None` for an empty input.
pub fn mean_and_std<I>(values: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = f32>,
{
    // Welford's running update
    let mut count = 0usize;
    let mut mean = 0.0f64;
    let mut m2 = 0.0f64;

    for v in values {
        count += 1;
        let v = v as f64;
        let delta = v - mean;
        mean += delta / count as f64;
        m2 += delta * (v - mean);
    }

    if count == 0 {
        return None;
    }
    let dof = count.saturating_sub(1).max(1);
    Some((mean, (m2 / dof as f64).sqrt()))
}

/// Median of an f64 slice, returned as NaN when empty.
pub fn median_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    }
}
