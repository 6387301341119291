//! Plot data for a captured buffer

/// Default number of min/max buckets drawn for one capture
pub const DEFAULT_PLOT_BUCKETS: usize = 4096;

/// Time/amplitude points for plotting `samples` captured at `sample_rate` Hz.
///
/// Time is in seconds (`i / sample_rate`). Buffers longer than `2 * buckets`
/// samples are reduced to the minimum and maximum of each bucket, in the
/// order they occur, so peaks stay visible.
pub fn plot_points(samples: &[i16], sample_rate: u32, buckets: usize) -> Vec<[f64; 2]> {
    if sample_rate == 0 {
        return Vec::new();
    }
    let rate = sample_rate as f64;
    let point = |i: usize| [i as f64 / rate, samples[i] as f64];

    if buckets == 0 || samples.len() <= buckets * 2 {
        return (0..samples.len()).map(point).collect();
    }

    let bucket_len = samples.len().div_ceil(buckets);
    let mut points = Vec::with_capacity(buckets * 2);
    for start in (0..samples.len()).step_by(bucket_len) {
        let end = (start + bucket_len).min(samples.len());
        let (mut min_idx, mut max_idx) = (start, start);
        for i in start..end {
            if samples[i] < samples[min_idx] {
                min_idx = i;
            }
            if samples[i] > samples[max_idx] {
                max_idx = i;
            }
        }
        let (first, second) = if min_idx <= max_idx {
            (min_idx, max_idx)
        } else {
            (max_idx, min_idx)
        };
        points.push(point(first));
        if second != first {
            points.push(point(second));
        }
    }
    points
}

/// Largest absolute sample value
pub fn peak_amplitude(samples: &[i16]) -> u16 {
    samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_buffers_are_plotted_as_is() {
        let points = plot_points(&[1, -2, 3, -4], 4, DEFAULT_PLOT_BUCKETS);
        assert_eq!(
            points,
            vec![[0.0, 1.0], [0.25, -2.0], [0.5, 3.0], [0.75, -4.0]]
        );
    }

    #[test]
    fn long_buffers_keep_bucket_extremes() {
        let mut samples = vec![0i16; 1000];
        samples[10] = 900;
        samples[11] = -900;
        samples[500] = i16::MIN;

        let points = plot_points(&samples, 1000, 10);

        assert!(points.len() <= 20);
        assert!(points.contains(&[0.010, 900.0]));
        assert!(points.contains(&[0.011, -900.0]));
        assert!(points.contains(&[0.5, i16::MIN as f64]));
        assert!(points.windows(2).all(|w| w[0][0] <= w[1][0]));
    }

    #[test]
    fn zero_rate_yields_nothing() {
        assert!(plot_points(&[1, 2, 3], 0, 16).is_empty());
    }

    #[test]
    fn peak_handles_min_value() {
        assert_eq!(peak_amplitude(&[]), 0);
        assert_eq!(peak_amplitude(&[3, -7, 5]), 7);
        assert_eq!(peak_amplitude(&[i16::MIN]), 32768);
    }
}
