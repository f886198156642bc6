//! Slice-to-index expansion.
//!
//! Resolves a `(start, stop, step)` slice against a collection of known
//! size into the ordered list of selected indices. The resolver never
//! touches collection storage; callers gather the elements themselves.

use super::{VmErrorKind, VmResult, err};

/// Expands a slice against a collection of `size` elements.
///
/// Semantics follow the runtime's indexing rules:
/// - missing `step` defaults to 1; `step == 0` is unsatisfiable
/// - for a positive step, missing `start` defaults to 0 and missing `stop`
///   to `size`; for a negative step, missing `start` defaults to `size - 1`
///   and missing `stop` means "walk down to index 0 inclusive"
/// - explicit bounds wrap modulo `size + 1` (the one-past-end allowance for
///   `stop`); `stop` above `size` is clamped to `size`
/// - an explicit bound below `-size` is rejected, not clamped
pub fn expand_slice(
    size: i64,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> VmResult<Vec<i64>> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(err(
            VmErrorKind::UnsatisfiableSlice,
            "slice step cannot be zero".into(),
        ));
    }
    let mut stop = stop;
    if let Some(e) = stop {
        if e > size {
            stop = Some(size);
        }
        if e < -size {
            return Err(err(
                VmErrorKind::UnsatisfiableSlice,
                format!("slice stop {} out of range for size {}", e, size),
            ));
        }
    }
    if let Some(b) = start
        && b < -size
    {
        return Err(err(
            VmErrorKind::UnsatisfiableSlice,
            format!("slice start {} out of range for size {}", b, size),
        ));
    }
    if size == 0 {
        return Ok(Vec::new());
    }

    // wrap-around modulus: one past the end, so stop may normalize to size
    let m = size + 1;
    let mut out = Vec::new();
    if step < 0 {
        // a start normalizing to size (one past the end) begins at the
        // last element
        let mut i = start.map_or(size - 1, |b| (b + m).rem_euclid(m).min(size - 1));
        let floor = stop.map_or(-1, |e| (e + m).rem_euclid(m));
        while i > floor {
            debug_assert!(i >= 0);
            out.push(i);
            i += step;
        }
    } else {
        let mut i = start.map_or(0, |b| (b + m).rem_euclid(m));
        let ceil = stop.map_or(size, |e| (e + m).rem_euclid(m));
        while i < ceil {
            debug_assert!(i >= 0);
            out.push(i);
            i += step;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_forward_slice() {
        assert_eq!(
            expand_slice(5, Some(1), Some(4), Some(1)).unwrap(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_full_forward_defaults() {
        assert_eq!(
            expand_slice(5, None, None, None).unwrap(),
            vec![0, 1, 2, 3, 4]
        );
    }

    #[test]
    fn test_full_reverse() {
        assert_eq!(
            expand_slice(5, None, None, Some(-1)).unwrap(),
            vec![4, 3, 2, 1, 0]
        );
    }

    #[test]
    fn test_reverse_with_explicit_stop() {
        // walk down while strictly above the normalized stop
        assert_eq!(
            expand_slice(5, None, Some(1), Some(-1)).unwrap(),
            vec![4, 3, 2]
        );
    }

    #[test]
    fn test_step_two() {
        assert_eq!(
            expand_slice(6, Some(0), Some(6), Some(2)).unwrap(),
            vec![0, 2, 4]
        );
    }

    #[test]
    fn test_zero_step_fails() {
        for size in [0, 1, 5] {
            let e = expand_slice(size, None, None, Some(0)).unwrap_err();
            assert!(matches!(e.kind, VmErrorKind::UnsatisfiableSlice));
        }
    }

    #[test]
    fn test_negative_wrap() {
        // -2 normalizes modulo size + 1
        assert_eq!(
            expand_slice(5, Some(-2), Some(5), Some(1)).unwrap(),
            vec![4]
        );
    }

    #[test]
    fn test_stop_clamped_to_size() {
        assert_eq!(
            expand_slice(3, Some(0), Some(100), Some(1)).unwrap(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_out_of_range_negative_bounds_rejected() {
        let e = expand_slice(5, Some(-6), None, None).unwrap_err();
        assert!(matches!(e.kind, VmErrorKind::UnsatisfiableSlice));
        let e = expand_slice(5, None, Some(-6), None).unwrap_err();
        assert!(matches!(e.kind, VmErrorKind::UnsatisfiableSlice));
    }

    #[test]
    fn test_empty_collection() {
        assert_eq!(
            expand_slice(0, None, None, None).unwrap(),
            Vec::<i64>::new()
        );
        assert_eq!(
            expand_slice(0, None, None, Some(-1)).unwrap(),
            Vec::<i64>::new()
        );
    }

    #[test]
    fn test_empty_when_start_meets_stop() {
        assert_eq!(
            expand_slice(5, Some(3), Some(3), Some(1)).unwrap(),
            Vec::<i64>::new()
        );
    }

    #[test]
    fn test_reverse_start_past_end_begins_at_last() {
        // -1 normalizes to size under the wrap modulus; reading still
        // begins at the last element
        assert_eq!(
            expand_slice(5, Some(-1), None, Some(-1)).unwrap(),
            vec![4, 3, 2, 1, 0]
        );
        assert_eq!(
            expand_slice(5, Some(5), Some(2), Some(-1)).unwrap(),
            vec![4, 3]
        );
    }

    #[test]
    fn test_indices_stay_in_range() {
        for step in [-3i64, -2, -1, 1, 2, 3] {
            for start in [-5i64, -3, -1, 0, 2, 4, 5] {
                for stop in [-5i64, -1, 0, 3, 5] {
                    if let Ok(ix) = expand_slice(5, Some(start), Some(stop), Some(step)) {
                        assert!(
                            ix.iter().all(|&i| (0..5).contains(&i)),
                            "index out of range for {:?}",
                            (start, stop, step)
                        );
                    }
                }
            }
        }
    }

}
