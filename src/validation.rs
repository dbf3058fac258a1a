//! Parameter range checks run before a command is put on the wire.
use crate::error::{AppResult, DaqError};
use std::fmt::Debug;

/// Validates that every value lies within the inclusive range `[min, max]`.
///
/// The first value outside the range produces [`DaqError::ParameterOutOfRange`], which names
/// that value and the full input list. A single value is validated by passing a one-element
/// slice.
///
/// # Returns
///
/// * `Ok(values)` unchanged if every value is within the range.
pub fn validate_range<T>(values: &[T], min: T, max: T) -> AppResult<&[T]>
where
    T: PartialOrd + Copy + Debug,
{
    match values.iter().find(|v| !(min <= **v && **v <= max)) {
        Some(bad) => Err(DaqError::ParameterOutOfRange {
            value: format!("{bad:?}"),
            min: format!("{min:?}"),
            max: format!("{max:?}"),
            values: format!("{values:?}"),
        }),
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_values_unchanged_when_in_range() {
        let values = [1, 2, 3];
        let checked = validate_range(&values, -5, 5).unwrap();
        assert_eq!(checked, &[1, 2, 3]);
    }

    #[test]
    fn reports_first_offending_value_and_full_list() {
        let err = validate_range(&[1, 2, 30], -5, 5).unwrap_err();
        match err {
            DaqError::ParameterOutOfRange { value, values, .. } => {
                assert_eq!(value, "30");
                assert_eq!(values, "[1, 2, 30]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(validate_range(&[-5, 5], -5, 5).is_ok());
        assert!(validate_range(&[-6], -5, 5).is_err());
        assert!(validate_range(&[0.0, 25e3], -25e3, 25e3).is_ok());
    }

    #[test]
    fn stops_at_first_out_of_range_value() {
        let err = validate_range(&[9, -9], -5, 5).unwrap_err();
        assert!(err.to_string().starts_with("Parameter 9 is outside"));
    }

    #[test]
    fn nan_is_rejected() {
        assert!(validate_range(&[f64::NAN], -1.0, 1.0).is_err());
    }

    #[test]
    fn empty_list_is_valid() {
        let empty: [i64; 0] = [];
        assert!(validate_range(&empty, 0, 999).is_ok());
    }
}
