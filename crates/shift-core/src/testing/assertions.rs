//! Assertion macros for migration tests.

/// Assert that a result is an error matching the given pattern.
///
/// # Example
///
/// ```ignore
/// let result = driver.migrate(&step).await;
/// assert_err_variant!(result, ShiftError::AlreadyApplied(_));
/// ```
#[macro_export]
macro_rules! assert_err_variant {
    ($expr:expr, $variant:pat $(if $guard:expr)?) => {
        match &$expr {
            Err($variant) $(if $guard)? => (),
            Err(e) => panic!(
                "assertion failed: expected {}, got {:?}",
                stringify!($variant),
                e
            ),
            Ok(v) => panic!(
                "assertion failed: expected Err({}), got Ok({:?})",
                stringify!($variant),
                v
            ),
        }
    };
}

/// Assert the ledger lists exactly these IDs, in this order.
///
/// # Example
///
/// ```ignore
/// assert_versions!(driver.versions().await?, ["201610041422_init"]);
/// ```
#[macro_export]
macro_rules! assert_versions {
    ($versions:expr, [$($id:expr),* $(,)?]) => {{
        let actual: Vec<String> = $versions;
        let expected: Vec<&str> = vec![$($id),*];
        assert_eq!(
            actual, expected,
            "ledger mismatch: expected {:?}, got {:?}",
            expected, actual
        );
    }};
}

#[cfg(test)]
mod tests {
    use crate::error::ShiftError;

    #[test]
    fn test_assert_err_variant() {
        let result: Result<(), ShiftError> = Err(ShiftError::NotApplied("m1".into()));
        assert_err_variant!(result, ShiftError::NotApplied(_));
    }

    #[test]
    #[should_panic(expected = "expected Err")]
    fn test_assert_err_variant_on_ok() {
        let result: Result<(), ShiftError> = Ok(());
        assert_err_variant!(result, ShiftError::NotApplied(_));
    }

    #[test]
    fn test_assert_versions() {
        assert_versions!(vec!["a".to_string(), "b".to_string()], ["a", "b"]);
        assert_versions!(Vec::new(), []);
    }
}
