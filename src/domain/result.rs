//! Result type alias for slidescrub
//!
//! This module provides a convenient Result type alias that uses ScrubError
//! as the error type.

use super::errors::ScrubError;

/// Result type alias for slidescrub operations
///
/// # Examples
///
/// ```
/// use slidescrub::domain::result::Result;
/// use slidescrub::domain::errors::ScrubError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ScrubError::UnsupportedFormat("notes.txt".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ScrubError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ParseError;

    #[test]
    fn test_result_ok() {
        let result: Result<i32> = Ok(42);
        assert!(result.is_ok());
    }

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> std::result::Result<u64, ParseError> {
            Ok(8)
        }

        let value = inner()?;
        assert_eq!(value, 8);
        Ok(())
    }
}
