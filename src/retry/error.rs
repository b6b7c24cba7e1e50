use std::borrow::Cow;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that know whether another attempt could succeed
pub trait Retryable: std::error::Error {
    /// Whether the executor may try the operation again after this error
    fn is_retryable(&self) -> bool;

    /// Short label used to group failures when summarizing them
    fn kind(&self) -> Cow<'static, str> {
        Cow::Owned(self.to_string())
    }
}

/// Terminal outcome of a retried operation
///
/// Both variants keep every error seen, oldest first.
#[derive(Debug, Error)]
pub enum RetryError<E: Retryable + 'static> {
    #[error("Non-retryable failure after {} earlier attempt(s): {error}", .previous.len())]
    NonRetryable {
        #[source]
        error: E,
        previous: Vec<E>,
    },

    #[error(
        "Maximum retries exceeded after {} attempts: {}",
        .errors.len(),
        distinct_kinds(.errors)
    )]
    ExhaustedRetries { errors: Vec<E> },
}

/// Comma-separated, de-duplicated list of the kinds in `errors`
pub(crate) fn distinct_kinds<E: Retryable>(errors: &[E]) -> String {
    let kinds: BTreeSet<Cow<'static, str>> = errors.iter().map(Retryable::kind).collect();
    kinds.into_iter().collect::<Vec<_>>().join(", ")
}

impl<E: Retryable + 'static> RetryError<E> {
    pub fn is_max_retries(&self) -> bool {
        matches!(self, RetryError::ExhaustedRetries { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// Number of attempts made, including the last one
    pub fn attempts(&self) -> usize {
        match self {
            RetryError::NonRetryable { previous, .. } => previous.len() + 1,
            RetryError::ExhaustedRetries { errors } => errors.len(),
        }
    }

    /// The error that ended the retry loop
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::NonRetryable { error, .. } => Some(error),
            RetryError::ExhaustedRetries { errors } => errors.last(),
        }
    }

    /// Every attempt's error in the order they occurred
    pub fn into_errors(self) -> Vec<E> {
        match self {
            RetryError::NonRetryable {
                error,
                mut previous,
            } => {
                previous.push(error);
                previous
            }
            RetryError::ExhaustedRetries { errors } => errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, Clone, PartialEq)]
    enum TestError {
        #[error("flaky: {0}")]
        Flaky(u32),
        #[error("broken")]
        Broken,
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Flaky(_))
        }

        fn kind(&self) -> Cow<'static, str> {
            match self {
                TestError::Flaky(_) => "Flaky".into(),
                TestError::Broken => "Broken".into(),
            }
        }
    }

    #[test]
    fn test_exhausted_message_lists_distinct_kinds() {
        let err = RetryError::ExhaustedRetries {
            errors: vec![TestError::Flaky(1), TestError::Flaky(2), TestError::Flaky(3)],
        };
        let message = err.to_string();
        assert!(message.contains("3 attempts"));
        assert_eq!(message.matches("Flaky").count(), 1);
    }

    #[test]
    fn test_non_retryable_keeps_causal_chain() {
        let err = RetryError::NonRetryable {
            error: TestError::Broken,
            previous: vec![TestError::Flaky(1)],
        };
        assert!(err.is_non_retryable());
        assert_eq!(err.attempts(), 2);
        assert_eq!(err.last_error(), Some(&TestError::Broken));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(
            err.into_errors(),
            vec![TestError::Flaky(1), TestError::Broken]
        );
    }
}
