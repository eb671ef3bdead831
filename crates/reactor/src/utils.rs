//! Utility macros shared by the protocol parsers.

/// Returns early with an error if a condition is not met.
///
/// Like `assert!`, but returns `Err($error)` instead of panicking, which keeps
/// the validation steps of the request-line parser flat.
///
/// # Example
///
/// ```ignore
/// ensure!(version == "HTTP/1.1", ParseError::unsupported_version(version));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
