use thiserror::Error;

/// Failures shared by crates that persist state to disk.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can carry a plain context message.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Define a crate-local `Context` trait that prefixes failures with a message
/// and converts them into the given error type.
///
/// ```ignore
/// // crates/foo/src/error.rs
/// pub use modelswitch_common::{Error, Result};
/// modelswitch_common::impl_context!(Error);
/// ```
#[macro_export]
macro_rules! impl_context {
    ($err:ty) => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $err>;
            fn with_context<C, F>(self, f: F) -> std::result::Result<T, $err>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $err> {
                self.with_context(|| context)
            }

            fn with_context<C, F>(self, f: F) -> std::result::Result<T, $err>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    <$err as $crate::FromMessage>::from_message(format!("{}: {source}", f().into()))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> std::result::Result<T, $err> {
                self.with_context(|| context)
            }

            fn with_context<C, F>(self, f: F) -> std::result::Result<T, $err>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <$err as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    mod local {
        crate::impl_context!(super::Error);
    }

    use local::Context;

    #[test]
    fn context_prefixes_result_error() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk full"));
        let err = res.context("write selection.json").unwrap_err();
        assert_eq!(err.to_string(), "write selection.json: disk full");
        assert!(matches!(err, Error::Message(_)));
    }

    #[test]
    fn context_turns_none_into_message() {
        let missing: Option<u8> = None;
        let err = missing.with_context(|| "no value").unwrap_err();
        assert!(matches!(err, Error::Message(ref m) if m == "no value"));
        assert_eq!(Some(3).context("unused").unwrap(), 3);
    }

    #[test]
    fn io_and_json_convert_with_question_mark() {
        fn parse(raw: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(raw)?)
        }
        assert!(matches!(parse("{"), Err(Error::Json(_))));

        fn read() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/modelswitch/selection.json")?)
        }
        assert!(matches!(read(), Err(Error::Io(_))));
    }
}
