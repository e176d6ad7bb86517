use crate::http::types::StatusCode;
use std::{error, fmt, io};

#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    // Head-phase failures close the connection without a response.
    TooLargeHead,
    MalformedHead,
    InvalidContentLength,
    EmptyBody,

    InvalidJson,
    PathNotFound,
    InvalidConfig,
    MethodNotAllowed,
    ResourceExhausted,
    ApplyRejected,

    Io(IoError),
}

macro_rules! control_errors {
    ($($name:ident: $status:ident => $json:literal; )*) => {
        /// Status line and canned JSON body, or `None` for kinds that
        /// close the connection silently.
        pub(crate) const fn response_parts(&self) -> Option<(StatusCode, &'static str)> {
            match self { $(
                Self::$name { .. } => Some((StatusCode::$status, $json)),
            )*
                _ => None,
            }
        }
    };
}

impl ErrorKind {
    control_errors! {
        InvalidJson: BadRequest
            => r#"{ "error": "Invalid JSON." }"#;
        PathNotFound: NotFound
            => r#"{ "error": "Value doesn't exist." }"#;
        InvalidConfig: BadRequest
            => r#"{ "error": "Invalid configuration." }"#;
        MethodNotAllowed: MethodNotAllowed
            => r#"{ "error": "Invalid method." }"#;
        ResourceExhausted: InternalServerError
            => r#"{ "error": "Memory allocation failed." }"#;
        ApplyRejected: InternalServerError
            => r#"{ "error": "Failed to apply new configuration." }"#;
    }
}

impl error::Error for ErrorKind {}
impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
