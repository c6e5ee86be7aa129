use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::ops::Deref;

pub type ConjectureResult<T> = Result<T, ConjectureError>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidConfig,
    InvalidMove,
    Evaluation,
    Fit,
    Io,
    Serde,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T: Into<Cow<'static, str>>> From<T> for ErrString {
    fn from(v: T) -> Self {
        Self(v.into())
    }
}

#[derive(Debug)]
pub enum ConjectureError {
    /// Rejected chain configuration: empty leaf vocabulary, bad
    /// temperatures, probabilities that do not sum below one, etc.
    InvalidConfig {
        message: ErrString,
    },
    /// A structural move was attempted on a node that cannot take it, or a
    /// pattern disagreed with the operator catalog about arity.
    InvalidMove {
        message: ErrString,
    },
    /// A formula could not be evaluated against the data.
    Evaluation {
        message: ErrString,
    },
    /// The numeric fitter could not calibrate the formula's parameters.
    Fit {
        message: ErrString,
    },

    Io {
        source: std::io::Error,
    },
    Serde {
        source: serde_json::Error,
    },

    Context {
        context: ErrorContext,
        source: Box<ConjectureError>,
    },
}

impl ConjectureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::InvalidMove { .. } => ErrorCode::InvalidMove,
            Self::Evaluation { .. } => ErrorCode::Evaluation,
            Self::Fit { .. } => ErrorCode::Fit,
            Self::Io { .. } => ErrorCode::Io,
            Self::Serde { .. } => ErrorCode::Serde,
            Self::Context { .. } => ErrorCode::Context,
        }
    }

    pub fn with_context(self, msg: impl Into<String>) -> Self {
        ConjectureError::Context {
            context: ErrorContext::new(msg),
            source: Box::new(self),
        }
    }
}

impl Display for ConjectureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { message } => write!(f, "Invalid configuration: {}", message),
            Self::InvalidMove { message } => write!(f, "Invalid move: {}", message),
            Self::Evaluation { message } => write!(f, "Evaluation error: {}", message),
            Self::Fit { message } => write!(f, "Fit error: {}", message),
            Self::Io { source } => write!(f, "I/O error: {}", source),
            Self::Serde { source } => write!(f, "Serialization error: {}", source),
            Self::Context {
                context, source, ..
            } => write!(f, "{}\nCaused by: {}", context, source),
        }
    }
}

impl std::error::Error for ConjectureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source } => Some(source),
            Self::Serde { source } => Some(source),
            Self::Context { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConjectureError {
    fn from(source: std::io::Error) -> Self {
        ConjectureError::Io { source }
    }
}

impl From<serde_json::Error> for ConjectureError {
    fn from(source: serde_json::Error) -> Self {
        ConjectureError::Serde { source }
    }
}

#[derive(Debug)]
pub struct ErrorContext {
    message: String,
}

impl ErrorContext {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl Display for ErrorContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorContext {}

// Ergonomic Result extensions (context)
pub trait ResultExt<T> {
    fn context(self, msg: impl Into<String>) -> ConjectureResult<T>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> ConjectureResult<T>;
}

impl<T, E: Into<ConjectureError>> ResultExt<T> for Result<T, E> {
    fn context(self, msg: impl Into<String>) -> ConjectureResult<T> {
        self.map_err(|e| e.into().with_context(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> ConjectureResult<T> {
        self.map_err(|e| e.into().with_context(f()))
    }
}

// Macros: err, bail, ensure
#[doc(hidden)]
pub mod __private {
    #[inline]
    #[cold]
    #[must_use]
    pub fn must_use<E>(e: E) -> E {
        e
    }
}

#[macro_export]
macro_rules! conjecture_err {
    (InvalidConfig: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::ConjectureError::InvalidConfig { message: format!($fmt, $($arg),*).into() })
    };
    (InvalidMove: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::ConjectureError::InvalidMove { message: format!($fmt, $($arg),*).into() })
    };
    (Evaluation: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::ConjectureError::Evaluation { message: format!($fmt, $($arg),*).into() })
    };
    (Fit: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::__private::must_use($crate::ConjectureError::Fit { message: format!($fmt, $($arg),*).into() })
    };
}

#[macro_export]
macro_rules! conjecture_bail {
    ($($tt:tt)+) => { return Err($crate::conjecture_err!($($tt)+)) };
}

#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($tt:tt)+) => {
        if !$cond { $crate::conjecture_bail!($($tt)+); }
    };
}
