use std::{error::Error as StdError, fmt};

use crate::frame::RawFrame;

/// The input boundary of the inspector: an exception-like value carrying its
/// origin, its captured raw backtrace and an optional causal predecessor.
///
/// The crate never captures stacks itself; it consumes values that already
/// hold one. Implement this trait for whatever throwable representation your
/// runtime or bridge layer produces, or use the ready-made [`Exception`]
/// value type.
///
/// Causal chains are expected to be finite and acyclic; the
/// [`Inspector`](crate::Inspector) additionally bounds its traversal
/// defensively, so a malformed self-referential chain terminates instead of
/// looping.
pub trait Throwable: fmt::Debug {
    /// A stable, human-readable identifier for the concrete kind of this
    /// exception — typically a fully-qualified type name.
    fn name(&self) -> &str;

    /// The human-readable message.
    fn message(&self) -> &str;

    /// The stable numeric error code.
    fn code(&self) -> i64;

    /// The source file the exception originated from.
    fn file(&self) -> &str;

    /// The line the exception originated from.
    fn line(&self) -> u32;

    /// The raw backtrace captured at throw time, outermost call site first.
    fn trace(&self) -> &[RawFrame];

    /// The exception that caused this one, if any.
    fn previous(&self) -> Option<&dyn Throwable>;
}

/// An owned [`Throwable`] value with a builder-style constructor chain.
///
/// This is the concrete exception representation used by bridge layers and
/// tests; anything that can name its origin and hand over a raw trace can be
/// expressed as an `Exception`.
///
/// # Examples
///
/// ```
/// use hindsight::{Exception, RawFrame, Throwable};
///
/// let cause = Exception::new("db::ConnectionError", "connection refused")
///     .with_code(111)
///     .with_location("src/db.rs", 42);
/// let outer = Exception::new("api::RequestError", "request failed")
///     .with_location("src/api.rs", 7)
///     .with_trace(vec![RawFrame {
///         file: Some("src/main.rs".to_owned()),
///         line: 3,
///         function: Some("main".to_owned()),
///         ..RawFrame::default()
///     }])
///     .with_previous(cause);
///
/// assert_eq!(outer.name(), "api::RequestError");
/// assert_eq!(outer.previous().unwrap().code(), 111);
/// ```
#[derive(Debug)]
pub struct Exception {
    name: String,
    message: String,
    code: i64,
    file: String,
    line: u32,
    trace: Vec<RawFrame>,
    previous: Option<Box<dyn Throwable>>,
}

impl Exception {
    /// Creates an exception with the given kind identifier and message.
    ///
    /// The origin defaults to `Unknown`:0, the code to 0, and the trace to
    /// empty.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: 0,
            file: "Unknown".to_owned(),
            line: 0,
            trace: Vec::new(),
            previous: None,
        }
    }

    /// Sets the error code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    /// Sets the origin file and line.
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self
    }

    /// Sets the captured raw backtrace, outermost call site first.
    pub fn with_trace(mut self, trace: Vec<RawFrame>) -> Self {
        self.trace = trace;
        self
    }

    /// Sets the causal predecessor.
    pub fn with_previous(mut self, previous: impl Throwable + 'static) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    /// Ingests a [`std::error::Error`] and its source chain.
    ///
    /// The root error's type name becomes the exception name; each source
    /// link becomes a causal predecessor. Source links are type-erased by the
    /// standard library, so they are named `std::error::Error`.
    ///
    /// Standard errors carry no origin or backtrace, so the resulting
    /// exceptions have none; the inspector still synthesizes an origin frame
    /// and merges the chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use hindsight::{Exception, Throwable};
    ///
    /// let error = "not a number".parse::<u8>().unwrap_err();
    /// let exception = Exception::from_error(&error);
    ///
    /// assert!(exception.name().ends_with("ParseIntError"));
    /// assert!(!exception.message().is_empty());
    /// ```
    pub fn from_error<E>(error: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        let mut exception = Exception::new(std::any::type_name::<E>(), error.to_string());
        if let Some(source) = error.source() {
            exception.previous = Some(Box::new(Self::from_source(source)));
        }
        exception
    }

    fn from_source(error: &(dyn StdError + 'static)) -> Exception {
        let mut exception = Exception::new("std::error::Error", error.to_string());
        if let Some(source) = error.source() {
            exception.previous = Some(Box::new(Self::from_source(source)));
        }
        exception
    }
}

impl Throwable for Exception {
    fn name(&self) -> &str {
        &self.name
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> i64 {
        self.code
    }

    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn trace(&self) -> &[RawFrame] {
        &self.trace
    }

    fn previous(&self) -> Option<&dyn Throwable> {
        self.previous.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}
