use std::{
    cell::{Cell, OnceCell, RefCell},
    fmt, fs,
    sync::OnceLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// File sentinel used by runtimes that cannot name a frame's source file.
pub(crate) const UNKNOWN_FILE: &str = "Unknown";

/// File sentinel assigned to frames that executed inside the runtime itself.
pub(crate) const INTERNAL_FILE: &str = "[internal]";

/// One raw stack record as captured at throw time.
///
/// Raw frames are treated as immutable captured evidence: the inspector never
/// owns their production, it only consumes an already-captured ordered
/// sequence of them. All fields are optional at the capture boundary, so the
/// struct derives [`Default`] and deserializes leniently: crash reporters and
/// foreign runtimes routinely ship traces as JSON with keys missing.
///
/// An empty string in `file`, `class` or `function` is treated as absent when
/// read through a [`Frame`]; the stored value itself is never normalized.
///
/// # Examples
///
/// ```
/// use hindsight::RawFrame;
///
/// let raw = RawFrame {
///     file: Some("src/db.rs".to_owned()),
///     line: 42,
///     function: Some("connect".to_owned()),
///     ..RawFrame::default()
/// };
/// assert_eq!(raw.line, 42);
///
/// let from_json: RawFrame = serde_json::from_str(r#"{"file": "src/db.rs"}"#).unwrap();
/// assert_eq!(from_json.file.as_deref(), Some("src/db.rs"));
/// assert_eq!(from_json.line, 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    /// Source file of the call site, if the runtime recorded one.
    #[serde(default)]
    pub file: Option<String>,
    /// Line number of the call site; `0` when unknown.
    #[serde(default)]
    pub line: u32,
    /// Class or type the call was made on.
    #[serde(default)]
    pub class: Option<String>,
    /// Name of the called function.
    #[serde(default)]
    pub function: Option<String>,
    /// Captured call arguments, passed through untouched.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

/// A diagnostic annotation attached to a [`Frame`].
///
/// Comments are an append-only side channel: error-page renderers and log
/// formatters use them to carry per-frame notes (for example the message of a
/// chained exception) without touching the captured record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameComment {
    /// The annotation text.
    pub comment: String,
    /// The context label the annotation was filed under.
    pub context: String,
}

/// A single call-site snapshot in a normalized stack trace.
///
/// A `Frame` wraps one [`RawFrame`] and adds the derived accessors the raw
/// record cannot answer by itself: eval-context unwrapping, lazily-read file
/// contents, and the mutable diagnostic side channel (comments and the
/// application flag).
///
/// Frames are shared by identity inside a
/// [`FrameCollection`](crate::FrameCollection), so all mutation goes through
/// interior mutability and every accessor takes `&self`. A frame is expected
/// to be used by one logical call chain at a time; the type is deliberately
/// not [`Sync`].
///
/// # Examples
///
/// ```
/// use hindsight::{Frame, RawFrame};
///
/// let frame = Frame::new(RawFrame {
///     file: Some("src/api.rs".to_owned()),
///     line: 7,
///     function: Some("handle".to_owned()),
///     ..RawFrame::default()
/// });
///
/// assert_eq!(frame.file().as_deref(), Some("src/api.rs"));
/// assert!(!frame.is_application());
///
/// frame.add_comment("entry point of the failing request");
/// assert_eq!(frame.comments().len(), 1);
/// ```
#[derive(Debug)]
pub struct Frame {
    raw: RefCell<RawFrame>,
    file_contents: OnceCell<Option<String>>,
    comments: RefCell<Vec<FrameComment>>,
    application: Cell<bool>,
}

fn eval_context_regex() -> &'static Regex {
    static EVAL_CONTEXT: OnceLock<Regex> = OnceLock::new();
    EVAL_CONTEXT.get_or_init(|| {
        // Matches the synthetic path a runtime reports for code that ran
        // inside an eval or assert context:
        // - <real-path>(<real-line>) : eval()'d code
        // - <real-path>(<real-line>) : assert code
        Regex::new(r"^(.*)\((\d+)\) : (?:eval\(\)'d|assert) code$")
            .expect("built-in eval-context pattern should be valid")
    })
}

impl Frame {
    /// Wraps a captured raw record.
    pub fn new(raw: RawFrame) -> Self {
        Self {
            raw: RefCell::new(raw),
            file_contents: OnceCell::new(),
            comments: RefCell::new(Vec::new()),
            application: Cell::new(false),
        }
    }

    /// Returns the source file of this frame, or `None` when the record has
    /// no usable file.
    ///
    /// A frame that occurred inside an eval context reports a synthetic path
    /// of the form `<path>(<line>) : eval()'d code`. The first call that sees
    /// such a path rewrites the stored file and line to the real location it
    /// names; later calls observe the rewritten values.
    ///
    /// # Examples
    ///
    /// ```
    /// use hindsight::{Frame, RawFrame};
    ///
    /// let frame = Frame::new(RawFrame {
    ///     file: Some("app/run.php(13) : eval()'d code".to_owned()),
    ///     line: 1,
    ///     ..RawFrame::default()
    /// });
    ///
    /// assert_eq!(frame.file().as_deref(), Some("app/run.php"));
    /// assert_eq!(frame.line(), 13);
    /// ```
    pub fn file(&self) -> Option<String> {
        let mut raw = self.raw.borrow_mut();
        let file = match raw.file.as_deref() {
            Some(file) if !file.is_empty() => file,
            _ => return None,
        };
        let resolved = eval_context_regex()
            .captures(file)
            .map(|captures| (captures[1].to_owned(), captures[2].parse().unwrap_or(0)));
        if let Some((real_file, real_line)) = resolved {
            raw.file = Some(real_file);
            raw.line = real_line;
        }
        raw.file.clone()
    }

    /// Returns the line number of this frame.
    pub fn line(&self) -> u32 {
        self.raw.borrow().line
    }

    /// Returns the class the call was made on; empty strings read as absent.
    pub fn class(&self) -> Option<String> {
        self.raw.borrow().class.clone().filter(|class| !class.is_empty())
    }

    /// Returns the called function; empty strings read as absent.
    pub fn function(&self) -> Option<String> {
        self.raw
            .borrow()
            .function
            .clone()
            .filter(|function| !function.is_empty())
    }

    /// Returns the captured call arguments, in order.
    pub fn args(&self) -> Vec<serde_json::Value> {
        self.raw.borrow().args.clone()
    }

    /// Returns the contents of this frame's source file.
    ///
    /// The file is read at most once and the result is kept for the lifetime
    /// of the frame. Returns `None` for absent, `Unknown` and `[internal]`
    /// files, and for files that cannot be read — missing source context is
    /// an expected condition, not an error.
    pub fn file_contents(&self) -> Option<&str> {
        self.file_contents
            .get_or_init(|| {
                let file = self.file()?;
                if file == UNKNOWN_FILE || file == INTERNAL_FILE {
                    return None;
                }
                fs::read_to_string(&file).ok()
            })
            .as_deref()
    }

    /// Returns the lines of this frame's source file, each paired with its
    /// zero-based physical line index.
    ///
    /// With `length` given, the result is the viewport
    /// `[start, start + length)`: `start` is clamped to `0` from below, and
    /// the original indices are preserved — index 0 always names the first
    /// physical line of the file regardless of the viewport.
    ///
    /// Returns `Ok(None)` when no contents are available.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidLineLength`] if `length` is zero or
    /// negative.
    pub fn file_lines(
        &self,
        start: isize,
        length: Option<isize>,
    ) -> Result<Option<Vec<(usize, String)>>, Error> {
        let Some(contents) = self.file_contents() else {
            return Ok(None);
        };
        let mut lines: Vec<(usize, String)> = contents
            .split('\n')
            .map(str::to_owned)
            .enumerate()
            .collect();
        if let Some(length) = length {
            let start = start.max(0) as usize;
            if length <= 0 {
                return Err(Error::InvalidLineLength {
                    length: length as i64,
                });
            }
            let begin = start.min(lines.len());
            let end = begin.saturating_add(length as usize).min(lines.len());
            lines = lines[begin..end].to_vec();
        }
        Ok(Some(lines))
    }

    /// Appends a comment under the default `global` context.
    pub fn add_comment(&self, comment: impl Into<String>) {
        self.add_comment_with_context(comment, "global");
    }

    /// Appends a comment under the given context label.
    ///
    /// # Examples
    ///
    /// ```
    /// use hindsight::{Frame, RawFrame};
    ///
    /// let frame = Frame::new(RawFrame::default());
    /// frame.add_comment_with_context("connection refused", "Exception message:");
    ///
    /// let comments = frame.comments_with_context("Exception message:");
    /// assert_eq!(comments[0].comment, "connection refused");
    /// ```
    pub fn add_comment_with_context(&self, comment: impl Into<String>, context: impl Into<String>) {
        self.comments.borrow_mut().push(FrameComment {
            comment: comment.into(),
            context: context.into(),
        });
    }

    /// Returns all comments in insertion order.
    pub fn comments(&self) -> Vec<FrameComment> {
        self.comments.borrow().clone()
    }

    /// Returns the comments whose context equals `filter`, in insertion
    /// order.
    pub fn comments_with_context(&self, filter: &str) -> Vec<FrameComment> {
        self.comments
            .borrow()
            .iter()
            .filter(|comment| comment.context == filter)
            .cloned()
            .collect()
    }

    /// Whether this frame has been marked as application code.
    pub fn is_application(&self) -> bool {
        self.application.get()
    }

    /// Marks or unmarks this frame as application code.
    pub fn set_application(&self, application: bool) {
        self.application.set(application);
    }

    /// Returns a snapshot of the backing raw record, including any
    /// eval-context rewrite that has already occurred.
    pub fn raw_frame(&self) -> RawFrame {
        self.raw.borrow().clone()
    }
}

/// Frame identity: two frames are equal when the left frame has a usable
/// origin (a present, non-`Unknown` file and a non-zero line) and both
/// (file, line) pairs coincide.
///
/// The relation is deliberately irreflexive for unusable frames (`Unknown`
/// files, synthetic line-0 fillers), which keeps them from ever colliding
/// during the cross-exception merge. Because of that, `Frame` implements
/// [`PartialEq`] but not [`Eq`].
impl PartialEq for Frame {
    fn eq(&self, other: &Frame) -> bool {
        let Some(file) = self.file() else {
            return false;
        };
        if file == UNKNOWN_FILE || self.line() == 0 {
            return false;
        }
        other.file().as_deref() == Some(file.as_str()) && other.line() == self.line()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file().unwrap_or_else(|| UNKNOWN_FILE.to_owned());
        write!(f, "{}:{}", file, self.line())?;
        if let Some(function) = self.function() {
            match self.class() {
                Some(class) => write!(f, " {class}::{function}")?,
                None => write!(f, " {function}")?,
            }
        }
        Ok(())
    }
}
