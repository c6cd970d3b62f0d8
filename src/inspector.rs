use std::{cell::OnceCell, sync::OnceLock};

use regex::Regex;

use crate::{
    exception::Throwable,
    frame::{INTERNAL_FILE, RawFrame},
    frame_collection::FrameCollection,
};

/// Upper bound on causal-chain traversal.
///
/// Chains are finite and acyclic by construction, but nothing stops a
/// malformed [`Throwable`] implementation from linking back to itself; both
/// the chain walk and the recursive inspector construction stop here.
const MAX_CHAIN_DEPTH: usize = 128;

/// The two runtime settings gating doc-reference extraction.
///
/// Some runtimes embed documentation links in generated error messages, but
/// only when both HTML error decoration and a documentation root are
/// configured. [`Inspector::exception_docref_url`] reports `None` unless both
/// flags are set — an unavailable facility is "feature not applicable", never
/// an error.
///
/// The environment-sourced defaults read `HINDSIGHT_HTML_ERRORS` and
/// `HINDSIGHT_DOCREF_ROOT` once per process; a setting is on when its
/// variable is non-empty and not `0`.
///
/// # Examples
///
/// ```
/// use hindsight::DocrefSettings;
///
/// let enabled = DocrefSettings { html_errors: true, docref_root: true };
/// assert!(enabled.enabled());
/// assert!(!DocrefSettings::default().enabled());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocrefSettings {
    /// Whether the runtime decorates error messages with HTML.
    pub html_errors: bool,
    /// Whether a documentation root is configured.
    pub docref_root: bool,
}

impl DocrefSettings {
    /// Reads the settings from the process environment, once.
    ///
    /// Later calls observe the first snapshot regardless of environment
    /// changes.
    pub fn from_env() -> Self {
        static SETTINGS: OnceLock<DocrefSettings> = OnceLock::new();

        *SETTINGS.get_or_init(|| Self {
            html_errors: env_flag("HINDSIGHT_HTML_ERRORS"),
            docref_root: env_flag("HINDSIGHT_DOCREF_ROOT"),
        })
    }

    /// Whether doc-reference extraction is applicable at all.
    pub fn enabled(&self) -> bool {
        self.html_errors && self.docref_root
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|value| !value.is_empty() && value != "0")
}

fn docref_regex() -> &'static Regex {
    static DOCREF: OnceLock<Regex> = OnceLock::new();
    DOCREF.get_or_init(|| {
        // Matches the doc-reference link syntax some runtimes embed in
        // generated messages: [<a href='URL'>text</a>]
        Regex::new(r"\[<a href='([^']+)'>[^<]+</a>\]")
            .expect("built-in doc-ref pattern should be valid")
    })
}

/// Splits a message into its human-readable part and the embedded
/// doc-reference URL, if any. Only the first occurrence is stripped.
fn extract_docref(message: &str) -> (String, Option<String>) {
    match docref_regex().captures(message) {
        Some(captures) => {
            let url = captures[1].to_owned();
            let stripped = message.replacen(&captures[0], "", 1);
            (stripped, Some(url))
        }
        None => (message.to_owned(), None),
    }
}

/// Inspects one throwable and its causal chain.
///
/// An `Inspector` wraps a [`Throwable`] and lazily derives everything a
/// renderer needs from it: the normalized [`FrameCollection`], the extracted
/// message and doc-reference URL, and chain-wide views over the causal
/// predecessors. Every derived value is computed on first access and cached
/// for the lifetime of the inspector; the wrapped exception itself is never
/// mutated.
///
/// The heart of the type is [`frames`](Self::frames): it reconstructs a
/// coherent single-origin trace for the wrapped exception and, when a causal
/// predecessor exists, splices the two traces into one continuous,
/// non-duplicated sequence.
///
/// # Examples
///
/// ```
/// use hindsight::{Exception, Inspector, RawFrame};
///
/// let cause = Exception::new("db::ConnectionError", "connection refused")
///     .with_location("src/db.rs", 42);
/// let outer = Exception::new("api::RequestError", "request failed")
///     .with_location("src/api.rs", 7)
///     .with_previous(cause);
///
/// let inspector = Inspector::new(&outer);
/// let frames = inspector.frames();
///
/// // The synthesized origin frame of the outer exception sits on top.
/// assert_eq!(frames.get(0).unwrap().line(), 7);
/// // The cause's origin frame follows, annotated with its message.
/// let inner = frames.get(1).unwrap();
/// assert_eq!(inner.line(), 42);
/// assert_eq!(
///     inner.comments_with_context("Exception message:")[0].comment,
///     "connection refused"
/// );
/// ```
#[derive(Debug)]
pub struct Inspector<'e> {
    exception: &'e dyn Throwable,
    settings: DocrefSettings,
    depth: usize,
    frames: OnceCell<FrameCollection>,
    previous_inspector: OnceCell<Option<Box<Inspector<'e>>>>,
    previous_exceptions: OnceCell<Vec<&'e dyn Throwable>>,
    message: OnceCell<String>,
    docref_url: OnceCell<Option<String>>,
}

impl<'e> Inspector<'e> {
    /// Wraps an exception, with doc-ref settings read from the environment.
    pub fn new(exception: &'e dyn Throwable) -> Self {
        Self::with_settings(exception, DocrefSettings::from_env())
    }

    /// Wraps an exception with explicitly injected doc-ref settings.
    ///
    /// The settings propagate to the inspectors created for the causal
    /// chain.
    pub fn with_settings(exception: &'e dyn Throwable, settings: DocrefSettings) -> Self {
        Self::at_depth(exception, settings, 0)
    }

    fn at_depth(exception: &'e dyn Throwable, settings: DocrefSettings, depth: usize) -> Self {
        Self {
            exception,
            settings,
            depth,
            frames: OnceCell::new(),
            previous_inspector: OnceCell::new(),
            previous_exceptions: OnceCell::new(),
            message: OnceCell::new(),
            docref_url: OnceCell::new(),
        }
    }

    /// Returns the wrapped exception, unchanged.
    pub fn exception(&self) -> &'e dyn Throwable {
        self.exception
    }

    /// Returns the kind identifier of the wrapped exception.
    pub fn exception_name(&self) -> &str {
        self.exception.name()
    }

    /// Returns the exception's message with the first embedded doc-reference
    /// link stripped out.
    pub fn exception_message(&self) -> &str {
        self.message
            .get_or_init(|| extract_docref(self.exception.message()).0)
            .as_str()
    }

    /// Returns the URL of the doc-reference link embedded in the exception's
    /// message.
    ///
    /// `None` when the message carries no link, or when either of the two
    /// gating [`DocrefSettings`] is off.
    ///
    /// # Examples
    ///
    /// ```
    /// use hindsight::{DocrefSettings, Exception, Inspector};
    ///
    /// let settings = DocrefSettings { html_errors: true, docref_root: true };
    /// let exception =
    ///     Exception::new("test::Error", "test [<a href='www.example.com'>test</a>].");
    ///
    /// let inspector = Inspector::with_settings(&exception, settings);
    /// assert_eq!(inspector.exception_docref_url(), Some("www.example.com"));
    /// assert_eq!(inspector.exception_message(), "test .");
    ///
    /// let gated = Inspector::with_settings(&exception, DocrefSettings::default());
    /// assert_eq!(gated.exception_docref_url(), None);
    /// ```
    pub fn exception_docref_url(&self) -> Option<&str> {
        self.docref_url
            .get_or_init(|| {
                if !self.settings.enabled() {
                    return None;
                }
                extract_docref(self.exception.message()).1
            })
            .as_deref()
    }

    /// Whether the wrapped exception has a causal predecessor.
    pub fn has_previous_exception(&self) -> bool {
        self.exception.previous().is_some()
    }

    /// Returns the inspector wrapping the causal predecessor, if any.
    ///
    /// The child inspector is created on first call and cached for the
    /// lifetime of this inspector.
    pub fn previous_exception_inspector(&self) -> Option<&Inspector<'e>> {
        self.previous_inspector
            .get_or_init(|| {
                if self.depth >= MAX_CHAIN_DEPTH {
                    return None;
                }
                self.exception.previous().map(|previous| {
                    Box::new(Inspector::at_depth(previous, self.settings, self.depth + 1))
                })
            })
            .as_deref()
    }

    /// Returns every causal predecessor of the wrapped exception, nearest
    /// first.
    ///
    /// # Examples
    ///
    /// ```
    /// use hindsight::{Exception, Inspector};
    ///
    /// let e1 = Exception::new("test::E1", "first");
    /// let e2 = Exception::new("test::E2", "second").with_previous(e1);
    /// let e3 = Exception::new("test::E3", "third").with_previous(e2);
    ///
    /// let inspector = Inspector::new(&e3);
    /// let names: Vec<_> = inspector
    ///     .previous_exceptions()
    ///     .iter()
    ///     .map(|e| e.name())
    ///     .collect();
    /// assert_eq!(names, ["test::E2", "test::E1"]);
    /// ```
    pub fn previous_exceptions(&self) -> &[&'e dyn Throwable] {
        self.previous_exceptions
            .get_or_init(|| {
                let mut chain = Vec::new();
                let mut current = self.exception.previous();
                while let Some(exception) = current {
                    if chain.len() >= MAX_CHAIN_DEPTH {
                        break;
                    }
                    chain.push(exception);
                    current = exception.previous();
                }
                chain
            })
            .as_slice()
    }

    /// Returns the doc-ref-stripped message of each causal predecessor, in
    /// [`previous_exceptions`](Self::previous_exceptions) order.
    pub fn previous_exception_messages(&self) -> Vec<String> {
        self.previous_exceptions()
            .iter()
            .map(|exception| extract_docref(exception.message()).0)
            .collect()
    }

    /// Returns the code of each causal predecessor, in
    /// [`previous_exceptions`](Self::previous_exceptions) order.
    pub fn previous_exception_codes(&self) -> Vec<i64> {
        self.previous_exceptions()
            .iter()
            .map(|exception| exception.code())
            .collect()
    }

    /// Returns the normalized frames of the wrapped exception, merged with
    /// the frames of its causal chain.
    ///
    /// On first access the raw trace is normalized: indirection call sites
    /// are repaired, error-handler plumbing is trimmed, and a synthesized
    /// origin frame is placed on top. When a causal predecessor exists, the
    /// predecessor's own normalized frames are then spliced in beneath the
    /// frames unique to this exception. The result is cached; every later
    /// call returns the same collection.
    pub fn frames(&self) -> &FrameCollection {
        self.frames.get_or_init(|| self.compute_frames())
    }

    fn compute_frames(&self) -> FrameCollection {
        let mut frames = self.exception.trace().to_vec();

        // Indirection call sites lose their position to the runtime; the
        // caller frame right after them still carries it. Repair those,
        // default the rest to the internal sentinel.
        for index in 0..frames.len() {
            if has_file(&frames[index]) {
                continue;
            }
            let (file, line) = match frames.get(index + 1) {
                Some(next) if is_indirection_frame(next) => (next.file.clone(), next.line),
                _ => (Some(INTERNAL_FILE.to_owned()), 0),
            };
            frames[index].file = file;
            frames[index].line = line;
        }

        // Everything before the deepest re-entry at the exception's own
        // origin is error-handler plumbing.
        let mut origin = 0;
        for (index, frame) in frames.iter().enumerate() {
            if frame.file.as_deref() == Some(self.exception.file())
                && frame.line == self.exception.line()
            {
                origin = index;
            }
        }
        if origin > 0 {
            frames.drain(..origin);
        }

        frames.insert(0, self.origin_frame());
        let collection = FrameCollection::new(frames);

        let Some(previous) = self.previous_exception_inspector() else {
            return collection;
        };

        // Keep only this exception's unique top frames above the causal
        // predecessor's trace. The predecessor's cached collection stays
        // intact: the merge operates on a duplicate sharing the same frames.
        let outer = collection.top_diff(previous.frames());
        let merged = previous.frames().clone();
        if let Ok(first) = merged.get(0) {
            first.add_comment_with_context(previous.exception_message(), "Exception message:");
        }
        merged.prepend(outer);
        merged
    }

    /// One synthesized frame for the exception's own origin, placed ahead of
    /// the captured trace.
    fn origin_frame(&self) -> RawFrame {
        RawFrame {
            file: Some(self.exception.file().to_owned()),
            line: self.exception.line(),
            class: Some(self.exception.name().to_owned()),
            function: None,
            args: vec![serde_json::Value::String(
                self.exception.message().to_owned(),
            )],
        }
    }
}

fn has_file(frame: &RawFrame) -> bool {
    frame.file.as_deref().is_some_and(|file| !file.is_empty())
}

/// A `call_user_func`-family frame right after a positionless frame carries
/// the position the runtime dropped.
fn is_indirection_frame(frame: &RawFrame) -> bool {
    has_file(frame)
        && frame.line != 0
        && frame
            .function
            .as_deref()
            .is_some_and(|function| function.to_ascii_lowercase().contains("call_user_func"))
}

#[cfg(test)]
mod tests {
    use crate::exception::Exception;

    use super::*;

    fn site(file: &str, line: u32) -> RawFrame {
        RawFrame {
            file: Some(file.to_owned()),
            line,
            ..RawFrame::default()
        }
    }

    #[test]
    fn test_inspector_not_sync() {
        static_assertions::assert_not_impl_any!(Inspector<'static>: Sync, Copy, Clone);
    }

    #[test]
    fn test_origin_frame_synthesized_on_top() {
        let exception = Exception::new("test::Error", "boom")
            .with_location("src/app.rs", 31)
            .with_trace(vec![site("src/app.rs", 31), site("src/main.rs", 5)]);

        let inspector = Inspector::with_settings(&exception, DocrefSettings::default());
        let frames = inspector.frames();

        assert_eq!(frames.len(), 3);
        let origin = frames.get(0).unwrap();
        assert_eq!(origin.file().as_deref(), Some("src/app.rs"));
        assert_eq!(origin.line(), 31);
        assert_eq!(origin.class().as_deref(), Some("test::Error"));
        assert_eq!(origin.args(), vec![serde_json::Value::String("boom".to_owned())]);
    }

    #[test]
    fn test_frames_are_cached() {
        let exception = Exception::new("test::Error", "boom").with_location("src/app.rs", 1);
        let inspector = Inspector::with_settings(&exception, DocrefSettings::default());
        let first = inspector.frames() as *const FrameCollection;
        let second = inspector.frames() as *const FrameCollection;
        assert_eq!(first, second);
    }

    #[test]
    fn test_positionless_frames_default_to_internal() {
        let exception = Exception::new("test::Error", "boom")
            .with_location("src/app.rs", 1)
            .with_trace(vec![
                site("src/app.rs", 1),
                RawFrame {
                    function: Some("handler".to_owned()),
                    ..RawFrame::default()
                },
            ]);

        let inspector = Inspector::with_settings(&exception, DocrefSettings::default());
        let filled = inspector.frames().get(2).unwrap();
        assert_eq!(filled.raw_frame().file.as_deref(), Some("[internal]"));
        assert_eq!(filled.line(), 0);
    }

    #[test]
    fn test_positionless_frames_repaired_from_indirection() {
        let exception = Exception::new("test::Error", "boom")
            .with_location("src/app.rs", 1)
            .with_trace(vec![
                site("src/app.rs", 1),
                RawFrame {
                    function: Some("handler".to_owned()),
                    ..RawFrame::default()
                },
                RawFrame {
                    file: Some("src/dispatch.rs".to_owned()),
                    line: 88,
                    function: Some("Call_User_Func_Array".to_owned()),
                    ..RawFrame::default()
                },
            ]);

        let inspector = Inspector::with_settings(&exception, DocrefSettings::default());
        let repaired = inspector.frames().get(2).unwrap();
        assert_eq!(repaired.file().as_deref(), Some("src/dispatch.rs"));
        assert_eq!(repaired.line(), 88);
    }

    #[test]
    fn test_error_handler_prefix_trimmed() {
        // The first two frames re-enter through error-handling plumbing; the
        // deepest frame matching the exception's own origin marks the true
        // start of the trace.
        let exception = Exception::new("test::Error", "boom")
            .with_location("src/app.rs", 31)
            .with_trace(vec![
                site("src/handler.rs", 10),
                site("src/handler.rs", 20),
                site("src/app.rs", 31),
                site("src/main.rs", 5),
            ]);

        let inspector = Inspector::with_settings(&exception, DocrefSettings::default());
        let frames = inspector.frames();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames.get(0).unwrap().line(), 31);
        assert_eq!(frames.get(1).unwrap().file().as_deref(), Some("src/app.rs"));
        assert_eq!(frames.get(2).unwrap().file().as_deref(), Some("src/main.rs"));
    }

    #[test]
    fn test_docref_extraction_gated() {
        let exception =
            Exception::new("test::Error", "test [<a href='www.example.com'>test</a>].");

        let enabled = DocrefSettings {
            html_errors: true,
            docref_root: true,
        };
        let inspector = Inspector::with_settings(&exception, enabled);
        assert_eq!(inspector.exception_docref_url(), Some("www.example.com"));
        assert_eq!(inspector.exception_message(), "test .");

        let partially_gated = DocrefSettings {
            html_errors: true,
            docref_root: false,
        };
        let inspector = Inspector::with_settings(&exception, partially_gated);
        assert_eq!(inspector.exception_docref_url(), None);
        // The message is cleaned regardless of the gating.
        assert_eq!(inspector.exception_message(), "test .");
    }

    #[test]
    fn test_docref_absent_from_plain_messages() {
        let enabled = DocrefSettings {
            html_errors: true,
            docref_root: true,
        };
        let empty = Exception::new("test::Error", "");
        assert_eq!(Inspector::with_settings(&empty, enabled).exception_docref_url(), None);

        let plain = Exception::new("test::Error", "plain message");
        let inspector = Inspector::with_settings(&plain, enabled);
        assert_eq!(inspector.exception_docref_url(), None);
        assert_eq!(inspector.exception_message(), "plain message");
    }

    #[test]
    fn test_previous_exception_views() {
        let e1 = Exception::new("test::E1", "first").with_code(1);
        let e2 = Exception::new("test::E2", "second").with_code(2).with_previous(e1);
        let e3 = Exception::new("test::E3", "third").with_code(3).with_previous(e2);

        let inspector = Inspector::with_settings(&e3, DocrefSettings::default());
        assert!(inspector.has_previous_exception());

        let names: Vec<_> = inspector
            .previous_exceptions()
            .iter()
            .map(|exception| exception.name())
            .collect();
        assert_eq!(names, ["test::E2", "test::E1"]);
        assert_eq!(inspector.previous_exception_messages(), ["second", "first"]);
        assert_eq!(inspector.previous_exception_codes(), [2, 1]);

        let child = inspector
            .previous_exception_inspector()
            .expect("chain should produce a child inspector");
        assert_eq!(child.exception_name(), "test::E2");
        // The child inspector is cached.
        let again = inspector.previous_exception_inspector().unwrap() as *const Inspector<'_>;
        assert_eq!(child as *const Inspector<'_>, again);
    }

    #[test]
    fn test_no_previous_exception() {
        let exception = Exception::new("test::Error", "boom");
        let inspector = Inspector::with_settings(&exception, DocrefSettings::default());
        assert!(!inspector.has_previous_exception());
        assert!(inspector.previous_exception_inspector().is_none());
        assert!(inspector.previous_exceptions().is_empty());
        assert!(inspector.previous_exception_messages().is_empty());
        assert!(inspector.previous_exception_codes().is_empty());
    }

    #[test]
    fn test_chain_walk_is_depth_bounded() {
        // A self-referential throwable models a malformed cycle.
        #[derive(Debug)]
        struct Cyclic;

        impl Throwable for Cyclic {
            fn name(&self) -> &str {
                "test::Cyclic"
            }
            fn message(&self) -> &str {
                "round and round"
            }
            fn code(&self) -> i64 {
                0
            }
            fn file(&self) -> &str {
                "Unknown"
            }
            fn line(&self) -> u32 {
                0
            }
            fn trace(&self) -> &[RawFrame] {
                &[]
            }
            fn previous(&self) -> Option<&dyn Throwable> {
                Some(self)
            }
        }

        let cyclic = Cyclic;
        let inspector = Inspector::with_settings(&cyclic, DocrefSettings::default());
        assert_eq!(inspector.previous_exceptions().len(), MAX_CHAIN_DEPTH);
        // The frame merge terminates as well.
        assert!(inspector.frames().len() >= 1);
    }

    #[test]
    fn test_merged_frames_annotate_cause_origin() {
        let cause = Exception::new("test::Cause", "root of it all")
            .with_location("src/db.rs", 42)
            .with_trace(vec![site("src/db.rs", 42), site("src/main.rs", 5)]);
        let outer = Exception::new("test::Outer", "wrapper")
            .with_location("src/api.rs", 7)
            .with_trace(vec![site("src/api.rs", 7), site("src/main.rs", 5)])
            .with_previous(cause);

        let inspector = Inspector::with_settings(&outer, DocrefSettings::default());
        let frames = inspector.frames();

        // Outer origin on top, then the cause's full normalized trace; the
        // shared tail frame appears only once.
        assert_eq!(frames.len(), 5);
        assert_eq!(frames.get(0).unwrap().line(), 7);
        let cause_origin = frames.get(2).unwrap();
        assert_eq!(cause_origin.file().as_deref(), Some("src/db.rs"));
        let comments = cause_origin.comments_with_context("Exception message:");
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].comment, "root of it all");
    }

    #[test]
    fn test_merge_leaves_child_cache_sequence_intact() {
        let cause = Exception::new("test::Cause", "inner")
            .with_location("src/db.rs", 42)
            .with_trace(vec![site("src/db.rs", 42), site("src/main.rs", 5)]);
        let outer = Exception::new("test::Outer", "outer")
            .with_location("src/api.rs", 7)
            .with_trace(vec![site("src/api.rs", 7), site("src/main.rs", 5)])
            .with_previous(cause);

        let inspector = Inspector::with_settings(&outer, DocrefSettings::default());
        let merged_len = inspector.frames().len();
        let child_len = inspector
            .previous_exception_inspector()
            .expect("child inspector should exist")
            .frames()
            .len();
        assert!(merged_len > child_len);
    }
}
