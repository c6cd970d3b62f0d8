#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Stack-frame inspection and normalization for chained exceptions.
//!
//! ## Overview
//!
//! This crate takes a thrown error/exception together with its causal chain
//! and turns the raw call-stack data captured at throw time into a
//! structured, queryable sequence of stack frames. It is the backend for
//! error-reporting and diagnostic tools (pretty error pages, log formatters)
//! that want to present a clean, de-duplicated, annotated answer to "where
//! did this error come from and what led to it?"
//!
//! The crate does not capture stacks and does not render anything: raw
//! traces arrive pre-captured through the [`Throwable`] boundary, and the
//! normalized [`FrameCollection`] is what downstream renderers consume.
//!
//! ## Core Concepts
//!
//! Three components compose, leaves first:
//!
//! - [`Frame`] — one call-site snapshot wrapping a captured [`RawFrame`],
//!   with derived accessors (eval-context unwrapping, lazily-read file
//!   contents) and a mutable side channel for diagnostic comments and the
//!   "application code" flag.
//! - [`FrameCollection`] — an ordered, externally read-only sequence of
//!   shared frames with fluent in-place transforms and the tail-anchored
//!   [`top_diff`](FrameCollection::top_diff) merge primitive.
//! - [`Inspector`] — the orchestrator: it normalizes the wrapped exception's
//!   trace (repairing indirection call sites, trimming error-handler
//!   plumbing, synthesizing an origin frame), recursively wraps the causal
//!   chain in child inspectors, and splices the traces of chained exceptions
//!   into one continuous, non-duplicated sequence.
//!
//! ## Quick Example
//!
//! ```
//! use hindsight::{Exception, Inspector, RawFrame};
//!
//! let cause = Exception::new("db::ConnectionError", "connection refused")
//!     .with_location("src/db.rs", 42)
//!     .with_trace(vec![RawFrame {
//!         file: Some("src/db.rs".to_owned()),
//!         line: 42,
//!         function: Some("connect".to_owned()),
//!         ..RawFrame::default()
//!     }]);
//! let outer = Exception::new("api::RequestError", "request failed")
//!     .with_location("src/api.rs", 7)
//!     .with_previous(cause);
//!
//! let inspector = Inspector::new(&outer);
//! let frames = inspector.frames();
//!
//! // The outer exception's synthesized origin frame sits on top; the
//! // cause's frames follow beneath the frames unique to the outer one.
//! assert_eq!(frames.get(0).unwrap().line(), 7);
//! assert!(frames.len() > 1);
//!
//! for frame in frames {
//!     println!("{frame}");
//! }
//! ```
//!
//! ## Doc-Reference Links
//!
//! Some runtimes embed documentation links in generated error messages using
//! the syntax `[<a href='URL'>text</a>]`. [`Inspector::exception_message`]
//! always strips the first such link; [`Inspector::exception_docref_url`]
//! additionally exposes the URL, but only when both gating settings are on.
//!
//! # Environment Variables
//!
//! - `HINDSIGHT_HTML_ERRORS` - the runtime decorates messages with HTML
//! - `HINDSIGHT_DOCREF_ROOT` - a documentation root is configured
//!
//! Both are read once per process; a setting is on when its variable is
//! non-empty and not `0`. Use [`Inspector::with_settings`] to bypass the
//! environment entirely.
//!
//! ## Thread Safety
//!
//! Inspection is single-threaded by design: frames are shared by identity
//! (`Rc`) and annotated through interior mutability, so [`Frame`],
//! [`FrameCollection`] and [`Inspector`] are deliberately not [`Sync`]. Each
//! inspector is expected to serve one logical call chain — typically the
//! handling of one error.

mod error;
mod exception;
mod frame;
pub mod frame_collection;
mod inspector;

pub use self::{
    error::Error,
    exception::{Exception, Throwable},
    frame::{Frame, FrameComment, RawFrame},
    frame_collection::FrameCollection,
    inspector::{DocrefSettings, Inspector},
};
