use thiserror::Error;

/// The errors surfaced by the frame and frame-collection accessors.
///
/// Only the hard conditions of the API are represented here: invalid slicing
/// arguments and misuse of the read-only index surface. Missing source files
/// and unavailable doc-ref settings are expected in many deployments and
/// degrade to `None` instead of producing an [`Error`].
///
/// # Examples
///
/// ```
/// use hindsight::{Error, FrameCollection};
///
/// let collection = FrameCollection::new(Vec::new());
/// let error = collection.get(3).unwrap_err();
///
/// assert_eq!(error, Error::FrameNotFound { index: 3 });
/// assert_eq!(error.to_string(), "Frame[3] was not found.");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A non-positive window length was passed to
    /// [`Frame::file_lines`](crate::Frame::file_lines).
    #[error(
        "You provided a invalid value [{length}] for $length, $length cannot be lower or equal to 0."
    )]
    InvalidLineLength {
        /// The rejected length value.
        length: i64,
    },

    /// An indexed read past the end of a
    /// [`FrameCollection`](crate::FrameCollection).
    #[error("Frame[{index}] was not found.")]
    FrameNotFound {
        /// The requested frame position.
        index: usize,
    },

    /// An indexed write or delete on a read-only collection.
    #[error("Calling [{operation}] method on read-only object [{type_name}] is not allowed.")]
    ReadOnlyCollection {
        /// The rejected operation, e.g. `offsetSet`.
        operation: &'static str,
        /// The type name of the collection the operation was attempted on.
        type_name: &'static str,
    },
}
