//! An ordered, externally read-only collection of stack frames.
//!
//! [`FrameCollection`] is the unit the [`Inspector`](crate::Inspector) hands
//! to downstream renderers: a dense, zero-based sequence of shared
//! [`Frame`]s supporting fluent in-place transforms and the tail-anchored
//! [`top_diff`](FrameCollection::top_diff) merge primitive used to splice the
//! traces of chained exceptions.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    error::Error,
    frame::{Frame, RawFrame},
};

mod iter;

pub use self::iter::FrameCollectionIter;

/// An ordered sequence of [`Frame`]s, read-only through its index surface.
///
/// Frames are stored as `Rc<Frame>` and shared by identity: cloning the
/// collection duplicates the sequence while sharing the frame objects, so
/// annotations added to a frame are visible through every collection holding
/// it. That is exactly what the cross-exception merge needs.
///
/// The sanctioned mutations ([`filter`](Self::filter), [`map`](Self::map)
/// and [`prepend`](Self::prepend)) work in place and keep the sequence dense
/// and zero-based. Index-based writes are rejected: the collection presents a
/// read-only surface to callers that merely render it.
///
/// # Examples
///
/// ```
/// use hindsight::{FrameCollection, RawFrame};
///
/// let collection = FrameCollection::new(vec![
///     RawFrame { file: Some("src/api.rs".to_owned()), line: 7, ..RawFrame::default() },
///     RawFrame { file: Some("src/db.rs".to_owned()), line: 42, ..RawFrame::default() },
/// ]);
///
/// assert_eq!(collection.len(), 2);
/// collection.filter(|frame| frame.line() > 10);
/// assert_eq!(collection.len(), 1);
/// assert_eq!(collection.get(0).unwrap().file().as_deref(), Some("src/db.rs"));
/// ```
pub struct FrameCollection {
    frames: RefCell<Vec<Rc<Frame>>>,
}

impl FrameCollection {
    const TYPE_NAME: &'static str = "FrameCollection";

    /// Wraps each raw record in a [`Frame`], preserving order.
    pub fn new(frames: Vec<RawFrame>) -> Self {
        Self::from_frames(frames.into_iter().map(|raw| Rc::new(Frame::new(raw))).collect())
    }

    pub(crate) fn from_frames(frames: Vec<Rc<Frame>>) -> Self {
        Self {
            frames: RefCell::new(frames),
        }
    }

    /// Removes the frames failing the predicate and re-indexes the survivors
    /// to dense zero-based order. Returns the collection itself for chaining.
    ///
    /// # Examples
    ///
    /// ```
    /// use hindsight::{FrameCollection, RawFrame};
    ///
    /// let collection = FrameCollection::new(vec![RawFrame::default(); 4]);
    /// let remaining = collection
    ///     .filter(|frame| frame.is_application())
    ///     .len();
    /// assert_eq!(remaining, 0);
    /// ```
    pub fn filter(&self, mut predicate: impl FnMut(&Frame) -> bool) -> &Self {
        self.frames.borrow_mut().retain(|frame| predicate(frame));
        self
    }

    /// Replaces each frame with `transform(frame)`, in place. Returns the
    /// collection itself for chaining.
    ///
    /// The transform must produce a frame for every input frame; the closure
    /// signature makes any other return shape a compile error.
    pub fn map(&self, mut transform: impl FnMut(Rc<Frame>) -> Rc<Frame>) -> &Self {
        for slot in self.frames.borrow_mut().iter_mut() {
            *slot = transform(Rc::clone(slot));
        }
        self
    }

    /// Returns a defensive snapshot of the sequence.
    ///
    /// Mutating the returned vector does not affect the collection; the
    /// frames themselves are shared.
    pub fn to_vec(&self) -> Vec<Rc<Frame>> {
        self.frames.borrow().clone()
    }

    /// Returns the frame at `index`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::FrameNotFound`] when `index` is past the end of
    /// the collection.
    pub fn get(&self, index: usize) -> Result<Rc<Frame>, Error> {
        self.frames
            .borrow()
            .get(index)
            .cloned()
            .ok_or(Error::FrameNotFound { index })
    }

    /// Rejects an indexed write; the index surface is read-only.
    ///
    /// # Errors
    ///
    /// Always fails with [`Error::ReadOnlyCollection`].
    pub fn set(&self, _index: usize, _frame: Rc<Frame>) -> Result<(), Error> {
        Err(Error::ReadOnlyCollection {
            operation: "offsetSet",
            type_name: Self::TYPE_NAME,
        })
    }

    /// Rejects an indexed delete; the index surface is read-only.
    ///
    /// # Errors
    ///
    /// Always fails with [`Error::ReadOnlyCollection`].
    pub fn remove(&self, _index: usize) -> Result<(), Error> {
        Err(Error::ReadOnlyCollection {
            operation: "offsetUnset",
            type_name: Self::TYPE_NAME,
        })
    }

    /// Returns the number of frames in the collection.
    pub fn len(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Returns `true` if the collection contains no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    /// Returns the number of frames marked as application code.
    pub fn application_count(&self) -> usize {
        self.frames
            .borrow()
            .iter()
            .filter(|frame| frame.is_application())
            .count()
    }

    /// Inserts the given frames before the existing sequence, preserving
    /// their order.
    pub fn prepend(&self, frames: Vec<Rc<Frame>>) {
        self.frames.borrow_mut().splice(0..0, frames);
    }

    /// Returns the frames of this collection that are not already represented
    /// at the tail of `parent`.
    ///
    /// Both sequences are walked from their tails backward in lockstep; a
    /// frame of this collection is dropped from the result when it equals the
    /// parent frame at the same tail offset. Both cursors move every
    /// iteration — this is a positional comparison, not a subsequence search.
    /// Neither collection is mutated.
    ///
    /// This is the primitive behind chained-exception rendering: the common
    /// call path shared by an exception and its cause appears only once.
    ///
    /// # Examples
    ///
    /// ```
    /// use hindsight::{FrameCollection, RawFrame};
    ///
    /// let site = |file: &str, line| RawFrame {
    ///     file: Some(file.to_owned()),
    ///     line,
    ///     ..RawFrame::default()
    /// };
    /// let child = FrameCollection::new(vec![site("a", 1), site("b", 2), site("c", 3)]);
    /// let parent = FrameCollection::new(vec![site("x", 9), site("b", 2), site("c", 3)]);
    ///
    /// let unique = child.top_diff(&parent);
    /// assert_eq!(unique.len(), 1);
    /// assert_eq!(unique[0].file().as_deref(), Some("a"));
    /// ```
    pub fn top_diff(&self, parent: &FrameCollection) -> Vec<Rc<Frame>> {
        let mut diff: Vec<Option<Rc<Frame>>> =
            self.frames.borrow().iter().cloned().map(Some).collect();
        let parent_frames = parent.to_vec();

        let mut p = parent_frames.len();
        for i in (0..diff.len()).rev() {
            if p == 0 {
                break;
            }
            p -= 1;
            let shared = diff[i]
                .as_ref()
                .is_some_and(|tail| **tail == *parent_frames[p]);
            if shared {
                diff[i] = None;
            }
        }
        diff.into_iter().flatten().collect()
    }

    /// Returns an iterator over the frames in stored order.
    ///
    /// The iterator operates on a snapshot: it is unaffected by later
    /// transforms, and calling `iter` again restarts from the current state
    /// of the collection.
    pub fn iter(&self) -> FrameCollectionIter {
        FrameCollectionIter::new(self.to_vec())
    }
}

impl Default for FrameCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Clone for FrameCollection {
    /// Duplicates the sequence while sharing the frame objects themselves.
    fn clone(&self) -> Self {
        Self::from_frames(self.to_vec())
    }
}

impl From<Vec<RawFrame>> for FrameCollection {
    fn from(frames: Vec<RawFrame>) -> Self {
        Self::new(frames)
    }
}

impl FromIterator<RawFrame> for FrameCollection {
    fn from_iter<I: IntoIterator<Item = RawFrame>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for &FrameCollection {
    type Item = Rc<Frame>;
    type IntoIter = FrameCollectionIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for FrameCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames.borrow().iter()).finish()
    }
}

impl fmt::Display for FrameCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in self {
            writeln!(f, "{frame}")?;
        }
        Ok(())
    }
}
