//! The pull-based contract every filter implements.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use serde::Serialize;

use crate::{error::Error, raw_document::RawDocument, resource::Event};

/// Lifecycle of a filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum FilterState {
    #[default]
    Unopened,
    Parsing,
    Finished,
}

/// Cooperative cancellation flag shared with a running filter.
///
/// The filter only looks at it at the top of [`Filter::next`], so a unit
/// being parsed is always completed first.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A document filter: turns a byte source into a stream of events.
///
/// # Example
///
/// ```rust
/// use skelkit::{Event, Filter, RawDocument, formats::TmxFilter};
///
/// let mut filter = TmxFilter::new();
/// filter.open(
///     RawDocument::from_text(r#"<tmx version="1.4"><body><tu><tuv xml:lang="en"><seg>Hi</seg></tuv></tu></body></tmx>"#)
///         .with_source_locale("en")
///         .with_target_locale("fr"),
/// )?;
/// while filter.has_next() {
///     if let Event::TextUnit(unit) = filter.next()? {
///         assert_eq!(unit.source.text(), "Hi");
///     }
/// }
/// filter.close();
/// # Ok::<(), skelkit::Error>(())
/// ```
pub trait Filter {
    /// Short identifier of the filter, e.g. `tmx`.
    fn name(&self) -> &'static str;

    fn mime_type(&self) -> &'static str;

    /// Validates the document metadata, runs detection and queues the
    /// start-document event.
    fn open(&mut self, document: RawDocument) -> Result<(), Error>;

    fn has_next(&self) -> bool;

    /// Returns the next event. A fatal error finishes the filter.
    fn next(&mut self) -> Result<Event, Error>;

    fn cancel_handle(&self) -> CancelHandle;

    /// Requests cancellation; the next call to [`next`](Self::next) returns
    /// [`Event::Cancelled`].
    fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    /// Releases the input. Calling it more than once is harmless.
    fn close(&mut self);

    fn state(&self) -> FilterState;

    /// Iterates over the remaining events.
    fn events(&mut self) -> Events<'_, Self>
    where
        Self: Sized,
    {
        Events { filter: self }
    }
}

/// Iterator adapter returned by [`Filter::events`].
pub struct Events<'a, F: Filter> {
    filter: &'a mut F,
}

impl<F: Filter> Iterator for Events<'_, F> {
    type Item = Result<Event, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.filter.has_next() {
            Some(self.filter.next())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
        handle.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_default_state_is_unopened() {
        assert_eq!(FilterState::default(), FilterState::Unopened);
    }
}
