//! Reactive Context
//!
//! The reactive context tracks which computation is currently running, so
//! that a cell read inside a [`Memo`](super::Memo) registers the cell as one
//! of the memo's dependencies.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per running computation. Entering a
//! context pushes an entry; dropping the returned guard pops it. Reads record
//! their cell in the top entry. [`ReactiveContext::untracked`] pushes an
//! entry that records nothing, which hides reads from any enclosing
//! computation.

use std::cell::RefCell;

use super::cell::{CellId, CellRef};
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// `None` for an untracked section.
    subscriber_id: Option<SubscriberId>,
    /// Cells read during this computation, in first-read order.
    dependencies: Vec<(CellId, CellRef)>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new tracking context for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId) -> Self {
        Self::push(Some(subscriber_id))
    }

    fn push(subscriber_id: Option<SubscriberId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber_id,
                dependencies: Vec::new(),
            });
        });
        Self { subscriber_id }
    }

    /// Run `f` without recording any reads in the enclosing computation.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _ctx = Self::push(None);
        f()
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.subscriber_id.is_some())
        })
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.subscriber_id))
    }

    /// Record a read of the cell `id`.
    ///
    /// `cell` is only invoked when a tracking context is active and the cell
    /// has not been recorded yet, so untracked reads never allocate.
    pub fn track(id: CellId, cell: impl FnOnce() -> CellRef) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(entry) = stack.last_mut() {
                if entry.subscriber_id.is_some()
                    && !entry.dependencies.iter().any(|(seen, _)| *seen == id)
                {
                    entry.dependencies.push((id, cell()));
                }
            }
        });
    }

    /// Get the cells recorded in the current context.
    pub fn dependencies() -> Vec<CellRef> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.dependencies.iter().map(|(_, c)| c.clone()).collect())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber_id, self.subscriber_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.subscriber_id, entry.subscriber_id
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ReactiveCell, Signal};
    use crate::value::Value;

    #[test]
    fn context_tracks_subscriber() {
        let id = SubscriberId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id);
            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn reads_are_recorded_once() {
        let a = Signal::new(Value::from(1));
        let b = Signal::new(Value::from(2));

        let _ctx = ReactiveContext::enter(SubscriberId::new());
        a.read();
        b.read();
        a.read();

        let deps = ReactiveContext::dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].id(), a.id());
        assert_eq!(deps[1].id(), b.id());
    }

    #[test]
    fn untracked_hides_reads() {
        let a = Signal::new(Value::from(1));

        let _ctx = ReactiveContext::enter(SubscriberId::new());
        ReactiveContext::untracked(|| a.read());
        assert!(ReactiveContext::dependencies().is_empty());
    }

    #[test]
    fn nested_contexts() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();

        {
            let _ctx1 = ReactiveContext::enter(id1);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(id2);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }

            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }
}
