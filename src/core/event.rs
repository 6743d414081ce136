//! Event: ordered, synchronous subscriber list
//!
//! - Subscribe appends unconditionally; the same handler twice runs twice
//! - Raise calls every handler in subscription order with the same argument
//! - The first failing handler stops the pass and its error is returned
//!
//! Handlers are shared (`Rc`), the event only keeps a reference for invocation
//! and later removal. Identity is pointer identity of that `Rc`.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use thiserror::Error;

/// Error returned by a handler
pub type HandlerError = Box<dyn StdError + 'static>;

/// Result returned by a handler
pub type HandlerResult = Result<(), HandlerError>;

/// Identifies who subscribed a handler, for bulk removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocate a process-unique owner id
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscribed callback
pub struct Handler<A: ?Sized> {
    owner: Option<OwnerId>,
    func: Rc<dyn Fn(&A) -> HandlerResult>,
}

impl<A: ?Sized> Handler<A> {
    /// Unowned handler; only removable by identity or by clearing everything
    pub fn new(func: impl Fn(&A) -> HandlerResult + 'static) -> Self {
        Self {
            owner: None,
            func: Rc::new(func),
        }
    }

    /// Handler bound to `owner`
    pub fn owned(owner: OwnerId, func: impl Fn(&A) -> HandlerResult + 'static) -> Self {
        Self {
            owner: Some(owner),
            func: Rc::new(func),
        }
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    #[inline(always)]
    fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.func), Rc::as_ptr(&other.func))
    }
}

impl<A: ?Sized> Clone for Handler<A> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner,
            func: Rc::clone(&self.func),
        }
    }
}

impl<A: ?Sized> fmt::Debug for Handler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("owner", &self.owner)
            .field("func", &Rc::as_ptr(&self.func))
            .finish()
    }
}

/// Unsubscribing a handler that was never subscribed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("handler is not subscribed to event {0:?}")]
    NotSubscribed(&'static str),
}

/// A handler failed during [`Event::raise`]
#[derive(Debug, Error)]
pub enum EventError {
    #[error("handler #{index} of event {event:?} failed")]
    HandlerFailed {
        event: &'static str,
        index: usize,
        #[source]
        source: HandlerError,
    },
}

/// Named extension point
pub struct Event<A: ?Sized> {
    name: &'static str,
    handlers: Vec<Handler<A>>,
}

impl<A: ?Sized> Event<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append `handler`. Duplicates are kept and invoked once per subscription.
    pub fn subscribe(&mut self, handler: Handler<A>) {
        debug!("{}: appending handler {:?}", self.name, handler);
        self.handlers.push(handler);
    }

    /// Shorthand for subscribing an unowned closure; returns the handle for removal
    pub fn on(&mut self, func: impl Fn(&A) -> HandlerResult + 'static) -> Handler<A> {
        let handler = Handler::new(func);
        self.subscribe(handler.clone());
        handler
    }

    /// Remove the first subscription of `handler`
    pub fn unsubscribe(&mut self, handler: &Handler<A>) -> Result<(), SubscriptionError> {
        debug!("{}: removing handler {:?}", self.name, handler);
        let pos = self
            .handlers
            .iter()
            .position(|h| h.same(handler))
            .ok_or(SubscriptionError::NotSubscribed(self.name))?;
        self.handlers.remove(pos);
        Ok(())
    }

    /// Remove every handler bound to `owner`, or every handler when `owner` is `None`
    pub fn unsubscribe_all(&mut self, owner: Option<OwnerId>) {
        match owner {
            None => {
                debug!("{}: removing all handlers", self.name);
                self.handlers.clear();
            }
            Some(owner) => {
                debug!("{}: removing all handlers of {:?}", self.name, owner);
                self.handlers.retain(|h| h.owner != Some(owner));
            }
        }
    }

    /// Invoke every handler in subscription order.
    ///
    /// Stops at the first handler that returns `Err`; later handlers do not run
    /// in this pass.
    pub fn raise(&self, args: &A) -> Result<(), EventError> {
        for (index, handler) in self.handlers.iter().enumerate() {
            debug!("{}: calling handler {:?}", self.name, handler);
            (handler.func)(args).map_err(|source| EventError::HandlerFailed {
                event: self.name,
                index,
                source,
            })?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A: ?Sized> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<String>>>, tag: &'static str) -> Handler<u32> {
        let log = Rc::clone(log);
        Handler::new(move |v: &u32| {
            log.borrow_mut().push(format!("{tag}:{v}"));
            Ok(())
        })
    }

    #[test]
    fn test_raise_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut event = Event::new("test");
        event.subscribe(recorder(&log, "a"));
        event.subscribe(recorder(&log, "b"));
        event.raise(&7).unwrap();
        assert_eq!(*log.borrow(), vec!["a:7", "b:7"]);
    }

    #[test]
    fn test_duplicate_subscription_runs_twice() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut event = Event::new("test");
        let h = recorder(&log, "h");
        event.subscribe(h.clone());
        event.subscribe(h.clone());
        event.raise(&1).unwrap();
        assert_eq!(*log.borrow(), vec!["h:1", "h:1"]);

        // Removing once leaves the second subscription in place
        event.unsubscribe(&h).unwrap();
        assert_eq!(event.len(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_fails() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut event = Event::new("test");
        event.subscribe(recorder(&log, "a"));
        let stranger = recorder(&log, "a");
        assert_eq!(
            event.unsubscribe(&stranger),
            Err(SubscriptionError::NotSubscribed("test"))
        );
        assert_eq!(event.len(), 1);
    }

    #[test]
    fn test_unsubscribe_all_by_owner() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let owner = OwnerId::new();
        let other = OwnerId::new();
        let mut event = Event::new("test");
        let l1 = Rc::clone(&log);
        event.subscribe(Handler::owned(owner, move |v: &u32| {
            l1.borrow_mut().push(format!("owner:{v}"));
            Ok(())
        }));
        let l2 = Rc::clone(&log);
        event.subscribe(Handler::owned(other, move |v: &u32| {
            l2.borrow_mut().push(format!("other:{v}"));
            Ok(())
        }));
        event.subscribe(recorder(&log, "free"));

        event.unsubscribe_all(Some(owner));
        event.raise(&3).unwrap();
        assert_eq!(*log.borrow(), vec!["other:3", "free:3"]);

        event.unsubscribe_all(None);
        assert!(event.is_empty());
    }

    #[test]
    fn test_failing_handler_stops_pass() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut event = Event::new("test");
        event.subscribe(recorder(&log, "before"));
        event.on(|_: &u32| Err("boom".into()));
        event.subscribe(recorder(&log, "after"));

        let err = event.raise(&5).unwrap_err();
        let EventError::HandlerFailed { index, .. } = &err;
        assert_eq!(*index, 1);
        assert_eq!(err.to_string(), "handler #1 of event \"test\" failed");
        assert_eq!(*log.borrow(), vec!["before:5"]);
    }

    #[test]
    fn test_on_returns_removable_handle() {
        let mut event: Event<u32> = Event::new("test");
        let handle = event.on(|_| Ok(()));
        assert_eq!(event.len(), 1);
        event.unsubscribe(&handle).unwrap();
        assert!(event.is_empty());
    }
}
