//! One-shot cancellation tokens.
//!
//! Every implementation flips its `disposed` flag atomically *before* running
//! any cleanup, so a concurrent observer sees either "active" or "disposed",
//! never a half-finished state. Only the first `dispose()` has an effect.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

pub trait Disposable: Send + Sync {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

/// Plain flag.
#[derive(Debug, Default)]
pub struct BooleanDisposable {
    disposed: AtomicBool,
}

impl BooleanDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Disposable for BooleanDisposable {
    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// Runs a cleanup closure exactly once, on first dispose.
pub struct ActionDisposable {
    disposed: AtomicBool,
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ActionDisposable {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            disposed: AtomicBool::new(false),
            action: Mutex::new(Some(Box::new(action))),
        }
    }
}

impl Disposable for ActionDisposable {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ActionDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A replaceable slot holding one inner disposable.
///
/// `replace` disposes the displaced inner value: a placeholder that gets
/// upgraded is never leaked. Replacing after the slot itself was disposed
/// disposes the newcomer immediately.
#[derive(Default)]
pub struct SwapDisposable {
    disposed: AtomicBool,
    current: Mutex<Option<Arc<dyn Disposable>>>,
}

impl SwapDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `next`. Returns false if the slot was already disposed (in which
    /// case `next` has been disposed too).
    pub fn replace(&self, next: Arc<dyn Disposable>) -> bool {
        let orphan = {
            let mut slot = self.current.lock();
            if self.disposed.load(Ordering::Acquire) {
                None
            } else {
                Some(slot.replace(next.clone()))
            }
        };
        match orphan {
            None => {
                next.dispose();
                false
            }
            Some(previous) => {
                if let Some(previous) = previous {
                    previous.dispose();
                }
                true
            }
        }
    }
}

impl Disposable for SwapDisposable {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = self.current.lock().take();
        if let Some(inner) = inner {
            inner.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SwapDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Disposes a whole set together; additions after disposal are disposed on
/// arrival.
#[derive(Default)]
pub struct CompositeDisposable {
    disposed: AtomicBool,
    members: Mutex<Vec<Arc<dyn Disposable>>>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, member: Arc<dyn Disposable>) -> bool {
        {
            let mut members = self.members.lock();
            if !self.disposed.load(Ordering::Acquire) {
                members.push(member);
                return true;
            }
        }
        member.dispose();
        false
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Disposable for CompositeDisposable {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let members = std::mem::take(&mut *self.members.lock());
        for m in members {
            m.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CompositeDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeDisposable")
            .field("disposed", &self.is_disposed())
            .field("members", &self.len())
            .finish()
    }
}
