use std::fmt;

use parking_lot::Mutex;

type Action = Box<dyn FnOnce() + Send>;

/// Handle releasing a registration when disposed.
///
/// Disposal is explicit: dropping the handle does not release anything.
/// Calling [`Disposable::dispose`] more than once is a no-op.
pub struct Disposable {
    action: Mutex<Option<Action>>,
}

impl Disposable {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// A disposable with nothing to release.
    pub fn empty() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    pub fn dispose(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
