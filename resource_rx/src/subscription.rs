use std::fmt;

/// An owned registration that can be cancelled exactly once.
///
/// Cancellation happens either through [`cancel`](Self::cancel) or when the
/// subscription is dropped, so storing the handle is enough to tie a
/// listener's lifetime to its owner.
#[must_use = "dropping a Subscription cancels it immediately"]
#[derive(Default)]
pub struct Subscription(Option<Box<dyn FnOnce() + Send + 'static>>);

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Subscription(Some(Box::new(unsubscribe)))
    }

    pub fn empty() -> Self {
        Subscription(None)
    }

    pub fn is_active(&self) -> bool {
        self.0.is_some()
    }

    pub fn cancel(mut self) {
        self.cancel_in_place();
    }

    /// Releases the handle without cancelling; the registration then lives as
    /// long as its source.
    pub fn detach(mut self) {
        self.0 = None;
    }

    fn cancel_in_place(&mut self) {
        if let Some(unsubscribe) = self.0.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_in_place();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
