use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Mounted flag shared by every component of one hosting view.
///
/// Operations are not owned by the view: they run to completion after
/// teardown, but anything they would write back into the view (draft text,
/// notices, list updates) is dropped once the flag is cleared.
#[derive(Debug, Clone)]
pub struct ViewLifetime {
    mounted: Arc<AtomicBool>,
}

impl ViewLifetime {
    pub fn new() -> Self {
        Self {
            mounted: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Irreversible
    pub fn teardown(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    /// Run `f` only while the view is still mounted
    pub fn if_mounted<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        if self.is_mounted() {
            Some(f())
        } else {
            None
        }
    }
}

impl Default for ViewLifetime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_is_shared_by_clones() {
        let lifetime = ViewLifetime::new();
        let clone = lifetime.clone();
        assert_eq!(clone.if_mounted(|| 1), Some(1));

        lifetime.teardown();
        assert!(!clone.is_mounted());
        assert_eq!(clone.if_mounted(|| 1), None);
    }
}
