use std::sync::Arc;

use dashmap::DashMap;

use super::Notifier;

/// Named set of notifiers owned by the service composition root.
///
/// Registering a notifier under an existing name replaces the previous one.
#[derive(Default)]
pub struct NotifierRegistry {
    notifiers: DashMap<String, Arc<dyn Notifier>>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a notifier under its own name, returning the one it replaced.
    pub fn register(&self, notifier: Arc<dyn Notifier>) -> Option<Arc<dyn Notifier>> {
        let name = notifier.name().to_string();
        let previous = self.notifiers.insert(name.clone(), notifier);

        if previous.is_some() {
            tracing::info!(notifier = %name, "Notifier replaced");
        } else {
            tracing::debug!(notifier = %name, "Notifier registered");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers.get(name).map(|entry| entry.value().clone())
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers.remove(name).map(|(_, notifier)| notifier)
    }

    pub fn clear(&self) {
        self.notifiers.clear();
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.notifiers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }
}

impl std::fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierRegistry")
            .field("notifiers", &self.names())
            .finish()
    }
}
