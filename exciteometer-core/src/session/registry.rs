use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::session::Session;

/// Registry handle shared between the capture session and the UI.
pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

/// Committed sessions, loudest first.
///
/// Re-sorted on every insert by descending aggregate loudness. The sort is
/// stable, so sessions with equal aggregates keep their insertion order.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh registry for sharing.
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn insert(&mut self, session: Session) {
        log::info!(
            "Registry: adding '{}' ({} dB)",
            session.label(),
            session.display_loudness()
        );
        self.sessions.push(session);
        self.sessions
            .sort_by(|a, b| b.aggregate_loudness().total_cmp(&a.aggregate_loudness()));
    }

    /// Drop every session. Starts a new batch.
    pub fn clear(&mut self) {
        log::info!("Registry: clearing {} sessions", self.sessions.len());
        self.sessions.clear();
    }

    /// Snapshot of the sessions in display order.
    pub fn all(&self) -> Vec<Session> {
        self.sessions.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Suggested label for the next capture: `Entry N`.
    pub fn next_default_label(&self) -> String {
        format!("Entry {}", self.sessions.len() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn committed(label: &str, aggregate: f64) -> Session {
        Session::pending(label).commit(aggregate, PathBuf::from(format!("{}.wav", label)))
    }

    fn labels(registry: &SessionRegistry) -> Vec<String> {
        registry.all().iter().map(|s| s.label().to_string()).collect()
    }

    #[test]
    fn keeps_descending_order() {
        let mut registry = SessionRegistry::new();
        registry.insert(committed("a", -30.0));
        registry.insert(committed("b", -10.0));
        registry.insert(committed("c", -20.0));
        registry.insert(committed("d", f64::NEG_INFINITY));
        registry.insert(committed("e", -5.0));

        assert_eq!(labels(&registry), ["e", "b", "c", "a", "d"]);
        let values: Vec<f64> = registry.all().iter().map(|s| s.aggregate_loudness()).collect();
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn ties_preserve_insertion_order() {
        let mut registry = SessionRegistry::new();
        registry.insert(committed("first", -12.0));
        registry.insert(committed("louder", -3.0));
        registry.insert(committed("second", -12.0));
        registry.insert(committed("third", -12.0));

        assert_eq!(labels(&registry), ["louder", "first", "second", "third"]);
    }

    #[test]
    fn clear_empties_registry() {
        let mut registry = SessionRegistry::new();
        registry.insert(committed("a", -1.0));
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.all().is_empty());
    }

    #[test]
    fn default_label_counts_sessions() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.next_default_label(), "Entry 1");
        registry.insert(committed("x", -1.0));
        assert_eq!(registry.next_default_label(), "Entry 2");
    }

    #[test]
    fn snapshot_is_detached() {
        let mut registry = SessionRegistry::new();
        registry.insert(committed("a", -1.0));
        let snapshot = registry.all();
        registry.clear();
        assert_eq!(snapshot.len(), 1);
    }
}
