//! Application state: the single session, its persistence, and the export collaborators.
//!
//! This module owns:
//!   - the session (one student, one profile) behind an async RwLock
//!   - the persistence layer and the debounced autosaver
//!   - the optional external renderer client
//!   - the export clock used to stamp backups
//!
//! All mutation goes through `AppState::dispatch`, which applies an `Action` and
//! then performs the side effect the transition asks for.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::backup::ExportClock;
use crate::config::{load_config_from_env, ServiceConfig};
use crate::error::CoreError;
use crate::persist::{Autosaver, Persistence};
use crate::render::RenderClient;
use crate::session::{Action, Effect, Session};
use crate::store::{FileStore, MemoryStore, ScopedStore};

pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub persistence: Arc<Persistence>,
    pub autosaver: Arc<Autosaver>,
    pub renderer: Option<RenderClient>,
    pub clock: ExportClock,
    pub config: ServiceConfig,
}

impl AppState {
    /// Build state from env: load config, open the store, restore the last session,
    /// and set up the renderer client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_config_from_env();
        let store = open_store(&config.storage.path);

        let renderer = RenderClient::from_env(std::time::Duration::from_secs(config.export.renderer_timeout_secs));
        if let Some(r) = &renderer {
            info!(target: "gradebridge", base_url = %r.base_url, "Document renderer enabled.");
        } else {
            info!(target: "gradebridge", "No RENDERER_URL set; document export will report the renderer as unavailable.");
        }

        Self::with_parts(config, store, renderer)
    }

    pub fn with_parts(config: ServiceConfig, store: Arc<dyn ScopedStore>, renderer: Option<RenderClient>) -> Self {
        let persistence = Arc::new(Persistence::new(store, config.storage.clone()));

        let mut session = Session::default();
        if let Some(snapshot) = persistence.restore() {
            let _ = session.apply(Action::Hydrate(snapshot));
        }
        if persistence.privacy_acknowledged() {
            let _ = session.apply(Action::AcknowledgePrivacy);
        }

        let session = Arc::new(RwLock::new(session));
        let autosaver = Arc::new(Autosaver::new(persistence.clone(), session.clone(), config.autosave.debounce()));

        Self {
            session,
            persistence,
            autosaver,
            renderer,
            clock: ExportClock::default(),
            config,
        }
    }

    /// Apply one action and perform its side effect.
    #[instrument(level = "debug", skip(self, action))]
    pub async fn dispatch(&self, action: Action) -> Result<Effect, CoreError> {
        let mut session = self.session.write().await;
        self.commit(&mut session, action)
    }

    /// Same as `dispatch` for callers already holding the write lock.
    pub fn commit(&self, session: &mut Session, action: Action) -> Result<Effect, CoreError> {
        let acknowledges_privacy = matches!(action, Action::AcknowledgePrivacy);
        let effect = session.apply(action)?;
        match effect {
            Effect::Autosave => self.autosaver.schedule(session.snapshot()),
            Effect::Purge => self.autosaver.purge(),
            Effect::None => {}
        }
        if acknowledges_privacy {
            self.persistence.acknowledge_privacy();
        }
        Ok(effect)
    }

    /// Point-in-time copy, so slow work (rendering) never holds the lock.
    pub async fn session_copy(&self) -> Session {
        self.session.read().await.clone()
    }
}

/// Open the configured store, falling back to memory when the location is unusable.
fn open_store(path: &str) -> Arc<dyn ScopedStore> {
    if path.trim().is_empty() {
        info!(target: "autosave", "No storage path configured; session kept in memory only");
        return Arc::new(MemoryStore::new());
    }
    match FileStore::open(Path::new(path)) {
        Ok(store) => {
            info!(target: "autosave", %path, "Session store ready");
            Arc::new(store)
        }
        Err(e) => {
            warn!(target: "autosave", %path, error = %e, "Storage unavailable; session kept in memory only");
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageCfg;

    #[tokio::test]
    async fn startup_restores_saved_session_and_flags() {
        let store = Arc::new(MemoryStore::new());
        let keys = StorageCfg::default();
        store.set(&keys.session_key, r#"{"studentName":"Ada","studentId":"42","submissionData":{}}"#).unwrap();

        let state = AppState::with_parts(ServiceConfig::default(), store, None);
        let s = state.session_copy().await;
        assert_eq!(s.student_name, "Ada");
        assert_eq!(s.student_id, "42");
        assert!(s.assignment.is_none());
        assert!(s.privacy_acknowledged);
    }

    #[tokio::test]
    async fn fresh_profile_has_not_acknowledged_privacy() {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::with_parts(ServiceConfig::default(), store.clone(), None);
        assert!(!state.session_copy().await.privacy_acknowledged);

        state.dispatch(Action::AcknowledgePrivacy).await.unwrap();
        let again = AppState::with_parts(ServiceConfig::default(), store, None);
        assert!(again.session_copy().await.privacy_acknowledged);
    }

    #[test]
    fn unusable_store_path_falls_back_to_memory() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let store = open_store(blocker.join("store.json").to_str().unwrap());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
