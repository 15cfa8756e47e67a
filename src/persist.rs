//! Session persistence: best-effort restore, debounced autosave, purge, and the
//! one-time notice flags.
//!
//! Storage failures never reach the caller. They are logged under the `autosave`
//! target and the session keeps running without persistence.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::StorageCfg;
use crate::domain::{Assignment, PersistedSnapshot};
use crate::session::{Action, Session};
use crate::store::ScopedStore;

pub struct Persistence {
  store: Arc<dyn ScopedStore>,
  keys: StorageCfg,
  /// Purge generation. Held for the whole write or removal of the session record.
  generation: Mutex<u64>,
}

impl Persistence {
  pub fn new(store: Arc<dyn ScopedStore>, keys: StorageCfg) -> Self {
    Self { store, keys, generation: Mutex::new(0) }
  }

  fn record_lock(&self) -> MutexGuard<'_, u64> {
    self.generation.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Bumped by every `clear`. Writes tagged with an older value are dropped.
  pub fn generation(&self) -> u64 {
    *self.record_lock()
  }

  /// Read the session record. Each field falls back to its default on its own,
  /// so one damaged field does not discard the rest.
  #[instrument(level = "info", skip(self))]
  pub fn restore(&self) -> Option<PersistedSnapshot> {
    let raw = match self.store.get(&self.keys.session_key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(target: "autosave", error = %e, "Session restore failed; starting empty");
        return None;
      }
    };
    let snapshot = parse_snapshot(&raw);
    if let Some(s) = &snapshot {
      info!(target: "autosave",
        has_assignment = s.assignment.is_some(),
        answers = s.submission_data.len(),
        "Restored previous session");
    }
    snapshot
  }

  /// Write the snapshot now. Returns the saved-at stamp, or None when nothing was written.
  pub fn save(&self, snapshot: &PersistedSnapshot) -> Option<String> {
    let _record = self.record_lock();
    self.write_record(snapshot)
  }

  /// Like `save`, but only if no `clear` happened since `generation` was read.
  pub fn save_if_current(&self, generation: u64, snapshot: &PersistedSnapshot) -> Option<String> {
    let record = self.record_lock();
    if *record != generation {
      debug!(target: "autosave", scheduled = generation, current = *record, "Session was cleared; dropping stale autosave");
      return None;
    }
    self.write_record(snapshot)
  }

  fn write_record(&self, snapshot: &PersistedSnapshot) -> Option<String> {
    if !snapshot.has_content() {
      debug!(target: "autosave", "Nothing to save (no identity, no answers)");
      return None;
    }
    let saved_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let record = PersistedSnapshot { last_saved: Some(saved_at.clone()), ..snapshot.clone() };
    let body = match serde_json::to_string(&record) {
      Ok(b) => b,
      Err(e) => {
        warn!(target: "autosave", error = %e, "Cannot serialize session");
        return None;
      }
    };
    match self.store.set(&self.keys.session_key, &body) {
      Ok(()) => {
        debug!(target: "autosave", bytes = body.len(), %saved_at, "Session saved");
        Some(saved_at)
      }
      Err(e) => {
        warn!(target: "autosave", error = %e, "Session save failed; continuing without persistence");
        None
      }
    }
  }

  /// Remove the session record. Flags are kept.
  pub fn clear(&self) {
    let mut record = self.record_lock();
    *record += 1;
    match self.store.remove(&self.keys.session_key) {
      Ok(()) => info!(target: "autosave", "Session record purged"),
      Err(e) => warn!(target: "autosave", error = %e, "Session purge failed"),
    }
  }

  fn flag(&self, key: &str) -> bool {
    match self.store.get(key) {
      Ok(v) => v.as_deref() == Some("true"),
      Err(e) => {
        warn!(target: "autosave", %key, error = %e, "Flag read failed; treating as unset");
        false
      }
    }
  }

  fn set_flag(&self, key: &str) {
    if let Err(e) = self.store.set(key, "true") {
      warn!(target: "autosave", %key, error = %e, "Flag write failed");
    }
  }

  pub fn privacy_acknowledged(&self) -> bool {
    self.flag(&self.keys.privacy_key)
  }

  pub fn acknowledge_privacy(&self) {
    self.set_flag(&self.keys.privacy_key);
  }

  /// True exactly once per profile: the first caller gets to show the notice.
  pub fn take_export_notice(&self) -> bool {
    if self.flag(&self.keys.export_notice_key) {
      return false;
    }
    self.set_flag(&self.keys.export_notice_key);
    true
  }
}

fn field<T: DeserializeOwned + Default>(obj: &Map<String, Value>, key: &str) -> T {
  match obj.get(key) {
    None | Some(Value::Null) => T::default(),
    Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
      warn!(target: "autosave", %key, error = %e, "Ignoring unreadable field in saved session");
      T::default()
    }),
  }
}

fn parse_snapshot(raw: &str) -> Option<PersistedSnapshot> {
  let value: Value = match serde_json::from_str(raw) {
    Ok(v) => v,
    Err(e) => {
      warn!(target: "autosave", error = %e, "Saved session is not JSON; ignoring it");
      return None;
    }
  };
  let obj = value.as_object()?;
  Some(PersistedSnapshot {
    student_name: field(obj, "studentName"),
    student_id: field(obj, "studentId"),
    assignment: field::<Option<Assignment>>(obj, "assignment").filter(|a| {
      let ok = a.within_limits();
      if !ok {
        warn!(target: "autosave", "Saved assignment exceeds image limits; dropping it");
      }
      ok
    }),
    submission_data: field(obj, "submissionData"),
    last_saved: field(obj, "lastSaved"),
  })
}

/// Debounced writer. Each `schedule` cancels the pending write and starts a new
/// quiet-period timer; only the last snapshot of a burst is written.
pub struct Autosaver {
  persistence: Arc<Persistence>,
  session: Arc<RwLock<Session>>,
  debounce: Duration,
  pending: Mutex<Option<JoinHandle<()>>>,
}

impl Autosaver {
  pub fn new(persistence: Arc<Persistence>, session: Arc<RwLock<Session>>, debounce: Duration) -> Self {
    Self { persistence, session, debounce, pending: Mutex::new(None) }
  }

  pub fn schedule(self: &Arc<Self>, snapshot: PersistedSnapshot) {
    let this = Arc::clone(self);
    let generation = self.persistence.generation();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(this.debounce).await;
      this.write(Some(generation), snapshot).await;
    });
    let previous = match self.pending.lock() {
      Ok(mut slot) => slot.replace(handle),
      Err(_) => {
        warn!(target: "autosave", "Autosave slot poisoned; write proceeds without cancellation");
        None
      }
    };
    if let Some(prev) = previous {
      prev.abort();
    }
  }

  /// Drop any pending write without running it.
  pub fn cancel(&self) {
    if let Ok(mut slot) = self.pending.lock() {
      if let Some(prev) = slot.take() {
        prev.abort();
        debug!(target: "autosave", "Pending autosave cancelled");
      }
    }
  }

  /// Cancel the timer and purge the stored record. A write already past its timer
  /// finishes before the removal, or is dropped if it has not reached the store yet.
  pub fn purge(&self) {
    self.cancel();
    self.persistence.clear();
  }

  /// Write the current session immediately (shutdown path).
  pub async fn flush(&self) {
    self.cancel();
    let snapshot = self.session.read().await.snapshot();
    self.write(None, snapshot).await;
  }

  /// Store IO runs on the blocking pool. `generation` is None for writes that
  /// ignore purges (shutdown flush).
  async fn write(&self, generation: Option<u64>, snapshot: PersistedSnapshot) {
    let persistence = Arc::clone(&self.persistence);
    let saved = tokio::task::spawn_blocking(move || match generation {
      Some(g) => persistence.save_if_current(g, &snapshot),
      None => persistence.save(&snapshot),
    })
    .await;
    match saved {
      Ok(Some(saved_at)) => {
        let _ = self.session.write().await.apply(Action::MarkSaved(saved_at));
      }
      Ok(None) => {}
      Err(e) => warn!(target: "autosave", error = %e, "Autosave task failed"),
    }
  }
}
