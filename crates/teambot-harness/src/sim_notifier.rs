//! Notification bus that records instead of delivering.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory state only")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use teambot_core::{
    Application, Notifier, TeamId, TeambotError, TeambotKeyGeneration, TeambotNotification,
    UserId,
};

/// Records every notification sent through it. Clones share the log.
///
/// Tests drain the log and feed it to a [`teambot_core::NotificationHandler`]
/// to simulate delivery, or drop it to simulate loss.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<TeambotNotification>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything sent so far, oldest first.
    #[allow(clippy::expect_used)]
    pub fn sent(&self) -> Vec<TeambotNotification> {
        self.sent.lock().expect("RecordingNotifier mutex poisoned").clone()
    }

    /// Take everything sent so far.
    #[allow(clippy::expect_used)]
    pub fn drain(&self) -> Vec<TeambotNotification> {
        std::mem::take(&mut *self.sent.lock().expect("RecordingNotifier mutex poisoned"))
    }

    /// Generations requested through "key needed", in send order.
    pub fn needed_generations(&self) -> Vec<TeambotKeyGeneration> {
        self.sent()
            .into_iter()
            .filter_map(|notification| match notification {
                TeambotNotification::KeyNeeded { generation, .. } => Some(generation),
                TeambotNotification::KeyCreated { .. } => None,
            })
            .collect()
    }

    #[allow(clippy::expect_used)]
    fn record(&self, notification: TeambotNotification) -> Result<(), TeambotError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TeambotError::Transport("notification bus unavailable".to_string()));
        }
        self.sent.lock().expect("RecordingNotifier mutex poisoned").push(notification);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn key_needed(
        &self,
        team_id: TeamId,
        bot: UserId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(), TeambotError> {
        self.record(TeambotNotification::KeyNeeded { team_id, bot, application, generation })
    }

    async fn key_created(
        &self,
        team_id: TeamId,
        bot: UserId,
        application: Application,
        generation: TeambotKeyGeneration,
    ) -> Result<(), TeambotError> {
        self.record(TeambotNotification::KeyCreated { team_id, bot, application, generation })
    }
}
