//! Notification channels between the database layer and its subscribers
//!
//! A [`Signal`] is a list of receivers keyed by a dispatch uid. Connecting a
//! second receiver under a uid that is already present is a no-op, so setup
//! code can run more than once without stacking duplicate receivers.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::connection::Connection;
use crate::settings::Settings;

/// Receiver for "connection created": runs each time a connection opens
pub type ConnectionReceiver = dyn Fn(&Connection) + Send + Sync;

/// Receiver for "setting changed": runs with the store and the changed key
pub type SettingReceiver = dyn Fn(&Settings, &str) + Send + Sync;

/// Receiver registry for one kind of notification
pub struct Signal<F: ?Sized> {
    receivers: RwLock<Vec<(&'static str, Arc<F>)>>,
}

impl<F: ?Sized> Signal<F> {
    pub fn new() -> Self {
        Self {
            receivers: RwLock::new(Vec::new()),
        }
    }

    /// Register `receiver` under `dispatch_uid`
    ///
    /// Returns `false` and keeps the existing receiver when the uid is
    /// already connected.
    pub fn connect(&self, dispatch_uid: &'static str, receiver: Arc<F>) -> bool {
        let mut receivers = self.receivers.write();
        if receivers.iter().any(|(uid, _)| *uid == dispatch_uid) {
            log::debug!("Receiver '{}' already connected", dispatch_uid);
            return false;
        }
        receivers.push((dispatch_uid, receiver));
        true
    }

    /// Remove the receiver registered under `dispatch_uid`
    #[cfg(test)]
    pub(crate) fn disconnect(&self, dispatch_uid: &str) -> bool {
        let mut receivers = self.receivers.write();
        let before = receivers.len();
        receivers.retain(|(uid, _)| *uid != dispatch_uid);
        receivers.len() != before
    }

    /// Snapshot of the connected receivers, in connection order
    ///
    /// Senders call receivers from the snapshot so a receiver can itself
    /// connect without deadlocking.
    pub fn receivers(&self) -> Vec<Arc<F>> {
        self.receivers
            .read()
            .iter()
            .map(|(_, receiver)| Arc::clone(receiver))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.receivers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.read().is_empty()
    }
}

impl<F: ?Sized> Default for Signal<F> {
    fn default() -> Self {
        Self::new()
    }
}
