//! Outbound message tracking
//!
//! [`PendingSet`] holds message IDs that are waiting for something (the
//! transport to report them sent, or the peer to acknowledge them) together
//! with the peer each was addressed to. [`ReplyBook`] holds replies until a
//! caller consumes them. Both wake blocked waiters on every change and on
//! close.

use crate::host::Uid;
use crate::message::Reply;
use crate::{CommError, MessageId, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Default)]
struct PendingState {
    ids: HashMap<MessageId, Uid>,
    closed: bool,
}

/// Message IDs awaiting an event, keyed to their destination peer
pub(crate) struct PendingSet {
    name: &'static str,
    state: Mutex<PendingState>,
    changed: Condvar,
}

impl PendingSet {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(PendingState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn insert(&self, id: MessageId, peer: Uid) {
        self.state.lock().ids.insert(id, peer);
    }

    pub fn remove(&self, id: MessageId) -> Option<Uid> {
        let removed = self.state.lock().ids.remove(&id);
        if removed.is_some() {
            self.changed.notify_all();
        }
        removed
    }

    /// Remove `id` only if it was addressed to `peer`
    pub fn remove_from(&self, id: MessageId, peer: Uid) -> bool {
        let mut state = self.state.lock();
        match state.ids.get(&id) {
            Some(expected) if *expected == peer => {
                state.ids.remove(&id);
                drop(state);
                self.changed.notify_all();
                true
            }
            Some(expected) => {
                warn!(
                    set = self.name,
                    message_id = id,
                    expected = %expected,
                    actual = %peer,
                    "Ignoring clearance from wrong peer"
                );
                false
            }
            None => false,
        }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.state.lock().ids.contains_key(&id)
    }

    pub fn contains_any(&self, ids: &[MessageId]) -> bool {
        let state = self.state.lock();
        ids.iter().any(|id| state.ids.contains_key(id))
    }

    pub fn len(&self) -> usize {
        self.state.lock().ids.len()
    }

    /// Block until `id` is cleared. Fails if the set is closed first.
    pub fn wait_cleared(&self, id: MessageId) -> Result<()> {
        let mut state = self.state.lock();
        while state.ids.contains_key(&id) {
            if state.closed {
                return Err(CommError::Closed);
            }
            self.changed.wait(&mut state);
        }
        Ok(())
    }

    /// Like [`wait_cleared`](Self::wait_cleared) but gives up at the deadline
    pub fn wait_cleared_for(&self, id: MessageId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.ids.contains_key(&id) {
            if state.closed {
                return false;
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return !state.ids.contains_key(&id);
            }
        }
        true
    }

    /// Wake every waiter and fail their waits from now on
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }
}

#[derive(Default)]
struct ReplyState {
    replies: HashMap<(Uid, MessageId), Reply>,
    closed: bool,
}

/// Replies keyed by verified sender and the ID of the message they answer.
///
/// Keying by sender keeps a reply from one peer from displacing an
/// unconsumed reply from another that carries the same ID.
pub(crate) struct ReplyBook {
    state: Mutex<ReplyState>,
    arrived: Condvar,
}

impl ReplyBook {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ReplyState::default()),
            arrived: Condvar::new(),
        }
    }

    /// Store a reply and wake every waiter
    pub fn post(&self, id: MessageId, reply: Reply) {
        let sender = reply.sender();
        let replaced = self.state.lock().replies.insert((sender, id), reply);
        if replaced.is_some() {
            warn!(message_id = id, sender = %sender, "Duplicate reply replaced an unconsumed one");
        }
        self.arrived.notify_all();
    }

    /// Consume the reply to `id` from `host`.
    ///
    /// `None` deadline waits forever and fails with `Closed` when the book
    /// closes. A timed wait returns `Ok(None)` on deadline or close. When
    /// only other senders have answered `id` their replies are left in place
    /// and the call reports a signature mismatch.
    pub fn take(&self, host: Uid, id: MessageId, deadline: Option<Instant>) -> Result<Option<Reply>> {
        let mut state = self.state.lock();
        loop {
            if let Some(reply) = state.replies.remove(&(host, id)) {
                return Ok(Some(reply));
            }
            if let Some((actual, _)) = state.replies.keys().find(|(_, answered)| *answered == id) {
                return Err(CommError::SignatureMismatch {
                    expected: host,
                    actual: *actual,
                    message_id: id,
                });
            }
            if state.closed {
                return match deadline {
                    Some(_) => Ok(None),
                    None => Err(CommError::Closed),
                };
            }
            match deadline {
                None => self.arrived.wait(&mut state),
                Some(deadline) => {
                    if self.arrived.wait_until(&mut state, deadline).timed_out()
                        && !state.replies.contains_key(&(host, id))
                    {
                        return Ok(None);
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().replies.len()
    }

    pub fn close(&self) {
        self.state.lock().closed = true;
        self.arrived.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_pending_insert_remove() {
        let set = PendingSet::new("test");
        let peer = Uid::generate();

        set.insert(5, peer);
        assert!(set.contains(5));
        assert!(set.contains_any(&[1, 5]));
        assert_eq!(set.remove(5), Some(peer));
        assert!(!set.contains(5));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn test_remove_from_checks_peer() {
        let set = PendingSet::new("test");
        let peer = Uid::generate();
        set.insert(9, peer);

        assert!(!set.remove_from(9, Uid::generate()));
        assert!(set.contains(9));
        assert!(set.remove_from(9, peer));
        assert!(!set.contains(9));
    }

    #[test]
    fn test_wait_returns_immediately_when_absent() {
        let set = PendingSet::new("test");
        assert!(set.wait_cleared(77).is_ok());
        assert!(set.wait_cleared_for(77, Duration::ZERO));
    }

    #[test]
    fn test_wait_times_out() {
        let set = PendingSet::new("test");
        set.insert(1, Uid::generate());
        assert!(!set.wait_cleared_for(1, Duration::from_millis(20)));
    }

    #[test]
    fn test_wait_woken_by_removal() {
        let set = Arc::new(PendingSet::new("test"));
        set.insert(3, Uid::generate());

        let waiter = {
            let set = set.clone();
            thread::spawn(move || set.wait_cleared_for(3, Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        set.remove(3);

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_close_releases_waiters() {
        let set = Arc::new(PendingSet::new("test"));
        set.insert(4, Uid::generate());

        let waiter = {
            let set = set.clone();
            thread::spawn(move || set.wait_cleared(4))
        };
        thread::sleep(Duration::from_millis(20));
        set.close();

        assert!(matches!(waiter.join().unwrap(), Err(CommError::Closed)));
    }

    #[test]
    fn test_reply_consumed_once() {
        let book = ReplyBook::new();
        let host = Uid::generate();
        book.post(10, Reply::ok(host, 10, b"done".to_vec()));

        let reply = book.take(host, 10, None).unwrap().unwrap();
        assert_eq!(reply.contents(), b"done");

        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(book.take(host, 10, Some(deadline)).unwrap().is_none());
    }

    #[test]
    fn test_reply_mismatch_left_in_place() {
        let book = ReplyBook::new();
        let host = Uid::generate();
        let other = Uid::generate();
        book.post(11, Reply::ok(host, 11, vec![]));

        assert!(matches!(
            book.take(other, 11, None),
            Err(CommError::SignatureMismatch { .. })
        ));
        assert_eq!(book.len(), 1);
        assert!(book.take(host, 11, None).unwrap().is_some());
    }

    #[test]
    fn test_reply_from_other_sender_does_not_displace() {
        let book = ReplyBook::new();
        let host = Uid::generate();
        let spoofer = Uid::generate();
        book.post(13, Reply::ok(host, 13, b"ok".to_vec()));
        book.post(13, Reply::ok(spoofer, 13, b"evil".to_vec()));

        assert_eq!(book.len(), 2);
        let reply = book.take(host, 13, None).unwrap().unwrap();
        assert_eq!(reply.contents(), b"ok");
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_timed_reply_wait_after_close() {
        let book = ReplyBook::new();
        book.close();

        let deadline = Instant::now() + Duration::from_secs(5);
        assert!(book.take(Uid::generate(), 14, Some(deadline)).unwrap().is_none());
        assert!(matches!(
            book.take(Uid::generate(), 14, None),
            Err(CommError::Closed)
        ));
    }

    #[test]
    fn test_reply_wakes_waiter() {
        let book = Arc::new(ReplyBook::new());
        let host = Uid::generate();

        let waiter = {
            let book = book.clone();
            thread::spawn(move || book.take(host, 12, None))
        };
        thread::sleep(Duration::from_millis(20));
        book.post(12, Reply::error(host, 12, b"boom".to_vec()));

        let reply = waiter.join().unwrap().unwrap().unwrap();
        assert!(reply.is_error());
    }
}
