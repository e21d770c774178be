//! Scripted transport for tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use super::{Terminator, Transport};
use crate::error::{DecodeError, MountError, MountResult};

#[derive(Debug)]
enum Scripted {
    Bytes(Vec<u8>),
    Timeout,
}

#[derive(Debug, Default)]
struct MockState {
    replies: VecDeque<Scripted>,
    writes: Vec<Vec<u8>>,
}

/// Records every write and replays queued replies in order.
///
/// Each `read_until` consumes one queued entry, whatever the terminator.
/// An empty queue behaves like a silent mount. Clones share the script, so a
/// test keeps a handle after moving one into a session.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes for the next read.
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.inner
            .borrow_mut()
            .replies
            .push_back(Scripted::Bytes(bytes.to_vec()));
    }

    /// Make the next read time out.
    pub fn queue_timeout(&self) {
        self.inner.borrow_mut().replies.push_back(Scripted::Timeout);
    }

    /// Every write so far, oldest first.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.borrow().writes.clone()
    }

    /// Writes so far, clearing the record.
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.inner.borrow_mut().writes)
    }

    pub fn pending_replies(&self) -> usize {
        self.inner.borrow().replies.len()
    }
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> MountResult<usize> {
        self.inner.borrow_mut().writes.push(bytes.to_vec());
        Ok(bytes.len())
    }

    fn read_until(&mut self, terminator: Terminator, _timeout: Duration) -> MountResult<Vec<u8>> {
        match self.inner.borrow_mut().replies.pop_front() {
            None | Some(Scripted::Timeout) => Err(MountError::TransportTimeout),
            Some(Scripted::Bytes(bytes)) => {
                let complete = match terminator {
                    Terminator::Byte(end) => bytes.last() == Some(&end),
                    Terminator::Count(n) => bytes.len() == n,
                };
                if complete {
                    Ok(bytes)
                } else {
                    Err(DecodeError::malformed("truncated reply", &bytes).into())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replays_in_order() {
        let mut mock = MockTransport::new();
        mock.queue_reply(b"A#");
        mock.queue_reply(b"B#");

        let first = mock.read_until(Terminator::Byte(b'#'), Duration::ZERO).unwrap();
        let second = mock.read_until(Terminator::Byte(b'#'), Duration::ZERO).unwrap();
        assert_eq!(first, b"A#");
        assert_eq!(second, b"B#");
        assert!(mock.read_until(Terminator::Byte(b'#'), Duration::ZERO).is_err());
    }

    #[test]
    fn test_wrong_length_is_malformed() {
        let mut mock = MockTransport::new();
        mock.queue_reply(b"0");
        let err = mock.read_until(Terminator::Count(2), Duration::ZERO).unwrap_err();
        assert!(matches!(err, MountError::Decode(_)));
    }

    #[test]
    fn test_take_writes_clears() {
        let mut mock = MockTransport::new();
        mock.write(b"L").unwrap();
        assert_eq!(mock.take_writes(), vec![b"L".to_vec()]);
        assert!(mock.writes().is_empty());
    }
}
