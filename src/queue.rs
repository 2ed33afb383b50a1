//! Two-tier request queue.
//!
//! Producers on any thread push into the high or normal tier; the single
//! consumer pops high-priority requests first and keeps FIFO order inside a
//! tier. Both tiers are crossbeam channels, so pushing never blocks on the
//! consumer.

use crate::error::{Result, SonarchError};
use crate::pool::PoolBlock;
use crate::request::{AudioRequest, RequestInfo};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};

/// A request waiting in the queue.
#[derive(Debug)]
pub(crate) struct QueuedRequest {
    pub request: AudioRequest,
    /// Pool memory charged for the request while it waits
    pub pool_block: Option<PoolBlock>,
    /// Wakes the blocked pusher once the request was executed
    pub completion: Option<Sender<RequestInfo>>,
}

impl QueuedRequest {
    pub fn new(request: AudioRequest) -> Self {
        Self {
            request,
            pool_block: None,
            completion: None,
        }
    }
}

pub(crate) struct RequestQueue {
    high_sender: Sender<QueuedRequest>,
    high_receiver: Receiver<QueuedRequest>,
    normal_sender: Sender<QueuedRequest>,
    normal_receiver: Receiver<QueuedRequest>,
    backlog_warning_threshold: usize,
    backlog_reported: AtomicBool,
}

impl RequestQueue {
    pub fn new(max_depth: Option<usize>, backlog_warning_threshold: usize) -> Self {
        let (high_sender, high_receiver) = channel(max_depth);
        let (normal_sender, normal_receiver) = channel(max_depth);
        Self {
            high_sender,
            high_receiver,
            normal_sender,
            normal_receiver,
            backlog_warning_threshold,
            backlog_reported: AtomicBool::new(false),
        }
    }

    pub fn push(&self, queued: QueuedRequest) -> Result<()> {
        let (sender, tier) = if queued.request.flags.is_high_priority() {
            (&self.high_sender, "high")
        } else {
            (&self.normal_sender, "normal")
        };

        sender.try_send(queued).map_err(|e| match e {
            TrySendError::Full(rejected) => {
                log::error!(
                    "Dropping {} request: {} priority queue is full",
                    rejected.request.kind().name,
                    tier
                );
                SonarchError::QueueFull(format!("{} priority tier is full", tier))
            }
            TrySendError::Disconnected(_) => {
                SonarchError::Disconnected("request queue closed".into())
            }
        })?;

        self.check_backlog();
        Ok(())
    }

    /// Next request to execute: high tier first.
    pub fn pop(&self) -> Option<QueuedRequest> {
        self.high_receiver
            .try_recv()
            .or_else(|_| self.normal_receiver.try_recv())
            .ok()
    }

    pub fn len(&self) -> usize {
        self.high_receiver.len() + self.normal_receiver.len()
    }

    pub fn high_len(&self) -> usize {
        self.high_receiver.len()
    }

    pub fn normal_len(&self) -> usize {
        self.normal_receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_backlog(&self) {
        let pending = self.len();
        if pending > self.backlog_warning_threshold {
            if !self.backlog_reported.swap(true, Ordering::Relaxed) {
                log::warn!(
                    "Audio request backlog is growing: {} requests pending (threshold {})",
                    pending,
                    self.backlog_warning_threshold
                );
            }
        } else if pending < self.backlog_warning_threshold / 2 {
            self.backlog_reported.store(false, Ordering::Relaxed);
        }
    }
}

fn channel(max_depth: Option<usize>) -> (Sender<QueuedRequest>, Receiver<QueuedRequest>) {
    match max_depth {
        Some(depth) => crossbeam_channel::bounded(depth),
        None => crossbeam_channel::unbounded(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ManagerRequest, ObjectRequest};

    fn normal(volume: f32) -> QueuedRequest {
        QueuedRequest::new(AudioRequest::global(ObjectRequest::SetVolume { volume }))
    }

    fn volume_of(queued: &QueuedRequest) -> Option<f32> {
        match &queued.request.payload {
            crate::request::RequestPayload::Object(ObjectRequest::SetVolume { volume }) => {
                Some(*volume)
            }
            _ => None,
        }
    }

    #[test]
    fn test_high_priority_pops_first_fifo_within_tier() {
        let queue = RequestQueue::new(None, 100);
        queue.push(normal(1.0)).unwrap();
        queue.push(normal(2.0)).unwrap();
        queue
            .push(QueuedRequest::new(
                AudioRequest::manager(ManagerRequest::LoseFocus).high_priority(),
            ))
            .unwrap();
        queue
            .push(QueuedRequest::new(
                AudioRequest::manager(ManagerRequest::GetFocus).high_priority(),
            ))
            .unwrap();

        assert_eq!(queue.high_len(), 2);
        assert_eq!(queue.pop().unwrap().request.kind().name, "LoseFocus");
        assert_eq!(queue.pop().unwrap().request.kind().name, "GetFocus");
        assert_eq!(volume_of(&queue.pop().unwrap()), Some(1.0));
        assert_eq!(volume_of(&queue.pop().unwrap()), Some(2.0));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_bounded_tier_rejects_when_full() {
        let queue = RequestQueue::new(Some(1), 100);
        queue.push(normal(1.0)).unwrap();
        assert!(matches!(
            queue.push(normal(2.0)),
            Err(SonarchError::QueueFull(_))
        ));

        // The other tier still has room.
        queue
            .push(QueuedRequest::new(
                AudioRequest::manager(ManagerRequest::MuteAll).high_priority(),
            ))
            .unwrap();
        assert_eq!(queue.len(), 2);
    }
}
