//! The kernel service contract consumed by scenario scripts.
//!
//! The oracle only observes return codes and side effects of these
//! services; it implements none of them. [`crate::sim::SimKernel`] is the
//! in-process stand-in used to exercise scenarios, and a port binding the
//! oracle to real hardware replaces that simulator while keeping this
//! contract.
//!
//! All mailbox operations are non-blocking: a send into a full mailbox
//! and a receive from an empty one fail immediately instead of waiting.

use rtxcheck_trace::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capacity of the task table.
pub const MAX_TASKS: usize = 16;

/// Wire overhead of one message: length, kind, and sender fields.
pub const MSG_HEADER_BYTES: usize = 12;

/// Message kind used when a scenario has nothing more specific to say.
pub const MSG_KIND_DEFAULT: u32 = 0;

/// Scheduling priority of a plain task.
///
/// Real-time tasks live above every priority level and are reached only
/// through promotion, never at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Lowest,
    Low,
    Medium,
    High,
}

impl Priority {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Failure codes of the kernel services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("task table is full ({MAX_TASKS} tasks)")]
    TaskLimit,

    #[error("task {0} does not exist")]
    NoSuchTask(TaskId),

    #[error("task {0} has no mailbox")]
    NoMailbox(TaskId),

    #[error("calling task already owns a mailbox")]
    MailboxExists,

    #[error("mailbox capacity of {0} bytes cannot hold a message header")]
    InvalidCapacity(usize),

    #[error("mailbox is full")]
    MailboxFull,

    #[error("mailbox is empty")]
    MailboxEmpty,

    #[error("message of {size} bytes exceeds the mailbox capacity of {capacity}")]
    MessageTooLarge { size: usize, capacity: usize },

    #[error("allocation of {0} bytes exceeds the remaining heap budget")]
    OutOfMemory(usize),

    #[error("calling task already holds a buffer")]
    BufferHeld,

    #[error("calling task holds no buffer")]
    NothingAllocated,

    #[error("calling task is not real-time")]
    NotRealTime,

    #[error("task is already real-time")]
    AlreadyRealTime,

    #[error("real-time period must be non-zero")]
    InvalidPeriod,
}

/// One mailbox message: a header plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: TaskId,
    pub kind: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(sender: TaskId, kind: u32, payload: Vec<u8>) -> Self {
        Self {
            sender,
            kind,
            payload,
        }
    }

    /// Bytes this message occupies in a mailbox.
    pub fn wire_size(&self) -> usize {
        MSG_HEADER_BYTES + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Lowest < Priority::Low);
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert_eq!(Priority::Lowest.index(), 0);
        assert_eq!(Priority::High.index(), Priority::COUNT - 1);
    }

    #[test]
    fn wire_size_includes_header() {
        let msg = Message::new(TaskId(1), MSG_KIND_DEFAULT, vec![0; 5]);
        assert_eq!(msg.wire_size(), MSG_HEADER_BYTES + 5);
    }
}
