//! Data-driven scenario task bodies.
//!
//! A task body is a [`TaskScript`]: an ordered list of [`Op`]s consumed
//! one per scheduling quantum. The gap between two ops is the preemption
//! point — a higher-priority task made ready by one op runs before the
//! next op of its creator. Keeping bodies as data rather than closures is
//! what makes every interleaving reproducible.
//!
//! Each kernel-call op carries a label and an expectation; the outcome is
//! scored as one named sub-check against the task's bound case. When an
//! outcome contradicts its expectation the rest of that task's script is
//! cancelled, since later checkpoints depend on the failed setup.

use crate::kernel::Priority;
use rtxcheck_trace::{CaseId, TaskId};

/// One scheduling quantum's worth of task behavior.
#[derive(Debug, Clone)]
pub enum Op {
    /// Report the running task's identity to the trace recorder.
    Checkpoint,
    /// Create a task running `script` at `priority`.
    Spawn {
        priority: Priority,
        script: TaskScript,
        label: &'static str,
        expect_ok: bool,
    },
    /// Requeue behind same-priority peers.
    Yield,
    /// Terminate the task.
    Exit,
    /// Promote the task to the real-time band with the given period.
    RtSet {
        period: u64,
        label: &'static str,
        expect_ok: bool,
    },
    /// Query another task's real-time period.
    RtGet {
        target: TaskId,
        label: &'static str,
        expect_ok: bool,
    },
    /// Park a real-time task until its next period boundary.
    RtSuspend { label: &'static str, expect_ok: bool },
    /// Create the task's mailbox.
    MbxCreate {
        capacity: usize,
        label: &'static str,
        expect_ok: bool,
    },
    /// Non-blocking send into another task's mailbox.
    SendNb {
        to: TaskId,
        kind: u32,
        payload: Vec<u8>,
        label: &'static str,
        expect_ok: bool,
    },
    /// Non-blocking receive from the task's own mailbox.
    RecvNb { label: &'static str, expect_ok: bool },
    /// Reserve bytes from the kernel heap budget.
    Alloc {
        bytes: usize,
        label: &'static str,
        expect_ok: bool,
    },
    /// Release the task's buffer.
    Free { label: &'static str, expect_ok: bool },
    /// Busy-wait on the free-running timer. Occupies the whole scenario
    /// for its duration, exactly like the primitive it exercises.
    Spin { ms: u64 },
    /// Score the sequence recorded under `source` into `case`.
    Verify { case: CaseId, source: CaseId },
}

/// A task body: the case its checkpoints record into, plus its ops.
#[derive(Debug, Clone)]
pub struct TaskScript {
    case: CaseId,
    ops: Vec<Op>,
}

impl TaskScript {
    /// Start a script whose checkpoints and checks score into `case`.
    pub fn for_case(case: CaseId) -> Self {
        Self {
            case,
            ops: Vec::new(),
        }
    }

    pub fn case(&self) -> CaseId {
        self.case
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn checkpoint(self) -> Self {
        self.op(Op::Checkpoint)
    }

    pub fn spawn(
        self,
        priority: Priority,
        script: TaskScript,
        label: &'static str,
        expect_ok: bool,
    ) -> Self {
        self.op(Op::Spawn {
            priority,
            script,
            label,
            expect_ok,
        })
    }

    pub fn yield_now(self) -> Self {
        self.op(Op::Yield)
    }

    pub fn exit(self) -> Self {
        self.op(Op::Exit)
    }

    pub fn rt_set(self, period: u64, label: &'static str, expect_ok: bool) -> Self {
        self.op(Op::RtSet {
            period,
            label,
            expect_ok,
        })
    }

    pub fn rt_get(self, target: TaskId, label: &'static str, expect_ok: bool) -> Self {
        self.op(Op::RtGet {
            target,
            label,
            expect_ok,
        })
    }

    pub fn rt_suspend(self, label: &'static str, expect_ok: bool) -> Self {
        self.op(Op::RtSuspend { label, expect_ok })
    }

    pub fn mbx_create(self, capacity: usize, label: &'static str, expect_ok: bool) -> Self {
        self.op(Op::MbxCreate {
            capacity,
            label,
            expect_ok,
        })
    }

    pub fn send_nb(
        self,
        to: TaskId,
        kind: u32,
        payload: Vec<u8>,
        label: &'static str,
        expect_ok: bool,
    ) -> Self {
        self.op(Op::SendNb {
            to,
            kind,
            payload,
            label,
            expect_ok,
        })
    }

    pub fn recv_nb(self, label: &'static str, expect_ok: bool) -> Self {
        self.op(Op::RecvNb { label, expect_ok })
    }

    pub fn alloc(self, bytes: usize, label: &'static str, expect_ok: bool) -> Self {
        self.op(Op::Alloc {
            bytes,
            label,
            expect_ok,
        })
    }

    pub fn free(self, label: &'static str, expect_ok: bool) -> Self {
        self.op(Op::Free { label, expect_ok })
    }

    pub fn spin(self, ms: u64) -> Self {
        self.op(Op::Spin { ms })
    }

    pub fn verify(self, case: CaseId, source: CaseId) -> Self {
        self.op(Op::Verify { case, source })
    }
}
