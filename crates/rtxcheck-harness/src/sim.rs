//! Deterministic single-core kernel simulator.
//!
//! [`SimKernel`] stands in for the preemptive kernel under test: strict
//! priority scheduling with FIFO order inside each priority level, a
//! real-time band above all priorities with period-based suspension on a
//! virtual clock, non-blocking bounded mailboxes, and a fixed heap budget.
//! One scheduling quantum executes one script op; the simulator advances
//! its virtual clock once per quantum, so every run with the same scripts
//! produces the same interleaving.
//!
//! Only one task "executes" at a time and each op runs to completion
//! before the next scheduling decision, which is precisely the
//! single-core, run-to-completion-between-preemptions platform the trace
//! recorder assumes.

use crate::kernel::{KernelError, Message, Priority, MAX_TASKS, MSG_HEADER_BYTES};
use crate::script::{Op, TaskScript};
use log::debug;
use rtxcheck_trace::{CaseId, TaskId};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Ready,
    Suspended,
    Exited,
}

#[derive(Debug)]
struct Mailbox {
    capacity: usize,
    used: usize,
    queue: VecDeque<Message>,
}

#[derive(Debug)]
struct Task {
    priority: Priority,
    rt_period: Option<u64>,
    state: TaskState,
    script: TaskScript,
    pc: usize,
    mailbox: Option<Mailbox>,
    buffer: Option<usize>,
}

/// The simulated kernel. See the module docs for the scheduling model.
#[derive(Debug)]
pub struct SimKernel {
    tasks: Vec<Task>,
    rt_queue: VecDeque<TaskId>,
    ready: [VecDeque<TaskId>; Priority::COUNT],
    /// `(wake_at, tid)` pairs for parked real-time tasks.
    suspended: Vec<(u64, TaskId)>,
    clock: u64,
    heap_remaining: usize,
}

impl SimKernel {
    pub fn new(heap_bytes: usize) -> Self {
        Self {
            tasks: Vec::new(),
            rt_queue: VecDeque::new(),
            ready: Default::default(),
            suspended: Vec::new(),
            clock: 0,
            heap_remaining: heap_bytes,
        }
    }

    /// Current virtual time, in quanta since the run began.
    pub fn now(&self) -> u64 {
        self.clock
    }

    fn task(&self, tid: TaskId) -> &Task {
        &self.tasks[usize::from(tid.0) - 1]
    }

    fn task_mut(&mut self, tid: TaskId) -> &mut Task {
        &mut self.tasks[usize::from(tid.0) - 1]
    }

    fn try_task_mut(&mut self, tid: TaskId) -> Option<&mut Task> {
        let index = usize::from(tid.0).checked_sub(1)?;
        self.tasks.get_mut(index).filter(|t| t.state != TaskState::Exited)
    }

    // ═══════════════════════════════════════════════════════════════
    //  Scheduling
    // ═══════════════════════════════════════════════════════════════

    /// Advance the clock one quantum and choose the task to run it.
    ///
    /// Due real-time tasks are woken before the pick, in `(wake_at, tid)`
    /// order. When every runnable task is parked, the clock fast-forwards
    /// to the earliest wake time instead of idling quantum by quantum.
    /// Returns `None` once no task can ever run again.
    pub fn schedule(&mut self) -> Option<TaskId> {
        loop {
            self.clock += 1;
            self.wake_due();
            if let Some(tid) = self.pick() {
                return Some(tid);
            }
            let next_wake = self.suspended.iter().map(|&(at, _)| at).min()?;
            self.clock = self.clock.max(next_wake - 1);
        }
    }

    fn wake_due(&mut self) {
        if self.suspended.is_empty() {
            return;
        }
        self.suspended.sort_unstable();
        while let Some(&(wake_at, tid)) = self.suspended.first() {
            if wake_at > self.clock {
                break;
            }
            self.suspended.remove(0);
            self.task_mut(tid).state = TaskState::Ready;
            self.rt_queue.push_back(tid);
            debug!("TID {tid} woken at t={}", self.clock);
        }
    }

    fn pick(&self) -> Option<TaskId> {
        if let Some(&tid) = self.rt_queue.front() {
            return Some(tid);
        }
        self.ready.iter().rev().find_map(|q| q.front().copied())
    }

    /// Next op of the task's script, advancing its cursor.
    pub fn fetch_op(&mut self, tid: TaskId) -> Option<Op> {
        let task = self.task_mut(tid);
        let op = task.script.ops().get(task.pc).cloned();
        task.pc += 1;
        op
    }

    /// Drop the remainder of a task's script after a failed setup check.
    pub fn cancel(&mut self, tid: TaskId) {
        let task = self.task_mut(tid);
        task.pc = task.script.ops().len();
        debug!("TID {tid} script cancelled");
    }

    /// The case the task's checkpoints record into.
    pub fn case_of(&self, tid: TaskId) -> CaseId {
        self.task(tid).script.case()
    }

    fn queue_of_mut(&mut self, tid: TaskId) -> &mut VecDeque<TaskId> {
        if self.task(tid).rt_period.is_some() {
            &mut self.rt_queue
        } else {
            let index = self.task(tid).priority.index();
            &mut self.ready[index]
        }
    }

    fn remove_from_queues(&mut self, tid: TaskId) {
        self.rt_queue.retain(|&t| t != tid);
        for queue in &mut self.ready {
            queue.retain(|&t| t != tid);
        }
    }

    // ═══════════════════════════════════════════════════════════════
    //  Services
    // ═══════════════════════════════════════════════════════════════

    /// Create a task. It becomes runnable immediately and preempts lower
    /// priorities at the next quantum.
    pub fn spawn(&mut self, script: TaskScript, priority: Priority) -> Result<TaskId, KernelError> {
        if self.tasks.len() >= MAX_TASKS {
            return Err(KernelError::TaskLimit);
        }
        let tid = TaskId((self.tasks.len() + 1) as u8);
        self.tasks.push(Task {
            priority,
            rt_period: None,
            state: TaskState::Ready,
            script,
            pc: 0,
            mailbox: None,
            buffer: None,
        });
        self.ready[priority.index()].push_back(tid);
        debug!("TID {tid} spawned at {priority:?}");
        Ok(tid)
    }

    /// Requeue the caller behind its same-priority peers.
    pub fn yield_now(&mut self, tid: TaskId) {
        let queue = self.queue_of_mut(tid);
        if queue.len() > 1 && queue.front() == Some(&tid) {
            queue.rotate_left(1);
        }
    }

    /// Terminate the caller. Its mailbox and buffer die with it.
    pub fn exit(&mut self, tid: TaskId) {
        self.remove_from_queues(tid);
        let task = self.task_mut(tid);
        task.state = TaskState::Exited;
        task.pc = task.script.ops().len();
        if let Some(bytes) = task.buffer.take() {
            self.heap_remaining += bytes;
        }
        debug!("TID {tid} exited");
    }

    /// Promote the caller into the real-time band.
    pub fn rt_set(&mut self, tid: TaskId, period: u64) -> Result<(), KernelError> {
        if period == 0 {
            return Err(KernelError::InvalidPeriod);
        }
        if self.task(tid).rt_period.is_some() {
            return Err(KernelError::AlreadyRealTime);
        }
        let index = self.task(tid).priority.index();
        self.ready[index].retain(|&t| t != tid);
        self.rt_queue.push_back(tid);
        self.task_mut(tid).rt_period = Some(period);
        debug!("TID {tid} promoted to real-time, period {period}");
        Ok(())
    }

    /// Real-time period of `target`.
    pub fn rt_get(&mut self, target: TaskId) -> Result<u64, KernelError> {
        let task = self
            .try_task_mut(target)
            .ok_or(KernelError::NoSuchTask(target))?;
        task.rt_period.ok_or(KernelError::NotRealTime)
    }

    /// Park the caller until its next period boundary.
    pub fn rt_suspend(&mut self, tid: TaskId) -> Result<(), KernelError> {
        let period = self.task(tid).rt_period.ok_or(KernelError::NotRealTime)?;
        self.remove_from_queues(tid);
        self.task_mut(tid).state = TaskState::Suspended;
        self.suspended.push((self.clock + period, tid));
        debug!("TID {tid} suspended until t={}", self.clock + period);
        Ok(())
    }

    /// Create the caller's mailbox with a byte capacity.
    pub fn mbx_create(&mut self, tid: TaskId, capacity: usize) -> Result<(), KernelError> {
        if capacity < MSG_HEADER_BYTES {
            return Err(KernelError::InvalidCapacity(capacity));
        }
        let task = self.task_mut(tid);
        if task.mailbox.is_some() {
            return Err(KernelError::MailboxExists);
        }
        task.mailbox = Some(Mailbox {
            capacity,
            used: 0,
            queue: VecDeque::new(),
        });
        Ok(())
    }

    /// Non-blocking send into `to`'s mailbox.
    pub fn send_nb(
        &mut self,
        from: TaskId,
        to: TaskId,
        kind: u32,
        payload: Vec<u8>,
    ) -> Result<(), KernelError> {
        let msg = Message::new(from, kind, payload);
        let size = msg.wire_size();
        let target = self.try_task_mut(to).ok_or(KernelError::NoSuchTask(to))?;
        let mailbox = target.mailbox.as_mut().ok_or(KernelError::NoMailbox(to))?;
        if size > mailbox.capacity {
            return Err(KernelError::MessageTooLarge {
                size,
                capacity: mailbox.capacity,
            });
        }
        if mailbox.used + size > mailbox.capacity {
            return Err(KernelError::MailboxFull);
        }
        mailbox.used += size;
        mailbox.queue.push_back(msg);
        Ok(())
    }

    /// Non-blocking receive from the caller's mailbox.
    pub fn recv_nb(&mut self, tid: TaskId) -> Result<Message, KernelError> {
        let task = self.task_mut(tid);
        let mailbox = task.mailbox.as_mut().ok_or(KernelError::NoMailbox(tid))?;
        let msg = mailbox.queue.pop_front().ok_or(KernelError::MailboxEmpty)?;
        mailbox.used -= msg.wire_size();
        Ok(msg)
    }

    /// Reserve bytes from the heap budget. One outstanding buffer per
    /// task.
    pub fn alloc(&mut self, tid: TaskId, bytes: usize) -> Result<(), KernelError> {
        if self.task(tid).buffer.is_some() {
            return Err(KernelError::BufferHeld);
        }
        if bytes > self.heap_remaining {
            return Err(KernelError::OutOfMemory(bytes));
        }
        self.heap_remaining -= bytes;
        self.task_mut(tid).buffer = Some(bytes);
        Ok(())
    }

    /// Release the caller's buffer back to the budget.
    pub fn free(&mut self, tid: TaskId) -> Result<(), KernelError> {
        let bytes = self
            .task_mut(tid)
            .buffer
            .take()
            .ok_or(KernelError::NothingAllocated)?;
        self.heap_remaining += bytes;
        Ok(())
    }

    pub fn heap_remaining(&self) -> usize {
        self.heap_remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::MSG_KIND_DEFAULT;

    fn idle_script() -> TaskScript {
        TaskScript::for_case(0)
    }

    fn kernel_with(priorities: &[Priority]) -> (SimKernel, Vec<TaskId>) {
        let mut kernel = SimKernel::new(1024);
        let tids = priorities
            .iter()
            .map(|&p| kernel.spawn(idle_script(), p).unwrap())
            .collect();
        (kernel, tids)
    }

    #[test]
    fn spawn_assigns_sequential_tids() {
        let (_, tids) = kernel_with(&[Priority::High, Priority::Low]);
        assert_eq!(tids, vec![TaskId(1), TaskId(2)]);
    }

    #[test]
    fn spawn_rejects_overflow() {
        let mut kernel = SimKernel::new(0);
        for _ in 0..MAX_TASKS {
            kernel.spawn(idle_script(), Priority::Low).unwrap();
        }
        assert_eq!(
            kernel.spawn(idle_script(), Priority::Low),
            Err(KernelError::TaskLimit)
        );
    }

    #[test]
    fn higher_priority_runs_first() {
        let (mut kernel, tids) = kernel_with(&[Priority::Medium, Priority::High]);
        assert_eq!(kernel.schedule(), Some(tids[1]));
        kernel.exit(tids[1]);
        assert_eq!(kernel.schedule(), Some(tids[0]));
    }

    #[test]
    fn chosen_task_keeps_running_until_displaced() {
        let (mut kernel, tids) = kernel_with(&[Priority::High, Priority::High]);
        assert_eq!(kernel.schedule(), Some(tids[0]));
        assert_eq!(kernel.schedule(), Some(tids[0]));
    }

    #[test]
    fn yield_rotates_same_priority_peers() {
        let (mut kernel, tids) = kernel_with(&[Priority::High, Priority::High]);
        assert_eq!(kernel.schedule(), Some(tids[0]));
        kernel.yield_now(tids[0]);
        assert_eq!(kernel.schedule(), Some(tids[1]));
        kernel.yield_now(tids[1]);
        assert_eq!(kernel.schedule(), Some(tids[0]));
    }

    #[test]
    fn yield_without_peers_is_noop() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        kernel.yield_now(tids[0]);
        assert_eq!(kernel.schedule(), Some(tids[0]));
    }

    #[test]
    fn real_time_band_outranks_every_priority() {
        let (mut kernel, tids) = kernel_with(&[Priority::Lowest, Priority::High]);
        kernel.rt_set(tids[0], 4).unwrap();
        assert_eq!(kernel.schedule(), Some(tids[0]));
    }

    #[test]
    fn rt_set_validates_period_and_state() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        assert_eq!(kernel.rt_set(tids[0], 0), Err(KernelError::InvalidPeriod));
        kernel.rt_set(tids[0], 2).unwrap();
        assert_eq!(kernel.rt_set(tids[0], 2), Err(KernelError::AlreadyRealTime));
        assert_eq!(kernel.rt_get(tids[0]), Ok(2));
    }

    #[test]
    fn rt_get_rejects_plain_and_unknown_tasks() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        assert_eq!(kernel.rt_get(tids[0]), Err(KernelError::NotRealTime));
        assert_eq!(
            kernel.rt_get(TaskId(9)),
            Err(KernelError::NoSuchTask(TaskId(9)))
        );
    }

    #[test]
    fn rt_suspend_requires_promotion() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        assert_eq!(kernel.rt_suspend(tids[0]), Err(KernelError::NotRealTime));
    }

    #[test]
    fn rt_suspend_wakes_after_period() {
        let (mut kernel, tids) = kernel_with(&[Priority::High, Priority::Low]);
        kernel.rt_set(tids[0], 3).unwrap();
        assert_eq!(kernel.schedule(), Some(tids[0]));
        kernel.rt_suspend(tids[0]).unwrap();
        // the low-priority task fills the gap until the wake boundary
        assert_eq!(kernel.schedule(), Some(tids[1]));
        assert_eq!(kernel.schedule(), Some(tids[1]));
        assert_eq!(kernel.schedule(), Some(tids[0]));
    }

    #[test]
    fn idle_kernel_fast_forwards_to_next_wake() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        kernel.rt_set(tids[0], 50).unwrap();
        assert_eq!(kernel.schedule(), Some(tids[0]));
        let before = kernel.now();
        kernel.rt_suspend(tids[0]).unwrap();
        assert_eq!(kernel.schedule(), Some(tids[0]));
        assert_eq!(kernel.now(), before + 50);
    }

    #[test]
    fn schedule_returns_none_when_everything_exited() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        assert_eq!(kernel.schedule(), Some(tids[0]));
        kernel.exit(tids[0]);
        assert_eq!(kernel.schedule(), None);
    }

    #[test]
    fn mailbox_lifecycle_and_fifo_order() {
        let (mut kernel, tids) = kernel_with(&[Priority::High, Priority::High]);
        kernel.mbx_create(tids[1], 64).unwrap();
        assert_eq!(
            kernel.mbx_create(tids[1], 64),
            Err(KernelError::MailboxExists)
        );

        kernel
            .send_nb(tids[0], tids[1], MSG_KIND_DEFAULT, b"a".to_vec())
            .unwrap();
        kernel
            .send_nb(tids[0], tids[1], MSG_KIND_DEFAULT, b"b".to_vec())
            .unwrap();

        let first = kernel.recv_nb(tids[1]).unwrap();
        assert_eq!(first.sender, tids[0]);
        assert_eq!(first.payload, b"a");
        let second = kernel.recv_nb(tids[1]).unwrap();
        assert_eq!(second.payload, b"b");
        assert_eq!(kernel.recv_nb(tids[1]), Err(KernelError::MailboxEmpty));
    }

    #[test]
    fn mailbox_rejects_undersized_capacity() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        assert_eq!(
            kernel.mbx_create(tids[0], MSG_HEADER_BYTES - 1),
            Err(KernelError::InvalidCapacity(MSG_HEADER_BYTES - 1))
        );
    }

    #[test]
    fn send_respects_capacity_accounting() {
        let (mut kernel, tids) = kernel_with(&[Priority::High, Priority::High]);
        // room for exactly two one-byte messages
        kernel
            .mbx_create(tids[1], 2 * (MSG_HEADER_BYTES + 1))
            .unwrap();
        kernel
            .send_nb(tids[0], tids[1], MSG_KIND_DEFAULT, b"x".to_vec())
            .unwrap();
        kernel
            .send_nb(tids[0], tids[1], MSG_KIND_DEFAULT, b"y".to_vec())
            .unwrap();
        assert_eq!(
            kernel.send_nb(tids[0], tids[1], MSG_KIND_DEFAULT, b"z".to_vec()),
            Err(KernelError::MailboxFull)
        );
        // draining one message frees its bytes
        kernel.recv_nb(tids[1]).unwrap();
        kernel
            .send_nb(tids[0], tids[1], MSG_KIND_DEFAULT, b"z".to_vec())
            .unwrap();
    }

    #[test]
    fn send_rejects_oversized_and_missing_targets() {
        let (mut kernel, tids) = kernel_with(&[Priority::High, Priority::High]);
        kernel.mbx_create(tids[1], 16).unwrap();
        assert_eq!(
            kernel.send_nb(tids[0], tids[1], MSG_KIND_DEFAULT, vec![0; 32]),
            Err(KernelError::MessageTooLarge {
                size: MSG_HEADER_BYTES + 32,
                capacity: 16,
            })
        );
        assert_eq!(
            kernel.send_nb(tids[0], TaskId(9), MSG_KIND_DEFAULT, vec![]),
            Err(KernelError::NoSuchTask(TaskId(9)))
        );
        assert_eq!(
            kernel.send_nb(tids[1], tids[0], MSG_KIND_DEFAULT, vec![]),
            Err(KernelError::NoMailbox(tids[0]))
        );
    }

    #[test]
    fn heap_budget_is_enforced_and_reclaimed() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        assert_eq!(kernel.free(tids[0]), Err(KernelError::NothingAllocated));
        kernel.alloc(tids[0], 1000).unwrap();
        assert_eq!(kernel.alloc(tids[0], 8), Err(KernelError::BufferHeld));
        assert_eq!(kernel.heap_remaining(), 24);
        kernel.free(tids[0]).unwrap();
        assert_eq!(kernel.heap_remaining(), 1024);
        assert_eq!(kernel.alloc(tids[0], 2048), Err(KernelError::OutOfMemory(2048)));
    }

    #[test]
    fn exit_reclaims_held_buffer() {
        let (mut kernel, tids) = kernel_with(&[Priority::High]);
        kernel.alloc(tids[0], 512).unwrap();
        kernel.exit(tids[0]);
        assert_eq!(kernel.heap_remaining(), 1024);
    }
}
