//! Multilevel feedback queue scheduler: three ready queues with
//! increasing quantum, a preemptive absolute-priority queue, quantum-
//! expiry demotion, and dynamic priority aging.
//!
//! Grounded in the Python original's
//! `MultilevelFeedbackQueueScheduler.execute_time_slice`, restructured as
//! an explicit state machine advanced one `step` at a time rather than a
//! `while`-loop-with-`time.sleep` simulation driver.

pub mod process;
pub mod queue;

use std::collections::VecDeque;

use process::{Pid, PriorityType, Process, ProcessState};
use queue::{Algorithm, ProcessQueue};

const NUM_QUEUES: usize = 3;
const AGING_INTERVAL: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Dispatched,
    Preempted,
    Demoted,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct SchedulingEvent {
    pub time: f64,
    pub kind: EventKind,
    pub pid: Pid,
    pub detail: String,
}

const EVENT_LOG_CAPACITY: usize = 256;

pub struct Scheduler {
    queues: Vec<ProcessQueue>,
    absolute_queue: VecDeque<Process>,
    current: Option<Process>,
    completed: Vec<Process>,
    current_time: f64,
    time_since_last_aging: f64,
    next_pid: Pid,
    total_context_switches: u64,
    events: VecDeque<SchedulingEvent>,
}

impl Scheduler {
    pub fn new(quanta: [f64; 2]) -> Self {
        Self {
            queues: vec![
                ProcessQueue::new(0, quanta[0], Algorithm::RoundRobin),
                ProcessQueue::new(1, quanta[1], Algorithm::RoundRobin),
                ProcessQueue::new(2, f64::INFINITY, Algorithm::Fcfs),
            ],
            absolute_queue: VecDeque::new(),
            current: None,
            completed: Vec::new(),
            current_time: 0.0,
            time_since_last_aging: 0.0,
            next_pid: 1,
            total_context_switches: 0,
            events: VecDeque::new(),
        }
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn total_context_switches(&self) -> u64 {
        self.total_context_switches
    }

    fn log(&mut self, kind: EventKind, pid: Pid, detail: impl Into<String>) {
        if self.events.len() >= EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(SchedulingEvent {
            time: self.current_time,
            kind,
            pid,
            detail: detail.into(),
        });
    }

    /// Adds a new process. An `arrival_time` earlier than the scheduler's
    /// current time is clamped forward, matching the Python original.
    pub fn add_process(
        &mut self,
        name: impl Into<String>,
        burst_time: f64,
        arrival_time: f64,
        relative_priority: u8,
        priority_type: PriorityType,
    ) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        let arrival_time = arrival_time.max(self.current_time);
        let process = Process::new(
            pid,
            name,
            burst_time,
            arrival_time,
            relative_priority,
            priority_type,
        );
        match priority_type {
            PriorityType::Absolute => self.absolute_queue.push_back(process),
            _ => self.queues[0].push(process),
        }
        pid
    }

    fn age_dynamic_priorities(&mut self) {
        for queue in &mut self.queues {
            for process in queue_iter_mut(queue) {
                process.dynamic_priority = process.dynamic_priority.saturating_sub(1).max(1);
            }
        }
        for process in &mut self.absolute_queue {
            process.dynamic_priority = process.dynamic_priority.saturating_sub(1).max(1);
        }
        if let Some(current) = &mut self.current {
            current.dynamic_priority = (current.dynamic_priority + 1).min(10);
        }
    }

    fn charge_waiting_time(&mut self, delta: f64) {
        for queue in &mut self.queues {
            for process in queue_iter_mut(queue) {
                process.waiting_time += delta;
            }
        }
        for process in &mut self.absolute_queue {
            process.waiting_time += delta;
        }
    }

    /// If an absolute process is waiting and the current process is not
    /// itself absolute, preempt: return current to its queue and start
    /// running the absolute process.
    fn apply_preemption(&mut self) {
        if self.absolute_queue.is_empty() {
            return;
        }
        if let Some(current) = &self.current {
            if current.is_absolute() {
                return;
            }
        } else {
            return;
        }

        let mut preempted = self.current.take().unwrap();
        preempted.state = ProcessState::Ready;
        preempted.times_executed += 1;
        preempted.quantum_used = 0.0;
        let queue_id = preempted.current_queue;
        let preempted_pid = preempted.pid;
        self.queues[queue_id].push(preempted);
        self.total_context_switches += 1;
        self.log(EventKind::Preempted, preempted_pid, "preempted by absolute process");

        let mut next = self.absolute_queue.pop_front().unwrap();
        next.state = ProcessState::Running;
        if next.start_time.is_none() {
            next.start_time = Some(self.current_time);
        }
        let next_pid = next.pid;
        self.current = Some(next);
        self.total_context_switches += 1;
        self.log(EventKind::Dispatched, next_pid, "dispatched (absolute)");
    }

    fn dispatch_next(&mut self) {
        if self.current.is_some() {
            return;
        }
        let mut next = if let Some(process) = self.absolute_queue.pop_front() {
            process
        } else if let Some(process) = self.queues.iter_mut().find_map(|q| q.take_next()) {
            process
        } else {
            return;
        };

        next.state = ProcessState::Running;
        next.times_executed += 1;
        if next.start_time.is_none() {
            next.start_time = Some(self.current_time);
        }
        if next.priority_type == PriorityType::Dynamic {
            next.dynamic_priority = next.dynamic_priority.saturating_sub(2).max(1);
        }
        let pid = next.pid;
        self.current = Some(next);
        self.total_context_switches += 1;
        self.log(EventKind::Dispatched, pid, "dispatched");
    }

    fn move_current_to_next_queue(&mut self) {
        let mut process = self.current.take().unwrap();
        if process.priority_type == PriorityType::Dynamic {
            process.dynamic_priority = (process.dynamic_priority + 1).min(10);
        }
        if process.current_queue < NUM_QUEUES - 1 {
            process.current_queue += 1;
        }
        process.quantum_used = 0.0;
        process.state = ProcessState::Ready;
        process.times_executed += 1;
        let pid = process.pid;
        let queue_id = process.current_queue;
        self.queues[queue_id].push(process);
        self.total_context_switches += 1;
        self.log(EventKind::Demoted, pid, format!("demoted to queue {queue_id}"));
    }

    /// Advances the simulation by `time_slice` seconds of wall-clock-like
    /// simulated time.
    pub fn step(&mut self, time_slice: f64) {
        self.time_since_last_aging += time_slice;
        while self.time_since_last_aging >= AGING_INTERVAL {
            self.age_dynamic_priorities();
            self.time_since_last_aging -= AGING_INTERVAL;
        }

        self.charge_waiting_time(time_slice);
        self.apply_preemption();
        self.dispatch_next();

        let Some(mut process) = self.current.take() else {
            self.current_time += time_slice;
            return;
        };

        let quantum_remaining = if process.is_absolute() {
            f64::INFINITY
        } else {
            self.queues[process.current_queue].quantum - process.quantum_used
        };
        let exec = time_slice.min(quantum_remaining).min(process.remaining_time);

        self.current_time += exec;
        process.remaining_time -= exec;
        process.quantum_used += exec;
        process.total_cpu_time += exec;

        if process.remaining_time <= 1e-9 {
            process.state = ProcessState::Terminated;
            process.completion_time = Some(self.current_time);
            let pid = process.pid;
            self.log(EventKind::Terminated, pid, "terminated");
            self.completed.push(process);
            self.current = None;
        } else if !process.is_absolute()
            && process.current_queue < NUM_QUEUES - 1
            && process.quantum_used >= self.queues[process.current_queue].quantum
        {
            self.current = Some(process);
            self.move_current_to_next_queue();
        } else {
            self.current = Some(process);
        }
    }

    pub fn run(&mut self, steps: u32, time_slice: f64) {
        for _ in 0..steps {
            self.step(time_slice);
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
            && self.absolute_queue.is_empty()
            && self.queues.iter().all(|q| q.is_empty())
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            current_time: self.current_time,
            current: self.current.as_ref(),
            queues: &self.queues,
            absolute_queue: &self.absolute_queue,
            total_context_switches: self.total_context_switches,
            recent_events: self.events.iter().rev().take(10).collect(),
        }
    }

    pub fn final_stats(&self) -> FinalStats {
        let n = self.completed.len() as f64;
        if n == 0.0 {
            return FinalStats::default();
        }
        let total_turnaround: f64 = self.completed.iter().filter_map(|p| p.turnaround_time()).sum();
        let total_waiting: f64 = self
            .completed
            .iter()
            .filter_map(|p| p.waiting_time_total())
            .sum();
        FinalStats {
            completed: self.completed.len(),
            average_turnaround: total_turnaround / n,
            average_waiting: total_waiting / n,
            total_context_switches: self.total_context_switches,
        }
    }

    pub fn completed(&self) -> &[Process] {
        &self.completed
    }
}

fn queue_iter_mut(queue: &mut ProcessQueue) -> impl Iterator<Item = &mut Process> {
    // `ProcessQueue` intentionally does not expose a public `iter_mut` --
    // aging is the one place that needs to mutate every resident process
    // in place without disturbing queue order, so it reaches into the
    // `VecDeque` directly via this crate-private helper.
    queue.iter_mut_for_aging()
}

#[derive(Debug, Clone, Default)]
pub struct FinalStats {
    pub completed: usize,
    pub average_turnaround: f64,
    pub average_waiting: f64,
    pub total_context_switches: u64,
}

pub struct Snapshot<'a> {
    pub current_time: f64,
    pub current: Option<&'a Process>,
    pub queues: &'a [ProcessQueue],
    pub absolute_queue: &'a VecDeque<Process>,
    pub total_context_switches: u64,
    pub recent_events: Vec<&'a SchedulingEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantum_expiry_demotes_process() {
        let mut sched = Scheduler::new([2.0, 4.0]);
        sched.add_process("A", 6.0, 0.0, 1, PriorityType::Relative);
        sched.step(1.0);
        sched.step(1.0);
        sched.step(1.0);
        let current = sched.snapshot().current.cloned().unwrap();
        assert_eq!(current.current_queue, 1);
    }

    #[test]
    fn absolute_process_preempts_running() {
        let mut sched = Scheduler::new([2.0, 4.0]);
        sched.add_process("A", 10.0, 0.0, 1, PriorityType::Relative);
        sched.step(1.0);
        sched.add_process("Emergency", 2.0, sched.current_time(), 1, PriorityType::Absolute);
        sched.step(1.0);
        let current = sched.snapshot().current.cloned().unwrap();
        assert_eq!(current.name, "Emergency");
        assert!(sched.total_context_switches() >= 1);
    }

    #[test]
    fn process_terminates_and_records_completion() {
        let mut sched = Scheduler::new([2.0, 4.0]);
        sched.add_process("Short", 1.0, 0.0, 1, PriorityType::Relative);
        sched.step(1.0);
        assert_eq!(sched.completed().len(), 1);
        assert!(sched.completed()[0].completion_time.is_some());
    }

    #[test]
    fn dynamic_priority_ages_while_waiting() {
        let mut sched = Scheduler::new([2.0, 4.0]);
        sched.add_process("Busy", 20.0, 0.0, 5, PriorityType::Dynamic);
        sched.add_process("Waiter", 20.0, 0.0, 5, PriorityType::Dynamic);
        for _ in 0..3 {
            sched.step(1.0);
        }
        // One of the two is running (dp adjusted on dispatch), the other
        // is waiting and should have aged down from its initial value.
        let waiting_dp = sched.queues[0]
            .iter()
            .next()
            .map(|p| p.dynamic_priority)
            .unwrap_or(5);
        assert!(waiting_dp <= 5);
    }
}
