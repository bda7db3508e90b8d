//! A single feedback queue: FIFO storage, but `take_next` on an RR queue
//! picks by `(dynamic_priority, arrival_time)` rather than strict arrival
//! order, matching the Python original's `ProcessQueue.get()`.

use std::collections::VecDeque;

use super::process::{Pid, Process};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RoundRobin,
    Fcfs,
}

pub struct ProcessQueue {
    pub id: usize,
    pub quantum: f64,
    pub algorithm: Algorithm,
    items: VecDeque<Process>,
}

impl ProcessQueue {
    pub fn new(id: usize, quantum: f64, algorithm: Algorithm) -> Self {
        Self {
            id,
            quantum,
            algorithm,
            items: VecDeque::new(),
        }
    }

    pub fn push(&mut self, process: Process) {
        self.items.push_back(process);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Process> {
        self.items.iter()
    }

    /// Mutable access to every resident process in place, without
    /// disturbing queue order. Used by the aging pass, which needs to
    /// touch every process's dynamic priority each simulated second.
    pub(crate) fn iter_mut_for_aging(&mut self) -> impl Iterator<Item = &mut Process> {
        self.items.iter_mut()
    }

    /// Removes and returns the process this queue would dispatch next.
    /// `RoundRobin` picks the lowest `(dynamic_priority, arrival_time)`;
    /// `Fcfs` always takes the head.
    pub fn take_next(&mut self) -> Option<Process> {
        match self.algorithm {
            Algorithm::Fcfs => self.items.pop_front(),
            Algorithm::RoundRobin => {
                let best_index = self
                    .items
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        (a.dynamic_priority, a.arrival_time as i64)
                            .cmp(&(b.dynamic_priority, b.arrival_time as i64))
                    })
                    .map(|(index, _)| index)?;
                self.items.remove(best_index)
            }
        }
    }

    pub fn remove_by_pid(&mut self, pid: Pid) -> Option<Process> {
        let index = self.items.iter().position(|p| p.pid == pid)?;
        self.items.remove(index)
    }
}
