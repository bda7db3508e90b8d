//! Process entity and state machine. Grounded in the Python original's
//! `Process` dataclass in `multilevelFeedbackQueueScheduler.py`.

pub type Pid = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityType {
    Relative,
    Dynamic,
    Absolute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct Process {
    pub pid: Pid,
    pub name: String,
    pub burst_time: f64,
    pub arrival_time: f64,
    pub relative_priority: u8,
    pub dynamic_priority: u8,
    pub priority_type: PriorityType,
    pub remaining_time: f64,
    pub state: ProcessState,
    pub current_queue: usize,
    pub quantum_used: f64,
    pub total_cpu_time: f64,
    pub waiting_time: f64,
    pub times_executed: u32,
    pub start_time: Option<f64>,
    pub completion_time: Option<f64>,
}

impl Process {
    pub fn new(
        pid: Pid,
        name: impl Into<String>,
        burst_time: f64,
        arrival_time: f64,
        relative_priority: u8,
        priority_type: PriorityType,
    ) -> Self {
        let relative_priority = relative_priority.clamp(1, 10);
        Self {
            pid,
            name: name.into(),
            burst_time,
            arrival_time,
            relative_priority,
            dynamic_priority: relative_priority,
            priority_type,
            remaining_time: burst_time,
            state: ProcessState::Ready,
            current_queue: 0,
            quantum_used: 0.0,
            total_cpu_time: 0.0,
            waiting_time: 0.0,
            times_executed: 0,
            start_time: None,
            completion_time: None,
        }
    }

    pub fn is_absolute(&self) -> bool {
        self.priority_type == PriorityType::Absolute
    }

    pub fn turnaround_time(&self) -> Option<f64> {
        self.completion_time.map(|c| c - self.arrival_time)
    }

    pub fn waiting_time_total(&self) -> Option<f64> {
        self.turnaround_time().map(|t| t - self.burst_time)
    }
}
