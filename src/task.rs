// Cooperative task driver for the host's single-threaded modal event loop.
// A task advances one step per matching host event and says which events it waits for next.

use std::marker::PhantomData;
use std::thread;
use std::time::Duration;

use crate::error::DriverBusy;

/// Host event kinds a task can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Timer,
    /// Escape or right click: the user aborts the running task.
    Cancel,
    MouseMove,
    KeyPress,
}

impl EventKind {
    fn bit(self) -> u8 {
        match self {
            EventKind::Timer => 1,
            EventKind::Cancel => 1 << 1,
            EventKind::MouseMove => 1 << 2,
            EventKind::KeyPress => 1 << 3,
        }
    }
}

/// Set of event kinds a task waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AwaitSet(u8);

impl AwaitSet {
    pub const EMPTY: AwaitSet = AwaitSet(0);
    pub const TIMER: AwaitSet = AwaitSet(1);

    pub fn of(kinds: &[EventKind]) -> Self {
        AwaitSet(kinds.iter().fold(0, |acc, k| acc | k.bit()))
    }

    pub fn with(self, kind: EventKind) -> Self {
        AwaitSet(self.0 | kind.bit())
    }

    pub fn contains(&self, kind: EventKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Result of advancing a task by one step.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    Await(AwaitSet),
    Complete(T),
}

/// A long-running operation split at its suspension points.
pub trait Task<Cx: ?Sized> {
    type Output;
    type Error;

    fn step(&mut self, cx: &mut Cx) -> Result<Step<Self::Output>, Self::Error>;

    /// Called once when the user cancels; no further steps follow.
    fn cancelled(&mut self, _cx: &mut Cx) {}
}

#[derive(Debug)]
pub enum TaskOutcome<T, E> {
    Completed(T),
    Failed(E),
    Cancelled,
}

impl<T, E> TaskOutcome<T, E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }
}

/// What the host's modal handler should answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalResult {
    /// Keep the modal handler installed and consume the event.
    RunningModal,
    /// Keep the handler but let the host process the event.
    PassThrough,
    /// The task ended; remove the handler and the timer.
    Finished,
}

/// Runs at most one task at a time.
pub struct TaskDriver<K: Task<Cx>, Cx: ?Sized> {
    task: Option<K>,
    awaiting: AwaitSet,
    outcome: Option<TaskOutcome<K::Output, K::Error>>,
    timer_delay: Duration,
    context: PhantomData<fn(&mut Cx)>,
}

impl<K: Task<Cx>, Cx: ?Sized> TaskDriver<K, Cx> {
    pub fn new(timer_delay: Duration) -> Self {
        TaskDriver {
            task: None,
            awaiting: AwaitSet::EMPTY,
            outcome: None,
            timer_delay: timer_delay.max(Duration::from_millis(1)),
            context: PhantomData,
        }
    }

    /// Interval at which the host should deliver `Timer` events while a task runs.
    pub fn timer_delay(&self) -> Duration {
        self.timer_delay
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn awaiting(&self) -> AwaitSet {
        self.awaiting
    }

    /// Install `task` and pump its first step.
    pub fn invoke(&mut self, task: K, cx: &mut Cx) -> Result<ModalResult, DriverBusy> {
        if self.task.is_some() {
            return Err(DriverBusy);
        }
        self.outcome = None;
        self.task = Some(task);
        Ok(self.pump(cx))
    }

    /// Feed one host event to the running task.
    pub fn handle_event(&mut self, event: EventKind, cx: &mut Cx) -> ModalResult {
        let Some(task) = self.task.as_mut() else {
            return ModalResult::Finished;
        };

        if event == EventKind::Cancel {
            task.cancelled(cx);
            self.finish(TaskOutcome::Cancelled);
            return ModalResult::Finished;
        }

        if self.awaiting.contains(event) {
            self.pump(cx)
        } else {
            ModalResult::PassThrough
        }
    }

    fn pump(&mut self, cx: &mut Cx) -> ModalResult {
        let Some(task) = self.task.as_mut() else {
            return ModalResult::Finished;
        };

        match task.step(cx) {
            Ok(Step::Await(set)) => {
                self.awaiting = set;
                ModalResult::RunningModal
            }
            Ok(Step::Complete(output)) => {
                self.finish(TaskOutcome::Completed(output));
                ModalResult::Finished
            }
            Err(err) => {
                self.finish(TaskOutcome::Failed(err));
                ModalResult::Finished
            }
        }
    }

    fn finish(&mut self, outcome: TaskOutcome<K::Output, K::Error>) {
        self.task = None;
        self.awaiting = AwaitSet::EMPTY;
        self.outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<&TaskOutcome<K::Output, K::Error>> {
        self.outcome.as_ref()
    }

    pub fn take_outcome(&mut self) -> Option<TaskOutcome<K::Output, K::Error>> {
        self.outcome.take()
    }
}

/// Drive a task to completion by sleeping between timer events. For hosts without an
/// event loop. A task that waits on nothing but non-timer events is cancelled.
pub fn run_blocking<K: Task<Cx>, Cx: ?Sized>(
    task: K,
    cx: &mut Cx,
    timer_delay: Duration,
) -> TaskOutcome<K::Output, K::Error> {
    let mut driver = TaskDriver::new(timer_delay);
    let mut status = match driver.invoke(task, cx) {
        Ok(status) => status,
        Err(DriverBusy) => return TaskOutcome::Cancelled,
    };

    while status != ModalResult::Finished {
        if !driver.awaiting().contains(EventKind::Timer) {
            status = driver.handle_event(EventKind::Cancel, cx);
            continue;
        }
        thread::sleep(driver.timer_delay());
        status = driver.handle_event(EventKind::Timer, cx);
    }

    driver.take_outcome().unwrap_or(TaskOutcome::Cancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts down, waiting for a timer between decrements.
    struct Countdown {
        remaining: u32,
        fail_at: Option<u32>,
    }

    const CANCEL_MARK: u32 = u32::MAX;

    impl Task<Vec<u32>> for Countdown {
        type Output = &'static str;
        type Error = String;

        fn step(&mut self, seen: &mut Vec<u32>) -> Result<Step<Self::Output>, Self::Error> {
            seen.push(self.remaining);
            if Some(self.remaining) == self.fail_at {
                return Err(format!("failed at {}", self.remaining));
            }
            if self.remaining == 0 {
                return Ok(Step::Complete("done"));
            }
            self.remaining -= 1;
            Ok(Step::Await(AwaitSet::TIMER))
        }

        fn cancelled(&mut self, seen: &mut Vec<u32>) {
            seen.push(CANCEL_MARK);
        }
    }

    fn countdown(remaining: u32) -> Countdown {
        Countdown {
            remaining,
            fail_at: None,
        }
    }

    #[test]
    fn await_set_membership() {
        let set = AwaitSet::of(&[EventKind::Timer, EventKind::KeyPress]);
        assert!(set.contains(EventKind::Timer));
        assert!(set.contains(EventKind::KeyPress));
        assert!(!set.contains(EventKind::MouseMove));
        assert!(AwaitSet::TIMER.contains(EventKind::Timer));
        assert!(AwaitSet::EMPTY.is_empty());
        assert!(AwaitSet::EMPTY.with(EventKind::Cancel).contains(EventKind::Cancel));
    }

    #[test]
    fn invoke_pumps_exactly_one_step() {
        let mut seen = Vec::new();
        let mut driver = TaskDriver::new(Duration::from_millis(1));
        assert_eq!(driver.invoke(countdown(2), &mut seen), Ok(ModalResult::RunningModal));
        assert_eq!(seen, vec![2]);
        assert!(driver.is_running());
    }

    #[test]
    fn only_awaited_events_advance() {
        let mut seen = Vec::new();
        let mut driver = TaskDriver::new(Duration::from_millis(1));
        driver.invoke(countdown(2), &mut seen).unwrap();

        assert_eq!(driver.handle_event(EventKind::MouseMove, &mut seen), ModalResult::PassThrough);
        assert_eq!(seen, vec![2]);

        assert_eq!(driver.handle_event(EventKind::Timer, &mut seen), ModalResult::RunningModal);
        assert_eq!(driver.handle_event(EventKind::Timer, &mut seen), ModalResult::Finished);
        assert_eq!(seen, vec![2, 1, 0]);
        assert!(matches!(driver.outcome(), Some(TaskOutcome::Completed("done"))));
    }

    #[test]
    fn cancel_stops_the_task() {
        let mut seen = Vec::new();
        let mut driver = TaskDriver::new(Duration::from_millis(1));
        driver.invoke(countdown(5), &mut seen).unwrap();

        assert_eq!(driver.handle_event(EventKind::Cancel, &mut seen), ModalResult::Finished);
        assert_eq!(driver.handle_event(EventKind::Timer, &mut seen), ModalResult::Finished);
        assert_eq!(seen, vec![5, CANCEL_MARK]);
        assert!(matches!(driver.outcome(), Some(TaskOutcome::Cancelled)));
        assert!(!driver.is_running());
    }

    #[test]
    fn step_error_fails_the_task() {
        let mut seen = Vec::new();
        let mut driver = TaskDriver::new(Duration::from_millis(1));
        let task = Countdown {
            remaining: 3,
            fail_at: Some(2),
        };
        driver.invoke(task, &mut seen).unwrap();
        assert_eq!(driver.handle_event(EventKind::Timer, &mut seen), ModalResult::Finished);
        match driver.take_outcome() {
            Some(TaskOutcome::Failed(reason)) => assert_eq!(reason, "failed at 2"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn second_task_is_refused_while_running() {
        let mut seen = Vec::new();
        let mut driver = TaskDriver::new(Duration::from_millis(1));
        driver.invoke(countdown(3), &mut seen).unwrap();
        assert_eq!(driver.invoke(countdown(1), &mut seen), Err(DriverBusy));
        assert_eq!(seen, vec![3]);
    }

    #[test]
    fn run_blocking_completes() {
        let mut seen = Vec::new();
        let outcome = run_blocking(countdown(3), &mut seen, Duration::from_millis(1));
        assert!(outcome.is_completed());
        assert_eq!(seen, vec![3, 2, 1, 0]);
    }
}
