use std::{fmt, sync::Arc};

use serde::Serialize;

use crate::error::{Error, Result};

/// Lifecycle of a long running job. Transitions only move forward:
/// `Pending → Running → Completed`, or `Running → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum State {
    Pending,
    Running,
    Completed,
    Failed,
}

impl State {
    pub fn can_advance_to(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::Pending, State::Running) | (State::Running, State::Completed) | (State::Running, State::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub task: String,
    pub state: State,
    /// `0.0..=100.0`
    pub percent: f64,
    pub message: String,
}

/// Receives progress notifications. Calls are fire-and-forget: a listener
/// cannot fail the job it observes.
pub trait ProgressListener: Send + Sync {
    fn progress_changed(&self, event: &ProgressEvent);
}

/// Forwards every event to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProgressListener;

impl ProgressListener for LoggingProgressListener {
    fn progress_changed(&self, event: &ProgressEvent) {
        tracing::info!(
            task = %event.task,
            state = %event.state,
            percent = format_args!("{:.1}", event.percent),
            "{}",
            event.message
        );
    }
}

/// Progress state of one job, shared with any number of listeners.
pub struct Progress {
    task: String,
    state: State,
    percent: f64,
    message: String,
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("task", &self.task)
            .field("state", &self.state)
            .field("percent", &self.percent)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Progress {
    pub fn new(task: impl Into<String>) -> Self {
        Progress { task: task.into(), state: State::Pending, percent: 0.0, message: String::new(), listeners: Vec::new() }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn add_listener(&mut self, listener: Arc<dyn ProgressListener>) {
        self.listeners.push(listener);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    fn notify(&self) {
        let event = ProgressEvent {
            task: self.task.clone(),
            state: self.state,
            percent: self.percent,
            message: self.message.clone(),
        };
        for listener in &self.listeners {
            listener.progress_changed(&event);
        }
    }

    fn advance(&mut self, next: State) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::config(format!("{}: cannot move from {} to {}", self.task, self.state, next)));
        }
        self.state = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.advance(State::Running)?;
        self.message = "started".into();
        self.notify();
        Ok(())
    }

    /// Report progress while running. Ignored in any other state.
    pub fn update(&mut self, percent: f64, message: impl Into<String>) {
        if self.state != State::Running {
            return;
        }
        self.percent = percent.clamp(0.0, 100.0);
        self.message = message.into();
        self.notify();
    }

    pub fn complete(&mut self) -> Result<()> {
        self.advance(State::Completed)?;
        self.percent = 100.0;
        self.message = "completed".into();
        self.notify();
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.advance(State::Failed)?;
        self.message = message.into();
        self.notify();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(State, f64)>>);

    impl ProgressListener for Recorder {
        fn progress_changed(&self, event: &ProgressEvent) {
            self.0.lock().unwrap().push((event.state, event.percent));
        }
    }

    #[test]
    fn transitions_only_move_forward() {
        let mut p = Progress::new("job");
        assert!(p.complete().is_err());
        p.start().unwrap();
        assert!(p.start().is_err());
        p.complete().unwrap();
        assert!(p.fail("late").is_err());
        assert!(p.state().is_terminal());
    }

    #[test]
    fn listeners_see_every_update() {
        let recorder = Arc::new(Recorder::default());
        let mut p = Progress::new("job").with_listener(recorder.clone());
        p.update(10.0, "ignored while pending");
        p.start().unwrap();
        p.update(50.0, "half");
        p.fail("boom").unwrap();
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen, vec![(State::Running, 0.0), (State::Running, 50.0), (State::Failed, 50.0)]);
    }
}
