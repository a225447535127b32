//! Pause and stop signalling for a running execution
//!
//! Signals are only observed between nodes: a node that already started
//! always runs to completion.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Requested run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
    Running,
    Paused,
    Stopped,
}

/// What the engine does at a node boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Proceed,
    Stop,
}

/// Shared handle used to pause, resume or stop one execution
#[derive(Debug, Clone)]
pub struct ExecutionControl {
    state: Arc<watch::Sender<ControlState>>,
}

impl Default for ExecutionControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::Running);
        Self { state: Arc::new(tx) }
    }

    pub fn state(&self) -> ControlState {
        *self.state.borrow()
    }

    /// Running -> paused. Returns whether the state changed.
    pub fn pause(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ControlState::Running {
                *state = ControlState::Paused;
                true
            } else {
                false
            }
        })
    }

    /// Paused -> running. Returns whether the state changed.
    pub fn resume(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ControlState::Paused {
                *state = ControlState::Running;
                true
            } else {
                false
            }
        })
    }

    /// Request a stop; final, also releases a paused execution
    pub fn stop(&self) {
        self.state.send_replace(ControlState::Stopped);
    }

    /// Wait until the execution may start its next node.
    ///
    /// Returns immediately when running, blocks while paused and returns
    /// [`Boundary::Stop`] once a stop was requested.
    pub async fn wait_at_boundary(&self) -> Boundary {
        let mut rx = self.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                ControlState::Running => return Boundary::Proceed,
                ControlState::Stopped => return Boundary::Stop,
                ControlState::Paused => {}
            }
            if rx.changed().await.is_err() {
                return Boundary::Stop;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_running_proceeds() {
        let control = ExecutionControl::new();
        assert_eq!(control.wait_at_boundary().await, Boundary::Proceed);
    }

    #[tokio::test]
    async fn test_pause_blocks_until_resume() {
        let control = ExecutionControl::new();
        assert!(control.pause());
        assert!(!control.pause());

        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_at_boundary().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        assert!(control.resume());
        assert_eq!(waiter.await.unwrap(), Boundary::Proceed);
    }

    #[tokio::test]
    async fn test_stop_releases_paused() {
        let control = ExecutionControl::new();
        control.pause();
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.wait_at_boundary().await })
        };
        control.stop();
        assert_eq!(waiter.await.unwrap(), Boundary::Stop);
        assert!(!control.resume());
        assert_eq!(control.state(), ControlState::Stopped);
    }
}
