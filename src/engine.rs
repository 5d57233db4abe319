// src/engine.rs
//! Driver state machine. The engine owns the serial link; every transition
//! writes exactly one waveform, and status polling happens on the same
//! thread so reads never interleave with writes.
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::drivers::{ConnectedLink, DriverError};
use crate::types::*;
use crate::waveform::{WaveformTable, EMPTY_WAVEFORM, VERIFY_WAVEFORM};

pub const WRITE_FAILURE_ADVICE: &str = "Lost contact with the actuator driver. Turn the driver \
     off, unplug and reconnect the USB cable, relaunch the program, then turn the driver back on.";

/// Longest wait for a command when no timer is pending.
const IDLE_WAIT: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineTiming {
    /// A running test is stopped automatically after this long.
    pub playback_limit: Duration,
    pub verify_poll: Duration,
}
impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            playback_limit: Duration::from_secs(90),
            verify_poll: Duration::from_millis(300),
        }
    }
}

pub struct DriverEngine {
    link: ConnectedLink,
    table: WaveformTable,
    timing: EngineTiming,
    state: DriverState,
    watchdog: Option<Instant>,
    next_poll: Option<Instant>,
}
impl DriverEngine {
    pub fn new(link: ConnectedLink, table: WaveformTable, timing: EngineTiming) -> Self {
        Self {
            link,
            table,
            timing,
            state: DriverState::Idle,
            watchdog: None,
            next_poll: None,
        }
    }
    pub fn state(&self) -> &DriverState {
        &self.state
    }
    pub fn port_name(&self) -> &str {
        self.link.port_name()
    }
    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }
    /// Pauses the actuators once after negotiation.
    pub fn start(&mut self) -> Vec<DriverMessage> {
        let result = self.transition(EMPTY_WAVEFORM, DriverState::Idle, "paused");
        self.report(result)
    }
    /// Applies one front-end command and returns the messages it produced.
    pub fn dispatch(&mut self, command: DriverCommand, now: Instant) -> Vec<DriverMessage> {
        let result = self.handle(command, now);
        self.report(result)
    }
    pub fn handle(&mut self, command: DriverCommand, now: Instant) -> Result<(), DriverError> {
        match command {
            DriverCommand::Run(id) => {
                let waveform = self
                    .table
                    .waveform(&id.sheet, id.index)
                    .ok_or_else(|| DriverError::UnknownTest {
                        sheet: id.sheet.clone(),
                        index: id.index + 1,
                    })?
                    .to_string();
                let label = format!("running {id}");
                self.transition(&waveform, DriverState::Transmitting(id), &label)?;
                self.watchdog = Some(now + self.timing.playback_limit);
            }
            DriverCommand::Stop | DriverCommand::StopVerify => {
                self.transition(EMPTY_WAVEFORM, DriverState::Idle, "paused")?;
            }
            DriverCommand::StartVerify => {
                self.transition(&VERIFY_WAVEFORM, DriverState::Verifying, "verification")?;
                self.next_poll = Some(now + self.timing.verify_poll);
            }
            DriverCommand::Shutdown => self.shutdown(),
        }
        Ok(())
    }
    fn transition(
        &mut self,
        waveform: &str,
        next: DriverState,
        label: &str,
    ) -> Result<(), DriverError> {
        self.watchdog = None;
        self.next_poll = None;
        self.link.write_message(waveform)?;
        info!("waveform written ({label}): {waveform}");
        self.state = next;
        Ok(())
    }
    fn report(&mut self, result: Result<(), DriverError>) -> Vec<DriverMessage> {
        match result {
            Ok(()) => vec![DriverMessage::State(self.state.clone())],
            Err(err @ (DriverError::Write(_) | DriverError::Disconnected)) => {
                error!("{err}");
                self.state = DriverState::Idle;
                vec![
                    DriverMessage::Error(err.to_string()),
                    DriverMessage::WriteFailed(WRITE_FAILURE_ADVICE.to_string()),
                ]
            }
            Err(err) => {
                warn!("{err}");
                vec![DriverMessage::Error(err.to_string())]
            }
        }
    }
    pub fn watchdog_due(&self, now: Instant) -> bool {
        self.watchdog.is_some_and(|deadline| now >= deadline)
    }
    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.watchdog, self.next_poll) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
    /// Runs the timers that are due: the playback watchdog and the
    /// verification status poll.
    pub fn tick(&mut self, now: Instant) -> Vec<DriverMessage> {
        let mut messages = Vec::new();
        if self.watchdog_due(now) {
            if let DriverState::Transmitting(id) = &self.state {
                info!("playback limit reached for {id}");
            }
            let result = self.transition(EMPTY_WAVEFORM, DriverState::Idle, "paused");
            messages.extend(self.report(result));
        }
        match self.poll_status(now) {
            Ok(Some(line)) => messages.push(DriverMessage::Status(line)),
            Ok(None) => {}
            Err(err) => {
                self.next_poll = None;
                messages.extend(self.report(Err(err)));
            }
        }
        messages
    }
    /// Takes one status line while verifying, if the controller has sent a
    /// complete one. Never waits on the port, so queued commands are not held
    /// up behind a silent controller.
    pub fn poll_status(&mut self, now: Instant) -> Result<Option<String>, DriverError> {
        if self.state != DriverState::Verifying {
            return Ok(None);
        }
        match self.next_poll {
            Some(due) if now >= due => {}
            _ => return Ok(None),
        }
        self.next_poll = Some(now + self.timing.verify_poll);
        match self.link.poll_line() {
            Ok(Some(line)) if line.is_empty() => Ok(None),
            Ok(line) => Ok(line),
            Err(err) if err.is_timeout() => Ok(None),
            Err(err) => Err(err),
        }
    }
    /// Leaves the actuators paused and releases the port.
    pub fn shutdown(&mut self) {
        self.watchdog = None;
        self.next_poll = None;
        if self.link.is_connected() {
            match self.link.write_message(EMPTY_WAVEFORM) {
                Ok(()) => info!("waveform written (paused): {EMPTY_WAVEFORM}"),
                Err(err) => warn!("could not pause the driver on shutdown: {err}"),
            }
        }
        self.link.disconnect();
        self.state = DriverState::Idle;
    }
}

/// Runs the engine on its own thread until `Shutdown` arrives or the command
/// sender is dropped.
pub fn spawn_thread(
    mut engine: DriverEngine,
    tx: Sender<DriverMessage>,
    rx_cmd: Receiver<DriverCommand>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tx.send(DriverMessage::Log(format!(
            "driver engine ready on {}",
            engine.port_name()
        )))
        .ok();
        for message in engine.start() {
            tx.send(message).ok();
        }
        loop {
            let wait = engine
                .next_deadline()
                .map_or(IDLE_WAIT, |deadline| {
                    deadline.saturating_duration_since(Instant::now())
                });
            match rx_cmd.recv_timeout(wait) {
                Ok(DriverCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => {
                    for message in engine.dispatch(command, Instant::now()) {
                        tx.send(message).ok();
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
            for message in engine.tick(Instant::now()) {
                tx.send(message).ok();
            }
        }
        engine.shutdown();
        tx.send(DriverMessage::State(engine.state().clone())).ok();
        tx.send(DriverMessage::Log("driver engine stopped".to_string()))
            .ok();
    })
}
