//! One-shot discovery of the controller among the serial ports.
//!
//! A manually configured port is tried first. If it is absent or fails, every
//! system-visible port is tried once in discovery order and the first one
//! that passes the probe wins. There is no retry loop.
use log::{info, warn};

use crate::drivers::link::{ConnectedLink, PortDescriptor, PortOpener};
use crate::drivers::DriverError;

pub const CONFIRMATION: &str = "TEENSY CONNECTION CONFIRM";
pub const CONFIRMATION_FALLBACK: &str = "Initialization Complete";

/// Message sent to a candidate and the reply that identifies the controller.
#[derive(Clone, Debug, PartialEq)]
pub struct Handshake {
    pub message: String,
    pub confirmation: String,
    pub fallback_phrase: Option<String>,
}
impl Handshake {
    pub fn accepts(&self, reply: &str) -> bool {
        reply == self.confirmation
            || self
                .fallback_phrase
                .as_deref()
                .is_some_and(|phrase| reply.contains(phrase))
    }
}
/// How the manually configured port is admitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManualPolicy {
    /// Opening the port is enough (accelerometer DAQ).
    Unconditional,
    /// The port must pass the same handshake as scanned ports (driver).
    Verify,
}
#[derive(Clone, Debug)]
pub struct NegotiationProfile {
    pub baud_rate: u32,
    /// `None` accepts any scanned port that opens.
    pub handshake: Option<Handshake>,
    pub manual: ManualPolicy,
}
#[derive(Clone, Debug, PartialEq)]
pub enum ProbeOutcome {
    Accepted,
    OpenFailed(String),
    WriteFailed(String),
    ReadFailed(String),
    Rejected(String),
}
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeAttempt {
    pub port_name: String,
    pub manual: bool,
    pub outcome: ProbeOutcome,
}
/// Per-port outcomes of one negotiation pass plus the winning link, if any.
#[derive(Debug)]
pub struct Negotiation {
    pub attempts: Vec<ProbeAttempt>,
    link: Option<ConnectedLink>,
}
impl Negotiation {
    pub fn into_result(self) -> Result<ConnectedLink, DriverError> {
        let attempted = self.attempts.len();
        self.link.ok_or(DriverError::Connection { attempted })
    }
}
pub struct Negotiator<O: PortOpener> {
    opener: O,
    profile: NegotiationProfile,
}
impl<O: PortOpener> Negotiator<O> {
    pub fn new(opener: O, profile: NegotiationProfile) -> Self {
        Self { opener, profile }
    }
    pub fn negotiate(
        &self,
        manual_hint: Option<&str>,
        candidates: &[PortDescriptor],
    ) -> Result<ConnectedLink, DriverError> {
        self.run(manual_hint, candidates).into_result()
    }
    /// Negotiates against the ports the operating system reports.
    pub fn negotiate_system(&self, manual_hint: Option<&str>) -> Result<ConnectedLink, DriverError> {
        let candidates = match self.opener.list() {
            Ok(ports) => ports,
            Err(err) => {
                warn!("could not enumerate serial ports: {err}");
                Vec::new()
            }
        };
        self.negotiate(manual_hint, &candidates)
    }
    pub fn run(&self, manual_hint: Option<&str>, candidates: &[PortDescriptor]) -> Negotiation {
        let mut attempts = Vec::new();
        let manual_hint = manual_hint.map(str::trim).filter(|hint| !hint.is_empty());
        match manual_hint {
            Some(port_name) => {
                info!("attempting manual connection to serial port {port_name}");
                let handshake = match self.profile.manual {
                    ManualPolicy::Unconditional => None,
                    ManualPolicy::Verify => self.profile.handshake.as_ref(),
                };
                let (outcome, link) = self.probe(port_name, handshake);
                let accepted = link.is_some();
                attempts.push(ProbeAttempt {
                    port_name: port_name.to_string(),
                    manual: true,
                    outcome,
                });
                if accepted {
                    info!("connected to serial device at {port_name}");
                    return Negotiation { attempts, link };
                }
                warn!("manual connection attempt failed");
            }
            None => info!("no serial port selected, skipping manual connection"),
        }
        if candidates.is_empty() {
            warn!("no serial ports detected");
        } else {
            info!("{} serial port(s) detected", candidates.len());
        }
        for candidate in candidates {
            // a manual port that already failed is not retried
            if manual_hint == Some(candidate.port_name.as_str()) {
                continue;
            }
            info!("attempting connection to {}", candidate.description);
            let (outcome, link) = self.probe(&candidate.port_name, self.profile.handshake.as_ref());
            let accepted = link.is_some();
            attempts.push(ProbeAttempt {
                port_name: candidate.port_name.clone(),
                manual: false,
                outcome,
            });
            if accepted {
                info!("connection to {} succeeded", candidate.description);
                return Negotiation { attempts, link };
            }
        }
        warn!("automatic connection attempt failed");
        Negotiation {
            attempts,
            link: None,
        }
    }
    fn probe(
        &self,
        port_name: &str,
        handshake: Option<&Handshake>,
    ) -> (ProbeOutcome, Option<ConnectedLink>) {
        let io = match self.opener.open(port_name, self.profile.baud_rate) {
            Ok(io) => io,
            Err(err) => {
                warn!("connection to {port_name} failed: {err}");
                return (ProbeOutcome::OpenFailed(err.to_string()), None);
            }
        };
        let mut link = ConnectedLink::new(port_name, self.profile.baud_rate, io);
        let Some(handshake) = handshake else {
            return (ProbeOutcome::Accepted, Some(link));
        };
        info!("sending handshake: {}", handshake.message);
        if let Err(err) = link.write_message(&handshake.message) {
            warn!("connection to {port_name} failed: {err}");
            return (ProbeOutcome::WriteFailed(err.to_string()), None);
        }
        // the controller echoes the command before answering
        let reply = link.read_line().and_then(|_echo| link.read_line());
        match reply {
            Ok(reply) if handshake.accepts(&reply) => (ProbeOutcome::Accepted, Some(link)),
            Ok(reply) => {
                warn!("connection to {port_name} failed: received `{reply}`");
                link.disconnect();
                (ProbeOutcome::Rejected(reply), None)
            }
            Err(err) => {
                warn!("connection to {port_name} failed: {err}");
                link.disconnect();
                (ProbeOutcome::ReadFailed(err.to_string()), None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::link::testing::ScriptedOpener;
    fn driver_profile() -> NegotiationProfile {
        NegotiationProfile {
            baud_rate: 9600,
            handshake: Some(Handshake {
                message: "2HELLO".into(),
                confirmation: CONFIRMATION.into(),
                fallback_phrase: Some(CONFIRMATION_FALLBACK.into()),
            }),
            manual: ManualPolicy::Verify,
        }
    }
    fn daq_profile() -> NegotiationProfile {
        NegotiationProfile {
            baud_rate: 921_600,
            handshake: None,
            manual: ManualPolicy::Unconditional,
        }
    }
    fn ports(names: &[&str]) -> Vec<PortDescriptor> {
        names.iter().map(|n| PortDescriptor::named(*n)).collect()
    }
    #[test]
    fn no_candidates_and_no_hint_is_a_connection_error() {
        let negotiator = Negotiator::new(ScriptedOpener::default(), driver_profile());
        let outcome = negotiator.run(None, &[]);
        assert!(outcome.attempts.is_empty());
        assert!(matches!(
            outcome.into_result(),
            Err(DriverError::Connection { attempted: 0 })
        ));
    }
    #[test]
    fn first_confirming_port_wins_and_scan_stops() {
        let opener = ScriptedOpener::default()
            .with_port("COM1", "2HELLO\nsomething else\n")
            .with_port("COM2", "2HELLO\nTEENSY CONNECTION CONFIRM\n")
            .with_port("COM3", "2HELLO\nTEENSY CONNECTION CONFIRM\n");
        let negotiator = Negotiator::new(opener, driver_profile());
        let outcome = negotiator.run(None, &ports(&["COM1", "COM2", "COM3"]));
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(
            outcome.attempts[0].outcome,
            ProbeOutcome::Rejected("something else".into())
        );
        assert_eq!(outcome.attempts[1].outcome, ProbeOutcome::Accepted);
        let link = outcome.into_result().unwrap();
        assert_eq!(link.port_name(), "COM2");
        assert_eq!(negotiator.opener.opened_names(), vec!["COM1", "COM2"]);
        assert_eq!(negotiator.opener.transcript("COM2").unwrap(), "2HELLO");
    }
    #[test]
    fn fallback_phrase_is_a_substring_match() {
        let opener = ScriptedOpener::default()
            .with_port("COM4", "2HELLO\nDriver v3 Initialization Complete!\n");
        let negotiator = Negotiator::new(opener, driver_profile());
        assert!(negotiator.negotiate(None, &ports(&["COM4"])).is_ok());
    }
    #[test]
    fn unopenable_and_silent_ports_are_skipped() {
        let opener = ScriptedOpener::default()
            .with_port("COM2", "")
            .with_port("COM3", "2HELLO\nTEENSY CONNECTION CONFIRM\n");
        let negotiator = Negotiator::new(opener, driver_profile());
        let outcome = negotiator.run(None, &ports(&["COM1", "COM2", "COM3"]));
        assert!(matches!(outcome.attempts[0].outcome, ProbeOutcome::OpenFailed(_)));
        assert!(matches!(outcome.attempts[1].outcome, ProbeOutcome::ReadFailed(_)));
        assert_eq!(outcome.into_result().unwrap().port_name(), "COM3");
    }
    #[test]
    fn port_streaming_without_line_breaks_is_skipped() {
        let garbage = "\u{7f}".repeat(4 * crate::drivers::link::MAX_LINE_LEN);
        let opener = ScriptedOpener::default()
            .with_port("COM2", &garbage)
            .with_port("COM3", "2HELLO\nTEENSY CONNECTION CONFIRM\n");
        let negotiator = Negotiator::new(opener, driver_profile());
        let outcome = negotiator.run(None, &ports(&["COM2", "COM3"]));
        match &outcome.attempts[0].outcome {
            ProbeOutcome::ReadFailed(reason) => {
                assert!(reason.contains("no line break"), "{reason}")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(outcome.into_result().unwrap().port_name(), "COM3");
    }
    #[test]
    fn verified_manual_port_skips_the_scan() {
        let opener = ScriptedOpener::default()
            .with_port("COM7", "2HELLO\nTEENSY CONNECTION CONFIRM\n")
            .with_port("COM1", "2HELLO\nTEENSY CONNECTION CONFIRM\n");
        let negotiator = Negotiator::new(opener, driver_profile());
        let link = negotiator
            .negotiate(Some(" COM7\n"), &ports(&["COM1", "COM7"]))
            .unwrap();
        assert_eq!(link.port_name(), "COM7");
        assert_eq!(negotiator.opener.opened_names(), vec!["COM7"]);
    }
    #[test]
    fn failed_manual_port_falls_back_to_scan_without_retry() {
        let opener = ScriptedOpener::default()
            .with_port("COM7", "2HELLO\nnope\n")
            .with_port("COM1", "2HELLO\nTEENSY CONNECTION CONFIRM\n");
        let negotiator = Negotiator::new(opener, driver_profile());
        let outcome = negotiator.run(Some("COM7"), &ports(&["COM7", "COM1"]));
        assert!(outcome.attempts[0].manual);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(outcome.into_result().unwrap().port_name(), "COM1");
        assert_eq!(negotiator.opener.opened_names(), vec!["COM7", "COM1"]);
    }
    #[test]
    fn daq_manual_port_is_accepted_without_handshake() {
        let opener = ScriptedOpener::default().with_port("COM5", "");
        let negotiator = Negotiator::new(opener, daq_profile());
        let link = negotiator.negotiate(Some("COM5"), &[]).unwrap();
        assert_eq!(link.baud_rate(), 921_600);
        assert_eq!(negotiator.opener.transcript("COM5").unwrap(), "");
    }
    #[test]
    fn daq_scan_accepts_first_port_that_opens() {
        let opener = ScriptedOpener::default().with_port("COM2", "");
        let negotiator = Negotiator::new(opener, daq_profile());
        let link = negotiator
            .negotiate(Some(""), &ports(&["COM1", "COM2"]))
            .unwrap();
        assert_eq!(link.port_name(), "COM2");
    }
}
