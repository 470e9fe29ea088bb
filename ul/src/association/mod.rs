//! DICOM association module
//!
//! This module contains utilities for establishing associations
//! between DICOM nodes via TCP/IP,
//! from the perspective of the requesting node
//! (usually a service class user).
//! A new association is started
//! via the [`ClientAssociationOptions`] type.
//! The minimum required properties are
//! the presentation contexts to propose
//! and the TCP socket address of the target node.
//!
//! The lifecycle of an association is tracked
//! by an observable [`AssociationState`] value,
//! accessible through a shared [`StateMonitor`]
//! which outlives the association itself.
pub mod client;

pub(crate) mod uid;

use std::sync::{Arc, Mutex};

pub use client::{ClientAssociation, ClientAssociationOptions};

/// The lifecycle state of an association.
///
/// The happy path of a requesting node is
/// `Idle → Requesting → Negotiating → Established → Releasing → Closed`.
/// `Aborted` is reachable from every state other than `Closed`,
/// upon a socket error, a timeout, a negotiation rejection,
/// or an unexpected PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationState {
    /// No connection activity yet.
    Idle,
    /// A TCP connection is being set up.
    Requesting,
    /// The association request was sent;
    /// awaiting the peer's acknowledgement or rejection.
    Negotiating,
    /// The association is negotiated and ready for data transfer.
    Established,
    /// A release request was sent;
    /// awaiting the peer's release reply.
    Releasing,
    /// The association ended in an orderly fashion.
    Closed,
    /// The association ended abruptly.
    /// Terminal: no further transitions occur.
    Aborted,
}

impl AssociationState {
    /// Whether this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, AssociationState::Closed | AssociationState::Aborted)
    }
}

/// A shared, cloneable handle observing the lifecycle of one association.
///
/// The monitor records every state transition in order,
/// and remains valid after the association itself is gone,
/// so that the full lifecycle can be inspected.
#[derive(Debug, Clone)]
pub struct StateMonitor {
    inner: Arc<Mutex<Vec<AssociationState>>>,
}

impl Default for StateMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMonitor {
    /// Create a new monitor in the `Idle` state.
    pub fn new() -> Self {
        StateMonitor {
            inner: Arc::new(Mutex::new(vec![AssociationState::Idle])),
        }
    }

    /// Retrieve the current state.
    pub fn current(&self) -> AssociationState {
        let states = self.inner.lock().unwrap();
        *states.last().expect("monitor starts non-empty")
    }

    /// Retrieve the full sequence of states visited so far,
    /// starting with `Idle`.
    pub fn history(&self) -> Vec<AssociationState> {
        self.inner.lock().unwrap().clone()
    }

    /// Record a transition to the given state.
    ///
    /// Transitions out of a terminal state are ignored,
    /// as is re-entering the current state.
    ///
    /// This is meant for upper layers driving the association lifecycle
    /// (such as a message multiplexer taking over release and abort);
    /// ordinary consumers only observe.
    pub fn transition_to(&self, state: AssociationState) {
        let mut states = self.inner.lock().unwrap();
        let current = *states.last().expect("monitor starts non-empty");
        if current.is_terminal() || current == state {
            return;
        }
        states.push(state);
    }
}

/// A negotiated presentation context of an established association:
/// the binding of an abstract syntax to the accepted transfer syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PresentationContext {
    /// the presentation context identifier
    pub id: u8,
    /// the abstract syntax UID proposed under this identifier
    pub abstract_syntax: String,
    /// the transfer syntax UID accepted by the peer
    pub transfer_syntax: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_records_happy_path() {
        let monitor = StateMonitor::new();
        assert_eq!(monitor.current(), AssociationState::Idle);
        monitor.transition_to(AssociationState::Requesting);
        monitor.transition_to(AssociationState::Negotiating);
        monitor.transition_to(AssociationState::Established);
        monitor.transition_to(AssociationState::Releasing);
        monitor.transition_to(AssociationState::Closed);
        assert_eq!(
            monitor.history(),
            vec![
                AssociationState::Idle,
                AssociationState::Requesting,
                AssociationState::Negotiating,
                AssociationState::Established,
                AssociationState::Releasing,
                AssociationState::Closed,
            ],
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let monitor = StateMonitor::new();
        monitor.transition_to(AssociationState::Requesting);
        monitor.transition_to(AssociationState::Aborted);
        monitor.transition_to(AssociationState::Established);
        assert_eq!(monitor.current(), AssociationState::Aborted);

        // repeated transitions are not recorded twice
        let monitor = StateMonitor::new();
        monitor.transition_to(AssociationState::Requesting);
        monitor.transition_to(AssociationState::Requesting);
        assert_eq!(monitor.history().len(), 2);
    }
}
