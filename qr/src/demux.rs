//! Message multiplexer module.
//!
//! One dedicated thread per association reads and decodes incoming bytes,
//! reassembles presentation data value fragments
//! into complete command + data set messages,
//! and routes each completed response
//! to the pending request with the matching message ID.
//!
//! The routing table is the single shared mutable structure:
//! the reader thread is the only writer of responses into sinks,
//! and operation callers are the only ones removing or closing sinks.
use crate::command::ResponseCommand;
use crate::response::Response;
use bytes::{Buf, BytesMut};
use dimse_core::{read_dataset, TransferSyntax};
use dimse_ul::pdu::reader::decode_pdu;
use dimse_ul::pdu::{AbortRQSource, PDataValue, PDataValueType, Pdu};
use dimse_ul::{AssociationState, PresentationContext, StateMonitor};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How often the reader thread re-checks a full sink
/// while waiting for the consumer to drain it.
const BACKPRESSURE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Why an association was torn down abruptly.
///
/// Carried by the `AssociationAborted` error
/// of every request that was in flight at the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A socket read or write failed, or the peer closed the connection.
    Io { message: String },
    /// The peer sent an A-ABORT.
    PeerAborted { source: AbortRQSource },
    /// The peer sent a PDU which is invalid at this point of the association.
    UnexpectedPdu { description: String },
    /// An incoming PDU could not be decoded.
    MalformedPdu { message: String },
    /// A reassembled response message could not be decoded.
    MalformedResponse { message: String },
    /// A response sink stayed full beyond the configured backpressure
    /// deadline; the association was aborted rather than buffering
    /// without bound.
    ResponseBackpressureTimeout,
    /// The association was released while the request was still in flight.
    Released,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Io { message } => write!(f, "I/O failure: {}", message),
            AbortReason::PeerAborted { source } => match source {
                AbortRQSource::ServiceProvider(reason) => {
                    write!(f, "peer aborted the association: {}", reason)
                }
                _ => f.write_str("peer aborted the association"),
            },
            AbortReason::UnexpectedPdu { description } => {
                write!(f, "unexpected PDU: {}", description)
            }
            AbortReason::MalformedPdu { message } => write!(f, "malformed PDU: {}", message),
            AbortReason::MalformedResponse { message } => {
                write!(f, "malformed response message: {}", message)
            }
            AbortReason::ResponseBackpressureTimeout => {
                f.write_str("response consumer did not keep up within the backpressure deadline")
            }
            AbortReason::Released => f.write_str("association released"),
        }
    }
}

/// An entry delivered through a request's response sink.
#[derive(Debug)]
pub(crate) enum SinkItem {
    Response(Response),
    Aborted(AbortReason),
}

/// State shared between the operation layer and the reader thread.
#[derive(Debug)]
pub(crate) struct Shared {
    /// pending requests: message ID to response sink
    pub sinks: Mutex<HashMap<u16, SyncSender<SinkItem>>>,
    /// the abort cause, set at most once
    pub abort: Mutex<Option<AbortReason>>,
    /// a waiter for the release reply, registered by `release`
    pub release_waiter: Mutex<Option<SyncSender<()>>>,
    /// the association lifecycle monitor
    pub monitor: StateMonitor,
    /// the negotiated presentation contexts
    pub contexts: Vec<PresentationContext>,
    /// a handle to the association socket, used only for shutdown
    pub socket: TcpStream,
    /// maximum PDU length admitted when receiving
    pub max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    pub strict: bool,
    /// how long the reader thread may wait on a full sink
    pub backpressure_timeout: Duration,
}

impl Shared {
    /// Look up the negotiated context under the given identifier.
    fn context(&self, presentation_context_id: u8) -> Option<&PresentationContext> {
        self.contexts
            .iter()
            .find(|c| c.id == presentation_context_id)
    }

    /// Retrieve the abort cause, if the association was aborted.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.abort.lock().unwrap().clone()
    }

    /// Tear down the association:
    /// record the cause, fail every pending request,
    /// wake any release waiter, and close the socket.
    pub fn abort_with(&self, reason: AbortReason) {
        {
            let mut abort = self.abort.lock().unwrap();
            if abort.is_some() {
                return;
            }
            *abort = Some(reason.clone());
        }
        tracing::warn!("aborting association: {}", reason);

        let sinks: Vec<_> = {
            let mut sinks = self.sinks.lock().unwrap();
            sinks.drain().collect()
        };
        for (_, sender) in sinks {
            // best effort: a full sink still ends with a disconnect
            // once the sender is dropped
            let _ = sender.try_send(SinkItem::Aborted(reason.clone()));
        }

        // dropping the waiter makes a pending release fail promptly
        drop(self.release_waiter.lock().unwrap().take());

        self.monitor.transition_to(AssociationState::Aborted);
        let _ = self.socket.shutdown(Shutdown::Both);
    }

    /// Push a completed response into the sink of its request.
    ///
    /// Blocks only this reader thread, and only up to the configured
    /// backpressure deadline; on expiry the association must be aborted.
    fn deliver(&self, message_id: u16, response: Response) -> Result<(), AbortReason> {
        let terminal = !response.status().is_pending();
        let sender = { self.sinks.lock().unwrap().get(&message_id).cloned() };
        let sender = match sender {
            Some(sender) => sender,
            None => {
                tracing::warn!(
                    "discarding response for unknown message ID {} (status {})",
                    message_id,
                    response.status(),
                );
                return Ok(());
            }
        };

        let deadline = Instant::now() + self.backpressure_timeout;
        let mut item = SinkItem::Response(response);
        loop {
            match sender.try_send(item) {
                Ok(()) => break,
                Err(TrySendError::Full(it)) => {
                    if Instant::now() >= deadline {
                        return Err(AbortReason::ResponseBackpressureTimeout);
                    }
                    item = it;
                    std::thread::sleep(BACKPRESSURE_POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => {
                    // the consumer dropped its stream without waiting
                    // for the terminal response
                    tracing::warn!(
                        "dropping response for abandoned message ID {}",
                        message_id
                    );
                    self.sinks.lock().unwrap().remove(&message_id);
                    return Ok(());
                }
            }
        }

        if terminal {
            // the request is complete: close and remove the sink,
            // so that any further message under this ID is an anomaly
            self.sinks.lock().unwrap().remove(&message_id);
        }
        Ok(())
    }
}

/// Reassembly state of one message on one presentation context.
///
/// Fragments of distinct messages never interleave
/// within a presentation context,
/// so a per-context accumulator is sufficient
/// even with multiple requests in flight.
#[derive(Default)]
struct Assembly {
    command_bytes: Vec<u8>,
    command: Option<ResponseCommand>,
    data_bytes: Vec<u8>,
}

/// The outcome of feeding one PDV fragment into an assembly.
enum AssemblyOutcome {
    /// more fragments needed
    Incomplete,
    /// a full message is ready for routing
    Complete(ResponseCommand, Option<Vec<u8>>),
    /// the message could not be interpreted; fatal to the association
    Failed(AbortReason),
}

impl Assembly {
    fn push(&mut self, pdv: PDataValue) -> AssemblyOutcome {
        match pdv.value_type {
            PDataValueType::Command => {
                self.command_bytes.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return AssemblyOutcome::Incomplete;
                }
                let command = match ResponseCommand::from_bytes(&self.command_bytes) {
                    Ok(command) => command,
                    Err(e) => {
                        return AssemblyOutcome::Failed(AbortReason::MalformedResponse {
                            message: e.to_string(),
                        })
                    }
                };
                self.command_bytes.clear();
                if command.has_dataset {
                    // wait for the data set fragments
                    self.command = Some(command);
                    AssemblyOutcome::Incomplete
                } else {
                    AssemblyOutcome::Complete(command, None)
                }
            }
            PDataValueType::Data => {
                self.data_bytes.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return AssemblyOutcome::Incomplete;
                }
                match self.command.take() {
                    Some(command) => {
                        let data = std::mem::take(&mut self.data_bytes);
                        AssemblyOutcome::Complete(command, Some(data))
                    }
                    None => AssemblyOutcome::Failed(AbortReason::UnexpectedPdu {
                        description: "data set fragments before a command set".to_string(),
                    }),
                }
            }
        }
    }
}

/// The reader loop of one association.
///
/// Owns the receiving side of the socket
/// and a buffer of undecoded bytes;
/// blocks only on socket reads
/// and on pushing into response sinks (bounded, see [`Shared::deliver`]).
pub(crate) fn run_reader(mut stream: TcpStream, shared: &Shared) {
    let mut buffer = BytesMut::with_capacity(shared.max_pdu_length as usize + 1024);
    let mut chunk = [0u8; 8192];
    let mut assemblies: HashMap<u8, Assembly> = HashMap::new();

    loop {
        // drain every whole PDU currently buffered
        match decode_pdu(&buffer, shared.max_pdu_length, shared.strict) {
            Ok(Some((pdu, consumed))) => {
                buffer.advance(consumed);
                if !handle_pdu(pdu, shared, &mut assemblies) {
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                shared.abort_with(AbortReason::MalformedPdu {
                    message: e.to_string(),
                });
                return;
            }
        }

        // need more data
        match stream.read(&mut chunk) {
            Ok(0) => {
                if shared.monitor.current() != AssociationState::Closed {
                    shared.abort_with(AbortReason::Io {
                        message: "connection closed by peer".to_string(),
                    });
                }
                return;
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                // reads fail with ConnectionReset or similar
                // once the association was shut down on purpose
                if shared.monitor.current().is_terminal() {
                    return;
                }
                shared.abort_with(AbortReason::Io {
                    message: e.to_string(),
                });
                return;
            }
        }
    }
}

/// Process one incoming PDU.
/// Returns `false` when the reader loop should stop.
fn handle_pdu(pdu: Pdu, shared: &Shared, assemblies: &mut HashMap<u8, Assembly>) -> bool {
    match pdu {
        Pdu::PData { data } => {
            for pdv in data {
                let pc_id = pdv.presentation_context_id;
                let outcome = assemblies.entry(pc_id).or_default().push(pdv);
                match outcome {
                    AssemblyOutcome::Incomplete => {}
                    AssemblyOutcome::Failed(reason) => {
                        shared.abort_with(reason);
                        return false;
                    }
                    AssemblyOutcome::Complete(command, data) => {
                        assemblies.remove(&pc_id);
                        let dataset = match data {
                            None => None,
                            Some(bytes) => {
                                let ts = shared
                                    .context(pc_id)
                                    .and_then(|c| TransferSyntax::from_uid(&c.transfer_syntax));
                                let ts = match ts {
                                    Some(ts) => ts,
                                    None => {
                                        tracing::warn!(
                                            "discarding message on unknown presentation context {}",
                                            pc_id
                                        );
                                        continue;
                                    }
                                };
                                match read_dataset(&bytes, ts) {
                                    Ok(dataset) => Some(dataset),
                                    Err(e) => {
                                        shared.abort_with(AbortReason::MalformedResponse {
                                            message: e.to_string(),
                                        });
                                        return false;
                                    }
                                }
                            }
                        };
                        let message_id = command.message_id;
                        let response =
                            Response::new(command.status, command.fields, dataset);
                        if let Err(reason) = shared.deliver(message_id, response) {
                            shared.abort_with(reason);
                            return false;
                        }
                    }
                }
            }
            true
        }
        Pdu::ReleaseRP => {
            // wake the caller waiting in `release`;
            // if nobody is waiting, the peer is out of step
            let waiter = shared.release_waiter.lock().unwrap().take();
            match waiter {
                Some(waiter) => {
                    let _ = waiter.try_send(());
                }
                None => {
                    shared.abort_with(AbortReason::UnexpectedPdu {
                        description: "A-RELEASE-RP without a pending release".to_string(),
                    });
                }
            }
            false
        }
        Pdu::AbortRQ { source } => {
            shared.abort_with(AbortReason::PeerAborted { source });
            false
        }
        pdu => {
            shared.abort_with(AbortReason::UnexpectedPdu {
                description: pdu.short_description().to_string(),
            });
            false
        }
    }
}
