//! Association requester module
//!
//! The module provides an abstraction for a DICOM association
//! in which this application entity is the one requesting the association.
//! See [`ClientAssociationOptions`]
//! for details and examples on how to create an association.
use std::{
    borrow::Cow,
    convert::TryInto,
    io::Write,
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use crate::{
    pdu::{
        reader::{read_pdu, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE},
        writer::write_pdu,
        AbortRQSource, AssociationAC, AssociationRJ, AssociationRQ, Pdu,
        PresentationContextProposed, PresentationContextResultReason, UserVariableItem,
    },
    AeAddr, IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME,
};
use snafu::{ensure, Backtrace, ResultExt, Snafu};

use super::{uid::trim_uid, AssociationState, PresentationContext, StateMonitor};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// missing abstract syntax to begin negotiation
    MissingAbstractSyntax { backtrace: Backtrace },

    /// could not resolve target address
    Resolve {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not connect to server
    Connect {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not set up the connection socket
    SetupSocket {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not clone connection socket
    CloneSocket {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("operation timed out during {}", during))]
    Timeout {
        during: &'static str,
        backtrace: Backtrace,
    },

    /// failed to send association request
    SendRequest {
        #[snafu(backtrace)]
        source: crate::pdu::writer::Error,
    },

    /// failed to receive association response
    ReceiveResponse {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },

    #[snafu(display("unexpected response from server `{}`", pdu.short_description()))]
    #[non_exhaustive]
    UnexpectedResponse {
        /// the PDU obtained from the server
        pdu: Box<Pdu>,
    },

    #[snafu(display("protocol version mismatch: expected {}, got {}", expected, got))]
    ProtocolVersionMismatch {
        expected: u16,
        got: u16,
        backtrace: Backtrace,
    },

    #[snafu(display("association rejected by the server: {}", association_rj.source))]
    Rejected {
        association_rj: AssociationRJ,
        backtrace: Backtrace,
    },

    /// no presentation contexts accepted by the server
    NoAcceptedPresentationContexts { backtrace: Backtrace },

    /// failed to send PDU message
    #[non_exhaustive]
    Send {
        #[snafu(backtrace)]
        source: crate::pdu::writer::Error,
    },

    /// failed to send PDU message on wire
    #[non_exhaustive]
    WireSend {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "PDU is too large ({} bytes) to be sent to the remote application entity",
        length
    ))]
    #[non_exhaustive]
    SendTooLongPdu { length: usize, backtrace: Backtrace },

    /// failed to receive PDU message
    #[non_exhaustive]
    Receive {
        #[snafu(backtrace)]
        source: crate::pdu::reader::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A DICOM association builder for a client node.
/// The final outcome is a [`ClientAssociation`].
///
/// This is the standard way of requesting and establishing
/// an association with another DICOM node,
/// that one usually taking the role of a service class provider (SCP).
///
/// # Example
///
/// ```no_run
/// # use dimse_ul::association::client::ClientAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let association = ClientAssociationOptions::new()
///    .with_presentation_context(
///        "1.2.840.10008.5.1.4.1.2.2.1",
///        vec!["1.2.840.10008.1.2.1", "1.2.840.10008.1.2"],
///    )
///    .calling_ae_title("QR-TOOL")
///    .establish_with("HOROS@192.168.1.99:2763")?;
/// # Ok(())
/// # }
/// ```
///
/// At least one presentation context must be specified,
/// either in full through
/// [`with_presentation_context`](Self::with_presentation_context)
/// or through the [`with_abstract_syntax`](Self::with_abstract_syntax) helper,
/// which proposes the two baseline little endian transfer syntaxes.
///
/// All timeouts are explicit options of this value:
/// there is no process-wide configuration.
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions<'a> {
    /// the calling AE title
    calling_ae_title: Cow<'a, str>,
    /// the called AE title
    called_ae_title: Option<Cow<'a, str>>,
    /// the requested application context name
    application_context_name: Cow<'a, str>,
    /// the list of requested presentation contexts
    presentation_contexts: Vec<(Cow<'a, str>, Vec<Cow<'a, str>>)>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length requested for receiving PDUs
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// timeout for the TCP connection
    connect_timeout: Option<Duration>,
    /// timeout for the A-ASSOCIATE-AC / A-ASSOCIATE-RJ wait
    negotiation_timeout: Option<Duration>,
    /// timeout for each PDU read once established
    read_timeout: Option<Duration>,
    /// timeout for the release handshake
    release_timeout: Option<Duration>,
    /// externally provided lifecycle monitor
    monitor: Option<StateMonitor>,
}

impl Default for ClientAssociationOptions<'_> {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: None,
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            presentation_contexts: Vec::new(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            connect_timeout: Some(Duration::from_secs(10)),
            negotiation_timeout: Some(Duration::from_secs(10)),
            read_timeout: None,
            release_timeout: Some(Duration::from_secs(5)),
            monitor: None,
        }
    }
}

impl<'a> ClientAssociationOptions<'a> {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title for the association,
    /// which refers to this DICOM node.
    ///
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title for the association,
    /// which refers to the target DICOM node.
    ///
    /// The default is `ANY-SCP`.
    /// Passing an empty string resets the AE title to the default
    /// (or to the one given through
    /// [`establish_with`](ClientAssociationOptions::establish_with)).
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let cae = called_ae_title.into();
        if cae.is_empty() {
            self.called_ae_title = None;
        } else {
            self.called_ae_title = Some(cae);
        }
        self
    }

    /// Include this presentation context
    /// in the list of proposed presentation contexts.
    pub fn with_presentation_context<T>(
        mut self,
        abstract_syntax_uid: T,
        transfer_syntax_uids: Vec<T>,
    ) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let transfer_syntaxes: Vec<Cow<'a, str>> = transfer_syntax_uids
            .into_iter()
            .map(|t| trim_uid(t.into()))
            .collect();
        self.presentation_contexts
            .push((trim_uid(abstract_syntax_uid.into()), transfer_syntaxes));
        self
    }

    /// Helper to add this abstract syntax
    /// with the default transfer syntaxes
    /// to the list of proposed presentation contexts.
    pub fn with_abstract_syntax<T>(self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let default_transfer_syntaxes: Vec<Cow<'a, str>> =
            vec!["1.2.840.10008.1.2.1".into(), "1.2.840.10008.1.2".into()];
        self.with_presentation_context(abstract_syntax_uid.into(), default_transfer_syntaxes)
    }

    /// Override the maximum PDU length
    /// that this application entity will admit.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override strict mode:
    /// whether receiving PDUs must not
    /// surpass the negotiated maximum PDU length.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the timeout for the TCP connection attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the timeout for the wait
    /// for the peer's association acknowledgement or rejection.
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = Some(timeout);
        self
    }

    /// Set the timeout for each PDU read
    /// on the established association.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the timeout for the release handshake.
    pub fn release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = Some(timeout);
        self
    }

    /// Attach an externally created lifecycle monitor,
    /// so that the association's state transitions
    /// can be observed even if establishment fails.
    pub fn monitor(mut self, monitor: StateMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Initiate the TCP connection to the given address
    /// and request a new DICOM association,
    /// negotiating the presentation contexts in the process.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<ClientAssociation> {
        self.establish_impl(AeAddr::new_socket_addr(address))
    }

    /// Initiate the TCP connection to the given address
    /// and request a new DICOM association,
    /// negotiating the presentation contexts in the process.
    ///
    /// This method allows the called AE title to be given
    /// alongside the socket address,
    /// in the syntax `AE-TITLE@host:port`
    /// (see [`AeAddr`](crate::AeAddr)).
    /// The `called_ae_title` option, when set,
    /// overrides the AE title in the address.
    pub fn establish_with(self, ae_address: &str) -> Result<ClientAssociation> {
        match ae_address.try_into() {
            Ok(ae_address) => self.establish_impl(ae_address),
            Err(_) => self.establish_impl(AeAddr::new_socket_addr(ae_address)),
        }
    }

    fn establish_impl<T>(self, ae_address: AeAddr<T>) -> Result<ClientAssociation>
    where
        T: ToSocketAddrs,
    {
        let ClientAssociationOptions {
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            protocol_version,
            max_pdu_length,
            strict,
            connect_timeout,
            negotiation_timeout,
            read_timeout,
            release_timeout,
            monitor,
        } = self;
        let monitor = monitor.unwrap_or_default();

        // presentation contexts represent intent,
        // so they must not be omitted by the user
        ensure!(
            !presentation_contexts.is_empty(),
            MissingAbstractSyntaxSnafu
        );

        // choose called AE title
        let called_ae_title: &str = match (&called_ae_title, ae_address.ae_title()) {
            (Some(aec), Some(_)) => {
                tracing::warn!(
                    "Option `called_ae_title` overrides the AE title to `{}`",
                    aec
                );
                aec
            }
            (Some(aec), None) => aec,
            (None, Some(aec)) => aec,
            (None, None) => "ANY-SCP",
        };

        let proposed: Vec<_> = presentation_contexts
            .iter()
            .enumerate()
            .map(|(i, presentation_context)| PresentationContextProposed {
                // odd identifiers, as mandated by the standard
                id: (i as u8) * 2 + 1,
                abstract_syntax: presentation_context.0.to_string(),
                transfer_syntaxes: presentation_context
                    .1
                    .iter()
                    .map(|uid| uid.to_string())
                    .collect(),
            })
            .collect();
        let msg = Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title: calling_ae_title.to_string(),
            called_ae_title: called_ae_title.to_string(),
            application_context_name: application_context_name.to_string(),
            presentation_contexts: proposed.clone(),
            user_variables: vec![
                UserVariableItem::MaxLength(max_pdu_length),
                UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
                UserVariableItem::ImplementationVersionName(
                    IMPLEMENTATION_VERSION_NAME.to_string(),
                ),
            ],
        });

        monitor.transition_to(AssociationState::Requesting);
        let mut socket = match connect(&ae_address, connect_timeout) {
            Ok(socket) => socket,
            Err(e) => {
                monitor.transition_to(AssociationState::Aborted);
                return Err(e);
            }
        };

        let establish = |socket: &mut TcpStream| -> Result<(Vec<PresentationContext>, u32, Vec<u8>)> {
            let mut buffer: Vec<u8> = Vec::with_capacity(max_pdu_length as usize);

            // send request
            write_pdu(&mut buffer, &msg).context(SendRequestSnafu)?;
            socket.write_all(&buffer).context(WireSendSnafu)?;
            buffer.clear();
            monitor.transition_to(AssociationState::Negotiating);

            // receive response within the negotiation deadline
            socket
                .set_read_timeout(negotiation_timeout)
                .context(SetupSocketSnafu)?;
            let msg = read_pdu(socket, MAXIMUM_PDU_SIZE, strict).map_err(|e| {
                if e.is_timeout() {
                    TimeoutSnafu {
                        during: "association negotiation",
                    }
                    .build()
                } else {
                    Error::ReceiveResponse { source: e }
                }
            })?;

            match msg {
                Pdu::AssociationAC(AssociationAC {
                    protocol_version: protocol_version_scp,
                    application_context_name: _,
                    presentation_contexts: presentation_contexts_scp,
                    calling_ae_title: _,
                    called_ae_title: _,
                    user_variables,
                }) => {
                    ensure!(
                        protocol_version == protocol_version_scp,
                        ProtocolVersionMismatchSnafu {
                            expected: protocol_version,
                            got: protocol_version_scp,
                        }
                    );

                    let acceptor_max_pdu_length = user_variables
                        .iter()
                        .find_map(|item| match item {
                            UserVariableItem::MaxLength(len) => Some(*len),
                            _ => None,
                        })
                        .unwrap_or(DEFAULT_MAX_PDU);

                    // 0 means no bound; use the largest size the standard admits
                    let acceptor_max_pdu_length = if acceptor_max_pdu_length == 0 {
                        MAXIMUM_PDU_SIZE
                    } else {
                        acceptor_max_pdu_length
                    };

                    // keep the accepted contexts,
                    // matched back to the abstract syntax proposed under each ID
                    let presentation_contexts: Vec<_> = presentation_contexts_scp
                        .into_iter()
                        .filter(|c| c.reason == PresentationContextResultReason::Acceptance)
                        .filter_map(|c| {
                            proposed.iter().find(|p| p.id == c.id).map(|p| {
                                PresentationContext {
                                    id: c.id,
                                    abstract_syntax: p.abstract_syntax.clone(),
                                    transfer_syntax: trim_uid(c.transfer_syntax.into())
                                        .into_owned(),
                                }
                            })
                        })
                        .collect();
                    if presentation_contexts.is_empty() {
                        // abort connection
                        let _ = write_pdu(
                            &mut buffer,
                            &Pdu::AbortRQ {
                                source: AbortRQSource::ServiceUser,
                            },
                        );
                        let _ = socket.write_all(&buffer);
                        return NoAcceptedPresentationContextsSnafu.fail();
                    }

                    Ok((presentation_contexts, acceptor_max_pdu_length, buffer))
                }
                Pdu::AssociationRJ(association_rj) => RejectedSnafu { association_rj }.fail(),
                pdu => {
                    // abort connection
                    let _ = write_pdu(
                        &mut buffer,
                        &Pdu::AbortRQ {
                            source: AbortRQSource::ServiceUser,
                        },
                    );
                    let _ = socket.write_all(&buffer);
                    UnexpectedResponseSnafu { pdu }.fail()
                }
            }
        };

        match establish(&mut socket) {
            Ok((presentation_contexts, acceptor_max_pdu_length, buffer)) => {
                socket
                    .set_read_timeout(read_timeout)
                    .context(SetupSocketSnafu)?;
                monitor.transition_to(AssociationState::Established);
                Ok(ClientAssociation {
                    presentation_contexts,
                    requestor_max_pdu_length: max_pdu_length,
                    acceptor_max_pdu_length,
                    socket,
                    buffer,
                    strict,
                    release_timeout,
                    monitor,
                })
            }
            Err(e) => {
                monitor.transition_to(AssociationState::Aborted);
                let _ = socket.shutdown(std::net::Shutdown::Both);
                Err(e)
            }
        }
    }
}

/// Resolve the target address and open the TCP connection,
/// applying the connect timeout when one is set.
fn connect<T>(ae_address: &AeAddr<T>, connect_timeout: Option<Duration>) -> Result<TcpStream>
where
    T: ToSocketAddrs,
{
    match connect_timeout {
        None => TcpStream::connect(ae_address.socket_addr()).context(ConnectSnafu),
        Some(timeout) => {
            let addrs: Vec<_> = ae_address
                .socket_addr()
                .to_socket_addrs()
                .context(ResolveSnafu)?
                .collect();
            let mut last_err = None;
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(socket) => return Ok(socket),
                    Err(e) => last_err = Some(e),
                }
            }
            match last_err {
                Some(e) if matches!(e.kind(), std::io::ErrorKind::TimedOut) => TimeoutSnafu {
                    during: "TCP connect",
                }
                .fail(),
                Some(e) => Err(e).context(ConnectSnafu),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address resolved to no socket addresses",
                ))
                .context(ResolveSnafu),
            }
        }
    }
}

/// A DICOM upper level association from the perspective
/// of a requesting application entity.
///
/// The most common operations of an established association are
/// [`send`](Self::send)
/// and [`receive`](Self::receive).
///
/// When the value falls out of scope while still established,
/// the program will automatically try to gracefully release the association
/// through a standard release message exchange,
/// then shut down the underlying TCP connection.
#[derive(Debug)]
pub struct ClientAssociation {
    /// The accepted presentation contexts,
    /// each binding an abstract syntax to the agreed transfer syntax.
    presentation_contexts: Vec<PresentationContext>,
    /// The maximum PDU length that this application entity
    /// is expecting to receive
    requestor_max_pdu_length: u32,
    /// The maximum PDU length that the remote application entity accepts
    acceptor_max_pdu_length: u32,
    /// The TCP stream to the other DICOM node
    socket: TcpStream,
    /// Buffer to assemble PDUs before sending them on the wire
    buffer: Vec<u8>,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// timeout for the release handshake
    release_timeout: Option<Duration>,
    /// the lifecycle monitor
    monitor: StateMonitor,
}

impl ClientAssociation {
    /// Retrieve the list of negotiated presentation contexts.
    pub fn presentation_contexts(&self) -> &[PresentationContext] {
        &self.presentation_contexts
    }

    /// Retrieve the maximum PDU length
    /// admitted by the association acceptor.
    pub fn acceptor_max_pdu_length(&self) -> u32 {
        self.acceptor_max_pdu_length
    }

    /// Retrieve the maximum PDU length
    /// that this application entity is expecting to receive.
    pub fn requestor_max_pdu_length(&self) -> u32 {
        self.requestor_max_pdu_length
    }

    /// Retrieve the current lifecycle state of this association.
    pub fn state(&self) -> AssociationState {
        self.monitor.current()
    }

    /// Retrieve a shared handle to the lifecycle monitor.
    pub fn monitor(&self) -> StateMonitor {
        self.monitor.clone()
    }

    /// Send a PDU message to the other intervenient.
    pub fn send(&mut self, msg: &Pdu) -> Result<()> {
        self.buffer.clear();
        write_pdu(&mut self.buffer, msg).context(SendSnafu)?;
        if self.buffer.len() > self.acceptor_max_pdu_length as usize {
            return SendTooLongPduSnafu {
                length: self.buffer.len(),
            }
            .fail();
        }
        self.socket.write_all(&self.buffer).context(WireSendSnafu)
    }

    /// Read a PDU message from the other intervenient,
    /// waiting at most the configured read timeout.
    pub fn receive(&mut self) -> Result<Pdu> {
        read_pdu(&mut self.socket, self.requestor_max_pdu_length, self.strict).map_err(|e| {
            if e.is_timeout() {
                TimeoutSnafu { during: "receive" }.build()
            } else {
                Error::Receive { source: e }
            }
        })
    }

    /// Obtain a second handle to the inner TCP stream,
    /// typically for a dedicated read loop
    /// running independently of PDU submission.
    pub fn clone_socket(&self) -> Result<TcpStream> {
        self.socket.try_clone().context(CloneSocketSnafu)
    }

    /// Gracefully terminate the association by exchanging release messages
    /// and then shutting down the TCP connection.
    pub fn release(mut self) -> Result<()> {
        let out = self.release_impl();
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        match out {
            Ok(()) => self.monitor.transition_to(AssociationState::Closed),
            Err(_) => self.monitor.transition_to(AssociationState::Aborted),
        }
        out
    }

    /// Send an abort message and shut down the TCP connection,
    /// terminating the association.
    pub fn abort(mut self) -> Result<()> {
        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        };
        let out = self.send(&pdu);
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        self.monitor.transition_to(AssociationState::Aborted);
        out
    }

    /// Shut down the TCP connection without any message exchange.
    ///
    /// This is for upper layers which have already
    /// driven the release or abort handshake themselves
    /// through [`send`](Self::send) and an independent read loop.
    pub fn shutdown(&self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }

    /// Release implementation function,
    /// which tries to send a release request and receive a release response.
    /// This is a private function because
    /// terminating a connection should close the socket
    /// even if the exchange fails.
    fn release_impl(&mut self) -> Result<()> {
        self.monitor.transition_to(AssociationState::Releasing);
        let pdu = Pdu::ReleaseRQ;
        self.send(&pdu)?;
        self.socket
            .set_read_timeout(self.release_timeout)
            .context(SetupSocketSnafu)?;
        let pdu = read_pdu(&mut self.socket, self.requestor_max_pdu_length, self.strict).map_err(
            |e| {
                if e.is_timeout() {
                    TimeoutSnafu { during: "release" }.build()
                } else {
                    Error::Receive { source: e }
                }
            },
        )?;

        match pdu {
            Pdu::ReleaseRP => Ok(()),
            pdu => UnexpectedResponseSnafu { pdu }.fail(),
        }
    }
}

/// Automatically release the association and shut down the connection.
impl Drop for ClientAssociation {
    fn drop(&mut self) {
        if self.monitor.current() == AssociationState::Established {
            let out = self.release_impl();
            match out {
                Ok(()) => self.monitor.transition_to(AssociationState::Closed),
                Err(_) => self.monitor.transition_to(AssociationState::Aborted),
            }
        }
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }
}
