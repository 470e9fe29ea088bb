//! Query/Retrieve operation layer.
//!
//! The [`QueryRetrieveClient`] drives C-FIND and C-MOVE operations
//! over one established association.
//! Each operation registers a bounded response sink with the multiplexer
//! and returns a lazy [`ResponseStream`];
//! multiple operations may be outstanding concurrently,
//! each correlated by its own message ID.
use crate::command::{self, Priority};
use crate::demux::{run_reader, AbortReason, Shared, SinkItem};
use crate::response::Response;
use dimse_core::{uids, Dataset, TransferSyntax};
use dimse_ul::association::client::{
    ClientAssociationOptions, Error as AssociationError,
};
use dimse_ul::pdu::{PDataValue, PDataValueType, Pdu};
use dimse_ul::{AssociationState, ClientAssociation, StateMonitor};
use snafu::{Backtrace, IntoError, OptionExt, ResultExt, Snafu};
use std::borrow::Cow;
use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// could not establish association
    ConnectionFailed {
        #[snafu(backtrace)]
        source: AssociationError,
    },

    #[snafu(display("association rejected by the server: {}", association_rj.source))]
    NegotiationRejected {
        association_rj: dimse_ul::pdu::AssociationRJ,
        backtrace: Backtrace,
    },

    /// could not start the association reader thread
    SpawnReader {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// association not established
    NotConnected { backtrace: Backtrace },

    #[snafu(display("no accepted presentation context for abstract syntax {}", abstract_syntax))]
    NoPresentationContext {
        abstract_syntax: String,
        backtrace: Backtrace,
    },

    #[snafu(display("unsupported transfer syntax {}", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },

    /// failed to encode request message
    EncodeRequest {
        #[snafu(backtrace)]
        source: crate::command::Error,
    },

    /// failed to encode identifier data set
    EncodeIdentifier {
        #[snafu(backtrace)]
        source: dimse_core::encode::Error,
    },

    /// failed to send request message
    SendRequest {
        #[snafu(backtrace)]
        source: AssociationError,
    },

    #[snafu(display("operation timed out during {}", during))]
    Timeout {
        during: &'static str,
        backtrace: Backtrace,
    },

    #[snafu(display("association aborted: {}", reason))]
    AssociationAborted {
        reason: AbortReason,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A builder for a Query/Retrieve client:
/// the application entity titles, the presentation contexts to propose,
/// and every timeout and capacity bound of the operation layer.
///
/// All configuration is carried by this value and passed to
/// [`connect`](Self::connect); there are no process-wide defaults.
///
/// # Example
///
/// ```no_run
/// # use dimse_qr::QueryRetrieveOptions;
/// # use dimse_core::uids;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = QueryRetrieveOptions::new()
///     .calling_ae_title("QR-TOOL")
///     .called_ae_title("HOROS")
///     .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
///     .connect("192.168.1.99:2763")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QueryRetrieveOptions<'a> {
    calling_ae_title: Cow<'a, str>,
    called_ae_title: Option<Cow<'a, str>>,
    abstract_syntaxes: Vec<Cow<'a, str>>,
    max_pdu_length: Option<u32>,
    strict: bool,
    priority: Priority,
    connect_timeout: Option<Duration>,
    negotiation_timeout: Option<Duration>,
    release_timeout: Duration,
    /// deadline for each individual response, not for the whole operation
    response_timeout: Duration,
    /// how long the reader may wait on a full response sink
    backpressure_timeout: Duration,
    /// bound of each per-request response queue
    sink_capacity: usize,
    monitor: Option<StateMonitor>,
}

impl Default for QueryRetrieveOptions<'_> {
    fn default() -> Self {
        QueryRetrieveOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: None,
            abstract_syntaxes: Vec::new(),
            max_pdu_length: None,
            strict: true,
            priority: Priority::Medium,
            connect_timeout: Some(Duration::from_secs(10)),
            negotiation_timeout: Some(Duration::from_secs(10)),
            release_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(30),
            backpressure_timeout: Duration::from_secs(5),
            sink_capacity: 64,
            monitor: None,
        }
    }
}

impl<'a> QueryRetrieveOptions<'a> {
    /// Create a new set of options with the default bounds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title.
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.called_ae_title = Some(called_ae_title.into());
        self
    }

    /// Propose a presentation context for this abstract syntax,
    /// offering the two baseline little endian transfer syntaxes.
    ///
    /// At least one abstract syntax must be proposed.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.abstract_syntaxes.push(abstract_syntax_uid.into());
        self
    }

    /// Override the maximum PDU length admitted when receiving.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = Some(value);
        self
    }

    /// Override strict mode for incoming PDU lengths.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the priority attached to every request.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the timeout for the TCP connection attempt.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the timeout for the association negotiation.
    pub fn negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = Some(timeout);
        self
    }

    /// Set the timeout for the release handshake.
    pub fn release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Set the idle deadline for each individual response.
    ///
    /// The deadline applies per response, not per operation:
    /// a C-FIND or C-MOVE may legitimately run long
    /// as long as the peer keeps responding.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set how long the association's reader may wait
    /// on a response sink which the consumer is not draining,
    /// before the association is aborted.
    pub fn backpressure_timeout(mut self, timeout: Duration) -> Self {
        self.backpressure_timeout = timeout;
        self
    }

    /// Set the bound of each per-request response queue.
    pub fn sink_capacity(mut self, capacity: usize) -> Self {
        self.sink_capacity = capacity.max(1);
        self
    }

    /// Attach an externally created lifecycle monitor,
    /// so that state transitions can be observed
    /// even if connecting fails.
    pub fn monitor(mut self, monitor: StateMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Connect to the given socket address,
    /// establish the association,
    /// and start the dedicated reader thread.
    pub fn connect<A: ToSocketAddrs>(self, address: A) -> Result<QueryRetrieveClient> {
        let (ul_options, config) = self.into_parts();
        let association = ul_options
            .establish(address)
            .map_err(map_establish_error)?;
        QueryRetrieveClient::start(association, config)
    }

    /// Connect using a compound `AE-TITLE@host:port` address.
    pub fn connect_with(self, ae_address: &str) -> Result<QueryRetrieveClient> {
        let (ul_options, config) = self.into_parts();
        let association = ul_options
            .establish_with(ae_address)
            .map_err(map_establish_error)?;
        QueryRetrieveClient::start(association, config)
    }

    fn into_parts(self) -> (ClientAssociationOptions<'a>, ClientConfig) {
        let QueryRetrieveOptions {
            calling_ae_title,
            called_ae_title,
            abstract_syntaxes,
            max_pdu_length,
            strict,
            priority,
            connect_timeout,
            negotiation_timeout,
            release_timeout,
            response_timeout,
            backpressure_timeout,
            sink_capacity,
            monitor,
        } = self;

        let mut options = ClientAssociationOptions::new()
            .calling_ae_title(calling_ae_title)
            .strict(strict);
        if let Some(called_ae_title) = called_ae_title {
            options = options.called_ae_title(called_ae_title);
        }
        for abstract_syntax in abstract_syntaxes {
            options = options.with_abstract_syntax(abstract_syntax);
        }
        if let Some(max_pdu_length) = max_pdu_length {
            options = options.max_pdu_length(max_pdu_length);
        }
        if let Some(timeout) = connect_timeout {
            options = options.connect_timeout(timeout);
        }
        if let Some(timeout) = negotiation_timeout {
            options = options.negotiation_timeout(timeout);
        }
        if let Some(monitor) = monitor {
            options = options.monitor(monitor);
        }

        (
            options,
            ClientConfig {
                priority,
                strict,
                release_timeout,
                response_timeout,
                backpressure_timeout,
                sink_capacity,
            },
        )
    }
}

fn map_establish_error(e: AssociationError) -> Error {
    match e {
        AssociationError::Rejected { association_rj, .. } => {
            NegotiationRejectedSnafu { association_rj }.build()
        }
        AssociationError::Timeout { during, .. } => TimeoutSnafu { during }.build(),
        e => ConnectionFailedSnafu.into_error(e),
    }
}

#[derive(Debug, Clone)]
struct ClientConfig {
    priority: Priority,
    strict: bool,
    release_timeout: Duration,
    response_timeout: Duration,
    backpressure_timeout: Duration,
    sink_capacity: usize,
}

/// A Query/Retrieve service class user over one established association.
///
/// Dropping the client releases the association gracefully
/// if it is still established.
#[derive(Debug)]
pub struct QueryRetrieveClient {
    association: Arc<Mutex<ClientAssociation>>,
    shared: Arc<Shared>,
    reader: Option<JoinHandle<()>>,
    next_message_id: AtomicU16,
    config: ClientConfig,
}

impl QueryRetrieveClient {
    fn start(association: ClientAssociation, config: ClientConfig) -> Result<QueryRetrieveClient> {
        let contexts = association.presentation_contexts().to_vec();
        let reader_socket = association.clone_socket().context(ConnectionFailedSnafu)?;
        let shutdown_socket = association.clone_socket().context(ConnectionFailedSnafu)?;

        let shared = Arc::new(Shared {
            sinks: Mutex::new(HashMap::new()),
            abort: Mutex::new(None),
            release_waiter: Mutex::new(None),
            monitor: association.monitor(),
            contexts,
            socket: shutdown_socket,
            max_pdu_length: association.requestor_max_pdu_length(),
            strict: config.strict,
            backpressure_timeout: config.backpressure_timeout,
        });

        let reader_shared = Arc::clone(&shared);
        let reader = std::thread::Builder::new()
            .name("dimse-qr-reader".to_string())
            .spawn(move || run_reader(reader_socket, &reader_shared))
            .context(SpawnReaderSnafu)?;

        Ok(QueryRetrieveClient {
            association: Arc::new(Mutex::new(association)),
            shared,
            reader: Some(reader),
            next_message_id: AtomicU16::new(1),
            config,
        })
    }

    /// Retrieve the current lifecycle state of the association.
    pub fn state(&self) -> AssociationState {
        self.shared.monitor.current()
    }

    /// Retrieve a shared handle to the association lifecycle monitor.
    pub fn monitor(&self) -> StateMonitor {
        self.shared.monitor.clone()
    }

    /// Retrieve the abort cause, if the association was aborted.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        self.shared.abort_reason()
    }

    /// Issue a C-FIND operation with the given query keys
    /// under the Study Root Query/Retrieve information model.
    pub fn find(&self, query: Dataset) -> Result<ResponseStream> {
        self.find_with(
            uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
            query,
        )
    }

    /// Issue a C-FIND operation under the given information model
    /// (e.g. Study Root FIND, or the Modality Worklist model).
    pub fn find_with(&self, abstract_syntax: &str, query: Dataset) -> Result<ResponseStream> {
        self.start_operation(abstract_syntax, None, query)
    }

    /// Issue a C-MOVE operation with the given identifier keys
    /// under the Study Root Query/Retrieve information model,
    /// directing the retrieval to the named destination AE.
    pub fn move_to(&self, destination_ae: &str, identifier: Dataset) -> Result<ResponseStream> {
        self.move_with(
            uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE,
            destination_ae,
            identifier,
        )
    }

    /// Issue a C-MOVE operation under the given information model.
    pub fn move_with(
        &self,
        abstract_syntax: &str,
        destination_ae: &str,
        identifier: Dataset,
    ) -> Result<ResponseStream> {
        self.start_operation(abstract_syntax, Some(destination_ae), identifier)
    }

    /// Gracefully release the association,
    /// waiting for the peer's release reply.
    ///
    /// Requests still in flight are failed with
    /// [`AbortReason::Released`].
    pub fn release(mut self) -> Result<()> {
        self.release_internal()
    }

    fn start_operation(
        &self,
        abstract_syntax: &str,
        destination_ae: Option<&str>,
        identifier: Dataset,
    ) -> Result<ResponseStream> {
        self.ensure_established()?;

        let context = self
            .shared
            .contexts
            .iter()
            .find(|c| c.abstract_syntax == abstract_syntax)
            .with_context(|| NoPresentationContextSnafu {
                abstract_syntax: abstract_syntax.to_string(),
            })?;
        let ts = TransferSyntax::from_uid(&context.transfer_syntax).with_context(|| {
            UnsupportedTransferSyntaxSnafu {
                uid: context.transfer_syntax.clone(),
            }
        })?;
        let presentation_context_id = context.id;

        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let command = match destination_ae {
            Some(destination_ae) => command::move_rq(
                abstract_syntax,
                message_id,
                destination_ae,
                self.config.priority,
            ),
            None => command::find_rq(abstract_syntax, message_id, self.config.priority),
        };
        let command_bytes = command::encode_command(&command).context(EncodeRequestSnafu)?;
        let identifier_bytes =
            dimse_core::encode_dataset(&identifier, ts).context(EncodeIdentifierSnafu)?;

        // register the sink before anything hits the wire,
        // so that no response can arrive unroutable
        let (sender, receiver) = sync_channel(self.config.sink_capacity);
        self.shared
            .sinks
            .lock()
            .unwrap()
            .insert(message_id, sender);

        let sent = self.send_message(
            presentation_context_id,
            &command_bytes,
            Some(&identifier_bytes),
        );
        if let Err(e) = sent {
            self.shared.sinks.lock().unwrap().remove(&message_id);
            return Err(e);
        }

        Ok(ResponseStream {
            receiver,
            message_id,
            presentation_context_id,
            shared: Arc::clone(&self.shared),
            association: Arc::clone(&self.association),
            response_timeout: self.config.response_timeout,
            finished: false,
        })
    }

    /// Send one message as a sequence of P-DATA-TF PDUs,
    /// fragmenting the command set and the data set
    /// to fit the acceptor's maximum PDU length.
    fn send_message(
        &self,
        presentation_context_id: u8,
        command_bytes: &[u8],
        data_bytes: Option<&[u8]>,
    ) -> Result<()> {
        let mut association = self.association.lock().unwrap();
        let max_pdu_length = association.acceptor_max_pdu_length();

        for pdu in pdata_fragments(
            presentation_context_id,
            PDataValueType::Command,
            command_bytes,
            max_pdu_length,
        ) {
            association.send(&pdu).context(SendRequestSnafu)?;
        }
        if let Some(data_bytes) = data_bytes {
            for pdu in pdata_fragments(
                presentation_context_id,
                PDataValueType::Data,
                data_bytes,
                max_pdu_length,
            ) {
                association.send(&pdu).context(SendRequestSnafu)?;
            }
        }
        Ok(())
    }

    fn ensure_established(&self) -> Result<()> {
        match self.shared.monitor.current() {
            AssociationState::Established => Ok(()),
            AssociationState::Aborted => AssociationAbortedSnafu {
                reason: self
                    .shared
                    .abort_reason()
                    .unwrap_or(AbortReason::Released),
            }
            .fail(),
            _ => NotConnectedSnafu.fail(),
        }
    }

    fn release_internal(&mut self) -> Result<()> {
        if self.shared.monitor.current() != AssociationState::Established {
            return Ok(());
        }

        let (waiter_tx, waiter_rx) = sync_channel(1);
        *self.shared.release_waiter.lock().unwrap() = Some(waiter_tx);
        self.shared
            .monitor
            .transition_to(AssociationState::Releasing);

        {
            let mut association = self.association.lock().unwrap();
            if let Err(e) = association.send(&Pdu::ReleaseRQ) {
                drop(association);
                self.shared.abort_with(AbortReason::Io {
                    message: e.to_string(),
                });
                return Err(SendRequestSnafu.into_error(e));
            }
        }

        match waiter_rx.recv_timeout(self.config.release_timeout) {
            Ok(()) => {
                self.shared.monitor.transition_to(AssociationState::Closed);
                // fail whatever was still in flight
                let sinks: Vec<_> = {
                    let mut sinks = self.shared.sinks.lock().unwrap();
                    sinks.drain().collect()
                };
                for (_, sender) in sinks {
                    let _ = sender.try_send(SinkItem::Aborted(AbortReason::Released));
                }
                self.association.lock().unwrap().shutdown();
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                self.shared.abort_with(AbortReason::Io {
                    message: "no release reply within the deadline".to_string(),
                });
                TimeoutSnafu { during: "release" }.fail()
            }
            Err(RecvTimeoutError::Disconnected) => AssociationAbortedSnafu {
                reason: self
                    .shared
                    .abort_reason()
                    .unwrap_or(AbortReason::Released),
            }
            .fail(),
        }
    }
}

impl Drop for QueryRetrieveClient {
    fn drop(&mut self) {
        let _ = self.release_internal();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

/// Split one message set into P-DATA-TF PDUs
/// whose total size respects the given maximum PDU length.
fn pdata_fragments(
    presentation_context_id: u8,
    value_type: PDataValueType,
    bytes: &[u8],
    max_pdu_length: u32,
) -> Vec<Pdu> {
    // leave room for the PDU header and the PDV item header
    let max_fragment = (max_pdu_length as usize).saturating_sub(12).max(1);

    if bytes.is_empty() {
        return vec![Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type,
                is_last: true,
                data: Vec::new(),
            }],
        }];
    }

    let chunks: Vec<&[u8]> = bytes.chunks(max_fragment).collect();
    let count = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type,
                is_last: i + 1 == count,
                data: chunk.to_vec(),
            }],
        })
        .collect()
}

/// A lazy stream of the responses to one C-FIND or C-MOVE request.
///
/// Iteration yields zero or more pending responses
/// followed by exactly one terminal response
/// (success, cancel, warning, or failure),
/// after which the stream is exhausted.
/// An error terminates the stream in place of a normal terminal status;
/// responses already yielded remain valid.
///
/// Dropping the stream before the terminal response
/// abandons the request:
/// later responses for it are discarded as protocol anomalies.
#[derive(Debug)]
pub struct ResponseStream {
    receiver: Receiver<SinkItem>,
    message_id: u16,
    presentation_context_id: u8,
    shared: Arc<Shared>,
    association: Arc<Mutex<ClientAssociation>>,
    response_timeout: Duration,
    finished: bool,
}

impl ResponseStream {
    /// The message ID correlating this request with its responses.
    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    /// Request cancellation of this operation
    /// by sending a C-CANCEL-RQ referencing its message ID.
    ///
    /// The stream stays open:
    /// the peer still concludes it with a terminal response,
    /// normally with a [cancel](crate::Status::Cancel) status,
    /// so that no late in-flight data is silently lost.
    pub fn cancel(&mut self) -> Result<()> {
        let command = command::cancel_rq(self.message_id);
        let command_bytes = command::encode_command(&command).context(EncodeRequestSnafu)?;
        let pdu = Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: self.presentation_context_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: command_bytes,
            }],
        };
        self.association
            .lock()
            .unwrap()
            .send(&pdu)
            .context(SendRequestSnafu)
    }
}

impl Iterator for ResponseStream {
    type Item = Result<Response>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.receiver.recv_timeout(self.response_timeout) {
            Ok(SinkItem::Response(response)) => {
                if !response.status().is_pending() {
                    self.finished = true;
                }
                Some(Ok(response))
            }
            Ok(SinkItem::Aborted(reason)) => {
                self.finished = true;
                Some(AssociationAbortedSnafu { reason }.fail())
            }
            Err(RecvTimeoutError::Timeout) => {
                // only this request dies; the association stays usable
                self.finished = true;
                self.shared.sinks.lock().unwrap().remove(&self.message_id);
                Some(TimeoutSnafu { during: "response" }.fail())
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.finished = true;
                let reason = self
                    .shared
                    .abort_reason()
                    .unwrap_or(AbortReason::Released);
                Some(AssociationAbortedSnafu { reason }.fail())
            }
        }
    }
}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.sinks.lock().unwrap().remove(&self.message_id);
        }
    }
}
