//! A miniature Query/Retrieve SCP for exercising the client end to end,
//! driven over a plain TCP listener from a test thread.
#![allow(dead_code)]

use dimse_core::{
    encode_dataset, read_dataset, tags, DataElement, Dataset, TransferSyntax, VR,
};
use dimse_ul::pdu::reader::{read_pdu, MAXIMUM_PDU_SIZE};
use dimse_ul::pdu::writer::write_pdu;
use dimse_ul::pdu::{
    AssociationAC, AssociationRJ, AssociationRJResult, AssociationRJServiceUserReason,
    AssociationRJSource, PDataValue, PDataValueType, Pdu, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem,
};
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};

pub const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";

pub const C_FIND_RQ: u16 = 0x0020;
pub const C_FIND_RSP: u16 = 0x8020;
pub const C_MOVE_RQ: u16 = 0x0021;
pub const C_MOVE_RSP: u16 = 0x8021;
pub const C_CANCEL_RQ: u16 = 0x0FFF;

/// Bind a listener on an ephemeral local port.
pub fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// One message received from the client:
/// the command set and, when present, the identifier data set.
#[derive(Debug)]
pub struct Request {
    pub presentation_context_id: u8,
    pub command: Dataset,
    pub dataset: Option<Dataset>,
}

impl Request {
    pub fn command_field(&self) -> u16 {
        self.command
            .get(tags::COMMAND_FIELD)
            .and_then(|e| e.uint16())
            .expect("command field")
    }

    pub fn message_id(&self) -> u16 {
        self.command
            .get(tags::MESSAGE_ID)
            .and_then(|e| e.uint16())
            .or_else(|| {
                self.command
                    .get(tags::MESSAGE_ID_BEING_RESPONDED_TO)
                    .and_then(|e| e.uint16())
            })
            .expect("message id")
    }
}

/// The provider side of one association under test.
pub struct Scp {
    stream: TcpStream,
}

impl Scp {
    /// Accept one association,
    /// agreeing to every proposed presentation context
    /// with Implicit VR Little Endian.
    pub fn accept(listener: &TcpListener) -> Scp {
        let (stream, _) = listener.accept().unwrap();
        let mut scp = Scp { stream };

        let pdu = scp.read();
        let rq = match pdu {
            Pdu::AssociationRQ(rq) => rq,
            pdu => panic!("expected A-ASSOCIATE-RQ, got {}", pdu.short_description()),
        };

        let presentation_contexts = rq
            .presentation_contexts
            .iter()
            .map(|pc| PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: IMPLICIT_VR_LE.to_string(),
            })
            .collect();
        scp.send(&Pdu::AssociationAC(AssociationAC {
            protocol_version: 1,
            calling_ae_title: rq.calling_ae_title,
            called_ae_title: rq.called_ae_title,
            application_context_name: rq.application_context_name,
            presentation_contexts,
            user_variables: vec![UserVariableItem::MaxLength(16384)],
        }));
        scp
    }

    /// Accept the TCP connection but reject the association
    /// with "no reason given".
    pub fn reject(listener: &TcpListener) {
        let (stream, _) = listener.accept().unwrap();
        let mut scp = Scp { stream };
        match scp.read() {
            Pdu::AssociationRQ(_) => {}
            pdu => panic!("expected A-ASSOCIATE-RQ, got {}", pdu.short_description()),
        }
        scp.send(&Pdu::AssociationRJ(AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::NoReasonGiven,
            ),
        }));
    }

    pub fn read(&mut self) -> Pdu {
        read_pdu(&mut self.stream, MAXIMUM_PDU_SIZE, false).unwrap()
    }

    pub fn send(&mut self, pdu: &Pdu) {
        let mut buffer = Vec::new();
        write_pdu(&mut buffer, pdu).unwrap();
        self.stream.write_all(&buffer).unwrap();
    }

    /// Read one whole request message,
    /// reassembling command and data set fragments.
    pub fn read_message(&mut self) -> Request {
        let mut presentation_context_id = 0;
        let mut command_bytes = Vec::new();
        let mut data_bytes = Vec::new();
        let mut command = None;
        let mut expects_data = false;

        loop {
            let pdu = self.read();
            let pdvs = match pdu {
                Pdu::PData { data } => data,
                pdu => panic!("expected P-DATA-TF, got {}", pdu.short_description()),
            };
            for pdv in pdvs {
                presentation_context_id = pdv.presentation_context_id;
                match pdv.value_type {
                    PDataValueType::Command => {
                        command_bytes.extend_from_slice(&pdv.data);
                        if pdv.is_last {
                            let cmd = read_dataset(
                                &command_bytes,
                                TransferSyntax::ImplicitVrLittleEndian,
                            )
                            .unwrap();
                            expects_data = cmd
                                .get(tags::COMMAND_DATA_SET_TYPE)
                                .and_then(|e| e.uint16())
                                .map(|v| v != 0x0101)
                                .unwrap_or(false);
                            command = Some(cmd);
                        }
                    }
                    PDataValueType::Data => {
                        data_bytes.extend_from_slice(&pdv.data);
                        if pdv.is_last {
                            let command = command.expect("data before command");
                            let dataset = read_dataset(
                                &data_bytes,
                                TransferSyntax::ImplicitVrLittleEndian,
                            )
                            .unwrap();
                            return Request {
                                presentation_context_id,
                                command,
                                dataset: Some(dataset),
                            };
                        }
                    }
                }
            }
            if let Some(cmd) = command.as_ref() {
                if !expects_data {
                    return Request {
                        presentation_context_id,
                        command: cmd.clone(),
                        dataset: None,
                    };
                }
            }
        }
    }

    /// Send one response message:
    /// a command set with the given status,
    /// plus an optional identifier data set.
    pub fn send_response(
        &mut self,
        presentation_context_id: u8,
        command_field: u16,
        message_id: u16,
        status: u16,
        dataset: Option<&Dataset>,
    ) {
        self.send_response_with(
            presentation_context_id,
            command_field,
            message_id,
            status,
            dataset,
            Vec::new(),
        )
    }

    /// Send one response message with extra command set elements
    /// (e.g. the C-MOVE sub-operation counters).
    pub fn send_response_with(
        &mut self,
        presentation_context_id: u8,
        command_field: u16,
        message_id: u16,
        status: u16,
        dataset: Option<&Dataset>,
        extra: Vec<DataElement>,
    ) {
        let mut command = Dataset::from_element_iter(vec![
            DataElement::new(tags::COMMAND_FIELD, VR::US, command_field),
            DataElement::new(tags::MESSAGE_ID_BEING_RESPONDED_TO, VR::US, message_id),
            DataElement::new(
                tags::COMMAND_DATA_SET_TYPE,
                VR::US,
                if dataset.is_some() { 0x0001_u16 } else { 0x0101_u16 },
            ),
            DataElement::new(tags::STATUS, VR::US, status),
        ]);
        for element in extra {
            command.put(element);
        }

        let command_bytes =
            encode_dataset(&command, TransferSyntax::ImplicitVrLittleEndian).unwrap();
        let mut pdvs = vec![PDataValue {
            presentation_context_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data: command_bytes,
        }];
        if let Some(dataset) = dataset {
            let data_bytes =
                encode_dataset(dataset, TransferSyntax::ImplicitVrLittleEndian).unwrap();
            pdvs.push(PDataValue {
                presentation_context_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: data_bytes,
            });
        }
        self.send(&Pdu::PData { data: pdvs });
    }

    /// Handle an orderly release handshake.
    pub fn expect_release(&mut self) {
        match self.read() {
            Pdu::ReleaseRQ => {}
            pdu => panic!("expected A-RELEASE-RQ, got {}", pdu.short_description()),
        }
        self.send(&Pdu::ReleaseRP);
    }
}

/// A study entry as a C-FIND match result data set.
pub fn study_result(study_instance_uid: &str, description: &str) -> Dataset {
    Dataset::from_element_iter(vec![
        DataElement::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"),
        DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, study_instance_uid),
        DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, description),
    ])
}
