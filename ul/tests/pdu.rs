//! PDU codec tests:
//! encode/decode round trips for every PDU type,
//! resumable decoding over partial input,
//! and framing error detection.
use dimse_ul::pdu::reader::{decode_pdu, read_pdu, Error, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE};
use dimse_ul::pdu::writer::write_pdu;
use dimse_ul::pdu::{
    AbortRQServiceProviderReason, AbortRQSource, AssociationAC, AssociationRJ,
    AssociationRJResult, AssociationRJServiceUserReason, AssociationRJSource, AssociationRQ,
    PDataValue, PDataValueType, Pdu, PresentationContextProposed, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem,
};
use matches::assert_matches;

fn sample_pdus() -> Vec<Pdu> {
    vec![
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "QR-TOOL".to_string(),
            called_ae_title: "HOROS".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![
                PresentationContextProposed {
                    id: 1,
                    abstract_syntax: "1.2.840.10008.5.1.4.1.2.2.1".to_string(),
                    transfer_syntaxes: vec![
                        "1.2.840.10008.1.2.1".to_string(),
                        "1.2.840.10008.1.2".to_string(),
                    ],
                },
                PresentationContextProposed {
                    id: 3,
                    abstract_syntax: "1.2.840.10008.5.1.4.1.2.2.2".to_string(),
                    transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
                },
            ],
            user_variables: vec![
                UserVariableItem::MaxLength(16384),
                UserVariableItem::ImplementationClassUID("2.25.1234".to_string()),
                UserVariableItem::ImplementationVersionName("dimse-rs 0.1.0".to_string()),
            ],
        }),
        Pdu::AssociationAC(AssociationAC {
            protocol_version: 1,
            calling_ae_title: "QR-TOOL".to_string(),
            called_ae_title: "HOROS".to_string(),
            application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
            presentation_contexts: vec![
                PresentationContextResult {
                    id: 1,
                    reason: PresentationContextResultReason::Acceptance,
                    transfer_syntax: "1.2.840.10008.1.2".to_string(),
                },
                PresentationContextResult {
                    id: 3,
                    reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                    transfer_syntax: "1.2.840.10008.1.2".to_string(),
                },
            ],
            user_variables: vec![UserVariableItem::MaxLength(32768)],
        }),
        Pdu::AssociationRJ(AssociationRJ {
            result: AssociationRJResult::Permanent,
            source: AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::NoReasonGiven,
            ),
        }),
        Pdu::PData {
            data: vec![
                PDataValue {
                    presentation_context_id: 1,
                    value_type: PDataValueType::Command,
                    is_last: true,
                    data: vec![0x11; 74],
                },
                PDataValue {
                    presentation_context_id: 1,
                    value_type: PDataValueType::Data,
                    is_last: false,
                    data: vec![0x22; 120],
                },
            ],
        },
        Pdu::ReleaseRQ,
        Pdu::ReleaseRP,
        Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        },
        Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPdu),
        },
    ]
}

#[test]
fn round_trip_all_pdu_types() {
    for pdu in sample_pdus() {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &pdu).unwrap();

        let (decoded, consumed) = decode_pdu(&bytes, MAXIMUM_PDU_SIZE, true)
            .unwrap()
            .unwrap_or_else(|| panic!("whole PDU given, none decoded: {:?}", pdu));
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, pdu);

        // the blocking reader agrees with the slice decoder
        let from_reader = read_pdu(&mut &bytes[..], MAXIMUM_PDU_SIZE, true).unwrap();
        assert_eq!(from_reader, pdu);
    }
}

#[test]
fn decode_is_resumable_over_partial_input() {
    for pdu in sample_pdus() {
        let mut bytes = Vec::new();
        write_pdu(&mut bytes, &pdu).unwrap();

        // every strict prefix must ask for more data
        for len in 0..bytes.len() {
            let outcome = decode_pdu(&bytes[..len], MAXIMUM_PDU_SIZE, true).unwrap();
            assert!(
                outcome.is_none(),
                "prefix of {} out of {} bytes decoded to {:?}",
                len,
                bytes.len(),
                outcome,
            );
        }
    }
}

#[test]
fn decode_reports_consumed_bytes_with_trailing_data() {
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &Pdu::ReleaseRQ).unwrap();
    let release_rq_len = bytes.len();
    write_pdu(&mut bytes, &Pdu::ReleaseRP).unwrap();

    let (pdu, consumed) = decode_pdu(&bytes, DEFAULT_MAX_PDU, true).unwrap().unwrap();
    assert_eq!(pdu, Pdu::ReleaseRQ);
    assert_eq!(consumed, release_rq_len);

    let (pdu, consumed) = decode_pdu(&bytes[release_rq_len..], DEFAULT_MAX_PDU, true)
        .unwrap()
        .unwrap();
    assert_eq!(pdu, Pdu::ReleaseRP);
    assert_eq!(release_rq_len + consumed, bytes.len());
}

#[test]
fn declared_length_beyond_maximum_is_an_error() {
    // a P-DATA-TF header declaring more than the admitted maximum
    let mut bytes = vec![0x04, 0x00];
    bytes.extend_from_slice(&(DEFAULT_MAX_PDU + 1).to_be_bytes());

    let err = decode_pdu(&bytes, DEFAULT_MAX_PDU, true).unwrap_err();
    assert_matches!(err, Error::PduTooLarge { .. });

    // lenient mode admits it up to the standard maximum
    assert_matches!(decode_pdu(&bytes, DEFAULT_MAX_PDU, false), Ok(None));
}

#[test]
fn truncated_pdu_body_is_an_error() {
    let pdu = Pdu::AbortRQ {
        source: AbortRQSource::ServiceUser,
    };
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &pdu).unwrap();

    // a declared length larger than the actual body
    // makes the blocking reader fail rather than return a PDU
    bytes[5] += 4;
    let err = read_pdu(&mut &bytes[..], DEFAULT_MAX_PDU, true).unwrap_err();
    assert_matches!(err, Error::ReadPdu { .. });
}

#[test]
fn clean_end_of_stream_is_no_pdu_available() {
    let err = read_pdu(&mut &[][..], DEFAULT_MAX_PDU, true).unwrap_err();
    assert_matches!(err, Error::NoPduAvailable { .. });
}

#[test]
fn unknown_pdu_type_is_preserved() {
    let pdu = Pdu::Unknown {
        pdu_type: 0x99,
        data: vec![1, 2, 3, 4],
    };
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &pdu).unwrap();
    let (decoded, _) = decode_pdu(&bytes, DEFAULT_MAX_PDU, true).unwrap().unwrap();
    assert_eq!(decoded, pdu);
}
