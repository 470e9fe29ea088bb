//! C-MOVE tests:
//! sub-operation progress counters, the out-of-band destination AE,
//! cancellation mid-flight, and peer-initiated aborts.
mod util;

use dimse_core::{tags, uids, DataElement, VR};
use dimse_qr::{query, AbortReason, Error, QueryRetrieveOptions, Status};
use matches::assert_matches;
use std::thread::spawn;

fn move_options() -> QueryRetrieveOptions<'static> {
    QueryRetrieveOptions::new()
        .calling_ae_title("QR-TOOL")
        .called_ae_title("TEST-SCP")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE)
}

fn counters(remaining: u16, completed: u16, failed: u16, warning: u16) -> Vec<DataElement> {
    vec![
        DataElement::new(tags::NUMBER_OF_REMAINING_SUBOPERATIONS, VR::US, remaining),
        DataElement::new(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS, VR::US, completed),
        DataElement::new(tags::NUMBER_OF_FAILED_SUBOPERATIONS, VR::US, failed),
        DataElement::new(tags::NUMBER_OF_WARNING_SUBOPERATIONS, VR::US, warning),
    ]
}

#[test]
fn move_reports_progress_and_aggregate_counts() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);

        let request = scp.read_message();
        assert_eq!(request.command_field(), util::C_MOVE_RQ);
        // the destination is a command set field, not a query key
        assert_eq!(
            request
                .command
                .get(tags::MOVE_DESTINATION)
                .and_then(|e| e.string())
                .as_deref(),
            Some("STORE-SCP"),
        );
        let keys = request.dataset.as_ref().unwrap();
        assert_eq!(
            keys.get(tags::STUDY_INSTANCE_UID)
                .and_then(|e| e.string())
                .as_deref(),
            Some("1.2.840.999.1"),
        );
        assert!(keys.get(tags::MOVE_DESTINATION).is_none());

        let pc = request.presentation_context_id;
        let id = request.message_id();
        scp.send_response_with(pc, util::C_MOVE_RSP, id, 0xFF00, None, counters(2, 0, 0, 0));
        scp.send_response_with(pc, util::C_MOVE_RSP, id, 0xFF00, None, counters(1, 1, 0, 0));
        scp.send_response_with(pc, util::C_MOVE_RSP, id, 0x0000, None, counters(0, 2, 0, 0));
        scp.expect_release();
    });

    let client = move_options().connect(addr).unwrap();
    let responses: Vec<_> = client
        .move_to("STORE-SCP", query::study_move_identifier("1.2.840.999.1"))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(responses.len(), 3);
    assert!(responses[0].status().is_pending());
    assert_eq!(responses[0].remaining(), Some(2));
    assert_eq!(responses[1].completed(), Some(1));
    assert_eq!(responses[2].status(), Status::Success);
    assert_eq!(responses[2].remaining(), Some(0));
    assert_eq!(responses[2].completed(), Some(2));
    assert_eq!(responses[2].failed(), Some(0));

    client.release().unwrap();
    scp.join().unwrap();
}

#[test]
fn cancelled_move_still_ends_with_a_cancel_status() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);

        let request = scp.read_message();
        let pc = request.presentation_context_id;
        let id = request.message_id();
        scp.send_response_with(pc, util::C_MOVE_RSP, id, 0xFF00, None, counters(5, 1, 0, 0));

        // the client reacts with a C-CANCEL referencing the message ID
        let cancel = scp.read_message();
        assert_eq!(cancel.command_field(), util::C_CANCEL_RQ);
        assert_eq!(cancel.message_id(), id);
        assert!(cancel.dataset.is_none());

        scp.send_response_with(pc, util::C_MOVE_RSP, id, 0xFE00, None, counters(4, 1, 0, 0));
        scp.expect_release();
    });

    let client = move_options().connect(addr).unwrap();
    let mut stream = client
        .move_to("STORE-SCP", query::study_move_identifier("1.2.840.999.1"))
        .unwrap();

    let first = stream.next().unwrap().unwrap();
    assert!(first.status().is_pending());

    stream.cancel().unwrap();

    // the terminal cancel response is still delivered before the stream ends
    let last = stream.next().unwrap().unwrap();
    assert_eq!(last.status(), Status::Cancel);
    assert!(stream.next().is_none());

    client.release().unwrap();
    scp.join().unwrap();
}

#[test]
fn peer_abort_fails_the_stream_in_place_of_a_terminal_status() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);
        let request = scp.read_message();
        let pc = request.presentation_context_id;
        let id = request.message_id();
        scp.send_response_with(pc, util::C_MOVE_RSP, id, 0xFF00, None, counters(3, 0, 0, 0));
        scp.send(&dimse_ul::Pdu::AbortRQ {
            source: dimse_ul::pdu::AbortRQSource::ServiceUser,
        });
    });

    let client = move_options().connect(addr).unwrap();
    let mut stream = client
        .move_to("STORE-SCP", query::study_move_identifier("1.2.840.999.1"))
        .unwrap();

    // the pending response already delivered remains valid
    assert!(stream.next().unwrap().unwrap().status().is_pending());
    let err = stream.next().unwrap().unwrap_err();
    assert_matches!(
        err,
        Error::AssociationAborted {
            reason: AbortReason::PeerAborted { .. },
            ..
        }
    );

    scp.join().unwrap();
}
