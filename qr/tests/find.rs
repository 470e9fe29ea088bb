//! C-FIND tests:
//! response streaming and termination,
//! message ID routing under concurrent operations,
//! per-response timeouts, and backpressure.
mod util;

use dimse_core::{tags, uids};
use dimse_qr::{query, AbortReason, Error, QueryRetrieveOptions, Status};
use dimse_ul::AssociationState;
use matches::assert_matches;
use std::thread::spawn;
use std::time::{Duration, Instant};

fn find_options() -> QueryRetrieveOptions<'static> {
    QueryRetrieveOptions::new()
        .calling_ae_title("QR-TOOL")
        .called_ae_title("TEST-SCP")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
}

#[test]
fn two_pending_matches_then_success() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);

        let request = scp.read_message();
        assert_eq!(request.command_field(), util::C_FIND_RQ);
        let keys = request.dataset.as_ref().expect("query keys data set");
        assert_eq!(
            keys.get(tags::PATIENT_NAME).and_then(|e| e.string()).as_deref(),
            Some("BEETHOVEN^LUDWIG^VAN"),
        );
        assert_eq!(
            keys.get(tags::STUDY_DATE).and_then(|e| e.string()).as_deref(),
            Some("20200101-20200601"),
        );

        let pc = request.presentation_context_id;
        let id = request.message_id();
        scp.send_response(
            pc,
            util::C_FIND_RSP,
            id,
            0xFF00,
            Some(&util::study_result("1.2.840.999.1", "CR THORAX")),
        );
        scp.send_response(
            pc,
            util::C_FIND_RSP,
            id,
            0xFF00,
            Some(&util::study_result("1.2.840.999.2", "CR HAND")),
        );
        scp.send_response(pc, util::C_FIND_RSP, id, 0x0000, None);
        scp.expect_release();
    });

    let client = find_options().connect(addr).unwrap();
    let query = query::study_query(
        "BEETHOVEN^LUDWIG^VAN",
        "17700101",
        "CR",
        "20200101-20200601",
    );

    let responses: Vec<_> = client
        .find(query)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    // exactly three responses: two pending matches and the terminal status
    assert_eq!(responses.len(), 3);
    assert!(responses[0].status().is_pending());
    assert!(responses[1].status().is_pending());
    assert_eq!(responses[2].status(), Status::Success);
    assert!(responses[2].dataset().is_none());

    let uids_found: Vec<_> = responses[..2]
        .iter()
        .map(|r| {
            r.dataset()
                .and_then(|ds| ds.get(tags::STUDY_INSTANCE_UID))
                .and_then(|e| e.string())
                .unwrap()
                .into_owned()
        })
        .collect();
    assert_eq!(uids_found, vec!["1.2.840.999.1", "1.2.840.999.2"]);

    client.release().unwrap();
    scp.join().unwrap();
}

#[test]
fn no_matches_still_delivers_the_terminal_response() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);
        let request = scp.read_message();
        scp.send_response(
            request.presentation_context_id,
            util::C_FIND_RSP,
            request.message_id(),
            0x0000,
            None,
        );
        scp.expect_release();
    });

    let client = find_options().connect(addr).unwrap();
    let responses: Vec<_> = client
        .find(query::study_query("NOBODY", "", "", ""))
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status(), Status::Success);

    client.release().unwrap();
    scp.join().unwrap();
}

#[test]
fn concurrent_finds_route_by_message_id() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);

        let first = scp.read_message();
        let second = scp.read_message();
        let pc = first.presentation_context_id;
        let (id1, id2) = (first.message_id(), second.message_id());
        assert_ne!(id1, id2, "message IDs must be unique per association");

        // respond out of order, interleaving the two operations
        scp.send_response(
            pc,
            util::C_FIND_RSP,
            id2,
            0xFF00,
            Some(&util::study_result("1.2.840.999.22", "SECOND")),
        );
        scp.send_response(
            pc,
            util::C_FIND_RSP,
            id1,
            0xFF00,
            Some(&util::study_result("1.2.840.999.11", "FIRST")),
        );
        scp.send_response(pc, util::C_FIND_RSP, id2, 0x0000, None);
        scp.send_response(pc, util::C_FIND_RSP, id1, 0x0000, None);
        scp.expect_release();
    });

    let client = find_options().connect(addr).unwrap();
    let first = client
        .find(query::study_query("A", "", "", ""))
        .unwrap();
    let second = client
        .find(query::study_query("B", "", "", ""))
        .unwrap();

    // consume the streams in the opposite order of the deliveries;
    // responses are buffered per request and never cross over
    let second_responses: Vec<_> = second.collect::<Result<Vec<_>, _>>().unwrap();
    let first_responses: Vec<_> = first.collect::<Result<Vec<_>, _>>().unwrap();

    let description = |responses: &[dimse_qr::Response]| {
        responses[0]
            .dataset()
            .and_then(|ds| ds.get(tags::STUDY_DESCRIPTION))
            .and_then(|e| e.string())
            .unwrap()
            .into_owned()
    };
    assert_eq!(second_responses.len(), 2);
    assert_eq!(first_responses.len(), 2);
    assert_eq!(description(&second_responses), "SECOND");
    assert_eq!(description(&first_responses), "FIRST");

    client.release().unwrap();
    scp.join().unwrap();
}

#[test]
fn a_silent_peer_times_out_one_request_only() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);
        let request = scp.read_message();
        scp.send_response(
            request.presentation_context_id,
            util::C_FIND_RSP,
            request.message_id(),
            0xFF00,
            Some(&util::study_result("1.2.840.999.1", "CR THORAX")),
        );
        // never send the terminal response
        scp.expect_release();
    });

    let client = find_options()
        .response_timeout(Duration::from_millis(200))
        .connect(addr)
        .unwrap();
    let mut stream = client.find(query::study_query("A", "", "", "")).unwrap();

    assert!(stream.next().unwrap().unwrap().status().is_pending());
    let err = stream.next().unwrap().unwrap_err();
    assert_matches!(err, Error::Timeout { .. });
    assert!(stream.next().is_none());

    // the timeout killed the request, not the association
    assert_eq!(client.state(), AssociationState::Established);
    client.release().unwrap();
    scp.join().unwrap();
}

#[test]
fn a_stalled_consumer_aborts_the_association_within_the_bound() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);
        let request = scp.read_message();
        let pc = request.presentation_context_id;
        let id = request.message_id();
        for i in 0..10 {
            scp.send_response(
                pc,
                util::C_FIND_RSP,
                id,
                0xFF00,
                Some(&util::study_result(&format!("1.2.840.999.{}", i), "X")),
            );
        }
        // the client aborts; nothing further to do
    });

    let client = find_options()
        .sink_capacity(1)
        .backpressure_timeout(Duration::from_millis(200))
        .connect(addr)
        .unwrap();
    let mut stream = client.find(query::study_query("A", "", "", "")).unwrap();

    // do not drain the stream; the reader must give up within the bound
    let deadline = Instant::now() + Duration::from_secs(5);
    while client.state() != AssociationState::Aborted {
        assert!(
            Instant::now() < deadline,
            "association did not abort on backpressure"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(
        client.abort_reason(),
        Some(AbortReason::ResponseBackpressureTimeout),
    );

    // the stream drains what was buffered, then surfaces the abort
    let mut saw_abort = false;
    for item in &mut stream {
        match item {
            Ok(response) => assert!(response.status().is_pending()),
            Err(Error::AssociationAborted {
                reason: AbortReason::ResponseBackpressureTimeout,
                ..
            }) => {
                saw_abort = true;
                break;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert!(saw_abort);

    scp.join().unwrap();
}

#[test]
fn worklist_query_round_trips_the_procedure_step_sequence() {
    let (listener, addr) = util::listener();
    let scp = spawn(move || {
        let mut scp = util::Scp::accept(&listener);
        let request = scp.read_message();
        assert_eq!(request.command_field(), util::C_FIND_RQ);

        // the nested procedure step keys survive the wire
        let keys = request.dataset.as_ref().unwrap();
        let items = keys
            .get(tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE)
            .and_then(|e| e.items())
            .expect("scheduled procedure step sequence");
        assert_eq!(
            items[0]
                .get(tags::SCHEDULED_STATION_AE_TITLE)
                .and_then(|e| e.string())
                .as_deref(),
            Some("CT01"),
        );

        scp.send_response(
            request.presentation_context_id,
            util::C_FIND_RSP,
            request.message_id(),
            0x0000,
            None,
        );
        scp.expect_release();
    });

    let client = QueryRetrieveOptions::new()
        .calling_ae_title("QR-TOOL")
        .with_abstract_syntax(uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND)
        .connect(addr)
        .unwrap();

    let responses: Vec<_> = client
        .find_with(
            uids::MODALITY_WORKLIST_INFORMATION_MODEL_FIND,
            query::worklist_query(Some("CT01"), Some("20260401"), Some("CT")),
        )
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status(), Status::Success);

    client.release().unwrap();
    scp.join().unwrap();
}
