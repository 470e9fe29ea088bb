//! Client association tests against a hand-rolled acceptor,
//! covering negotiation, release, and rejection.
use dimse_ul::association::client::{ClientAssociationOptions, Error};
use dimse_ul::pdu::reader::{read_pdu, MAXIMUM_PDU_SIZE};
use dimse_ul::pdu::writer::write_pdu;
use dimse_ul::pdu::{
    AssociationAC, AssociationRJ, AssociationRJResult, AssociationRJServiceUserReason,
    AssociationRJSource, Pdu, PresentationContextResult, PresentationContextResultReason,
    UserVariableItem,
};
use dimse_ul::{AssociationState, StateMonitor};
use matches::assert_matches;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{spawn, JoinHandle};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync + 'static>>;

static SCU_AE_TITLE: &str = "QR-SCU";
static SCP_AE_TITLE: &str = "QR-SCP";

static IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
static EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
static STUDY_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";

fn send(stream: &mut TcpStream, pdu: &Pdu) -> Result<()> {
    let mut buffer = Vec::new();
    write_pdu(&mut buffer, pdu)?;
    stream.write_all(&buffer)?;
    Ok(())
}

/// Run an acceptor which agrees to the first presentation context
/// with Implicit VR Little Endian
/// and then handles one release request.
fn spawn_scp() -> Result<(JoinHandle<Result<()>>, SocketAddr)> {
    let listener = TcpListener::bind("localhost:0")?;
    let addr = listener.local_addr()?;

    let h = spawn(move || -> Result<()> {
        let (mut stream, _addr) = listener.accept()?;

        let rq = match read_pdu(&mut stream, MAXIMUM_PDU_SIZE, false)? {
            Pdu::AssociationRQ(rq) => rq,
            pdu => panic!("unexpected PDU: {}", pdu.short_description()),
        };
        assert_eq!(rq.calling_ae_title, SCU_AE_TITLE);
        assert_eq!(rq.called_ae_title, SCP_AE_TITLE);
        assert_eq!(rq.presentation_contexts.len(), 1);
        assert_eq!(rq.presentation_contexts[0].abstract_syntax, STUDY_ROOT_FIND);

        send(
            &mut stream,
            &Pdu::AssociationAC(AssociationAC {
                protocol_version: 1,
                calling_ae_title: rq.calling_ae_title,
                called_ae_title: rq.called_ae_title,
                application_context_name: rq.application_context_name,
                presentation_contexts: vec![PresentationContextResult {
                    id: rq.presentation_contexts[0].id,
                    reason: PresentationContextResultReason::Acceptance,
                    transfer_syntax: IMPLICIT_VR_LE.to_string(),
                }],
                user_variables: vec![UserVariableItem::MaxLength(16384)],
            }),
        )?;

        // handle one release request
        let pdu = read_pdu(&mut stream, MAXIMUM_PDU_SIZE, false)?;
        assert_eq!(pdu, Pdu::ReleaseRQ);
        send(&mut stream, &Pdu::ReleaseRP)?;

        Ok(())
    });
    Ok((h, addr))
}

/// Run an SCU and an SCP concurrently,
/// negotiate an association and release it.
#[test]
fn establish_and_release() {
    let (scp_handle, scp_addr) = spawn_scp().unwrap();

    let monitor = StateMonitor::new();
    let association = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_presentation_context(STUDY_ROOT_FIND, vec![EXPLICIT_VR_LE, IMPLICIT_VR_LE])
        .monitor(monitor.clone())
        .establish(scp_addr)
        .unwrap();

    let contexts = association.presentation_contexts();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].abstract_syntax, STUDY_ROOT_FIND);
    assert_eq!(contexts[0].transfer_syntax, IMPLICIT_VR_LE);
    assert_eq!(association.state(), AssociationState::Established);

    association
        .release()
        .expect("did not have a peaceful release");

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

    scp_handle
        .join()
        .expect("SCP panicked")
        .expect("error at the SCP");
}

#[test]
fn rejection_reports_the_reason() {
    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let scp_handle = spawn(move || -> Result<()> {
        let (mut stream, _addr) = listener.accept()?;
        match read_pdu(&mut stream, MAXIMUM_PDU_SIZE, false)? {
            Pdu::AssociationRQ(_) => {}
            pdu => panic!("unexpected PDU: {}", pdu.short_description()),
        }
        send(
            &mut stream,
            &Pdu::AssociationRJ(AssociationRJ {
                result: AssociationRJResult::Permanent,
                source: AssociationRJSource::ServiceUser(
                    AssociationRJServiceUserReason::NoReasonGiven,
                ),
            }),
        )?;
        Ok(())
    });

    let monitor = StateMonitor::new();
    let err = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .called_ae_title(SCP_AE_TITLE)
        .with_abstract_syntax(STUDY_ROOT_FIND)
        .monitor(monitor.clone())
        .establish(addr)
        .unwrap_err();

    assert_matches!(err, Error::Rejected { .. });
    assert!(err.to_string().contains("no reason given"));
    assert_eq!(monitor.current(), AssociationState::Aborted);

    scp_handle.join().unwrap().unwrap();
}

#[test]
fn no_presentation_contexts_is_an_error_before_any_connection() {
    let err = ClientAssociationOptions::new()
        .calling_ae_title(SCU_AE_TITLE)
        .establish("127.0.0.1:11104")
        .unwrap_err();
    assert_matches!(err, Error::MissingAbstractSyntax { .. });
}
