//! Typed builders for common Query/Retrieve request data sets.
//!
//! These construct the query keys only;
//! the operation layer transports them opaquely
//! and does not interpret their semantics.
//! Matching keys left empty act as universal matching
//! and double as return keys.
use dimse_core::{tags, DataElement, Dataset, VR};

/// Build the identifier for a study level query
/// by patient demographics:
/// name, birth date, modalities, and a study date or date range
/// (e.g. `"20200101-20200601"`).
///
/// Study instance UID and study description are requested as return keys.
pub fn study_query(
    patient_name: &str,
    patient_birth_date: &str,
    modalities_in_study: &str,
    study_date: &str,
) -> Dataset {
    Dataset::from_element_iter(vec![
        DataElement::new(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100"),
        DataElement::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"),
        DataElement::new(tags::PATIENT_NAME, VR::PN, patient_name),
        DataElement::new(tags::PATIENT_BIRTH_DATE, VR::DA, patient_birth_date),
        DataElement::new(tags::MODALITIES_IN_STUDY, VR::CS, modalities_in_study),
        DataElement::new(tags::STUDY_DATE, VR::DA, study_date),
        DataElement::empty(tags::STUDY_INSTANCE_UID, VR::UI),
        DataElement::empty(tags::STUDY_DESCRIPTION, VR::LO),
    ])
}

/// Build the identifier for retrieving one whole study
/// by its study instance UID,
/// as used with a C-MOVE request.
pub fn study_move_identifier(study_instance_uid: &str) -> Dataset {
    Dataset::from_element_iter(vec![
        DataElement::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"),
        DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, study_instance_uid),
    ])
}

/// Build the identifier for a modality worklist query.
///
/// The scheduled procedure step keys are nested
/// in a Scheduled Procedure Step Sequence with a single item,
/// per the worklist information model.
/// Pass `None` for keys which should match universally.
pub fn worklist_query(
    scheduled_station_ae_title: Option<&str>,
    start_date: Option<&str>,
    modality: Option<&str>,
) -> Dataset {
    fn key(tag: dimse_core::Tag, vr: VR, value: Option<&str>) -> DataElement {
        match value {
            Some(value) => DataElement::new(tag, vr, value),
            None => DataElement::empty(tag, vr),
        }
    }

    let step = Dataset::from_element_iter(vec![
        key(
            tags::SCHEDULED_STATION_AE_TITLE,
            VR::AE,
            scheduled_station_ae_title,
        ),
        key(tags::SCHEDULED_PROCEDURE_STEP_START_DATE, VR::DA, start_date),
        DataElement::empty(tags::SCHEDULED_PROCEDURE_STEP_START_TIME, VR::TM),
        key(tags::MODALITY, VR::CS, modality),
        DataElement::empty(tags::SCHEDULED_PROCEDURE_STEP_ID, VR::SH),
        DataElement::empty(tags::SCHEDULED_PROCEDURE_STEP_DESCRIPTION, VR::LO),
    ]);

    Dataset::from_element_iter(vec![
        DataElement::new(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100"),
        DataElement::empty(tags::PATIENT_NAME, VR::PN),
        DataElement::empty(tags::PATIENT_ID, VR::LO),
        DataElement::empty(tags::PATIENT_BIRTH_DATE, VR::DA),
        DataElement::empty(tags::ACCESSION_NUMBER, VR::SH),
        DataElement::new(
            tags::SCHEDULED_PROCEDURE_STEP_SEQUENCE,
            VR::SQ,
            vec![step],
        ),
    ])
}
