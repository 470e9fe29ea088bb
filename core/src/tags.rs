//! Data element tag constants for the attributes
//! handled by this Query/Retrieve stack,
//! plus the dictionary subset needed
//! to infer value representations in Implicit VR data sets.
use crate::header::{Tag, VR};

// command set (group 0000)
pub const COMMAND_GROUP_LENGTH: Tag = Tag(0x0000, 0x0000);
pub const AFFECTED_SOP_CLASS_UID: Tag = Tag(0x0000, 0x0002);
pub const COMMAND_FIELD: Tag = Tag(0x0000, 0x0100);
pub const MESSAGE_ID: Tag = Tag(0x0000, 0x0110);
pub const MESSAGE_ID_BEING_RESPONDED_TO: Tag = Tag(0x0000, 0x0120);
pub const MOVE_DESTINATION: Tag = Tag(0x0000, 0x0600);
pub const PRIORITY: Tag = Tag(0x0000, 0x0700);
pub const COMMAND_DATA_SET_TYPE: Tag = Tag(0x0000, 0x0800);
pub const STATUS: Tag = Tag(0x0000, 0x0900);
pub const NUMBER_OF_REMAINING_SUBOPERATIONS: Tag = Tag(0x0000, 0x1020);
pub const NUMBER_OF_COMPLETED_SUBOPERATIONS: Tag = Tag(0x0000, 0x1021);
pub const NUMBER_OF_FAILED_SUBOPERATIONS: Tag = Tag(0x0000, 0x1022);
pub const NUMBER_OF_WARNING_SUBOPERATIONS: Tag = Tag(0x0000, 0x1023);

// query and identifier attributes
pub const SPECIFIC_CHARACTER_SET: Tag = Tag(0x0008, 0x0005);
pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);
pub const ACCESSION_NUMBER: Tag = Tag(0x0008, 0x0050);
pub const QUERY_RETRIEVE_LEVEL: Tag = Tag(0x0008, 0x0052);
pub const MODALITY: Tag = Tag(0x0008, 0x0060);
pub const MODALITIES_IN_STUDY: Tag = Tag(0x0008, 0x0061);
pub const STUDY_DESCRIPTION: Tag = Tag(0x0008, 0x1030);
pub const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
pub const PATIENT_BIRTH_DATE: Tag = Tag(0x0010, 0x0030);
pub const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
pub const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);

// modality worklist attributes
pub const SCHEDULED_STATION_AE_TITLE: Tag = Tag(0x0040, 0x0001);
pub const SCHEDULED_PROCEDURE_STEP_START_DATE: Tag = Tag(0x0040, 0x0002);
pub const SCHEDULED_PROCEDURE_STEP_START_TIME: Tag = Tag(0x0040, 0x0003);
pub const SCHEDULED_PROCEDURE_STEP_DESCRIPTION: Tag = Tag(0x0040, 0x0007);
pub const SCHEDULED_PROCEDURE_STEP_ID: Tag = Tag(0x0040, 0x0009);
pub const SCHEDULED_PROCEDURE_STEP_SEQUENCE: Tag = Tag(0x0040, 0x0100);

// sequence delimitation (group FFFE)
pub const ITEM: Tag = Tag(0xFFFE, 0xE000);
pub const ITEM_DELIMITER: Tag = Tag(0xFFFE, 0xE00D);
pub const SEQUENCE_DELIMITER: Tag = Tag(0xFFFE, 0xE0DD);

/// Look up the value representation of the given tag
/// in the dictionary subset known to this stack.
///
/// Returns `None` for tags outside the subset,
/// which decode as `UN` under Implicit VR.
pub fn vr_of(tag: Tag) -> Option<VR> {
    let vr = match tag {
        COMMAND_GROUP_LENGTH => VR::UL,
        AFFECTED_SOP_CLASS_UID => VR::UI,
        COMMAND_FIELD
        | MESSAGE_ID
        | MESSAGE_ID_BEING_RESPONDED_TO
        | PRIORITY
        | COMMAND_DATA_SET_TYPE
        | STATUS
        | NUMBER_OF_REMAINING_SUBOPERATIONS
        | NUMBER_OF_COMPLETED_SUBOPERATIONS
        | NUMBER_OF_FAILED_SUBOPERATIONS
        | NUMBER_OF_WARNING_SUBOPERATIONS => VR::US,
        MOVE_DESTINATION | SCHEDULED_STATION_AE_TITLE => VR::AE,
        SPECIFIC_CHARACTER_SET | QUERY_RETRIEVE_LEVEL | MODALITY | MODALITIES_IN_STUDY => VR::CS,
        STUDY_DATE | PATIENT_BIRTH_DATE | SCHEDULED_PROCEDURE_STEP_START_DATE => VR::DA,
        SCHEDULED_PROCEDURE_STEP_START_TIME => VR::TM,
        ACCESSION_NUMBER | SCHEDULED_PROCEDURE_STEP_ID => VR::SH,
        STUDY_DESCRIPTION | SCHEDULED_PROCEDURE_STEP_DESCRIPTION | PATIENT_ID => VR::LO,
        PATIENT_NAME => VR::PN,
        STUDY_INSTANCE_UID | SERIES_INSTANCE_UID => VR::UI,
        SCHEDULED_PROCEDURE_STEP_SEQUENCE => VR::SQ,
        _ => return None,
    };
    Some(vr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_subset_lookup() {
        assert_eq!(vr_of(STATUS), Some(VR::US));
        assert_eq!(vr_of(PATIENT_NAME), Some(VR::PN));
        assert_eq!(vr_of(SCHEDULED_PROCEDURE_STEP_SEQUENCE), Some(VR::SQ));
        assert_eq!(vr_of(Tag(0x7FE0, 0x0010)), None);
    }
}
