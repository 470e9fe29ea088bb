//! The response type yielded by Query/Retrieve operations.
use crate::status::Status;
use dimse_core::{tags, Dataset};

/// One response message of a C-FIND or C-MOVE operation.
///
/// A response carries its classified [`Status`],
/// the full response command set,
/// and the accompanying data set when one was present:
/// for C-FIND, the matched return keys of one entity;
/// for C-MOVE, usually nothing
/// (progress is reported through the sub-operation counters
/// of the command set instead).
#[derive(Debug, Clone)]
pub struct Response {
    status: Status,
    command: Dataset,
    dataset: Option<Dataset>,
}

impl Response {
    pub(crate) fn new(status: Status, command: Dataset, dataset: Option<Dataset>) -> Self {
        Response {
            status,
            command,
            dataset,
        }
    }

    /// Retrieve the classified status of this response.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Retrieve the full response command set.
    pub fn command(&self) -> &Dataset {
        &self.command
    }

    /// Retrieve the data set accompanying this response, if any.
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    /// Take the data set out of this response, if any.
    pub fn into_dataset(self) -> Option<Dataset> {
        self.dataset
    }

    /// Number of Remaining Sub-operations (C-MOVE progress).
    pub fn remaining(&self) -> Option<u16> {
        self.counter(tags::NUMBER_OF_REMAINING_SUBOPERATIONS)
    }

    /// Number of Completed Sub-operations (C-MOVE progress).
    pub fn completed(&self) -> Option<u16> {
        self.counter(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS)
    }

    /// Number of Failed Sub-operations (C-MOVE progress).
    pub fn failed(&self) -> Option<u16> {
        self.counter(tags::NUMBER_OF_FAILED_SUBOPERATIONS)
    }

    /// Number of Warning Sub-operations (C-MOVE progress).
    pub fn warnings(&self) -> Option<u16> {
        self.counter(tags::NUMBER_OF_WARNING_SUBOPERATIONS)
    }

    fn counter(&self, tag: dimse_core::Tag) -> Option<u16> {
        self.command.get(tag).and_then(|e| e.uint16())
    }
}
