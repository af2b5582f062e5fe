use serde::{Deserialize, Serialize};

/// Where a dataset sits in the digital-preservation pipeline, as reported
/// by the catalogue (spec §4.9, GLOSSARY "Pending dataset"/"Preserved
/// dataset"). Ordering follows the catalogue's own state numbering; PIFS
/// only ever needs to tell "still pending" apart from "terminal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreservationState {
    Initialized,
    Generating,
    Uploading,
    Validating,
    Packaging,
    SentToPreservation,
    InPackagingService,
    InDigitalPreservation,
    AcceptedToDigitalPreservation,
    RejectedInDigitalPreservationService,
}

impl PreservationState {
    /// A dataset at or past acceptance will never again block deletion or
    /// need its metadata kept around for a later retry; every other state
    /// counts as "pending" (spec §4.9). The catalogue's own state
    /// numbering puts `InDigitalPreservation` at or beyond
    /// `AcceptedToDigitalPreservation` (`gen_metadata.py`'s
    /// `DS_STATE_ACCEPTED_TO_DIGITAL_PRESERVATION <= state <=
    /// DS_STATE_IN_DIGITAL_PRESERVATION` range), so both count as
    /// terminal here.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PreservationState::AcceptedToDigitalPreservation
                | PreservationState::InDigitalPreservation
                | PreservationState::RejectedInDigitalPreservationService
        )
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }

    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            PreservationState::AcceptedToDigitalPreservation
                | PreservationState::InDigitalPreservation
        )
    }
}

/// A dataset as reported by the catalogue for a project (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub identifier: String,
    pub preservation_state: PreservationState,
}

/// Derives the guard spec §4.9/C13 relies on: a delete is blocked iff any
/// dataset touching the target is still pending. Accepted datasets are
/// left alone entirely (their catalogue metadata survives the delete);
/// rejected ones impose no restriction.
pub fn has_pending_dataset(datasets: &[DatasetInfo]) -> bool {
    datasets.iter().any(|d| d.preservation_state.is_pending())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ds(state: PreservationState) -> DatasetInfo {
        DatasetInfo {
            identifier: "ds1".into(),
            preservation_state: state,
        }
    }

    #[test]
    fn accepted_and_rejected_are_not_pending() {
        assert!(!has_pending_dataset(&[ds(
            PreservationState::AcceptedToDigitalPreservation
        )]));
        assert!(!has_pending_dataset(&[ds(
            PreservationState::RejectedInDigitalPreservationService
        )]));
    }

    #[test]
    fn in_digital_preservation_is_terminal_and_accepted() {
        assert!(PreservationState::InDigitalPreservation.is_terminal());
        assert!(PreservationState::InDigitalPreservation.is_accepted());
        assert!(!has_pending_dataset(&[ds(
            PreservationState::InDigitalPreservation
        )]));
    }

    #[test]
    fn anything_else_is_pending() {
        assert!(has_pending_dataset(&[ds(PreservationState::Validating)]));
        assert!(has_pending_dataset(&[ds(PreservationState::Initialized)]));
    }

    #[test]
    fn empty_list_has_no_pending_dataset() {
        assert!(!has_pending_dataset(&[]));
    }

    #[test]
    fn one_pending_among_terminal_blocks() {
        let datasets = vec![
            ds(PreservationState::AcceptedToDigitalPreservation),
            ds(PreservationState::Packaging),
        ];
        assert!(has_pending_dataset(&datasets));
    }
}
