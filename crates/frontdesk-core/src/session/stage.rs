//! Conversation stage and intent.
//!
//! Both are descriptive metadata. Nothing in the pipeline refuses a call
//! because of the current stage.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Coarse purpose of the conversation, as detected from user turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
    BookAppointment,
    RescheduleAppointment,
    CancelAppointment,
    CheckAvailability,
    NewPatient,
    FindPatient,
}

/// Progress of the booking conversation.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStage {
    #[default]
    CollectingIdentity,
    CollectingAppointment,
    Confirming,
    Booked,
    Abandoned,
}

/// Facts that move the stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StageEvent {
    /// A patient id became authoritative
    PatientIdentified,
    /// Date and time for an appointment are known
    AppointmentDetailsComplete,
    /// An appointment create/update succeeded
    AppointmentBooked,
    /// An appointment cancel succeeded
    AppointmentCancelled,
}

impl ConversationStage {
    /// Transition table. `None` means the event does not move this stage.
    pub fn transition(self, event: StageEvent) -> Option<ConversationStage> {
        use ConversationStage::*;
        use StageEvent::*;

        match (self, event) {
            (CollectingIdentity, PatientIdentified) => Some(CollectingAppointment),
            (CollectingAppointment, AppointmentDetailsComplete) => Some(Confirming),
            (CollectingIdentity | CollectingAppointment | Confirming, AppointmentBooked) => {
                Some(Booked)
            }
            (Abandoned, AppointmentBooked) => Some(Booked),
            (CollectingIdentity | CollectingAppointment | Confirming | Booked, AppointmentCancelled) => {
                Some(Abandoned)
            }
            _ => None,
        }
    }
}
