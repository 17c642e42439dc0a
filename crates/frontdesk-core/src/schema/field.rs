//! Function names and parameter field names.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Booking operations exposed to the orchestrating model.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
pub enum FunctionName {
    SearchPatients,
    CreatePatient,
    GetAvailableSlots,
    CreateAppointment,
    UpdateAppointment,
    CancelAppointment,
}

/// A parameter field. The variant name is the wire name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    AsRefStr,
)]
pub enum Field {
    FName,
    LName,
    WirelessPhone,
    Phone,
    Birthdate,
    Email,
    PatNum,
    AptNum,
    AptDateTime,
    ProvNum,
    Op,
    OpNum,
    Note,
    AppointmentTypeNum,
    IsNewPatient,
    DateStart,
    DateEnd,
    LengthMinutes,
    Reason,
    SendToUnscheduledList,
}

impl Field {
    /// Wire name, e.g. `"PatNum"`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Plain-language meaning, used when asking a model to extract the field.
    pub fn description(self) -> &'static str {
        match self {
            Field::FName => "The patient's first (given) name",
            Field::LName => "The patient's last (family) name",
            Field::WirelessPhone => "The patient's mobile phone number",
            Field::Phone => "A phone number to search by",
            Field::Birthdate => "The patient's date of birth",
            Field::Email => "The patient's email address",
            Field::PatNum => "Patient id",
            Field::AptNum => "Appointment id",
            Field::AptDateTime => "Requested appointment date and start time",
            Field::ProvNum => "Provider (dentist or hygienist) id",
            Field::Op => "Operatory (chair/room) id",
            Field::OpNum => "Operatory (chair/room) id to filter by",
            Field::Note => "Free-text note for the appointment",
            Field::AppointmentTypeNum => "Appointment type id",
            Field::IsNewPatient => "Whether the patient is new to the practice",
            Field::DateStart => "First date of the availability search",
            Field::DateEnd => "Last date of the availability search",
            Field::LengthMinutes => "Appointment length in minutes",
            Field::Reason => "Why the appointment is being cancelled",
            Field::SendToUnscheduledList => {
                "Whether the cancelled appointment goes to the unscheduled list"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_wire_names_round_trip_through_strum() {
        assert_eq!(Field::AptDateTime.name(), "AptDateTime");
        assert_eq!(Field::from_str("WirelessPhone").unwrap(), Field::WirelessPhone);
        assert_eq!(
            FunctionName::from_str("CreateAppointment").unwrap(),
            FunctionName::CreateAppointment
        );
        assert!(FunctionName::from_str("DeleteEverything").is_err());
    }
}
