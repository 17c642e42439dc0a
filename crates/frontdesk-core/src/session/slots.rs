//! Slot and identifier types.
//!
//! Slots are facts accumulated from conversation (name, phone, preferred
//! date). Identifiers are the critical ids (patient, appointment) that may only
//! be set from a successful handler result; see [`crate::ledger`].

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Named slot in the conversation state.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SlotKey {
    FirstName,
    LastName,
    Phone,
    Birthdate,
    Email,
    AppointmentType,
    Date,
    Time,
    ProviderId,
    OperatoryId,
    Note,
}

/// Where a slot value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSource {
    /// Regex/heuristic extraction over a user turn
    Deterministic,
    /// The LLM extraction fallback
    Llm,
    /// A successful domain handler result
    Handler,
}

/// A filled slot with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotValue {
    pub value: String,
    pub source: SlotSource,
    /// Index of the message the value was extracted from, when known
    pub turn: Option<usize>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSlots {
    pub first_name: Option<SlotValue>,
    pub last_name: Option<SlotValue>,
    pub phone: Option<SlotValue>,
    pub birthdate: Option<SlotValue>,
    pub email: Option<SlotValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentSlots {
    pub appointment_type: Option<SlotValue>,
    pub date: Option<SlotValue>,
    pub time: Option<SlotValue>,
    pub provider_id: Option<SlotValue>,
    pub operatory_id: Option<SlotValue>,
    pub note: Option<SlotValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    pub patient: PatientSlots,
    pub appointment: AppointmentSlots,
}

impl Slots {
    pub fn get(&self, key: SlotKey) -> Option<&SlotValue> {
        match key {
            SlotKey::FirstName => self.patient.first_name.as_ref(),
            SlotKey::LastName => self.patient.last_name.as_ref(),
            SlotKey::Phone => self.patient.phone.as_ref(),
            SlotKey::Birthdate => self.patient.birthdate.as_ref(),
            SlotKey::Email => self.patient.email.as_ref(),
            SlotKey::AppointmentType => self.appointment.appointment_type.as_ref(),
            SlotKey::Date => self.appointment.date.as_ref(),
            SlotKey::Time => self.appointment.time.as_ref(),
            SlotKey::ProviderId => self.appointment.provider_id.as_ref(),
            SlotKey::OperatoryId => self.appointment.operatory_id.as_ref(),
            SlotKey::Note => self.appointment.note.as_ref(),
        }
    }

    /// Shorthand for the raw value of a slot.
    pub fn value(&self, key: SlotKey) -> Option<&str> {
        self.get(key).map(|slot| slot.value.as_str())
    }

    // Writes go through the merge policy only.
    pub(crate) fn entry(&mut self, key: SlotKey) -> &mut Option<SlotValue> {
        match key {
            SlotKey::FirstName => &mut self.patient.first_name,
            SlotKey::LastName => &mut self.patient.last_name,
            SlotKey::Phone => &mut self.patient.phone,
            SlotKey::Birthdate => &mut self.patient.birthdate,
            SlotKey::Email => &mut self.patient.email,
            SlotKey::AppointmentType => &mut self.appointment.appointment_type,
            SlotKey::Date => &mut self.appointment.date,
            SlotKey::Time => &mut self.appointment.time,
            SlotKey::ProviderId => &mut self.appointment.provider_id,
            SlotKey::OperatoryId => &mut self.appointment.operatory_id,
            SlotKey::Note => &mut self.appointment.note,
        }
    }
}

/// Critical identifier fields.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IdentifierKey {
    PatientId,
    AppointmentId,
}

/// An identifier value established by a successful handler result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthoritativeId {
    pub value: i64,
    /// Function whose successful result produced the value
    pub function_name: String,
    /// Position of that result in the session's call log
    pub ledger_index: usize,
    pub set_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    patient_id: Option<AuthoritativeId>,
    appointment_id: Option<AuthoritativeId>,
}

impl Identifiers {
    pub fn get(&self, key: IdentifierKey) -> Option<&AuthoritativeId> {
        match key {
            IdentifierKey::PatientId => self.patient_id.as_ref(),
            IdentifierKey::AppointmentId => self.appointment_id.as_ref(),
        }
    }

    pub fn value(&self, key: IdentifierKey) -> Option<i64> {
        self.get(key).map(|id| id.value)
    }

    /// Installs an authoritative value, returning the one it replaced.
    ///
    /// Only the call ledger calls this.
    pub(crate) fn promote(
        &mut self,
        key: IdentifierKey,
        id: AuthoritativeId,
    ) -> Option<AuthoritativeId> {
        let slot = match key {
            IdentifierKey::PatientId => &mut self.patient_id,
            IdentifierKey::AppointmentId => &mut self.appointment_id,
        };
        slot.replace(id)
    }
}
