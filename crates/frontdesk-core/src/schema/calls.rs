//! Typed function calls.
//!
//! Validated parameter bags are converted into one struct per function before
//! they are handed to a domain handler. The serialized struct is the canonical
//! parameter set: ids as numbers, phones as bare digits, no undeclared keys.

use super::field::FunctionName;
use super::registry::FunctionSchema;
use crate::params::Params;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchPatients {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pat_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatePatient {
    pub f_name: String,
    pub l_name: String,
    pub birthdate: NaiveDate,
    pub wireless_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetAvailableSlots {
    pub date_start: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_end: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prov_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_num: Option<i64>,
    pub length_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateAppointment {
    pub pat_num: i64,
    #[serde(with = "apt_date_time")]
    pub apt_date_time: NaiveDateTime,
    pub prov_num: i64,
    pub op: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_type_num: Option<i64>,
    pub is_new_patient: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateAppointment {
    pub apt_num: i64,
    #[serde(
        default,
        with = "apt_date_time::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub apt_date_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prov_num: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CancelAppointment {
    pub apt_num: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub send_to_unscheduled_list: bool,
}

/// A validated call to one of the registered booking operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "functionName", content = "parameters")]
pub enum FunctionCall {
    SearchPatients(SearchPatients),
    CreatePatient(CreatePatient),
    GetAvailableSlots(GetAvailableSlots),
    CreateAppointment(CreateAppointment),
    UpdateAppointment(UpdateAppointment),
    CancelAppointment(CancelAppointment),
}

impl FunctionCall {
    /// Builds a typed call from parameters that already passed validation.
    ///
    /// Each declared field is canonicalized through its domain rule and
    /// undeclared keys are dropped.
    pub fn from_validated(
        schema: &FunctionSchema,
        params: &Params,
    ) -> Result<Self, serde_json::Error> {
        let mut canonical = Map::new();
        for field in schema.declared_fields() {
            let Some(value) = params.get(field.name()) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let value = schema
                .rule_for(field)
                .and_then(|rule| rule.canonicalize(value))
                .unwrap_or_else(|| value.clone());
            canonical.insert(field.name().to_string(), value);
        }

        serde_json::from_value(serde_json::json!({
            "functionName": schema.name(),
            "parameters": canonical,
        }))
    }

    pub fn function_name(&self) -> FunctionName {
        match self {
            FunctionCall::SearchPatients(_) => FunctionName::SearchPatients,
            FunctionCall::CreatePatient(_) => FunctionName::CreatePatient,
            FunctionCall::GetAvailableSlots(_) => FunctionName::GetAvailableSlots,
            FunctionCall::CreateAppointment(_) => FunctionName::CreateAppointment,
            FunctionCall::UpdateAppointment(_) => FunctionName::UpdateAppointment,
            FunctionCall::CancelAppointment(_) => FunctionName::CancelAppointment,
        }
    }

    /// The canonical parameter object for the domain handler.
    pub fn to_params(&self) -> Result<Params, serde_json::Error> {
        let value = match self {
            FunctionCall::SearchPatients(call) => serde_json::to_value(call)?,
            FunctionCall::CreatePatient(call) => serde_json::to_value(call)?,
            FunctionCall::GetAvailableSlots(call) => serde_json::to_value(call)?,
            FunctionCall::CreateAppointment(call) => serde_json::to_value(call)?,
            FunctionCall::UpdateAppointment(call) => serde_json::to_value(call)?,
            FunctionCall::CancelAppointment(call) => serde_json::to_value(call)?,
        };
        Ok(match value {
            Value::Object(map) => map,
            _ => Map::new(),
        })
    }
}

mod apt_date_time {
    use super::super::rule::DATE_TIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(DATE_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let text = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&text, DATE_TIME_FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| {
                    NaiveDateTime::parse_from_str(&text, super::DATE_TIME_FORMAT)
                        .map_err(serde::de::Error::custom)
                })
                .transpose()
        }
    }
}
