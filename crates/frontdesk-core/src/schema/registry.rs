//! Static function schema table.

use super::field::{Field, FunctionName};
use super::rule::{DomainRule, Literal};
use crate::session::{IdentifierKey, SlotKey, StageEvent};
use serde_json::{Map, Value};

/// Where the resolver looks for a value when the caller omits a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotBinding {
    Slot(SlotKey),
    Identifier(IdentifierKey),
    /// `date` and `time` slots composed into `YYYY-MM-DD HH:MM:SS`
    DateTime { date: SlotKey, time: SlotKey },
}

/// Location of a newly assigned identifier in a successful handler result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultIdentifier {
    pub key: IdentifierKey,
    pub field: Field,
}

/// Declarative parameter contract for one function.
#[derive(Debug)]
pub struct FunctionSchema {
    pub function: FunctionName,
    pub description: &'static str,
    pub required: &'static [Field],
    pub optional: &'static [Field],
    pub defaults: &'static [(Field, Literal)],
    /// At least one group must be fully present. Empty means no constraint.
    pub disjunctive_groups: &'static [&'static [Field]],
    pub domain_rules: &'static [(Field, DomainRule)],
    /// Fields whose authoritative session identifier beats caller input
    pub critical_fields: &'static [(Field, IdentifierKey)],
    pub bindings: &'static [(Field, SlotBinding)],
    pub result_identifiers: &'static [ResultIdentifier],
    /// Stage event fired after a successful call
    pub on_success: Option<StageEvent>,
    pub example: &'static [(Field, Literal)],
}

impl FunctionSchema {
    pub fn name(&self) -> &'static str {
        self.function.into()
    }

    /// Required then optional fields, in declaration order.
    pub fn declared_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.required.iter().chain(self.optional.iter()).copied()
    }

    pub fn rule_for(&self, field: Field) -> Option<DomainRule> {
        lookup(self.domain_rules, field)
    }

    pub fn critical_identifier(&self, field: Field) -> Option<IdentifierKey> {
        lookup(self.critical_fields, field)
    }

    pub fn binding_for(&self, field: Field) -> Option<SlotBinding> {
        lookup(self.bindings, field)
    }

    pub fn default_for(&self, field: Field) -> Option<Literal> {
        lookup(self.defaults, field)
    }

    /// Fields the extraction fallback may fill: conversation-bound and not
    /// critical.
    pub fn is_extractable(&self, field: Field) -> bool {
        self.critical_identifier(field).is_none()
            && matches!(
                self.binding_for(field),
                Some(SlotBinding::Slot(_)) | Some(SlotBinding::DateTime { .. })
            )
    }

    pub fn example_call(&self) -> Value {
        let parameters: Map<String, Value> = self
            .example
            .iter()
            .map(|(field, literal)| (field.name().to_string(), literal.to_value()))
            .collect();
        serde_json::json!({
            "functionName": self.name(),
            "parameters": parameters,
        })
    }
}

fn lookup<T: Copy>(table: &[(Field, T)], field: Field) -> Option<T> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == field)
        .map(|(_, value)| *value)
}

const NAME_TEXT: DomainRule = DomainRule::Text { max_len: 64 };
const NOTE_TEXT: DomainRule = DomainRule::Text { max_len: 500 };

static SCHEMAS: [FunctionSchema; 6] = [
    FunctionSchema {
        function: FunctionName::SearchPatients,
        description: "Find an existing patient by name, phone number or patient id",
        required: &[],
        optional: &[
            Field::LName,
            Field::FName,
            Field::Phone,
            Field::PatNum,
            Field::Birthdate,
        ],
        defaults: &[],
        disjunctive_groups: &[&[Field::LName, Field::FName], &[Field::Phone], &[Field::PatNum]],
        domain_rules: &[
            (Field::LName, NAME_TEXT),
            (Field::FName, NAME_TEXT),
            (Field::Phone, DomainRule::Phone),
            (Field::PatNum, DomainRule::PositiveId),
            (Field::Birthdate, DomainRule::Date),
        ],
        critical_fields: &[],
        bindings: &[
            (Field::LName, SlotBinding::Slot(SlotKey::LastName)),
            (Field::FName, SlotBinding::Slot(SlotKey::FirstName)),
            (Field::Phone, SlotBinding::Slot(SlotKey::Phone)),
            (Field::Birthdate, SlotBinding::Slot(SlotKey::Birthdate)),
        ],
        result_identifiers: &[ResultIdentifier {
            key: IdentifierKey::PatientId,
            field: Field::PatNum,
        }],
        on_success: None,
        example: &[
            (Field::LName, Literal::Text("Smith")),
            (Field::FName, Literal::Text("John")),
        ],
    },
    FunctionSchema {
        function: FunctionName::CreatePatient,
        description: "Register a new patient",
        required: &[
            Field::FName,
            Field::LName,
            Field::Birthdate,
            Field::WirelessPhone,
        ],
        optional: &[Field::Email],
        defaults: &[],
        disjunctive_groups: &[],
        domain_rules: &[
            (Field::FName, NAME_TEXT),
            (Field::LName, NAME_TEXT),
            (Field::Birthdate, DomainRule::Date),
            (Field::WirelessPhone, DomainRule::Phone),
            (Field::Email, DomainRule::Email),
        ],
        critical_fields: &[],
        bindings: &[
            (Field::FName, SlotBinding::Slot(SlotKey::FirstName)),
            (Field::LName, SlotBinding::Slot(SlotKey::LastName)),
            (Field::Birthdate, SlotBinding::Slot(SlotKey::Birthdate)),
            (Field::WirelessPhone, SlotBinding::Slot(SlotKey::Phone)),
            (Field::Email, SlotBinding::Slot(SlotKey::Email)),
        ],
        result_identifiers: &[ResultIdentifier {
            key: IdentifierKey::PatientId,
            field: Field::PatNum,
        }],
        on_success: None,
        example: &[
            (Field::FName, Literal::Text("John")),
            (Field::LName, Literal::Text("Smith")),
            (Field::Birthdate, Literal::Text("1988-08-12")),
            (Field::WirelessPhone, Literal::Text("6195551234")),
        ],
    },
    FunctionSchema {
        function: FunctionName::GetAvailableSlots,
        description: "List open appointment slots",
        required: &[Field::DateStart],
        optional: &[
            Field::DateEnd,
            Field::ProvNum,
            Field::OpNum,
            Field::LengthMinutes,
        ],
        defaults: &[(Field::LengthMinutes, Literal::Int(30))],
        disjunctive_groups: &[],
        domain_rules: &[
            (Field::DateStart, DomainRule::Date),
            (Field::DateEnd, DomainRule::Date),
            (Field::ProvNum, DomainRule::PositiveId),
            (Field::OpNum, DomainRule::PositiveId),
            (Field::LengthMinutes, DomainRule::IntRange { min: 5, max: 240 }),
        ],
        critical_fields: &[],
        bindings: &[
            (Field::DateStart, SlotBinding::Slot(SlotKey::Date)),
            (Field::ProvNum, SlotBinding::Slot(SlotKey::ProviderId)),
            (Field::OpNum, SlotBinding::Slot(SlotKey::OperatoryId)),
        ],
        result_identifiers: &[],
        on_success: None,
        example: &[
            (Field::DateStart, Literal::Text("2025-12-05")),
            (Field::ProvNum, Literal::Int(1)),
        ],
    },
    FunctionSchema {
        function: FunctionName::CreateAppointment,
        description: "Book an appointment for an identified patient",
        required: &[Field::PatNum, Field::AptDateTime, Field::ProvNum, Field::Op],
        optional: &[Field::Note, Field::AppointmentTypeNum, Field::IsNewPatient],
        defaults: &[(Field::IsNewPatient, Literal::Bool(false))],
        disjunctive_groups: &[],
        domain_rules: &[
            (Field::PatNum, DomainRule::PositiveId),
            (Field::AptDateTime, DomainRule::DateTime),
            (Field::ProvNum, DomainRule::PositiveId),
            (Field::Op, DomainRule::PositiveId),
            (Field::Note, NOTE_TEXT),
            (Field::AppointmentTypeNum, DomainRule::PositiveId),
            (Field::IsNewPatient, DomainRule::Boolean),
        ],
        critical_fields: &[(Field::PatNum, IdentifierKey::PatientId)],
        bindings: &[
            (Field::PatNum, SlotBinding::Identifier(IdentifierKey::PatientId)),
            (
                Field::AptDateTime,
                SlotBinding::DateTime {
                    date: SlotKey::Date,
                    time: SlotKey::Time,
                },
            ),
            (Field::ProvNum, SlotBinding::Slot(SlotKey::ProviderId)),
            (Field::Op, SlotBinding::Slot(SlotKey::OperatoryId)),
            (Field::Note, SlotBinding::Slot(SlotKey::Note)),
        ],
        result_identifiers: &[ResultIdentifier {
            key: IdentifierKey::AppointmentId,
            field: Field::AptNum,
        }],
        on_success: Some(StageEvent::AppointmentBooked),
        example: &[
            (Field::PatNum, Literal::Int(1)),
            (Field::AptDateTime, Literal::Text("2025-12-05 10:00:00")),
            (Field::ProvNum, Literal::Int(1)),
            (Field::Op, Literal::Int(1)),
        ],
    },
    FunctionSchema {
        function: FunctionName::UpdateAppointment,
        description: "Move or edit an existing appointment",
        required: &[Field::AptNum],
        optional: &[Field::AptDateTime, Field::ProvNum, Field::Op, Field::Note],
        defaults: &[],
        disjunctive_groups: &[],
        domain_rules: &[
            (Field::AptNum, DomainRule::PositiveId),
            (Field::AptDateTime, DomainRule::DateTime),
            (Field::ProvNum, DomainRule::PositiveId),
            (Field::Op, DomainRule::PositiveId),
            (Field::Note, NOTE_TEXT),
        ],
        critical_fields: &[(Field::AptNum, IdentifierKey::AppointmentId)],
        bindings: &[(
            Field::AptNum,
            SlotBinding::Identifier(IdentifierKey::AppointmentId),
        )],
        result_identifiers: &[],
        on_success: Some(StageEvent::AppointmentBooked),
        example: &[
            (Field::AptNum, Literal::Int(42)),
            (Field::AptDateTime, Literal::Text("2025-12-09 14:30:00")),
        ],
    },
    FunctionSchema {
        function: FunctionName::CancelAppointment,
        description: "Cancel an existing appointment",
        required: &[Field::AptNum],
        optional: &[Field::Reason, Field::SendToUnscheduledList],
        defaults: &[(Field::SendToUnscheduledList, Literal::Bool(true))],
        disjunctive_groups: &[],
        domain_rules: &[
            (Field::AptNum, DomainRule::PositiveId),
            (Field::Reason, NOTE_TEXT),
            (Field::SendToUnscheduledList, DomainRule::Boolean),
        ],
        critical_fields: &[(Field::AptNum, IdentifierKey::AppointmentId)],
        bindings: &[(
            Field::AptNum,
            SlotBinding::Identifier(IdentifierKey::AppointmentId),
        )],
        result_identifiers: &[],
        on_success: Some(StageEvent::AppointmentCancelled),
        example: &[
            (Field::AptNum, Literal::Int(42)),
            (Field::Reason, Literal::Text("Patient is travelling")),
        ],
    },
];

/// Lookup over the static schema table.
///
/// A function without a schema is not an error: callers pass it through
/// unvalidated.
pub struct SchemaRegistry;

impl SchemaRegistry {
    pub fn get(function_name: &str) -> Option<&'static FunctionSchema> {
        SCHEMAS
            .iter()
            .find(|schema| schema.name() == function_name)
    }

    pub fn all() -> &'static [FunctionSchema] {
        &SCHEMAS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_function_has_a_schema() {
        for function in FunctionName::iter() {
            let schema = SchemaRegistry::get(function.into()).unwrap();
            assert_eq!(schema.function, function);
        }
        assert!(SchemaRegistry::get("GetClinicHours").is_none());
    }

    #[test]
    fn test_tables_only_reference_declared_fields() {
        for schema in SchemaRegistry::all() {
            let declared: Vec<Field> = schema.declared_fields().collect();
            let referenced = schema
                .defaults
                .iter()
                .map(|(f, _)| *f)
                .chain(schema.domain_rules.iter().map(|(f, _)| *f))
                .chain(schema.critical_fields.iter().map(|(f, _)| *f))
                .chain(schema.bindings.iter().map(|(f, _)| *f))
                .chain(schema.example.iter().map(|(f, _)| *f))
                .chain(schema.disjunctive_groups.iter().flat_map(|g| g.iter().copied()));
            for field in referenced {
                assert!(
                    declared.contains(&field),
                    "{} references undeclared {}",
                    schema.name(),
                    field
                );
            }
            for field in &declared {
                assert!(
                    schema.rule_for(*field).is_some(),
                    "{} has no rule for {}",
                    schema.name(),
                    field
                );
            }
        }
    }

    #[test]
    fn test_examples_satisfy_their_own_rules() {
        for schema in SchemaRegistry::all() {
            for (field, literal) in schema.example {
                let rule = schema.rule_for(*field).unwrap();
                assert!(rule.check(&literal.to_value()), "{}.{}", schema.name(), field);
            }
        }
    }

    #[test]
    fn test_critical_fields_are_not_extractable() {
        let schema = SchemaRegistry::get("CreateAppointment").unwrap();
        assert!(!schema.is_extractable(Field::PatNum));
        assert!(schema.is_extractable(Field::AptDateTime));
        assert!(!schema.is_extractable(Field::AppointmentTypeNum));
    }
}
