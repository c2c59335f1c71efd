use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FhirError;

macro_rules! resource_types {
    ($($variant:ident),+ $(,)?) => {
        /// Resource kinds served by the adapter.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum ResourceType {
            $($variant,)+
        }

        impl ResourceType {
            /// Every known kind, in declaration order.
            pub const ALL: &'static [ResourceType] = &[$(ResourceType::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ResourceType::$variant => stringify!($variant),)+
                }
            }
        }

        impl FromStr for ResourceType {
            type Err = FhirError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $(stringify!($variant) => Ok(ResourceType::$variant),)+
                    _ => Err(FhirError::invalid_argument(format!("Unknown resource type: {s}"))),
                }
            }
        }
    };
}

resource_types!(
    AllergyIntolerance,
    Appointment,
    CarePlan,
    Composition,
    Condition,
    Coverage,
    DiagnosticReport,
    DocumentReference,
    Encounter,
    EpisodeOfCare,
    Flag,
    Group,
    Immunization,
    Location,
    Medication,
    MedicationDispense,
    MedicationRequest,
    Observation,
    Organization,
    Patient,
    Person,
    Practitioner,
    Procedure,
    Provenance,
    QuestionnaireResponse,
    RelatedPerson,
    ServiceRequest,
    Specimen,
    Task,
    ValueSet,
);

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check whether `name` is a known resource kind literal.
pub fn is_valid_resource_type_name(name: &str) -> bool {
    ResourceType::from_str(name).is_ok()
}
