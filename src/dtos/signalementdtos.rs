use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::listing::SignalementFilters,
    models::signalementmodel::{
        DescriptiveChanges, PrivilegedChanges, SignalementStatus, SignalementType,
        SignalementWithUser,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalementDto {
    pub id: Uuid,
    pub objet: String,
    pub description: String,
    pub date_signalement: DateTime<Utc>,
    pub date_resolution: Option<DateTime<Utc>>,
    pub statut: SignalementStatus,
    pub statut_display: String,
    pub localisation: String,
    pub type_signalement: SignalementType,
    pub type_signalement_display: String,
    pub utilisateur: Uuid,
    pub utilisateur_nom: String,
    pub utilisateur_email: String,
    pub photo_id: Option<Uuid>,
    pub commune: Option<i32>,
}

impl SignalementDto {
    pub fn from_row(row: &SignalementWithUser) -> Self {
        let s = &row.signalement;
        SignalementDto {
            id: s.id,
            objet: s.objet.clone(),
            description: s.description.clone(),
            date_signalement: s.date_signalement,
            date_resolution: s.date_resolution,
            statut: s.statut,
            statut_display: s.statut.label().to_string(),
            localisation: s.localisation.clone(),
            type_signalement: s.type_signalement,
            type_signalement_display: s.type_signalement.label().to_string(),
            utilisateur: s.utilisateur_id,
            utilisateur_nom: row.utilisateur_nom.clone(),
            utilisateur_email: row.utilisateur_email.clone(),
            photo_id: s.photo_id,
            commune: s.commune_id,
        }
    }

    pub fn from_rows(rows: &[SignalementWithUser]) -> Vec<Self> {
        rows.iter().map(SignalementDto::from_row).collect()
    }
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct CreateSignalementDto {
    #[validate(length(min = 1, max = 255, message = "Objet is required"))]
    pub objet: String,

    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,

    #[validate(length(min = 1, max = 255, message = "Localisation is required"))]
    pub localisation: String,

    pub type_signalement: SignalementType,

    pub photo_id: Option<Uuid>,

    pub commune: Option<i32>,
}

/// Field-level edit. Which fields a caller may send depends on who they are.
#[derive(Validate, Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSignalementDto {
    #[validate(length(min = 1, max = 255))]
    pub objet: Option<String>,

    #[validate(length(min = 1))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 255))]
    pub localisation: Option<String>,

    pub type_signalement: Option<SignalementType>,
    pub photo_id: Option<Uuid>,
    pub statut: Option<SignalementStatus>,
    pub date_resolution: Option<DateTime<Utc>>,
    pub commune: Option<i32>,
}

impl UpdateSignalementDto {
    pub fn descriptive(&self) -> DescriptiveChanges {
        DescriptiveChanges {
            objet: self.objet.clone(),
            description: self.description.clone(),
            localisation: self.localisation.clone(),
            type_signalement: self.type_signalement,
            photo_id: self.photo_id,
        }
    }

    pub fn privileged(&self) -> PrivilegedChanges {
        PrivilegedChanges {
            statut: self.statut,
            date_resolution: self.date_resolution,
            commune_id: self.commune,
        }
    }

    pub fn touches_status(&self) -> bool {
        self.statut.is_some() || self.date_resolution.is_some()
    }

    pub fn touches_commune(&self) -> bool {
        self.commune.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatutDto {
    pub statut: SignalementStatus,
    pub date_resolution: Option<DateTime<Utc>>,
}

impl UpdateStatutDto {
    pub fn privileged(&self) -> PrivilegedChanges {
        PrivilegedChanges {
            statut: Some(self.statut),
            date_resolution: self.date_resolution,
            commune_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignalementQueryParams {
    pub statut: Option<SignalementStatus>,
    #[serde(rename = "type", alias = "type_signalement")]
    pub type_signalement: Option<SignalementType>,
    pub utilisateur: Option<Uuid>,
    pub commune: Option<i32>,
}

impl SignalementQueryParams {
    pub fn filters(&self) -> SignalementFilters {
        SignalementFilters {
            statut: self.statut,
            type_signalement: self.type_signalement,
            utilisateur_id: self.utilisateur,
            commune_id: self.commune,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoiceDto {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalementChoicesDto {
    pub types: Vec<ChoiceDto>,
    pub statuts: Vec<ChoiceDto>,
}

impl SignalementChoicesDto {
    pub fn all() -> Self {
        SignalementChoicesDto {
            types: SignalementType::ALL
                .iter()
                .map(|t| ChoiceDto {
                    value: t.code().to_string(),
                    label: t.label().to_string(),
                })
                .collect(),
            statuts: SignalementStatus::ALL
                .iter()
                .map(|s| ChoiceDto {
                    value: s.code().to_string(),
                    label: s.label().to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::signalementmodel::sample_signalement;

    #[test]
    fn test_dto_carries_display_labels() {
        let mut signalement = sample_signalement(Uuid::new_v4(), Some(1));
        signalement.statut = SignalementStatus::Treated;
        let row = SignalementWithUser {
            signalement,
            utilisateur_nom: "Nana Ulrich".to_string(),
            utilisateur_email: "a@x.com".to_string(),
        };
        let json = serde_json::to_value(SignalementDto::from_row(&row)).unwrap();
        assert_eq!(json["statut"], "traite");
        assert_eq!(json["statut_display"], "Traité");
        assert_eq!(json["type_signalement"], "dechets");
        assert_eq!(json["commune"], 1);
    }

    #[test]
    fn test_unknown_type_is_rejected_at_deserialization() {
        let parsed: Result<CreateSignalementDto, _> = serde_json::from_value(serde_json::json!({
            "objet": "x",
            "description": "y",
            "localisation": "z",
            "type_signalement": "bruit"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_update_splits_descriptive_and_privileged_fields() {
        let dto: UpdateSignalementDto = serde_json::from_value(serde_json::json!({
            "objet": "Fumée",
            "statut": "en_cours"
        }))
        .unwrap();
        assert!(dto.touches_status());
        assert!(!dto.touches_commune());
        assert_eq!(dto.descriptive().objet.as_deref(), Some("Fumée"));
        assert_eq!(dto.privileged().statut, Some(SignalementStatus::InProgress));
    }

    #[test]
    fn test_choices_list_every_code() {
        let choices = SignalementChoicesDto::all();
        assert_eq!(choices.types.len(), 3);
        assert_eq!(choices.statuts.len(), 5);
        assert_eq!(
            choices.statuts[3],
            ChoiceDto { value: "rejete".to_string(), label: "Rejeté".to_string() }
        );
    }

    #[test]
    fn test_list_filters_read_from_query_string() {
        use axum::{extract::Query, http::Uri};

        let uri: Uri = "/api/signalements/liste?type=pollution&statut=en_cours"
            .parse()
            .unwrap();
        let Query(params) = Query::<SignalementQueryParams>::try_from_uri(&uri).unwrap();
        assert_eq!(params.type_signalement, Some(SignalementType::Pollution));
        assert_eq!(params.statut, Some(SignalementStatus::InProgress));

        let uri: Uri = "/api/signalements/liste?type_signalement=climat".parse().unwrap();
        let Query(params) = Query::<SignalementQueryParams>::try_from_uri(&uri).unwrap();
        assert_eq!(params.filters().type_signalement, Some(SignalementType::Climate));
    }
}
