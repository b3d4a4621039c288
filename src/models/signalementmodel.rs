// src/models/signalementmodel.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "signalement_type")]
pub enum SignalementType {
    #[serde(rename = "dechets")]
    #[sqlx(rename = "dechets")]
    Waste,
    #[serde(rename = "pollution")]
    #[sqlx(rename = "pollution")]
    Pollution,
    #[serde(rename = "climat")]
    #[sqlx(rename = "climat")]
    Climate,
}

impl SignalementType {
    pub const ALL: [SignalementType; 3] = [
        SignalementType::Waste,
        SignalementType::Pollution,
        SignalementType::Climate,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            SignalementType::Waste => "dechets",
            SignalementType::Pollution => "pollution",
            SignalementType::Climate => "climat",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalementType::Waste => "Déchets",
            SignalementType::Pollution => "Pollution",
            SignalementType::Climate => "Climat",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "signalement_statut")]
pub enum SignalementStatus {
    #[serde(rename = "en_attente")]
    #[sqlx(rename = "en_attente")]
    Pending,
    #[serde(rename = "en_cours")]
    #[sqlx(rename = "en_cours")]
    InProgress,
    #[serde(rename = "traite")]
    #[sqlx(rename = "traite")]
    Treated,
    #[serde(rename = "rejete", alias = "rejeté")]
    #[sqlx(rename = "rejete")]
    Rejected,
    #[serde(rename = "suspendu")]
    #[sqlx(rename = "suspendu")]
    Suspended,
}

impl Default for SignalementStatus {
    fn default() -> Self {
        SignalementStatus::Pending
    }
}

impl SignalementStatus {
    pub const ALL: [SignalementStatus; 5] = [
        SignalementStatus::Pending,
        SignalementStatus::InProgress,
        SignalementStatus::Treated,
        SignalementStatus::Rejected,
        SignalementStatus::Suspended,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            SignalementStatus::Pending => "en_attente",
            SignalementStatus::InProgress => "en_cours",
            SignalementStatus::Treated => "traite",
            SignalementStatus::Rejected => "rejete",
            SignalementStatus::Suspended => "suspendu",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalementStatus::Pending => "En attente",
            SignalementStatus::InProgress => "En cours",
            SignalementStatus::Treated => "Traité",
            SignalementStatus::Rejected => "Rejeté",
            SignalementStatus::Suspended => "Suspendu",
        }
    }

    /// Reports in this status are listed to everyone, signed in or not.
    pub fn is_public(&self) -> bool {
        matches!(self, SignalementStatus::InProgress)
    }

    /// The submitter may still edit descriptive fields.
    pub fn is_open_for_owner_edits(&self) -> bool {
        matches!(self, SignalementStatus::Pending | SignalementStatus::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Signalement {
    pub id: Uuid,
    pub objet: String,
    pub description: String,
    pub date_signalement: DateTime<Utc>,
    pub date_resolution: Option<DateTime<Utc>>,
    pub statut: SignalementStatus,
    pub localisation: String,
    pub type_signalement: SignalementType,
    pub utilisateur_id: Uuid,
    pub photo_id: Option<Uuid>,
    pub commune_id: Option<i32>,
}

/// Report joined with the submitter's display fields.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SignalementWithUser {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub signalement: Signalement,
    pub utilisateur_nom: String,
    pub utilisateur_email: String,
}

/// Fields a submitter may change on their own report.
#[derive(Debug, Clone, Default)]
pub struct DescriptiveChanges {
    pub objet: Option<String>,
    pub description: Option<String>,
    pub localisation: Option<String>,
    pub type_signalement: Option<SignalementType>,
    pub photo_id: Option<Uuid>,
}

/// Fields only a CTD of the commune or an administrator may change.
#[derive(Debug, Clone, Default)]
pub struct PrivilegedChanges {
    pub statut: Option<SignalementStatus>,
    pub date_resolution: Option<DateTime<Utc>>,
    pub commune_id: Option<i32>,
}

/// Resolution date after a status change. An explicit date always wins, an
/// existing date is never moved, and moving to `traite` stamps `now` once.
pub fn resolution_date_for(
    new_status: SignalementStatus,
    explicit: Option<DateTime<Utc>>,
    existing: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    explicit.or(existing).or_else(|| {
        if new_status == SignalementStatus::Treated {
            Some(now)
        } else {
            None
        }
    })
}

impl Signalement {
    pub fn apply_descriptive(&mut self, changes: DescriptiveChanges) {
        if let Some(objet) = changes.objet {
            self.objet = objet;
        }
        if let Some(description) = changes.description {
            self.description = description;
        }
        if let Some(localisation) = changes.localisation {
            self.localisation = localisation;
        }
        if let Some(kind) = changes.type_signalement {
            self.type_signalement = kind;
        }
        if changes.photo_id.is_some() {
            self.photo_id = changes.photo_id;
        }
    }

    pub fn apply_privileged(&mut self, changes: PrivilegedChanges, now: DateTime<Utc>) {
        if let Some(statut) = changes.statut {
            self.statut = statut;
        }
        if changes.statut.is_some() || changes.date_resolution.is_some() {
            self.date_resolution =
                resolution_date_for(
                    self.statut,
                    changes.date_resolution,
                    self.date_resolution,
                    now,
                );
        }
        if changes.commune_id.is_some() {
            self.commune_id = changes.commune_id;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SignalementStats {
    pub total: i64,
    pub par_statut: BTreeMap<String, i64>,
    pub par_type: BTreeMap<String, i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub par_commune: Option<BTreeMap<String, i64>>,
}

impl SignalementStats {
    /// Builds the report from grouped `(statut, type, count)` rows, filling in
    /// zeroes so every known status and type is present.
    pub fn from_counts(rows: &[(SignalementStatus, SignalementType, i64)]) -> Self {
        let mut par_statut: BTreeMap<String, i64> = SignalementStatus::ALL
            .iter()
            .map(|s| (s.code().to_string(), 0))
            .collect();
        let mut par_type: BTreeMap<String, i64> = SignalementType::ALL
            .iter()
            .map(|t| (t.code().to_string(), 0))
            .collect();

        let mut total = 0;
        for (statut, kind, count) in rows {
            total += count;
            *par_statut.entry(statut.code().to_string()).or_default() += count;
            *par_type.entry(kind.code().to_string()).or_default() += count;
        }

        SignalementStats {
            total,
            par_statut,
            par_type,
            par_commune: None,
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_signalement(owner: Uuid, commune_id: Option<i32>) -> Signalement {
    Signalement {
        id: Uuid::new_v4(),
        objet: "Dépôt sauvage".to_string(),
        description: "Ordures au bord de la route".to_string(),
        date_signalement: Utc::now(),
        date_resolution: None,
        statut: SignalementStatus::Pending,
        localisation: "Marché A".to_string(),
        type_signalement: SignalementType::Waste,
        utilisateur_id: owner,
        photo_id: None,
        commune_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_wire_codes_match_stored_values() {
        let kind: SignalementType = serde_json::from_str("\"dechets\"").unwrap();
        assert_eq!(kind, SignalementType::Waste);
        let statut: SignalementStatus = serde_json::from_str("\"rejeté\"").unwrap();
        assert_eq!(statut, SignalementStatus::Rejected);
        assert_eq!(serde_json::to_string(&statut).unwrap(), "\"rejete\"");
        assert_eq!(SignalementStatus::default(), SignalementStatus::Pending);
    }

    #[test]
    fn test_treating_stamps_resolution_date_once() {
        let now = Utc::now();
        let mut report = sample_signalement(Uuid::new_v4(), Some(1));

        report.apply_privileged(
            PrivilegedChanges { statut: Some(SignalementStatus::Treated), ..Default::default() },
            now,
        );
        assert_eq!(report.date_resolution, Some(now));

        let later = now + Duration::hours(3);
        report.apply_privileged(
            PrivilegedChanges { statut: Some(SignalementStatus::Treated), ..Default::default() },
            later,
        );
        assert_eq!(report.date_resolution, Some(now));
    }

    #[test]
    fn test_other_statuses_leave_resolution_empty() {
        let now = Utc::now();
        let mut report = sample_signalement(Uuid::new_v4(), Some(1));
        report.apply_privileged(
            PrivilegedChanges { statut: Some(SignalementStatus::Rejected), ..Default::default() },
            now,
        );
        assert_eq!(report.statut, SignalementStatus::Rejected);
        assert_eq!(report.date_resolution, None);
    }

    #[test]
    fn test_explicit_resolution_date_wins() {
        let now = Utc::now();
        let explicit = now - Duration::days(2);
        assert_eq!(
            resolution_date_for(SignalementStatus::Treated, Some(explicit), Some(now), now),
            Some(explicit)
        );
    }

    #[test]
    fn test_descriptive_changes_leave_status_alone() {
        let mut report = sample_signalement(Uuid::new_v4(), Some(1));
        report.apply_descriptive(DescriptiveChanges {
            objet: Some("Fumée".to_string()),
            type_signalement: Some(SignalementType::Pollution),
            ..Default::default()
        });
        assert_eq!(report.objet, "Fumée");
        assert_eq!(report.type_signalement, SignalementType::Pollution);
        assert_eq!(report.statut, SignalementStatus::Pending);
        assert_eq!(report.description, "Ordures au bord de la route");
    }

    #[test]
    fn test_stats_fill_missing_buckets() {
        let stats = SignalementStats::from_counts(&[
            (SignalementStatus::Pending, SignalementType::Waste, 3),
            (SignalementStatus::Treated, SignalementType::Waste, 1),
            (SignalementStatus::Pending, SignalementType::Climate, 2),
        ]);
        assert_eq!(stats.total, 6);
        assert_eq!(stats.par_statut["en_attente"], 5);
        assert_eq!(stats.par_statut["suspendu"], 0);
        assert_eq!(stats.par_type["dechets"], 4);
        assert_eq!(stats.par_type["pollution"], 0);
    }
}
