use crate::detect::alert::{Alert, AlertSink};
use crate::detect::{IncidentStatus, RuleId, Severity};
use crate::storage::{SharedStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// An incident row about to be inserted. Status is always NEW.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub event_id: i64,
    pub rule_id: RuleId,
    pub incident_type: String,
    pub description: String,
    pub severity: Severity,
    pub detected_at: DateTime<Utc>,
}

impl NewIncident {
    pub fn status(&self) -> IncidentStatus {
        IncidentStatus::New
    }
}

/// A requested status transition. Resolving requires naming who resolved
/// the incident and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    New,
    InProgress,
    Resolved { resolved_by: String, notes: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StatusChangeError {
    #[error("resolving an incident requires a resolver and resolution notes")]
    MissingResolution,
}

impl StatusChange {
    pub fn status(&self) -> IncidentStatus {
        match self {
            StatusChange::New => IncidentStatus::New,
            StatusChange::InProgress => IncidentStatus::InProgress,
            StatusChange::Resolved { .. } => IncidentStatus::Resolved,
        }
    }

    /// Build a change from loose parts, as given on the command line.
    /// Resolver and notes are ignored for non-resolving transitions.
    pub fn from_parts(
        status: IncidentStatus,
        resolved_by: Option<String>,
        notes: Option<String>,
    ) -> Result<Self, StatusChangeError> {
        match status {
            IncidentStatus::New => Ok(StatusChange::New),
            IncidentStatus::InProgress => Ok(StatusChange::InProgress),
            IncidentStatus::Resolved => {
                let resolved_by = resolved_by.filter(|s| !s.trim().is_empty());
                let notes = notes.filter(|s| !s.trim().is_empty());
                match (resolved_by, notes) {
                    (Some(resolved_by), Some(notes)) => Ok(StatusChange::Resolved { resolved_by, notes }),
                    _ => Err(StatusChangeError::MissingResolution),
                }
            }
        }
    }
}

/// Persists incidents and drives their status transitions.
pub struct IncidentRecorder {
    store: SharedStore,
    sink: Arc<dyn AlertSink>,
}

impl IncidentRecorder {
    pub fn new(store: SharedStore, sink: Arc<dyn AlertSink>) -> Self {
        Self { store, sink }
    }

    /// Insert a NEW incident stamped with the current time, then present the
    /// alert. Nothing is written and no alert is shown if the insert fails.
    pub fn create(
        &self,
        event_id: i64,
        rule_id: RuleId,
        incident_type: &str,
        description: &str,
        severity: Severity,
    ) -> Result<i64, StoreError> {
        let incident = NewIncident {
            event_id,
            rule_id,
            incident_type: incident_type.to_string(),
            description: description.to_string(),
            severity,
            detected_at: Utc::now(),
        };

        let id = self.store.insert_incident(&incident)?;
        info!(incident_id = id, event_id, rule_id = %rule_id, severity = %severity, "Incident recorded");

        self.sink.display_alert(&Alert {
            incident_id: id,
            incident_type: incident.incident_type,
            description: incident.description,
            severity,
            detected_at: incident.detected_at,
        });

        Ok(id)
    }

    /// Apply `change`. Returns false when the store fails or no incident
    /// has that id; callers must check the result.
    pub fn update_status(&self, incident_id: i64, change: &StatusChange) -> bool {
        match self.store.update_incident_status(incident_id, change, Utc::now()) {
            Ok(true) => {
                info!(incident_id, status = %change.status(), "Incident updated");
                true
            }
            Ok(false) => {
                error!(incident_id, "Incident not found");
                false
            }
            Err(e) => {
                error!(incident_id, error = %e, "Failed to update incident status");
                false
            }
        }
    }
}
