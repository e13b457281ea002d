//! Adherence aggregation over the step event log.
//!
//! Everything here is a pure reduction over facts loaded by the caller in a
//! single snapshot. Missing or partial data yields `0` or `None`, never an
//! error.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::assignment::{AssignmentStatus, StepEventKind};
use crate::types::{DbId, Timestamp};

/// One row of the step event log.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFact {
    pub assignment_id: DbId,
    pub step_index: i32,
    pub kind: StepEventKind,
    pub occurred_at: Timestamp,
}

/// The counters of one assignment that metrics are derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentFact {
    pub assignment_id: DbId,
    pub protocol_id: DbId,
    pub patient_id: DbId,
    pub status: AssignmentStatus,
    pub total_steps: i32,
    pub completed_steps: i32,
    pub last_sent_step: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepMetrics {
    pub step_order: i32,
    /// `sent` events at this step.
    pub sent_count: i64,
    /// `responded` events at this step, postponements included.
    pub response_count: i64,
    /// `response_count / sent_count` as a percentage, at most 100.
    pub adherence_rate: f64,
    /// Mean response time in milliseconds.
    pub average_response_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolAdherence {
    pub protocol_id: DbId,
    pub total_patients: i64,
    pub total_assignments: i64,
    pub completed_assignments: i64,
    pub completion_rate: f64,
    pub average_response_time: Option<f64>,
    pub step_metrics: Vec<StepMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub total_patients: i64,
    pub active_patients: i64,
    pub active_protocols: i64,
    pub overall_adherence_rate: Option<f64>,
    pub average_response_time: Option<f64>,
}

// ---------------------------------------------------------------------------
// Response time pairing
// ---------------------------------------------------------------------------

/// Response time in milliseconds for every (assignment, step) that has both
/// a `sent` and a later `responded` event, keyed by step index.
///
/// The earliest `sent` is paired with the earliest `responded` at or after
/// it. Responses recorded before any send are ignored.
pub fn response_times(events: &[EventFact]) -> Vec<(i32, i64)> {
    let mut first_sent: HashMap<(DbId, i32), Timestamp> = HashMap::new();
    for e in events.iter().filter(|e| e.kind == StepEventKind::Sent) {
        first_sent
            .entry((e.assignment_id, e.step_index))
            .and_modify(|t| *t = (*t).min(e.occurred_at))
            .or_insert(e.occurred_at);
    }

    let mut first_response: HashMap<(DbId, i32), Timestamp> = HashMap::new();
    for e in events.iter().filter(|e| e.kind == StepEventKind::Responded) {
        let key = (e.assignment_id, e.step_index);
        let Some(sent_at) = first_sent.get(&key) else {
            continue;
        };
        if e.occurred_at < *sent_at {
            continue;
        }
        first_response
            .entry(key)
            .and_modify(|t| *t = (*t).min(e.occurred_at))
            .or_insert(e.occurred_at);
    }

    let mut out: Vec<(i32, i64)> = first_response
        .into_iter()
        .filter_map(|(key, responded_at)| {
            first_sent
                .get(&key)
                .map(|sent_at| (key.1, (responded_at - *sent_at).num_milliseconds()))
        })
        .collect();
    out.sort_unstable();
    out
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

// ---------------------------------------------------------------------------
// Per step / per protocol
// ---------------------------------------------------------------------------

/// Per-step table for one protocol.
///
/// Rows cover every order in `step_orders` plus any index that only exists
/// in historical events (steps removed after they were sent).
pub fn step_metrics(step_orders: &[i32], events: &[EventFact]) -> Vec<StepMetrics> {
    let mut sent: BTreeMap<i32, i64> = BTreeMap::new();
    let mut responded: BTreeMap<i32, i64> = BTreeMap::new();
    for e in events {
        let bucket = match e.kind {
            StepEventKind::Sent => &mut sent,
            StepEventKind::Responded => &mut responded,
        };
        *bucket.entry(e.step_index).or_default() += 1;
    }

    let mut times: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for (step, ms) in response_times(events) {
        times.entry(step).or_default().push(ms as f64);
    }

    let orders: BTreeSet<i32> = step_orders
        .iter()
        .copied()
        .chain(sent.keys().copied())
        .chain(responded.keys().copied())
        .collect();

    orders
        .into_iter()
        .map(|order| {
            let sent_count = sent.get(&order).copied().unwrap_or(0);
            let response_count = responded.get(&order).copied().unwrap_or(0);
            StepMetrics {
                step_order: order,
                sent_count,
                response_count,
                adherence_rate: percentage(response_count, sent_count).min(100.0),
                average_response_time: times.get(&order).and_then(|t| mean(t.iter().copied())),
            }
        })
        .collect()
}

/// Completion and response metrics for one protocol.
///
/// `assignments` and `events` must already be restricted to the protocol.
pub fn protocol_metrics(
    protocol_id: DbId,
    step_orders: &[i32],
    assignments: &[AssignmentFact],
    events: &[EventFact],
) -> ProtocolAdherence {
    let total_assignments = assignments.len() as i64;
    let completed_assignments = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Completed)
        .count() as i64;
    let total_patients = assignments
        .iter()
        .map(|a| a.patient_id)
        .collect::<HashSet<_>>()
        .len() as i64;

    ProtocolAdherence {
        protocol_id,
        total_patients,
        total_assignments,
        completed_assignments,
        completion_rate: percentage(completed_assignments, total_assignments),
        average_response_time: mean(response_times(events).into_iter().map(|(_, ms)| ms as f64)),
        step_metrics: step_metrics(step_orders, events),
    }
}

// ---------------------------------------------------------------------------
// Per patient / dashboard
// ---------------------------------------------------------------------------

/// A patient's overall adherence in percent.
///
/// Mean of `completed_steps / total_steps` over the patient's assignments
/// with at least one step. `None` until one of them has been sent a step.
pub fn patient_adherence_rate(assignments: &[AssignmentFact]) -> Option<f64> {
    if !assignments.iter().any(|a| a.last_sent_step > 0) {
        return None;
    }
    mean(
        assignments
            .iter()
            .filter(|a| a.total_steps > 0)
            .map(|a| (f64::from(a.completed_steps) / f64::from(a.total_steps) * 100.0).min(100.0)),
    )
}

/// Adherence rate of every patient that has assignments.
pub fn patient_rates(assignments: &[AssignmentFact]) -> BTreeMap<DbId, Option<f64>> {
    let mut by_patient: BTreeMap<DbId, Vec<AssignmentFact>> = BTreeMap::new();
    for a in assignments {
        by_patient.entry(a.patient_id).or_default().push(a.clone());
    }
    by_patient
        .into_iter()
        .map(|(patient_id, facts)| (patient_id, patient_adherence_rate(&facts)))
        .collect()
}

/// Dashboard summary across all protocols.
pub fn dashboard_summary(
    total_patients: i64,
    active_protocols: i64,
    assignments: &[AssignmentFact],
    events: &[EventFact],
) -> DashboardMetrics {
    let active_patients = assignments
        .iter()
        .filter(|a| a.status == AssignmentStatus::Active)
        .map(|a| a.patient_id)
        .collect::<HashSet<_>>()
        .len() as i64;

    DashboardMetrics {
        total_patients,
        active_patients,
        active_protocols,
        overall_adherence_rate: mean(patient_rates(assignments).into_values().flatten()),
        average_response_time: mean(response_times(events).into_iter().map(|(_, ms)| ms as f64)),
    }
}
