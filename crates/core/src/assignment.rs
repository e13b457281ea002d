//! Assignment state machine.
//!
//! An assignment is one patient's run through a protocol:
//!
//! ```text
//! assigned -> active -> { paused <-> active } -> completed
//! ```
//!
//! Operator transitions (`start`, `pause`, `resume`, `complete`) are methods
//! on [`AssignmentProgress`]. The cursor only moves through
//! [`AssignmentProgress::record_event`]: recording a step's terminal event is
//! the single place where the assignment advances.

use chrono::TimeZone;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::step::{ButtonAction, ProtocolStep};
use crate::trigger::compute_fire_time;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Active,
    Paused,
    Completed,
}

impl AssignmentStatus {
    /// Parse a status string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "assigned" => Ok(Self::Assigned),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            _ => Err(CoreError::validation(format!(
                "Invalid assignment status '{s}'. Must be one of: assigned, active, paused, completed"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// Statuses reachable from `self`. `Completed` is terminal.
    pub fn valid_transitions(self) -> &'static [AssignmentStatus] {
        match self {
            Self::Assigned => &[Self::Active],
            Self::Active => &[Self::Paused, Self::Completed],
            Self::Paused => &[Self::Active, Self::Completed],
            Self::Completed => &[],
        }
    }

    pub fn can_transition(self, to: AssignmentStatus) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Whether steps may fire in this status.
    pub fn is_running(self) -> bool {
        self == Self::Active
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEventKind {
    Sent,
    Responded,
}

impl StepEventKind {
    /// Parse an event kind string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "sent" => Ok(Self::Sent),
            "responded" => Ok(Self::Responded),
            _ => Err(CoreError::validation(format!(
                "Invalid step event kind '{s}'. Must be one of: sent, responded"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Responded => "responded",
        }
    }
}

/// A step event about to be appended to an assignment's log.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEventInput {
    pub step_index: i32,
    pub kind: StepEventKind,
    pub occurred_at: Timestamp,
    pub value: Option<String>,
}

/// What recording an event did to the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    /// The cursor moved past the event's step.
    pub advanced: bool,
    /// The assignment reached `completed` as a result.
    pub completed: bool,
    /// Button action resolved from a response, if any.
    pub action: Option<ButtonAction>,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Mutable lifecycle state of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentProgress {
    pub status: AssignmentStatus,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    /// 1-based cursor; 0 before `start`.
    pub current_step_index: i32,
    pub total_steps: i32,
    pub completed_steps: i32,
    /// Highest step index that has a `sent` event.
    pub last_sent_step: i32,
    pub adherence_rate: Option<f64>,
    /// Fire time of the current step.
    pub next_fire_at: Option<Timestamp>,
}

impl AssignmentProgress {
    /// A freshly assigned, not yet started run.
    pub fn new(total_steps: i32) -> Self {
        Self {
            status: AssignmentStatus::Assigned,
            started_at: None,
            completed_at: None,
            current_step_index: 0,
            total_steps,
            completed_steps: 0,
            last_sent_step: 0,
            adherence_rate: None,
            next_fire_at: None,
        }
    }

    /// `assigned -> active`; schedules step 1 anchored at `now`.
    pub fn start<Tz: TimeZone>(
        &mut self,
        steps: &[ProtocolStep],
        now: Timestamp,
        tz: &Tz,
    ) -> Result<(), CoreError> {
        self.check_transition(AssignmentStatus::Active, &[AssignmentStatus::Assigned])?;
        let first = steps
            .first()
            .ok_or_else(|| CoreError::validation("cannot start a protocol that has no steps"))?;
        let fire_at = compute_fire_time(&first.spec.trigger()?, now, tz);

        self.status = AssignmentStatus::Active;
        self.started_at = Some(now);
        self.current_step_index = 1;
        self.total_steps = step_count(steps);
        self.next_fire_at = Some(fire_at);
        Ok(())
    }

    /// `active -> paused`. Cursor and fire time are kept.
    pub fn pause(&mut self) -> Result<(), CoreError> {
        self.check_transition(AssignmentStatus::Paused, &[AssignmentStatus::Active])?;
        self.status = AssignmentStatus::Paused;
        Ok(())
    }

    /// `paused -> active`, continuing where the run left off.
    pub fn resume(&mut self) -> Result<(), CoreError> {
        self.check_transition(AssignmentStatus::Active, &[AssignmentStatus::Paused])?;
        self.status = AssignmentStatus::Active;
        Ok(())
    }

    /// Operator override: `active | paused -> completed`.
    pub fn complete(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.check_transition(
            AssignmentStatus::Completed,
            &[AssignmentStatus::Active, AssignmentStatus::Paused],
        )?;
        self.finish(now);
        Ok(())
    }

    /// Apply a step event and advance when it terminates the current step.
    ///
    /// `steps` is the live step list of the protocol. The caller appends the
    /// event to the log only if this returns `Ok`. Each step is sent once;
    /// an action step that has been sent has no fire time until a response
    /// moves the cursor on.
    pub fn record_event<Tz: TimeZone>(
        &mut self,
        event: &StepEventInput,
        steps: &[ProtocolStep],
        now: Timestamp,
        tz: &Tz,
    ) -> Result<EventOutcome, CoreError> {
        if self.status == AssignmentStatus::Assigned {
            return Err(CoreError::InvalidState(
                "assignment has not been started".into(),
            ));
        }
        if event.step_index < 1 || event.step_index > self.current_step_index {
            return Err(CoreError::validation(format!(
                "step index {} is outside the reached range 1..={}",
                event.step_index, self.current_step_index
            )));
        }
        let step = step_at(steps, event.step_index).ok_or_else(|| {
            CoreError::validation(format!(
                "protocol no longer has a step {}",
                event.step_index
            ))
        })?;
        let is_current = event.step_index == self.current_step_index;

        let outcome = match event.kind {
            StepEventKind::Sent => {
                if self.status != AssignmentStatus::Active {
                    return Err(CoreError::InvalidState(format!(
                        "steps can only be sent while the assignment is active (it is {})",
                        self.status.as_str()
                    )));
                }
                if !is_current {
                    return Err(CoreError::validation(format!(
                        "only the current step ({}) can be sent",
                        self.current_step_index
                    )));
                }
                if self.last_sent_step >= event.step_index {
                    return Err(CoreError::InvalidState(format!(
                        "step {} has already been sent",
                        event.step_index
                    )));
                }
                self.last_sent_step = event.step_index;
                if step.spec.requires_action {
                    // Waiting on the patient; nothing is due until it advances.
                    self.next_fire_at = None;
                    EventOutcome { advanced: false, completed: false, action: None }
                } else {
                    self.advance(steps, event.occurred_at, true, now, tz)?
                }
            }
            StepEventKind::Responded => {
                if event.step_index > self.last_sent_step {
                    return Err(CoreError::validation(format!(
                        "step {} has not been sent yet",
                        event.step_index
                    )));
                }
                let action = step.spec.resolve_response(event.value.as_deref())?;
                let terminal = is_current
                    && self.status.is_running()
                    && step.spec.requires_action
                    && action != ButtonAction::Postpone;
                let mut outcome = if terminal {
                    self.advance(steps, event.occurred_at, action == ButtonAction::Complete, now, tz)?
                } else {
                    EventOutcome { advanced: false, completed: false, action: None }
                };
                outcome.action = Some(action);
                outcome
            }
        };

        self.refresh_adherence();
        Ok(outcome)
    }

    /// Move the cursor past the current step, completing the run after the
    /// last one. `completed_at_step` anchors the next step's fire time.
    fn advance<Tz: TimeZone>(
        &mut self,
        steps: &[ProtocolStep],
        completed_at_step: Timestamp,
        counted: bool,
        now: Timestamp,
        tz: &Tz,
    ) -> Result<EventOutcome, CoreError> {
        let next_index = self.current_step_index + 1;
        let next_fire_at = match step_at(steps, next_index) {
            Some(next) => Some(compute_fire_time(&next.spec.trigger()?, completed_at_step, tz)),
            None => None,
        };

        if counted {
            self.completed_steps += 1;
        }
        self.total_steps = step_count(steps);
        self.current_step_index = next_index;

        let completed = next_fire_at.is_none();
        if completed {
            self.finish(now);
        } else {
            self.next_fire_at = next_fire_at;
        }

        Ok(EventOutcome {
            advanced: true,
            completed,
            action: None,
        })
    }

    fn finish(&mut self, now: Timestamp) {
        self.status = AssignmentStatus::Completed;
        self.completed_at = Some(now);
        self.next_fire_at = None;
    }

    fn refresh_adherence(&mut self) {
        if self.last_sent_step > 0 {
            let rate = f64::from(self.completed_steps) / f64::from(self.last_sent_step) * 100.0;
            self.adherence_rate = Some(rate.min(100.0));
        }
    }

    fn check_transition(
        &self,
        to: AssignmentStatus,
        allowed_from: &[AssignmentStatus],
    ) -> Result<(), CoreError> {
        if allowed_from.contains(&self.status) && self.status.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!(
                "Invalid assignment transition: {} -> {}",
                self.status.as_str(),
                to.as_str()
            )))
        }
    }
}

fn step_at(steps: &[ProtocolStep], index: i32) -> Option<&ProtocolStep> {
    usize::try_from(index)
        .ok()
        .and_then(|i| i.checked_sub(1))
        .and_then(|i| steps.get(i))
}

fn step_count(steps: &[ProtocolStep]) -> i32 {
    i32::try_from(steps.len()).unwrap_or(i32::MAX)
}
