//! Protocol definitions: ordered step lists, editing, validation and the
//! definition lifecycle.
//!
//! Every editing operation keeps step orders dense (`1..=N`). Persistence
//! applies edits through [`diff_steps`] so rows are updated in place and
//! step events keep pointing at the same indices.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::step::{ProtocolStep, StepSpec};
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Protocol status
// ---------------------------------------------------------------------------

/// Lifecycle status of a protocol definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

impl ProtocolStatus {
    /// Parse a status string from the database.
    pub fn from_str_db(s: &str) -> Result<Self, CoreError> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            _ => Err(CoreError::validation(format!(
                "Invalid protocol status '{s}'. Must be one of: draft, active, paused, completed"
            ))),
        }
    }

    /// Convert to a database-compatible string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// Statuses reachable from `self`. `Completed` is terminal.
    pub fn valid_transitions(self) -> &'static [ProtocolStatus] {
        match self {
            Self::Draft => &[Self::Active],
            Self::Active => &[Self::Paused, Self::Completed],
            Self::Paused => &[Self::Active, Self::Draft, Self::Completed],
            Self::Completed => &[],
        }
    }

    pub fn can_transition(self, to: ProtocolStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

// ---------------------------------------------------------------------------
// Editing types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Up,
    Down,
}

/// Result of [`ProtocolDefinition::move_step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum MoveOutcome {
    /// The step swapped places with its neighbour.
    Moved { from: i32, to: i32 },
    /// The step is already first (up) or last (down); nothing changed.
    AtBoundary { order: i32 },
}

/// Row-level changes needed to turn one step list into another.
///
/// Orders are compared position by position: an order present in both
/// lists with different content is `updated`, orders only in the new list
/// are `inserted` and orders only in the old list are `removed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepDiff {
    pub updated: Vec<i32>,
    pub inserted: Vec<i32>,
    pub removed: Vec<i32>,
}

impl StepDiff {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.inserted.is_empty() && self.removed.is_empty()
    }
}

/// Compute the [`StepDiff`] between two dense step lists.
pub fn diff_steps(old: &[ProtocolStep], new: &[ProtocolStep]) -> StepDiff {
    let mut diff = StepDiff::default();
    for (i, step) in new.iter().enumerate() {
        match old.get(i) {
            Some(prev) if prev.spec == step.spec => {}
            Some(_) => diff.updated.push(step.step_order),
            None => diff.inserted.push(step.step_order),
        }
    }
    diff.removed = old.iter().skip(new.len()).map(|s| s.step_order).collect();
    diff
}

// ---------------------------------------------------------------------------
// Definition
// ---------------------------------------------------------------------------

/// A protocol template together with its ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolDefinition {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub status: ProtocolStatus,
    pub steps: Vec<ProtocolStep>,
}

impl ProtocolDefinition {
    /// A new, empty draft.
    pub fn new(id: DbId, name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description,
            status: ProtocolStatus::Draft,
            steps: Vec::new(),
        }
    }

    /// Step editing is only allowed on drafts.
    pub fn ensure_editable(&self) -> Result<(), CoreError> {
        if self.status == ProtocolStatus::Draft {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!(
                "Protocol {} is {}; steps can only be edited in draft",
                self.id,
                self.status.as_str()
            )))
        }
    }

    /// Look up a step by its 1-based order.
    pub fn step(&self, order: i32) -> Option<&ProtocolStep> {
        usize::try_from(order)
            .ok()
            .and_then(|o| o.checked_sub(1))
            .and_then(|i| self.steps.get(i))
    }

    pub fn total_steps(&self) -> i32 {
        i32::try_from(self.steps.len()).unwrap_or(i32::MAX)
    }

    /// Append a step; its order becomes `len + 1`.
    pub fn add_step(&mut self, spec: StepSpec) -> i32 {
        let order = self.total_steps() + 1;
        self.steps.push(ProtocolStep {
            step_order: order,
            spec,
        });
        order
    }

    /// Remove the step at `order` and shift every later step up by one.
    pub fn remove_step(&mut self, order: i32) -> Result<ProtocolStep, CoreError> {
        let index = self.index_of(order)?;
        let removed = self.steps.remove(index);
        self.renumber();
        Ok(removed)
    }

    /// Swap the step at `order` with its neighbour in `direction`.
    pub fn move_step(
        &mut self,
        order: i32,
        direction: MoveDirection,
    ) -> Result<MoveOutcome, CoreError> {
        let index = self.index_of(order)?;
        let target = match direction {
            MoveDirection::Up => index.checked_sub(1),
            MoveDirection::Down => Some(index + 1).filter(|&t| t < self.steps.len()),
        };
        let Some(target) = target else {
            return Ok(MoveOutcome::AtBoundary { order });
        };

        self.steps.swap(index, target);
        self.renumber();
        Ok(MoveOutcome::Moved {
            from: order,
            to: self.steps[target].step_order,
        })
    }

    /// Replace the body of the step at `order`, keeping its position.
    pub fn update_step(&mut self, order: i32, spec: StepSpec) -> Result<(), CoreError> {
        let index = self.index_of(order)?;
        self.steps[index].spec = spec;
        Ok(())
    }

    /// Replace the whole step list, numbering the new steps `1..=N`.
    pub fn replace_steps(&mut self, specs: Vec<StepSpec>) -> StepDiff {
        let old = std::mem::take(&mut self.steps);
        for spec in specs {
            self.add_step(spec);
        }
        diff_steps(&old, &self.steps)
    }

    /// Every rule the definition currently breaks.
    pub fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.name.trim().is_empty() {
            out.push("protocol name is required".to_string());
        }
        if self.steps.is_empty() {
            out.push("protocol must have at least one step".to_string());
        }
        for step in &self.steps {
            out.extend(step.spec.violations(step.step_order));
        }
        out
    }

    /// Fail with the full list of violations, if any.
    pub fn validate(&self) -> Result<(), CoreError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(violations))
        }
    }

    /// `draft -> active`, only when the definition validates.
    pub fn activate(&mut self) -> Result<(), CoreError> {
        if self.status != ProtocolStatus::Draft {
            return Err(CoreError::InvalidState(format!(
                "Only draft protocols can be activated (protocol {} is {})",
                self.id,
                self.status.as_str()
            )));
        }
        self.validate()?;
        self.status = ProtocolStatus::Active;
        Ok(())
    }

    /// `active -> paused`.
    pub fn pause(&mut self) -> Result<(), CoreError> {
        self.transition(ProtocolStatus::Paused)
    }

    /// `paused -> active`.
    pub fn resume(&mut self) -> Result<(), CoreError> {
        if self.status != ProtocolStatus::Paused {
            return Err(self.invalid_transition(ProtocolStatus::Active));
        }
        self.validate()?;
        self.transition(ProtocolStatus::Active)
    }

    /// `paused -> draft`, reopening the steps for editing.
    pub fn revert_to_draft(&mut self) -> Result<(), CoreError> {
        self.transition(ProtocolStatus::Draft)
    }

    /// `active | paused -> completed`.
    pub fn complete(&mut self) -> Result<(), CoreError> {
        self.transition(ProtocolStatus::Completed)
    }

    /// New assignments may only be created against active protocols.
    pub fn ensure_assignable(&self) -> Result<(), CoreError> {
        if self.status == ProtocolStatus::Active {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!(
                "Protocol {} is {}; only active protocols can be assigned",
                self.id,
                self.status.as_str()
            )))
        }
    }

    fn transition(&mut self, to: ProtocolStatus) -> Result<(), CoreError> {
        if !self.status.can_transition(to) {
            return Err(self.invalid_transition(to));
        }
        self.status = to;
        Ok(())
    }

    fn invalid_transition(&self, to: ProtocolStatus) -> CoreError {
        CoreError::InvalidState(format!(
            "Invalid protocol transition: {} -> {}",
            self.status.as_str(),
            to.as_str()
        ))
    }

    fn index_of(&self, order: i32) -> Result<usize, CoreError> {
        usize::try_from(order)
            .ok()
            .filter(|&o| o >= 1 && o <= self.steps.len())
            .map(|o| o - 1)
            .ok_or(CoreError::NotFound {
                entity: "ProtocolStep",
                id: DbId::from(order),
            })
    }

    fn renumber(&mut self) {
        for (i, step) in self.steps.iter_mut().enumerate() {
            step.step_order = i32::try_from(i + 1).unwrap_or(i32::MAX);
        }
    }
}
