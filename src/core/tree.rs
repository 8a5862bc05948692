//! Pure editing operations over a pipeline's stage list
//!
//! Stages live either as top-level entries or as members of a `parallel`
//! group one level deep. Every function here is free of I/O; callers commit
//! the edited document through the store afterwards.
//!
//! The functions do not enforce identifier uniqueness. Callers check
//! [`is_duplicate_identifier`] before inserting.

use crate::core::{
    pipeline::{Pipeline, StageNode},
    stage::Stage,
};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// A stage found in the tree, with the parallel group holding it (if any)
#[derive(Debug, Clone, Copy)]
pub struct StageRef<'a> {
    pub stage: &'a Stage,
    pub parent: Option<&'a StageNode>,
}

/// Where to put a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertPosition {
    /// As a new entry right after the entry holding this stage
    After(String),
    /// In parallel with this stage, forming or extending a group
    ParallelWith(String),
    /// As a new entry at this index (clamped to the list length)
    AtIndex(usize),
}

impl InsertPosition {
    /// The stage the position is relative to, if any
    pub fn anchor(&self) -> Option<&str> {
        match self {
            InsertPosition::After(id) | InsertPosition::ParallelWith(id) => Some(id),
            InsertPosition::AtIndex(_) => None,
        }
    }
}

/// Structural errors raised by tree edits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("stage '{0}' not found")]
    StageNotFound(String),

    #[error("stage identifier '{0}' is already used in this pipeline")]
    DuplicateIdentifier(String),

    #[error("stage '{stage}' must stay after '{depends_on}', which it takes configuration from")]
    DependencyOrder { stage: String, depends_on: String },

    #[error("stage '{stage}' is used by {}", dependents.join(", "))]
    HasDependents { stage: String, dependents: Vec<String> },

    #[error("stage '{0}' cannot be positioned relative to itself")]
    SelfTarget(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Top(usize),
    Nested(usize, usize),
}

impl Location {
    fn top_index(self) -> usize {
        match self {
            Location::Top(index) | Location::Nested(index, _) => index,
        }
    }
}

fn is_stage(node: &StageNode, id: &str) -> bool {
    matches!(node, StageNode::Stage { stage } if stage.identifier == id)
}

fn locate(stages: &[StageNode], id: &str) -> Option<Location> {
    stages.iter().enumerate().find_map(|(index, node)| match node {
        StageNode::Stage { stage } => (stage.identifier == id).then_some(Location::Top(index)),
        StageNode::Parallel { parallel } => parallel
            .iter()
            .position(|child| is_stage(child, id))
            .map(|child| Location::Nested(index, child)),
    })
}

/// Find a stage by identifier
///
/// Returns `None` when no stage matches; that is not an error.
pub fn find_stage<'a>(pipeline: &'a Pipeline, id: &str) -> Option<StageRef<'a>> {
    for node in &pipeline.stages {
        match node {
            StageNode::Stage { stage } if stage.identifier == id => {
                return Some(StageRef { stage, parent: None });
            }
            StageNode::Stage { .. } => {}
            StageNode::Parallel { parallel } => {
                let found = parallel.iter().find_map(|child| match child {
                    StageNode::Stage { stage } if stage.identifier == id => Some(stage),
                    _ => None,
                });
                if let Some(stage) = found {
                    return Some(StageRef {
                        stage,
                        parent: Some(node),
                    });
                }
            }
        }
    }
    None
}

/// Mutable access to a stage by identifier
pub fn find_stage_mut<'a>(pipeline: &'a mut Pipeline, id: &str) -> Option<&'a mut Stage> {
    let node = match locate(&pipeline.stages, id)? {
        Location::Top(index) => &mut pipeline.stages[index],
        Location::Nested(index, child) => match &mut pipeline.stages[index] {
            StageNode::Parallel { parallel } => &mut parallel[child],
            StageNode::Stage { .. } => return None,
        },
    };

    match node {
        StageNode::Stage { stage } => Some(stage),
        StageNode::Parallel { .. } => None,
    }
}

/// Dotted index path of a stage, e.g. `stages.2.parallel.1`
///
/// A non-empty `prefix` is joined in front with a dot. Computed fresh on each
/// call since stage order changes between edits.
pub fn path_to_stage(pipeline: &Pipeline, id: &str, prefix: &str) -> Option<String> {
    let path = match locate(&pipeline.stages, id)? {
        Location::Top(index) => format!("stages.{}", index),
        Location::Nested(index, child) => format!("stages.{}.parallel.{}", index, child),
    };

    if prefix.is_empty() {
        Some(path)
    } else {
        Some(format!("{}.{}", prefix, path))
    }
}

fn insert_into(stages: &mut Vec<StageNode>, stage: Stage, position: &InsertPosition) {
    match position {
        InsertPosition::After(id) => {
            let index = locate(stages, id).map_or(stages.len(), |loc| loc.top_index() + 1);
            stages.insert(index, StageNode::stage(stage));
        }
        InsertPosition::ParallelWith(id) => match locate(stages, id) {
            Some(Location::Nested(index, _)) => {
                if let StageNode::Parallel { parallel } = &mut stages[index] {
                    parallel.push(StageNode::stage(stage));
                }
            }
            Some(Location::Top(index)) => {
                let existing = stages.remove(index);
                stages.insert(
                    index,
                    StageNode::Parallel {
                        parallel: vec![existing, StageNode::stage(stage)],
                    },
                );
            }
            None => stages.push(StageNode::stage(stage)),
        },
        InsertPosition::AtIndex(index) => {
            let index = (*index).min(stages.len());
            stages.insert(index, StageNode::stage(stage));
        }
    }
}

/// Insert a stage
///
/// An anchor that does not exist falls back to appending at the end.
pub fn insert_stage(pipeline: &mut Pipeline, stage: Stage, position: &InsertPosition) {
    insert_into(&mut pipeline.stages, stage, position);
}

fn take_stage(stages: &mut Vec<StageNode>, id: &str) -> Option<Stage> {
    let removed = match locate(stages, id)? {
        Location::Top(index) => stages.remove(index),
        Location::Nested(index, child) => {
            let StageNode::Parallel { parallel } = &mut stages[index] else {
                return None;
            };
            let removed = parallel.remove(child);
            match parallel.len() {
                0 => {
                    stages.remove(index);
                }
                1 => {
                    if let Some(only) = parallel.pop() {
                        stages[index] = only;
                    }
                }
                _ => {}
            }
            removed
        }
    };

    match removed {
        StageNode::Stage { stage } => Some(stage),
        StageNode::Parallel { .. } => None,
    }
}

/// Remove a stage wherever it is
///
/// A parallel group left with one member is unwrapped back into a bare
/// entry; a group left empty disappears. Returns `false` when the identifier
/// is unknown, leaving the tree untouched.
pub fn remove_stage(pipeline: &mut Pipeline, id: &str) -> bool {
    take_stage(&mut pipeline.stages, id).is_some()
}

/// Replace the stage with the same identifier
pub fn replace_stage(pipeline: &mut Pipeline, stage: Stage) -> bool {
    match find_stage_mut(pipeline, &stage.identifier) {
        Some(slot) => {
            *slot = stage;
            true
        }
        None => false,
    }
}

/// Index of the top-level entry holding a stage
pub fn top_level_index(pipeline: &Pipeline, id: &str) -> Option<usize> {
    locate(&pipeline.stages, id).map(Location::top_index)
}

/// Move a stage to a new position
///
/// An unknown moved stage or anchor is a `StageNotFound`. The move is
/// refused, leaving the tree as it was, when the stage would end up at or
/// before a stage it takes configuration from, or when a stage that depends
/// on it would end up at or before it.
pub fn move_stage(pipeline: &mut Pipeline, id: &str, position: &InsertPosition) -> Result<(), TreeError> {
    if position.anchor() == Some(id) {
        return Err(TreeError::SelfTarget(id.to_string()));
    }

    if locate(&pipeline.stages, id).is_none() {
        return Err(TreeError::StageNotFound(id.to_string()));
    }
    if let Some(anchor) = position.anchor() {
        if locate(&pipeline.stages, anchor).is_none() {
            return Err(TreeError::StageNotFound(anchor.to_string()));
        }
    }

    let mut candidate = pipeline.stages.clone();
    let stage = take_stage(&mut candidate, id).ok_or_else(|| TreeError::StageNotFound(id.to_string()))?;
    insert_into(&mut candidate, stage, position);
    check_order_around(&candidate, id)?;

    pipeline.stages = candidate;
    Ok(())
}

/// Check that `id` sits after everything it references and before everything
/// referencing it
fn check_order_around(stages: &[StageNode], id: &str) -> Result<(), TreeError> {
    let Some(location) = locate(stages, id) else {
        return Ok(());
    };
    let position = location.top_index();

    for (index, node) in stages.iter().enumerate() {
        for stage in node.stages() {
            for reference in stage.references() {
                if stage.identifier != id && reference != id {
                    continue;
                }
                let Some(target) = locate(stages, reference) else {
                    continue;
                };
                let holder = if stage.identifier == id { position } else { index };
                if target.top_index() >= holder {
                    return Err(TreeError::DependencyOrder {
                        stage: stage.identifier.clone(),
                        depends_on: reference.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Check the whole tree: every stage sits strictly after the stages it
/// references (a parallel sibling does not count as "after")
pub fn validate_stage_order(pipeline: &Pipeline) -> Result<(), TreeError> {
    for (index, node) in pipeline.stages.iter().enumerate() {
        for stage in node.stages() {
            for reference in stage.references() {
                if let Some(target) = locate(&pipeline.stages, reference) {
                    if target.top_index() >= index {
                        return Err(TreeError::DependencyOrder {
                            stage: stage.identifier.clone(),
                            depends_on: reference.to_string(),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Identifiers of the stages taking configuration from `id`
pub fn dependent_stages(pipeline: &Pipeline, id: &str) -> Vec<String> {
    flatten_stages(pipeline)
        .into_iter()
        .filter(|stage| stage.references().contains(&id))
        .map(|stage| stage.identifier.clone())
        .collect()
}

/// All stages in document order, parallel members inlined
pub fn flatten_stages(pipeline: &Pipeline) -> Vec<&Stage> {
    pipeline.stages.iter().flat_map(StageNode::stages).collect()
}

/// All stage identifiers in document order
pub fn stage_identifiers(pipeline: &Pipeline) -> Vec<&str> {
    flatten_stages(pipeline)
        .into_iter()
        .map(|stage| stage.identifier.as_str())
        .collect()
}

/// Whether a stage already uses this identifier
pub fn is_duplicate_identifier(pipeline: &Pipeline, id: &str) -> bool {
    find_stage(pipeline, id).is_some()
}

/// First unconfigured placeholder stage, if any
pub fn find_placeholder_stage(pipeline: &Pipeline) -> Option<&Stage> {
    flatten_stages(pipeline).into_iter().find(|stage| stage.is_placeholder())
}

fn disallowed_identifier_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^0-9a-zA-Z_$ ]").expect("static pattern"))
}

/// Base identifier for stages without a usable name
pub const DEFAULT_STAGE_IDENTIFIER: &str = "stage";

/// Derive an identifier from a display name
///
/// Drops characters an identifier cannot hold, turns spaces into
/// underscores, and prefixes a leading digit with `_`. A name with nothing
/// usable left gives [`DEFAULT_STAGE_IDENTIFIER`].
pub fn identifier_from_name(name: &str) -> String {
    let cleaned = disallowed_identifier_chars().replace_all(name.trim(), "");
    let identifier = cleaned.split_whitespace().collect::<Vec<_>>().join("_");

    match identifier.chars().next() {
        Some(first) if first.is_ascii_digit() => format!("_{}", identifier),
        Some(_) => identifier,
        None => DEFAULT_STAGE_IDENTIFIER.to_string(),
    }
}

/// `base` if unused, otherwise `base_1`, `base_2`, ... whichever is free first
pub fn unique_identifier(pipeline: &Pipeline, base: &str) -> String {
    if !is_duplicate_identifier(pipeline, base) {
        return base.to_string();
    }

    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !is_duplicate_identifier(pipeline, candidate))
        .unwrap_or_else(|| base.to_string())
}
