//! Conflict resolution logic
#![allow(dead_code)]

use super::{Conflict, ConflictResolutionError};
use crate::strategies::ConflictResolution;

/// Resolves conflicts using configured strategies
pub struct ConflictResolver {
	/// Default strategy to use
	default_strategy: ConflictResolution,
}

impl ConflictResolver {
	/// Create a new conflict resolver with default strategy
	pub fn new(default_strategy: ConflictResolution) -> Self {
		ConflictResolver { default_strategy }
	}

	/// Resolve a conflict using the configured strategy
	///
	/// Returns the index of the winning version, or None if the conflict should be skipped
	pub fn resolve(
		&self,
		conflict: &Conflict,
		strategy: Option<&ConflictResolution>,
	) -> Result<Option<usize>, ConflictResolutionError> {
		let strategy = strategy.unwrap_or(&self.default_strategy);

		if conflict.versions.is_empty() {
			return Err(ConflictResolutionError::NoVersions);
		}

		match strategy {
			ConflictResolution::PreferFirst => Ok(Some(0)),

			ConflictResolution::PreferLast => Ok(Some(conflict.versions.len().saturating_sub(1))),

			ConflictResolution::PreferNewest => conflict
				.newest_version()
				.ok_or_else(|| {
					ConflictResolutionError::StrategyNotApplicable(
						"Cannot determine newest version".to_string(),
					)
				})
				.map(Some),

			ConflictResolution::PreferOldest => conflict
				.oldest_version()
				.ok_or_else(|| {
					ConflictResolutionError::StrategyNotApplicable(
						"Cannot determine oldest version".to_string(),
					)
				})
				.map(Some),

			ConflictResolution::PreferLargest => conflict
				.largest_version()
				.ok_or_else(|| {
					ConflictResolutionError::StrategyNotApplicable(
						"Cannot determine largest version".to_string(),
					)
				})
				.map(Some),

			ConflictResolution::PreferSmallest => conflict
				.smallest_version()
				.ok_or_else(|| {
					ConflictResolutionError::StrategyNotApplicable(
						"Cannot determine smallest version".to_string(),
					)
				})
				.map(Some),

			ConflictResolution::NodeByIndex(idx) => {
				if *idx >= conflict.versions.len() {
					Err(ConflictResolutionError::InvalidVersion(*idx))
				} else {
					Ok(Some(*idx))
				}
			}

			ConflictResolution::NodeByName(name) => conflict
				.version_by_name(name)
				.ok_or_else(|| ConflictResolutionError::NodeNotFound(name.clone()))
				.map(Some),

			ConflictResolution::Skip => Ok(None),

			ConflictResolution::Interactive => Err(ConflictResolutionError::StrategyNotApplicable(
				"Interactive resolution not supported here".to_string(),
			)),

			ConflictResolution::FailOnConflict => {
				Err(ConflictResolutionError::StrategyNotApplicable(
					"Conflict detected with fail-on-conflict strategy".to_string(),
				))
			}
		}
	}

	/// Check if a strategy is automatic (doesn't require user input)
	pub fn is_automatic(strategy: &ConflictResolution) -> bool {
		!matches!(strategy, ConflictResolution::Interactive)
	}

	/// Get a human-readable description of the strategy
	pub fn strategy_description(strategy: &ConflictResolution) -> &'static str {
		match strategy {
			ConflictResolution::PreferFirst => "Always choose first location",
			ConflictResolution::PreferLast => "Always choose last location",
			ConflictResolution::PreferNewest => "Choose newest modification time",
			ConflictResolution::PreferOldest => "Choose oldest modification time",
			ConflictResolution::PreferLargest => "Choose largest file",
			ConflictResolution::PreferSmallest => "Choose smallest file",
			ConflictResolution::Interactive => "Prompt user interactively",
			ConflictResolution::FailOnConflict => "Fail on any conflict",
			ConflictResolution::Skip => "Skip conflicted files",
			ConflictResolution::NodeByIndex(_) => "Prefer specific node by index",
			ConflictResolution::NodeByName(_) => "Prefer specific node by name",
		}
	}
}


// vim: ts=4
