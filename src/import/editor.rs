//! Per-item type editing.
//!
//! Editing is a nested sub-state of an item: `Unfocused` until the user opens
//! the editor, then `Focused` with a text buffer until the input is confirmed
//! or cancelled. All UI events go through [`dispatch`], keyed on the event and
//! the focus state of the selected item.

use super::item::{ItemStatus, ResourceItem};
use super::resolver::TypeResolver;
use crate::iac::IacEngine;
use crate::infrastructure::error::{ImportError, ImportResult};

/// Focus sub-state of one item
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Unfocused,
    Focused {
        buffer: String,
        /// Where Escape returns to
        previous_status: ItemStatus,
        previous_type: String,
        previous_recommended: bool,
        previous_error: Option<String>,
    },
}

/// Events the front end routes to the selected item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Open the editor, or confirm the typed input
    Enter,
    /// Leave the editor without changing anything
    Escape,
    /// Replace the whole input buffer
    Input(String),
    /// Confirm the item as explicitly skipped
    Skip,
}

/// What a dispatched event did
#[derive(Debug, PartialEq)]
pub enum EditOutcome {
    /// The event does not apply in the current state
    Ignored,
    /// The editor opened
    Focused,
    /// The buffer changed
    Edited,
    /// Input accepted; the item is now Validated or Skipped
    Confirmed(ItemStatus),
    /// Input rejected; the item is back to Pending with a validation error
    Rejected(String),
    /// Escape restored the previous state
    Cancelled(ItemStatus),
    /// The previous import could not be removed; the item stays Imported
    CompensationFailed(String),
}

/// Apply one UI event to `item`
///
/// At most one status transition happens per call. Opening the editor on an
/// Imported item first removes its address from engine state; if that fails
/// the item keeps its Imported status and binding. `state_removed` marks an
/// Imported item whose address was already removed by an earlier attempt.
pub fn dispatch(
    item: &mut ResourceItem,
    focus: &mut Focus,
    event: UiEvent,
    resolver: &TypeResolver,
    engine: &dyn IacEngine,
    state_removed: bool,
) -> ImportResult<EditOutcome> {
    match focus {
        Focus::Unfocused => match event {
            UiEvent::Enter => open(item, focus, engine, state_removed),
            _ => Ok(EditOutcome::Ignored),
        },
        Focus::Focused {
            buffer,
            previous_status,
            previous_type,
            previous_recommended,
            previous_error,
        } => match event {
            UiEvent::Input(text) => {
                *buffer = text;
                Ok(EditOutcome::Edited)
            }
            UiEvent::Enter => {
                let input = buffer.clone();
                *focus = Focus::Unfocused;
                confirm(item, &input, resolver)
            }
            UiEvent::Skip => {
                *focus = Focus::Unfocused;
                item.set_target_type("");
                item.is_recommended = false;
                item.set_status(ItemStatus::Skipped)?;
                Ok(EditOutcome::Confirmed(ItemStatus::Skipped))
            }
            UiEvent::Escape => {
                let status = *previous_status;
                let resource_type = previous_type.clone();
                let recommended = *previous_recommended;
                let import_error = previous_error.take();
                *focus = Focus::Unfocused;

                item.set_target_type(&resource_type);
                item.is_recommended = recommended;
                item.import_error = import_error;
                item.set_status(status)?;
                Ok(EditOutcome::Cancelled(status))
            }
        },
    }
}

fn open(
    item: &mut ResourceItem,
    focus: &mut Focus,
    engine: &dyn IacEngine,
    state_removed: bool,
) -> ImportResult<EditOutcome> {
    if !item.status.can_transition_to(ItemStatus::Editing) {
        return Ok(EditOutcome::Ignored);
    }

    item.validation_error = None;

    let mut previous_status = item.status;
    if item.status == ItemStatus::Imported && state_removed {
        // An earlier attempt already reverted the import
        previous_status = ItemStatus::Validated;
    } else if item.status == ItemStatus::Imported {
        if let Err(e) = engine.remove_from_state(&item.target_address) {
            let err = ImportError::CompensationFailed {
                address: item.target_address.clone(),
                message: e.to_string(),
            };
            tracing::warn!(cloud_id = %item.cloud_id, error = %err, "compensation failed");
            item.validation_error = Some(err.to_string());
            return Ok(EditOutcome::CompensationFailed(err.to_string()));
        }

        tracing::info!(
            cloud_id = %item.cloud_id,
            address = %item.target_address,
            "removed previous import from state"
        );
        // The old import is gone, so cancelling leads back to a re-import
        previous_status = ItemStatus::Validated;
    }

    *focus = Focus::Focused {
        buffer: item.target_type.clone(),
        previous_status,
        previous_type: item.target_type.clone(),
        previous_recommended: item.is_recommended,
        previous_error: item.import_error.take(),
    };
    item.is_recommended = false;
    item.set_status(ItemStatus::Editing)?;
    Ok(EditOutcome::Focused)
}

fn confirm(
    item: &mut ResourceItem,
    input: &str,
    resolver: &TypeResolver,
) -> ImportResult<EditOutcome> {
    match resolver.resolve(item, input) {
        Ok(resource_type) if resource_type.is_empty() => {
            item.set_target_type("");
            item.set_status(ItemStatus::Skipped)?;
            Ok(EditOutcome::Confirmed(ItemStatus::Skipped))
        }
        Ok(resource_type) => {
            item.set_target_type(&resource_type);
            item.set_status(ItemStatus::Validated)?;
            Ok(EditOutcome::Confirmed(ItemStatus::Validated))
        }
        Err(e @ ImportError::InvalidType { .. }) => {
            let message = e.to_string();
            item.validation_error = Some(message.clone());
            item.set_status(ItemStatus::Pending)?;
            Ok(EditOutcome::Rejected(message))
        }
        Err(e) => Err(e),
    }
}
