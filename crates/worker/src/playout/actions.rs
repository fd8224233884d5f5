//! Ad-lib actions: blueprint code mutating the playing instances.

use serde_json::Value;

use rundown_core::blueprint::{
    ActionBlueprint, ActionTarget, BlueprintPart, BlueprintPiece, CommonContext,
    HashingCapability, NotesCapability, PlayoutCapability,
};
use rundown_core::error::{CoreError, UserError, UserErrorMessage};
use rundown_core::ids::{PartId, PartInstanceId, PieceId, PieceInstanceId};
use rundown_core::models::instances::{PartInstanceOrphaned, PieceInstance};
use rundown_core::models::rundown::Part;
use rundown_core::models::update::PartInstanceUpdate;
use rundown_core::notes::{NoteOrigin, NoteSeverity, TrackedNote, TranslatableMessage};
use rundown_core::types::Time;

use crate::error::{JobError, JobResult};
use crate::model::PlayoutModel;
use crate::playout::set_next::{move_next, set_next_instance};

/// What an action may touch: the playout model, through the playout
/// capability, plus hashing and notes.
pub struct ActionExecutionContext<'a> {
    common: CommonContext,
    model: &'a mut PlayoutModel,
    now: Time,
}

impl<'a> ActionExecutionContext<'a> {
    pub fn new(name: impl Into<String>, model: &'a mut PlayoutModel, now: Time) -> Self {
        let prefix = model.playlist.id.to_string();
        Self {
            common: CommonContext::new(name, prefix, NoteOrigin::playlist()),
            model,
            now,
        }
    }

    pub fn into_notes(self) -> Vec<TrackedNote> {
        self.common.into_notes()
    }

    fn target_id(&self, target: ActionTarget) -> Result<PartInstanceId, CoreError> {
        let instance = match target {
            ActionTarget::Current => self
                .model
                .current_instance()
                .ok_or(UserErrorMessage::NoCurrentPart)?,
            ActionTarget::Next => self
                .model
                .next_instance()
                .ok_or(UserErrorMessage::PartInstanceNotFound)?,
        };
        Ok(instance.id.clone())
    }

    /// Rank between the current part and whatever follows it in its
    /// segment.
    fn adlib_rank(&self, current: &Part) -> f64 {
        let following = self
            .model
            .parts
            .iter()
            .filter(|p| p.segment_id == current.segment_id && p.rank > current.rank)
            .map(|p| p.rank)
            .min_by(f64::total_cmp);
        match following {
            Some(rank) => (current.rank + rank) / 2.0,
            None => current.rank + 1.0,
        }
    }
}

impl HashingCapability for ActionExecutionContext<'_> {
    fn get_hash_id(&mut self, original: &str, not_unique: bool) -> String {
        self.common.get_hash_id(original, not_unique)
    }

    fn unhash_id(&self, hash: &str) -> String {
        self.common.unhash_id(hash)
    }
}

impl NotesCapability for ActionExecutionContext<'_> {
    fn notify(&mut self, severity: NoteSeverity, message: TranslatableMessage) {
        self.common.notify(severity, message);
    }
}

impl PlayoutCapability for ActionExecutionContext<'_> {
    fn insert_piece(
        &mut self,
        target: ActionTarget,
        piece: BlueprintPiece,
    ) -> Result<PieceInstanceId, CoreError> {
        let instance_id = self.target_id(target)?;
        let piece_id = PieceId::new(
            self.common
                .get_hash_id(&format!("{instance_id}_{}", piece.external_id), true),
        );
        let now = self.now;
        let instance = self
            .model
            .instance(&instance_id)
            .ok_or_else(|| CoreError::not_found("PartInstance", &instance_id))?;

        let mut piece = piece.into_piece(piece_id, instance.part.id.clone());
        if target == ActionTarget::Current {
            let offset = instance.started_playback().map_or(0, |start| (now - start).max(0));
            piece.enable.start += offset;
        }
        let mut piece_instance = PieceInstance::from_piece(piece, instance);
        piece_instance.dynamically_inserted = Some(now);
        if target == ActionTarget::Current && piece_instance.infinite.is_some() {
            piece_instance.planned_started_playback = instance
                .started_playback()
                .map(|start| start + piece_instance.piece.enable.start);
        }

        let id = piece_instance.id.clone();
        tracing::info!(part_instance_id = %instance_id, piece_instance_id = %id, "Inserted ad-lib piece");
        self.model.pieces_of_mut(&instance_id).push(piece_instance);
        Ok(id)
    }

    fn update_part_instance(
        &mut self,
        target: ActionTarget,
        update: PartInstanceUpdate,
    ) -> Result<(), CoreError> {
        let id = self.target_id(target)?;
        let instance = self
            .model
            .instance_mut(&id)
            .ok_or_else(|| CoreError::not_found("PartInstance", &id))?;
        instance.apply(update);
        Ok(())
    }

    fn move_next_part(&mut self, delta_parts: i32, delta_segments: i32) -> Result<bool, CoreError> {
        Ok(move_next(self.model, delta_parts, delta_segments, self.now)?)
    }

    fn queue_part(
        &mut self,
        part: BlueprintPart,
        pieces: Vec<BlueprintPiece>,
    ) -> Result<PartInstanceId, CoreError> {
        let current = self
            .model
            .current_instance()
            .ok_or(UserErrorMessage::NoCurrentPart)?
            .part
            .clone();
        let part_id = PartId::from_hash(&[current.id.as_str(), &part.external_id, "adlib"]);
        let pieces = pieces
            .into_iter()
            .map(|piece| {
                let piece_id = PieceId::from_hash(&[part_id.as_str(), &piece.external_id]);
                piece.into_piece(piece_id, part_id.clone())
            })
            .collect();
        let adlib = Part {
            id: part_id,
            segment_id: current.segment_id.clone(),
            rundown_id: current.rundown_id.clone(),
            external_id: part.external_id,
            title: part.title,
            rank: self.adlib_rank(&current),
            expected_duration: part.expected_duration,
            autonext: part.auto_next,
            untimed: part.untimed,
            invalid: part.invalid,
            floated: part.floated,
            user_edit_operations: Vec::new(),
            notes: Vec::new(),
        };

        let id = set_next_instance(self.model, adlib, Some(pieces), true, false, self.now)?;
        if let Some(instance) = self.model.instance_mut(&id) {
            instance.orphaned = Some(PartInstanceOrphaned::AdlibPart);
        }
        tracing::info!(part_instance_id = %id, "Queued ad-lib part");
        Ok(id)
    }
}

/// Run `action_id`. The model is left untouched when the action fails.
/// Returns the notes the action raised.
pub fn execute_action(
    model: &mut PlayoutModel,
    blueprint: &dyn ActionBlueprint,
    action_id: &str,
    user_data: &Value,
    now: Time,
) -> JobResult<Vec<TrackedNote>> {
    if !model.is_active() {
        return Err(UserErrorMessage::InactiveRundown.into());
    }
    let snapshot = model.snapshot();
    let mut ctx = ActionExecutionContext::new(format!("action:{action_id}"), model, now);

    match blueprint.execute_action(&mut ctx, action_id, user_data) {
        Ok(()) => {
            let notes = ctx.into_notes();
            tracing::info!(action_id, notes = notes.len(), "Executed action");
            Ok(notes)
        }
        Err(e) => {
            drop(ctx);
            model.restore(snapshot);
            tracing::info!(action_id, error = %e, "Action failed");
            Err(match e {
                CoreError::User(user) => JobError::User(user),
                other => JobError::User(
                    UserError::new(UserErrorMessage::ActionFailed).with_arg("reason", other.to_string()),
                ),
            })
        }
    }
}
