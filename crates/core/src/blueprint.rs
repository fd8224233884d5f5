//! Blueprint contracts.
//!
//! Blueprints are the show-specific code that turns ingest data into
//! segments, parts and pieces, and that implements operator actions. The
//! engine calls them through the traits here and hands them a context made
//! of small capabilities: hashing for stable ids, notes for reporting, and
//! (for actions) playout mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, UserError, UserErrorMessage};
use crate::hashing::get_hash;
use crate::ids::{PartId, PartInstanceId, PieceId, PieceInstanceId, RundownId, SegmentId};
use crate::ingest::model::{SofieIngestPart, SofieIngestSegment};
use crate::models::rundown::{Part, Piece, PieceEnable, PieceLifespan, Segment};
use crate::models::timeline::{AbSessionRequest, TimelineObject};
use crate::models::update::{PartInstanceUpdate, PartInstanceValue};
use crate::notes::{GenericNote, NoteCollector, NoteOrigin, NoteSeverity, TrackedNote, TranslatableMessage};
use crate::types::Duration;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

pub trait HashingCapability {
    /// A stable id for `original`. With `not_unique`, repeated calls with
    /// the same string get distinct ids (still stable across re-runs).
    fn get_hash_id(&mut self, original: &str, not_unique: bool) -> String;

    /// The string a hash was made from, or the hash itself if unknown.
    fn unhash_id(&self, hash: &str) -> String;
}

pub trait NotesCapability {
    fn notify(&mut self, severity: NoteSeverity, message: TranslatableMessage);

    fn notify_user_error(&mut self, message: TranslatableMessage) {
        self.notify(NoteSeverity::Error, message);
    }

    fn notify_user_warning(&mut self, message: TranslatableMessage) {
        self.notify(NoteSeverity::Warning, message);
    }

    fn notify_user_info(&mut self, message: TranslatableMessage) {
        self.notify(NoteSeverity::Info, message);
    }
}

/// Which of the playing part instances an action addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Current,
    Next,
}

pub trait PlayoutCapability {
    fn insert_piece(
        &mut self,
        target: ActionTarget,
        piece: BlueprintPiece,
    ) -> Result<PieceInstanceId, CoreError>;

    fn update_part_instance(
        &mut self,
        target: ActionTarget,
        update: PartInstanceUpdate,
    ) -> Result<(), CoreError>;

    /// Returns whether the next part changed.
    fn move_next_part(&mut self, delta_parts: i32, delta_segments: i32) -> Result<bool, CoreError>;

    /// Queue an ad-lib part after the current one and make it next.
    fn queue_part(
        &mut self,
        part: BlueprintPart,
        pieces: Vec<BlueprintPiece>,
    ) -> Result<PartInstanceId, CoreError>;
}

/// Everything an action may do.
pub trait ActionContext: HashingCapability + NotesCapability + PlayoutCapability {}

impl<T: HashingCapability + NotesCapability + PlayoutCapability> ActionContext for T {}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// Prefix-scoped id hashing.
#[derive(Debug, Clone, Default)]
pub struct HashingContext {
    prefix: String,
    counter: u32,
    originals: HashMap<String, String>,
}

impl HashingContext {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }
}

impl HashingCapability for HashingContext {
    fn get_hash_id(&mut self, original: &str, not_unique: bool) -> String {
        let original = if not_unique {
            self.counter += 1;
            format!("{original}_{}", self.counter - 1)
        } else {
            original.to_string()
        };
        let hash = get_hash(&format!("{}_{original}", self.prefix));
        self.originals.insert(hash.clone(), original);
        hash
    }

    fn unhash_id(&self, hash: &str) -> String {
        self.originals
            .get(hash)
            .cloned()
            .unwrap_or_else(|| hash.to_string())
    }
}

/// The context every blueprint call gets.
#[derive(Debug, Clone)]
pub struct CommonContext {
    pub name: String,
    origin: NoteOrigin,
    hashing: HashingContext,
    notes: NoteCollector,
}

impl CommonContext {
    pub fn new(name: impl Into<String>, id_prefix: impl Into<String>, origin: NoteOrigin) -> Self {
        Self {
            name: name.into(),
            origin,
            hashing: HashingContext::new(id_prefix),
            notes: NoteCollector::new(),
        }
    }

    pub fn notes(&self) -> &[TrackedNote] {
        self.notes.notes()
    }

    pub fn into_notes(self) -> Vec<TrackedNote> {
        self.notes.into_notes()
    }
}

impl HashingCapability for CommonContext {
    fn get_hash_id(&mut self, original: &str, not_unique: bool) -> String {
        self.hashing.get_hash_id(original, not_unique)
    }

    fn unhash_id(&self, hash: &str) -> String {
        self.hashing.unhash_id(hash)
    }
}

impl NotesCapability for CommonContext {
    fn notify(&mut self, severity: NoteSeverity, message: TranslatableMessage) {
        tracing::debug!(context = %self.name, key = %message.key, ?severity, "Blueprint note");
        self.notes.add(severity, message, self.origin.clone());
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintPiece {
    pub external_id: String,
    pub name: String,
    pub source_layer_id: String,
    pub output_layer_id: String,
    #[serde(default = "default_lifespan")]
    pub lifespan: PieceLifespan,
    #[serde(default)]
    pub start: Duration,
    #[serde(default)]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub timeline_objects: Vec<TimelineObject>,
    #[serde(default)]
    pub ab_sessions: Vec<AbSessionRequest>,
    #[serde(default)]
    pub virtual_piece: bool,
}

fn default_lifespan() -> PieceLifespan {
    PieceLifespan::WithinPart
}

impl BlueprintPiece {
    pub fn into_piece(self, id: PieceId, start_part_id: PartId) -> Piece {
        Piece {
            id,
            start_part_id,
            external_id: self.external_id,
            name: self.name,
            source_layer_id: self.source_layer_id,
            output_layer_id: self.output_layer_id,
            lifespan: self.lifespan,
            enable: PieceEnable {
                start: self.start,
                duration: self.duration,
            },
            content: self.content,
            timeline_objects: self.timeline_objects,
            ab_sessions: self.ab_sessions,
            virtual_piece: self.virtual_piece,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintPart {
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub expected_duration: Option<Duration>,
    #[serde(default)]
    pub auto_next: bool,
    #[serde(default)]
    pub untimed: bool,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default)]
    pub floated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintResultPart {
    pub part: BlueprintPart,
    pub pieces: Vec<BlueprintPiece>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlueprintResultSegment {
    pub name: String,
    pub is_hidden: bool,
    pub budget_duration: Option<Duration>,
    pub parts: Vec<BlueprintResultPart>,
}

/// A segment with its parts and pieces, ids derived.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSegment {
    pub segment: Segment,
    pub parts: Vec<Part>,
    pub pieces: Vec<Piece>,
}

impl BlueprintResultSegment {
    /// Derive stable ids and build the documents. Ranks follow the order of
    /// the parts in the result.
    pub fn into_models(
        self,
        rundown_id: &RundownId,
        external_id: &str,
        rank: f64,
        notes: Vec<GenericNote>,
    ) -> GeneratedSegment {
        let segment_id = SegmentId::from_hash(&[rundown_id.as_str(), external_id]);
        let mut parts = Vec::with_capacity(self.parts.len());
        let mut pieces = Vec::new();

        for (index, result) in self.parts.into_iter().enumerate() {
            let part_id = PartId::from_hash(&[rundown_id.as_str(), &result.part.external_id]);
            pieces.extend(result.pieces.into_iter().map(|piece| {
                let piece_id = PieceId::from_hash(&[part_id.as_str(), &piece.external_id]);
                piece.into_piece(piece_id, part_id.clone())
            }));
            let part = result.part;
            parts.push(Part {
                id: part_id,
                segment_id: segment_id.clone(),
                rundown_id: rundown_id.clone(),
                external_id: part.external_id,
                title: part.title,
                rank: index as f64,
                expected_duration: part.expected_duration,
                autonext: part.auto_next,
                untimed: part.untimed,
                invalid: part.invalid,
                floated: part.floated,
                user_edit_operations: Vec::new(),
                notes: Vec::new(),
            });
        }

        GeneratedSegment {
            segment: Segment {
                id: segment_id,
                rundown_id: rundown_id.clone(),
                external_id: external_id.to_string(),
                name: self.name,
                rank,
                budget_duration: self.budget_duration,
                countdown_type: None,
                is_hidden: self.is_hidden,
                user_edit_operations: Vec::new(),
                notes,
            },
            parts,
            pieces,
        }
    }
}

// ---------------------------------------------------------------------------
// Blueprint traits
// ---------------------------------------------------------------------------

pub trait IngestBlueprint: Send + Sync {
    fn get_segment(
        &self,
        ctx: &mut CommonContext,
        segment: &SofieIngestSegment,
    ) -> Result<BlueprintResultSegment, CoreError>;
}

pub trait ActionBlueprint: Send + Sync {
    fn execute_action(
        &self,
        ctx: &mut dyn ActionContext,
        action_id: &str,
        user_data: &Value,
    ) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// Payload blueprint
// ---------------------------------------------------------------------------

/// A blueprint driven by the ingest payloads themselves.
///
/// Each part payload may carry `expectedDuration`, `autoNext`, `untimed`
/// and a `pieces` array of [`BlueprintPiece`]s. A payload that does not
/// parse produces an invalid part and a warning note.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadBlueprint;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartPayload {
    #[serde(default)]
    expected_duration: Option<Duration>,
    #[serde(default)]
    auto_next: bool,
    #[serde(default)]
    untimed: bool,
    #[serde(default)]
    pieces: Vec<BlueprintPiece>,
}

impl PayloadBlueprint {
    fn part(ctx: &mut CommonContext, part: &SofieIngestPart) -> BlueprintResultPart {
        let parsed = if part.payload.is_null() {
            Ok(PartPayload::default())
        } else {
            serde_json::from_value::<PartPayload>(part.payload.clone())
        };

        match parsed {
            Ok(payload) => BlueprintResultPart {
                part: BlueprintPart {
                    external_id: part.external_id.clone(),
                    title: part.name.clone(),
                    expected_duration: payload.expected_duration,
                    auto_next: payload.auto_next,
                    untimed: payload.untimed,
                    invalid: false,
                    floated: false,
                },
                pieces: payload.pieces,
            },
            Err(e) => {
                ctx.notify_user_warning(
                    TranslatableMessage::new("blueprint.invalidPartPayload")
                        .with_arg("part", part.name.as_str())
                        .with_arg("reason", e.to_string()),
                );
                BlueprintResultPart {
                    part: BlueprintPart {
                        external_id: part.external_id.clone(),
                        title: part.name.clone(),
                        invalid: true,
                        ..BlueprintPart::default()
                    },
                    pieces: Vec::new(),
                }
            }
        }
    }
}

impl IngestBlueprint for PayloadBlueprint {
    fn get_segment(
        &self,
        ctx: &mut CommonContext,
        segment: &SofieIngestSegment,
    ) -> Result<BlueprintResultSegment, CoreError> {
        let mut ordered: Vec<&SofieIngestPart> = segment.parts.iter().collect();
        ordered.sort_by(|a, b| a.rank.total_cmp(&b.rank));

        Ok(BlueprintResultSegment {
            name: segment.name.clone(),
            is_hidden: segment.parts.is_empty(),
            budget_duration: segment
                .payload
                .get("budgetDuration")
                .and_then(Value::as_i64),
            parts: ordered.into_iter().map(|part| Self::part(ctx, part)).collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct InsertPieceAction {
    target: ActionTarget,
    piece: BlueprintPiece,
}

#[derive(Debug, Deserialize)]
struct QueuePartAction {
    part: BlueprintPart,
    #[serde(default)]
    pieces: Vec<BlueprintPiece>,
}

#[derive(Debug, Deserialize)]
struct MoveNextAction {
    #[serde(default)]
    parts: i32,
    #[serde(default)]
    segments: i32,
}

#[derive(Debug, Deserialize)]
struct SetTitleAction {
    target: ActionTarget,
    title: String,
}

fn parse_user_data<T: serde::de::DeserializeOwned>(user_data: &Value) -> Result<T, CoreError> {
    serde_json::from_value(user_data.clone()).map_err(|e| {
        UserError::new(UserErrorMessage::ActionFailed)
            .with_arg("reason", e.to_string())
            .into()
    })
}

impl ActionBlueprint for PayloadBlueprint {
    fn execute_action(
        &self,
        ctx: &mut dyn ActionContext,
        action_id: &str,
        user_data: &Value,
    ) -> Result<(), CoreError> {
        match action_id {
            "insert_piece" => {
                let action: InsertPieceAction = parse_user_data(user_data)?;
                ctx.insert_piece(action.target, action.piece)?;
            }
            "queue_part" => {
                let action: QueuePartAction = parse_user_data(user_data)?;
                ctx.queue_part(action.part, action.pieces)?;
            }
            "move_next" => {
                let action: MoveNextAction = parse_user_data(user_data)?;
                if !ctx.move_next_part(action.parts, action.segments)? {
                    ctx.notify_user_info(TranslatableMessage::new("blueprint.nextUnchanged"));
                }
            }
            "set_title" => {
                let action: SetTitleAction = parse_user_data(user_data)?;
                ctx.update_part_instance(
                    action.target,
                    PartInstanceUpdate::Set {
                        value: PartInstanceValue::Title(action.title),
                    },
                )?;
            }
            other => {
                return Err(UserError::new(UserErrorMessage::ActionNotFound)
                    .with_arg("id", other)
                    .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn segment(parts: Vec<SofieIngestPart>) -> SofieIngestSegment {
        SofieIngestSegment {
            external_id: "seg".into(),
            name: "Weather".into(),
            rank: 0.0,
            payload: Value::Null,
            parts,
            user_edit_states: Default::default(),
        }
    }

    fn ingest_part(id: &str, rank: f64, payload: Value) -> SofieIngestPart {
        SofieIngestPart {
            external_id: id.into(),
            name: id.into(),
            rank,
            payload,
            user_edit_states: Default::default(),
        }
    }

    // -- HashingContext -------------------------------------------------------

    #[test]
    fn hash_ids_are_stable_and_reversible() {
        let mut a = HashingContext::new("studio0");
        let mut b = HashingContext::new("studio0");
        let id = a.get_hash_id("piece_1", false);
        assert_eq!(id, b.get_hash_id("piece_1", false));
        assert_eq!(a.unhash_id(&id), "piece_1");
        assert_eq!(a.unhash_id("unknown"), "unknown");
    }

    #[test]
    fn not_unique_ids_differ() {
        let mut ctx = HashingContext::new("p");
        let first = ctx.get_hash_id("obj", true);
        let second = ctx.get_hash_id("obj", true);
        assert_ne!(first, second);
        assert_eq!(ctx.unhash_id(&second), "obj_1");
    }

    // -- CommonContext --------------------------------------------------------

    #[test]
    fn notes_carry_context_origin() {
        let origin = NoteOrigin::segment("r1".into(), "s1".into());
        let mut ctx = CommonContext::new("segment", "r1", origin.clone());
        ctx.notify_user_error(TranslatableMessage::new("oops"));
        ctx.notify_user_info(TranslatableMessage::new("fyi"));
        let notes = ctx.into_notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].severity, NoteSeverity::Error);
        assert_eq!(notes[0].origin, origin);
    }

    // -- PayloadBlueprint -----------------------------------------------------

    #[test]
    fn payload_drives_parts_and_pieces() {
        let payload = json!({
            "expectedDuration": 5000,
            "autoNext": true,
            "pieces": [{
                "externalId": "cam1",
                "name": "Camera 1",
                "sourceLayerId": "cam",
                "outputLayerId": "pgm",
                "lifespan": "out-on-segment-end"
            }]
        });
        let seg = segment(vec![
            ingest_part("b", 2.0, Value::Null),
            ingest_part("a", 1.0, payload),
        ]);
        let mut ctx = CommonContext::new("segment", "r1", NoteOrigin::playlist());
        let result = PayloadBlueprint.get_segment(&mut ctx, &seg).unwrap();

        assert_eq!(result.parts[0].part.external_id, "a");
        assert_eq!(result.parts[0].part.expected_duration, Some(5000));
        assert!(result.parts[0].part.auto_next);
        assert_eq!(result.parts[0].pieces[0].lifespan, PieceLifespan::OutOnSegmentEnd);
        assert!(ctx.notes().is_empty());
    }

    #[test]
    fn bad_payload_gives_invalid_part_and_warning() {
        let seg = segment(vec![ingest_part("a", 0.0, json!({ "autoNext": "yes" }))]);
        let mut ctx = CommonContext::new("segment", "r1", NoteOrigin::playlist());
        let result = PayloadBlueprint.get_segment(&mut ctx, &seg).unwrap();
        assert!(result.parts[0].part.invalid);
        assert_eq!(ctx.notes()[0].severity, NoteSeverity::Warning);
    }

    #[test]
    fn models_get_derived_ids() {
        let seg = segment(vec![ingest_part(
            "a",
            0.0,
            json!({ "pieces": [{
                "externalId": "cam1",
                "name": "Camera 1",
                "sourceLayerId": "cam",
                "outputLayerId": "pgm"
            }]}),
        )]);
        let mut ctx = CommonContext::new("segment", "r1", NoteOrigin::playlist());
        let rundown_id = RundownId::new("r1");
        let generated = PayloadBlueprint
            .get_segment(&mut ctx, &seg)
            .unwrap()
            .into_models(&rundown_id, "seg", 3.0, Vec::new());

        assert_eq!(generated.segment.id, SegmentId::from_hash(&["r1", "seg"]));
        assert_eq!(generated.segment.rank, 3.0);
        let part_id = PartId::from_hash(&["r1", "a"]);
        assert_eq!(generated.parts[0].id, part_id);
        assert_eq!(generated.pieces[0].id, PieceId::from_hash(&[part_id.as_str(), "cam1"]));
        assert_eq!(generated.pieces[0].start_part_id, part_id);
    }

    // -- actions --------------------------------------------------------------

    #[derive(Default)]
    struct RecordingContext {
        hashing: HashingContext,
        notes: NoteCollector,
        inserted: Vec<(ActionTarget, String)>,
        moves: Vec<(i32, i32)>,
    }

    impl HashingCapability for RecordingContext {
        fn get_hash_id(&mut self, original: &str, not_unique: bool) -> String {
            self.hashing.get_hash_id(original, not_unique)
        }
        fn unhash_id(&self, hash: &str) -> String {
            self.hashing.unhash_id(hash)
        }
    }

    impl NotesCapability for RecordingContext {
        fn notify(&mut self, severity: NoteSeverity, message: TranslatableMessage) {
            self.notes.add(severity, message, NoteOrigin::playlist());
        }
    }

    impl PlayoutCapability for RecordingContext {
        fn insert_piece(
            &mut self,
            target: ActionTarget,
            piece: BlueprintPiece,
        ) -> Result<PieceInstanceId, CoreError> {
            self.inserted.push((target, piece.external_id));
            Ok(PieceInstanceId::random())
        }

        fn update_part_instance(
            &mut self,
            _target: ActionTarget,
            _update: PartInstanceUpdate,
        ) -> Result<(), CoreError> {
            Ok(())
        }

        fn move_next_part(&mut self, delta_parts: i32, delta_segments: i32) -> Result<bool, CoreError> {
            self.moves.push((delta_parts, delta_segments));
            Ok(false)
        }

        fn queue_part(
            &mut self,
            _part: BlueprintPart,
            _pieces: Vec<BlueprintPiece>,
        ) -> Result<PartInstanceId, CoreError> {
            Ok(PartInstanceId::random())
        }
    }

    #[test]
    fn actions_dispatch_to_capabilities() {
        let mut ctx = RecordingContext::default();
        PayloadBlueprint
            .execute_action(
                &mut ctx,
                "insert_piece",
                &json!({
                    "target": "current",
                    "piece": {
                        "externalId": "gfx1",
                        "name": "Lower third",
                        "sourceLayerId": "gfx",
                        "outputLayerId": "pgm"
                    }
                }),
            )
            .unwrap();
        PayloadBlueprint
            .execute_action(&mut ctx, "move_next", &json!({ "parts": 1 }))
            .unwrap();

        assert_eq!(ctx.inserted, vec![(ActionTarget::Current, "gfx1".to_string())]);
        assert_eq!(ctx.moves, vec![(1, 0)]);
        assert_eq!(ctx.notes.len(), 1);
    }

    #[test]
    fn unknown_action_is_a_user_error() {
        let mut ctx = RecordingContext::default();
        let err = PayloadBlueprint
            .execute_action(&mut ctx, "explode", &Value::Null)
            .unwrap_err();
        assert_matches!(
            err,
            CoreError::User(UserError { message: UserErrorMessage::ActionNotFound, .. })
        );
    }
}
