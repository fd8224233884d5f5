//! The in-memory working copy a playout job operates on.
//!
//! [`PlayoutModel::load`] reads everything one playlist needs under its
//! lock. Jobs mutate the playlist and the part/piece instances in memory;
//! only a successful job calls [`PlayoutModel::save`]. Studio, show-style
//! and rundown content are read-only for the duration of the job.
//!
//! Saving writes only documents that differ from what was loaded, and
//! writes the playlist after the instances it points at.

use std::collections::{BTreeMap, HashSet};

use rundown_core::error::{CoreError, UserErrorMessage};
use rundown_core::ids::{PartId, PartInstanceId, PieceInstanceId, RundownId, RundownPlaylistId, ShowStyleVariantId};
use rundown_core::models::instances::{PartInstance, PieceInstance};
use rundown_core::models::show_style::{resolve_show_style, ResolvedShowStyle, SourceLayers};
use rundown_core::models::{Part, Piece, Rundown, RundownPlaylist, Segment, Studio};
use rundown_core::notes::TrackedNote;
use rundown_core::playout::select_next::{playlist_order, PlayoutOrder};
use rundown_core::playout::PartPosition;

use crate::error::JobResult;
use crate::store::Store;

pub struct PlayoutModel {
    pub studio: Studio,
    pub playlist: RundownPlaylist,
    pub rundowns: Vec<Rundown>,
    pub show_styles: BTreeMap<ShowStyleVariantId, ResolvedShowStyle>,
    pub segments: Vec<Segment>,
    pub parts: Vec<Part>,
    pub pieces: Vec<Piece>,
    /// Instances not reset, of every rundown in the playlist.
    pub part_instances: Vec<PartInstance>,
    pub piece_instances: BTreeMap<PartInstanceId, Vec<PieceInstance>>,
    /// Notes raised by playout during this job.
    pub notes: Vec<TrackedNote>,
    pub(crate) removed_part_instances: Vec<PartInstanceId>,
    pub(crate) persisted: PersistedState,
}

/// The instance documents as the store held them at load time.
#[derive(Debug, Clone, Default)]
pub(crate) struct PersistedState {
    playlist: Option<RundownPlaylist>,
    part_instances: BTreeMap<PartInstanceId, PartInstance>,
    piece_instances: BTreeMap<PieceInstanceId, PieceInstance>,
}

impl PersistedState {
    fn capture(
        playlist: &RundownPlaylist,
        part_instances: &[PartInstance],
        piece_instances: &BTreeMap<PartInstanceId, Vec<PieceInstance>>,
    ) -> Self {
        Self {
            playlist: Some(playlist.clone()),
            part_instances: part_instances
                .iter()
                .map(|i| (i.id.clone(), i.clone()))
                .collect(),
            piece_instances: piece_instances
                .values()
                .flatten()
                .map(|p| (p.id.clone(), p.clone()))
                .collect(),
        }
    }
}

/// The mutable half of a [`PlayoutModel`].
#[derive(Debug, Clone)]
pub struct PlayoutModelSnapshot {
    playlist: RundownPlaylist,
    part_instances: Vec<PartInstance>,
    piece_instances: BTreeMap<PartInstanceId, Vec<PieceInstance>>,
    notes: Vec<TrackedNote>,
    removed_part_instances: Vec<PartInstanceId>,
}

impl PlayoutModel {
    pub async fn load(store: &Store, playlist_id: &RundownPlaylistId) -> JobResult<Self> {
        let playlist = store
            .playlists
            .find_one(playlist_id.as_str())
            .await?
            .ok_or(UserErrorMessage::PlaylistNotFound)?;
        let studio = store
            .studios
            .find_one(playlist.studio_id.as_str())
            .await?
            .ok_or_else(|| CoreError::not_found("Studio", &playlist.studio_id))?;

        let rundown_ids: HashSet<RundownId> = playlist.rundown_ids_in_order.iter().cloned().collect();
        let rundowns = store
            .rundowns
            .find_where(&|r: &Rundown| rundown_ids.contains(&r.id))
            .await?;

        let mut show_styles = BTreeMap::new();
        for rundown in &rundowns {
            if show_styles.contains_key(&rundown.show_style_variant_id) {
                continue;
            }
            let variant = store
                .show_style_variants
                .find_one(rundown.show_style_variant_id.as_str())
                .await?
                .ok_or_else(|| CoreError::not_found("ShowStyleVariant", &rundown.show_style_variant_id))?;
            let base = store
                .show_style_bases
                .find_one(rundown.show_style_base_id.as_str())
                .await?
                .ok_or_else(|| CoreError::not_found("ShowStyleBase", &rundown.show_style_base_id))?;
            show_styles.insert(variant.id.clone(), resolve_show_style(&base, &variant)?);
        }

        let segments = store
            .segments
            .find_where(&|s: &Segment| rundown_ids.contains(&s.rundown_id))
            .await?;
        let parts = store
            .parts
            .find_where(&|p: &Part| rundown_ids.contains(&p.rundown_id))
            .await?;
        let part_ids: HashSet<PartId> = parts.iter().map(|p| p.id.clone()).collect();
        let pieces = store
            .pieces
            .find_where(&|p: &Piece| part_ids.contains(&p.start_part_id))
            .await?;

        let part_instances = store
            .part_instances
            .find_where(&|i: &PartInstance| !i.reset && rundown_ids.contains(&i.rundown_id))
            .await?;
        let instance_ids: HashSet<PartInstanceId> =
            part_instances.iter().map(|i| i.id.clone()).collect();
        let mut piece_instances: BTreeMap<PartInstanceId, Vec<PieceInstance>> = BTreeMap::new();
        for piece in store
            .piece_instances
            .find_where(&|p: &PieceInstance| !p.reset && instance_ids.contains(&p.part_instance_id))
            .await?
        {
            piece_instances
                .entry(piece.part_instance_id.clone())
                .or_default()
                .push(piece);
        }

        tracing::debug!(
            playlist_id = %playlist.id,
            rundowns = rundowns.len(),
            parts = parts.len(),
            part_instances = part_instances.len(),
            "Loaded playout model"
        );

        let persisted = PersistedState::capture(&playlist, &part_instances, &piece_instances);
        Ok(Self {
            studio,
            playlist,
            rundowns,
            show_styles,
            segments,
            parts,
            pieces,
            part_instances,
            piece_instances,
            notes: Vec::new(),
            removed_part_instances: Vec::new(),
            persisted,
        })
    }

    /// Write what changed since load. Instances go first and the playlist
    /// last, so a save cut short never leaves the playlist pointing at an
    /// instance that was not written. Removed instances and dropped pieces
    /// are deleted after the playlist no longer references them.
    pub async fn save(&self, store: &Store) -> JobResult<()> {
        let changed_instances: Vec<PartInstance> = self
            .part_instances
            .iter()
            .filter(|i| self.persisted.part_instances.get(&i.id) != Some(*i))
            .cloned()
            .collect();
        let changed_pieces: Vec<PieceInstance> = self
            .piece_instances
            .values()
            .flatten()
            .filter(|p| self.persisted.piece_instances.get(&p.id) != Some(*p))
            .cloned()
            .collect();

        let kept_pieces: HashSet<&PieceInstanceId> =
            self.piece_instances.values().flatten().map(|p| &p.id).collect();
        let dropped_pieces: Vec<&PieceInstanceId> = self
            .persisted
            .piece_instances
            .keys()
            .filter(|id| !kept_pieces.contains(id))
            .collect();

        tracing::debug!(
            playlist_id = %self.playlist.id,
            part_instances = changed_instances.len(),
            piece_instances = changed_pieces.len(),
            removed = self.removed_part_instances.len() + dropped_pieces.len(),
            "Saving playout model"
        );

        store.part_instances.upsert_many(changed_instances).await?;
        store.piece_instances.upsert_many(changed_pieces).await?;

        if self.persisted.playlist.as_ref() != Some(&self.playlist) {
            store.playlists.upsert(self.playlist.clone()).await?;
        }

        for id in &self.removed_part_instances {
            store.part_instances.remove(id.as_str()).await?;
        }
        for id in dropped_pieces {
            store.piece_instances.remove(id.as_str()).await?;
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PlayoutModelSnapshot {
        PlayoutModelSnapshot {
            playlist: self.playlist.clone(),
            part_instances: self.part_instances.clone(),
            piece_instances: self.piece_instances.clone(),
            notes: self.notes.clone(),
            removed_part_instances: self.removed_part_instances.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: PlayoutModelSnapshot) {
        self.playlist = snapshot.playlist;
        self.part_instances = snapshot.part_instances;
        self.piece_instances = snapshot.piece_instances;
        self.notes = snapshot.notes;
        self.removed_part_instances = snapshot.removed_part_instances;
    }

    // -- lookups --

    pub fn is_active(&self) -> bool {
        self.playlist.is_active()
    }

    pub fn order(&self) -> PlayoutOrder<'_> {
        playlist_order(&self.playlist, &self.segments, &self.parts)
    }

    pub fn part(&self, id: &PartId) -> Option<&Part> {
        self.parts.iter().find(|p| p.id == *id)
    }

    pub fn rundown(&self, id: &RundownId) -> Option<&Rundown> {
        self.rundowns.iter().find(|r| r.id == *id)
    }

    pub fn pieces_for_part<'a>(&'a self, part_id: &'a PartId) -> impl Iterator<Item = &'a Piece> + 'a {
        self.pieces.iter().filter(move |p| p.start_part_id == *part_id)
    }

    pub fn instance(&self, id: &PartInstanceId) -> Option<&PartInstance> {
        self.part_instances.iter().find(|i| i.id == *id)
    }

    pub fn instance_mut(&mut self, id: &PartInstanceId) -> Option<&mut PartInstance> {
        self.part_instances.iter_mut().find(|i| i.id == *id)
    }

    pub fn current_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .current_part_instance_id()
            .and_then(|id| self.instance(id))
    }

    pub fn next_instance(&self) -> Option<&PartInstance> {
        self.playlist
            .next_part_instance_id()
            .and_then(|id| self.instance(id))
    }

    pub fn pieces_of(&self, id: &PartInstanceId) -> &[PieceInstance] {
        self.piece_instances.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn pieces_of_mut(&mut self, id: &PartInstanceId) -> &mut Vec<PieceInstance> {
        self.piece_instances.entry(id.clone()).or_default()
    }

    pub fn show_style(&self, rundown_id: &RundownId) -> JobResult<&ResolvedShowStyle> {
        let rundown = self
            .rundown(rundown_id)
            .ok_or_else(|| CoreError::not_found("Rundown", rundown_id))?;
        Ok(self
            .show_styles
            .get(&rundown.show_style_variant_id)
            .ok_or_else(|| CoreError::not_found("ShowStyleVariant", &rundown.show_style_variant_id))?)
    }

    pub fn source_layers(&self, rundown_id: &RundownId) -> JobResult<&SourceLayers> {
        Ok(&self.show_style(rundown_id)?.source_layers)
    }

    /// Where `part` sits, for lifespan decisions.
    pub fn position<'a>(&'a self, part: &'a Part) -> JobResult<PartPosition<'a>> {
        let rundown = self
            .rundown(&part.rundown_id)
            .ok_or_else(|| CoreError::not_found("Rundown", &part.rundown_id))?;
        Ok(PartPosition {
            segment_id: &part.segment_id,
            rundown_id: &part.rundown_id,
            show_style_variant_id: &rundown.show_style_variant_id,
        })
    }

    // -- mutation --

    pub fn insert_instance(&mut self, instance: PartInstance, pieces: Vec<PieceInstance>) {
        self.removed_part_instances.retain(|id| *id != instance.id);
        self.piece_instances.insert(instance.id.clone(), pieces);
        match self.part_instances.iter_mut().find(|i| i.id == instance.id) {
            Some(existing) => *existing = instance,
            None => self.part_instances.push(instance),
        }
    }

    /// Forget an instance that never went on air.
    pub fn remove_instance(&mut self, id: &PartInstanceId) {
        self.part_instances.retain(|i| i.id != *id);
        self.piece_instances.remove(id);
        self.removed_part_instances.push(id.clone());
    }
}
