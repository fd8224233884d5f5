//! Studio configuration: settings, device mappings, route sets and AB pools.
//!
//! Mappings and route sets are stored as defaults plus operator overrides;
//! use [`Studio::resolved_mappings`] and [`Studio::resolved_route_sets`] to
//! get the concrete tables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::ids::{ShowStyleBaseId, StudioId};
use crate::ingest::mos::MosGroupingConfig;
use crate::overrides::{apply_and_validate_overrides, ObjectWithOverrides};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioSettings {
    /// Allow more than one active playlist in the studio at a time.
    #[serde(default)]
    pub allow_multiple_active_playlists: bool,
    /// Overrides the worker default when set.
    #[serde(default)]
    pub take_debounce_ms: Option<i64>,
    /// Overrides the worker default when set.
    #[serde(default)]
    pub lookahead_max_search_distance: Option<usize>,
    #[serde(default)]
    pub mos_grouping: Option<MosGroupingConfig>,
}

// ---------------------------------------------------------------------------
// Mappings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookaheadMode {
    #[default]
    None,
    /// Preload on a separate `{layer}_lookahead` layer.
    Preload,
    /// Play on the layer itself while nothing else occupies it.
    WhenClear,
}

/// Maps a timeline layer to a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub device_id: String,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub layer_name: Option<String>,
    #[serde(default)]
    pub lookahead: LookaheadMode,
    #[serde(default)]
    pub lookahead_depth: Option<usize>,
    #[serde(default)]
    pub lookahead_max_search_distance: Option<usize>,
    #[serde(default)]
    pub options: Value,
}

/// Layer id to mapping.
pub type MappingsExt = BTreeMap<String, Mapping>;

// ---------------------------------------------------------------------------
// Route sets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudioRouteBehavior {
    Hidden,
    #[default]
    Toggle,
    /// Can be switched on but never off by the operator. Not deactivated by
    /// other members of its exclusivity group.
    ActivateOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    /// Send the layer to another mapping, keeping the original device
    /// settings and overlaying `remap`.
    #[default]
    Reroute,
    /// Replace the mapping entirely by `remap`.
    Remap,
}

/// Partial mapping overlaid by a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteRemapping {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub lookahead: Option<LookaheadMode>,
    #[serde(default)]
    pub lookahead_depth: Option<usize>,
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMapping {
    /// Layer being routed. `None` inserts a brand new layer.
    #[serde(default)]
    pub mapped_layer: Option<String>,
    pub output_mapped_layer: String,
    #[serde(default)]
    pub route_type: RouteType,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub remapping: Option<RouteRemapping>,
}

/// A player that is only usable while a route set referencing it is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbPlayerReference {
    pub pool_name: String,
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudioRouteSet {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub default_active: Option<bool>,
    #[serde(default)]
    pub exclusivity_group: Option<String>,
    #[serde(default)]
    pub behavior: StudioRouteBehavior,
    #[serde(default)]
    pub routes: Vec<RouteMapping>,
    #[serde(default)]
    pub ab_players: Vec<AbPlayerReference>,
}

pub type RouteSets = BTreeMap<String, StudioRouteSet>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSetExclusivityGroup {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Studio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Studio {
    pub id: StudioId,
    pub name: String,
    #[serde(default)]
    pub settings: StudioSettings,
    #[serde(default)]
    pub mappings: ObjectWithOverrides<MappingsExt>,
    #[serde(default)]
    pub route_sets: ObjectWithOverrides<RouteSets>,
    #[serde(default)]
    pub route_set_exclusivity_groups: ObjectWithOverrides<BTreeMap<String, RouteSetExclusivityGroup>>,
    /// Pool name to player ids.
    #[serde(default)]
    pub ab_player_pools: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub supported_show_style_base_ids: Vec<ShowStyleBaseId>,
}

impl Studio {
    pub fn new(id: StudioId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            settings: StudioSettings::default(),
            mappings: ObjectWithOverrides::default(),
            route_sets: ObjectWithOverrides::default(),
            route_set_exclusivity_groups: ObjectWithOverrides::default(),
            ab_player_pools: BTreeMap::new(),
            supported_show_style_base_ids: Vec::new(),
        }
    }

    pub fn resolved_mappings(&self) -> Result<MappingsExt, CoreError> {
        Ok(apply_and_validate_overrides(&self.mappings)?.obj)
    }

    pub fn resolved_route_sets(&self) -> Result<RouteSets, CoreError> {
        Ok(apply_and_validate_overrides(&self.route_sets)?.obj)
    }
}
