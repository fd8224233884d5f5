//! Route sets: operator-switchable rewiring of timeline layers.
//!
//! An active route set sends objects on a mapped layer to one or more
//! output layers, and derives the mappings those outputs use. The first
//! route of a layer keeps the object ids; further routes duplicate the
//! object under an `_{index}_` prefix so every id stays unique.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CoreError, UserError, UserErrorMessage};
use crate::ids::RouteSetId;
use crate::models::studio::{
    Mapping, MappingsExt, RouteMapping, RouteSets, RouteType, StudioRouteBehavior,
};
use crate::models::timeline::TimelineObject;
use crate::overrides::{apply_and_validate_overrides, ObjectWithOverrides};

/// The routes of all active route sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultingMappingRoutes {
    /// Mapped layer to its routes, in route set order.
    pub existing: BTreeMap<String, Vec<RouteMapping>>,
    /// Routes that add a layer of their own.
    pub inserted: Vec<RouteMapping>,
}

/// Collect the routes of every active route set.
///
/// Should more than one set of an exclusivity group be active (bad data),
/// only the first one counts.
pub fn get_active_routes(route_sets: &RouteSets) -> ResultingMappingRoutes {
    let mut result = ResultingMappingRoutes::default();
    let mut seen_groups = Vec::new();

    for (id, route_set) in route_sets.iter().filter(|(_, rs)| rs.active) {
        if let Some(group) = &route_set.exclusivity_group {
            if seen_groups.contains(&group) {
                tracing::warn!(route_set_id = %id, group = %group, "Ignoring second active route set in exclusivity group");
                continue;
            }
            seen_groups.push(group);
        }

        for route in &route_set.routes {
            match &route.mapped_layer {
                Some(layer) => result
                    .existing
                    .entry(layer.clone())
                    .or_default()
                    .push(route.clone()),
                None => result.inserted.push(route.clone()),
            }
        }
    }

    result
}

/// Re-layer every object whose layer is routed.
pub fn get_routed_timeline(
    objects: Vec<TimelineObject>,
    routes: &ResultingMappingRoutes,
) -> Vec<TimelineObject> {
    let mut routed = Vec::with_capacity(objects.len());

    for obj in objects {
        let Some(layer_routes) = routes.existing.get(obj.effective_layer()) else {
            routed.push(obj);
            continue;
        };

        for (index, route) in layer_routes.iter().enumerate() {
            let mut copy = obj.clone();
            if index > 0 {
                copy.id = format!("_{index}_{}", obj.id);
                for keyframe in &mut copy.keyframes {
                    keyframe.id = format!("_{index}_{}", keyframe.id);
                }
            }
            if copy.is_lookahead && copy.lookahead_for_layer.is_some() {
                copy.layer = format!("{}_lookahead", route.output_mapped_layer);
                copy.lookahead_for_layer = Some(route.output_mapped_layer.clone());
            } else {
                copy.layer = route.output_mapped_layer.clone();
            }
            routed.push(copy);
        }
    }

    routed
}

/// The mappings after routing.
///
/// A routed input layer disappears and each of its outputs gets a mapping:
/// a `Reroute` overlays the route's remapping on the input mapping, a
/// `Remap` uses the remapping alone and needs a device. Inserted routes
/// are `Remap`s without an input.
pub fn get_routed_mappings(mappings: &MappingsExt, routes: &ResultingMappingRoutes) -> MappingsExt {
    let mut output = MappingsExt::new();

    for (layer, mapping) in mappings {
        match routes.existing.get(layer) {
            None => {
                output.insert(layer.clone(), mapping.clone());
            }
            Some(layer_routes) => {
                for route in layer_routes {
                    let routed = match route.route_type {
                        RouteType::Reroute => Some(reroute(mapping, route)),
                        RouteType::Remap => remap(route),
                    };
                    if let Some(routed) = routed {
                        output.insert(route.output_mapped_layer.clone(), routed);
                    }
                }
            }
        }
    }

    for route in &routes.inserted {
        if let Some(mapping) = remap(route) {
            output.insert(route.output_mapped_layer.clone(), mapping);
        }
    }

    output
}

fn reroute(input: &Mapping, route: &RouteMapping) -> Mapping {
    let mut mapping = input.clone();
    if let Some(remapping) = &route.remapping {
        if let Some(device_id) = &remapping.device_id {
            mapping.device_id = device_id.clone();
        }
        if let Some(lookahead) = remapping.lookahead {
            mapping.lookahead = lookahead;
        }
        if remapping.lookahead_depth.is_some() {
            mapping.lookahead_depth = remapping.lookahead_depth;
        }
        if let Some(options) = &remapping.options {
            merge_json(&mut mapping.options, options);
        }
    }
    mapping
}

fn remap(route: &RouteMapping) -> Option<Mapping> {
    let remapping = route.remapping.as_ref()?;
    let (Some(device_id), Some(device_type)) = (&remapping.device_id, &route.device_type) else {
        tracing::debug!(layer = %route.output_mapped_layer, "Skipping remap route without a device");
        return None;
    };
    Some(Mapping {
        device_id: device_id.clone(),
        device_type: Some(device_type.clone()),
        layer_name: None,
        lookahead: remapping.lookahead.unwrap_or_default(),
        lookahead_depth: remapping.lookahead_depth,
        lookahead_max_search_distance: None,
        options: remapping.options.clone().unwrap_or(Value::Null),
    })
}

fn merge_json(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

// ---------------------------------------------------------------------------
// Switching
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSetState {
    Set(bool),
    Toggle,
}

/// Activate, deactivate or toggle a route set, recording the change as
/// overrides.
///
/// Activating a set deactivates the other members of its exclusivity group,
/// except `ActivateOnly` ones. Returns whether any route set changed, in
/// which case the timeline must be rebuilt.
pub fn switch_route_set(
    route_sets: &mut ObjectWithOverrides<RouteSets>,
    route_set_id: &RouteSetId,
    state: RouteSetState,
) -> Result<bool, CoreError> {
    let resolved = apply_and_validate_overrides(route_sets)?.obj;
    let target = resolved.get(route_set_id.as_str()).ok_or_else(|| {
        UserError::new(UserErrorMessage::RouteSetNotFound).with_arg("id", route_set_id.as_str())
    })?;

    let active = match state {
        RouteSetState::Set(active) => active,
        RouteSetState::Toggle => !target.active,
    };
    if !active && target.behavior == StudioRouteBehavior::ActivateOnly {
        return Err(UserError::new(UserErrorMessage::RouteSetActivateOnly)
            .with_arg("id", route_set_id.as_str())
            .into());
    }

    let mut helper = route_sets.helper();
    let mut changed = false;

    if target.active != active {
        helper.set_item_value(route_set_id.as_str(), "active", json!(active))?;
        changed = true;
    }

    if active {
        if let Some(group) = &target.exclusivity_group {
            for (other_id, other) in &resolved {
                let deactivate = other_id != route_set_id.as_str()
                    && other.active
                    && other.exclusivity_group.as_ref() == Some(group)
                    && other.behavior != StudioRouteBehavior::ActivateOnly;
                if deactivate {
                    helper.set_item_value(other_id, "active", json!(false))?;
                    changed = true;
                }
            }
        }
    }

    tracing::info!(route_set_id = %route_set_id, active, changed, "Switched route set");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::models::studio::{LookaheadMode, RouteRemapping, StudioRouteSet};
    use crate::models::timeline::{TimelineEnable, TimelineKeyframe};

    fn route(from: &str, to: &str) -> RouteMapping {
        RouteMapping {
            mapped_layer: Some(from.into()),
            output_mapped_layer: to.into(),
            route_type: RouteType::Reroute,
            device_type: None,
            remapping: None,
        }
    }

    fn route_set(active: bool, group: Option<&str>, routes: Vec<RouteMapping>) -> StudioRouteSet {
        StudioRouteSet {
            name: "rs".into(),
            active,
            default_active: None,
            exclusivity_group: group.map(Into::into),
            behavior: StudioRouteBehavior::Toggle,
            routes,
            ab_players: Vec::new(),
        }
    }

    fn mapping(device: &str) -> Mapping {
        Mapping {
            device_id: device.into(),
            device_type: Some("casparcg".into()),
            layer_name: None,
            lookahead: LookaheadMode::None,
            lookahead_depth: None,
            lookahead_max_search_distance: None,
            options: json!({ "channel": 1, "layer": 10 }),
        }
    }

    fn obj(id: &str, layer: &str) -> TimelineObject {
        TimelineObject::new(id, layer, TimelineEnable::starting_at(0))
    }

    // -- get_active_routes ----------------------------------------------------

    #[test]
    fn inactive_sets_and_second_group_member_are_ignored() {
        let sets = RouteSets::from([
            ("a".into(), route_set(true, Some("g"), vec![route("vt", "vt_a")])),
            ("b".into(), route_set(true, Some("g"), vec![route("vt", "vt_b")])),
            ("c".into(), route_set(false, None, vec![route("gfx", "gfx_c")])),
        ]);
        let routes = get_active_routes(&sets);
        assert_eq!(routes.existing.len(), 1);
        assert_eq!(routes.existing["vt"][0].output_mapped_layer, "vt_a");
    }

    // -- get_routed_timeline --------------------------------------------------

    #[test]
    fn unmapped_layers_pass_through_unchanged() {
        let sets = RouteSets::from([("a".into(), route_set(true, None, vec![route("vt", "vt2")]))]);
        let routes = get_active_routes(&sets);
        let original = obj("cam_obj", "cam");
        let routed = get_routed_timeline(vec![original.clone()], &routes);
        assert_eq!(routed, vec![original]);
    }

    #[test]
    fn fan_out_ids_are_unique_and_first_is_kept() {
        let sets = RouteSets::from([(
            "a".into(),
            route_set(
                true,
                None,
                vec![route("vt", "vt_1"), route("vt", "vt_2"), route("vt", "vt_3")],
            ),
        )]);
        let routes = get_active_routes(&sets);
        let mut source = obj("clip", "vt");
        source.keyframes.push(TimelineKeyframe {
            id: "kf".into(),
            enable: TimelineEnable::always(),
            content: Value::Null,
            preserve_for_lookahead: false,
        });

        let routed = get_routed_timeline(vec![source], &routes);
        let ids: Vec<_> = routed.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["clip", "_1_clip", "_2_clip"]);
        let layers: Vec<_> = routed.iter().map(|o| o.layer.as_str()).collect();
        assert_eq!(layers, vec!["vt_1", "vt_2", "vt_3"]);
        assert_eq!(routed[2].keyframes[0].id, "_2_kf");
    }

    #[test]
    fn preload_lookahead_follows_its_layer() {
        let sets = RouteSets::from([("a".into(), route_set(true, None, vec![route("vt", "vt2")]))]);
        let routes = get_active_routes(&sets);
        let mut lookahead = obj("lookahead_x", "vt_lookahead");
        lookahead.is_lookahead = true;
        lookahead.lookahead_for_layer = Some("vt".into());

        let routed = get_routed_timeline(vec![lookahead], &routes);
        assert_eq!(routed[0].layer, "vt2_lookahead");
        assert_eq!(routed[0].lookahead_for_layer.as_deref(), Some("vt2"));
    }

    // -- get_routed_mappings --------------------------------------------------

    #[test]
    fn reroute_overlays_remapping() {
        let mut rerouted = route("vt", "vt_backup");
        rerouted.remapping = Some(RouteRemapping {
            device_id: Some("caspar_backup".into()),
            options: Some(json!({ "channel": 2 })),
            ..RouteRemapping::default()
        });
        let sets = RouteSets::from([("a".into(), route_set(true, None, vec![rerouted]))]);
        let mappings = MappingsExt::from([
            ("vt".to_string(), mapping("caspar")),
            ("gfx".to_string(), mapping("caspar")),
        ]);

        let routed = get_routed_mappings(&mappings, &get_active_routes(&sets));
        assert!(!routed.contains_key("vt"));
        assert!(routed.contains_key("gfx"));
        let backup = &routed["vt_backup"];
        assert_eq!(backup.device_id, "caspar_backup");
        assert_eq!(backup.options, json!({ "channel": 2, "layer": 10 }));
    }

    #[test]
    fn remap_needs_a_device() {
        let mut incomplete = route("vt", "vt_remap");
        incomplete.route_type = RouteType::Remap;
        incomplete.remapping = Some(RouteRemapping {
            device_id: Some("atem".into()),
            ..RouteRemapping::default()
        });
        let mut inserted = incomplete.clone();
        inserted.mapped_layer = None;
        inserted.output_mapped_layer = "aux".into();
        inserted.device_type = Some("atem".into());

        let sets = RouteSets::from([("a".into(), route_set(true, None, vec![incomplete, inserted]))]);
        let mappings = MappingsExt::from([("vt".to_string(), mapping("caspar"))]);
        let routed = get_routed_mappings(&mappings, &get_active_routes(&sets));

        assert!(!routed.contains_key("vt_remap"));
        assert_eq!(routed["aux"].device_id, "atem");
    }

    // -- switch_route_set -----------------------------------------------------

    #[test]
    fn activating_deactivates_group_members() {
        let mut sets = ObjectWithOverrides::new(RouteSets::from([
            ("a".into(), route_set(true, Some("g"), Vec::new())),
            ("b".into(), route_set(false, Some("g"), Vec::new())),
        ]));

        let changed = switch_route_set(&mut sets, &"b".into(), RouteSetState::Set(true)).unwrap();
        assert!(changed);

        let resolved = apply_and_validate_overrides(&sets).unwrap().obj;
        assert!(!resolved["a"].active);
        assert!(resolved["b"].active);
    }

    #[test]
    fn activate_only_members_stay_active() {
        let mut keep = route_set(true, Some("g"), Vec::new());
        keep.behavior = StudioRouteBehavior::ActivateOnly;
        let mut sets = ObjectWithOverrides::new(RouteSets::from([
            ("keep".into(), keep),
            ("b".into(), route_set(false, Some("g"), Vec::new())),
        ]));

        switch_route_set(&mut sets, &"b".into(), RouteSetState::Toggle).unwrap();
        let resolved = apply_and_validate_overrides(&sets).unwrap().obj;
        assert!(resolved["keep"].active);

        let err = switch_route_set(&mut sets, &"keep".into(), RouteSetState::Set(false)).unwrap_err();
        assert_matches!(
            err,
            CoreError::User(UserError { message: UserErrorMessage::RouteSetActivateOnly, .. })
        );
    }

    #[test]
    fn unchanged_state_reports_no_change() {
        let mut sets =
            ObjectWithOverrides::new(RouteSets::from([("a".into(), route_set(true, None, Vec::new()))]));
        assert!(!switch_route_set(&mut sets, &"a".into(), RouteSetState::Set(true)).unwrap());
        assert!(sets.overrides.is_empty());
    }

    #[test]
    fn unknown_route_set_is_a_user_error() {
        let mut sets = ObjectWithOverrides::new(RouteSets::new());
        let err = switch_route_set(&mut sets, &"nope".into(), RouteSetState::Toggle).unwrap_err();
        assert!(err.is_user_error());
    }
}
