//! Timeline generation: building, AB-pool assignment and routing.

pub mod ab_playback;
pub mod build;
pub mod routing;

pub use ab_playback::{
    apply_ab_assignments, assign_ab_sessions, available_ab_players, collect_ab_sessions,
    find_players_in_route_sets, AbAssignmentResult, AbSession,
};
pub use build::{build_timeline, part_group_id, PartInstanceWithPieces, TimelineBuildInput};
pub use routing::{
    get_active_routes, get_routed_mappings, get_routed_timeline, switch_route_set,
    ResultingMappingRoutes, RouteSetState,
};
