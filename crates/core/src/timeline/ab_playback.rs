//! AB playback: spreading clips over a pool of players.
//!
//! Objects ask for a player through an [`AbSessionRequest`]. Every distinct
//! session gets one player of its pool; a session keeps its player for as
//! long as it exists, and new sessions take the player that has been idle
//! the longest. Objects are then moved to the player's layer.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::playlist::{AbSessionAssignment, AbSessionAssignments};
use crate::models::studio::RouteSets;
use crate::models::timeline::TimelineObject;
use crate::notes::{NoteOrigin, NoteSeverity, TrackedNote, TranslatableMessage};
use crate::types::Time;

/// Whether each player referenced by a route set is enabled. A player is
/// enabled while any route set referencing it is active.
pub fn find_players_in_route_sets(route_sets: &RouteSets) -> BTreeMap<(String, String), bool> {
    let mut players = BTreeMap::new();
    for route_set in route_sets.values() {
        for player in &route_set.ab_players {
            let enabled = players
                .entry((player.pool_name.clone(), player.player_id.clone()))
                .or_insert(false);
            *enabled |= route_set.active;
        }
    }
    players
}

/// The usable players of every pool. Players no route set mentions are
/// always usable.
pub fn available_ab_players(
    pools: &BTreeMap<String, Vec<String>>,
    route_sets: &RouteSets,
) -> BTreeMap<String, Vec<String>> {
    let referenced = find_players_in_route_sets(route_sets);
    pools
        .iter()
        .map(|(pool, players)| {
            let enabled = players
                .iter()
                .filter(|player| {
                    referenced
                        .get(&(pool.clone(), (*player).clone()))
                        .copied()
                        .unwrap_or(true)
                })
                .cloned()
                .collect();
            (pool.clone(), enabled)
        })
        .collect()
}

/// A session requested by the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbSession {
    pub pool_name: String,
    pub session_name: String,
    /// Only lookahead objects use it.
    pub lookahead: bool,
}

/// Distinct sessions requested by `objects`, in first-seen order.
pub fn collect_ab_sessions(objects: &[TimelineObject]) -> Vec<AbSession> {
    let mut sessions: Vec<AbSession> = Vec::new();
    for obj in objects {
        let Some(request) = &obj.ab_session else {
            continue;
        };
        match sessions.iter_mut().find(|s| {
            s.pool_name == request.pool_name && s.session_name == request.session_name
        }) {
            Some(existing) => existing.lookahead &= obj.is_lookahead,
            None => sessions.push(AbSession {
                pool_name: request.pool_name.clone(),
                session_name: request.session_name.clone(),
                lookahead: obj.is_lookahead,
            }),
        }
    }
    sessions
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AbAssignmentResult {
    pub assignments: AbSessionAssignments,
    pub notes: Vec<TrackedNote>,
}

/// Assign a player to every session.
///
/// Sessions used by real objects are served before lookahead-only ones and
/// may take a player from a lookahead session. A real session left without
/// a player is reported as a warning.
pub fn assign_ab_sessions(
    players: &BTreeMap<String, Vec<String>>,
    sessions: &[AbSession],
    previous: &AbSessionAssignments,
    now: Time,
) -> AbAssignmentResult {
    let mut result = AbAssignmentResult::default();

    let mut ordered: Vec<&AbSession> = sessions.iter().collect();
    ordered.sort_by_key(|s| s.lookahead);

    let empty = BTreeMap::new();
    let no_players = Vec::new();

    for pool in ordered.iter().map(|s| s.pool_name.as_str()).collect::<BTreeSet<_>>() {
        let pool_players = players.get(pool).unwrap_or(&no_players);
        let pool_previous = previous.get(pool).unwrap_or(&empty);
        let pool_sessions: Vec<&AbSession> =
            ordered.iter().copied().filter(|s| s.pool_name == pool).collect();

        let mut assigned: BTreeMap<String, AbSessionAssignment> = BTreeMap::new();

        // Sessions that already had a usable player keep it.
        for session in &pool_sessions {
            if let Some(prev) = pool_previous.get(&session.session_name) {
                let taken = assigned.values().any(|a| a.player_id == prev.player_id);
                if pool_players.contains(&prev.player_id) && !taken {
                    assigned.insert(
                        session.session_name.clone(),
                        AbSessionAssignment {
                            lookahead: session.lookahead,
                            ..prev.clone()
                        },
                    );
                }
            }
        }

        for session in &pool_sessions {
            if assigned.contains_key(&session.session_name) {
                continue;
            }

            let free = least_recently_used(pool_players, pool_previous, &assigned);
            let player = match free {
                Some(player) => Some(player),
                None if !session.lookahead => steal_from_lookahead(&mut assigned),
                None => None,
            };

            match player {
                Some(player_id) => {
                    assigned.insert(
                        session.session_name.clone(),
                        AbSessionAssignment {
                            player_id,
                            lookahead: session.lookahead,
                            assigned_at: now,
                        },
                    );
                }
                None if !session.lookahead => {
                    tracing::warn!(pool, session = %session.session_name, "No AB player available");
                    result.notes.push(TrackedNote::new(
                        NoteSeverity::Warning,
                        TranslatableMessage::new("abPlayback.noPlayerAvailable")
                            .with_arg("pool", pool)
                            .with_arg("session", session.session_name.as_str()),
                        NoteOrigin::playlist(),
                    ));
                }
                None => {}
            }
        }

        if !assigned.is_empty() {
            result.assignments.insert(pool.to_string(), assigned);
        }
    }

    result
}

fn least_recently_used(
    players: &[String],
    previous: &BTreeMap<String, AbSessionAssignment>,
    assigned: &BTreeMap<String, AbSessionAssignment>,
) -> Option<String> {
    players
        .iter()
        .filter(|player| !assigned.values().any(|a| &a.player_id == *player))
        .min_by_key(|player| {
            previous
                .values()
                .filter(|a| &a.player_id == *player)
                .map(|a| a.assigned_at)
                .max()
                .unwrap_or(Time::MIN)
        })
        .cloned()
}

fn steal_from_lookahead(assigned: &mut BTreeMap<String, AbSessionAssignment>) -> Option<String> {
    let victim = assigned
        .iter()
        .filter(|(_, a)| a.lookahead)
        .max_by_key(|(_, a)| a.assigned_at)
        .map(|(session, _)| session.clone())?;
    assigned.remove(&victim).map(|a| a.player_id)
}

/// Move every object with an assigned session to its player's layer.
pub fn apply_ab_assignments(objects: &mut [TimelineObject], assignments: &AbSessionAssignments) {
    for obj in objects.iter_mut() {
        let Some(request) = &obj.ab_session else {
            continue;
        };
        let Some(assignment) = assignments
            .get(&request.pool_name)
            .and_then(|pool| pool.get(&request.session_name))
        else {
            continue;
        };
        let player = &assignment.player_id;

        match (&obj.lookahead_for_layer, obj.is_lookahead) {
            (Some(for_layer), true) => {
                let routed = format!("{for_layer}_{player}");
                obj.layer = format!("{routed}_lookahead");
                obj.lookahead_for_layer = Some(routed);
            }
            _ => obj.layer = format!("{}_{player}", obj.layer),
        }
    }
}
