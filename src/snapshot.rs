use crate::crew::{Crew, Transition, VisitedSystem};
use crate::models::{ShipCategories, Triangulation};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Stable projection of a live crew, in the shape subscribers and the
/// archive consume. Built off the hot path; the engine only hands out
/// these, never `Crew` itself.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewSnapshot {
    pub id: String,
    pub classification: String,
    pub system_id: u32,
    pub stargate_name: Option<String>,
    pub kills: Vec<KillSummary>,
    pub total_value: f64,
    pub last_kill: Option<String>,
    pub first_kill_time: i64,
    pub last_activity: i64,
    pub probability: u8,
    pub max_probability: u8,
    pub visited_systems: Vec<u32>,
    pub systems_visited: usize,
    pub members: Vec<u64>,
    pub systems: Vec<VisitedSystem>,
    pub last_system: LastSystem,
    pub anchor_corp_id: Option<u64>,
    pub anchor_alliance_id: Option<u64>,
    pub composition: Composition,
    pub per_member_ships: HashMap<String, Vec<u32>>,
    pub transitions: Vec<Transition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_session_id: Option<String>,
}

/// A kill reduced to what subscribers need: identity, value, victim, and
/// where it happened.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KillSummary {
    pub kill_id: i64,
    pub total_value: f64,
    pub labels: Vec<String>,
    pub killmail_time: String,
    pub solar_system_id: u32,
    pub victim: VictimSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_categories: Option<ShipCategories>,
    pub location: KillLocation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VictimSummary {
    pub ship_type_id: u32,
    pub character_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KillLocation {
    pub at_celestial: bool,
    pub nearest_celestial_name: Option<String>,
    pub triangulation: Triangulation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSystem {
    pub id: u32,
    pub name: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    pub original_count: usize,
    pub active_count: usize,
    pub idle_count: usize,
    pub departed_count: usize,
    pub num_corps: usize,
    pub num_alliances: usize,
}

pub fn serialize_crew(crew: &Crew) -> CrewSnapshot {
    let corps: HashSet<u64> = crew.members.values().filter_map(|m| m.corp_id).collect();
    let alliances: HashSet<u64> = crew
        .members
        .values()
        .filter_map(|m| m.alliance_id)
        .collect();

    let mut members: Vec<u64> = crew.members.keys().copied().collect();
    members.sort_unstable();
    let mut visited: Vec<u32> = crew.visited_system_ids.iter().copied().collect();
    visited.sort_unstable();

    let per_member_ships = crew
        .members
        .values()
        .map(|m| {
            let mut ships: Vec<u32> = m.ship_type_ids.iter().copied().collect();
            ships.sort_unstable();
            (m.character_id.to_string(), ships)
        })
        .collect();

    CrewSnapshot {
        id: crew.id.clone(),
        classification: crew.classification.to_string(),
        system_id: crew.current_system_id,
        stargate_name: crew.stargate_name.clone(),
        kills: crew
            .kills
            .iter()
            .map(|k| {
                let pp = k.data.pinpoints.as_ref();
                KillSummary {
                    kill_id: k.data.kill_id,
                    total_value: k.data.zkb.total_value,
                    labels: k.data.zkb.labels.clone(),
                    killmail_time: k.data.killmail.killmail_time.clone(),
                    solar_system_id: k.data.killmail.solar_system_id,
                    victim: VictimSummary {
                        ship_type_id: k.data.killmail.victim.ship_type_id,
                        character_id: k.data.killmail.victim.character_id,
                    },
                    ship_categories: k.data.ship_categories.clone(),
                    location: KillLocation {
                        at_celestial: pp.map(|p| p.at_celestial).unwrap_or(false),
                        nearest_celestial_name: k
                            .data
                            .nearest_celestial_name()
                            .map(str::to_string),
                        triangulation: pp
                            .map(|p| p.triangulation_type)
                            .unwrap_or(Triangulation::None),
                    },
                }
            })
            .collect(),
        total_value: crew.total_value,
        last_kill: crew
            .kills
            .last()
            .map(|k| k.data.killmail.killmail_time.clone()),
        first_kill_time: crew.created_at,
        last_activity: crew.last_activity_at,
        probability: crew.probability,
        max_probability: crew.max_probability,
        systems_visited: visited.len(),
        visited_systems: visited,
        members,
        systems: crew.systems_visited.clone(),
        last_system: LastSystem {
            id: crew.current_system_id,
            name: crew.current_system_name.clone(),
            region: crew.current_region.clone(),
        },
        anchor_corp_id: crew.anchor_corp_id,
        anchor_alliance_id: crew.anchor_alliance_id,
        composition: Composition {
            original_count: crew.members.len(),
            active_count: crew.active_count(),
            idle_count: crew.idle_count(),
            departed_count: crew.departed_count(),
            num_corps: corps.len(),
            num_alliances: alliances.len(),
        },
        per_member_ships,
        transitions: crew.transitions.clone(),
        prev_session_id: crew.prev_session_id.clone(),
    }
}
