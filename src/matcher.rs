use crate::config::DetectionConfig;
use crate::crew::Crew;
use crate::models::ZkData;
use std::collections::{HashMap, HashSet};

// Matching weights. Character overlap is the strongest signal; corp and
// alliance anchors, location, and recency refine it.
const CHAR_OVERLAP_WEIGHT: f64 = 0.50;
const REVERSE_OVERLAP_WEIGHT: f64 = 0.10;
const ALLIANCE_ANCHOR_WEIGHT: f64 = 0.25;
const CORP_ANCHOR_WEIGHT: f64 = 0.15;
const CORP_ONLY_ANCHOR_WEIGHT: f64 = 0.20;
const SAME_SYSTEM_WEIGHT: f64 = 0.15;
const ADJACENT_SYSTEM_WEIGHT: f64 = 0.075;
const RECENT_KILL_BONUS: f64 = 0.10;
const AGING_KILL_BONUS: f64 = 0.05;
const STALE_CREW_PENALTY: f64 = 0.15;

const RECENT_KILL_MS: i64 = 10 * 60_000;
const AGING_KILL_MS: i64 = 30 * 60_000;
const STALE_CREW_MS: i64 = 120 * 60_000;

/// The identity signals extracted from one kill's attackers: who shot,
/// which corps/alliances they belong to, where and when.
#[derive(Debug, Clone)]
pub struct KillIdentity {
    pub characters: HashSet<u64>,
    pub corporations: HashSet<u64>,
    pub alliances: HashSet<u64>,
    pub system_id: u32,
    pub kill_time: i64,
}

impl KillIdentity {
    /// Pods and NPCs (no character id) are not identity carriers. An empty
    /// `characters` set means the kill has no player attackers at all.
    pub fn from_kill(kill: &ZkData, kill_time: i64, capsule_ship_id: u32) -> Self {
        let mut characters = HashSet::new();
        let mut corporations = HashSet::new();
        let mut alliances = HashSet::new();
        for a in &kill.killmail.attackers {
            let Some(char_id) = a.character_id else {
                continue;
            };
            if a.ship_type_id == Some(capsule_ship_id) {
                continue;
            }
            characters.insert(char_id);
            if let Some(corp) = a.corporation_id {
                corporations.insert(corp);
            }
            if let Some(alliance) = a.alliance_id {
                alliances.insert(alliance);
            }
        }
        KillIdentity {
            characters,
            corporations,
            alliances,
            system_id: kill.killmail.solar_system_id,
            kill_time,
        }
    }

    pub fn has_players(&self) -> bool {
        !self.characters.is_empty()
    }
}

/// Score one crew against a kill's identity.
pub fn score_crew(
    crew: &Crew,
    ident: &KillIdentity,
    adjacency: &HashMap<u32, HashSet<u32>>,
) -> f64 {
    let mut score = 0.0;

    // 1. Character overlap with active/idle members
    let present = crew.present_member_ids();
    if !present.is_empty() && !ident.characters.is_empty() {
        let overlap = present.intersection(&ident.characters).count();
        if overlap > 0 {
            // Fraction of THIS kill's attackers already in the crew
            score += overlap as f64 / ident.characters.len() as f64 * CHAR_OVERLAP_WEIGHT;
            // Bonus when most of the crew is on the kill
            score += overlap as f64 / present.len() as f64 * REVERSE_OVERLAP_WEIGHT;
        }
    }

    // 2. Corp/alliance anchor
    if let Some(anchor_alliance) = crew.anchor_alliance_id {
        if ident.alliances.contains(&anchor_alliance) {
            score += ALLIANCE_ANCHOR_WEIGHT;
        } else if !crew.anchor_corp_ids.is_disjoint(&ident.corporations) {
            score += CORP_ANCHOR_WEIGHT;
        }
    } else if let Some(anchor_corp) = crew.anchor_corp_id {
        if ident.corporations.contains(&anchor_corp) {
            score += CORP_ONLY_ANCHOR_WEIGHT;
        }
    }

    // 3. Spatial proximity
    if crew.current_system_id == ident.system_id {
        score += SAME_SYSTEM_WEIGHT;
    } else if adjacency
        .get(&crew.current_system_id)
        .is_some_and(|n| n.contains(&ident.system_id))
    {
        score += ADJACENT_SYSTEM_WEIGHT;
    }

    // 4. Temporal recency
    let since = ident.kill_time - crew.last_kill_at;
    if since < RECENT_KILL_MS {
        score += RECENT_KILL_BONUS;
    } else if since < AGING_KILL_MS {
        score += AGING_KILL_BONUS;
    } else if since > STALE_CREW_MS {
        score -= STALE_CREW_PENALTY;
    }

    score
}

/// All crews a kill plausibly belongs to, best first. More than one entry
/// means the crews should merge.
pub fn find_matches(
    crews: &HashMap<String, Crew>,
    ident: &KillIdentity,
    adjacency: &HashMap<u32, HashSet<u32>>,
    threshold: f64,
) -> Vec<(String, f64)> {
    let mut matches: Vec<(String, f64)> = crews
        .iter()
        .map(|(id, crew)| (id.clone(), score_crew(crew, ident, adjacency)))
        .filter(|(_, score)| *score >= threshold)
        .collect();
    matches.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    matches
}
