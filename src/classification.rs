use crate::config::DetectionConfig;
use crate::crew::Crew;
use serde::{Deserialize, Serialize};

/// What a crew is doing, derived from behavioral signals. String form only
/// appears at the snapshot boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Camp,
    SoloCamp,
    Smartbomb,
    RoamingCamp,
    Battle,
    SoloRoam,
    Roam,
    Activity,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Camp => "camp",
            Classification::SoloCamp => "solo_camp",
            Classification::Smartbomb => "smartbomb",
            Classification::RoamingCamp => "roaming_camp",
            Classification::Battle => "battle",
            Classification::SoloRoam => "solo_roam",
            Classification::Roam => "roam",
            Classification::Activity => "activity",
        }
    }

    /// Camp-like crews linger; they get the long expiry timeout.
    pub fn uses_camp_timeout(&self) -> bool {
        matches!(
            self,
            Classification::Camp
                | Classification::SoloCamp
                | Classification::Smartbomb
                | Classification::RoamingCamp
                | Classification::Battle
        )
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive what the crew is doing from its current state.
///
/// Key rule: "camp" requires kills at a stargate. Kills at moons, belts,
/// or random celestials are never camps; they fall through to roam or
/// activity. Checked in strict priority order.
pub fn derive(crew: &Crew, cfg: &DetectionConfig) -> Classification {
    let at_gate = crew.stargate_name.is_some();
    let systems_count = crew.visited_system_ids.len();
    let present = crew.active_count() + crew.idle_count();

    // 1. Smartbomb crews sitting on a gate
    if crew.has_smartbombs && at_gate && crew.recent_stationary() {
        return Classification::Smartbomb;
    }

    // 2. Battle: many participants, can happen anywhere
    if present >= cfg.battle_threshold {
        return Classification::Battle;
    }

    // 3 & 4. Every kill made by a single player
    if crew.solo_history(cfg.capsule_ship_id) {
        if at_gate && crew.has_interdictor_member(&cfg.interdictor_ships) {
            return Classification::SoloCamp;
        }
        return Classification::SoloRoam;
    }

    // 5 & 6. Camp classifications require a gate and some probability
    if at_gate && crew.probability >= 5 {
        if systems_count > 1 && crew.recent_stationary() {
            return Classification::RoamingCamp;
        }
        if systems_count == 1 || crew.recent_stationary() {
            return Classification::Camp;
        }
    }

    // 7. Multi-system movement
    if systems_count > 1 {
        return Classification::Roam;
    }

    // 8. Fallback: single system, not at a gate (moon kills, belt rats...)
    Classification::Activity
}
