use serde::{Deserialize, Serialize};

/// Represents the top-level JSON object from the zKillboard RedisQ stream.
/// The `package` field can be null if there's no new killmail.
#[derive(Debug, Deserialize)]
pub struct RedisQResponse {
    pub package: Option<ZkData>,
}

/// A killmail as it flows through the service: the raw zKillboard record
/// plus the enrichment the pipeline attaches before the activity engine
/// sees it (`ship_categories`, `pinpoints`). Decoded once at the boundary;
/// everything downstream works on these typed values.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ZkData {
    #[serde(rename = "killID")]
    pub kill_id: i64,
    pub killmail: KillmailData,
    pub zkb: Zkb,
    #[serde(rename = "shipCategories", default, skip_serializing_if = "Option::is_none")]
    pub ship_categories: Option<ShipCategories>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinpoints: Option<Pinpoints>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KillmailData {
    pub attackers: Vec<Attacker>,
    pub killmail_id: i64,
    pub killmail_time: String,
    pub solar_system_id: u32,
    pub victim: Victim,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Zkb {
    #[serde(rename = "totalValue", default)]
    pub total_value: f64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub npc: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub awox: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Attacker {
    pub alliance_id: Option<u64>,
    pub corporation_id: Option<u64>,
    pub character_id: Option<u64>,
    pub faction_id: Option<u64>,
    #[serde(default)]
    pub final_blow: bool,
    pub ship_type_id: Option<u32>,
    pub weapon_type_id: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Victim {
    pub alliance_id: Option<u64>,
    pub corporation_id: Option<u64>,
    pub character_id: Option<u64>,
    pub faction_id: Option<u64>,
    pub ship_type_id: u32,
    pub position: Option<Position>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

// --- Enrichment ---

/// Ship classification attached by the enrichment pipeline for the victim
/// and each unique attacker ship type.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ShipCategories {
    pub victim: Option<CategorizedShip>,
    #[serde(default)]
    pub attackers: Vec<CategorizedShip>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CategorizedShip {
    #[serde(rename = "shipTypeId")]
    pub ship_type_id: u32,
    pub category: ShipCategory,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShipCategory {
    Structure,
    Industrial,
    Mining,
    Capsule,
    Shuttle,
    Corvette,
    Frigate,
    Destroyer,
    Cruiser,
    Battlecruiser,
    Battleship,
    Capital,
    Concord,
    Npc,
    #[serde(other)]
    Unknown,
}

/// Spatial pinpoint for a kill, produced by the nearest-celestial lookup.
/// `triangulation_type` encodes how confidently the kill was placed.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Pinpoints {
    #[serde(rename = "atCelestial", default)]
    pub at_celestial: bool,
    #[serde(rename = "nearestCelestial", default)]
    pub nearest_celestial: Option<NearestCelestial>,
    #[serde(rename = "triangulationType", default)]
    pub triangulation_type: Triangulation,
    #[serde(rename = "celestialData", default)]
    pub celestial_data: Option<CelestialData>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NearestCelestial {
    pub name: String,
    #[serde(default)]
    pub distance: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Triangulation {
    DirectWarp,
    NearCelestial,
    AtCelestial,
    #[default]
    None,
}

/// Solar system context resolved during enrichment (name + region).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CelestialData {
    #[serde(rename = "solarsystemname", default)]
    pub solar_system_name: Option<String>,
    #[serde(rename = "regionname", default)]
    pub region_name: Option<String>,
}

/// Solar system record from the catalog (ESI), cached by the enricher.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SolarSystem {
    pub id: u32,
    #[serde(rename = "systemName")]
    pub name: String,
    #[serde(rename = "securityStatus")]
    pub security_status: f64,
    #[serde(rename = "regionId")]
    pub region_id: u32,
    #[serde(rename = "regionName")]
    pub region: String,
}

impl ZkData {
    /// Kill timestamp as epoch milliseconds. None if the feed handed us a
    /// timestamp chrono can't parse.
    pub fn kill_time_ms(&self) -> Option<i64> {
        chrono::DateTime::parse_from_rfc3339(&self.killmail.killmail_time)
            .ok()
            .map(|dt| dt.timestamp_millis())
    }

    pub fn nearest_celestial_name(&self) -> Option<&str> {
        self.pinpoints
            .as_ref()
            .and_then(|pp| pp.nearest_celestial.as_ref())
            .map(|nc| nc.name.as_str())
    }

    /// A gate kill happened close enough to a stargate to attribute it to
    /// that gate: the nearest celestial is a stargate AND the pinpoint
    /// places the kill at or near it.
    pub fn is_gate_kill(&self) -> bool {
        let Some(pp) = &self.pinpoints else {
            return false;
        };
        let Some(nc) = &pp.nearest_celestial else {
            return false;
        };
        if !nc.name.to_lowercase().contains("stargate") {
            return false;
        }
        pp.at_celestial
            || matches!(
                pp.triangulation_type,
                Triangulation::DirectWarp | Triangulation::NearCelestial
            )
    }

    pub fn is_pod_kill(&self, capsule_ship_id: u32) -> bool {
        self.killmail.victim.ship_type_id == capsule_ship_id
    }

    /// Count player attackers on this kill: a character flying an actual
    /// ship. Pod-flying and NPC attackers don't count.
    pub fn player_attacker_count(&self, capsule_ship_id: u32) -> usize {
        self.killmail
            .attackers
            .iter()
            .filter(|a| a.character_id.is_some() && a.ship_type_id != Some(capsule_ship_id))
            .count()
    }

    pub fn victim_category(&self) -> Option<ShipCategory> {
        self.ship_categories
            .as_ref()
            .and_then(|sc| sc.victim.as_ref())
            .map(|v| v.category)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.zkb.labels.iter().any(|l| l == label)
    }

    /// Attacker character ids (players only, regardless of ship).
    pub fn attacker_character_ids(&self) -> std::collections::HashSet<u64> {
        self.killmail
            .attackers
            .iter()
            .filter_map(|a| a.character_id)
            .collect()
    }
}
