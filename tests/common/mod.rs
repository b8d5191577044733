//! Shared test helpers for integration tests.
#![allow(dead_code)]

use campwatch_rust::config::DetectionConfig;
use campwatch_rust::engine::ActivityEngine;
use campwatch_rust::models::{
    Attacker, CategorizedShip, KillmailData, NearestCelestial, Pinpoints, ShipCategories,
    ShipCategory, Triangulation, Victim, Zkb, ZkData,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const CAPSULE: u32 = 670;
pub const SABRE: u32 = 22456;
/// Tama, a permanent-camp system (Nourvukaiken / Kedama gates).
pub const TAMA: u32 = 30002813;
pub const JITA: u32 = 30000142;

pub fn mins(m: i64) -> i64 {
    m * 60_000
}

/// Initialize tracing for tests
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

pub fn engine() -> ActivityEngine {
    ActivityEngine::new(Arc::new(DetectionConfig::default()), HashMap::new())
}

pub fn engine_with_adjacency(adjacency: HashMap<u32, HashSet<u32>>) -> ActivityEngine {
    ActivityEngine::new(Arc::new(DetectionConfig::default()), adjacency)
}

/// Builds enriched killmails the way the live pipeline would hand them to
/// the engine.
pub struct KillBuilder {
    id: i64,
    time_ms: i64,
    system_id: u32,
    attackers: Vec<Attacker>,
    victim_char: Option<u64>,
    victim_corp: Option<u64>,
    victim_alliance: Option<u64>,
    victim_ship: u32,
    victim_category: Option<ShipCategory>,
    value: f64,
    labels: Vec<String>,
    awox: bool,
    pinpoints: Option<Pinpoints>,
}

impl KillBuilder {
    pub fn new(id: i64, time_ms: i64) -> Self {
        KillBuilder {
            id,
            time_ms,
            system_id: TAMA,
            attackers: Vec::new(),
            victim_char: Some(5000 + id as u64),
            victim_corp: Some(9000),
            victim_alliance: None,
            victim_ship: 587, // Rifter
            victim_category: None,
            value: 10_000_000.0,
            labels: vec![],
            awox: false,
            pinpoints: None,
        }
    }

    pub fn system(mut self, id: u32) -> Self {
        self.system_id = id;
        self
    }

    /// Player attacker; corp id derived from the character id.
    pub fn attacker(self, char_id: u64, ship: u32) -> Self {
        self.attacker_full(Some(char_id), Some(char_id * 10), None, Some(ship), None)
    }

    pub fn attacker_in_alliance(self, char_id: u64, alliance: u64, ship: u32) -> Self {
        self.attacker_full(
            Some(char_id),
            Some(char_id * 10),
            Some(alliance),
            Some(ship),
            None,
        )
    }

    pub fn attacker_with_weapon(self, char_id: u64, ship: u32, weapon: u32) -> Self {
        self.attacker_full(
            Some(char_id),
            Some(char_id * 10),
            None,
            Some(ship),
            Some(weapon),
        )
    }

    pub fn npc_attacker(self, ship: u32) -> Self {
        self.attacker_full(None, Some(1_000_000), None, Some(ship), None)
    }

    pub fn attacker_full(
        mut self,
        char_id: Option<u64>,
        corp: Option<u64>,
        alliance: Option<u64>,
        ship: Option<u32>,
        weapon: Option<u32>,
    ) -> Self {
        self.attackers.push(Attacker {
            alliance_id: alliance,
            corporation_id: corp,
            character_id: char_id,
            faction_id: None,
            final_blow: self.attackers.is_empty(),
            ship_type_id: ship,
            weapon_type_id: weapon,
        });
        self
    }

    pub fn victim(mut self, char_id: Option<u64>, ship: u32) -> Self {
        self.victim_char = char_id;
        self.victim_ship = ship;
        self
    }

    pub fn victim_corp(mut self, corp: Option<u64>, alliance: Option<u64>) -> Self {
        self.victim_corp = corp;
        self.victim_alliance = alliance;
        self
    }

    pub fn victim_category(mut self, category: ShipCategory) -> Self {
        self.victim_category = Some(category);
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }

    pub fn awox(mut self) -> Self {
        self.awox = true;
        self
    }

    /// Pinpoint the kill right on a stargate.
    pub fn at_gate(mut self, gate_name: &str) -> Self {
        self.pinpoints = Some(Pinpoints {
            at_celestial: true,
            nearest_celestial: Some(NearestCelestial {
                name: gate_name.to_string(),
                distance: 2_500.0,
            }),
            triangulation_type: Triangulation::AtCelestial,
            celestial_data: None,
        });
        self
    }

    /// Pinpoint the kill near an arbitrary celestial (not a gate camp).
    pub fn near_celestial(mut self, name: &str, triangulation: Triangulation) -> Self {
        self.pinpoints = Some(Pinpoints {
            at_celestial: matches!(triangulation, Triangulation::AtCelestial),
            nearest_celestial: Some(NearestCelestial {
                name: name.to_string(),
                distance: 150_000.0,
            }),
            triangulation_type: triangulation,
            celestial_data: None,
        });
        self
    }

    pub fn build(self) -> ZkData {
        let ship_categories = self.victim_category.map(|category| ShipCategories {
            victim: Some(CategorizedShip {
                ship_type_id: self.victim_ship,
                category,
            }),
            attackers: vec![],
        });
        ZkData {
            kill_id: self.id,
            killmail: KillmailData {
                attackers: self.attackers,
                killmail_id: self.id,
                killmail_time: chrono::DateTime::from_timestamp_millis(self.time_ms)
                    .expect("valid test timestamp")
                    .to_rfc3339(),
                solar_system_id: self.system_id,
                victim: Victim {
                    alliance_id: self.victim_alliance,
                    corporation_id: self.victim_corp,
                    character_id: self.victim_char,
                    faction_id: None,
                    ship_type_id: self.victim_ship,
                    position: None,
                },
            },
            zkb: Zkb {
                total_value: self.value,
                labels: self.labels,
                npc: false,
                solo: false,
                awox: self.awox,
            },
            ship_categories,
            pinpoints: self.pinpoints,
        }
    }
}
