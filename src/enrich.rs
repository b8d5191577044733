use crate::esi::EsiClient;
use crate::models::{
    CategorizedShip, CelestialData, NearestCelestial, Pinpoints, ShipCategories, ShipCategory,
    SolarSystem, Triangulation, ZkData,
};
use futures::future::join_all;
use moka::future::Cache;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

// Pinpoint confidence thresholds, meters from the nearest celestial.
const AT_CELESTIAL_M: f64 = 10_000.0;
const DIRECT_WARP_M: f64 = 1_000_000.0;
const NEAR_CELESTIAL_M: f64 = 10_000_000.0;

/// Decorates raw killmails with the context the engine consumes: ship
/// categories for victim and attackers, and a spatial pinpoint built from
/// the victim's position. Lookup failures degrade to absent enrichment;
/// the engine treats missing signals as absent.
pub struct Enricher {
    esi: EsiClient,
    group_categories: HashMap<u32, ShipCategory>,
    systems: Cache<u32, Arc<SolarSystem>>,
    categories: Cache<u32, ShipCategory>,
}

impl Enricher {
    pub fn new(esi: EsiClient, group_categories: HashMap<u32, ShipCategory>) -> Self {
        Enricher {
            esi,
            group_categories,
            systems: Cache::new(10_000),
            categories: Cache::new(50_000),
        }
    }

    pub async fn enrich(&self, kill: &mut ZkData) {
        kill.ship_categories = self.build_ship_categories(kill).await;
        kill.pinpoints = Some(self.build_pinpoints(kill).await);
    }

    async fn build_ship_categories(&self, kill: &ZkData) -> Option<ShipCategories> {
        let victim_type = kill.killmail.victim.ship_type_id;
        let victim = CategorizedShip {
            ship_type_id: victim_type,
            category: self.ship_category(victim_type).await,
        };

        let attacker_types: HashSet<u32> = kill
            .killmail
            .attackers
            .iter()
            .filter_map(|a| a.ship_type_id)
            .collect();
        let attackers = join_all(attacker_types.into_iter().map(|st| async move {
            CategorizedShip {
                ship_type_id: st,
                category: self.ship_category(st).await,
            }
        }))
        .await;

        Some(ShipCategories {
            victim: Some(victim),
            attackers,
        })
    }

    async fn ship_category(&self, type_id: u32) -> ShipCategory {
        if let Some(cat) = self.categories.get(&type_id) {
            return cat;
        }
        let cat = match self.esi.get_type_group_id(type_id).await {
            Ok(group) => self
                .group_categories
                .get(&group)
                .copied()
                .unwrap_or(ShipCategory::Unknown),
            Err(e) => {
                // Not cached: the lookup may succeed next time
                debug!("Group lookup for type {} failed: {}", type_id, e);
                return ShipCategory::Unknown;
            }
        };
        self.categories.insert(type_id, cat).await;
        cat
    }

    async fn build_pinpoints(&self, kill: &ZkData) -> Pinpoints {
        let system_id = kill.killmail.solar_system_id;
        let mut pinpoints = Pinpoints {
            at_celestial: false,
            nearest_celestial: None,
            triangulation_type: Triangulation::None,
            celestial_data: self.system_context(system_id).await,
        };

        if let Some(pos) = &kill.killmail.victim.position {
            match self.esi.get_celestial(system_id, pos.x, pos.y, pos.z).await {
                Ok(celestial) => {
                    pinpoints.triangulation_type = triangulation_for(celestial.distance);
                    pinpoints.at_celestial =
                        matches!(pinpoints.triangulation_type, Triangulation::AtCelestial);
                    pinpoints.nearest_celestial = Some(NearestCelestial {
                        name: celestial.item_name,
                        distance: celestial.distance,
                    });
                }
                Err(e) => warn!(
                    "[Kill: {}] Nearest celestial lookup failed: {}",
                    kill.kill_id, e
                ),
            }
        }

        pinpoints
    }

    async fn system_context(&self, system_id: u32) -> Option<CelestialData> {
        let system = match self.systems.get(&system_id) {
            Some(s) => s,
            None => match self.esi.get_system(system_id).await {
                Ok(s) => {
                    let s = Arc::new(s);
                    self.systems.insert(system_id, s.clone()).await;
                    s
                }
                Err(e) => {
                    warn!("System {} lookup failed: {}", system_id, e);
                    return None;
                }
            },
        };
        Some(CelestialData {
            solar_system_name: Some(system.name.clone()),
            region_name: Some(system.region.clone()),
        })
    }
}

fn triangulation_for(distance_m: f64) -> Triangulation {
    if distance_m <= AT_CELESTIAL_M {
        Triangulation::AtCelestial
    } else if distance_m <= DIRECT_WARP_M {
        Triangulation::DirectWarp
    } else if distance_m <= NEAR_CELESTIAL_M {
        Triangulation::NearCelestial
    } else {
        Triangulation::None
    }
}
