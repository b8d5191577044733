use crate::models::ShipCategory;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

// --- App Configuration ---

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub redisq_url: String,
    pub archive_path: String,
    pub snapshot_path: String,
    pub tick_interval_secs: u64,
}

pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .set_default("redisq_url", "https://zkillredisq.stream/listen.php")?
        .set_default("archive_path", "data/expired_crews.jsonl")?
        .set_default("snapshot_path", "data/active_crews.json")?
        .set_default("tick_interval_secs", 30_i64)?
        .add_source(Environment::default().separator("__"))
        .build()?;
    settings.try_deserialize()
}

// --- Detection Configuration ---

/// A known long-running camp location: the gates it operates and the
/// probability weight it contributes when a crew sits on one of them.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PermanentCamp {
    pub gates: Vec<String>,
    pub weight: f64,
}

/// All thresholds and static tables the activity engine consumes. Injected
/// once at engine construction; defaults below, each table overridable from
/// a JSON file under the config directory.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub camp_timeout_ms: i64,
    pub roam_timeout_ms: i64,
    pub decay_start_ms: i64,
    pub battle_threshold: usize,
    pub member_idle_timeout_ms: i64,
    pub member_departed_timeout_ms: i64,
    pub crew_min_kills_to_save: usize,
    pub match_threshold: f64,
    pub capsule_ship_id: u32,
    pub mtu_ship_id: u32,
    /// ship_type_id -> probability weight for ships that signal camp intent.
    pub threat_ships: HashMap<u32, f64>,
    /// Hulls commonly fit as dedicated smartbomb platforms.
    pub smartbomb_ships: HashSet<u32>,
    /// weapon_type_id values that are smartbombs. Exact match only.
    pub smartbomb_weapons: HashSet<u32>,
    /// Interdictor and heavy interdiction cruiser hulls.
    pub interdictor_ships: HashSet<u32>,
    pub permanent_camps: HashMap<u32, PermanentCamp>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            camp_timeout_ms: 30 * 60_000,
            roam_timeout_ms: 15 * 60_000,
            decay_start_ms: 5 * 60_000,
            battle_threshold: 40,
            member_idle_timeout_ms: 15 * 60_000,
            member_departed_timeout_ms: 45 * 60_000,
            crew_min_kills_to_save: 2,
            match_threshold: 0.35,
            capsule_ship_id: 670,
            mtu_ship_id: 35834,
            threat_ships: default_threat_ships(),
            smartbomb_ships: HashSet::from([17738, 3756, 29988, 47466]),
            smartbomb_weapons: default_smartbomb_weapons(),
            interdictor_ships: HashSet::from([
                22456, 22464, 22452, 22460, // dictors
                12013, 11995, 12021, 12017, // hictors
            ]),
            permanent_camps: default_permanent_camps(),
        }
    }
}

fn default_threat_ships() -> HashMap<u32, f64> {
    HashMap::from([
        (3756, 0.20),  // Gnosis
        (11202, 0.03), // Ares
        (11196, 0.11), // Stiletto
        (11176, 0.04), // Crow
        (11184, 0.03), // Crusader
        (11186, 0.08), // Malediction
        (11200, 0.03), // Taranis
        (11178, 0.04), // Raptor
        (29988, 0.35), // Proteus
        (20125, 0.20), // Curse
        (17722, 0.25), // Vigilant
        (22456, 0.50), // Sabre
        (22464, 0.44), // Flycatcher
        (22452, 0.44), // Heretic
        (22460, 0.44), // Eris
        (12013, 0.40), // Broadsword
        (11995, 0.40), // Onyx
        (12021, 0.40), // Phobos
        (12017, 0.40), // Devoter
        (29984, 0.15), // Tengu
        (29990, 0.29), // Loki
        (11174, 0.30), // Keres
        (35683, 0.05), // Hecate
        (11969, 0.30), // Arazu
        (11961, 0.30), // Huginn
        (11957, 0.04), // Falcon
        (29986, 0.09), // Legion
        (47466, 0.10), // Praxis
        (12038, 0.05), // Purifier
        (12034, 0.05), // Hound
        (17720, 0.12), // Cynabal
        (11963, 0.16), // Rapier
        (12044, 0.08), // Enyo
        (17922, 0.18), // Ashimmu
        (11999, 0.06), // Vagabond
        (85086, 0.04), // Cenotaph
        (33818, 0.03), // Orthrus
        (11971, 0.22), // Lachesis
        (4310, 0.01),  // Tornado
        (17738, 0.01), // Machariel
        (11387, 0.03), // Hyena
    ])
}

fn default_smartbomb_weapons() -> HashSet<u32> {
    HashSet::from([
        // Large T1 / T2
        3993, 3977, 3987, 3981, 3983, 3989, 3979, 3995, // Medium T2
        3955, 3939, 3949, 3943, // Large EMP faction / officer
        15963, 28545, 14190, 14792, 9678, 23868, 14794, 15947, 14784, 14796, 14188, 14798, 14790,
        14788, 14786, // Large Proton faction / officer
        9772, 21538, 14208, 14548, 14546, 14544, 15939, 14550,
        // Large Plasma faction / officer
        15955, 15156, 14206, 15154, 84496, 9808, 15152, 15158,
        // Large Graviton faction / officer
        14694, 14696, 84495, 9668, 15931, 14204, 14698, 14692, // Medium Plasma
        15953, 14220, 84498, 9800, // Medium Proton
        14222, 15937, 21536, 9762, // Medium Graviton
        15929, 14210, 84497, 9728, // Medium EMP
        14192, 14194, 15961, 23866, 9734, 15945,
    ])
}

fn default_permanent_camps() -> HashMap<u32, PermanentCamp> {
    HashMap::from([
        (
            30002813, // Tama
            PermanentCamp {
                gates: vec!["Nourvukaiken".into(), "Kedama".into()],
                weight: 0.50,
            },
        ),
        (
            30003068, // Rancer
            PermanentCamp {
                gates: vec!["Miroitem".into(), "Crielere".into()],
                weight: 0.50,
            },
        ),
        (
            30000142, // Jita
            PermanentCamp {
                gates: vec!["Perimeter".into()],
                weight: 0.25,
            },
        ),
        (
            30002647, // Ignoitton
            PermanentCamp {
                gates: vec!["Iyen-Oursta".into()],
                weight: 0.30,
            },
        ),
        (
            30005196, // Ahbazon
            PermanentCamp {
                gates: vec!["Shera".into()],
                weight: 0.40,
            },
        ),
    ])
}

/// ESI group id -> ship category, for the enrichment pipeline. Only the
/// groups the engine cares about need to be right; everything else falls
/// through to Unknown.
pub fn default_group_categories() -> HashMap<u32, ShipCategory> {
    let mut map = HashMap::new();
    map.insert(29, ShipCategory::Capsule);
    map.insert(31, ShipCategory::Shuttle);
    map.insert(237, ShipCategory::Corvette);
    for g in [25, 324, 893, 831, 834] {
        map.insert(g, ShipCategory::Frigate);
    }
    for g in [420, 541, 1305] {
        map.insert(g, ShipCategory::Destroyer);
    }
    for g in [26, 358, 894, 832, 906, 963] {
        map.insert(g, ShipCategory::Cruiser);
    }
    for g in [419, 540, 1201] {
        map.insert(g, ShipCategory::Battlecruiser);
    }
    for g in [27, 381, 900] {
        map.insert(g, ShipCategory::Battleship);
    }
    // Haulers, deep space transports, blockade runners, freighters,
    // jump freighters, industrial command ships
    for g in [28, 380, 1202, 513, 902, 941] {
        map.insert(g, ShipCategory::Industrial);
    }
    // Mining barges, exhumers, expedition frigates
    for g in [463, 543, 1283] {
        map.insert(g, ShipCategory::Mining);
    }
    for g in [547, 485, 883, 1538, 30, 659, 4594] {
        map.insert(g, ShipCategory::Capital);
    }
    // Upwell structures, control towers, deployables that show up on kills
    for g in [
        1657, 1404, 1406, 1408, 2017, 2016, 1719, 1441, 1327, 1329, 1330, 1442, 1331, 1547, 1548,
        1546, 1562, 1328, 1332, 4744, 4736, 1652, 1537, 1653, 365,
    ] {
        map.insert(g, ShipCategory::Structure);
    }
    map.insert(1180, ShipCategory::Concord);
    map
}

// --- Loading & Saving ---

fn load_map_from_json_file<K, V>(file_path: &Path) -> Result<HashMap<K, V>, ConfigError>
where
    K: std::cmp::Eq + std::hash::Hash + for<'de> Deserialize<'de>,
    V: for<'de> Deserialize<'de>,
{
    Config::builder()
        .add_source(File::from(file_path))
        .build()?
        .try_deserialize()
}

// Parses a file containing a JSON array using serde_json
fn load_vec_from_json_file<T: for<'de> Deserialize<'de>>(
    file_path: &Path,
) -> Result<Vec<T>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(file_path)?;
    let data = serde_json::from_str(&content)?;
    Ok(data)
}

/// Load the detection config, overlaying any table files present under
/// `dir` (threat_ships.json, smartbomb_weapons.json, permanent_camps.json,
/// interdictor_ships.json) on top of the built-in defaults.
pub fn load_detection_config(dir: &str) -> DetectionConfig {
    let mut cfg = DetectionConfig::default();
    let dir = Path::new(dir);

    let threat_path = dir.join("threat_ships.json");
    if threat_path.is_file() {
        match load_map_from_json_file::<u32, f64>(&threat_path) {
            Ok(table) => {
                info!("Loaded {} threat ship weights from file", table.len());
                cfg.threat_ships = table;
            }
            Err(e) => warn!("Could not parse threat_ships.json: {}. Using defaults.", e),
        }
    }

    let camps_path = dir.join("permanent_camps.json");
    if camps_path.is_file() {
        match load_map_from_json_file::<u32, PermanentCamp>(&camps_path) {
            Ok(table) => {
                info!("Loaded {} permanent camps from file", table.len());
                cfg.permanent_camps = table;
            }
            Err(e) => warn!(
                "Could not parse permanent_camps.json: {}. Using defaults.",
                e
            ),
        }
    }

    let weapons_path = dir.join("smartbomb_weapons.json");
    if weapons_path.is_file() {
        match load_vec_from_json_file::<u32>(&weapons_path) {
            Ok(ids) => {
                info!("Loaded {} smartbomb weapon ids from file", ids.len());
                cfg.smartbomb_weapons = ids.into_iter().collect();
            }
            Err(e) => warn!(
                "Could not parse smartbomb_weapons.json: {}. Using defaults.",
                e
            ),
        }
    }

    let dictors_path = dir.join("interdictor_ships.json");
    if dictors_path.is_file() {
        match load_vec_from_json_file::<u32>(&dictors_path) {
            Ok(ids) => {
                info!("Loaded {} interdictor ship ids from file", ids.len());
                cfg.interdictor_ships = ids.into_iter().collect();
            }
            Err(e) => warn!(
                "Could not parse interdictor_ships.json: {}. Using defaults.",
                e
            ),
        }
    }

    cfg
}

/// Stargate adjacency: system id -> directly connected system ids.
/// Built offline from the static data export and shipped as JSON.
pub fn load_adjacency(path: &str) -> Result<HashMap<u32, HashSet<u32>>, ConfigError> {
    let raw: HashMap<u32, Vec<u32>> = load_map_from_json_file(Path::new(path))?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect())
}

pub fn save_to_json_file<T: Serialize>(file_path: &str, data: &T) {
    if let Some(parent) = Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = fs::create_dir_all(parent);
        }
    }
    match serde_json::to_string_pretty(data) {
        Ok(json_string) => {
            if let Err(e) = fs::write(file_path, json_string) {
                error!("Failed to write to {}: {}", file_path, e);
            }
        }
        Err(e) => error!("Failed to serialize data for {}: {}", file_path, e),
    }
}
