use crate::classification;
use crate::config::DetectionConfig;
use crate::crew::Crew;
use crate::matcher::{self, KillIdentity};
use crate::models::ZkData;
use crate::probability;
use crate::snapshot::{serialize_crew, CrewSnapshot};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A killmail the engine refuses to process. These are feed defects, not
/// engine errors: the event is counted, logged, and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidEvent {
    MissingKillId,
    UnparseableTimestamp,
    MissingSystem,
    NoAttackers,
}

impl std::fmt::Display for InvalidEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidEvent::MissingKillId => write!(f, "missing kill id"),
            InvalidEvent::UnparseableTimestamp => write!(f, "unparseable killmail_time"),
            InvalidEvent::MissingSystem => write!(f, "missing solar system id"),
            InvalidEvent::NoAttackers => write!(f, "no attackers"),
        }
    }
}

impl std::error::Error for InvalidEvent {}

/// The activity detection engine: an indexed collection of live crews fed
/// one enriched killmail at a time.
///
/// Single-writer by construction: every mutation happens inside `ingest`
/// or `tick`, both `&mut self`. Reads (`snapshot`, `drain_archive`) hand
/// out owned projections. No operation blocks on I/O; the caller wraps the
/// engine in whatever lock its runtime needs.
pub struct ActivityEngine {
    config: Arc<DetectionConfig>,
    adjacency: HashMap<u32, HashSet<u32>>,
    crews: HashMap<String, Crew>,
    expired_queue: Vec<CrewSnapshot>,
    invalid_events: u64,
}

impl ActivityEngine {
    pub fn new(config: Arc<DetectionConfig>, adjacency: HashMap<u32, HashSet<u32>>) -> Self {
        ActivityEngine {
            config,
            adjacency,
            crews: HashMap::new(),
            expired_queue: Vec::new(),
            invalid_events: 0,
        }
    }

    /// Process one enriched killmail.
    ///
    /// 1. Validate and dedup (idempotent on kill id)
    /// 2. Extract attacker identity; drop NPC-only kills
    /// 3. Find matching crews; merge on multi-match, create on none
    /// 4. Update the selected crew: kills, members, anchors, spatial
    ///    state, probability, classification
    pub fn ingest(&mut self, kill: &ZkData, now: i64) {
        let kill_time = match validate(kill) {
            Ok(t) => t,
            Err(e) => {
                self.invalid_events += 1;
                warn!("[Kill: {}] Dropping invalid killmail: {}", kill.kill_id, e);
                return;
            }
        };

        if self.crews.values().any(|c| c.contains_kill(kill.kill_id)) {
            debug!("[Kill: {}] Already tracked, ignoring", kill.kill_id);
            return;
        }

        let ident = KillIdentity::from_kill(kill, kill_time, self.config.capsule_ship_id);
        if !ident.has_players() {
            debug!("[Kill: {}] No player attackers, ignoring", kill.kill_id);
            return;
        }

        let (system_name, region_name) = system_context(kill);

        let matches = matcher::find_matches(
            &self.crews,
            &ident,
            &self.adjacency,
            self.config.match_threshold,
        );

        let crew_id = if matches.is_empty() {
            let crew = Crew::new(
                generate_crew_id(now),
                kill.killmail.solar_system_id,
                &system_name,
                region_name.as_deref(),
                kill_time,
            );
            info!(
                "New crew {}: {} attackers in {}",
                crew.id,
                ident.characters.len(),
                system_name
            );
            let id = crew.id.clone();
            self.crews.insert(id.clone(), crew);
            id
        } else if matches.len() == 1 {
            debug!(
                "[Kill: {}] Matched crew {} (score={:.2})",
                kill.kill_id, matches[0].0, matches[0].1
            );
            matches[0].0.clone()
        } else {
            self.merge_matches(&matches, now)
        };

        let config = Arc::clone(&self.config);
        let Some(crew) = self.crews.get_mut(&crew_id) else {
            debug_assert!(false, "selected crew {} disappeared during ingest", crew_id);
            return;
        };

        crew.add_kill(kill, kill_time);
        crew.update_members_from_kill(kill, kill_time, config.capsule_ship_id);
        crew.update_anchor();
        crew.update_spatial_state(
            kill,
            &system_name,
            region_name.as_deref(),
            kill_time,
            config.capsule_ship_id,
        );
        if kill_has_smartbombs(kill, &config.smartbomb_weapons) {
            crew.has_smartbombs = true;
        }

        let pct = probability::camp_probability(crew, &config, now);
        crew.probability = pct;
        crew.max_probability = crew.max_probability.max(pct);

        let prev = crew.classification;
        let next = classification::derive(crew, &config);
        if next != prev {
            crew.classification = next;
            crew.record_transition(&prev, &next, kill_time, Some(kill.kill_id));
            info!(
                "Crew {}: {} -> {} in {}",
                crew.id, prev, next, crew.current_system_name
            );
        }
    }

    /// When a kill matches several crews they are one group seen from
    /// different angles: the largest absorbs the rest and keeps its id.
    fn merge_matches(&mut self, matches: &[(String, f64)], now: i64) -> String {
        let mut ordered: Vec<(String, usize, i64)> = matches
            .iter()
            .filter_map(|(id, _)| {
                self.crews
                    .get(id)
                    .map(|c| (id.clone(), c.kills.len(), c.created_at))
            })
            .collect();
        ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));

        let primary_id = ordered[0].0.clone();
        for (donor_id, _, _) in &ordered[1..] {
            let Some(donor) = self.crews.remove(donor_id) else {
                continue;
            };
            info!(
                "Merging crew {} ({} kills) into {}",
                donor_id,
                donor.kills.len(),
                primary_id
            );
            if let Some(primary) = self.crews.get_mut(&primary_id) {
                primary.absorb(donor, now, &self.config);
            }
        }
        primary_id
    }

    /// Periodic sweep: age member statuses, detect dissolution, refresh
    /// probability and classification, evict expired crews. Returns whether
    /// anything observable changed.
    pub fn tick(&mut self, now: i64) -> bool {
        let mut changed = false;
        let mut kept: HashMap<String, Crew> = HashMap::with_capacity(self.crews.len());
        let config = Arc::clone(&self.config);

        for (id, mut crew) in self.crews.drain() {
            if crew.update_member_statuses(now, &config) {
                crew.update_anchor();
                changed = true;
            }

            if crew.is_dissolving() {
                changed = true;
                info!(
                    "Crew {} dissolved: {}/{} active",
                    id,
                    crew.active_count(),
                    crew.members.len()
                );
                if crew.kills.len() >= config.crew_min_kills_to_save {
                    self.expired_queue.push(serialize_crew(&crew));
                }
                continue;
            }

            let prev_prob = crew.probability;
            let prev_class = crew.classification;
            let pct = probability::camp_probability(&crew, &config, now);
            crew.probability = pct;
            crew.max_probability = crew.max_probability.max(pct);
            let next = classification::derive(&crew, &config);
            if next != prev_class {
                crew.classification = next;
                crew.record_transition(&prev_class, &next, now, None);
            }
            if crew.probability != prev_prob || crew.classification != prev_class {
                changed = true;
            }

            let timeout = timeout_for(&crew, &config);
            if now - crew.last_activity_at > timeout {
                changed = true;
                debug!("Crew {} expired ({})", id, crew.classification);
                if crew.kills.len() >= config.crew_min_kills_to_save {
                    self.expired_queue.push(serialize_crew(&crew));
                }
                continue;
            }

            kept.insert(id, crew);
        }

        self.crews = kept;
        changed
    }

    /// Serialized view of the currently-live crews, highest probability
    /// first. Pure read.
    pub fn snapshot(&self, now: i64) -> Vec<CrewSnapshot> {
        let mut live: Vec<&Crew> = self
            .crews
            .values()
            .filter(|c| now - c.last_activity_at <= timeout_for(c, &self.config))
            .collect();
        live.sort_by(|a, b| {
            b.probability
                .cmp(&a.probability)
                .then(b.last_activity_at.cmp(&a.last_activity_at))
        });
        live.into_iter().map(serialize_crew).collect()
    }

    /// Hand over the crews that expired since the last drain.
    pub fn drain_archive(&mut self) -> Vec<CrewSnapshot> {
        std::mem::take(&mut self.expired_queue)
    }

    pub fn crew_count(&self) -> usize {
        self.crews.len()
    }

    pub fn crews(&self) -> impl Iterator<Item = &Crew> {
        self.crews.values()
    }

    pub fn get_crew(&self, id: &str) -> Option<&Crew> {
        self.crews.get(id)
    }

    pub fn invalid_event_count(&self) -> u64 {
        self.invalid_events
    }
}

fn timeout_for(crew: &Crew, cfg: &DetectionConfig) -> i64 {
    if crew.classification.uses_camp_timeout() {
        cfg.camp_timeout_ms
    } else {
        cfg.roam_timeout_ms
    }
}

fn validate(kill: &ZkData) -> Result<i64, InvalidEvent> {
    if kill.kill_id <= 0 {
        return Err(InvalidEvent::MissingKillId);
    }
    if kill.killmail.solar_system_id == 0 {
        return Err(InvalidEvent::MissingSystem);
    }
    if kill.killmail.attackers.is_empty() {
        return Err(InvalidEvent::NoAttackers);
    }
    kill.kill_time_ms().ok_or(InvalidEvent::UnparseableTimestamp)
}

fn kill_has_smartbombs(kill: &ZkData, smartbomb_weapons: &HashSet<u32>) -> bool {
    kill.killmail
        .attackers
        .iter()
        .any(|a| a.weapon_type_id.is_some_and(|w| smartbomb_weapons.contains(&w)))
}

fn generate_crew_id(now: i64) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("crew-{}-{}", now, suffix)
}

/// System name and region for a kill, from the enrichment if present.
/// Falls back to the numeric id so a crew always has a printable system.
fn system_context(kill: &ZkData) -> (String, Option<String>) {
    let celestial = kill
        .pinpoints
        .as_ref()
        .and_then(|pp| pp.celestial_data.as_ref());
    let name = celestial
        .and_then(|cd| cd.solar_system_name.clone())
        .unwrap_or_else(|| kill.killmail.solar_system_id.to_string());
    let region = celestial.and_then(|cd| cd.region_name.clone());
    (name, region)
}
