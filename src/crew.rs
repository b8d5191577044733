use crate::classification::Classification;
use crate::config::DetectionConfig;
use crate::models::ZkData;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// If fewer than this fraction of a crew is still active AND fewer than
/// `DISSOLUTION_MIN_ACTIVE` members remain active, the crew has disbanded.
const DISSOLUTION_ACTIVE_RATIO: f64 = 0.30;
const DISSOLUTION_MIN_ACTIVE: usize = 2;

/// Number of trailing kills examined by the stationary check.
const STATIONARY_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Idle,
    Departed,
}

#[derive(Debug, Clone)]
pub struct MemberState {
    pub character_id: u64,
    pub corp_id: Option<u64>,
    pub alliance_id: Option<u64>,
    pub ship_type_ids: HashSet<u32>,
    pub first_seen: i64,
    pub last_seen: i64,
    pub kill_count: u32,
    pub status: MemberStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitedSystem {
    pub id: u32,
    pub name: String,
    pub region: Option<String>,
    pub time: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub time: i64,
    pub system_id: u32,
    pub system_name: String,
    pub kill_id: Option<i64>,
}

/// A kill held by a crew, with its parsed timestamp cached so the scoring
/// pipeline never re-parses RFC3339 strings.
#[derive(Debug, Clone)]
pub struct CrewKill {
    pub time_ms: i64,
    pub data: ZkData,
}

/// A group of players operating together. The fundamental tracking unit:
/// identity comes from character overlap and the corp/alliance anchor, not
/// from where the kills happen.
#[derive(Debug, Clone)]
pub struct Crew {
    pub id: String,

    // Core identity
    pub anchor_corp_id: Option<u64>,
    pub anchor_alliance_id: Option<u64>,
    pub anchor_corp_ids: HashSet<u64>,
    pub members: HashMap<u64, MemberState>,

    // Kill history, chronological, unique by kill id
    pub kills: Vec<CrewKill>,
    kill_ids: HashSet<i64>,
    pub total_value: f64,

    // Spatial state
    pub current_system_id: u32,
    pub current_system_name: String,
    pub current_region: Option<String>,
    pub current_location: Option<String>,
    pub systems_visited: Vec<VisitedSystem>,
    pub visited_system_ids: HashSet<u32>,

    // Classification
    pub classification: Classification,
    pub transitions: Vec<Transition>,
    pub probability: u8,
    pub max_probability: u8,

    // Timing
    pub created_at: i64,
    pub last_kill_at: i64,
    pub last_activity_at: i64,

    // Type flags
    pub has_smartbombs: bool,
    /// Set only while the majority of effective kills sit at one stargate.
    pub stargate_name: Option<String>,
    pub gate_kill_count: usize,

    // Session linking
    pub prev_session_id: Option<String>,
}

impl Crew {
    pub fn new(
        id: String,
        system_id: u32,
        system_name: &str,
        region_name: Option<&str>,
        kill_time: i64,
    ) -> Self {
        Crew {
            id,
            anchor_corp_id: None,
            anchor_alliance_id: None,
            anchor_corp_ids: HashSet::new(),
            members: HashMap::new(),
            kills: Vec::new(),
            kill_ids: HashSet::new(),
            total_value: 0.0,
            current_system_id: system_id,
            current_system_name: system_name.to_string(),
            current_region: region_name.map(str::to_string),
            current_location: None,
            systems_visited: vec![VisitedSystem {
                id: system_id,
                name: system_name.to_string(),
                region: region_name.map(str::to_string),
                time: kill_time,
            }],
            visited_system_ids: HashSet::from([system_id]),
            classification: Classification::Activity,
            transitions: Vec::new(),
            probability: 0,
            max_probability: 0,
            created_at: kill_time,
            last_kill_at: kill_time,
            last_activity_at: kill_time,
            has_smartbombs: false,
            stargate_name: None,
            gate_kill_count: 0,
            prev_session_id: None,
        }
    }

    pub fn contains_kill(&self, kill_id: i64) -> bool {
        self.kill_ids.contains(&kill_id)
    }

    /// Append a kill to the crew's history. Returns false if the kill id is
    /// already present. History stays sorted by kill time even when the
    /// feed delivers out of order.
    pub fn add_kill(&mut self, kill: &ZkData, kill_time: i64) -> bool {
        if !self.kill_ids.insert(kill.kill_id) {
            return false;
        }
        let out_of_order = self
            .kills
            .last()
            .is_some_and(|last| last.time_ms > kill_time);
        self.kills.push(CrewKill {
            time_ms: kill_time,
            data: kill.clone(),
        });
        if out_of_order {
            self.kills.sort_by_key(|k| k.time_ms);
        }
        self.total_value += kill.zkb.total_value;
        self.last_kill_at = self.last_kill_at.max(kill_time);
        self.last_activity_at = self.last_activity_at.max(kill_time);
        true
    }

    // --- Member management ---

    /// Fold a kill's attackers into the membership, then retire the victim
    /// if they were one of ours.
    pub fn update_members_from_kill(&mut self, kill: &ZkData, kill_time: i64, capsule_ship_id: u32) {
        for a in &kill.killmail.attackers {
            let Some(char_id) = a.character_id else {
                continue;
            };
            if a.ship_type_id == Some(capsule_ship_id) {
                continue;
            }
            self.add_or_update_member(
                char_id,
                a.corporation_id,
                a.alliance_id,
                a.ship_type_id,
                kill_time,
            );
        }
        if let Some(victim_id) = kill.killmail.victim.character_id {
            if let Some(m) = self.members.get_mut(&victim_id) {
                m.status = MemberStatus::Departed;
            }
        }
    }

    pub fn add_or_update_member(
        &mut self,
        char_id: u64,
        corp_id: Option<u64>,
        alliance_id: Option<u64>,
        ship_type_id: Option<u32>,
        kill_time: i64,
    ) {
        match self.members.get_mut(&char_id) {
            Some(m) => {
                m.last_seen = m.last_seen.max(kill_time);
                m.kill_count += 1;
                m.status = MemberStatus::Active; // reactivate if idle/departed
                if let Some(st) = ship_type_id {
                    m.ship_type_ids.insert(st);
                }
                if corp_id.is_some() {
                    m.corp_id = corp_id;
                }
                if alliance_id.is_some() {
                    m.alliance_id = alliance_id;
                }
            }
            None => {
                self.members.insert(
                    char_id,
                    MemberState {
                        character_id: char_id,
                        corp_id,
                        alliance_id,
                        ship_type_ids: ship_type_id.into_iter().collect(),
                        first_seen: kill_time,
                        last_seen: kill_time,
                        kill_count: 1,
                        status: MemberStatus::Active,
                    },
                );
            }
        }
    }

    /// Transition members to idle/departed based on time since last seen.
    /// Returns whether any status changed.
    pub fn update_member_statuses(&mut self, now: i64, cfg: &DetectionConfig) -> bool {
        let mut changed = false;
        for m in self.members.values_mut() {
            if m.status == MemberStatus::Departed {
                continue;
            }
            let since = now - m.last_seen;
            let next = if since > cfg.member_departed_timeout_ms {
                MemberStatus::Departed
            } else if since > cfg.member_idle_timeout_ms {
                MemberStatus::Idle
            } else {
                m.status
            };
            if next != m.status {
                m.status = next;
                changed = true;
            }
        }
        changed
    }

    /// Recompute the corp/alliance anchor: the most common corp/alliance
    /// among active+idle members. Ties break to the smaller id so the
    /// anchor is stable across recomputation.
    pub fn update_anchor(&mut self) {
        let present: Vec<&MemberState> = self
            .members
            .values()
            .filter(|m| matches!(m.status, MemberStatus::Active | MemberStatus::Idle))
            .collect();
        if present.is_empty() {
            self.anchor_corp_id = None;
            self.anchor_alliance_id = None;
            self.anchor_corp_ids.clear();
            return;
        }

        if let Some(alliance) = mode(present.iter().filter_map(|m| m.alliance_id)) {
            self.anchor_alliance_id = Some(alliance);
        }
        if let Some(corp) = mode(present.iter().filter_map(|m| m.corp_id)) {
            self.anchor_corp_id = Some(corp);
        }
        self.anchor_corp_ids = present.iter().filter_map(|m| m.corp_id).collect();
    }

    pub fn active_count(&self) -> usize {
        self.status_count(MemberStatus::Active)
    }

    pub fn idle_count(&self) -> usize {
        self.status_count(MemberStatus::Idle)
    }

    pub fn departed_count(&self) -> usize {
        self.status_count(MemberStatus::Departed)
    }

    fn status_count(&self, status: MemberStatus) -> usize {
        self.members.values().filter(|m| m.status == status).count()
    }

    /// Active + idle members, the population anchors and matching run over.
    pub fn present_member_ids(&self) -> HashSet<u64> {
        self.members
            .iter()
            .filter(|(_, m)| matches!(m.status, MemberStatus::Active | MemberStatus::Idle))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Has the crew effectively disbanded?
    pub fn is_dissolving(&self) -> bool {
        let total = self.members.len();
        if total < 3 {
            return false;
        }
        let active = self.active_count();
        let ratio = active as f64 / total as f64;
        ratio < DISSOLUTION_ACTIVE_RATIO && active < DISSOLUTION_MIN_ACTIVE
    }

    // --- Spatial state & gate bookkeeping ---

    /// Update current system, movement history, and the gate-kill ratio.
    ///
    /// Gate-kill ratio rules:
    ///   - Ship kills at a gate always count toward `gate_kill_count`.
    ///   - Pod kills at a gate only count when the victim has no earlier
    ///     ship kill in this crew's history (orphan pods).
    ///   - The denominator likewise excludes follow-up pods, so a camp with
    ///     5 ship kills + 4 follow-up pods keeps a ratio of 5/5, not 5/9.
    ///
    /// Call after `add_kill` so the follow-up check sees the full history.
    pub fn update_spatial_state(
        &mut self,
        kill: &ZkData,
        system_name: &str,
        region_name: Option<&str>,
        kill_time: i64,
        capsule_ship_id: u32,
    ) {
        let system_id = kill.killmail.solar_system_id;
        if self.current_system_id != system_id {
            self.systems_visited.push(VisitedSystem {
                id: system_id,
                name: system_name.to_string(),
                region: region_name.map(str::to_string),
                time: kill_time,
            });
            self.current_system_id = system_id;
            self.current_system_name = system_name.to_string();
            self.current_region = region_name.map(str::to_string);
        }
        self.visited_system_ids.insert(system_id);

        if let Some(name) = kill.nearest_celestial_name() {
            self.current_location = Some(name.to_string());
        }

        let is_gate = kill.is_gate_kill();
        let is_pod = kill.is_pod_kill(capsule_ship_id);

        if is_gate {
            if !is_pod {
                self.gate_kill_count += 1;
            } else {
                let earlier = self
                    .kills
                    .iter()
                    .filter(|k| k.data.kill_id != kill.kill_id)
                    .map(|k| &k.data);
                if !is_followup_pod(kill, earlier, capsule_ship_id) {
                    self.gate_kill_count += 1;
                }
            }
            if let Some(name) = kill.nearest_celestial_name() {
                self.stargate_name = Some(name.to_string());
            }
        }

        self.enforce_gate_ratio(capsule_ship_id);
    }

    /// Clear `stargate_name` unless at least half of the effective kills
    /// happened at a gate.
    fn enforce_gate_ratio(&mut self, capsule_ship_id: u32) {
        let effective = self.effective_kill_count(capsule_ship_id);
        if effective > 0 && (self.gate_kill_count as f64) < effective as f64 / 2.0 {
            self.stargate_name = None;
        }
    }

    /// Kills excluding follow-up pods: ship kills plus orphan pod kills.
    pub fn effective_kill_count(&self, capsule_ship_id: u32) -> usize {
        let mut seen_ship_victims: HashSet<u64> = HashSet::new();
        let mut count = 0;
        for k in &self.kills {
            let victim = &k.data.killmail.victim;
            if !k.data.is_pod_kill(capsule_ship_id) {
                if let Some(id) = victim.character_id {
                    seen_ship_victims.insert(id);
                }
                count += 1;
            } else {
                match victim.character_id {
                    Some(id) if seen_ship_victims.contains(&id) => {} // follow-up
                    // Pods without a character are rare; count them.
                    _ => count += 1,
                }
            }
        }
        count
    }

    /// Recount `gate_kill_count` from the full (merged) history and
    /// re-check the ratio rule. Used after merges, where the incremental
    /// bookkeeping of two crews can't simply be summed.
    pub fn rederive_gate_stats(&mut self, capsule_ship_id: u32) {
        let mut seen_ship_victims: HashSet<u64> = HashSet::new();
        let mut count = 0;
        for k in &self.kills {
            let victim = &k.data.killmail.victim;
            let is_pod = k.data.is_pod_kill(capsule_ship_id);
            if k.data.is_gate_kill() {
                if !is_pod {
                    count += 1;
                } else {
                    match victim.character_id {
                        Some(id) if seen_ship_victims.contains(&id) => {}
                        _ => count += 1,
                    }
                }
            }
            if !is_pod {
                if let Some(id) = victim.character_id {
                    seen_ship_victims.insert(id);
                }
            }
        }
        self.gate_kill_count = count;
        self.enforce_gate_ratio(capsule_ship_id);
    }

    /// Are the trailing kills all in one system?
    pub fn recent_stationary(&self) -> bool {
        let recent = if self.kills.len() > STATIONARY_WINDOW {
            &self.kills[self.kills.len() - STATIONARY_WINDOW..]
        } else {
            &self.kills[..]
        };
        let systems: HashSet<u32> = recent
            .iter()
            .map(|k| k.data.killmail.solar_system_id)
            .collect();
        systems.len() <= 1
    }

    /// Every kill in history was scored by exactly one player attacker.
    pub fn solo_history(&self, capsule_ship_id: u32) -> bool {
        !self.kills.is_empty()
            && self
                .kills
                .iter()
                .all(|k| k.data.player_attacker_count(capsule_ship_id) == 1)
    }

    /// Does any active/idle member fly an interdictor-class hull?
    pub fn has_interdictor_member(&self, interdictor_ships: &HashSet<u32>) -> bool {
        self.members
            .values()
            .filter(|m| matches!(m.status, MemberStatus::Active | MemberStatus::Idle))
            .any(|m| m.ship_type_ids.iter().any(|st| interdictor_ships.contains(st)))
    }

    pub fn record_transition(
        &mut self,
        from: &Classification,
        to: &Classification,
        time: i64,
        kill_id: Option<i64>,
    ) {
        self.transitions.push(Transition {
            from: from.to_string(),
            to: to.to_string(),
            time,
            system_id: self.current_system_id,
            system_name: self.current_system_name.clone(),
            kill_id,
        });
    }

    // --- Merging ---

    /// Absorb a donor crew into this one. The donor is consumed; this crew
    /// keeps its id and becomes the union of both histories.
    pub fn absorb(&mut self, donor: Crew, merge_time: i64, cfg: &DetectionConfig) {
        let donor_kill_count = donor.kills.len();
        let donor_id = donor.id.clone();
        let donor_class = donor.classification;

        // Kills: union by id, chronological; total value re-derived from
        // the merged sequence.
        for k in donor.kills {
            if self.kill_ids.insert(k.data.kill_id) {
                self.kills.push(k);
            }
        }
        self.kills.sort_by_key(|k| k.time_ms);
        self.total_value = self.kills.iter().map(|k| k.data.zkb.total_value).sum();

        // Members: union; shared ids keep the fresher sighting.
        for (id, dm) in donor.members {
            match self.members.get_mut(&id) {
                Some(m) => {
                    if dm.last_seen > m.last_seen {
                        m.last_seen = dm.last_seen;
                        m.status = dm.status;
                        if dm.corp_id.is_some() {
                            m.corp_id = dm.corp_id;
                        }
                        if dm.alliance_id.is_some() {
                            m.alliance_id = dm.alliance_id;
                        }
                    }
                    m.first_seen = m.first_seen.min(dm.first_seen);
                    m.kill_count += dm.kill_count;
                    m.ship_type_ids.extend(dm.ship_type_ids);
                }
                None => {
                    self.members.insert(id, dm);
                }
            }
        }

        // Visited systems: union by (id, time), chronological.
        let known: HashSet<(u32, i64)> = self
            .systems_visited
            .iter()
            .map(|s| (s.id, s.time))
            .collect();
        self.systems_visited.extend(
            donor
                .systems_visited
                .into_iter()
                .filter(|s| !known.contains(&(s.id, s.time))),
        );
        self.systems_visited.sort_by_key(|s| s.time);
        self.visited_system_ids.extend(donor.visited_system_ids);

        self.has_smartbombs |= donor.has_smartbombs;
        if self.stargate_name.is_none() {
            self.stargate_name = donor.stargate_name;
        }

        self.created_at = self.created_at.min(donor.created_at);
        self.last_kill_at = self.last_kill_at.max(donor.last_kill_at);
        self.last_activity_at = self.last_activity_at.max(donor.last_activity_at);
        self.max_probability = self.max_probability.max(donor.max_probability);

        // Transitions: union, chronological, with a pseudo-transition
        // marking the merge at the front.
        self.transitions.extend(donor.transitions);
        self.transitions.sort_by_key(|t| t.time);
        self.transitions.insert(
            0,
            Transition {
                from: format!("merge({}:{})", donor_id, donor_class),
                to: self.classification.to_string(),
                time: merge_time,
                system_id: self.current_system_id,
                system_name: self.current_system_name.clone(),
                kill_id: None,
            },
        );

        if self.prev_session_id.is_none() && donor_kill_count >= cfg.crew_min_kills_to_save {
            self.prev_session_id = Some(donor_id);
        }

        self.update_anchor();
        self.rederive_gate_stats(cfg.capsule_ship_id);
    }
}

/// Most common value; ties break to the smallest so the result is stable.
fn mode(values: impl Iterator<Item = u64>) -> Option<u64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for v in values {
        *counts.entry(v).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(v, _)| v)
}

/// A pod kill whose victim already lost a ship in this crew's history is a
/// follow-up: the ship kill represents the engagement, the pod does not
/// count independently.
pub(crate) fn is_followup_pod<'a>(
    kill: &ZkData,
    earlier: impl Iterator<Item = &'a ZkData>,
    capsule_ship_id: u32,
) -> bool {
    if !kill.is_pod_kill(capsule_ship_id) {
        return false;
    }
    let Some(victim_id) = kill.killmail.victim.character_id else {
        return false;
    };
    let mut earlier = earlier;
    earlier.any(|k| {
        k.killmail.victim.character_id == Some(victim_id) && !k.is_pod_kill(capsule_ship_id)
    })
}
