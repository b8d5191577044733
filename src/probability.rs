use crate::config::DetectionConfig;
use crate::crew::{is_followup_pod, Crew, CrewKill};
use crate::models::ShipCategory;
use std::collections::HashSet;

const THREAT_SCORE_CAP: f64 = 0.50;
const CONSISTENCY_BONUS: f64 = 0.15;
const MAX_CONSISTENCY_BONUS: f64 = 0.30;
const WIDELY_SPACED_BONUS: f64 = 0.15;
const MAX_WIDELY_SPACED_BONUS: f64 = 0.45;
const POD_BONUS_PER_KILL: f64 = 0.03;
const MAX_POD_BONUS: f64 = 0.15;
const BURST_PENALTY: f64 = 0.20;
const OVERALL_PROB_CAP: f64 = 0.95;
const MIN_PROB_THRESHOLD: u8 = 5;
const DECAY_RATE_PER_MIN: f64 = 0.10;
const SMARTBOMB_BASE_BONUS: f64 = 0.16;

/// Two kills closer than this are a burst.
const BURST_GAP_MS: i64 = 120_000;
/// Two kills further apart than this are "widely spaced".
const WIDE_GAP_MS: i64 = 300_000;
/// Burst penalty only applies to young camps.
const BURST_CAMP_AGE_MIN: f64 = 15.0;

/// Camp probability for a crew, 0-100.
///
/// Only gate camps score: without a stargate the probability is 0, and
/// only kills at the gate feed the pipeline. Each stage below is additive
/// on a base in [0, 1]; the result decays with time since the last kill.
pub fn camp_probability(crew: &Crew, cfg: &DetectionConfig, now: i64) -> u8 {
    let Some(stargate_name) = crew.stargate_name.as_deref() else {
        return 0;
    };

    let scorable = filter_scorable(&crew.kills, cfg);
    if scorable.is_empty() {
        return 0;
    }
    let gate_kills: Vec<&CrewKill> = scorable
        .iter()
        .copied()
        .filter(|k| k.data.is_gate_kill())
        .collect();
    if gate_kills.is_empty() {
        return 0;
    }

    let ship_kills: Vec<&CrewKill> = gate_kills
        .iter()
        .copied()
        .filter(|k| !k.data.is_pod_kill(cfg.capsule_ship_id))
        .collect();
    let pod_kills: Vec<&CrewKill> = gate_kills
        .iter()
        .copied()
        .filter(|k| k.data.is_pod_kill(cfg.capsule_ship_id))
        .collect();

    let mut base = 0.0;
    base += burst_penalty(&ship_kills, crew.created_at, now);
    base += threat_ship_score(&gate_kills, cfg);
    base += smartbomb_bonus(crew, ship_kills.len(), cfg);
    base += known_location_bonus(crew.current_system_id, stargate_name, cfg);
    base += vulnerable_victim_bonus(&ship_kills);
    base += consistency_bonus(&ship_kills);
    base += widely_spaced_bonus(&ship_kills);
    base += pod_bonus(&pod_kills, &ship_kills, cfg.capsule_ship_id);

    base = base.clamp(0.0, OVERALL_PROB_CAP);

    let minutes_since = (now - crew.last_kill_at) as f64 / 60_000.0;
    base *= decay_multiplier(minutes_since, cfg.decay_start_ms as f64 / 60_000.0);

    base = base.clamp(0.0, OVERALL_PROB_CAP);
    let pct = (base * 100.0).round() as u8;
    if pct < MIN_PROB_THRESHOLD {
        0
    } else {
        pct
    }
}

/// Drop kills that say nothing about camp intent: AWOX, NPC victims,
/// structures, mobile tractor units, and kills with no player or faction
/// attacker at all.
pub(crate) fn filter_scorable<'a>(kills: &'a [CrewKill], cfg: &DetectionConfig) -> Vec<&'a CrewKill> {
    kills
        .iter()
        .filter(|k| {
            let km = &k.data.killmail;
            let victim = &km.victim;
            if k.data.zkb.awox || k.data.has_label("awox") {
                return false;
            }
            if (victim.corporation_id.is_some() && victim.character_id.is_none())
                || k.data.has_label("npc")
            {
                return false;
            }
            if k.data.victim_category() == Some(ShipCategory::Structure) {
                return false;
            }
            if victim.ship_type_id == cfg.mtu_ship_id {
                return false;
            }
            let has_player = km
                .attackers
                .iter()
                .any(|a| a.character_id.is_some() || a.faction_id.is_some());
            if !has_player && !km.attackers.is_empty() {
                return false;
            }
            true
        })
        .collect()
}

/// Early rapid kills look like a passing fight, not a camp settling in.
pub(crate) fn burst_penalty(ship_kills: &[&CrewKill], created_at: i64, now: i64) -> f64 {
    if ship_kills.len() < 2 {
        return 0.0;
    }
    let camp_age_min = (now - created_at) as f64 / 60_000.0;
    let has_burst = ship_kills
        .windows(2)
        .any(|w| w[1].time_ms - w[0].time_ms < BURST_GAP_MS);
    if camp_age_min <= BURST_CAMP_AGE_MIN && has_burst {
        -BURST_PENALTY
    } else {
        0.0
    }
}

/// Sum of threat weights over every attacker of every gate kill, ship and
/// pod kills alike: the attacker's hull is what signals the camp.
pub(crate) fn threat_ship_score(gate_kills: &[&CrewKill], cfg: &DetectionConfig) -> f64 {
    let mut score = 0.0;
    for k in gate_kills {
        for a in &k.data.killmail.attackers {
            if let Some(weight) = a.ship_type_id.and_then(|st| cfg.threat_ships.get(&st)) {
                score += weight;
            }
        }
    }
    score.min(THREAT_SCORE_CAP)
}

pub(crate) fn smartbomb_bonus(crew: &Crew, ship_kill_count: usize, cfg: &DetectionConfig) -> f64 {
    if !crew.has_smartbombs {
        return 0.0;
    }
    let mut bonus = SMARTBOMB_BASE_BONUS;
    let has_platform = crew.kills.iter().any(|k| {
        k.data.killmail.attackers.iter().any(|a| {
            a.ship_type_id
                .is_some_and(|st| cfg.smartbomb_ships.contains(&st))
        })
    });
    if has_platform {
        bonus += if ship_kill_count >= 2 { 0.30 } else { 0.15 };
    }
    bonus
}

/// Crews sitting on one of the well-known perma-camp gates score extra.
pub(crate) fn known_location_bonus(
    system_id: u32,
    stargate_name: &str,
    cfg: &DetectionConfig,
) -> f64 {
    let Some(camp) = cfg.permanent_camps.get(&system_id) else {
        return 0.0;
    };
    let gate_lower = stargate_name.to_lowercase();
    if camp
        .gates
        .iter()
        .any(|g| gate_lower.contains(&g.to_lowercase()))
    {
        camp.weight
    } else {
        0.0
    }
}

/// Industrials and miners dying at a gate are camp prey.
pub(crate) fn vulnerable_victim_bonus(ship_kills: &[&CrewKill]) -> f64 {
    let vuln = ship_kills
        .iter()
        .filter(|k| {
            matches!(
                k.data.victim_category(),
                Some(ShipCategory::Industrial) | Some(ShipCategory::Mining)
            )
        })
        .count();
    match vuln {
        0 => 0.0,
        1 => 0.20,
        _ => 0.40,
    }
}

/// Same attackers showing up kill after kill. Walk backwards from the
/// latest ship kill over the last three; each prior kill with sufficient
/// overlap adds a bonus. A burst against one victim corp/alliance is a
/// single engagement, not consistency, and is skipped.
pub(crate) fn consistency_bonus(ship_kills: &[&CrewKill]) -> f64 {
    if ship_kills.len() < 2 {
        return 0.0;
    }
    let check = &ship_kills[ship_kills.len().saturating_sub(3)..];

    let is_burst = check
        .windows(2)
        .any(|w| w[1].time_ms - w[0].time_ms < BURST_GAP_MS);
    if is_burst {
        let corps: Vec<u64> = check
            .iter()
            .filter_map(|k| k.data.killmail.victim.corporation_id)
            .collect();
        let allis: Vec<u64> = check
            .iter()
            .filter_map(|k| k.data.killmail.victim.alliance_id)
            .collect();
        let single_corp =
            corps.len() == check.len() && corps.iter().collect::<HashSet<_>>().len() == 1;
        let single_alliance =
            allis.len() == check.len() && allis.iter().collect::<HashSet<_>>().len() == 1;
        if single_corp || single_alliance {
            return 0.0;
        }
    }

    let latest = check
        .last()
        .map(|k| k.data.attacker_character_ids())
        .unwrap_or_default();
    let mut bonus = 0.0;
    for k in check[..check.len() - 1].iter().rev() {
        let prev = k.data.attacker_character_ids();
        let overlap = latest.intersection(&prev).count();
        if overlap >= 2.max(prev.len() / 3) {
            bonus += CONSISTENCY_BONUS;
        }
    }
    bonus.min(MAX_CONSISTENCY_BONUS)
}

/// Kills spread out over time mean the crew stayed put between them.
pub(crate) fn widely_spaced_bonus(ship_kills: &[&CrewKill]) -> f64 {
    let spaced: f64 = ship_kills
        .windows(2)
        .filter(|w| w[1].time_ms - w[0].time_ms > WIDE_GAP_MS)
        .map(|_| WIDELY_SPACED_BONUS)
        .sum();
    spaced.min(MAX_WIDELY_SPACED_BONUS)
}

/// Pods get a small bonus. Orphan pods (no matching ship kill) count in
/// full; follow-up pods at half credit since their ship kill already
/// contributed.
pub(crate) fn pod_bonus(
    pod_kills: &[&CrewKill],
    ship_kills: &[&CrewKill],
    capsule_ship_id: u32,
) -> f64 {
    if pod_kills.is_empty() {
        return 0.0;
    }
    let orphans = pod_kills
        .iter()
        .filter(|p| {
            !is_followup_pod(
                &p.data,
                ship_kills.iter().map(|k| &k.data),
                capsule_ship_id,
            )
        })
        .count();
    let followups = pod_kills.len() - orphans;
    let effective = orphans as f64 + followups as f64 * 0.5;
    (effective * POD_BONUS_PER_KILL).min(MAX_POD_BONUS)
}

/// Multiplier in [0, 1] that erodes the score once the camp goes quiet.
pub(crate) fn decay_multiplier(minutes_since: f64, decay_start_min: f64) -> f64 {
    if minutes_since <= decay_start_min {
        return 1.0;
    }
    let decay = ((minutes_since - decay_start_min) * DECAY_RATE_PER_MIN).min(1.0);
    (1.0 - decay).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Attacker, CategorizedShip, KillmailData, NearestCelestial, Pinpoints, ShipCategories,
        Triangulation, Victim, Zkb, ZkData,
    };

    const CAPSULE: u32 = 670;

    fn attacker(char_id: u64, ship: u32) -> Attacker {
        Attacker {
            alliance_id: None,
            corporation_id: Some(char_id * 10),
            character_id: Some(char_id),
            faction_id: None,
            final_blow: false,
            ship_type_id: Some(ship),
            weapon_type_id: None,
        }
    }

    fn gate_kill(id: i64, time: i64, chars: &[u64], ship: u32, victim_ship: u32) -> CrewKill {
        CrewKill {
            time_ms: time,
            data: ZkData {
                kill_id: id,
                killmail: KillmailData {
                    attackers: chars.iter().map(|c| attacker(*c, ship)).collect(),
                    killmail_id: id,
                    killmail_time: chrono::DateTime::from_timestamp_millis(time)
                        .unwrap()
                        .to_rfc3339(),
                    solar_system_id: 30002813,
                    victim: Victim {
                        alliance_id: None,
                        corporation_id: Some(900 + id as u64),
                        character_id: Some(5000 + id as u64),
                        faction_id: None,
                        ship_type_id: victim_ship,
                        position: None,
                    },
                },
                zkb: Zkb {
                    total_value: 1_000_000.0,
                    labels: vec![],
                    npc: false,
                    solo: false,
                    awox: false,
                },
                ship_categories: None,
                pinpoints: Some(Pinpoints {
                    at_celestial: true,
                    nearest_celestial: Some(NearestCelestial {
                        name: "Stargate (Nourvukaiken)".into(),
                        distance: 900.0,
                    }),
                    triangulation_type: Triangulation::AtCelestial,
                    celestial_data: None,
                }),
            },
        }
    }

    #[test]
    fn burst_penalty_only_hits_young_camps() {
        let kills = vec![
            gate_kill(1, 0, &[1, 2], 602, 587),
            gate_kill(2, 60_000, &[1, 2], 602, 587),
        ];
        let refs: Vec<&CrewKill> = kills.iter().collect();
        assert_eq!(burst_penalty(&refs, 0, 10 * 60_000), -BURST_PENALTY);
        // Same kills, but the camp is old: no penalty
        assert_eq!(burst_penalty(&refs, 0, 60 * 60_000), 0.0);
    }

    #[test]
    fn threat_score_caps_at_half() {
        let cfg = DetectionConfig::default();
        let kills = vec![
            gate_kill(1, 0, &[1], 22456, 587),
            gate_kill(2, 180_000, &[1], 22456, 587),
            gate_kill(3, 360_000, &[1], 22456, 587),
        ];
        let refs: Vec<&CrewKill> = kills.iter().collect();
        assert_eq!(threat_ship_score(&refs, &cfg), THREAT_SCORE_CAP);
    }

    #[test]
    fn unknown_ship_scores_nothing() {
        let cfg = DetectionConfig::default();
        let kills = vec![gate_kill(1, 0, &[1], 999_999, 587)];
        let refs: Vec<&CrewKill> = kills.iter().collect();
        assert_eq!(threat_ship_score(&refs, &cfg), 0.0);
    }

    #[test]
    fn widely_spaced_accumulates_and_caps() {
        let kills: Vec<CrewKill> = (0..5)
            .map(|i| gate_kill(i + 1, i * 6 * 60_000, &[1, 2], 602, 587))
            .collect();
        let refs: Vec<&CrewKill> = kills.iter().collect();
        // 4 gaps over 5 minutes -> 0.60 capped to 0.45
        assert_eq!(widely_spaced_bonus(&refs), MAX_WIDELY_SPACED_BONUS);
    }

    #[test]
    fn consistency_skips_single_corp_burst() {
        let mut a = gate_kill(1, 0, &[1, 2, 3], 602, 587);
        let mut b = gate_kill(2, 30_000, &[1, 2, 3], 602, 587);
        a.data.killmail.victim.corporation_id = Some(42);
        b.data.killmail.victim.corporation_id = Some(42);
        let kills = vec![a, b];
        let refs: Vec<&CrewKill> = kills.iter().collect();
        assert_eq!(consistency_bonus(&refs), 0.0);
    }

    #[test]
    fn consistency_rewards_repeat_attackers() {
        let kills = vec![
            gate_kill(1, 0, &[1, 2, 3], 602, 587),
            gate_kill(2, 200_000, &[1, 2, 4], 602, 587),
            gate_kill(3, 400_000, &[1, 2, 5], 602, 587),
        ];
        let refs: Vec<&CrewKill> = kills.iter().collect();
        assert_eq!(consistency_bonus(&refs), MAX_CONSISTENCY_BONUS);
    }

    #[test]
    fn pod_bonus_discounts_followups() {
        let ships = vec![gate_kill(1, 0, &[1, 2], 602, 587)];
        let ship_refs: Vec<&CrewKill> = ships.iter().collect();

        // Orphan pod (victim 7000 never lost a ship) + follow-up pod
        let mut orphan = gate_kill(2, 60_000, &[1, 2], 602, CAPSULE);
        orphan.data.killmail.victim.character_id = Some(7000);
        let mut followup = gate_kill(3, 90_000, &[1, 2], 602, CAPSULE);
        followup.data.killmail.victim.character_id = Some(5001);

        let pods = vec![orphan, followup];
        let pod_refs: Vec<&CrewKill> = pods.iter().collect();
        let expected = (1.0 + 0.5) * POD_BONUS_PER_KILL;
        assert!((pod_bonus(&pod_refs, &ship_refs, CAPSULE) - expected).abs() < 1e-9);
    }

    #[test]
    fn decay_reaches_zero() {
        assert_eq!(decay_multiplier(3.0, 5.0), 1.0);
        let at_ten = decay_multiplier(10.0, 5.0);
        assert!((at_ten - 0.5).abs() < 1e-9);
        assert_eq!(decay_multiplier(20.0, 5.0), 0.0);
    }

    #[test]
    fn filter_drops_npc_awox_and_structures() {
        let cfg = DetectionConfig::default();
        let mut npc = gate_kill(1, 0, &[1], 602, 587);
        npc.data.killmail.victim.character_id = None;
        let mut awox = gate_kill(2, 60_000, &[1], 602, 587);
        awox.data.zkb.awox = true;
        let mut structure = gate_kill(3, 120_000, &[1], 602, 35832);
        structure.data.ship_categories = Some(ShipCategories {
            victim: Some(CategorizedShip {
                ship_type_id: 35832,
                category: ShipCategory::Structure,
            }),
            attackers: vec![],
        });
        let mtu = gate_kill(4, 180_000, &[1], 602, cfg.mtu_ship_id);
        let good = gate_kill(5, 240_000, &[1], 602, 587);

        let kills = vec![npc, awox, structure, mtu, good];
        let kept = filter_scorable(&kills, &cfg);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].data.kill_id, 5);
    }

    #[test]
    fn no_probability_without_gate() {
        let cfg = DetectionConfig::default();
        let mut crew = Crew::new("c".into(), 30002813, "Tama", None, 0);
        let k = gate_kill(1, 0, &[1, 2], 22456, 587);
        crew.add_kill(&k.data, 0);
        assert_eq!(crew.stargate_name, None);
        assert_eq!(camp_probability(&crew, &cfg, 60_000), 0);
    }
}
