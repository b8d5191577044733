//! End-to-end scenarios driven through the public engine API: ingest
//! enriched killmails, tick the clock forward, observe classification and
//! probability.

mod common;

use campwatch_rust::classification::Classification;
use campwatch_rust::models::Triangulation;
use common::*;

/// Three ship kills a few minutes apart at a notorious gate, with a Sabre
/// on every kill, is about as camp as it gets.
#[test]
fn known_permanent_camp_scores_high() {
    init_tracing();
    let mut eng = engine();

    for i in 0..3i64 {
        let t = mins(3) * i;
        let kill = KillBuilder::new(i + 1, t)
            .attacker(1, SABRE)
            .attacker(2, 602)
            .victim(Some(100 + i as u64), 587)
            .at_gate("Stargate (Nourvukaiken)")
            .build();
        eng.ingest(&kill, t);
    }

    assert_eq!(eng.crew_count(), 1);
    let crew = eng.crews().next().unwrap();
    assert_eq!(crew.classification, Classification::Camp);
    assert!(
        crew.probability >= 70,
        "expected camp probability >= 70, got {}",
        crew.probability
    );
    assert_eq!(
        crew.stargate_name.as_deref(),
        Some("Stargate (Nourvukaiken)")
    );
}

/// Five ship kills at a gate followed by four pods of the same victims:
/// the pods are follow-ups and must not dilute the gate-kill ratio.
#[test]
fn followup_pods_do_not_dilute_gate_ratio() {
    init_tracing();
    let mut eng = engine();

    for i in 0..5i64 {
        let t = mins(6) * i;
        let kill = KillBuilder::new(i + 1, t)
            .attacker(1, 602)
            .attacker(2, 603)
            .victim(Some(201 + i as u64), 587)
            .at_gate("Stargate (Kedama)")
            .build();
        eng.ingest(&kill, t);
    }
    // Pods of four of the five ship victims
    for i in 0..4i64 {
        let t = mins(25) + i * 1_000;
        let pod = KillBuilder::new(10 + i, t)
            .attacker(1, 602)
            .attacker(2, 603)
            .victim(Some(201 + i as u64), CAPSULE)
            .at_gate("Stargate (Kedama)")
            .build();
        eng.ingest(&pod, t);
    }

    assert_eq!(eng.crew_count(), 1);
    let crew = eng.crews().next().unwrap();
    assert_eq!(crew.effective_kill_count(CAPSULE), 5);
    assert_eq!(crew.gate_kill_count, 5);
    assert_eq!(crew.stargate_name.as_deref(), Some("Stargate (Kedama)"));
    assert_eq!(crew.classification, Classification::Camp);
}

/// Ten members who all go quiet: statuses decay to departed and the crew
/// dissolves into the archive before its timeout would have fired.
#[test]
fn dissolved_crew_is_archived() {
    init_tracing();
    let mut eng = engine();

    let k1 = KillBuilder::new(1, 0)
        .attacker(1, 602)
        .attacker(2, 602)
        .attacker(3, 602)
        .attacker(4, 602)
        .attacker(5, 602)
        .victim(Some(501), 587)
        .build();
    eng.ingest(&k1, 0);
    let k2 = KillBuilder::new(2, mins(1))
        .attacker(1, 602)
        .attacker(6, 602)
        .attacker(7, 602)
        .attacker(8, 602)
        .attacker(9, 602)
        .attacker(10, 602)
        .victim(Some(502), 587)
        .build();
    eng.ingest(&k2, mins(1));

    assert_eq!(eng.crew_count(), 1);
    assert_eq!(eng.crews().next().unwrap().members.len(), 10);

    let changed = eng.tick(mins(61));
    assert!(changed);
    assert_eq!(eng.crew_count(), 0);

    let archived = eng.drain_archive();
    assert_eq!(archived.len(), 1);
    let snap = &archived[0];
    assert_eq!(snap.composition.original_count, 10);
    assert_eq!(snap.composition.departed_count, 10);
    assert_eq!(snap.kills.len(), 2);
}

/// A quiet camp decays monotonically and hits zero.
#[test]
fn probability_decays_to_zero() {
    init_tracing();
    let mut eng = engine();

    for i in 0..3i64 {
        let t = mins(3) * i;
        let kill = KillBuilder::new(i + 1, t)
            .attacker(1, SABRE)
            .attacker(2, 602)
            .victim(Some(100 + i as u64), 587)
            .at_gate("Stargate (Nourvukaiken)")
            .build();
        eng.ingest(&kill, t);
    }

    let last_kill = mins(6);
    let initial = eng.crews().next().unwrap().probability;
    assert!(initial >= 70);

    let mut prev = initial;
    for quiet_minutes in [7, 9, 11, 13, 15] {
        eng.tick(last_kill + mins(quiet_minutes));
        let crew = eng.crews().next().expect("crew still live");
        assert!(
            crew.probability <= prev,
            "probability rose from {} to {} after {} quiet minutes",
            prev,
            crew.probability,
            quiet_minutes
        );
        // Nonzero probability always comes with a stargate
        if crew.probability > 0 {
            assert!(crew.stargate_name.is_some());
        }
        prev = crew.probability;
    }
    assert_eq!(prev, 0, "fully decayed camp should score 0");
}

/// A lone interdictor pilot holding a gate is a solo camp; the same pilot
/// killing away from gates is a solo roam.
#[test]
fn solo_interdictor_at_gate_vs_off_gate() {
    init_tracing();

    let mut camped = engine();
    for i in 0..2i64 {
        let t = mins(3) * i;
        let kill = KillBuilder::new(i + 1, t)
            .attacker(1, SABRE)
            .victim(Some(300 + i as u64), 587)
            .at_gate("Stargate (Kedama)")
            .build();
        camped.ingest(&kill, t);
    }
    assert_eq!(
        camped.crews().next().unwrap().classification,
        Classification::SoloCamp
    );

    let mut roaming = engine();
    for i in 0..2i64 {
        let t = mins(3) * i;
        let kill = KillBuilder::new(i + 1, t)
            .attacker(1, SABRE)
            .victim(Some(300 + i as u64), 587)
            .near_celestial("Tama VII - Moon 1", Triangulation::NearCelestial)
            .build();
        roaming.ingest(&kill, t);
    }
    assert_eq!(
        roaming.crews().next().unwrap().classification,
        Classification::SoloRoam
    );
}

/// Smartbomb weapons on a stationary gate crew outrank the plain camp
/// label.
#[test]
fn smartbomb_crew_is_never_a_plain_camp() {
    init_tracing();
    let mut eng = engine();

    for i in 0..3i64 {
        let t = mins(4) * i;
        let kill = KillBuilder::new(i + 1, t)
            .attacker_with_weapon(1, 17738, 3993)
            .attacker(2, 602)
            .victim(Some(400 + i as u64), 587)
            .at_gate("Stargate (Miroitem)")
            .system(30003068)
            .build();
        eng.ingest(&kill, t);
    }

    let crew = eng.crews().next().unwrap();
    assert!(crew.has_smartbombs);
    assert_eq!(crew.classification, Classification::Smartbomb);
    assert!(crew.probability > 0);
}

/// Forty present members are a battle no matter where they are shooting.
#[test]
fn forty_members_is_a_battle() {
    init_tracing();
    let mut eng = engine();

    let mut kill = KillBuilder::new(1, 0).victim(Some(700), 587);
    for c in 1..=40u64 {
        kill = kill.attacker(c, 602);
    }
    eng.ingest(&kill.build(), 0);

    // Keep half the fleet on a second kill in another system
    let mut second = KillBuilder::new(2, mins(2)).victim(Some(701), 587).system(JITA);
    for c in 1..=20u64 {
        second = second.attacker(c, 602);
    }
    eng.ingest(&second.build(), mins(2));

    assert_eq!(eng.crew_count(), 1);
    let crew = eng.crews().next().unwrap();
    assert_eq!(crew.classification, Classification::Battle);
    assert!(crew.visited_system_ids.len() > 1);
}

/// The snapshot only lists crews inside their class timeout, ordered by
/// probability then recency.
#[test]
fn snapshot_honors_timeouts() {
    init_tracing();
    let mut eng = engine();

    // A camp in Tama (long timeout)...
    for i in 0..2i64 {
        let t = mins(3) * i;
        let kill = KillBuilder::new(i + 1, t)
            .attacker(1, SABRE)
            .attacker(2, 602)
            .victim(Some(100 + i as u64), 587)
            .at_gate("Stargate (Nourvukaiken)")
            .build();
        eng.ingest(&kill, t);
    }
    // ...and unrelated activity in Jita (short timeout)
    let jita = KillBuilder::new(10, mins(1))
        .attacker(50, 602)
        .attacker(51, 602)
        .victim(Some(800), 587)
        .system(JITA)
        .build();
    eng.ingest(&jita, mins(1));

    let snaps = eng.snapshot(mins(4));
    assert_eq!(snaps.len(), 2);
    assert_eq!(snaps[0].classification, "camp");

    // 20 minutes later the Jita activity is past its 15 minute timeout,
    // the camp is still inside its 30 minute window.
    let snaps = eng.snapshot(mins(20));
    assert_eq!(snaps.len(), 1);
    assert_eq!(snaps[0].classification, "camp");
}
