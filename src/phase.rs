use crate::rng::GameRng;
use crate::types::{Faction, NightState, Phase, Player, RoleType, SeerResult};

/// Pure functions over game state; no I/O. Phase transitions, win-condition
/// checks, night-action resolution, and vote tallying with tie/tiebreak
/// handling all live here, kept free of storage and RNG side effects except
/// where a tiebreak explicitly takes an injected `GameRng`.
pub fn next_phase(current: Phase) -> Phase {
    match current {
        Phase::NightWolf => Phase::NightSeer,
        Phase::NightSeer => Phase::NightWitch,
        Phase::NightWitch => Phase::DayAnnounce,
        Phase::DayAnnounce => Phase::DaySpeaking,
        Phase::DaySpeaking => Phase::DayVoting,
        Phase::DayVoting => Phase::DayElimination,
        Phase::DayTiebreakSpeaking => Phase::DayTiebreakVoting,
        Phase::DayTiebreakVoting => Phase::DayElimination,
        Phase::DayElimination => Phase::NightWolf,
        Phase::GameOver => Phase::GameOver,
    }
}

/// `w = 0 -> good side wins`, `w >= g -> werewolf side wins`, else the game
/// continues.
pub fn check_winner(players: &[Player]) -> Option<Faction> {
    let alive_werewolves = players
        .iter()
        .filter(|p| p.alive && p.role == RoleType::Werewolf)
        .count();
    let alive_good = players.iter().filter(|p| p.alive && p.role != RoleType::Werewolf).count();

    if alive_werewolves == 0 {
        Some(Faction::GoodSide)
    } else if alive_werewolves >= alive_good {
        Some(Faction::WerewolfSide)
    } else {
        None
    }
}

/// Resolves the night's wolf kill, witch heal/poison, and seer check into
/// final deaths. Witch heal cancels the wolf kill; witch poison is an
/// independent death. A player cannot be both healed and poisoned in the
/// same night by construction of the turn adapter.
pub fn resolve_night(night: &mut NightState) {
    let mut deaths = Vec::new();

    if let Some(target) = night.pending_kill.clone() {
        if night.witch_saved {
            // healed, no death
        } else {
            deaths.push(target);
        }
    }

    if let Some(poisoned) = night.witch_poison_target.clone() {
        if !deaths.contains(&poisoned) {
            deaths.push(poisoned);
        }
    }

    night.deaths_last_night = deaths;
}

pub fn seer_result_for(target_role: RoleType) -> SeerResult {
    if target_role == RoleType::Werewolf {
        SeerResult::Werewolf
    } else {
        SeerResult::Good
    }
}

/// Tallies votes into (winner, tied candidates). An empty tie means a
/// single candidate had strictly more votes than everyone else.
pub fn tally_votes(votes: &[(String, String)]) -> (Option<String>, Vec<String>) {
    use std::collections::HashMap;
    let mut counts: HashMap<String, u32> = HashMap::new();
    for (_, target) in votes {
        *counts.entry(target.clone()).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    if max == 0 {
        return (None, Vec::new());
    }
    let leaders: Vec<String> = counts
        .into_iter()
        .filter(|(_, c)| *c == max)
        .map(|(k, _)| k)
        .collect();

    if leaders.len() == 1 {
        (Some(leaders[0].clone()), Vec::new())
    } else {
        (None, leaders)
    }
}

/// Second-round tie resolved by uniform random selection among the tied
/// candidates, per the design note on random-but-reproducible behavior.
pub fn resolve_tiebreak(candidates: &[String], rng: &mut dyn GameRng) -> String {
    let idx = rng.gen_range(candidates.len());
    candidates[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededGameRng;
    use crate::types::{DecodeConfig, PlayerMemory};

    fn player(role: RoleType, alive: bool) -> Player {
        Player {
            game_id: "g".to_string(),
            agent_id: format!("{role:?}"),
            is_human: false,
            role,
            alive,
            seat_no: 1,
            strategy_key: None,
            decode_config: None::<DecodeConfig>,
            memory: PlayerMemory::default(),
            emotion_state: "neutral".to_string(),
        }
    }

    #[test]
    fn good_side_wins_when_no_werewolves_alive() {
        let players = vec![player(RoleType::Villager, true), player(RoleType::Werewolf, false)];
        assert_eq!(check_winner(&players), Some(Faction::GoodSide));
    }

    #[test]
    fn werewolf_side_wins_when_parity_reached() {
        let players = vec![player(RoleType::Werewolf, true), player(RoleType::Villager, true)];
        assert_eq!(check_winner(&players), Some(Faction::WerewolfSide));
    }

    #[test]
    fn game_continues_when_good_outnumbers_wolves() {
        let players = vec![
            player(RoleType::Werewolf, true),
            player(RoleType::Villager, true),
            player(RoleType::Villager, true),
        ];
        assert_eq!(check_winner(&players), None);
    }

    #[test]
    fn phase_cycle_runs_through_full_round() {
        let mut phase = Phase::NightWolf;
        for _ in 0..7 {
            phase = next_phase(phase);
        }
        assert_eq!(phase, Phase::NightWolf);
    }

    #[test]
    fn witch_heal_cancels_wolf_kill() {
        let mut night = NightState {
            pending_kill: Some("seat-2".to_string()),
            witch_saved: true,
            ..Default::default()
        };
        resolve_night(&mut night);
        assert!(night.deaths_last_night.is_empty());
    }

    #[test]
    fn tally_detects_tie() {
        let votes = vec![
            ("a".to_string(), "x".to_string()),
            ("b".to_string(), "y".to_string()),
        ];
        let (winner, tied) = tally_votes(&votes);
        assert!(winner.is_none());
        assert_eq!(tied.len(), 2);
    }

    #[test]
    fn tiebreak_picks_one_of_the_candidates() {
        let mut rng = SeededGameRng::from_game_id("game-1");
        let candidates = vec!["x".to_string(), "y".to_string()];
        let pick = resolve_tiebreak(&candidates, &mut rng);
        assert!(candidates.contains(&pick));
    }
}
