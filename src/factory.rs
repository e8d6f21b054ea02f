use crate::rng::GameRng;
use crate::strategy::{profile_for, StrategyProfile};
use crate::types::{
    Game, GameId, GameStateBlob, GameStatus, Phase, Player, PlayerMemory, AI_COUNT, ROLE_POOL,
    STRATEGY_SLOTS,
};
use crate::utils::generate_id;
use chrono::Utc;

/// Allocates the five ephemeral AI agents in fixed strategy-slot order,
/// shuffles the fixed six-role pool (werewolf x2, seer x1, witch x1,
/// villager x2 — no hunter, no guard), and builds the initial persisted
/// state.
pub struct NewGame {
    pub game: Game,
    pub players: Vec<Player>,
}

pub fn create_game(workspace_id: &str, human_agent_id: &str, rng: &mut dyn GameRng) -> NewGame {
    let game_id: GameId = generate_id();
    let group_id = generate_id();

    let mut roles = ROLE_POOL.to_vec();
    rng.shuffle(&mut roles);

    let mut seat_agent_ids: Vec<String> = Vec::with_capacity(6);
    let mut seat_is_human: Vec<bool> = Vec::with_capacity(6);
    let mut seat_strategy: Vec<Option<&'static StrategyProfile>> = Vec::with_capacity(6);

    seat_agent_ids.push(human_agent_id.to_string());
    seat_is_human.push(true);
    seat_strategy.push(None);

    for slot in STRATEGY_SLOTS.iter().take(AI_COUNT) {
        seat_agent_ids.push(format!("ai-{slot}-{game_id}"));
        seat_is_human.push(false);
        seat_strategy.push(profile_for(slot));
    }

    debug_assert_eq!(seat_agent_ids.len(), 6, "total seats must equal the role pool size");

    let players: Vec<Player> = (0..6)
        .map(|i| Player {
            game_id: game_id.clone(),
            agent_id: seat_agent_ids[i].clone(),
            is_human: seat_is_human[i],
            role: roles[i],
            alive: true,
            seat_no: (i + 1) as u8,
            strategy_key: seat_strategy[i].map(|p| p.key.to_string()),
            decode_config: seat_strategy[i].map(|p| p.decode),
            memory: PlayerMemory::default(),
            emotion_state: "neutral".to_string(),
        })
        .collect();

    let turn_order: Vec<String> = players.iter().map(|p| p.agent_id.clone()).collect();

    let now = Utc::now();
    let game = Game {
        id: game_id,
        workspace_id: workspace_id.to_string(),
        status: GameStatus::Running,
        phase: Phase::NightWolf,
        round_no: 1,
        human_agent_id: Some(human_agent_id.to_string()),
        group_id,
        current_turn_player_id: None,
        winner_side: None,
        state: GameStateBlob {
            turn_order,
            turn_index: 0,
            voters_pending: Vec::new(),
            tie_candidates: Vec::new(),
            is_tiebreak: false,
            night: Default::default(),
        },
        created_at: now,
        updated_at: now,
        ended_at: None,
    };

    NewGame { game, players }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SeededGameRng;
    use crate::types::RoleType;

    #[test]
    fn builds_six_seats_with_fixed_role_distribution() {
        let mut rng = SeededGameRng::from_game_id("seed-1");
        let new_game = create_game("ws-1", "human-1", &mut rng);
        assert_eq!(new_game.players.len(), 6);
        assert_eq!(
            new_game.players.iter().filter(|p| p.role == RoleType::Werewolf).count(),
            2
        );
        assert_eq!(new_game.players.iter().filter(|p| p.role == RoleType::Seer).count(), 1);
        assert_eq!(new_game.players.iter().filter(|p| p.role == RoleType::Witch).count(), 1);
        assert_eq!(
            new_game.players.iter().filter(|p| p.role == RoleType::Villager).count(),
            2
        );
    }

    #[test]
    fn exactly_one_human_seat() {
        let mut rng = SeededGameRng::from_game_id("seed-2");
        let new_game = create_game("ws-1", "human-1", &mut rng);
        assert_eq!(new_game.players.iter().filter(|p| p.is_human).count(), 1);
    }

    #[test]
    fn five_ai_seats_cover_every_strategy_slot() {
        let mut rng = SeededGameRng::from_game_id("seed-3");
        let new_game = create_game("ws-1", "human-1", &mut rng);
        let mut keys: Vec<_> = new_game
            .players
            .iter()
            .filter_map(|p| p.strategy_key.as_deref())
            .collect();
        keys.sort_unstable();
        let mut expected: Vec<_> = STRATEGY_SLOTS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
    }
}
