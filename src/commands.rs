use crate::error::{AppError, AppResult};
use crate::factory;
use crate::review::build_review;
use crate::rng::OsGameRng;
use crate::scheduler::{advance, attach_seer_result, emit};
use crate::types::{EventType, Game, GameId, GameStatus, Player, PlayerId, Review, RoleType, RoundEvent, SeerResult};
use crate::Engine;
use serde::{Deserialize, Serialize};

/// `GetGame` projection: non-human roles read back as `villager` while the
/// game is running; the `reveal` array is only populated once finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskedPlayer {
    pub agent_id: PlayerId,
    pub is_human: bool,
    pub alive: bool,
    pub seat_no: u8,
    pub role: RoleType,
}

/// The private slice of game state the masking rule surfaces to the human
/// seat alone: a night-role's own information never visible to any other
/// seat or to a spectator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanNightInfo {
    pub seer_result: Option<SeerResult>,
    pub witch_heal_used: bool,
    pub witch_poison_used: bool,
    pub pending_kill_seat: Option<u8>,
    pub wolf_teammates: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanSpeechInfo {
    pub speech_skips_used: u32,
    pub speech_skip_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskedGame {
    pub game: Game,
    pub players: Vec<MaskedPlayer>,
    pub human_role: RoleType,
    pub human_night_info: HumanNightInfo,
    pub human_speech_info: HumanSpeechInfo,
    pub reveal: Option<Vec<MaskedPlayer>>,
}

/// `CreateGame` returns the same masked projection `GetGame` does, so a
/// caller never has to make a second round trip just to see the board it
/// just created.
pub type CreateGameResult = MaskedGame;

pub async fn create_game(engine: &Engine, workspace_id: &str, human_agent_id: &str) -> AppResult<CreateGameResult> {
    if human_agent_id.trim().is_empty() {
        return Err(AppError::CallerMisuse("human_agent_id must not be empty".to_string()));
    }

    let mut rng = OsGameRng::new();
    let new_game = factory::create_game(workspace_id, human_agent_id, &mut rng);
    let game_id = new_game.game.id.clone();
    engine.store.create_game(&new_game.game, &new_game.players).await?;

    emit(
        engine,
        &new_game.game,
        EventType::GameCreated,
        None,
        None,
        serde_json::json!({"workspace_id": workspace_id}),
    )
    .await?;
    emit(
        engine,
        &new_game.game,
        EventType::Cinematic,
        None,
        None,
        serde_json::json!({"scene": "opening"}),
    )
    .await?;
    emit(
        engine,
        &new_game.game,
        EventType::GmNotice,
        None,
        None,
        serde_json::json!({"notice": "六名玩家已就座，游戏即将开始。"}),
    )
    .await?;
    emit(
        engine,
        &new_game.game,
        EventType::TimelineTick,
        None,
        None,
        serde_json::json!({"phase": "night_wolf", "round_no": 1}),
    )
    .await?;

    advance(engine, &game_id, &mut rng).await?;

    let game = engine.store.get_game(&game_id).await?;
    let players = engine.store.get_players(&game_id).await?;
    Ok(mask_game(game, players, engine.config.speech_skip_limit))
}

pub async fn submit_speech(engine: &Engine, game_id: &str, agent_id: &str, text: &str) -> AppResult<()> {
    let game = engine.store.get_game(game_id).await?;
    require_human_turn(&game, agent_id)?;

    crate::scheduler::record_human_speech(engine, game_id, agent_id, text).await?;

    let mut rng = OsGameRng::new();
    advance(engine, game_id, &mut rng).await
}

pub async fn submit_vote(
    engine: &Engine,
    game_id: &str,
    agent_id: &str,
    target_agent_id: &str,
    reason: &str,
) -> AppResult<()> {
    let game = engine.store.get_game(game_id).await?;
    require_human_turn(&game, agent_id)?;

    crate::scheduler::record_human_vote(engine, game_id, agent_id, target_agent_id, reason).await?;

    let mut rng = OsGameRng::new();
    advance(engine, game_id, &mut rng).await
}

pub async fn submit_night_action(
    engine: &Engine,
    game_id: &str,
    agent_id: &str,
    target_agent_id: Option<&str>,
) -> AppResult<()> {
    let mut game = engine.store.get_game(game_id).await?;
    if !game.phase.is_night() {
        return Err(AppError::CallerMisuse("game is not in a night phase".to_string()));
    }

    let players = engine.store.get_players(game_id).await?;
    let actor = players
        .iter()
        .find(|p| p.agent_id == agent_id)
        .ok_or_else(|| AppError::CallerMisuse(format!("no such player: {agent_id}")))?;
    if !actor.is_human {
        return Err(AppError::CallerMisuse("only the human seat submits actions directly".to_string()));
    }

    crate::scheduler::record_human_night_action(engine, &mut game, &players, agent_id, target_agent_id).await?;
    attach_seer_result(&mut game, &players);
    engine.store.update_game(&game).await?;

    let mut rng = OsGameRng::new();
    advance(engine, game_id, &mut rng).await
}

pub async fn get_game(engine: &Engine, game_id: &str) -> AppResult<MaskedGame> {
    let game = engine.store.get_game(game_id).await?;
    let players = engine.store.get_players(game_id).await?;
    Ok(mask_game(game, players, engine.config.speech_skip_limit))
}

pub async fn list_events(engine: &Engine, game_id: &str) -> AppResult<Vec<RoundEvent>> {
    engine.store.list_events(game_id).await
}

pub async fn get_review(engine: &Engine, game_id: &str) -> AppResult<Review> {
    if let Some(cached) = engine.store.get_review(game_id).await? {
        return Ok(cached);
    }

    let game = engine.store.get_game(game_id).await?;
    if game.status != GameStatus::Finished {
        return Err(AppError::CallerMisuse("review is only available once the game has finished".to_string()));
    }

    let players = engine.store.get_players(game_id).await?;
    let events = engine.store.list_events(game_id).await?;
    let review = build_review(game_id, &players, &events);
    engine.store.save_review(&review).await?;
    Ok(review)
}

pub async fn list_games(engine: &Engine, workspace_id: &str) -> AppResult<Vec<Game>> {
    engine.store.list_games(workspace_id).await
}

fn require_human_turn(game: &Game, agent_id: &str) -> AppResult<()> {
    match &game.current_turn_player_id {
        Some(current) if current == agent_id => Ok(()),
        Some(_) => Err(AppError::CallerMisuse("it is not this agent's turn".to_string())),
        None => Err(AppError::CallerMisuse("no turn is currently pending".to_string())),
    }
}

fn mask_game(game: Game, players: Vec<Player>, speech_skip_limit: u32) -> MaskedGame {
    let finished = game.status == GameStatus::Finished;

    let masked_players: Vec<MaskedPlayer> = players
        .iter()
        .map(|p| MaskedPlayer {
            agent_id: p.agent_id.clone(),
            is_human: p.is_human,
            alive: p.alive,
            seat_no: p.seat_no,
            role: if finished || p.is_human {
                p.role
            } else {
                RoleType::Villager
            },
        })
        .collect();

    let reveal = if finished {
        Some(
            players
                .iter()
                .map(|p| MaskedPlayer {
                    agent_id: p.agent_id.clone(),
                    is_human: p.is_human,
                    alive: p.alive,
                    seat_no: p.seat_no,
                    role: p.role,
                })
                .collect(),
        )
    } else {
        None
    };

    let human = players.iter().find(|p| p.is_human);
    let human_role = human.map(|p| p.role).unwrap_or(RoleType::Villager);

    let human_night_info = match human {
        Some(h) if h.role == RoleType::Werewolf => HumanNightInfo {
            seer_result: None,
            witch_heal_used: false,
            witch_poison_used: false,
            pending_kill_seat: game
                .state
                .night
                .pending_kill
                .as_ref()
                .and_then(|target| players.iter().find(|p| &p.agent_id == target))
                .map(|p| p.seat_no),
            wolf_teammates: players
                .iter()
                .filter(|p| p.role == RoleType::Werewolf && p.agent_id != h.agent_id)
                .map(|p| p.seat_no)
                .collect(),
        },
        Some(h) if h.role == RoleType::Seer => HumanNightInfo {
            seer_result: game.state.night.seer_result,
            witch_heal_used: false,
            witch_poison_used: false,
            pending_kill_seat: None,
            wolf_teammates: Vec::new(),
        },
        Some(h) if h.role == RoleType::Witch => HumanNightInfo {
            seer_result: None,
            witch_heal_used: game.state.night.witch_heal_used,
            witch_poison_used: game.state.night.witch_poison_used,
            pending_kill_seat: game
                .state
                .night
                .pending_kill
                .as_ref()
                .and_then(|target| players.iter().find(|p| &p.agent_id == target))
                .map(|p| p.seat_no),
            wolf_teammates: Vec::new(),
        },
        _ => HumanNightInfo {
            seer_result: None,
            witch_heal_used: false,
            witch_poison_used: false,
            pending_kill_seat: None,
            wolf_teammates: Vec::new(),
        },
    };

    let human_speech_info = HumanSpeechInfo {
        speech_skips_used: human.map(|h| h.memory.speech_skips_used).unwrap_or(0),
        speech_skip_limit,
    };

    MaskedGame {
        game,
        players: masked_players,
        human_role,
        human_night_info,
        human_speech_info,
        reveal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecodeConfig, GameStateBlob, Phase, PlayerMemory};
    use chrono::Utc;

    fn sample_game(status: GameStatus) -> Game {
        Game {
            id: "g".to_string(),
            workspace_id: "ws".to_string(),
            status,
            phase: Phase::DaySpeaking,
            round_no: 1,
            human_agent_id: Some("human-1".to_string()),
            group_id: "group".to_string(),
            current_turn_player_id: None,
            winner_side: None,
            state: GameStateBlob::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            ended_at: None,
        }
    }

    fn sample_player(agent_id: &str, is_human: bool, role: RoleType) -> Player {
        Player {
            game_id: "g".to_string(),
            agent_id: agent_id.to_string(),
            is_human,
            role,
            alive: true,
            seat_no: 1,
            strategy_key: None,
            decode_config: None::<DecodeConfig>,
            memory: PlayerMemory::default(),
            emotion_state: "neutral".to_string(),
        }
    }

    #[test]
    fn masks_ai_roles_while_running() {
        let game = sample_game(GameStatus::Running);
        let players = vec![
            sample_player("human-1", true, RoleType::Seer),
            sample_player("ai-1", false, RoleType::Werewolf),
        ];
        let masked = mask_game(game, players, 1);
        let ai = masked.players.iter().find(|p| p.agent_id == "ai-1").unwrap();
        assert_eq!(ai.role, RoleType::Villager);
        assert!(masked.reveal.is_none());
    }

    #[test]
    fn reveals_true_roles_once_finished() {
        let game = sample_game(GameStatus::Finished);
        let players = vec![sample_player("ai-1", false, RoleType::Werewolf)];
        let masked = mask_game(game, players, 1);
        assert!(masked.reveal.is_some());
        let revealed = masked.reveal.unwrap();
        assert_eq!(revealed[0].role, RoleType::Werewolf);
    }

    #[test]
    fn human_seat_never_masked() {
        let game = sample_game(GameStatus::Running);
        let players = vec![sample_player("human-1", true, RoleType::Werewolf)];
        let masked = mask_game(game, players, 1);
        assert_eq!(masked.players[0].role, RoleType::Werewolf);
    }

    #[test]
    fn werewolf_human_sees_wolf_teammates_and_pending_kill() {
        let mut game = sample_game(GameStatus::Running);
        game.state.night.pending_kill = Some("ai-2".to_string());
        let players = vec![
            sample_player("human-1", true, RoleType::Werewolf),
            {
                let mut p = sample_player("ai-1", false, RoleType::Werewolf);
                p.seat_no = 2;
                p
            },
            {
                let mut p = sample_player("ai-2", false, RoleType::Villager);
                p.seat_no = 3;
                p
            },
        ];
        let masked = mask_game(game, players, 1);
        assert_eq!(masked.human_night_info.wolf_teammates, vec![2]);
        assert_eq!(masked.human_night_info.pending_kill_seat, Some(3));
    }

    #[test]
    fn non_werewolf_human_sees_no_wolf_teammates() {
        let game = sample_game(GameStatus::Running);
        let players = vec![sample_player("human-1", true, RoleType::Villager)];
        let masked = mask_game(game, players, 1);
        assert!(masked.human_night_info.wolf_teammates.is_empty());
    }
}
