use crate::error::AppResult;
use crate::phase::{check_winner, next_phase, resolve_night, resolve_tiebreak, seer_result_for, tally_votes};
use crate::rng::GameRng;
use crate::strategy::profile_for;
use crate::turn_adapter::{produce_turn, TurnContext, TurnKind};
use crate::types::{EventType, Faction, Game, Phase, Player, RoleType, RoundEvent};
use crate::Engine;
use chrono::Utc;
use log::info;

/// Human seats get a fixed countdown hint rather than a computed one since
/// there is no client-reported round-trip latency to budget against.
const SPEECH_COUNTDOWN_SEC: u32 = 18;
const VOTE_COUNTDOWN_SEC: u32 = 12;
const NIGHT_COUNTDOWN_SEC: u32 = 10;
const AI_COUNTDOWN_SEC: u32 = 3;

/// One invocation of the per-game drive function: advances the phase
/// state machine as far as it can go without a human response, parking
/// the moment it is a human seat's turn. Bounded by
/// `config.scheduler_max_iterations` as a safety backstop against any
/// cycle the phase graph does not otherwise prevent.
pub async fn advance(engine: &Engine, game_id: &str, rng: &mut dyn GameRng) -> AppResult<()> {
    let mut iterations = 0u32;

    loop {
        if iterations >= engine.config.scheduler_max_iterations {
            info!("[game={game_id}] advance loop hit the safety bound, parking");
            return Ok(());
        }
        iterations += 1;

        let mut game = engine.store.get_game(game_id).await?;
        if game.phase.is_terminal() {
            return Ok(());
        }

        let mut players = engine.store.get_players(game_id).await?;

        match game.phase {
            Phase::NightWolf | Phase::NightSeer | Phase::NightWitch => {
                if step_night(engine, &mut game, &mut players, rng).await?.parked {
                    return Ok(());
                }
            }
            Phase::DayAnnounce => {
                step_day_announce(engine, &mut game, &players).await?;
            }
            Phase::DaySpeaking | Phase::DayTiebreakSpeaking => {
                if step_speaking(engine, &mut game, &players).await?.parked {
                    return Ok(());
                }
            }
            Phase::DayVoting | Phase::DayTiebreakVoting => {
                if step_voting(engine, &mut game, &players, rng).await?.parked {
                    return Ok(());
                }
            }
            Phase::DayElimination => {
                step_elimination(engine, &mut game, &mut players).await?;
            }
            Phase::GameOver => return Ok(()),
        }
    }
}

struct StepOutcome {
    parked: bool,
}

fn turn_order_alive(game: &Game, players: &[Player]) -> Vec<String> {
    game.state
        .turn_order
        .iter()
        .filter(|id| players.iter().any(|p| &p.agent_id == *id && p.alive))
        .cloned()
        .collect()
}

fn seat_numbers(players: &[Player]) -> Vec<u8> {
    players.iter().map(|p| p.seat_no).collect()
}

fn alive_seat_numbers(players: &[Player]) -> Vec<u8> {
    players.iter().filter(|p| p.alive).map(|p| p.seat_no).collect()
}

pub(crate) async fn emit(
    engine: &Engine,
    game: &Game,
    event_type: EventType,
    actor_id: Option<String>,
    target_id: Option<String>,
    payload: serde_json::Value,
) -> AppResult<()> {
    let seq = engine.store.next_seq(&game.id).await?;
    let event = RoundEvent {
        id: crate::utils::generate_id(),
        game_id: game.id.clone(),
        seq,
        round_no: game.round_no,
        phase: game.phase,
        event_type,
        actor_id,
        target_id,
        payload,
        created_at: Utc::now(),
    };
    engine.store.append_event(&event).await?;
    engine.emitter.emit(event);
    Ok(())
}

/// Every streamed speech is broken into a handful of growing-prefix frames
/// followed by a final `done=true` frame whose text equals the committed
/// utterance — simulated chunking since the LLM client returns a complete
/// payload rather than a true token stream.
async fn emit_speech_stream(engine: &Engine, game: &Game, actor_id: &str, full_text: &str) -> AppResult<()> {
    let chars: Vec<char> = full_text.chars().collect();
    if chars.is_empty() {
        emit(
            engine,
            game,
            EventType::SpeechDelta,
            Some(actor_id.to_string()),
            None,
            serde_json::json!({"text": "", "done": true}),
        )
        .await?;
        return Ok(());
    }

    let chunk_count = chars.len().min(4).max(1);
    let chunk_size = chars.len().div_ceil(chunk_count);
    let mut acc = String::new();
    let mut idx = 0;
    while idx < chars.len() {
        let end = (idx + chunk_size).min(chars.len());
        acc.extend(&chars[idx..end]);
        idx = end;
        let done = idx >= chars.len();
        emit(
            engine,
            game,
            EventType::SpeechDelta,
            Some(actor_id.to_string()),
            None,
            serde_json::json!({"text": acc.clone(), "done": done}),
        )
        .await?;
    }
    Ok(())
}

async fn emit_turn_start(engine: &Engine, game: &Game, actor_id: &str, kind: &str, countdown_sec: u32) -> AppResult<()> {
    emit(
        engine,
        game,
        EventType::TurnStart,
        Some(actor_id.to_string()),
        None,
        serde_json::json!({"kind": kind}),
    )
    .await?;
    emit(
        engine,
        game,
        EventType::Countdown,
        Some(actor_id.to_string()),
        None,
        serde_json::json!({"countdown_sec": countdown_sec}),
    )
    .await
}

async fn emit_turn_end(engine: &Engine, game: &Game, actor_id: &str, kind: &str) -> AppResult<()> {
    emit(
        engine,
        game,
        EventType::TurnEnd,
        Some(actor_id.to_string()),
        None,
        serde_json::json!({"kind": kind}),
    )
    .await
}

/// Moves `game.phase` forward, emitting a `phase_change` event for every
/// real transition (a phase "transitioning" to itself, as `GameOver` does,
/// emits nothing).
async fn set_phase(engine: &Engine, game: &mut Game, new_phase: Phase) -> AppResult<()> {
    if new_phase != game.phase {
        emit(
            engine,
            game,
            EventType::PhaseChange,
            None,
            None,
            serde_json::json!({"from": format!("{:?}", game.phase), "to": format!("{:?}", new_phase)}),
        )
        .await?;
    }
    game.phase = new_phase;
    Ok(())
}

async fn persist(engine: &Engine, game: &Game) -> AppResult<()> {
    let mut updated = game.clone();
    updated.updated_at = Utc::now();
    engine.store.update_game(&updated).await
}

async fn step_night(
    engine: &Engine,
    game: &mut Game,
    players: &mut [Player],
    rng: &mut dyn GameRng,
) -> AppResult<StepOutcome> {
    let acting_role = match game.phase {
        Phase::NightWolf => RoleType::Werewolf,
        Phase::NightSeer => RoleType::Seer,
        Phase::NightWitch => RoleType::Witch,
        _ => unreachable!(),
    };

    let actors: Vec<Player> = players
        .iter()
        .filter(|p| p.alive && p.role == acting_role)
        .cloned()
        .collect();

    if actors.is_empty() {
        if acting_role == RoleType::Witch {
            resolve_night(&mut game.state.night);
            apply_deaths(engine, game, players).await?;
        }
        let next = next_phase(game.phase);
        set_phase(engine, game, next).await?;
        persist(engine, game).await?;
        return Ok(StepOutcome { parked: false });
    }

    if let Some(human) = actors.iter().find(|p| p.is_human) {
        emit_turn_start(engine, game, &human.agent_id, "night", NIGHT_COUNTDOWN_SEC).await?;
        game.current_turn_player_id = Some(human.agent_id.clone());
        persist(engine, game).await?;
        return Ok(StepOutcome { parked: true });
    }

    let valid_seats = seat_numbers(players);
    let alive_seats = alive_seat_numbers(players);
    let is_tiebreak = matches!(game.phase, Phase::DayTiebreakSpeaking | Phase::DayTiebreakVoting);
    let deaths_last_night = game.state.night.deaths_last_night.clone();

    for actor in &actors {
        let profile = actor
            .strategy_key
            .as_deref()
            .and_then(profile_for)
            .expect("ai seats always carry a strategy profile");

        emit_turn_start(engine, game, &actor.agent_id, "night", AI_COUNTDOWN_SEC).await?;

        let ctx = TurnContext {
            agent_id: &actor.agent_id,
            round_no: game.round_no,
            is_tiebreak,
            speaker_seat: actor.seat_no,
            valid_seats: &valid_seats,
            alive_seats: &alive_seats,
            deaths_last_night: &deaths_last_night,
            system_prompt: "Pick a night target for your role and respond with JSON only: {\"target\": <seat number or null>}.",
            user_prompt: "Choose a target seat.",
        };

        let outcome = produce_turn(
            engine.llm.as_ref(),
            engine.retry,
            profile,
            TurnKind::Night,
            &ctx,
            &actor.memory,
            &engine.validator_config,
        )
        .await;

        let target_agent = outcome.target_seat.and_then(|seat| {
            players
                .iter()
                .find(|p| p.seat_no == seat && p.alive)
                .map(|p| p.agent_id.clone())
        });

        apply_night_action(game, acting_role, &actor.agent_id, target_agent.clone());

        emit(
            engine,
            game,
            EventType::NightAction,
            Some(actor.agent_id.clone()),
            target_agent,
            serde_json::json!({"role": format!("{acting_role:?}")}),
        )
        .await?;

        emit_turn_end(engine, game, &actor.agent_id, "night").await?;
    }

    if acting_role == RoleType::Witch {
        resolve_night(&mut game.state.night);
        apply_deaths(engine, game, players).await?;
    }

    let next = next_phase(game.phase);
    set_phase(engine, game, next).await?;
    persist(engine, game).await?;
    Ok(StepOutcome { parked: false })
}

/// Applies the resolved night deaths, marking each victim's seat dead,
/// emitting its "eliminated" emotion update and a death_reveal event. Runs
/// once, right before the game enters `day_announce`.
async fn apply_deaths(engine: &Engine, game: &Game, players: &mut [Player]) -> AppResult<()> {
    for death in game.state.night.deaths_last_night.clone() {
        if let Some(p) = players.iter_mut().find(|p| p.agent_id == death) {
            if p.alive {
                p.alive = false;
                engine.store.update_player(p).await?;
                emit(
                    engine,
                    game,
                    EventType::EmotionUpdate,
                    Some(death.clone()),
                    None,
                    serde_json::json!({"emotion": "eliminated"}),
                )
                .await?;
                emit(engine, game, EventType::DeathReveal, None, Some(death.clone()), serde_json::json!({}))
                    .await?;
            }
        }
    }
    Ok(())
}

fn apply_night_action(game: &mut Game, role: RoleType, actor_id: &str, target: Option<String>) {
    match role {
        RoleType::Werewolf => {
            if let Some(t) = target.clone() {
                game.state.night.wolf_votes.insert(actor_id.to_string(), t.clone());
                game.state.night.pending_kill = Some(t);
            }
        }
        RoleType::Seer => {
            game.state.night.seer_check_target = target;
        }
        RoleType::Witch => {
            // A witch action targeting the pending kill is a heal; any
            // other target is a poison. Only one of each per game, kept
            // simple here since only a single witch seat exists.
            if let Some(t) = target {
                if game.state.night.pending_kill.as_deref() == Some(t.as_str())
                    && !game.state.night.witch_heal_used
                {
                    game.state.night.witch_saved = true;
                    game.state.night.witch_heal_used = true;
                } else if !game.state.night.witch_poison_used {
                    game.state.night.witch_poison_target = Some(t);
                    game.state.night.witch_poison_used = true;
                }
            }
        }
        _ => {}
    }
}

/// Entry point for the day: announces the night's deaths, then re-runs the
/// winner check before any day speaking begins, since a night kill can
/// already have reached werewolf parity.
async fn step_day_announce(engine: &Engine, game: &mut Game, players: &[Player]) -> AppResult<()> {
    emit(
        engine,
        game,
        EventType::DayAnnounce,
        None,
        None,
        serde_json::json!({"deaths": game.state.night.deaths_last_night.clone()}),
    )
    .await?;

    if let Some(winner) = check_winner(players) {
        finish_game(engine, game, winner).await?;
    } else {
        let next = next_phase(game.phase);
        set_phase(engine, game, next).await?;
        game.state.turn_index = 0;
    }
    persist(engine, game).await
}

async fn finish_game(engine: &Engine, game: &mut Game, winner: Faction) -> AppResult<()> {
    set_phase(engine, game, Phase::GameOver).await?;
    game.winner_side = Some(winner);
    game.status = crate::types::GameStatus::Finished;
    game.ended_at = Some(Utc::now());
    emit(engine, game, EventType::GameOver, None, None, serde_json::json!({"winner": format!("{winner:?}")})).await
}

async fn step_speaking(engine: &Engine, game: &mut Game, players: &[Player]) -> AppResult<StepOutcome> {
    let order = turn_order_alive(game, players);
    if game.state.turn_index >= order.len() {
        let next = next_phase(game.phase);
        set_phase(engine, game, next).await?;
        game.state.turn_index = 0;
        game.state.voters_pending = order;
        persist(engine, game).await?;
        return Ok(StepOutcome { parked: false });
    }

    let agent_id = order[game.state.turn_index].clone();
    let actor = players.iter().find(|p| p.agent_id == agent_id).expect("turn order references a live seat");

    if actor.is_human {
        emit_turn_start(engine, game, &agent_id, "speech", SPEECH_COUNTDOWN_SEC).await?;
        game.current_turn_player_id = Some(agent_id);
        persist(engine, game).await?;
        return Ok(StepOutcome { parked: true });
    }

    emit_turn_start(engine, game, &actor.agent_id, "speech", AI_COUNTDOWN_SEC).await?;

    let profile = actor
        .strategy_key
        .as_deref()
        .and_then(profile_for)
        .expect("ai seats always carry a strategy profile");

    let valid_seats = seat_numbers(players);
    let alive_seats = alive_seat_numbers(players);
    let is_tiebreak = matches!(game.phase, Phase::DayTiebreakSpeaking | Phase::DayTiebreakVoting);
    let deaths_last_night = game.state.night.deaths_last_night.clone();

    let ctx = TurnContext {
        agent_id: &actor.agent_id,
        round_no: game.round_no,
        is_tiebreak,
        speaker_seat: actor.seat_no,
        valid_seats: &valid_seats,
        alive_seats: &alive_seats,
        deaths_last_night: &deaths_last_night,
        system_prompt: "Speak about the game so far in Chinese, citing only what you observed, and respond with JSON only: {\"speech\": \"...\"}.",
        user_prompt: "Give your speech for this round.",
    };

    let outcome = produce_turn(
        engine.llm.as_ref(),
        engine.retry,
        profile,
        TurnKind::Speech,
        &ctx,
        &actor.memory,
        &engine.validator_config,
    )
    .await;

    emit_speech_stream(engine, game, &actor.agent_id, &outcome.text).await?;

    emit(
        engine,
        game,
        EventType::Speech,
        Some(actor.agent_id.clone()),
        None,
        serde_json::json!({"text": outcome.text, "was_fallback": outcome.was_fallback}),
    )
    .await?;

    emit_turn_end(engine, game, &actor.agent_id, "speech").await?;

    game.state.turn_index += 1;
    persist(engine, game).await?;
    Ok(StepOutcome { parked: false })
}

async fn step_voting(
    engine: &Engine,
    game: &mut Game,
    players: &[Player],
    rng: &mut dyn GameRng,
) -> AppResult<StepOutcome> {
    let order = game.state.voters_pending.clone();
    if game.state.turn_index >= order.len() {
        let votes = engine.store.list_votes(&game.id, game.round_no).await?;
        let pairs: Vec<(String, String)> = votes.iter().map(|v| (v.voter_id.clone(), v.target_id.clone())).collect();
        let (winner, tied) = tally_votes(&pairs);

        let resolved = match winner {
            Some(target) => target,
            None if game.phase == Phase::DayTiebreakVoting => resolve_tiebreak(&tied, rng),
            None => {
                set_phase(engine, game, Phase::DayTiebreakSpeaking).await?;
                game.state.tie_candidates = tied;
                game.state.turn_index = 0;
                persist(engine, game).await?;
                return Ok(StepOutcome { parked: false });
            }
        };

        emit(engine, game, EventType::VoteReveal, None, Some(resolved.clone()), serde_json::json!({}))
            .await?;
        game.state.night.deaths_last_night = vec![resolved];
        set_phase(engine, game, Phase::DayElimination).await?;
        persist(engine, game).await?;
        return Ok(StepOutcome { parked: false });
    }

    let agent_id = order[game.state.turn_index].clone();
    let actor = players.iter().find(|p| p.agent_id == agent_id).expect("turn order references a live seat");

    if actor.is_human {
        emit_turn_start(engine, game, &agent_id, "vote", VOTE_COUNTDOWN_SEC).await?;
        game.current_turn_player_id = Some(agent_id);
        persist(engine, game).await?;
        return Ok(StepOutcome { parked: true });
    }

    emit_turn_start(engine, game, &actor.agent_id, "vote", AI_COUNTDOWN_SEC).await?;

    let profile = actor
        .strategy_key
        .as_deref()
        .and_then(profile_for)
        .expect("ai seats always carry a strategy profile");

    let valid_seats = seat_numbers(players);
    let alive_seats = alive_seat_numbers(players);
    let is_tiebreak = matches!(game.phase, Phase::DayTiebreakSpeaking | Phase::DayTiebreakVoting);
    let deaths_last_night = game.state.night.deaths_last_night.clone();

    let ctx = TurnContext {
        agent_id: &actor.agent_id,
        round_no: game.round_no,
        is_tiebreak,
        speaker_seat: actor.seat_no,
        valid_seats: &valid_seats,
        alive_seats: &alive_seats,
        deaths_last_night: &deaths_last_night,
        system_prompt: "Cast your vote with a short reason in Chinese, citing only what you observed, and respond with JSON only: {\"vote_target\": <seat number>, \"reason\": \"...\"}.",
        user_prompt: "Who do you vote to eliminate, and why?",
    };

    let outcome = produce_turn(
        engine.llm.as_ref(),
        engine.retry,
        profile,
        TurnKind::Vote,
        &ctx,
        &actor.memory,
        &engine.validator_config,
    )
    .await;

    let target_agent = outcome
        .target_seat
        .and_then(|seat| players.iter().find(|p| p.seat_no == seat && p.alive && p.agent_id != actor.agent_id))
        .map(|p| p.agent_id.clone())
        .unwrap_or_else(|| {
            players
                .iter()
                .find(|p| p.alive && p.agent_id != actor.agent_id)
                .map(|p| p.agent_id.clone())
                .unwrap_or_else(|| actor.agent_id.clone())
        });

    let vote = crate::types::Vote {
        game_id: game.id.clone(),
        round_no: game.round_no,
        voter_id: actor.agent_id.clone(),
        target_id: target_agent.clone(),
        is_tiebreak: game.phase == Phase::DayTiebreakVoting,
        reason: outcome.text.clone(),
        cast_at: Utc::now(),
    };
    engine.store.record_vote(&vote).await?;

    emit(
        engine,
        game,
        EventType::Vote,
        Some(actor.agent_id.clone()),
        Some(target_agent),
        serde_json::json!({"reason": outcome.text}),
    )
    .await?;

    emit_turn_end(engine, game, &actor.agent_id, "vote").await?;

    game.state.turn_index += 1;
    persist(engine, game).await?;
    Ok(StepOutcome { parked: false })
}

async fn step_elimination(engine: &Engine, game: &mut Game, players: &mut [Player]) -> AppResult<()> {
    for target in game.state.night.deaths_last_night.clone() {
        if let Some(p) = players.iter_mut().find(|p| p.agent_id == target) {
            if p.alive {
                p.alive = false;
                engine.store.update_player(p).await?;
                emit(
                    engine,
                    game,
                    EventType::Elimination,
                    None,
                    Some(target.clone()),
                    serde_json::json!({"role": format!("{:?}", p.role)}),
                )
                .await?;
            }
        }
    }

    if let Some(winner) = check_winner(players) {
        finish_game(engine, game, winner).await?;
    } else {
        game.round_no += 1;
        set_phase(engine, game, Phase::NightWolf).await?;
        game.state = Default::default();
        game.state.turn_order = players.iter().filter(|p| p.alive).map(|p| p.agent_id.clone()).collect();
    }

    persist(engine, game).await
}

/// Resolved purely for observability: the seer's nightly result is derived
/// from the target's role and attached to `NightState` so the adapter's
/// next prompt can reference it.
pub fn attach_seer_result(game: &mut Game, players: &[Player]) {
    if let Some(target) = game.state.night.seer_check_target.clone() {
        if let Some(role) = players.iter().find(|p| p.agent_id == target).map(|p| p.role) {
            game.state.night.seer_result = Some(seer_result_for(role));
        }
    }
}

/// Records the human seat's speech for the current turn, validated the
/// same way an AI-produced speech is, then clears the parked turn.
pub async fn record_human_speech(engine: &Engine, game_id: &str, agent_id: &str, text: &str) -> AppResult<()> {
    let mut game = engine.store.get_game(game_id).await?;
    let mut players = engine.store.get_players(game_id).await?;
    let valid_seats = seat_numbers(&players);
    let alive_seats = alive_seat_numbers(&players);
    let deaths_last_night = game.state.night.deaths_last_night.clone();

    let actor = players
        .iter_mut()
        .find(|p| p.agent_id == agent_id)
        .ok_or_else(|| crate::error::AppError::CallerMisuse(format!("no such player: {agent_id}")))?;

    let vctx = crate::validator::UtteranceContext {
        speaker_seat: actor.seat_no,
        valid_seats: &valid_seats,
        alive_seats: &alive_seats,
        round_no: game.round_no,
        deaths_last_night: &deaths_last_night,
        own_history: &actor.memory.speech_history,
        banned_phrases: &[],
    };
    crate::validator::validate_speech(text, &vctx, &engine.validator_config)
        .map_err(|reason| crate::error::AppError::CallerMisuse(format!("speech rejected: {reason:?}")))?;

    actor.memory.speech_history.push(text.to_string());
    actor.memory.push_phrase(text.to_string());
    let actor_agent_id = actor.agent_id.clone();
    engine.store.update_player(actor).await?;

    emit_speech_stream(engine, &game, &actor_agent_id, text).await?;

    emit(
        engine,
        &game,
        EventType::Speech,
        Some(actor_agent_id.clone()),
        None,
        serde_json::json!({"text": text, "was_fallback": false}),
    )
    .await?;

    emit_turn_end(engine, &game, &actor_agent_id, "speech").await?;

    game.state.turn_index += 1;
    game.current_turn_player_id = None;
    persist(engine, &game).await
}

/// Records the human seat's vote for the current round, validated the same
/// way an AI-produced vote reason is, then clears the parked turn.
pub async fn record_human_vote(
    engine: &Engine,
    game_id: &str,
    agent_id: &str,
    target_agent_id: &str,
    reason: &str,
) -> AppResult<()> {
    let mut game = engine.store.get_game(game_id).await?;
    let players = engine.store.get_players(game_id).await?;
    let actor = players
        .iter()
        .find(|p| p.agent_id == agent_id)
        .ok_or_else(|| crate::error::AppError::CallerMisuse(format!("no such player: {agent_id}")))?;

    if !players.iter().any(|p| p.agent_id == target_agent_id && p.alive) {
        return Err(crate::error::AppError::CallerMisuse("vote target must be a living seat".to_string()));
    }

    let existing = engine.store.list_votes(game_id, game.round_no).await?;
    if let Some(prior) = existing.iter().find(|v| v.voter_id == agent_id) {
        let since = Utc::now().signed_duration_since(prior.cast_at);
        if since.num_milliseconds() >= 0 && since.num_milliseconds() < engine.config.vote_grace_period_ms as i64 {
            return Ok(());
        }
    }

    let valid_seats = seat_numbers(&players);
    let alive_seats = alive_seat_numbers(&players);
    let deaths_last_night = game.state.night.deaths_last_night.clone();

    let vctx = crate::validator::UtteranceContext {
        speaker_seat: actor.seat_no,
        valid_seats: &valid_seats,
        alive_seats: &alive_seats,
        round_no: game.round_no,
        deaths_last_night: &deaths_last_night,
        own_history: &actor.memory.speech_history,
        banned_phrases: &[],
    };
    crate::validator::validate_vote_reason(reason, &vctx, &engine.validator_config)
        .map_err(|r| crate::error::AppError::CallerMisuse(format!("vote reason rejected: {r:?}")))?;

    let vote = crate::types::Vote {
        game_id: game.id.clone(),
        round_no: game.round_no,
        voter_id: actor.agent_id.clone(),
        target_id: target_agent_id.to_string(),
        is_tiebreak: game.phase == Phase::DayTiebreakVoting,
        reason: reason.to_string(),
        cast_at: Utc::now(),
    };
    engine.store.record_vote(&vote).await?;

    emit(
        engine,
        &game,
        EventType::Vote,
        Some(actor.agent_id.clone()),
        Some(target_agent_id.to_string()),
        serde_json::json!({"reason": reason}),
    )
    .await?;

    emit_turn_end(engine, &game, &actor.agent_id, "vote").await?;

    game.state.turn_index += 1;
    game.current_turn_player_id = None;
    persist(engine, &game).await
}

/// Records the human seat's night action (werewolf kill target, seer
/// check, or witch heal/poison) for the phase it was submitted in.
pub async fn record_human_night_action(
    engine: &Engine,
    game: &mut Game,
    players: &[Player],
    agent_id: &str,
    target_agent_id: Option<&str>,
) -> AppResult<()> {
    let actor_role = players
        .iter()
        .find(|p| p.agent_id == agent_id)
        .map(|p| p.role)
        .ok_or_else(|| crate::error::AppError::CallerMisuse(format!("no such player: {agent_id}")))?;

    apply_night_action(game, actor_role, agent_id, target_agent_id.map(str::to_string));

    emit(
        engine,
        game,
        EventType::NightAction,
        Some(agent_id.to_string()),
        target_agent_id.map(str::to_string),
        serde_json::json!({"role": format!("{actor_role:?}")}),
    )
    .await?;

    emit_turn_end(engine, game, agent_id, "night").await?;

    game.current_turn_player_id = None;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::error::{AppError, AppResult};
    use crate::events::BroadcastEmitter;
    use crate::llm::{Decode, LlmClient};
    use crate::rng::SeededGameRng;
    use crate::store::{InMemoryStore, StateStore};
    use crate::types::{DecodeConfig, GameStatus, PlayerMemory};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct AlwaysErrorClient;

    #[async_trait]
    impl LlmClient for AlwaysErrorClient {
        async fn chat_json(&self, _system: &str, _user: &str, _decode: Decode) -> AppResult<String> {
            Err(AppError::LlmTransport("test double never answers".to_string()))
        }
    }

    fn test_engine() -> Engine {
        let mut config = EngineConfig::default();
        config.llm_max_retries = 1;
        config.llm_retry_backoff_ms = 1;
        Engine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(BroadcastEmitter::new(32)),
            Arc::new(AlwaysErrorClient),
            config,
        )
    }

    fn ai_player(agent_id: &str, role: RoleType, seat_no: u8, strategy_key: &str) -> Player {
        Player {
            game_id: "g-1".to_string(),
            agent_id: agent_id.to_string(),
            is_human: false,
            role,
            alive: true,
            seat_no,
            strategy_key: Some(strategy_key.to_string()),
            decode_config: Some(DecodeConfig {
                temperature: 0.7,
                top_p: 0.9,
                presence_penalty: 0.0,
                frequency_penalty: 0.0,
            }),
            memory: PlayerMemory::default(),
            emotion_state: "neutral".to_string(),
        }
    }

    fn six_players() -> Vec<Player> {
        vec![
            Player {
                game_id: "g-1".to_string(),
                agent_id: "human-1".to_string(),
                is_human: true,
                role: RoleType::Villager,
                alive: true,
                seat_no: 1,
                strategy_key: None,
                decode_config: None,
                memory: PlayerMemory::default(),
                emotion_state: "neutral".to_string(),
            },
            ai_player("ai-2", RoleType::Werewolf, 2, "aggressive_analyst"),
            ai_player("ai-3", RoleType::Werewolf, 3, "steady_conservative"),
            ai_player("ai-4", RoleType::Seer, 4, "social_blender"),
            ai_player("ai-5", RoleType::Witch, 5, "chaos_disruptor"),
            ai_player("ai-6", RoleType::Villager, 6, "adaptive_deceiver"),
        ]
    }

    fn game_at(phase: Phase, players: &[Player]) -> Game {
        let turn_order: Vec<String> = players.iter().map(|p| p.agent_id.clone()).collect();
        let now = Utc::now();
        Game {
            id: "g-1".to_string(),
            workspace_id: "ws-1".to_string(),
            status: GameStatus::Running,
            phase,
            round_no: 2,
            human_agent_id: Some("human-1".to_string()),
            group_id: "group-1".to_string(),
            current_turn_player_id: None,
            winner_side: None,
            state: crate::types::GameStateBlob {
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
        }
    }

    #[tokio::test]
    async fn speaking_phase_parks_at_the_human_seat() {
        let engine = test_engine();
        let players = six_players();
        let game = game_at(Phase::DaySpeaking, &players);
        engine.store.create_game(&game, &players).await.unwrap();

        let mut rng = SeededGameRng::from_game_id("g-1");
        advance(&engine, "g-1", &mut rng).await.unwrap();

        let reloaded = engine.store.get_game("g-1").await.unwrap();
        assert_eq!(reloaded.current_turn_player_id.as_deref(), Some("human-1"));
        assert_eq!(reloaded.phase, Phase::DaySpeaking);
    }

    #[tokio::test]
    async fn human_speech_then_advance_runs_ai_turns_with_fallback_text() {
        let engine = test_engine();
        let players = six_players();
        let game = game_at(Phase::DaySpeaking, &players);
        engine.store.create_game(&game, &players).await.unwrap();

        let mut rng = SeededGameRng::from_game_id("g-2");
        advance(&engine, "g-1", &mut rng).await.unwrap();

        record_human_speech(
            &engine,
            "g-1",
            "human-1",
            "Seat 2 has been quiet and that feels suspicious to me this round.",
        )
        .await
        .unwrap();

        advance(&engine, "g-1", &mut rng).await.unwrap();

        let reloaded = engine.store.get_game("g-1").await.unwrap();
        // every AI seat runs through the speaking phase on a client that
        // never answers, so they all land on the deterministic fallback and
        // the game reaches voting, parking at the human seat again.
        assert_eq!(reloaded.phase, Phase::DayVoting);
        assert_eq!(reloaded.current_turn_player_id.as_deref(), Some("human-1"));

        let events = engine.store.list_events("g-1").await.unwrap();
        let speeches: Vec<_> = events.iter().filter(|e| e.event_type == EventType::Speech).collect();
        assert_eq!(speeches.len(), 6);

        let deltas: Vec<_> = events.iter().filter(|e| e.event_type == EventType::SpeechDelta).collect();
        assert!(!deltas.is_empty());
    }

    #[tokio::test]
    async fn night_wolf_phase_parks_when_a_werewolf_seat_is_human() {
        let engine = test_engine();
        let mut players = six_players();
        // swap the human into the werewolf seat so the night phase must
        // park rather than resolve purely through AI fallbacks.
        players[0].role = RoleType::Werewolf;
        players[1].role = RoleType::Villager;
        let game = game_at(Phase::NightWolf, &players);
        engine.store.create_game(&game, &players).await.unwrap();

        let mut rng = SeededGameRng::from_game_id("g-3");
        advance(&engine, "g-1", &mut rng).await.unwrap();

        let reloaded = engine.store.get_game("g-1").await.unwrap();
        assert_eq!(reloaded.current_turn_player_id.as_deref(), Some("human-1"));
        assert_eq!(reloaded.phase, Phase::NightWolf);
    }

    #[tokio::test]
    async fn vote_grace_period_ignores_immediate_resubmission() {
        let engine = test_engine();
        let players = six_players();
        let mut game = game_at(Phase::DayVoting, &players);
        game.state.voters_pending = players.iter().map(|p| p.agent_id.clone()).collect();
        engine.store.create_game(&game, &players).await.unwrap();

        record_human_vote(&engine, "g-1", "human-1", "ai-2", "Seat 2 voted oddly so I suspect them.")
            .await
            .unwrap();
        record_human_vote(&engine, "g-1", "human-1", "ai-3", "Actually seat 3 seems more suspicious.")
            .await
            .unwrap();

        let votes = engine.store.list_votes("g-1", 2).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].target_id, "ai-2");
    }

    #[tokio::test]
    async fn day_announce_ends_the_game_on_wolf_parity_before_any_speaking() {
        let engine = test_engine();
        let mut players = six_players();
        // two wolves alive against exactly two non-wolves: parity reached.
        players[0].alive = false; // seer seat dead
        players[3].role = RoleType::Villager;
        players[3].alive = false;
        players[5].alive = false;
        let game = game_at(Phase::DayAnnounce, &players);
        engine.store.create_game(&game, &players).await.unwrap();

        let mut rng = SeededGameRng::from_game_id("g-4");
        advance(&engine, "g-1", &mut rng).await.unwrap();

        let reloaded = engine.store.get_game("g-1").await.unwrap();
        assert_eq!(reloaded.phase, Phase::GameOver);
        assert_eq!(reloaded.winner_side, Some(Faction::WerewolfSide));

        let events = engine.store.list_events("g-1").await.unwrap();
        assert!(!events.iter().any(|e| e.event_type == EventType::Speech));
    }
}
