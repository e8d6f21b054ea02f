use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type PlayerId = String;
pub type GameId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    WerewolfSide,
    GoodSide,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleType {
    Werewolf,
    Seer,
    Witch,
    Villager,
}

impl RoleType {
    pub fn faction(self) -> Faction {
        match self {
            RoleType::Werewolf => Faction::WerewolfSide,
            _ => Faction::GoodSide,
        }
    }

    pub fn has_night_action(self) -> bool {
        matches!(self, RoleType::Werewolf | RoleType::Seer | RoleType::Witch)
    }
}

/// Fixed six-seat distribution: werewolf x2, seer x1, witch x1, villager x2.
/// No hunter, no guard.
pub const ROLE_POOL: [RoleType; 6] = [
    RoleType::Werewolf,
    RoleType::Werewolf,
    RoleType::Seer,
    RoleType::Witch,
    RoleType::Villager,
    RoleType::Villager,
];

pub const AI_COUNT: usize = 5;

/// Fixed order in which strategy slots are assigned to the five ephemeral
/// AI seats.
pub const STRATEGY_SLOTS: [&str; AI_COUNT] = [
    "aggressive_analyst",
    "steady_conservative",
    "social_blender",
    "chaos_disruptor",
    "adaptive_deceiver",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NightWolf,
    NightSeer,
    NightWitch,
    DayAnnounce,
    DaySpeaking,
    DayVoting,
    DayTiebreakSpeaking,
    DayTiebreakVoting,
    DayElimination,
    GameOver,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::GameOver)
    }

    pub fn is_night(self) -> bool {
        matches!(self, Phase::NightWolf | Phase::NightSeer | Phase::NightWitch)
    }

    pub fn is_voting(self) -> bool {
        matches!(self, Phase::DayVoting | Phase::DayTiebreakVoting)
    }

    pub fn is_speaking(self) -> bool {
        matches!(self, Phase::DaySpeaking | Phase::DayTiebreakSpeaking)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Running,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: GameId,
    pub workspace_id: String,
    pub status: GameStatus,
    pub phase: Phase,
    pub round_no: u32,
    pub human_agent_id: Option<PlayerId>,
    pub group_id: String,
    pub current_turn_player_id: Option<PlayerId>,
    pub winner_side: Option<Faction>,
    pub state: GameStateBlob,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// In-memory form of the opaque `state` JSON blob persisted alongside `Game`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameStateBlob {
    pub turn_order: Vec<PlayerId>,
    pub turn_index: usize,
    pub voters_pending: Vec<PlayerId>,
    pub tie_candidates: Vec<PlayerId>,
    pub is_tiebreak: bool,
    pub night: NightState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NightState {
    pub wolf_votes: HashMap<PlayerId, PlayerId>,
    pub pending_kill: Option<PlayerId>,
    pub seer_check_target: Option<PlayerId>,
    pub seer_result: Option<SeerResult>,
    pub witch_heal_used: bool,
    pub witch_poison_used: bool,
    pub witch_saved: bool,
    pub witch_poison_target: Option<PlayerId>,
    pub deaths_last_night: Vec<PlayerId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeerResult {
    Werewolf,
    Good,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub game_id: GameId,
    pub agent_id: PlayerId,
    pub is_human: bool,
    pub role: RoleType,
    pub alive: bool,
    pub seat_no: u8,
    pub strategy_key: Option<String>,
    pub decode_config: Option<DecodeConfig>,
    pub memory: PlayerMemory,
    pub emotion_state: String,
}

impl Player {
    pub fn faction(&self) -> Faction {
        self.role.faction()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecodeConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerMemory {
    pub suspect_map: HashMap<PlayerId, f32>,
    pub focus_targets: Vec<PlayerId>,
    pub self_risk: f32,
    pub last_phrases: Vec<String>,
    pub speech_skips_used: u32,
    pub vote_history: Vec<Vote>,
    pub speech_history: Vec<String>,
}

impl PlayerMemory {
    pub const MAX_LAST_PHRASES: usize = 8;

    pub fn push_phrase(&mut self, phrase: String) {
        self.last_phrases.push(phrase);
        if self.last_phrases.len() > Self::MAX_LAST_PHRASES {
            self.last_phrases.remove(0);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub game_id: GameId,
    pub round_no: u32,
    pub voter_id: PlayerId,
    pub target_id: PlayerId,
    pub is_tiebreak: bool,
    pub reason: String,
    pub cast_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PhaseChange,
    TurnStart,
    TurnEnd,
    Speech,
    SpeechDelta,
    SpeechSkip,
    Vote,
    VoteReveal,
    Elimination,
    NightAction,
    DayAnnounce,
    DeathReveal,
    EmotionUpdate,
    GmNotice,
    GameCreated,
    Countdown,
    TimelineTick,
    Cinematic,
    GameOver,
}

/// Append-only; creation order is the canonical timeline, `seq` is the
/// cursor late-joining subscribers replay from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEvent {
    pub id: String,
    pub game_id: GameId,
    pub seq: u64,
    pub round_no: u32,
    pub phase: Phase,
    pub event_type: EventType,
    pub actor_id: Option<PlayerId>,
    pub target_id: Option<PlayerId>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub game_id: GameId,
    pub summary: ReviewSummary,
    pub narrative: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub total_speeches: u32,
    pub total_votes: u32,
    pub per_seat: Vec<SeatStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatStatistics {
    pub agent_id: PlayerId,
    pub seat_no: u8,
    pub votes_cast: u32,
    pub votes_on_werewolf: u32,
    pub votes_received: u32,
}
