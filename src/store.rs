use crate::error::{AppError, AppResult};
use crate::types::{Game, GameId, Player, PlayerId, Review, RoundEvent, Vote};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Durable state for games, players, votes, events and reviews. Two
/// implementations: `InMemoryStore` for tests and `SqlxStore` for
/// production, over five tables (games, players, votes, round_events,
/// reviews) — the append-only event log carries enough detail that no
/// separate per-action-kind tables are needed.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn create_game(&self, game: &Game, players: &[Player]) -> AppResult<()>;
    async fn get_game(&self, game_id: &str) -> AppResult<Game>;
    async fn update_game(&self, game: &Game) -> AppResult<()>;
    async fn list_games(&self, workspace_id: &str) -> AppResult<Vec<Game>>;

    async fn get_players(&self, game_id: &str) -> AppResult<Vec<Player>>;
    async fn update_player(&self, player: &Player) -> AppResult<()>;

    async fn append_event(&self, event: &RoundEvent) -> AppResult<()>;
    async fn list_events(&self, game_id: &str) -> AppResult<Vec<RoundEvent>>;
    async fn next_seq(&self, game_id: &str) -> AppResult<u64>;

    async fn record_vote(&self, vote: &Vote) -> AppResult<()>;
    async fn list_votes(&self, game_id: &str, round_no: u32) -> AppResult<Vec<Vote>>;

    async fn save_review(&self, review: &Review) -> AppResult<()>;
    async fn get_review(&self, game_id: &str) -> AppResult<Option<Review>>;
}

#[derive(Default)]
struct InMemoryTables {
    games: HashMap<GameId, Game>,
    players: HashMap<GameId, Vec<Player>>,
    events: HashMap<GameId, Vec<RoundEvent>>,
    votes: HashMap<GameId, Vec<Vote>>,
    reviews: HashMap<GameId, Review>,
}

pub struct InMemoryStore {
    tables: Arc<Mutex<InMemoryTables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(InMemoryTables::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn create_game(&self, game: &Game, players: &[Player]) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.games.insert(game.id.clone(), game.clone());
        tables.players.insert(game.id.clone(), players.to_vec());
        tables.events.entry(game.id.clone()).or_default();
        tables.votes.entry(game.id.clone()).or_default();
        Ok(())
    }

    async fn get_game(&self, game_id: &str) -> AppResult<Game> {
        let tables = self.tables.lock().await;
        tables
            .games
            .get(game_id)
            .cloned()
            .ok_or_else(|| AppError::CallerMisuse(format!("no such game: {game_id}")))
    }

    async fn update_game(&self, game: &Game) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if !tables.games.contains_key(&game.id) {
            return Err(AppError::CallerMisuse(format!("no such game: {}", game.id)));
        }
        tables.games.insert(game.id.clone(), game.clone());
        Ok(())
    }

    async fn list_games(&self, workspace_id: &str) -> AppResult<Vec<Game>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .games
            .values()
            .filter(|g| g.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn get_players(&self, game_id: &str) -> AppResult<Vec<Player>> {
        let tables = self.tables.lock().await;
        tables
            .players
            .get(game_id)
            .cloned()
            .ok_or_else(|| AppError::CallerMisuse(format!("no such game: {game_id}")))
    }

    async fn update_player(&self, player: &Player) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        let players = tables
            .players
            .get_mut(&player.game_id)
            .ok_or_else(|| AppError::CallerMisuse(format!("no such game: {}", player.game_id)))?;
        match players.iter_mut().find(|p| p.agent_id == player.agent_id) {
            Some(slot) => {
                *slot = player.clone();
                Ok(())
            }
            None => Err(AppError::CallerMisuse(format!(
                "no such player: {}",
                player.agent_id
            ))),
        }
    }

    async fn append_event(&self, event: &RoundEvent) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .events
            .entry(event.game_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn list_events(&self, game_id: &str) -> AppResult<Vec<RoundEvent>> {
        let tables = self.tables.lock().await;
        Ok(tables.events.get(game_id).cloned().unwrap_or_default())
    }

    async fn next_seq(&self, game_id: &str) -> AppResult<u64> {
        let tables = self.tables.lock().await;
        Ok(tables.events.get(game_id).map(|e| e.len() as u64).unwrap_or(0))
    }

    async fn record_vote(&self, vote: &Vote) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .votes
            .entry(vote.game_id.clone())
            .or_default()
            .push(vote.clone());
        Ok(())
    }

    async fn list_votes(&self, game_id: &str, round_no: u32) -> AppResult<Vec<Vote>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .votes
            .get(game_id)
            .map(|votes| votes.iter().filter(|v| v.round_no == round_no).cloned().collect())
            .unwrap_or_default())
    }

    async fn save_review(&self, review: &Review) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        tables.reviews.insert(review.game_id.clone(), review.clone());
        Ok(())
    }

    async fn get_review(&self, game_id: &str) -> AppResult<Option<Review>> {
        let tables = self.tables.lock().await;
        Ok(tables.reviews.get(game_id).cloned())
    }
}

pub mod sqlite {
    use super::*;
    use crate::types::{DecodeConfig, Faction, Game, GameStateBlob, GameStatus, Phase, PlayerMemory, Review, ReviewSummary, RoleType};
    use chrono::{DateTime, Utc};
    use sqlx::sqlite::SqliteRow;
    use sqlx::{Row, SqlitePool};

    /// `sqlx`-backed implementation of `StateStore`, following the
    /// teacher's `GameRepository` query shape, adapted to the five-table
    /// layout this crate's append-only event log implies.
    pub struct SqlxStore {
        pool: SqlitePool,
    }

    impl SqlxStore {
        pub fn new(pool: SqlitePool) -> Self {
            Self { pool }
        }

        pub async fn run_migrations(&self) -> AppResult<()> {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS games (
                    id TEXT PRIMARY KEY,
                    workspace_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    phase TEXT NOT NULL,
                    round_no INTEGER NOT NULL,
                    human_agent_id TEXT,
                    group_id TEXT NOT NULL,
                    current_turn_player_id TEXT,
                    winner_side TEXT,
                    state TEXT NOT NULL,
                    created_at DATETIME NOT NULL,
                    updated_at DATETIME NOT NULL,
                    ended_at DATETIME
                )
                "#,
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS players (
                    game_id TEXT NOT NULL,
                    agent_id TEXT NOT NULL,
                    is_human BOOLEAN NOT NULL,
                    role TEXT NOT NULL,
                    alive BOOLEAN NOT NULL,
                    seat_no INTEGER NOT NULL,
                    strategy_key TEXT,
                    decode_config TEXT,
                    memory TEXT NOT NULL,
                    emotion_state TEXT NOT NULL,
                    PRIMARY KEY (game_id, agent_id)
                )
                "#,
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS votes (
                    game_id TEXT NOT NULL,
                    round_no INTEGER NOT NULL,
                    voter_id TEXT NOT NULL,
                    target_id TEXT NOT NULL,
                    is_tiebreak BOOLEAN NOT NULL,
                    reason TEXT NOT NULL,
                    cast_at DATETIME NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS round_events (
                    id TEXT PRIMARY KEY,
                    game_id TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    round_no INTEGER NOT NULL,
                    phase TEXT NOT NULL,
                    event_type TEXT NOT NULL,
                    actor_id TEXT,
                    target_id TEXT,
                    payload TEXT NOT NULL,
                    created_at DATETIME NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS reviews (
                    game_id TEXT PRIMARY KEY,
                    summary TEXT NOT NULL,
                    narrative TEXT NOT NULL
                )
                "#,
            )
            .execute(&self.pool)
            .await?;

            Ok(())
        }

        async fn row_count(&self, table: &str, game_id: &str) -> AppResult<i64> {
            let query = format!("SELECT COUNT(*) as c FROM {table} WHERE game_id = ?");
            let row = sqlx::query(&query).bind(game_id).fetch_one(&self.pool).await?;
            Ok(row.try_get::<i64, _>("c")?)
        }
    }

    fn decode_game(row: &SqliteRow) -> AppResult<Game> {
        let status: String = row.try_get("status")?;
        let phase: String = row.try_get("phase")?;
        let state: String = row.try_get("state")?;
        let winner_side: Option<String> = row.try_get("winner_side")?;

        Ok(Game {
            id: row.try_get("id")?,
            workspace_id: row.try_get("workspace_id")?,
            status: serde_json::from_str::<GameStatus>(&status)?,
            phase: serde_json::from_str::<Phase>(&phase)?,
            round_no: row.try_get::<i64, _>("round_no")? as u32,
            human_agent_id: row.try_get("human_agent_id")?,
            group_id: row.try_get("group_id")?,
            current_turn_player_id: row.try_get("current_turn_player_id")?,
            winner_side: winner_side.map(|s| serde_json::from_str::<Faction>(&s)).transpose()?,
            state: serde_json::from_str::<GameStateBlob>(&state)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            ended_at: row.try_get::<Option<DateTime<Utc>>, _>("ended_at")?,
        })
    }

    fn decode_player(row: &SqliteRow) -> AppResult<Player> {
        let role: String = row.try_get("role")?;
        let decode_config: Option<String> = row.try_get("decode_config")?;
        let memory: String = row.try_get("memory")?;

        Ok(Player {
            game_id: row.try_get("game_id")?,
            agent_id: row.try_get("agent_id")?,
            is_human: row.try_get("is_human")?,
            role: serde_json::from_str::<RoleType>(&role)?,
            alive: row.try_get("alive")?,
            seat_no: row.try_get::<i64, _>("seat_no")? as u8,
            strategy_key: row.try_get("strategy_key")?,
            decode_config: decode_config.map(|d| serde_json::from_str::<DecodeConfig>(&d)).transpose()?,
            memory: serde_json::from_str::<PlayerMemory>(&memory)?,
            emotion_state: row.try_get("emotion_state")?,
        })
    }

    fn decode_vote(row: &SqliteRow) -> AppResult<Vote> {
        Ok(Vote {
            game_id: row.try_get("game_id")?,
            round_no: row.try_get::<i64, _>("round_no")? as u32,
            voter_id: row.try_get("voter_id")?,
            target_id: row.try_get("target_id")?,
            is_tiebreak: row.try_get("is_tiebreak")?,
            reason: row.try_get("reason")?,
            cast_at: row.try_get::<DateTime<Utc>, _>("cast_at")?,
        })
    }

    fn decode_event(row: &SqliteRow) -> AppResult<RoundEvent> {
        let phase: String = row.try_get("phase")?;
        let event_type: String = row.try_get("event_type")?;
        let payload: String = row.try_get("payload")?;

        Ok(RoundEvent {
            id: row.try_get("id")?,
            game_id: row.try_get("game_id")?,
            seq: row.try_get::<i64, _>("seq")? as u64,
            round_no: row.try_get::<i64, _>("round_no")? as u32,
            phase: serde_json::from_str::<Phase>(&phase)?,
            event_type: serde_json::from_str::<crate::types::EventType>(&event_type)?,
            actor_id: row.try_get("actor_id")?,
            target_id: row.try_get("target_id")?,
            payload: serde_json::from_str(&payload)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn decode_review(row: &SqliteRow) -> AppResult<Review> {
        let summary: String = row.try_get("summary")?;
        let narrative: String = row.try_get("narrative")?;

        Ok(Review {
            game_id: row.try_get("game_id")?,
            summary: serde_json::from_str::<ReviewSummary>(&summary)?,
            narrative: serde_json::from_str::<Vec<String>>(&narrative)?,
        })
    }

    #[async_trait]
    impl StateStore for SqlxStore {
        async fn create_game(&self, game: &Game, players: &[Player]) -> AppResult<()> {
            let state_json = serde_json::to_string(&game.state)?;
            sqlx::query(
                r#"
                INSERT INTO games (id, workspace_id, status, phase, round_no, human_agent_id,
                    group_id, current_turn_player_id, winner_side, state, created_at, updated_at, ended_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&game.id)
            .bind(&game.workspace_id)
            .bind(serde_json::to_string(&game.status)?)
            .bind(serde_json::to_string(&game.phase)?)
            .bind(game.round_no)
            .bind(&game.human_agent_id)
            .bind(&game.group_id)
            .bind(&game.current_turn_player_id)
            .bind(game.winner_side.map(|f| serde_json::to_string(&f)).transpose()?)
            .bind(state_json)
            .bind(game.created_at)
            .bind(game.updated_at)
            .bind(game.ended_at)
            .execute(&self.pool)
            .await?;

            for player in players {
                self.update_player(player).await?;
            }
            Ok(())
        }

        async fn get_game(&self, game_id: &str) -> AppResult<Game> {
            let row = sqlx::query("SELECT * FROM games WHERE id = ?")
                .bind(game_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::CallerMisuse(format!("no such game: {game_id}")))?;
            decode_game(&row)
        }

        async fn update_game(&self, game: &Game) -> AppResult<()> {
            let state_json = serde_json::to_string(&game.state)?;
            sqlx::query(
                r#"
                UPDATE games SET status = ?, phase = ?, round_no = ?, current_turn_player_id = ?,
                    winner_side = ?, state = ?, updated_at = ?, ended_at = ?
                WHERE id = ?
                "#,
            )
            .bind(serde_json::to_string(&game.status)?)
            .bind(serde_json::to_string(&game.phase)?)
            .bind(game.round_no)
            .bind(&game.current_turn_player_id)
            .bind(game.winner_side.map(|f| serde_json::to_string(&f)).transpose()?)
            .bind(state_json)
            .bind(game.updated_at)
            .bind(game.ended_at)
            .bind(&game.id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_games(&self, workspace_id: &str) -> AppResult<Vec<Game>> {
            let rows = sqlx::query("SELECT * FROM games WHERE workspace_id = ?")
                .bind(workspace_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(decode_game).collect()
        }

        async fn get_players(&self, game_id: &str) -> AppResult<Vec<Player>> {
            let rows = sqlx::query("SELECT * FROM players WHERE game_id = ?")
                .bind(game_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(decode_player).collect()
        }

        async fn update_player(&self, player: &Player) -> AppResult<()> {
            sqlx::query(
                r#"
                INSERT INTO players (game_id, agent_id, is_human, role, alive, seat_no,
                    strategy_key, decode_config, memory, emotion_state)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(game_id, agent_id) DO UPDATE SET
                    alive = excluded.alive,
                    memory = excluded.memory,
                    emotion_state = excluded.emotion_state
                "#,
            )
            .bind(&player.game_id)
            .bind(&player.agent_id)
            .bind(player.is_human)
            .bind(serde_json::to_string(&player.role)?)
            .bind(player.alive)
            .bind(player.seat_no)
            .bind(&player.strategy_key)
            .bind(player.decode_config.map(|d| serde_json::to_string(&d)).transpose()?)
            .bind(serde_json::to_string(&player.memory)?)
            .bind(&player.emotion_state)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn append_event(&self, event: &RoundEvent) -> AppResult<()> {
            sqlx::query(
                r#"
                INSERT INTO round_events (id, game_id, seq, round_no, phase, event_type,
                    actor_id, target_id, payload, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&event.id)
            .bind(&event.game_id)
            .bind(event.seq as i64)
            .bind(event.round_no)
            .bind(serde_json::to_string(&event.phase)?)
            .bind(serde_json::to_string(&event.event_type)?)
            .bind(&event.actor_id)
            .bind(&event.target_id)
            .bind(serde_json::to_string(&event.payload)?)
            .bind(event.created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_events(&self, game_id: &str) -> AppResult<Vec<RoundEvent>> {
            let rows = sqlx::query("SELECT * FROM round_events WHERE game_id = ? ORDER BY seq ASC")
                .bind(game_id)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(decode_event).collect()
        }

        async fn next_seq(&self, game_id: &str) -> AppResult<u64> {
            Ok(self.row_count("round_events", game_id).await? as u64)
        }

        async fn record_vote(&self, vote: &Vote) -> AppResult<()> {
            sqlx::query(
                r#"
                INSERT INTO votes (game_id, round_no, voter_id, target_id, is_tiebreak, reason, cast_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&vote.game_id)
            .bind(vote.round_no)
            .bind(&vote.voter_id)
            .bind(&vote.target_id)
            .bind(vote.is_tiebreak)
            .bind(&vote.reason)
            .bind(vote.cast_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_votes(&self, game_id: &str, round_no: u32) -> AppResult<Vec<Vote>> {
            let rows = sqlx::query("SELECT * FROM votes WHERE game_id = ? AND round_no = ? ORDER BY cast_at ASC")
                .bind(game_id)
                .bind(round_no)
                .fetch_all(&self.pool)
                .await?;
            rows.iter().map(decode_vote).collect()
        }

        async fn save_review(&self, review: &Review) -> AppResult<()> {
            sqlx::query(
                r#"
                INSERT INTO reviews (game_id, summary, narrative)
                VALUES (?, ?, ?)
                ON CONFLICT(game_id) DO UPDATE SET summary = excluded.summary, narrative = excluded.narrative
                "#,
            )
            .bind(&review.game_id)
            .bind(serde_json::to_string(&review.summary)?)
            .bind(serde_json::to_string(&review.narrative)?)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn get_review(&self, game_id: &str) -> AppResult<Option<Review>> {
            let row = sqlx::query("SELECT * FROM reviews WHERE game_id = ?")
                .bind(game_id)
                .fetch_optional(&self.pool)
                .await?;
            row.as_ref().map(decode_review).transpose()
        }
    }
}
