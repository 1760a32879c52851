use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, LeaderboardResponse, LeaderboardRow, Registration, UserId, UserStats};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredUser {
    #[serde(rename = "displayName", alias = "display_name")]
    display_name: String,
    handle: String,
    rating: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct StoredScore {
    points: i64,
    battles: u64,
    #[serde(rename = "firstSolves", alias = "first_solves")]
    first_solves: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u8,
    users: HashMap<String, StoredUser>,
    scores: HashMap<String, StoredScore>,
}

/// Durable registration and score table keyed by (chat, user), persisted as a
/// versioned JSON file. Every mutation saves before returning; write failures
/// are logged and swallowed.
pub struct PointsStore {
    file_path: PathBuf,
    users: HashMap<(ChatId, UserId), StoredUser>,
    scores: HashMap<(ChatId, UserId), StoredScore>,
}

impl PointsStore {
    pub fn new(file_path: PathBuf) -> Self {
        let (users, scores) = load_tables(&file_path);
        Self {
            file_path,
            users,
            scores,
        }
    }

    pub fn upsert_registration(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        display_name: &str,
        handle: &str,
        rating: i64,
    ) {
        self.users.insert(
            (chat_id, user_id),
            StoredUser {
                display_name: display_name.trim().to_string(),
                handle: handle.trim().to_string(),
                rating,
            },
        );
        self.scores.entry((chat_id, user_id)).or_default();
        self.save();
    }

    pub fn registration(&self, chat_id: ChatId, user_id: UserId) -> Option<Registration> {
        self.users.get(&(chat_id, user_id)).map(|user| Registration {
            user_id,
            display_name: user.display_name.clone(),
            handle: user.handle.clone(),
            rating: user.rating,
        })
    }

    /// All registrations for a chat, highest rating first.
    pub fn registrations(&self, chat_id: ChatId) -> Vec<Registration> {
        let mut rows: Vec<Registration> = self
            .users
            .iter()
            .filter(|((chat, _), _)| *chat == chat_id)
            .map(|((_, user_id), user)| Registration {
                user_id: *user_id,
                display_name: user.display_name.clone(),
                handle: user.handle.clone(),
                rating: user.rating,
            })
            .collect();
        rows.sort_by(|a, b| b.rating.cmp(&a.rating).then_with(|| cmp_handle(a, b)));
        rows
    }

    pub fn record_points(
        &mut self,
        chat_id: ChatId,
        user_id: UserId,
        delta: i64,
        first_solve: bool,
    ) {
        let score = self.scores.entry((chat_id, user_id)).or_default();
        score.points += delta;
        if first_solve {
            score.first_solves += 1;
        }
        self.save();
    }

    pub fn record_battles_played(&mut self, chat_id: ChatId, user_ids: &[UserId]) {
        for user_id in user_ids {
            let score = self.scores.entry((chat_id, *user_id)).or_default();
            score.battles += 1;
        }
        self.save();
    }

    pub fn stats(&self, chat_id: ChatId, user_id: UserId) -> Option<UserStats> {
        self.scores.get(&(chat_id, user_id)).map(|score| UserStats {
            points: score.points,
            battles: score.battles,
            first_solves: score.first_solves,
        })
    }

    /// Leaderboard for a chat: points desc, rating desc, handle asc.
    pub fn leaderboard(&self, chat_id: ChatId) -> Vec<LeaderboardRow> {
        let mut rows: Vec<LeaderboardRow> = self
            .users
            .iter()
            .filter(|((chat, _), _)| *chat == chat_id)
            .map(|(key, user)| LeaderboardRow {
                display_name: user.display_name.clone(),
                handle: user.handle.clone(),
                rating: user.rating,
                points: self.scores.get(key).map(|score| score.points).unwrap_or(0),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| b.rating.cmp(&a.rating))
                .then_with(|| a.handle.to_lowercase().cmp(&b.handle.to_lowercase()))
        });
        rows
    }

    pub fn build_response(
        &self,
        chat_id: ChatId,
        requested_limit: Option<usize>,
    ) -> LeaderboardResponse {
        let mut entries = self.leaderboard(chat_id);
        entries.truncate(requested_limit.unwrap_or(10).clamp(1, 100));
        LeaderboardResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entries,
        }
    }

    fn save(&self) {
        if let Some(parent) = self.file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                eprintln!(
                    "[points-store] failed to create parent dir {}: {error}",
                    parent.display()
                );
                return;
            }
        }

        let payload = StoreFile {
            version: 1,
            users: self
                .users
                .iter()
                .map(|(key, user)| (table_key(*key), user.clone()))
                .collect(),
            scores: self
                .scores
                .iter()
                .map(|(key, score)| (table_key(*key), score.clone()))
                .collect(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(&self.file_path, text) {
                    eprintln!(
                        "[points-store] failed to write {}: {error}",
                        self.file_path.display()
                    );
                }
            }
            Err(error) => {
                eprintln!(
                    "[points-store] failed to serialize payload for {}: {error}",
                    self.file_path.display()
                );
            }
        }
    }
}

fn cmp_handle(a: &Registration, b: &Registration) -> Ordering {
    a.handle.to_lowercase().cmp(&b.handle.to_lowercase())
}

fn table_key(key: (ChatId, UserId)) -> String {
    format!("{}:{}", key.0, key.1)
}

fn parse_table_key(raw: &str) -> Option<(ChatId, UserId)> {
    let (chat, user) = raw.split_once(':')?;
    Some((chat.parse().ok()?, user.parse().ok()?))
}

type Tables = (
    HashMap<(ChatId, UserId), StoredUser>,
    HashMap<(ChatId, UserId), StoredScore>,
);

fn load_tables(path: &Path) -> Tables {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                eprintln!("[points-store] failed to read {}: {error}", path.display());
            }
            return (HashMap::new(), HashMap::new());
        }
    };
    let parsed: StoreFile = match serde_json::from_str::<StoreFile>(&text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            eprintln!(
                "[points-store] unsupported version {} at {}",
                value.version,
                path.display()
            );
            return (HashMap::new(), HashMap::new());
        }
        Err(error) => {
            eprintln!("[points-store] failed to parse {}: {error}", path.display());
            return (HashMap::new(), HashMap::new());
        }
    };

    let mut users = HashMap::new();
    for (raw_key, user) in parsed.users {
        let Some(key) = parse_table_key(&raw_key) else {
            eprintln!("[points-store] skipping malformed user key '{raw_key}'");
            continue;
        };
        if user.handle.trim().is_empty() {
            continue;
        }
        users.insert(key, user);
    }

    let mut scores = HashMap::new();
    for (raw_key, score) in parsed.scores {
        let Some(key) = parse_table_key(&raw_key) else {
            eprintln!("[points-store] skipping malformed score key '{raw_key}'");
            continue;
        };
        scores.insert(key, score);
    }

    (users, scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str) -> PathBuf {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            now_ms.saturating_add(rand::random::<u32>() as u64)
        );
        std::env::temp_dir().join(unique).join("points.json")
    }

    #[test]
    fn registration_round_trips_through_the_file() {
        let path = temp_file("points-store-reg");
        {
            let mut store = PointsStore::new(path.clone());
            store.upsert_registration(-1, 10, "Alice", "alice_cf", 1500);
            store.upsert_registration(-1, 10, "Alice", "alice_cf", 1560);
        }

        let store = PointsStore::new(path.clone());
        let registration = store.registration(-1, 10).expect("registration exists");
        assert_eq!(registration.handle, "alice_cf");
        assert_eq!(registration.rating, 1560);
        assert_eq!(store.stats(-1, 10), Some(UserStats::default()));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn points_and_first_solves_accumulate() {
        let path = temp_file("points-store-pts");
        let mut store = PointsStore::new(path.clone());
        store.upsert_registration(-1, 10, "Alice", "alice_cf", 1500);
        store.record_points(-1, 10, 3, true);
        store.record_points(-1, 10, 5, true);
        store.record_battles_played(-1, &[10]);

        assert_eq!(
            store.stats(-1, 10),
            Some(UserStats {
                points: 8,
                battles: 1,
                first_solves: 2,
            })
        );

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn leaderboard_orders_points_then_rating_then_handle() {
        let path = temp_file("points-store-lb");
        let mut store = PointsStore::new(path.clone());
        store.upsert_registration(-1, 1, "Alice", "zeta", 1500);
        store.upsert_registration(-1, 2, "Bob", "alpha", 1500);
        store.upsert_registration(-1, 3, "Cara", "mid", 1800);
        store.record_points(-1, 1, 5, true);
        store.record_points(-1, 2, 5, true);
        store.record_points(-1, 3, 2, true);

        let handles: Vec<String> = store
            .leaderboard(-1)
            .into_iter()
            .map(|row| row.handle)
            .collect();
        assert_eq!(handles, vec!["alpha", "zeta", "mid"]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn chats_are_isolated() {
        let path = temp_file("points-store-chats");
        let mut store = PointsStore::new(path.clone());
        store.upsert_registration(-1, 1, "Alice", "alice_cf", 1500);
        store.upsert_registration(-2, 1, "Alice", "alice_cf", 1500);
        store.record_points(-1, 1, 7, true);

        assert_eq!(store.leaderboard(-1)[0].points, 7);
        assert_eq!(store.leaderboard(-2)[0].points, 0);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_skips_malformed_entries() {
        let path = temp_file("points-store-partial");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        let raw = r#"{
  "version": 1,
  "users": {
    "-1:10": { "displayName": "Alice", "handle": "alice_cf", "rating": 1500 },
    "not-a-key": { "displayName": "Ghost", "handle": "ghost", "rating": 0 }
  },
  "scores": {
    "-1:10": { "points": 4, "battles": 2, "firstSolves": 1 }
  }
}"#;
        fs::write(&path, raw).expect("write file");

        let store = PointsStore::new(path.clone());
        assert_eq!(store.registrations(-1).len(), 1);
        assert_eq!(
            store.stats(-1, 10),
            Some(UserStats {
                points: 4,
                battles: 2,
                first_solves: 1,
            })
        );

        let _ = fs::remove_file(&path);
        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn build_response_limits_entries() {
        let path = temp_file("points-store-limit");
        let mut store = PointsStore::new(path.clone());
        for idx in 0..5 {
            store.upsert_registration(-1, idx, &format!("U{idx}"), &format!("h{idx}"), 1000);
        }

        assert_eq!(store.build_response(-1, Some(2)).entries.len(), 2);
        assert_eq!(store.build_response(-1, Some(0)).entries.len(), 1);
        assert_eq!(store.build_response(-1, None).entries.len(), 5);

        let _ = fs::remove_file(&path);
    }
}
