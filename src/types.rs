use serde::Serialize;

pub type ChatId = i64;
pub type UserId = i64;
pub type MessageId = i64;

/// Catalog identifier of a problem: contest plus letter index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ProblemRef {
    #[serde(rename = "contestId")]
    pub contest_id: i64,
    pub index: String,
}

impl ProblemRef {
    pub fn new(contest_id: i64, index: &str) -> Self {
        Self {
            contest_id,
            index: index.to_string(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}-{}", self.contest_id, self.index)
    }

    pub fn url(&self) -> String {
        format!(
            "https://codeforces.com/problemset/problem/{}/{}",
            self.contest_id, self.index
        )
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CatalogProblem {
    pub id: ProblemRef,
    pub name: String,
    pub rating: Option<i64>,
}

/// A problem chosen for one battle round. Immutable once selected.
#[derive(Clone, Debug, Serialize)]
pub struct SelectedProblem {
    pub id: ProblemRef,
    pub name: String,
    pub rating: Option<i64>,
    pub points: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub handle: String,
    pub rating: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub problem: ProblemRef,
    pub verdict: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhase {
    Joining,
    Running,
    Cancelled,
    Finished,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundOutcome {
    Won {
        #[serde(rename = "userId")]
        user_id: UserId,
        handle: String,
        points: i64,
    },
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub handle: String,
    pub rating: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub points: i64,
    pub battles: u64,
    #[serde(rename = "firstSolves")]
    pub first_solves: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub handle: String,
    pub rating: i64,
    pub points: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeaderboardResponse {
    #[serde(rename = "generatedAtIso")]
    pub generated_at_iso: String,
    pub entries: Vec<LeaderboardRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_ref_key_and_url() {
        let id = ProblemRef::new(1833, "B");
        assert_eq!(id.key(), "1833-B");
        assert_eq!(id.url(), "https://codeforces.com/problemset/problem/1833/B");
    }
}
