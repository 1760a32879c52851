use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use rand::seq::SliceRandom;

use crate::constants::{points_for, HISTORY_FETCH_LIMIT, RATING_WINDOW};
use crate::judge::JudgeApi;
use crate::types::{CatalogProblem, SelectedProblem};

/// Process-wide problem catalog cache. A plain check-then-refresh under the
/// owner's mutex is enough here: staleness is the only risk, and a failed
/// refresh keeps whatever data is already cached.
pub struct CatalogCache {
    ttl: Duration,
    fetched_at: Option<Instant>,
    problems: Vec<CatalogProblem>,
}

impl CatalogCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            fetched_at: None,
            problems: Vec::new(),
        }
    }

    pub async fn get<J: JudgeApi>(&mut self, judge: &J) -> Vec<CatalogProblem> {
        let stale = match self.fetched_at {
            Some(at) => at.elapsed() >= self.ttl,
            None => true,
        };
        if stale || self.problems.is_empty() {
            let fetched = judge.catalog().await;
            if fetched.is_empty() {
                eprintln!("[selector] catalog refresh failed, keeping cached data");
            } else {
                println!("[selector] catalog cached: {} problems", fetched.len());
                self.problems = fetched;
                self.fetched_at = Some(Instant::now());
            }
        }
        self.problems.clone()
    }
}

/// Union of problem keys any participant has ever submitted to, regardless of
/// verdict. Histories are fetched in parallel; a failed fetch contributes
/// nothing.
pub async fn attempted_set<J: JudgeApi>(judge: &J, handles: &[String]) -> HashSet<String> {
    let fetches = handles
        .iter()
        .map(|handle| judge.submission_history(handle, HISTORY_FETCH_LIMIT));
    join_all(fetches)
        .await
        .into_iter()
        .flatten()
        .map(|submission| submission.problem.key())
        .collect()
}

/// Selects up to `count` problems for a battle: no duplicates, none attempted
/// by any participant. Two entries in `ratings` with more than two problems
/// requested means "random within the min..max range"; otherwise each entry
/// is a per-round target. The result may be shorter than `count`, in which
/// case the caller aborts the battle.
pub async fn select_problems<J: JudgeApi>(
    judge: &J,
    catalog: &[CatalogProblem],
    ratings: &[i64],
    handles: &[String],
    count: usize,
) -> Vec<SelectedProblem> {
    if catalog.is_empty() || count == 0 {
        return Vec::new();
    }

    let attempted = attempted_set(judge, handles).await;
    let mut rng = rand::rng();
    let mut selected: Vec<SelectedProblem> = Vec::new();
    let mut taken: HashSet<String> = HashSet::new();

    if ratings.len() == 2 && count > 2 {
        let lo = ratings.iter().min().copied().unwrap_or(0) - RATING_WINDOW;
        let hi = ratings.iter().max().copied().unwrap_or(0) + RATING_WINDOW;
        let mut pool: Vec<&CatalogProblem> = catalog
            .iter()
            .filter(|problem| in_window(problem.rating, lo, hi))
            .collect();
        pool.shuffle(&mut rng);

        for problem in pool {
            let key = problem.id.key();
            if attempted.contains(&key) || taken.contains(&key) {
                continue;
            }
            taken.insert(key);
            selected.push(to_selected(problem));
            if selected.len() >= count {
                break;
            }
        }
    } else {
        for target in ratings {
            if selected.len() >= count {
                break;
            }
            let lo = target - RATING_WINDOW;
            let hi = target + RATING_WINDOW;
            let mut pool: Vec<&CatalogProblem> = catalog
                .iter()
                .filter(|problem| in_window(problem.rating, lo, hi))
                .collect();
            pool.shuffle(&mut rng);

            // a target with no fresh candidates is simply omitted
            for problem in pool {
                let key = problem.id.key();
                if attempted.contains(&key) || taken.contains(&key) {
                    continue;
                }
                taken.insert(key);
                selected.push(to_selected(problem));
                break;
            }
        }
    }

    selected
}

fn in_window(rating: Option<i64>, lo: i64, hi: i64) -> bool {
    match rating {
        Some(rating) => rating >= lo && rating <= hi,
        None => false,
    }
}

fn to_selected(problem: &CatalogProblem) -> SelectedProblem {
    SelectedProblem {
        id: problem.id.clone(),
        name: problem.name.clone(),
        rating: problem.rating,
        points: points_for(problem.rating),
    }
}
