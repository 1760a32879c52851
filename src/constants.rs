pub const JOIN_WINDOW_SECS: u64 = 30;
pub const JOIN_TICKS: u32 = 6;
pub const MIN_PARTICIPANTS: usize = 2;
pub const INTER_ROUND_DELAY_SECS: u64 = 10;

pub const CATALOG_TTL_SECS: u64 = 6 * 60 * 60;
pub const API_TIMEOUT_SECS: u64 = 15;
pub const HISTORY_FETCH_LIMIT: usize = 1_000;
pub const CLAIM_HISTORY_LIMIT: usize = 100;

pub const MIN_PROBLEMS: usize = 1;
pub const MAX_PROBLEMS: usize = 10;
pub const MIN_RATING: i64 = 800;
pub const MAX_RATING: i64 = 3500;
pub const RATING_WINDOW: i64 = 50;

const POINT_BANDS: [(i64, i64, i64); 23] = [
    (800, 899, 1),
    (900, 999, 1),
    (1000, 1099, 2),
    (1100, 1199, 2),
    (1200, 1299, 3),
    (1300, 1399, 3),
    (1400, 1499, 4),
    (1500, 1599, 5),
    (1600, 1699, 6),
    (1700, 1799, 7),
    (1800, 1899, 8),
    (1900, 1999, 10),
    (2000, 2099, 12),
    (2100, 2199, 15),
    (2200, 2299, 18),
    (2300, 2399, 22),
    (2400, 2499, 27),
    (2500, 2599, 33),
    (2600, 2699, 40),
    (2700, 2799, 48),
    (2800, 2899, 58),
    (2900, 2999, 70),
    (3000, 3099, 85),
];

/// Points awarded for solving a problem of the given rating. Ratings outside
/// the band table (including 3100 and above) are worth nothing.
pub fn points_for_rating(rating: i64) -> i64 {
    for (lo, hi, points) in POINT_BANDS {
        if rating >= lo && rating <= hi {
            return points;
        }
    }
    0
}

pub fn points_for(rating: Option<i64>) -> i64 {
    rating.map(points_for_rating).unwrap_or(0)
}
