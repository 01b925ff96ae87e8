//! Customer reviews with a daily featured rotation.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const BUNDLED_REVIEWS: &str = include_str!("../data/reviews.json");

/// Number of distinct five-star reviews featured each day.
const FEATURED_FIVE_STAR: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    /// Negated for featured copies so they never collide with the original.
    pub id: i64,
    pub user: String,
    pub rating: f32,
    /// Display date, e.g. `12 Jan 2026`.
    pub date: String,
    pub comment: String,
    pub avatar: String,
}

impl Review {
    fn has_rating(&self, rating: f32) -> bool {
        (self.rating - rating).abs() < f32::EPSILON
    }
}

/// The reviews shipped with the binary.
pub fn bundled_reviews() -> Result<Vec<Review>, serde_json::Error> {
    serde_json::from_str(BUNDLED_REVIEWS)
}

/// Same-day-stable seed derived from the ISO date.
fn day_seed(today: NaiveDate) -> u64 {
    today
        .format("%Y-%m-%d")
        .to_string()
        .bytes()
        .fold(0i32, |hash, b| hash.wrapping_shl(5).wrapping_sub(hash).wrapping_add(b as i32))
        as u32 as u64
}

/// Today's ordering: two five-star and one 4.5-star review re-dated to
/// `today` with negated ids, then every review that was not featured.
///
/// The same date always yields the same order.
pub fn daily_reviews(all: &[Review], today: NaiveDate) -> Vec<Review> {
    let mut rng = StdRng::seed_from_u64(day_seed(today));

    let mut five_star: Vec<&Review> = all.iter().filter(|r| r.has_rating(5.0)).collect();
    let mut picked: Vec<&Review> = Vec::with_capacity(FEATURED_FIVE_STAR + 1);
    for _ in 0..FEATURED_FIVE_STAR {
        if five_star.is_empty() {
            break;
        }
        let index = rng.gen_range(0..five_star.len());
        picked.push(five_star.remove(index));
    }

    let four_and_half: Vec<&Review> = all.iter().filter(|r| r.has_rating(4.5)).collect();
    if !four_and_half.is_empty() {
        picked.push(four_and_half[rng.gen_range(0..four_and_half.len())]);
    }

    let display_date = today.format("%d %b %Y").to_string();
    let featured_ids: Vec<i64> = picked.iter().map(|r| r.id).collect();

    picked
        .into_iter()
        .map(|r| Review {
            id: -r.id,
            date: display_date.clone(),
            ..r.clone()
        })
        .chain(
            all.iter()
                .filter(|r| !featured_ids.contains(&r.id))
                .cloned(),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bundled_reviews_parse() {
        let reviews = bundled_reviews().unwrap();
        assert!(reviews.iter().filter(|r| r.has_rating(5.0)).count() >= 2);
        assert!(reviews.iter().any(|r| r.has_rating(4.5)));
    }

    #[test]
    fn features_two_five_star_then_one_four_and_half() {
        let all = bundled_reviews().unwrap();
        let today = day(2026, 1, 12);
        let rotated = daily_reviews(&all, today);

        assert_eq!(rotated.len(), all.len());
        assert!(rotated[0].has_rating(5.0));
        assert!(rotated[1].has_rating(5.0));
        assert_ne!(rotated[0].id, rotated[1].id);
        assert!(rotated[2].has_rating(4.5));
        for featured in &rotated[..3] {
            assert!(featured.id < 0);
            assert_eq!(featured.date, "12 Jan 2026");
            assert!(!rotated[3..].iter().any(|r| r.id == -featured.id));
        }
    }

    #[test]
    fn rotation_is_stable_within_a_day() {
        let all = bundled_reviews().unwrap();
        let a = daily_reviews(&all, day(2026, 3, 1));
        let b = daily_reviews(&all, day(2026, 3, 1));
        assert_eq!(a, b);
    }

    #[test]
    fn small_pools_do_not_panic() {
        let only = Review {
            id: 1,
            user: "Lou".to_string(),
            rating: 5.0,
            date: "1 Jan 2026".to_string(),
            comment: "Lovely".to_string(),
            avatar: String::new(),
        };
        let rotated = daily_reviews(std::slice::from_ref(&only), day(2026, 1, 12));
        assert_eq!(rotated.len(), 1);
        assert_eq!(rotated[0].id, -1);
        assert!(daily_reviews(&[], day(2026, 1, 12)).is_empty());
    }
}
