//! Synthetic audience data for tests, benches and demo runs.
//!
//! Generates one logical population and renders it both as EAV attribute
//! rows and as denormalized profile rows, so both schemas answer every
//! scenario with the same count. A fixed seed keeps runs reproducible.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SEED: u64 = 0xDEAD_BEEF_CAFE_1337;

const OTHER_COUNTRIES: [&str; 7] = ["CA", "GB", "DE", "FR", "JP", "BR", "IN"];

/// Tier names with their relative weights.
const TIERS: [(&str, u32); 4] = [("bronze", 50), ("silver", 30), ("gold", 15), ("platinum", 5)];

/// Signup timestamps start here and grow roughly one minute per user.
const SIGNUP_EPOCH: i64 = 1_600_000_000;

#[derive(Debug, Clone, Copy)]
pub struct FixtureParams {
    pub users: usize,
    /// Fraction of users located in the US. The generated count is exact:
    /// `round(users * us_share)`.
    pub us_share: f64,
    /// Fraction of users whose `country` attribute row is stored twice.
    /// Exercises the `DISTINCT` on the EAV side.
    pub duplicate_share: f64,
    pub seed: u64,
}

impl FixtureParams {
    pub fn with_users(users: usize) -> Self {
        Self {
            users,
            us_share: 0.4,
            duplicate_share: 0.05,
            seed: DEFAULT_SEED,
        }
    }

    pub fn us_users(&self) -> usize {
        (self.users as f64 * self.us_share).round() as usize
    }
}

/// One synthetic user.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub id: i64,
    pub country: &'static str,
    pub tier: &'static str,
    pub has_purchased: bool,
    /// Lifetime spend in cents, kept integral so both schemas agree exactly.
    pub spend_cents: i64,
    pub signup_at: i64,
    /// Store the country attribute row twice in the EAV schema.
    pub duplicate_country: bool,
}

impl UserProfile {
    pub fn total_spend(&self) -> f64 {
        self.spend_cents as f64 / 100.0
    }

    /// The user's attributes as EAV `(key, value)` rows.
    pub fn attribute_rows(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("country", self.country.to_string()),
            ("tier", self.tier.to_string()),
            ("has_purchased", self.has_purchased.to_string()),
            (
                "total_spend",
                format!("{}.{:02}", self.spend_cents / 100, self.spend_cents % 100),
            ),
            ("signup_at", self.signup_at.to_string()),
        ];
        if self.duplicate_country {
            rows.push(("country", self.country.to_string()));
        }
        rows
    }
}

/// Generate `params.users` users with ids `1..=users`.
pub fn generate_users(params: &FixtureParams) -> Vec<UserProfile> {
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut order: Vec<usize> = (0..params.users).collect();
    order.shuffle(&mut rng);
    let mut is_us = vec![false; params.users];
    for &idx in order.iter().take(params.us_users()) {
        is_us[idx] = true;
    }

    let tier_total: u32 = TIERS.iter().map(|(_, w)| w).sum();
    let mut signup_at = SIGNUP_EPOCH;

    (0..params.users)
        .map(|i| {
            let country = if is_us[i] {
                "US"
            } else {
                OTHER_COUNTRIES[rng.gen_range(0..OTHER_COUNTRIES.len())]
            };

            let mut roll = rng.gen_range(0..tier_total);
            let mut tier = TIERS[0].0;
            for (name, weight) in TIERS {
                if roll < weight {
                    tier = name;
                    break;
                }
                roll -= weight;
            }

            let has_purchased = rng.gen_bool(0.35);
            let spend_cents = if has_purchased {
                rng.gen_range(100..50_000)
            } else {
                0
            };

            signup_at += rng.gen_range(1..120);

            UserProfile {
                id: i as i64 + 1,
                country,
                tier,
                has_purchased,
                spend_cents,
                signup_at,
                duplicate_country: rng.gen_bool(params.duplicate_share.clamp(0.0, 1.0)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_share_is_exact() {
        let users = generate_users(&FixtureParams::with_users(100));
        assert_eq!(users.len(), 100);
        assert_eq!(users.iter().filter(|u| u.country == "US").count(), 40);
    }

    #[test]
    fn generation_is_deterministic() {
        let params = FixtureParams::with_users(500);
        assert_eq!(generate_users(&params), generate_users(&params));
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate_users(&FixtureParams::with_users(200));
        let b = generate_users(&FixtureParams {
            seed: 7,
            ..FixtureParams::with_users(200)
        });
        assert_ne!(a, b);
    }

    #[test]
    fn ids_are_sequential_and_signups_increase() {
        let users = generate_users(&FixtureParams::with_users(300));
        for (i, pair) in users.windows(2).enumerate() {
            assert_eq!(pair[0].id, i as i64 + 1);
            assert!(pair[1].signup_at > pair[0].signup_at);
        }
    }

    #[test]
    fn spend_text_matches_cents() {
        let user = UserProfile {
            id: 1,
            country: "US",
            tier: "gold",
            has_purchased: true,
            spend_cents: 10_005,
            signup_at: SIGNUP_EPOCH,
            duplicate_country: true,
        };
        let rows = user.attribute_rows();
        assert!(rows.contains(&("total_spend", "100.05".to_string())));
        assert!(rows.contains(&("has_purchased", "true".to_string())));
        assert_eq!(rows.iter().filter(|(k, _)| *k == "country").count(), 2);
        assert_eq!(user.total_spend(), 100.05);
    }

    #[test]
    fn non_purchasers_spend_nothing() {
        let users = generate_users(&FixtureParams::with_users(1_000));
        assert!(users
            .iter()
            .filter(|u| !u.has_purchased)
            .all(|u| u.spend_cents == 0));
        assert!(users.iter().any(|u| u.duplicate_country));
    }
}
