use serde::{Deserialize, Serialize};

/// Roommate-preference attributes attached to each user.
/// Input to the compatibility score; nothing here is matched on exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileAttributes {
    /// Monthly budget in whole currency units
    pub budget: u32,
    /// Tidiness preference, 1 (relaxed) to 5 (spotless)
    pub cleanliness: u8,
    pub smoker: bool,
    pub night_owl: bool,
}

impl Default for ProfileAttributes {
    fn default() -> Self {
        Self {
            budget: 0,
            cleanliness: 3,
            smoker: false,
            night_owl: false,
        }
    }
}

/// Compatibility between two profiles, 0-100. Pure function over attributes:
/// budget proximity weighs 40, cleanliness distance 30, smoking agreement 20,
/// sleep schedule 10.
pub fn compatibility_score(a: &ProfileAttributes, b: &ProfileAttributes) -> u8 {
    let budget_points = {
        let max = a.budget.max(b.budget);
        if max == 0 {
            40
        } else {
            let diff = a.budget.abs_diff(b.budget) as u64;
            // Full marks within 10% of the larger budget, fading to 0 at 50%.
            let ratio = diff * 100 / max as u64;
            match ratio {
                0..=10 => 40,
                11..=50 => (50 - ratio) as u32, // linear fade, 39 down to 0
                _ => 0,
            }
        }
    };

    let cleanliness_points = {
        let diff = a.cleanliness.abs_diff(b.cleanliness).min(4) as u32;
        30 - diff * 30 / 4
    };

    let smoking_points = if a.smoker == b.smoker { 20 } else { 0 };
    let schedule_points = if a.night_owl == b.night_owl { 10 } else { 0 };

    (budget_points + cleanliness_points + smoking_points + schedule_points).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(budget: u32, cleanliness: u8, smoker: bool, night_owl: bool) -> ProfileAttributes {
        ProfileAttributes {
            budget,
            cleanliness,
            smoker,
            night_owl,
        }
    }

    #[test]
    fn identical_profiles_score_full() {
        let p = profile(800, 4, false, true);
        assert_eq!(compatibility_score(&p, &p), 100);
    }

    #[test]
    fn score_is_symmetric() {
        let a = profile(600, 2, true, false);
        let b = profile(900, 5, false, true);
        assert_eq!(compatibility_score(&a, &b), compatibility_score(&b, &a));
    }

    #[test]
    fn opposite_profiles_score_low() {
        let a = profile(400, 1, false, false);
        let b = profile(2000, 5, true, true);
        assert!(compatibility_score(&a, &b) < 20);
    }

    #[test]
    fn default_profiles_are_fully_compatible() {
        let a = ProfileAttributes::default();
        let b = ProfileAttributes::default();
        assert_eq!(compatibility_score(&a, &b), 100);
    }
}
