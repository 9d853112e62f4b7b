//! Weighted outcome selection over a generated board.
//!
//! Slots partition into lose / breakeven / win relative to the stake, a
//! category is drawn from the (normalized) configured weights, then a slot is
//! drawn uniformly inside the category. Empty categories resolve through an
//! explicit priority chain; the resolution is tagged so callers and the audit
//! trail can tell a drawn slot from a fallback.

use crate::{
    board::Board,
    errors::{EngineError, Result},
};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use serde::{Deserialize, Serialize};

/// Category weights as configured. They need not sum to any particular
/// total; normalization happens inside the draw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeWeights {
    pub lose: f64,
    pub breakeven: f64,
    pub win: f64,
}

impl OutcomeWeights {
    pub fn validate(&self) -> Result<()> {
        let all = [self.lose, self.breakeven, self.win];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(EngineError::Config(
                "outcome weights must be finite and non-negative".into(),
            ));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(EngineError::Config(
                "outcome weights must sum to a positive total".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Lose,
    Breakeven,
    Win,
}

/// How the winning slot was arrived at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Uniform draw inside the drawn category.
    Drawn,
    /// Category was empty; took the board extreme (max for win, min for lose).
    FallbackExtreme,
    /// Breakeven was empty; took the slot nearest the stake.
    FallbackNearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub index: usize,
    pub category: Category,
    pub resolution: Resolution,
}

fn partition(board: &Board, stake: u64, epsilon: u64) -> [Vec<usize>; 3] {
    let mut lose = Vec::new();
    let mut breakeven = Vec::new();
    let mut win = Vec::new();
    for (index, slot) in board.slots.iter().enumerate() {
        if slot.value + epsilon < stake {
            lose.push(index);
        } else if slot.value > stake + epsilon {
            win.push(index);
        } else {
            breakeven.push(index);
        }
    }
    [lose, breakeven, win]
}

fn extreme_index(board: &Board, max: bool) -> usize {
    let mut best = 0;
    for (index, slot) in board.slots.iter().enumerate() {
        let better = if max {
            slot.value > board.slots[best].value
        } else {
            slot.value < board.slots[best].value
        };
        if better {
            best = index;
        }
    }
    best
}

fn nearest_index(board: &Board, stake: u64) -> usize {
    let mut best = 0;
    for (index, slot) in board.slots.iter().enumerate() {
        if slot.value.abs_diff(stake) < board.slots[best].value.abs_diff(stake) {
            best = index;
        }
    }
    best
}

/// Pick the winning slot for `stake` on `board`.
///
/// Must run against the cached board the player was shown; regenerating here
/// would let the displayed and settled sequences diverge.
pub fn select<R: Rng>(
    board: &Board,
    stake: u64,
    weights: &OutcomeWeights,
    epsilon: u64,
    rng: &mut R,
) -> Result<Selection> {
    if board.slots.is_empty() {
        return Err(EngineError::Config("board has no slots".into()));
    }
    weights.validate()?;

    let [lose, breakeven, win] = partition(board, stake, epsilon);
    let dist = WeightedIndex::new([weights.lose, weights.breakeven, weights.win])
        .map_err(|e| EngineError::Config(format!("outcome weights: {e}")))?;

    let (category, members) = match dist.sample(rng) {
        0 => (Category::Lose, &lose),
        1 => (Category::Breakeven, &breakeven),
        _ => (Category::Win, &win),
    };

    if !members.is_empty() {
        let index = members[rng.gen_range(0..members.len())];
        return Ok(Selection {
            index,
            category,
            resolution: Resolution::Drawn,
        });
    }

    // Empty category: resolve by the fixed priority chain.
    let (index, resolution) = match category {
        Category::Win => (extreme_index(board, true), Resolution::FallbackExtreme),
        Category::Breakeven => (nearest_index(board, stake), Resolution::FallbackNearest),
        Category::Lose => (extreme_index(board, false), Resolution::FallbackExtreme),
    };
    Ok(Selection {
        index,
        category,
        resolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Board, ResolvedSlot};
    use chrono::Utc;
    use rand::{rngs::StdRng, SeedableRng};

    fn board_with_values(values: &[u64]) -> Board {
        Board {
            tier: "bronze".into(),
            seed: "seed".into(),
            slots: values
                .iter()
                .map(|v| ResolvedSlot {
                    prize: format!("prize-{v}"),
                    value: *v,
                    withdrawable: true,
                    image: None,
                })
                .collect(),
            expires_at: Utc::now(),
        }
    }

    fn forced(lose: f64, breakeven: f64, win: f64) -> OutcomeWeights {
        OutcomeWeights {
            lose,
            breakeven,
            win,
        }
    }

    #[test]
    fn forced_lose_draws_below_stake() {
        let board = board_with_values(&[20, 120, 300, 800, 300, 120, 20]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let sel = select(&board, 200, &forced(1.0, 0.0, 0.0), 5, &mut rng).unwrap();
            assert_eq!(sel.category, Category::Lose);
            assert_eq!(sel.resolution, Resolution::Drawn);
            assert!(board.slots[sel.index].value < 200);
        }
    }

    #[test]
    fn forced_win_draws_above_stake() {
        let board = board_with_values(&[20, 120, 300, 800, 300, 120, 20]);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..64 {
            let sel = select(&board, 200, &forced(0.0, 0.0, 13.0), 5, &mut rng).unwrap();
            assert_eq!(sel.category, Category::Win);
            assert!(board.slots[sel.index].value > 200);
        }
    }

    #[test]
    fn breakeven_uses_tolerance_band() {
        let board = board_with_values(&[195, 200, 205, 400]);
        let mut rng = StdRng::seed_from_u64(3);
        let sel = select(&board, 200, &forced(0.0, 1.0, 0.0), 5, &mut rng).unwrap();
        assert_eq!(sel.category, Category::Breakeven);
        assert!(board.slots[sel.index].value.abs_diff(200) <= 5);
    }

    #[test]
    fn empty_win_falls_back_to_max_value() {
        let board = board_with_values(&[20, 50, 180]);
        let mut rng = StdRng::seed_from_u64(1);
        let sel = select(&board, 200, &forced(0.0, 0.0, 1.0), 5, &mut rng).unwrap();
        assert_eq!(sel.resolution, Resolution::FallbackExtreme);
        assert_eq!(board.slots[sel.index].value, 180);
    }

    #[test]
    fn empty_breakeven_falls_back_to_nearest_stake() {
        let board = board_with_values(&[20, 150, 900]);
        let mut rng = StdRng::seed_from_u64(1);
        let sel = select(&board, 200, &forced(0.0, 1.0, 0.0), 5, &mut rng).unwrap();
        assert_eq!(sel.resolution, Resolution::FallbackNearest);
        assert_eq!(board.slots[sel.index].value, 150);
    }

    #[test]
    fn empty_lose_falls_back_to_min_value() {
        let board = board_with_values(&[300, 500, 900]);
        let mut rng = StdRng::seed_from_u64(1);
        let sel = select(&board, 200, &forced(1.0, 0.0, 0.0), 5, &mut rng).unwrap();
        assert_eq!(sel.resolution, Resolution::FallbackExtreme);
        assert_eq!(board.slots[sel.index].value, 300);
    }

    #[test]
    fn weights_need_not_sum_to_one() {
        let board = board_with_values(&[20, 300]);
        let mut rng = StdRng::seed_from_u64(5);
        // 62/25/13-style raw weights, unnormalized.
        let sel = select(&board, 200, &forced(62.0, 25.0, 13.0), 5, &mut rng).unwrap();
        assert!(sel.index < board.slots.len());
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let board = board_with_values(&[20, 300]);
        let mut rng = StdRng::seed_from_u64(5);
        let err = select(&board, 200, &forced(0.0, 0.0, 0.0), 5, &mut rng).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
