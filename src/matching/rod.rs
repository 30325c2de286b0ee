use rand::rngs::StdRng;
use rand::Rng;

use super::{MatchTrial, TaskVariant, TrialGenerator};

pub const SEGMENTS: usize = 12;
pub const TARGET_PROBABILITY: f64 = 0.3;
const MASK: u16 = (1 << SEGMENTS) - 1;

/// A figure of up to 12 strokes: the unit edges of a 2x2 grid.
///
/// Bits 0..6 are the horizontal edges (3 rows of 2), bits 6..12 the
/// vertical edges (2 rows of 3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RodFigure(u16);

impl RodFigure {
    pub fn from_bits(bits: u16) -> Self {
        Self(bits & MASK)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn random(rng: &mut StdRng) -> Self {
        Self(rng.gen_range(0..=MASK))
    }

    pub fn segment(self, index: usize) -> bool {
        index < SEGMENTS && self.0 & (1 << index) != 0
    }

    pub fn segments(self) -> [bool; SEGMENTS] {
        std::array::from_fn(|i| self.segment(i))
    }

    pub fn with_flipped(self, index: usize) -> Self {
        Self((self.0 ^ (1 << (index % SEGMENTS))) & MASK)
    }

    /// Horizontal edge in grid row `row` (0..3), column `col` (0..2).
    pub fn horizontal(self, row: usize, col: usize) -> bool {
        row < 3 && col < 2 && self.segment(row * 2 + col)
    }

    /// Vertical edge in grid row `row` (0..2), column `col` (0..3).
    pub fn vertical(self, row: usize, col: usize) -> bool {
        row < 2 && col < 3 && self.segment(6 + row * 3 + col)
    }
}

/// Two stacked figures; a target when they are identical.
#[derive(Clone, Copy, Debug, Default)]
pub struct RodGenerator;

impl TrialGenerator for RodGenerator {
    type Value = RodFigure;
    const VARIANT: TaskVariant = TaskVariant::Rod;

    fn activate(&mut self, _rng: &mut StdRng) {}

    fn next_trial(&mut self, rng: &mut StdRng) -> MatchTrial<RodFigure> {
        let top = RodFigure::random(rng);
        if rng.gen_bool(TARGET_PROBABILITY) {
            return MatchTrial::new(top, top);
        }
        let mut bottom = RodFigure::random(rng);
        if bottom == top {
            bottom = bottom.with_flipped(rng.gen_range(0..SEGMENTS));
        }
        MatchTrial::new(top, bottom)
    }
}
