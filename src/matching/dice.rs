use rand::rngs::StdRng;
use rand::Rng;

use super::{MatchTrial, TaskVariant, TrialGenerator};

pub const FACES: u8 = 6;

/// Die-face comparison against a reference held for the whole activation.
#[derive(Clone, Debug, Default)]
pub struct DiceGenerator {
    reference: Option<u8>,
    previous: Option<u8>,
}

impl DiceGenerator {
    pub fn reference(&self) -> Option<u8> {
        self.reference
    }

    /// Draw a face that differs from the previous one, uniformly among the rest.
    fn next_value(&mut self, rng: &mut StdRng) -> u8 {
        let value = match self.previous {
            Some(previous) => {
                let v = rng.gen_range(1..FACES);
                if v >= previous {
                    v + 1
                } else {
                    v
                }
            }
            None => rng.gen_range(1..=FACES),
        };
        self.previous = Some(value);
        value
    }
}

impl TrialGenerator for DiceGenerator {
    type Value = u8;
    const VARIANT: TaskVariant = TaskVariant::Dice;

    fn activate(&mut self, rng: &mut StdRng) {
        self.reference = Some(rng.gen_range(1..=FACES));
        self.previous = None;
    }

    fn next_trial(&mut self, rng: &mut StdRng) -> MatchTrial<u8> {
        let reference = match self.reference {
            Some(r) => r,
            None => {
                self.activate(rng);
                self.reference.unwrap_or(1)
            }
        };
        let current = self.next_value(rng);
        MatchTrial::new(reference, current)
    }
}

/// Canonical pip layout of a face on a 3x3 grid, row-major.
pub fn pips(value: u8) -> [[bool; 3]; 3] {
    let (t, f) = (true, false);
    match value {
        1 => [[f, f, f], [f, t, f], [f, f, f]],
        2 => [[t, f, f], [f, f, f], [f, f, t]],
        3 => [[t, f, f], [f, t, f], [f, f, t]],
        4 => [[t, f, t], [f, f, f], [t, f, t]],
        5 => [[t, f, t], [f, t, f], [t, f, t]],
        6 => [[t, f, t], [t, f, t], [t, f, t]],
        _ => [[f; 3]; 3],
    }
}
