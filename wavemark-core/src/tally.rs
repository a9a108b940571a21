use crate::config::TieBreak;

/// Per-bit vote counter over decoded blocks.
///
/// Each block votes its hard bits; its per-bit confidence is summed as signed
/// evidence (positive toward 1) for breaking ties.
#[derive(Debug, Clone)]
pub struct Tally {
    ones: Vec<u32>,
    zeros: Vec<u32>,
    evidence: Vec<f32>,
    votes: u32,
}

impl Tally {
    pub fn new(width: usize) -> Self {
        Self {
            ones: vec![0; width],
            zeros: vec![0; width],
            evidence: vec![0.0; width],
            votes: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.ones.len()
    }

    /// Number of blocks added so far.
    pub fn votes(&self) -> u32 {
        self.votes
    }

    /// Add one block. `confidence[i]` is how strongly the block stands
    /// behind `bits[i]`; missing entries count as zero.
    pub fn add(&mut self, bits: &[bool], confidence: &[f32]) {
        for (i, &bit) in bits.iter().enumerate().take(self.width()) {
            let c = confidence.get(i).copied().unwrap_or(0.0);
            if bit {
                self.ones[i] += 1;
                self.evidence[i] += c;
            } else {
                self.zeros[i] += 1;
                self.evidence[i] -= c;
            }
        }
        self.votes += 1;
    }

    /// Majority decision per bit.
    pub fn resolve(&self, tie_break: TieBreak) -> Vec<bool> {
        (0..self.width())
            .map(|i| match self.ones[i].cmp(&self.zeros[i]) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => match tie_break {
                    TieBreak::Evidence => self.evidence[i] > 0.0,
                    TieBreak::Zero => false,
                    TieBreak::One => true,
                },
            })
            .collect()
    }

    /// Summed evidence per bit divided by the vote count, in `[-1, 1]` when
    /// the inputs are.
    pub fn mean_evidence(&self) -> Vec<f32> {
        let n = self.votes.max(1) as f32;
        self.evidence.iter().map(|e| e / n).collect()
    }
}

impl<'a> FromIterator<(&'a [bool], &'a [f32])> for Tally {
    /// Fold blocks into a tally; the width is taken from the first block.
    fn from_iter<I: IntoIterator<Item = (&'a [bool], &'a [f32])>>(iter: I) -> Self {
        let mut iter = iter.into_iter().peekable();
        let width = iter.peek().map_or(0, |(bits, _)| bits.len());
        let mut tally = Tally::new(width);
        for (bits, confidence) in iter {
            tally.add(bits, confidence);
        }
        tally
    }
}
