use super::PairStats;

const NOT_OCCUPIED: isize = -1;
const NO_HEAD: isize = -2;

/// Sparse accumulator for the co-rating statistics of one entity against all
/// others.
///
/// Touched columns are threaded into an intrusive linked list so that draining
/// visits (and resets) only the entries that were written, keeping a row pass
/// proportional to its overlap instead of to `n`.
pub(crate) struct PairAccumulator {
    stats: Vec<PairStats>,
    non_zeros: Vec<isize>,
    head: isize,
}

impl PairAccumulator {
    pub(crate) fn new(n: usize) -> Self {
        PairAccumulator {
            stats: vec![PairStats::default(); n],
            non_zeros: vec![NOT_OCCUPIED; n],
            head: NO_HEAD,
        }
    }

    pub(crate) fn add_to(&mut self, column: usize, x: f64, y: f64) {
        self.stats[column].add(x, y);

        if self.non_zeros[column] == NOT_OCCUPIED {
            self.non_zeros[column] = self.head;
            self.head = column as isize;
        }
    }

    /// Hands every touched column to `visit` and clears it.
    pub(crate) fn drain(&mut self, mut visit: impl FnMut(usize, &PairStats)) {
        while self.head != NO_HEAD {
            let column = self.head as usize;
            visit(column, &self.stats[column]);

            self.head = self.non_zeros[column];
            self.stats[column] = PairStats::default();
            self.non_zeros[column] = NOT_OCCUPIED;
        }
    }
}
