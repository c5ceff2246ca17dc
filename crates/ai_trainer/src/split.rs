//! Label-stratified train/test split

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::debug;

use crate::errors::TrainerError;

/// Row ids of each side of a split, in shuffled order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }
}

/// Split row ids `0..labels.len()` so each class keeps its proportion
///
/// The test side receives `ceil(test_ratio * n)` rows. Per-class test counts
/// use largest-remainder rounding, so every class is within one row of its
/// exact share.
pub fn stratified_split(
    labels: &[usize],
    n_classes: usize,
    test_ratio: f64,
    seed: u64,
) -> Result<TrainTestSplit, TrainerError> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(TrainerError::Split(format!(
            "test ratio must be in (0, 1), got {test_ratio}"
        )));
    }

    let n = labels.len();
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (row, &label) in labels.iter().enumerate() {
        let bucket = by_class.get_mut(label).ok_or_else(|| {
            TrainerError::Split(format!("row {row} has label {label} outside 0..{n_classes}"))
        })?;
        bucket.push(row);
    }

    for (class, rows) in by_class.iter().enumerate() {
        if rows.len() < 2 {
            return Err(TrainerError::Split(format!(
                "class {} has {} rows; stratification needs at least 2",
                class,
                rows.len()
            )));
        }
    }

    let n_test = (test_ratio * n as f64).ceil() as usize;
    let n_train = n - n_test;
    if n_test < n_classes || n_train < n_classes {
        return Err(TrainerError::Split(format!(
            "test size {n_test} and train size {n_train} must each hold every class"
        )));
    }

    let counts: Vec<usize> = by_class.iter().map(Vec::len).collect();
    let allocation = allocate(&counts, n_test);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (rows, &take) in by_class.iter_mut().zip(&allocation) {
        rows.shuffle(&mut rng);
        test.extend_from_slice(&rows[..take]);
        train.extend_from_slice(&rows[take..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    debug!(?allocation, train = train.len(), test = test.len(), "Stratified split");
    Ok(TrainTestSplit { train, test })
}

/// Largest-remainder apportionment of `total` across `counts`
///
/// Each class gets at least one and at most `count - 1` rows when possible;
/// remainders are distributed by descending fraction, lowest class first.
fn allocate(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| total as f64 * c as f64 / n as f64)
        .collect();

    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut remaining = total - alloc.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    for &class in order.iter().cycle() {
        if remaining == 0 {
            break;
        }
        if alloc[class] < counts[class] {
            alloc[class] += 1;
            remaining -= 1;
        }
    }

    // Keep every class on both sides by moving rows between classes
    for class in 0..counts.len() {
        if alloc[class] == 0 {
            if let Some(donor) = (0..counts.len()).max_by_key(|&c| alloc[c]) {
                alloc[donor] -= 1;
                alloc[class] += 1;
            }
        } else if alloc[class] == counts[class] {
            if let Some(taker) = (0..counts.len())
                .filter(|&c| alloc[c] + 1 < counts[c])
                .max_by_key(|&c| counts[c] - alloc[c])
            {
                alloc[class] -= 1;
                alloc[taker] += 1;
            }
        }
    }

    alloc
}
