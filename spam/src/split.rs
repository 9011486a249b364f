// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Seeded stratified train/test split

use crate::error::{ClassifierError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Row indices of each partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices so each label keeps its share in both partitions.
///
/// The test partition holds `ceil(test_size * n)` rows. Per-class test counts
/// are the floors of their proportional shares, with leftover rows going to
/// the classes with the largest fractional parts. The same `seed` always
/// yields the same split.
pub fn stratified_split(labels: &[String], test_size: f64, seed: u64) -> Result<Split> {
    let n = labels.len();

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_str()).or_default().push(i);
    }

    let n_classes = by_class.len();
    if n_classes < 2 {
        return Err(ClassifierError::NotEnoughData(format!(
            "need at least 2 classes to split, found {}",
            n_classes
        )));
    }
    if let Some((label, members)) = by_class.iter().find(|(_, m)| m.len() < 2) {
        return Err(ClassifierError::NotEnoughData(format!(
            "class '{}' has {} member(s); every class needs at least 2",
            label,
            members.len()
        )));
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test < n_classes || n_train < n_classes {
        return Err(ClassifierError::NotEnoughData(format!(
            "split of {} rows into train={} test={} cannot hold {} classes",
            n, n_train, n_test, n_classes
        )));
    }

    let quotas = allocate(&by_class, n_test, n);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);
    for (mut members, quota) in by_class.into_values().zip(quotas) {
        members.shuffle(&mut rng);
        let (held_out, kept) = members.split_at(quota);
        test.extend_from_slice(held_out);
        train.extend_from_slice(kept);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    tracing::debug!("Stratified split: train={}, test={}", train.len(), test.len());
    Ok(Split { train, test })
}

/// Per-class test counts summing to `n_test`, in class order.
fn allocate(by_class: &BTreeMap<&str, Vec<usize>>, n_test: usize, n: usize) -> Vec<usize> {
    let shares: Vec<f64> = by_class
        .values()
        .map(|m| n_test as f64 * m.len() as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = shares.iter().map(|s| s.floor() as usize).collect();

    let mut remainder = n_test - quotas.iter().sum::<usize>();
    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = shares[a] - shares[a].floor();
        let fb = shares[b] - shares[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });

    // Never hold out a whole class
    let sizes: Vec<usize> = by_class.values().map(Vec::len).collect();
    for &i in order.iter().cycle().take(order.len() * 2) {
        if remainder == 0 {
            break;
        }
        if quotas[i] + 1 < sizes[i] {
            quotas[i] += 1;
            remainder -= 1;
        }
    }
    quotas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(counts: &[(&str, usize)]) -> Vec<String> {
        counts.iter()
            .flat_map(|(l, n)| std::iter::repeat(l.to_string()).take(*n))
            .collect()
    }

    #[test]
    fn test_partitions_cover_all_rows_once() {
        let y = labels(&[("ham", 7), ("spam", 3)]);
        let split = stratified_split(&y, 0.2, 42).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(split.test.len(), 2);
    }

    #[test]
    fn test_class_proportions_preserved() {
        let y = labels(&[("ham", 80), ("spam", 20)]);
        let split = stratified_split(&y, 0.2, 7).unwrap();

        let spam_in_test = split.test.iter().filter(|&&i| y[i] == "spam").count();
        assert_eq!(split.test.len(), 20);
        assert_eq!(spam_in_test, 4);
    }

    #[test]
    fn test_balanced_small_split() {
        let y = labels(&[("ham", 4), ("spam", 4)]);
        let split = stratified_split(&y, 0.25, 42).unwrap();

        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 6);
        let spam_in_test = split.test.iter().filter(|&&i| y[i] == "spam").count();
        assert_eq!(spam_in_test, 1);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let y = labels(&[("ham", 10), ("spam", 10)]);
        let a = stratified_split(&y, 0.3, 42).unwrap();
        let b = stratified_split(&y, 0.3, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_single_class() {
        let y = labels(&[("ham", 10)]);
        assert!(matches!(stratified_split(&y, 0.2, 1), Err(ClassifierError::NotEnoughData(_))));
    }

    #[test]
    fn test_rejects_singleton_class() {
        let y = labels(&[("ham", 10), ("spam", 1)]);
        assert!(matches!(stratified_split(&y, 0.2, 1), Err(ClassifierError::NotEnoughData(_))));
    }

    #[test]
    fn test_rejects_too_small_test_partition() {
        let y = labels(&[("ham", 5), ("spam", 5)]);
        // ceil(0.1 * 10) = 1 test row for 2 classes
        assert!(matches!(stratified_split(&y, 0.1, 1), Err(ClassifierError::NotEnoughData(_))));
    }
}
