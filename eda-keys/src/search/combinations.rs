//! Enumeration of column combinations.
//!
//! Combinations of size `k` are produced lazily in lexicographic order of
//! their positions in the eligible column list, so memory stays bounded by
//! `k` no matter how large `C(M, k)` grows.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A set of column names tested together as a candidate key.
///
/// Members keep the order they were enumerated in, which is the order the
/// columns are grouped by. Equality and hashing ignore that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSet {
    columns: Vec<String>,
}

impl ColumnSet {
    /// Creates a column set from names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of columns in the set.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    fn members(&self) -> BTreeSet<&str> {
        self.columns.iter().map(String::as_str).collect()
    }
}

impl PartialEq for ColumnSet {
    fn eq(&self, other: &Self) -> bool {
        self.members() == other.members()
    }
}

impl Eq for ColumnSet {}

impl Hash for ColumnSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.members().hash(state);
    }
}

impl fmt::Display for ColumnSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.columns.join(", "))
    }
}

/// Returns `C(m, k)`, saturating at `u64::MAX`.
pub fn count_combinations(m: usize, k: usize) -> u64 {
    if k > m {
        return 0;
    }
    let k = k.min(m - k) as u128;
    let m = m as u128;
    let mut count: u128 = 1;
    for i in 0..k {
        // Exact at every step: the running value is C(m, i + 1)
        count = count * (m - i) / (i + 1);
        if count > u64::MAX as u128 {
            return u64::MAX;
        }
    }
    count as u64
}

/// Produces the search space of a key search from its eligible columns.
///
/// # Example
///
/// ```rust
/// use eda_keys::search::CombinationEnumerator;
///
/// let enumerator = CombinationEnumerator::new(["id", "email", "country"]);
/// let pairs: Vec<String> = enumerator.combinations(2).map(|c| c.to_string()).collect();
/// assert_eq!(pairs, ["(id, email)", "(id, country)", "(email, country)"]);
/// assert_eq!(enumerator.count(5), 0);
/// ```
#[derive(Debug, Clone)]
pub struct CombinationEnumerator {
    columns: Vec<String>,
}

impl CombinationEnumerator {
    /// Creates an enumerator over an ordered column list.
    ///
    /// Repeated names are dropped after their first occurrence, so every
    /// combination of size `k` holds `k` distinct columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let columns = columns
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| seen.insert(c.clone()))
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns a fresh iterator over all `k`-combinations.
    ///
    /// Empty when `k` is zero or larger than the number of columns.
    pub fn combinations(&self, k: usize) -> Combinations<'_> {
        let exhausted = k == 0 || k > self.columns.len();
        Combinations {
            columns: &self.columns,
            indices: (0..k).collect(),
            exhausted,
            remaining: count_combinations(self.columns.len(), k),
        }
    }

    /// Number of `k`-combinations, without enumerating them.
    pub fn count(&self, k: usize) -> u64 {
        if k == 0 {
            return 0;
        }
        count_combinations(self.columns.len(), k)
    }
}

/// Lazy iterator over the combinations of one size.
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    columns: &'a [String],
    indices: Vec<usize>,
    exhausted: bool,
    remaining: u64,
}

impl Combinations<'_> {
    fn advance(&mut self) {
        let n = self.columns.len();
        let k = self.indices.len();
        // Rightmost position that can still move forward
        let Some(i) = (0..k).rev().find(|&i| self.indices[i] < n - k + i) else {
            self.exhausted = true;
            return;
        };
        self.indices[i] += 1;
        for j in i + 1..k {
            self.indices[j] = self.indices[j - 1] + 1;
        }
    }
}

impl Iterator for Combinations<'_> {
    type Item = ColumnSet;

    fn next(&mut self) -> Option<ColumnSet> {
        if self.exhausted {
            return None;
        }
        let set = ColumnSet::new(self.indices.iter().map(|&i| self.columns[i].clone()));
        self.remaining = self.remaining.saturating_sub(1);
        self.advance();
        Some(set)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            return (0, Some(0));
        }
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}
