use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::SparseBinaryMatrix;

/// Neighbour returned by a kNN query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row index in the fitted matrix
    pub index: usize,
    /// Cosine distance in [0, 1]; 0 = identical buyer sets
    pub distance: f64,
}

/// Brute-force cosine kNN over sparse binary vectors
///
/// Each fitted row is the ascending list of feature (buyer) indices set to 1.
/// Queries scan every row; the product catalogue is small enough that an
/// approximate structure would not pay for itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnIndex {
    n_neighbors: usize,
    n_features: usize,
    rows: Vec<Vec<u32>>,
}

impl KnnIndex {
    /// Fit on `matrix` (items as rows)
    pub fn fit(matrix: &SparseBinaryMatrix, n_neighbors: usize) -> Self {
        let rows = (0..matrix.n_rows()).map(|r| matrix.row(r).to_vec()).collect();
        Self {
            n_neighbors,
            n_features: matrix.n_cols(),
            rows,
        }
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn n_items(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Stored vector of a fitted item
    pub fn item(&self, index: usize) -> Option<&[u32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// The `k` closest fitted items to `query`, closest first
    ///
    /// Equal distances are ordered by ascending item index. `k` is capped at
    /// the number of fitted items.
    pub fn kneighbors(&self, query: &[u32], k: usize) -> Vec<Neighbor> {
        let mut scored: Vec<Neighbor> = self
            .rows
            .iter()
            .enumerate()
            .map(|(index, row)| Neighbor {
                index,
                distance: cosine_distance(query, row),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });
        scored.truncate(k.min(self.rows.len()));
        scored
    }

    /// Neighbours of a fitted item, queried by its stored vector
    pub fn kneighbors_of(&self, index: usize, k: usize) -> Option<Vec<Neighbor>> {
        self.item(index).map(|row| self.kneighbors(row, k))
    }

    /// Structural checks for a deserialized index
    pub fn validate(&self) -> Result<(), String> {
        if self.n_neighbors == 0 {
            return Err("n_neighbors is zero".to_string());
        }
        for (i, row) in self.rows.iter().enumerate() {
            if row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("row {} is not strictly ascending", i));
            }
            if let Some(&last) = row.last() {
                if last as usize >= self.n_features {
                    return Err(format!(
                        "row {} references feature {} but only {} features were fitted",
                        i, last, self.n_features
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Cosine distance between two sorted sparse binary vectors
///
/// Formula: 1 - |A ∩ B| / sqrt(|A| × |B|). Empty vectors are at distance 1.
pub fn cosine_distance(a: &[u32], b: &[u32]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 1.0;
    }

    let (mut i, mut j, mut overlap) = (0, 0, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                overlap += 1;
                i += 1;
                j += 1;
            }
        }
    }

    let similarity = overlap as f64 / ((a.len() * b.len()) as f64).sqrt();
    (1.0 - similarity).max(0.0)
}
