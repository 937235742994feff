use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::InteractionSet;
use crate::models::{BuyerId, ProductId};

/// Binary matrix in compressed sparse row layout
///
/// Only the column indices of the 1-cells are stored. Within a row the
/// indices are strictly ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseBinaryMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
}

impl SparseBinaryMatrix {
    /// Build from (row, col) coordinates; duplicates are collapsed
    pub fn from_coords(n_rows: usize, n_cols: usize, coords: &[(usize, usize)]) -> Self {
        let mut rows: Vec<Vec<u32>> = vec![Vec::new(); n_rows];
        for &(r, c) in coords {
            debug_assert!(r < n_rows && c < n_cols);
            rows[r].push(c as u32);
        }

        let mut indptr = Vec::with_capacity(n_rows + 1);
        let mut indices = Vec::with_capacity(coords.len());
        indptr.push(0);
        for mut row in rows {
            row.sort_unstable();
            row.dedup();
            indices.extend_from_slice(&row);
            indptr.push(indices.len());
        }

        Self {
            n_rows,
            n_cols,
            indptr,
            indices,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Number of stored 1-cells
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Column indices set in `row`
    pub fn row(&self, row: usize) -> &[u32] {
        &self.indices[self.indptr[row]..self.indptr[row + 1]]
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        row < self.n_rows && self.row(row).binary_search(&(col as u32)).is_ok()
    }

    /// Transpose via counting sort; rows of the result stay sorted
    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.n_cols + 1];
        for &c in &self.indices {
            counts[c as usize + 1] += 1;
        }
        for i in 0..self.n_cols {
            counts[i + 1] += counts[i];
        }

        let indptr = counts.clone();
        let mut next = counts;
        let mut indices = vec![0u32; self.indices.len()];
        for r in 0..self.n_rows {
            for &c in self.row(r) {
                let slot = &mut next[c as usize];
                indices[*slot] = r as u32;
                *slot += 1;
            }
        }

        Self {
            n_rows: self.n_cols,
            n_cols: self.n_rows,
            indptr,
            indices,
        }
    }
}

/// Buyer × product matrix with the identities behind each axis
#[derive(Debug, Clone)]
pub struct UserItemMatrix {
    pub matrix: SparseBinaryMatrix,
    /// Row index → buyer id
    pub buyer_ids: Vec<BuyerId>,
    /// Column index → product id
    pub product_ids: Vec<ProductId>,
}

impl UserItemMatrix {
    /// Rows and columns follow ascending buyer / product id
    pub fn build(interactions: &InteractionSet) -> Self {
        let buyer_ids = interactions.buyers();
        let product_ids = interactions.products();

        let buyer_idx: HashMap<BuyerId, usize> =
            buyer_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let product_idx: HashMap<ProductId, usize> =
            product_ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let coords: Vec<(usize, usize)> = interactions
            .iter()
            .map(|i| (buyer_idx[&i.buyer_id], product_idx[&i.product_id]))
            .collect();

        Self {
            matrix: SparseBinaryMatrix::from_coords(buyer_ids.len(), product_ids.len(), &coords),
            buyer_ids,
            product_ids,
        }
    }

    /// Items as rows, buyers as columns
    pub fn item_user(&self) -> SparseBinaryMatrix {
        self.matrix.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::recommender::Interaction;

    #[test]
    fn test_from_coords_dedups_and_sorts() {
        let m = SparseBinaryMatrix::from_coords(2, 3, &[(0, 2), (0, 0), (0, 2), (1, 1)]);
        assert_eq!(m.row(0), &[0, 2]);
        assert_eq!(m.row(1), &[1]);
        assert_eq!(m.nnz(), 3);
    }

    #[test]
    fn test_transpose() {
        // [1 0 1]
        // [0 1 1]
        let m = SparseBinaryMatrix::from_coords(2, 3, &[(0, 0), (0, 2), (1, 1), (1, 2)]);
        let t = m.transpose();

        assert_eq!(t.n_rows(), 3);
        assert_eq!(t.n_cols(), 2);
        assert_eq!(t.row(0), &[0]);
        assert_eq!(t.row(1), &[1]);
        assert_eq!(t.row(2), &[0, 1]);
        assert_eq!(t.transpose(), m);
    }

    #[test]
    fn test_transpose_keeps_empty_rows() {
        let m = SparseBinaryMatrix::from_coords(3, 2, &[(2, 0)]);
        let t = m.transpose();
        assert_eq!(t.row(0), &[2]);
        assert!(t.row(1).is_empty());
    }

    #[test]
    fn test_user_item_matrix_axes() {
        let set: InteractionSet = [
            Interaction { buyer_id: 20, product_id: 300 },
            Interaction { buyer_id: 10, product_id: 100 },
            Interaction { buyer_id: 10, product_id: 300 },
        ]
        .into_iter()
        .collect();

        let uim = UserItemMatrix::build(&set);
        assert_eq!(uim.buyer_ids, vec![10, 20]);
        assert_eq!(uim.product_ids, vec![100, 300]);
        assert!(uim.matrix.get(0, 0));
        assert!(uim.matrix.get(0, 1));
        assert!(!uim.matrix.get(1, 0));
        assert!(uim.matrix.get(1, 1));

        let items = uim.item_user();
        assert_eq!(items.row(1), &[0, 1]);
    }
}
