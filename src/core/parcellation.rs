//! core/parcellation.rs — moving data between vertex space and parcel space.
//!
//! A `Labeling` assigns one integer parcel id to every vertex of a surface.
//! Id 0 is background. Vertex → parcel is a NaN-aware mean (`aggregate`),
//! parcel → vertex is a broadcast by label rank (`map_to_labels`).

use std::collections::BTreeSet;

use nalgebra::DMatrix;

use crate::error::{Error, Result};

pub const BACKGROUND_ID: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Labeling {
    ids: Vec<i32>,
}

impl Labeling {
    pub fn new(ids: Vec<i32>) -> Self {
        Self { ids }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[i32] {
        &self.ids
    }

    /// Distinct ids, ascending.
    pub fn unique(&self) -> Vec<i32> {
        self.ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct ids not listed in `exclude`, ascending.
    pub fn parcel_ids(&self, exclude: &[i32]) -> Vec<i32> {
        self.unique()
            .into_iter()
            .filter(|id| !exclude.contains(id))
            .collect()
    }

    pub fn max_id(&self) -> i32 {
        self.ids.iter().copied().max().unwrap_or(BACKGROUND_ID)
    }

    /// Shift every nonzero id by `offset`; background stays 0.
    pub fn offset_nonzero(&self, offset: i32) -> Self {
        Self::new(
            self.ids
                .iter()
                .map(|&id| if id == BACKGROUND_ID { id } else { id + offset })
                .collect(),
        )
    }

    /// Left and right labelings joined into one vertex vector, right ids
    /// shifted past the largest left id. Returns the joined labeling and the
    /// offset applied to the right hemisphere.
    pub fn combine(left: &Self, right: &Self) -> (Self, i32) {
        let offset = left.max_id().max(BACKGROUND_ID) + 1;
        let mut ids = left.ids.clone();
        ids.extend(right.offset_nonzero(offset).ids);
        (Self::new(ids), offset)
    }

    /// `true` for vertices whose id is listed in `ids`.
    pub fn mask_in(&self, ids: &[i32]) -> Vec<bool> {
        let set: BTreeSet<i32> = ids.iter().copied().collect();
        self.ids.iter().map(|id| set.contains(id)).collect()
    }
}

impl From<Vec<i32>> for Labeling {
    fn from(ids: Vec<i32>) -> Self {
        Self::new(ids)
    }
}

/// Parcel × timepoint means, rows in `ids` order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelTimeseries {
    pub ids: Vec<i32>,
    pub data: DMatrix<f64>,
}

impl ParcelTimeseries {
    #[inline]
    pub fn n_parcels(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn n_time(&self) -> usize {
        self.data.ncols()
    }

    /// Left parcels first, then right parcels with ids shifted by `right_offset`.
    pub fn concat(left: &Self, right: &Self, right_offset: i32) -> Result<Self> {
        if left.n_time() != right.n_time() {
            return Err(Error::shape(
                "hemisphere timepoints",
                left.n_time(),
                right.n_time(),
            ));
        }
        let n_left = left.n_parcels();
        let n_time = left.n_time();
        let data = DMatrix::from_fn(n_left + right.n_parcels(), n_time, |i, t| {
            if i < n_left {
                left.data[(i, t)]
            } else {
                right.data[(i - n_left, t)]
            }
        });
        let mut ids = left.ids.clone();
        ids.extend(right.ids.iter().map(|&id| id + right_offset));
        Ok(Self { ids, data })
    }

    /// Replace NaN entries with `value`. Returns how many parcels had any.
    pub fn fill_nan(&mut self, value: f64) -> usize {
        let mut touched = 0;
        for i in 0..self.data.nrows() {
            let mut hit = false;
            for t in 0..self.data.ncols() {
                if self.data[(i, t)].is_nan() {
                    self.data[(i, t)] = value;
                    hit = true;
                }
            }
            if hit {
                touched += 1;
            }
        }
        touched
    }
}

/// Mean timeseries of every parcel not in `exclude`, ignoring NaN samples.
///
/// A parcel whose samples are all NaN at a timepoint gets NaN there.
pub fn aggregate(
    timeseries: &DMatrix<f64>,
    labeling: &Labeling,
    exclude: &[i32],
) -> Result<ParcelTimeseries> {
    if timeseries.nrows() != labeling.len() {
        return Err(Error::shape(
            "timeseries rows vs labeling",
            labeling.len(),
            timeseries.nrows(),
        ));
    }
    let ids = labeling.parcel_ids(exclude);
    let n_time = timeseries.ncols();
    let mut sums = DMatrix::<f64>::zeros(ids.len(), n_time);
    let mut counts = vec![0usize; ids.len() * n_time];

    for (v, id) in labeling.as_slice().iter().enumerate() {
        let Ok(p) = ids.binary_search(id) else {
            continue;
        };
        for t in 0..n_time {
            let x = timeseries[(v, t)];
            if !x.is_nan() {
                sums[(p, t)] += x;
                counts[p * n_time + t] += 1;
            }
        }
    }

    let data = DMatrix::from_fn(ids.len(), n_time, |p, t| match counts[p * n_time + t] {
        0 => f64::NAN,
        n => sums[(p, t)] / n as f64,
    });
    Ok(ParcelTimeseries { ids, data })
}

/// Broadcast per-parcel values onto vertices.
///
/// `values[r]` belongs to the r-th smallest distinct nonzero label among the
/// vertices selected by `mask` (`None` selects all). Selected vertices with a
/// nonzero label receive their parcel's value; every other vertex gets `fill`.
pub fn map_to_labels(
    values: &[f64],
    labeling: &[i32],
    mask: Option<&[bool]>,
    fill: f64,
) -> Result<Vec<f64>> {
    if let Some(mask) = mask {
        if mask.len() != labeling.len() {
            return Err(Error::shape("mask vs labeling", labeling.len(), mask.len()));
        }
    }
    let selected = |v: usize| mask.is_none_or(|m| m[v]) && labeling[v] != BACKGROUND_ID;

    let ranks: Vec<i32> = (0..labeling.len())
        .filter(|&v| selected(v))
        .map(|v| labeling[v])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ranks.len() != values.len() {
        return Err(Error::shape(
            "parcel values vs distinct labels",
            ranks.len(),
            values.len(),
        ));
    }

    Ok((0..labeling.len())
        .map(|v| {
            if !selected(v) {
                return fill;
            }
            match ranks.binary_search(&labeling[v]) {
                Ok(r) => values[r],
                Err(_) => fill,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn aggregate_means_members_and_skips_excluded() {
        let labeling = Labeling::new(vec![0, 1, 1, 2, 3, 3]);
        let ts = DMatrix::from_row_slice(
            6,
            2,
            &[
                9.0, 9.0, //
                1.0, 2.0, //
                3.0, f64::NAN, //
                5.0, 5.0, //
                7.0, 8.0, //
                9.0, 10.0,
            ],
        );
        let out = aggregate(&ts, &labeling, &[0, 2]).unwrap();
        assert_eq!(out.ids, vec![1, 3]);
        assert_abs_diff_eq!(out.data[(0, 0)], 2.0);
        assert_abs_diff_eq!(out.data[(0, 1)], 2.0);
        assert_abs_diff_eq!(out.data[(1, 0)], 8.0);
        assert_abs_diff_eq!(out.data[(1, 1)], 9.0);
    }

    #[test]
    fn all_nan_parcel_becomes_nan_then_fillable() {
        let labeling = Labeling::new(vec![1, 2]);
        let ts = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, f64::NAN, f64::NAN]);
        let mut out = aggregate(&ts, &labeling, &[]).unwrap();
        assert!(out.data[(1, 0)].is_nan());
        assert_eq!(out.fill_nan(0.0), 1);
        assert_eq!(out.data[(1, 1)], 0.0);
    }

    #[test]
    fn combine_shifts_right_ids_past_left() {
        let left = Labeling::new(vec![0, 1, 3]);
        let right = Labeling::new(vec![2, 0, 1]);
        let (joined, offset) = Labeling::combine(&left, &right);
        assert_eq!(offset, 4);
        assert_eq!(joined.as_slice(), &[0, 1, 3, 6, 0, 5]);
    }

    #[test]
    fn concat_orders_left_then_right() {
        let a = ParcelTimeseries {
            ids: vec![1, 2],
            data: DMatrix::from_element(2, 3, 1.0),
        };
        let b = ParcelTimeseries {
            ids: vec![1],
            data: DMatrix::from_element(1, 3, 2.0),
        };
        let joined = ParcelTimeseries::concat(&a, &b, 10).unwrap();
        assert_eq!(joined.ids, vec![1, 2, 11]);
        assert_eq!(joined.data[(2, 0)], 2.0);

        let short = ParcelTimeseries {
            ids: vec![1],
            data: DMatrix::from_element(1, 2, 2.0),
        };
        assert!(ParcelTimeseries::concat(&a, &short, 10).is_err());
    }

    #[test]
    fn mapping_without_mask_uses_all_nonzero_labels() {
        let out = map_to_labels(&[1.5, 2.5], &[2, 0, 7, 2], None, -9.0).unwrap();
        assert_eq!(out, vec![1.5, -9.0, 2.5, 1.5]);
    }

    #[test]
    fn mapping_rejects_mask_of_wrong_length() {
        let err = map_to_labels(&[1.0], &[1, 1], Some(&[true]), 0.0).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
