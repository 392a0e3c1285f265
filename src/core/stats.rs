//! core/stats.rs — row-wise statistics over `DMatrix<f64>`.
//!
//! Rows are series (vertices or parcels), columns are observations.

use nalgebra::DMatrix;

/// Values whose spread falls below this are treated as constant.
pub const EPS: f64 = f64::EPSILON;

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation (ddof = 0).
pub fn population_std(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    let m = mean(xs);
    let var = xs.iter().map(|&x| (x - m) * (x - m)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

pub fn row_vec(m: &DMatrix<f64>, i: usize) -> Vec<f64> {
    m.row(i).iter().copied().collect()
}

/// Standard deviation of every row.
pub fn row_std(m: &DMatrix<f64>) -> Vec<f64> {
    (0..m.nrows())
        .map(|i| population_std(&row_vec(m, i)))
        .collect()
}

/// Remove the least-squares line `a + b t` from every row.
pub fn detrend_rows(m: &mut DMatrix<f64>) {
    let n = m.ncols();
    if n == 0 {
        return;
    }
    let t_mean = (n as f64 - 1.0) / 2.0;
    let t_ss: f64 = (0..n).map(|t| (t as f64 - t_mean).powi(2)).sum();
    for i in 0..m.nrows() {
        let row = row_vec(m, i);
        let x_mean = mean(&row);
        let slope = if t_ss > 0.0 {
            row.iter()
                .enumerate()
                .map(|(t, &x)| (t as f64 - t_mean) * (x - x_mean))
                .sum::<f64>()
                / t_ss
        } else {
            0.0
        };
        for (t, &x) in row.iter().enumerate() {
            m[(i, t)] = x - x_mean - slope * (t as f64 - t_mean);
        }
    }
}

/// Z-score every row. Rows with std below `EPS` are only centered.
pub fn zscore_rows(m: &mut DMatrix<f64>) {
    for i in 0..m.nrows() {
        let row = row_vec(m, i);
        let mu = mean(&row);
        let mut sd = population_std(&row);
        if !(sd >= EPS) {
            sd = 1.0;
        }
        for (t, &x) in row.iter().enumerate() {
            m[(i, t)] = (x - mu) / sd;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn std_matches_population_formula() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_abs_diff_eq!(population_std(&xs), 2.0, epsilon = 1e-12);
        assert_eq!(population_std(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn detrend_removes_line_exactly() {
        let mut m = DMatrix::from_fn(2, 6, |i, t| 3.0 + (i as f64 + 0.5) * t as f64);
        detrend_rows(&mut m);
        for v in m.iter() {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn zscore_leaves_constant_rows_at_zero() {
        let mut m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 5.0, 5.0, 5.0]);
        zscore_rows(&mut m);
        assert_abs_diff_eq!(population_std(&row_vec(&m, 0)), 1.0, epsilon = 1e-12);
        assert!(row_vec(&m, 1).iter().all(|&v| v == 0.0));
    }
}
