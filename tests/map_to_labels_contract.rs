use std::collections::BTreeSet;

use gradprep::core::parcellation::map_to_labels;
use gradprep::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn masked_mapping_fills_background_and_unselected() {
    let labeling = [0, 1, 1, 2, 2, 0];
    let mask = [false, true, true, true, true, false];
    let out = map_to_labels(&[10.0, 20.0], &labeling, Some(&mask), -1.0).unwrap();
    assert_eq!(out, vec![-1.0, 10.0, 10.0, 20.0, 20.0, -1.0]);
}

#[test]
fn unselected_parcel_does_not_take_a_rank() {
    // Parcel 2 is masked out entirely, so parcel 3 receives the second value.
    let labeling = [1, 2, 2, 3, 3, 1];
    let mask = [true, false, false, true, true, true];
    let out = map_to_labels(&[5.0, 7.0], &labeling, Some(&mask), f64::NAN).unwrap();
    assert_eq!(out[0], 5.0);
    assert!(out[1].is_nan() && out[2].is_nan());
    assert_eq!(&out[3..], &[7.0, 7.0, 5.0]);
}

#[test]
fn wrong_value_count_is_shape_mismatch() {
    let labeling = [0, 1, 1, 2, 2, 0];
    let err = map_to_labels(&[1.0, 2.0, 3.0], &labeling, None, 0.0).unwrap_err();
    match err {
        Error::ShapeMismatch {
            expected, found, ..
        } => {
            assert_eq!(expected, 2);
            assert_eq!(found, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
    let short_mask = [true; 4];
    assert!(matches!(
        map_to_labels(&[1.0, 2.0], &labeling, Some(&short_mask), 0.0),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn random_labelings_respect_length_fill_and_rank() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let n = rng.random_range(1..60);
        let labeling: Vec<i32> = (0..n).map(|_| rng.random_range(0..8)).collect();
        let mask: Vec<bool> = (0..n).map(|_| rng.random_bool(0.7)).collect();
        let distinct: Vec<i32> = labeling
            .iter()
            .zip(&mask)
            .filter(|&(&l, &m)| m && l != 0)
            .map(|(&l, _)| l)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let values: Vec<f64> = distinct.iter().map(|&l| 100.0 + l as f64).collect();
        let fill = -7.5;

        let out = map_to_labels(&values, &labeling, Some(&mask), fill).unwrap();
        assert_eq!(out.len(), labeling.len());
        for v in 0..n {
            if mask[v] && labeling[v] != 0 {
                assert_eq!(out[v], 100.0 + labeling[v] as f64);
            } else {
                assert_eq!(out[v], fill);
            }
        }

        if !distinct.is_empty() {
            let mut extra = values.clone();
            extra.push(0.0);
            assert!(map_to_labels(&extra, &labeling, Some(&mask), fill).is_err());
        }
    }
}
