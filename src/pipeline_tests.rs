#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use proptest::prelude::*;
    use serde_json::{json, Value as Json};

    use crate::dataset::{AttributeKind, AttributeSpec, Dataset, DatasetBuilder};
    use crate::hierarchy::{check_partition_chain, Model};
    use crate::kernel::CentroidComponent;
    use crate::{Error, ModelConfig, Result};

    fn one_column(values: &[f64]) -> Dataset {
        let mut builder =
            DatasetBuilder::new(vec![AttributeSpec::new("x", AttributeKind::NumericFloat)]).unwrap();
        for &v in values {
            builder.push_row(&[v.into()]);
        }
        builder.build().unwrap()
    }

    /// Four rows at each corner of a 3-4-5 triangle; the 3-long side is the closest pair.
    fn triangle() -> Dataset {
        let mut builder = DatasetBuilder::new(vec![
            AttributeSpec::new("x", AttributeKind::NumericFloat).with_dist_weight(1.0),
            AttributeSpec::new("y", AttributeKind::NumericFloat).with_dist_weight(1.0),
        ])
        .unwrap();
        for (x, y) in [(0.0, 0.0), (3.0, 0.0), (0.0, 4.0)] {
            for _ in 0..4 {
                builder.push_row(&[x.into(), y.into()]);
            }
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_two_blocks_two_states() -> Result<()> {
        let model = Model::build(
            one_column(&[0.0, 0.0, 0.0, 10.0, 10.0, 10.0]),
            &ModelConfig::new(2),
        )?;
        assert_eq!(model.chain().len(), 1);
        assert_eq!(model.selected(), &[0]);

        let low = model.row_to_initial()[0];
        let high = model.row_to_initial()[3];
        assert_ne!(low, high);
        assert_eq!(&model.row_to_initial()[..3], &[low; 3]);
        assert_eq!(&model.row_to_initial()[3..], &[high; 3]);

        let initial = &model.chain()[0];
        assert!((initial.transitions[[low, low]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((initial.transitions[[low, high]] - 1.0 / 3.0).abs() < 1e-12);
        assert!((initial.transitions[[high, high]] - 1.0).abs() < 1e-12);
        assert_eq!(initial.transitions[[high, low]], 0.0);
        assert!((initial.stationary[low] - 0.5).abs() < 1e-12);

        let low_state = model.state(initial.states[low]);
        assert_eq!(low_state.members, vec![0, 1, 2]);
        assert!((low_state.radius - (0.5 / PI).sqrt()).abs() < 1e-12);
        assert_eq!(low_state.label.as_ref().unwrap().label, "x LOWEST");
        let high_state = model.state(initial.states[high]);
        assert_eq!(high_state.label.as_ref().unwrap().label, "x HIGHEST");

        let scalar = |state: &crate::hierarchy::State| match state.centroid.component(0) {
            CentroidComponent::Scalar(v) => *v,
            other => panic!("unexpected component {other:?}"),
        };
        assert!(scalar(low_state).abs() < 1e-12);
        assert!((scalar(high_state) - 10.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_two_blocks_decision_tree() -> Result<()> {
        let model = Model::build(
            one_column(&[0.0, 0.0, 0.0, 10.0, 10.0, 10.0]),
            &ModelConfig::new(2),
        )?;
        let export: Json = serde_json::from_str(&model.to_json()?)?;
        let low = model.row_to_initial()[0];
        let tree = &export["scales"][0]["states"][low]["decisionTree"];
        assert_eq!(tree["nPos"], json!(3));
        assert_eq!(tree["nNeg"], json!(3));
        assert_eq!(tree["splitAttr"], json!("x"));
        assert_eq!(tree["entropyBeforeSplit"], json!(1.0));
        let children = tree["children"].as_array().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["splitLabel"], json!("< 10"));
        assert_eq!(children[0]["nPos"], json!(3));
        assert_eq!(children[0]["nNeg"], json!(0));
        assert_eq!(children[1]["splitLabel"], json!(">= 10"));
        assert!(children[0].get("splitAttr").is_none());
        Ok(())
    }

    #[test]
    fn test_first_merge_joins_closest_pair() -> Result<()> {
        let model = Model::build(triangle(), &ModelConfig::new(3))?;
        assert_eq!(model.chain().len(), 2);
        assert_eq!(model.selected(), &[0, 1]);

        let merge = model.history().merges().next().unwrap();
        assert!((merge.distance - 3.0).abs() < 1e-9);

        let a = model.row_to_initial()[0];
        let b = model.row_to_initial()[4];
        let c = model.row_to_initial()[8];
        let mut ab = vec![a, b];
        ab.sort_unstable();

        let coarse = &model.chain()[1];
        let merged_pos = coarse
            .states
            .iter()
            .position(|&id| model.state(id).initial_states.len() == 2)
            .unwrap();
        assert_eq!(model.state(coarse.states[merged_pos]).initial_states, ab);
        assert_eq!(model.child_states(1, merged_pos), Some(ab));
        assert_eq!(model.child_states(1, 1 - merged_pos), Some(vec![c]));
        assert_eq!(model.child_states(0, 0), None);

        // The untouched state is shared by both scales.
        let single = coarse.states[1 - merged_pos];
        assert_eq!(model.chain()[0].states[c], single);
        Ok(())
    }

    #[test]
    fn test_export_structure() -> Result<()> {
        let model = Model::build(triangle(), &ModelConfig::new(3))?;
        let export: Json = serde_json::from_str(&model.to_json()?)?;

        let scales = export["scales"].as_array().unwrap();
        assert_eq!(scales.len(), 2);
        assert_eq!(scales[0]["nStates"], json!(3));
        assert_eq!(scales[0]["areTheseInitialStates"], json!(true));
        assert_eq!(scales[1]["areTheseInitialStates"], json!(false));
        for state in scales[0]["states"].as_array().unwrap() {
            assert!(state.get("childStates").is_none());
            assert_eq!(state["nextStateProbDistr"].as_array().unwrap().len(), 3);
            assert_eq!(state["centroid"][0]["attrName"], json!("x"));
            assert_eq!(state["histograms"].as_array().unwrap().len(), 2);
        }
        for state in scales[1]["states"].as_array().unwrap() {
            assert!(state["childStates"].is_array());
            assert!(state["suggestedLabel"]["label"].is_string());
        }
        assert_eq!(export["totalHistograms"][0]["freqSum"], json!(12));

        let a = model.row_to_initial()[0];
        let b = model.row_to_initial()[4];
        let c = model.row_to_initial()[8];
        assert_eq!(export["stateHistoryInitialStates"], json!([a, b, c]));
        assert_eq!(export["stateHistoryTimes"], json!([0, 4, 8, 12]));
        Ok(())
    }

    #[test]
    fn test_export_respects_switches() -> Result<()> {
        let config = ModelConfig::new(3)
            .with_histograms(false)
            .with_decision_trees(false)
            .with_state_history(false);
        let model = Model::build(triangle(), &config)?;
        let export: Json = serde_json::from_str(&model.to_json()?)?;
        assert!(export.get("totalHistograms").is_none());
        assert!(export.get("stateHistoryTimes").is_none());
        assert!(export.get("stateHistoryInitialStates").is_none());
        let state = &export["scales"][0]["states"][0];
        assert!(state.get("histograms").is_none());
        assert!(state.get("decisionTree").is_none());
        assert!(state.get("suggestedLabel").is_some());
        Ok(())
    }

    #[test]
    fn test_not_enough_data() {
        let err = Model::build(one_column(&[1.0, 2.0, 3.0]), &ModelConfig::new(5)).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidClusterCount {
                requested: 5,
                n_items: 3
            }
        );
        assert!(err.to_string().starts_with("not enough data"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ModelConfig::new(2).with_histogram_buckets(0);
        assert!(matches!(
            Model::build(one_column(&[1.0, 2.0, 3.0]), &config),
            Err(Error::Validation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_every_scale_covers_all_rows(
            values in prop::collection::vec(-100.0f64..100.0, 8..40),
            k in 2usize..6,
        ) {
            let config = ModelConfig::new(k)
                .with_histograms(false)
                .with_decision_trees(false);
            let model = Model::build(one_column(&values), &config).unwrap();
            let n_rows = values.len();

            let report = check_partition_chain(n_rows, model.states(), model.chain());
            prop_assert!(report.is_healthy(), "{}", report);
            prop_assert_eq!(model.chain().len(), k - 1);
            prop_assert_eq!(model.selected()[0], 0);

            for scale in model.scales() {
                let mut covered: Vec<usize> = scale
                    .states
                    .iter()
                    .flat_map(|&id| model.state(id).members.iter().copied())
                    .collect();
                covered.sort_unstable();
                prop_assert_eq!(covered, (0..n_rows).collect::<Vec<_>>());

                let total: f64 = scale.stationary.iter().sum();
                prop_assert!((total - 1.0).abs() < 1e-9);
                for row in scale.transitions.rows() {
                    let sum = row.sum();
                    prop_assert!(sum.abs() < 1e-9 || (sum - 1.0).abs() < 1e-9);
                }
            }
        }
    }
}
