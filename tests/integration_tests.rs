// End-to-end tests: alignment, the per-variable test loop, PLS-DA and the
// result writers working together on small metabolomics-like fixtures.

#[cfg(test)]
mod integration_tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ndarray::{Array2, array};
    use statchill::config::RunConfig;
    use statchill::data::{MeasurementTable, Metadata, SampleTable, Variable, align};
    use statchill::error::{Result, StatError};
    use statchill::io::{self, CLASSIFIER_METRICS_FILE, TEST_RESULTS_FILE};
    use statchill::pipeline::{self, RunOptions};
    use statchill::projection::{ProjectionOptions, fit_evaluate};
    use statchill::results::RunKey;
    use statchill::testing::correction::{PostHocCorrector, TukeyHsd, tukey_hsd};
    use statchill::testing::inference::{compare_many, compare_two};
    use statchill::testing::{PostHocOutcome, TTestType, TestKind, TestSettings, VariableOutcome};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("statchill_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    /// Six samples, two per treatment, two metabolites.
    fn treatment_fixture() -> (MeasurementTable, Metadata) {
        let measurements = MeasurementTable::new(
            strings(&["S1", "S2", "S3", "S4", "S5", "S6"]),
            vec![Variable::new("Alanine"), Variable::new("Lactate")],
            array![
                [1.0, 5.0],
                [1.2, 5.5],
                [3.0, 6.0],
                [3.1, 6.2],
                [7.0, 1.0],
                [7.4, 1.1]
            ],
        )
        .unwrap();
        let mut metadata = Metadata::new(strings(&["S1", "S2", "S3", "S4", "S5", "S6"])).unwrap();
        metadata
            .add_column(
                "Treatment",
                ["ctrl", "ctrl", "drug1", "drug1", "drug2", "drug2"]
                    .iter()
                    .map(|s| Some(s.to_string()))
                    .collect(),
            )
            .unwrap();
        (measurements, metadata)
    }

    /// Two well separated classes of `n` samples each over four variables; only
    /// `m0` carries the class difference.
    fn separated(n: usize) -> (Array2<f64>, Vec<String>, Vec<String>) {
        let x = Array2::from_shape_fn((2 * n, 4), |(i, j)| {
            let class = (i >= n) as usize as f64;
            let jitter = ((i * 7 + j * 13) % 11) as f64 / 10.0;
            match j {
                0 => class * 10.0 + jitter,
                _ => jitter,
            }
        });
        let labels = (0..2 * n)
            .map(|i| if i < n { "ctrl" } else { "drug1" }.to_string())
            .collect();
        (x, labels, strings(&["m0", "m1", "m2", "m3"]))
    }

    #[test]
    fn test_empty_condition_set_takes_every_condition() {
        let (measurements, metadata) = treatment_fixture();
        let table = align(&measurements, &metadata, "treatment", &[]).unwrap();
        assert_eq!(table.conditions(), &strings(&["ctrl", "drug1", "drug2"])[..]);
        assert_eq!(table.n_samples(), 6);
    }

    #[test]
    fn test_unlisted_condition_is_excluded() {
        let (measurements, metadata) = treatment_fixture();
        let table = align(&measurements, &metadata, "Treatment", &strings(&["ctrl", "drug1"])).unwrap();
        assert_eq!(table.n_samples(), 4);
        assert!(table.labels().iter().all(|l| l != "drug2"));
        assert_eq!(table.conditions(), &strings(&["ctrl", "drug1"])[..]);
    }

    #[test]
    fn test_disjoint_groups_select_t_test() {
        let a = ("ctrl".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let b = ("drug1".to_string(), vec![10.0, 11.0, 12.0, 13.0, 14.0]);
        let outcome = compare_two("alanine", &a, &b, &TestSettings::default()).unwrap();
        assert_eq!(outcome.kind, TestKind::TTest(TTestType::Welch));
        assert!(outcome.p_value < 0.001);
        assert!(outcome.significant);
    }

    #[test]
    fn test_identical_vectors_are_not_significant() {
        let a = ("ctrl".to_string(), vec![2.3, 4.1, 3.3, 2.9, 3.8]);
        let outcome = compare_two("alanine", &a, &a.clone(), &TestSettings::default()).unwrap();
        assert!((outcome.p_value - 1.0).abs() < 1e-9);
        assert!(!outcome.significant);
    }

    #[test]
    fn test_single_observation_group_is_degenerate() {
        let groups = vec![
            ("ctrl".to_string(), vec![1.0]),
            ("drug1".to_string(), vec![2.0, 2.5, 3.0, 2.2, 2.8]),
            ("drug2".to_string(), vec![5.0, 5.5, 6.0, 5.2, 5.8]),
        ];
        let err = compare_many("citrate", &groups, &TestSettings::default()).unwrap_err();
        match err {
            StatError::DegenerateGroup { variable, .. } => assert_eq!(variable, "citrate"),
            other => panic!("expected DegenerateGroup, got {:?}", other),
        }
    }

    struct CountingCorrector {
        calls: AtomicUsize,
    }

    impl PostHocCorrector for CountingCorrector {
        fn posthoc(
            &self,
            variable: &str,
            groups: &[(String, Vec<f64>)],
            family_alpha: f64,
        ) -> Result<Vec<PostHocOutcome>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tukey_hsd(variable, groups, family_alpha)
        }
    }

    #[test]
    fn test_posthoc_only_after_rejecting_anova() {
        // `shifted` separates the conditions, `flat` has equal group means
        let values = array![
            [1.0, 1.0],
            [2.0, 2.0],
            [3.0, 3.0],
            [4.0, 2.0],
            [5.0, 3.0],
            [6.0, 1.0],
            [7.0, 3.0],
            [8.0, 1.0],
            [9.0, 2.0]
        ];
        let labels: Vec<String> = ["ctrl", "ctrl", "ctrl", "drug1", "drug1", "drug1", "drug2", "drug2", "drug2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let table = SampleTable::new(
            (1..=9).map(|i| format!("s{}", i)).collect(),
            vec![Variable::new("shifted"), Variable::new("flat")],
            values,
            labels,
            strings(&["ctrl", "drug1", "drug2"]),
        )
        .unwrap();

        let corrector = CountingCorrector {
            calls: AtomicUsize::new(0),
        };
        let outcomes = pipeline::test_variables(&table, &TestSettings::default(), &corrector).unwrap();
        assert_eq!(corrector.calls.load(Ordering::SeqCst), 1);

        match &outcomes[0] {
            VariableOutcome::Tested { outcome, posthoc } => {
                assert!(outcome.p_value < 0.05);
                assert_eq!(posthoc.len(), 3);
            }
            other => panic!("expected a tested outcome, got {:?}", other),
        }
        match &outcomes[1] {
            VariableOutcome::Tested { outcome, posthoc } => {
                assert!(outcome.p_value > 0.05);
                assert!(posthoc.is_empty());
            }
            other => panic!("expected a tested outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_untestable_variable_does_not_stop_the_run() {
        let values = array![
            [1.0, 4.0],
            [1.2, 4.4],
            [0.9, 3.9],
            [3.0, f64::NAN],
            [3.3, f64::NAN],
            [2.9, f64::NAN]
        ];
        let table = SampleTable::new(
            strings(&["a", "b", "c", "d", "e", "f"]),
            vec![Variable::new("alanine"), Variable::new("ghost")],
            values,
            strings(&["ctrl", "ctrl", "ctrl", "drug1", "drug1", "drug1"]),
            strings(&["ctrl", "drug1"]),
        )
        .unwrap();
        let key = RunKey {
            condition_column: "treatment".to_string(),
            accepted_conditions: strings(&["ctrl", "drug1"]),
        };

        let results = pipeline::run(key, &table, None, &RunOptions::default(), &TukeyHsd).unwrap();
        assert_eq!(results.n_failed(), 1);
        assert!(results.outcomes[0].outcome().is_some());
        assert!(results.adjusted_p_values[0].is_some());
        assert!(results.adjusted_p_values[1].is_none());

        let rows = results.result_rows();
        assert_eq!(rows[1].variable, "ghost");
        assert!(rows[1].error.as_deref().unwrap().contains("drug1"));
    }

    #[test]
    fn test_projection_is_deterministic_for_a_seed() {
        let (x, labels, variables) = separated(10);
        let options = ProjectionOptions {
            seed: Some(42),
            ..Default::default()
        };
        let first = fit_evaluate(x.view(), &labels, &variables, &options).unwrap();
        let second = fit_evaluate(x.view(), &labels, &variables, &options).unwrap();

        assert_eq!(first.split, second.split);
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.ranking, second.ranking);
        assert_eq!(first.test_predictions, second.test_predictions);
        assert_eq!(first.metrics.accuracy, 1.0);
        assert_eq!(first.ranking.entries[0].variable, "m0");
    }

    #[test]
    fn test_projection_rejects_empty_matrix() {
        let x = Array2::<f64>::zeros((0, 0));
        let err = fit_evaluate(x.view(), &[], &[], &ProjectionOptions::default()).unwrap_err();
        assert!(matches!(err, StatError::InsufficientData(_)));
    }

    #[test]
    fn test_write_results_with_projection() {
        let (x, labels, variables) = separated(6);
        let table = SampleTable::new(
            (0..12).map(|i| format!("s{}", i)).collect(),
            variables.iter().map(|v| Variable::new(v)).collect(),
            x,
            labels,
            strings(&["ctrl", "drug1"]),
        )
        .unwrap();
        let options = RunOptions {
            tests: TestSettings::default(),
            projection: Some(ProjectionOptions {
                seed: Some(3),
                top_n: 2,
                ..Default::default()
            }),
        };
        let key = RunKey {
            condition_column: "treatment".to_string(),
            accepted_conditions: strings(&["ctrl", "drug1"]),
        };
        let results = pipeline::run(key, &table, None, &options, &TukeyHsd).unwrap();
        assert_eq!(results.feature_rows().len(), 2);

        let dir = scratch_dir("write_results");
        let written = io::write_results(&dir, &results).unwrap();
        // no post-hoc file for a two-condition run
        assert_eq!(written.len(), 5);

        let csv = fs::read_to_string(dir.join(TEST_RESULTS_FILE)).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("variable,groups,test"));
        assert_eq!(lines.count(), 4);

        let json = fs::read_to_string(dir.join(CLASSIFIER_METRICS_FILE)).unwrap();
        let metrics: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(metrics["seed"], 3);
        assert_eq!(metrics["classes"][0], "ctrl");

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_execute_from_config_file() {
        let dir = scratch_dir("execute");
        fs::write(
            dir.join("metadata.csv"),
            "Sample;Treatment;Batch\n\
             S1;ctrl;a\nS2;ctrl;b\nS3;ctrl;a\nS4;ctrl;b\n\
             S5;drug1;a\nS6;drug1;b\nS7;drug1;a\nS8;drug1;b\n\
             S9;drug2;a\nS10;drug2;b\n",
        )
        .unwrap();
        fs::write(
            dir.join("measurements.csv"),
            "Sample;Alanine;Lactate;Citrate\n\
             S1;1,0;5.0;2.0\nS2;1.2;5.4;2.1\nS3;0.9;5.1;NA\nS4;1.1;5.3;2.2\n\
             S5;3.0;5.2;2.0\nS6;3.2;5.0;2.3\nS7;2.9;5.5;2.1\nS8;3.1;5.1;2.2\n\
             S9;9.0;1.0;1.0\nS10;9.5;1.2;1.1\n",
        )
        .unwrap();
        let output = dir.join("out");
        let config_text = format!(
            "meta_file_path = {}\nfile_path = {}\noutput_path = {}\ncolumn = Treatment\nconditions = ctrl,drug1\ntest_fraction = 0.25\n",
            dir.join("metadata.csv").display(),
            dir.join("measurements.csv").display(),
            output.display()
        );
        let config_path = dir.join("run.cfg");
        fs::write(&config_path, config_text).unwrap();

        let config = RunConfig::load(&config_path).unwrap();
        let results = statchill::cli::execute(&config).unwrap();

        assert_eq!(results.key.accepted_conditions, strings(&["ctrl", "drug1"]));
        assert_eq!(results.outcomes.len(), 3);
        let alanine = results.outcomes[0].outcome().unwrap();
        assert_eq!(alanine.variable, "alanine");
        assert!(alanine.significant);
        assert_eq!(alanine.group_sizes, vec![4, 4]);
        let citrate = results.outcomes[2].outcome().unwrap();
        assert_eq!(citrate.group_sizes, vec![3, 4]);

        let projection = results.projection.as_ref().unwrap();
        assert_eq!(projection.metrics.n_test, 2);
        assert_eq!(projection.metrics.seed, 42);

        for file in [
            TEST_RESULTS_FILE,
            io::CONDITION_SUMMARY_FILE,
            io::TOP_FEATURES_FILE,
            io::LATENT_SCORES_FILE,
            CLASSIFIER_METRICS_FILE,
            statchill::cli::RUN_CONFIG_FILE,
        ] {
            assert!(output.join(file).exists(), "{} missing", file);
        }

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_projection_with_three_classes() {
        let n = 8;
        let x = Array2::from_shape_fn((3 * n, 4), |(i, j)| {
            let class = (i / n) as f64;
            let jitter = ((i * 7 + j * 13) % 11) as f64 / 10.0;
            match j {
                0 => class * 10.0 + jitter,
                _ => jitter,
            }
        });
        let labels: Vec<String> = (0..3 * n)
            .map(|i| ["ctrl", "drug1", "drug2"][i / n].to_string())
            .collect();
        let options = ProjectionOptions {
            seed: Some(42),
            ..Default::default()
        };
        let out = fit_evaluate(x.view(), &labels, &strings(&["m0", "m1", "m2", "m3"]), &options).unwrap();

        assert_eq!(out.metrics.classes, strings(&["ctrl", "drug1", "drug2"]));
        assert_eq!(out.metrics.n_test, 5);
        assert_eq!(out.metrics.confusion_matrix.len(), 3);
        assert!(out.metrics.confusion_matrix.iter().all(|row| row.len() == 3));
        let total: usize = out.metrics.confusion_matrix.iter().flatten().sum();
        assert_eq!(total, 5);
        assert!(out.metrics.roc.is_none());
        assert!(out.metrics.auc.is_none());
        assert_eq!(out.ranking.entries[0].variable, "m0");

        let predicted = out.model.predict_labels(x.select(ndarray::Axis(0), &out.split.test).view()).unwrap();
        let truth: Vec<String> = out.split.test.iter().map(|&i| labels[i].clone()).collect();
        let correct = predicted.iter().zip(truth.iter()).filter(|(p, t)| p == t).count();
        assert_eq!(correct as f64 / 5.0, out.metrics.accuracy);
        assert_eq!(out.metrics.accuracy, 1.0);
    }

    #[test]
    fn test_execute_projects_on_label_column() {
        let dir = scratch_dir("execute_label");
        fs::write(
            dir.join("metadata.csv"),
            "Sample;Treatment;Batch\n\
             S1;ctrl;a\nS2;ctrl;b\nS3;ctrl;a\nS4;ctrl;b\n\
             S5;drug1;a\nS6;drug1;b\nS7;drug1;a\nS8;drug1;b\n\
             S9;drug2;a\nS10;drug2;b\n",
        )
        .unwrap();
        fs::write(
            dir.join("measurements.csv"),
            "Sample;Alanine;Lactate\n\
             S1;1.0;5.0\nS2;1.2;6.4\nS3;0.9;5.1\nS4;1.1;6.3\n\
             S5;3.0;5.2\nS6;3.2;6.0\nS7;2.9;5.5\nS8;3.1;6.1\n\
             S9;9.0;5.0\nS10;9.5;6.2\n",
        )
        .unwrap();

        let config = RunConfig {
            meta_file_path: Some(dir.join("metadata.csv")),
            file_path: Some(dir.join("measurements.csv")),
            output_path: dir.join("out"),
            column: "Treatment".to_string(),
            conditions: strings(&["ctrl", "drug1"]),
            label_column: Some("Batch".to_string()),
            test_fraction: 0.3,
            ..Default::default()
        };
        let results = statchill::cli::execute(&config).unwrap();

        // the tests stay on the treatment groups
        assert_eq!(results.key.accepted_conditions, strings(&["ctrl", "drug1"]));
        let alanine = results.outcomes[0].outcome().unwrap();
        assert_eq!(alanine.group_sizes, vec![4, 4]);

        // the projection sees every sample under its batch label
        let projection = results.projection.as_ref().unwrap();
        assert_eq!(projection.metrics.classes, strings(&["a", "b"]));
        assert_eq!(projection.metrics.n_train + projection.metrics.n_test, 10);
        assert_eq!(projection.metrics.n_test, 3);
        assert_eq!(projection.scores.len(), 10);
        assert!(projection.scores.iter().all(|row| row.condition == "a" || row.condition == "b"));
        assert!(projection.scores.iter().any(|row| row.sample == "s9"));

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_misspelt_condition_fails_alignment() {
        let (measurements, metadata) = treatment_fixture();
        let err = align(
            &measurements,
            &metadata,
            "Treatment",
            &strings(&["ctrl", "drug1", "drgu2"]),
        )
        .unwrap_err();
        assert!(matches!(err, StatError::EmptyResult(msg) if msg.contains("drgu2")));
    }

    #[test]
    fn test_five_sample_run_keeps_tests_and_projection() {
        // 3 ctrl vs 2 drug1: one held-out sample, PLS-DA still fits
        let table = SampleTable::new(
            strings(&["a", "b", "c", "d", "e"]),
            vec![Variable::new("alanine")],
            array![[1.0], [1.2], [0.9], [3.0], [3.3]],
            strings(&["ctrl", "ctrl", "ctrl", "drug1", "drug1"]),
            strings(&["ctrl", "drug1"]),
        )
        .unwrap();
        let key = RunKey {
            condition_column: "treatment".to_string(),
            accepted_conditions: strings(&["ctrl", "drug1"]),
        };
        let options = RunOptions {
            tests: TestSettings::default(),
            projection: Some(ProjectionOptions {
                seed: Some(42),
                ..Default::default()
            }),
        };
        let results = pipeline::run(key, &table, None, &options, &TukeyHsd).unwrap();
        assert!(results.outcomes[0].outcome().is_some());
        assert!(results.projection_error.is_none());
        assert_eq!(results.projection.as_ref().unwrap().metrics.n_test, 1);
    }
}
