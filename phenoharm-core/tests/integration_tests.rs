//! End-to-end tests on simulated multi-study height data.
//!
//! Three studies of sibling pairs are written to disk as phenotype tables
//! together with a relatedness matrix, then taken through harmonization,
//! alignment, both model fits, the comparisons and residual diagnostics.

use std::collections::BTreeMap;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use phenoharm_core::compare::{likelihood_ratio_test, preferred_model, wald_test};
use phenoharm_core::describe::{category_counts, numeric_summaries_by};
use phenoharm_core::lmm::{fit_null_model, CovarianceMatrix, RemlConfig};
use phenoharm_core::model::FittedModel;
use phenoharm_core::residuals::attach_residuals;
use phenoharm_data::relatedness::{read_relatedness, write_dense_text};
use phenoharm_data::sample::{align_to_matrix, attach_sample_ids, complete_cases, sample_ids};
use phenoharm_data::table::{read_table, write_table};
use phenoharm_data::{
    concatenate, AnnotatedTable, Column, IdScheme, RelatednessMatrix, StudyTable, Table,
    SAMPLE_ID_COLUMN, STUDY_COLUMN,
};
use phenoharm_linalg::DenseMatrix;

const STUDIES: [&str; 3] = ["study_1", "study_2", "study_3"];
const FAMILIES_PER_STUDY: usize = 30;

fn normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-300);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Simulate one study of sibling pairs. `resid_sd` is the residual SD.
fn simulate_study(rng: &mut ChaCha8Rng, offset: f64, resid_sd: f64) -> Table {
    let n = FAMILIES_PER_STUDY * 2;
    let mut ids = Vec::with_capacity(n);
    let mut sex = Vec::with_capacity(n);
    let mut age = Vec::with_capacity(n);
    let mut height = Vec::with_capacity(n);
    for fam in 0..FAMILIES_PER_STUDY {
        let shared = normal(rng);
        for sib in 0..2 {
            let male = rng.gen::<bool>();
            let a = 20.0 + 50.0 * rng.gen::<f64>();
            // Sibling genetic values with correlation 0.5 and variance 16.
            let g = 4.0 * (0.5f64.sqrt() * shared + 0.5f64.sqrt() * normal(rng));
            ids.push(Some(format!("{}", fam * 2 + sib + 1)));
            sex.push(Some(if male { "M" } else { "F" }.to_string()));
            age.push(a);
            height.push(160.0 + offset + if male { 12.0 } else { 0.0 } - 0.05 * a + g + resid_sd * normal(rng));
        }
    }
    Table::from_columns(vec![
        Column::categorical("subject_id", ids),
        Column::categorical("sex", sex),
        Column::numeric("age", age),
        Column::numeric("height", height),
    ])
    .unwrap()
}

/// Relatedness matrix over all simulated subjects (sibling kinship 0.5) in
/// reverse order, plus two samples without phenotypes.
fn simulated_relatedness() -> RelatednessMatrix {
    let mut ids = Vec::new();
    for study in STUDIES {
        for i in 1..=FAMILIES_PER_STUDY * 2 {
            ids.push(format!("{}_{}", study, i));
        }
    }
    ids.reverse();
    ids.push("unphenotyped_1".into());
    ids.push("unphenotyped_2".into());

    let family = |id: &str| -> Option<(String, usize)> {
        let (study, subject) = id.rsplit_once('_')?;
        let subject: usize = subject.parse().ok()?;
        Some((study.to_string(), (subject - 1) / 2))
    };
    let n = ids.len();
    let m = DenseMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else {
            match (family(&ids[i]), family(&ids[j])) {
                (Some(a), Some(b)) if a == b && !ids[i].starts_with("unpheno") => 0.5,
                _ => 0.0,
            }
        }
    });
    RelatednessMatrix::new(ids, m).unwrap()
}

fn descriptions(table: &Table) -> BTreeMap<String, String> {
    table
        .column_names()
        .into_iter()
        .map(|c| {
            let text = format!("{} as recorded by each study", c);
            (c, text)
        })
        .collect()
}

struct Prepared {
    combined: Table,
    annotated: AnnotatedTable,
    grm: RelatednessMatrix,
}

/// Write studies and matrix to `dir`, read them back and prepare for fitting.
fn prepare(dir: &Path, resid_sds: [f64; 3], seed: u64) -> Prepared {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let offsets = [0.0, 2.0, -1.0];
    let mut studies = Vec::new();
    for (k, name) in STUDIES.iter().enumerate() {
        let mut table = simulate_study(&mut rng, offsets[k], resid_sds[k]);
        if k == 1 {
            // One unmeasured height.
            let mut h = table.numeric("height").unwrap().to_vec();
            h[3] = f64::NAN;
            table.set_column(Column::numeric("height", h)).unwrap();
        }
        let path = dir.join(format!("pheno_{}.txt", name));
        write_table(&table, &path).unwrap();
        let read = read_table(&path, &["subject_id".to_string()]).unwrap();
        studies.push(StudyTable::new(*name, read));
    }

    let grm_path = dir.join("grm.txt");
    write_dense_text(&simulated_relatedness(), &grm_path).unwrap();
    let grm = read_relatedness(&grm_path).unwrap();

    let mut combined = concatenate(&studies).unwrap();
    attach_sample_ids(&mut combined, "subject_id", IdScheme::StudySubject).unwrap();

    let (complete, _) = complete_cases(&combined, &["height", "sex", "age", STUDY_COLUMN]).unwrap();
    let aligned = align_to_matrix(&complete, SAMPLE_ID_COLUMN, &grm).unwrap();
    let annotated =
        AnnotatedTable::new(aligned.table, &descriptions(&combined), SAMPLE_ID_COLUMN).unwrap();

    Prepared {
        combined,
        annotated,
        grm: aligned.matrix,
    }
}

fn covariates() -> Vec<String> {
    vec!["sex".into(), "age".into(), STUDY_COLUMN.into()]
}

fn fit_both(p: &Prepared, config: &RemlConfig) -> (FittedModel, FittedModel) {
    let covs = [CovarianceMatrix {
        name: "grm",
        matrix: &p.grm,
    }];
    let hom = fit_null_model(&p.annotated, "height", &covariates(), &covs, None, config).unwrap();
    let het = fit_null_model(
        &p.annotated,
        "height",
        &covariates(),
        &covs,
        Some(STUDY_COLUMN),
        config,
    )
    .unwrap();
    (hom, het)
}

mod harmonization {
    use super::*;

    #[test]
    fn test_combined_table_and_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let p = prepare(dir.path(), [4.0, 4.0, 4.0], 1);

        assert_eq!(p.combined.n_rows(), 3 * FAMILIES_PER_STUDY * 2);
        assert_eq!(
            p.combined.column_names(),
            vec!["subject_id", "sex", "age", "height", STUDY_COLUMN, SAMPLE_ID_COLUMN]
        );

        // One row lost to a missing height, two matrix samples without phenotypes.
        let ids = p.annotated.sample_ids().unwrap();
        assert_eq!(ids.len(), p.combined.n_rows() - 1);
        assert_eq!(ids, p.grm.sample_ids());
        assert_eq!(ids[0], "study_3_60");

        let counts = category_counts(&p.combined, STUDY_COLUMN, "sex").unwrap();
        assert_eq!(counts.groups.len(), 3);
        let total: usize = counts.groups.iter().flat_map(|(_, c)| c.iter()).sum();
        assert_eq!(total, p.combined.n_rows());

        let summaries = numeric_summaries_by(&p.combined, STUDY_COLUMN, "height").unwrap();
        assert_eq!(summaries[1].1.n_missing, 1);
    }
}

mod model_comparison {
    use super::*;

    #[test]
    fn test_equal_residual_variances() {
        let dir = tempfile::tempdir().unwrap();
        let p = prepare(dir.path(), [4.0, 4.0, 4.0], 2);
        let config = RemlConfig {
            tol: 1e-6,
            ..RemlConfig::default()
        };
        let (hom, het) = fit_both(&p, &config);

        assert!(hom.converged && het.converged);
        assert_eq!(hom.fixed_effect_names(), het.fixed_effect_names());
        assert_eq!(
            hom.fixed_effect_names(),
            vec!["(Intercept)", "sexM", "age", "studystudy_2", "studystudy_3"]
        );

        // Fixed effects agree when residual variances are in fact equal.
        for (a, b) in hom.fixed_effects.iter().zip(&het.fixed_effects) {
            assert!(
                (a.estimate - b.estimate).abs() < 0.5 * a.std_error,
                "{}: {} vs {} (SE {})",
                a.name,
                a.estimate,
                b.estimate,
                a.std_error
            );
        }
        let sex = &hom.fixed_effects[1];
        assert!((sex.estimate - 12.0).abs() < 4.0 * sex.std_error);

        let lrt = likelihood_ratio_test(&hom, &het).unwrap();
        assert!(lrt.statistic >= 0.0);
        assert_eq!(lrt.df, 2);
        assert!(lrt.p_value >= 0.0 && lrt.p_value <= 1.0);

        let wald = wald_test(&hom, STUDY_COLUMN).unwrap();
        assert_eq!(wald.df, 2);
        assert!(wald.statistic >= 0.0);
    }

    #[test]
    fn test_unequal_residual_variances_favour_heteroskedastic() {
        let dir = tempfile::tempdir().unwrap();
        let p = prepare(dir.path(), [2.0, 4.0, 10.0], 3);
        let (hom, het) = fit_both(&p, &RemlConfig::default());

        let lrt = likelihood_ratio_test(&hom, &het).unwrap();
        assert!(lrt.p_value < 0.05, "p = {}", lrt.p_value);
        assert_eq!(
            preferred_model(&lrt, 0.05),
            phenoharm_core::compare::PreferredModel::Heteroskedastic
        );

        let low = het.variance_component("V_resid.study_1").unwrap().estimate;
        let high = het.variance_component("V_resid.study_3").unwrap().estimate;
        assert!(high > low);
    }
}

mod residual_diagnostics {
    use super::*;

    #[test]
    fn test_residuals_realign_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let p = prepare(dir.path(), [4.0, 4.0, 4.0], 4);
        let (hom, _) = fit_both(&p, &RemlConfig::default());

        let mut combined = p.combined.clone();
        let matched = attach_residuals(&mut combined, SAMPLE_ID_COLUMN, &hom, "resid").unwrap();
        assert_eq!(matched, combined.n_rows() - 1);

        // Residual = height - fitted for a row picked by ID.
        let ids = sample_ids(&combined, SAMPLE_ID_COLUMN).unwrap();
        let heights = combined.numeric("height").unwrap();
        let resid = combined.numeric("resid").unwrap();
        let row = ids.iter().position(|id| id == "study_1_7").unwrap();
        let pos = hom.sample_ids.iter().position(|id| id == "study_1_7").unwrap();
        assert!((heights[row] - hom.fitted[pos] - resid[row]).abs() < 1e-9);

        // The row with a missing height has no residual.
        assert_eq!(resid.iter().filter(|r| r.is_nan()).count(), 1);

        // Marginal residuals sum to roughly zero per study: the study
        // indicators absorb the study means.
        let by_study = numeric_summaries_by(&combined, STUDY_COLUMN, "resid").unwrap();
        for (_, s) in by_study {
            assert!(s.mean.abs() < 3.0, "mean residual {}", s.mean);
        }
    }
}
