//! Plain-text report of the model comparison.

use std::fmt::Write;

use crate::model::FittedModel;

use super::{LrtResult, PreferredModel, WaldResult};

/// Side-by-side fixed effects, the LRT, Wald tests and the chosen model.
pub fn comparison_report(
    hom: &FittedModel,
    het: &FittedModel,
    lrt: &LrtResult,
    wald: &[WaldResult],
    alpha: f64,
    preferred: PreferredModel,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Model comparison for '{}'", hom.outcome);
    let _ = writeln!(out, "Samples: {}", hom.n_samples);

    let _ = writeln!(out, "\nFixed effects (homoskedastic | heteroskedastic):");
    let _ = writeln!(
        out,
        "{:<24} {:>12} {:>10} {:>12} {:>10}",
        "term", "hom", "SE", "het", "SE"
    );
    for (a, b) in hom.fixed_effects.iter().zip(&het.fixed_effects) {
        let _ = writeln!(
            out,
            "{:<24} {:>12.4} {:>10.4} {:>12.4} {:>10.4}",
            a.name, a.estimate, a.std_error, b.estimate, b.std_error
        );
    }

    let _ = writeln!(out, "\nVariance components:");
    for (label, model) in [("hom", hom), ("het", het)] {
        for vc in &model.variance_components {
            let _ = writeln!(
                out,
                "  {:<4} {:<24} {:>12.4} {:>10.4}",
                label, vc.name, vc.estimate, vc.std_error
            );
        }
    }

    let _ = writeln!(out, "\nLikelihood-ratio test (REML):");
    let _ = writeln!(
        out,
        "  logLik hom = {:.4}, het = {:.4}",
        lrt.null_loglik, lrt.alt_loglik
    );
    let _ = writeln!(
        out,
        "  chisq = {:.4}, df = {}, p = {:.4e}",
        lrt.statistic, lrt.df, lrt.p_value
    );

    if !wald.is_empty() {
        let _ = writeln!(out, "\nWald tests:");
        for w in wald {
            let _ = writeln!(
                out,
                "  {:<12} chisq = {:.4}, df = {}, p = {:.4e}  [{}]",
                w.term,
                w.statistic,
                w.df,
                w.p_value,
                w.coefficients.join(", ")
            );
        }
    }

    let _ = writeln!(out, "\nPreferred model at alpha = {}: {}", alpha, preferred);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{likelihood_ratio_test, preferred_model, wald_test};
    use crate::model::fitted::tests::toy_model;

    #[test]
    fn test_report_mentions_all_parts() {
        let hom = toy_model(false, -100.0);
        let het = toy_model(true, -90.0);
        let lrt = likelihood_ratio_test(&hom, &het).unwrap();
        let wald = vec![wald_test(&hom, "study").unwrap()];
        let report = comparison_report(&hom, &het, &lrt, &wald, 0.05, preferred_model(&lrt, 0.05));

        assert!(report.contains("studyb"));
        assert!(report.contains("V_resid"));
        assert!(report.contains("df = 1"));
        assert!(report.contains("heteroskedastic"));
    }
}
