//! Model serialization and deserialization.
//!
//! Uses bincode for compact binary files (`.phmd`): the payload carries the
//! magic bytes (PHMD) and a version, checked on load.
//! Optional JSON sidecar for human inspection.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};

use super::fitted::FittedModel;

/// Save a fitted model to a binary file (.phmd).
pub fn save_model(model: &FittedModel, path: &Path) -> Result<()> {
    let encoded = bincode::serialize(model)?;
    std::fs::write(path, &encoded)
        .with_context(|| format!("Failed to write model: {}", path.display()))?;
    Ok(())
}

/// Load a fitted model from a binary file (.phmd).
pub fn load_model(path: &Path) -> Result<FittedModel> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read model: {}", path.display()))?;
    let model: FittedModel = bincode::deserialize(&data)
        .with_context(|| format!("{} is not a phenoharm model file", path.display()))?;

    if model.magic != FittedModel::MAGIC {
        bail!(
            "Invalid model file: expected magic bytes {:?}, got {:?}",
            FittedModel::MAGIC,
            model.magic
        );
    }
    if model.version > FittedModel::VERSION {
        bail!(
            "Model file version {} is newer than supported version {}",
            model.version,
            FittedModel::VERSION
        );
    }

    Ok(model)
}

/// Save a JSON sidecar (.phmd.json).
pub fn save_model_json(model: &FittedModel, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(model)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Summary of a fitted model (for display).
pub fn model_summary(model: &FittedModel) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Linear mixed model v{}", model.version);
    let _ = writeln!(out, "Outcome: {}", model.outcome);
    let _ = writeln!(out, "Samples: {}", model.n_samples);
    let _ = writeln!(
        out,
        "Residual variance: {}",
        match &model.group_var {
            Some(g) if model.het_resid => format!("heteroskedastic by '{}'", g),
            _ => "homoskedastic".to_string(),
        }
    );
    let _ = writeln!(
        out,
        "Converged: {} ({} iterations)",
        if model.converged { "yes" } else { "no" },
        model.iterations
    );
    let _ = writeln!(out, "REML log-likelihood: {:.4}", model.reml_loglik);
    let _ = writeln!(out, "ML log-likelihood: {:.4}", model.ml_loglik);

    let _ = writeln!(out, "\nFixed effects:");
    let _ = writeln!(
        out,
        "{:<24} {:>12} {:>10} {:>10} {:>10}",
        "term", "estimate", "SE", "Wald", "p"
    );
    for fe in &model.fixed_effects {
        let _ = writeln!(
            out,
            "{:<24} {:>12.4} {:>10.4} {:>10.3} {:>10.3e}",
            fe.name, fe.estimate, fe.std_error, fe.wald_chisq, fe.p_value
        );
    }

    let _ = writeln!(out, "\nVariance components:");
    let _ = writeln!(out, "{:<24} {:>12} {:>10}", "component", "estimate", "SE");
    for vc in &model.variance_components {
        let _ = writeln!(
            out,
            "{:<24} {:>12.4} {:>10.4}{}",
            vc.name,
            vc.estimate,
            vc.std_error,
            if vc.at_boundary { "  (boundary)" } else { "" }
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fitted::tests::toy_model;

    #[test]
    fn test_save_load_roundtrip() {
        let model = toy_model(true, -12.5);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("het.phmd");

        save_model(&model, &path).unwrap();
        let loaded = load_model(&path).unwrap();

        assert_eq!(loaded.n_samples, 3);
        assert_eq!(loaded.sample_ids, vec!["S1", "S2", "S3"]);
        assert_eq!(loaded.fixed_effects, model.fixed_effects);
        assert_eq!(loaded.variance_components, model.variance_components);
        assert_eq!(loaded.group_var.as_deref(), Some("study"));
        assert!((loaded.reml_loglik + 12.5).abs() < 1e-12);
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let mut model = toy_model(false, -3.0);
        model.magic = *b"SGMD";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.phmd");
        save_model(&model, &path).unwrap();
        assert!(load_model(&path).is_err());
    }

    #[test]
    fn test_json_and_summary() {
        let model = toy_model(false, -3.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.phmd.json");
        save_model_json(&model, &path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["outcome"], "height");

        let summary = model_summary(&model);
        assert!(summary.contains("homoskedastic"));
        assert!(summary.contains("studyb"));
        assert!(summary.contains("V_resid"));
    }
}
