//! BIC-based choice among candidate factor specifications.

use std::sync::Arc;

use nowcast_panel::{StandardizationParams, Vintage};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::em::EmConfig;
use crate::error::DfmError;
use crate::fit::FittedModel;
use crate::spec::FactorSpec;

/// Fits every candidate specification on `vintage` in parallel and returns
/// the model with the lowest [`FittedModel::bic()`].
///
/// Candidates that fail to fit are logged and skipped. Ties keep the
/// earlier candidate.
///
/// # Errors
///
/// | Variant | Trigger |
/// |---------|---------|
/// | [`DfmError::NoCandidates`] | `candidates` is empty or every candidate failed to fit |
///
/// # Example
///
/// ```ignore
/// let best = select_best_bic(&[one_factor, two_factors], &vintage, params, &EmConfig::new())?;
/// println!("BIC = {}", best.bic());
/// ```
pub fn select_best_bic(
    candidates: &[FactorSpec],
    vintage: &Vintage,
    standardization: Arc<StandardizationParams>,
    config: &EmConfig,
) -> Result<FittedModel, DfmError> {
    let fits: Vec<(usize, FittedModel)> = candidates
        .par_iter()
        .enumerate()
        .filter_map(|(k, spec)| {
            match spec.fit(vintage, Arc::clone(&standardization), config) {
                Ok(model) => Some((k, model)),
                Err(e) => {
                    warn!(candidate = k, error = %e, "candidate specification failed to fit");
                    None
                }
            }
        })
        .collect();

    let best = fits
        .into_iter()
        .min_by(|(i, a), (j, b)| a.bic().total_cmp(&b.bic()).then(i.cmp(j)))
        .ok_or(DfmError::NoCandidates {
            candidates: candidates.len(),
        })?;
    info!(candidate = best.0, bic = best.1.bic(), "selected specification");
    Ok(best.1)
}
