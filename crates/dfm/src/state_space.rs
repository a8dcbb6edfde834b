//! Mixed-frequency state-space representation.
//!
//! For each block `b` with `k` factors the state stacks `L` lags
//! `[f_t, f_{t-1}, …, f_{t-L+1}]`, with `L = max(order + 1, span)` where
//! `span` is the aggregation span if any quarterly series loads on the
//! block. Keeping one lag beyond the VAR order lets the EM step read all
//! cross moments it needs from same-period smoothed covariances.
//!
//! ```text
//! x[t+1] = T x[t] + η[t],   η ~ N(0, Q)    (Q non-zero on each block's f_t)
//! y[t]   = Z x[t] + ε[t],   ε ~ N(0, diag(r))
//! ```
//!
//! With idiosyncratic AR(1) errors, the factor blocks are followed by one
//! group per series stacking `[e_t, e_{t-1}, …]`: two lags for monthly
//! series, `max(2, span)` for quarterly ones, whose row aggregates the lags
//! with the factor weights. `r` then stays at the variance floor.
//!
//! **Not part of the public API.**

use ndarray::{Array1, Array2, s};
use nowcast_panel::Frequency;

use crate::error::DfmError;
use crate::kalman::StateSpace;
use crate::linalg;
use crate::params::DfmParams;
use crate::spec::FactorSpec;

/// Initial state variance used when the transition is not stable.
const FALLBACK_INITIAL_VARIANCE: f64 = 10.0;

static MONTHLY_WEIGHTS: [f64; 1] = [1.0];

/// Position of one block inside the state and factor vectors.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BlockLayout {
    pub(crate) name: String,
    pub(crate) factors: usize,
    pub(crate) order: usize,
    pub(crate) lags: usize,
    /// First state index of the block.
    pub(crate) state_offset: usize,
    /// First column of the block in the loading matrix.
    pub(crate) factor_offset: usize,
}

impl BlockLayout {
    /// State indices of the current factors `f_t`.
    pub(crate) fn current(&self) -> std::ops::Range<usize> {
        self.state_offset..self.state_offset + self.factors
    }

    /// State indices of the VAR regressors `[f_{t-1}, …, f_{t-p}]`.
    pub(crate) fn regressors(&self) -> std::ops::Range<usize> {
        let start = self.state_offset + self.factors;
        start..start + self.factors * self.order
    }

    /// Loading-matrix columns of this block.
    pub(crate) fn loading_columns(&self) -> std::ops::Range<usize> {
        self.factor_offset..self.factor_offset + self.factors
    }
}

/// Position of one series' idiosyncratic AR(1) state.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct IdiosyncraticLayout {
    pub(crate) state_offset: usize,
    pub(crate) lags: usize,
}

/// One observed series of the model.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SeriesLayout {
    pub(crate) id: String,
    pub(crate) frequency: Frequency,
    pub(crate) blocks: Vec<usize>,
}

/// Fixed structure of a model: series, blocks and state layout.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ModelStructure {
    blocks: Vec<BlockLayout>,
    series: Vec<SeriesLayout>,
    idiosyncratic: Vec<IdiosyncraticLayout>,
    weights: Vec<f64>,
    state_dim: usize,
    factor_dim: usize,
}

impl ModelStructure {
    /// Lays out the state for the series carried by the data.
    ///
    /// Monthly series come first, then quarterly ones, each in the given
    /// order. Series the specification assigns but the data lack are skipped.
    pub(crate) fn new(
        spec: &FactorSpec,
        monthly: &[String],
        quarterly: &[String],
    ) -> Result<Self, DfmError> {
        let mut series = Vec::with_capacity(monthly.len() + quarterly.len());
        for (ids, frequency) in [(monthly, Frequency::Monthly), (quarterly, Frequency::Quarterly)] {
            for id in ids {
                let blocks = spec
                    .blocks_of(id)
                    .ok_or_else(|| DfmError::UnassignedSeries { series: id.clone() })?;
                series.push(SeriesLayout {
                    id: id.clone(),
                    frequency,
                    blocks: blocks.to_vec(),
                });
            }
        }

        let aggregation = spec.aggregation();
        let mut blocks = Vec::with_capacity(spec.blocks().len());
        let mut state_offset = 0;
        let mut factor_offset = 0;
        for (b, block) in spec.blocks().iter().enumerate() {
            let members: Vec<&SeriesLayout> =
                series.iter().filter(|s| s.blocks.contains(&b)).collect();
            if members.len() < block.factors() {
                return Err(DfmError::InvalidSpec {
                    reason: format!(
                        "block '{}' has {} factors but only {} series in the data",
                        block.name(),
                        block.factors(),
                        members.len()
                    ),
                });
            }
            let has_quarterly = members.iter().any(|s| s.frequency == Frequency::Quarterly);
            let mut lags = block.order() + 1;
            if has_quarterly {
                lags = lags.max(aggregation.span());
            }
            blocks.push(BlockLayout {
                name: block.name().to_string(),
                factors: block.factors(),
                order: block.order(),
                lags,
                state_offset,
                factor_offset,
            });
            state_offset += block.factors() * lags;
            factor_offset += block.factors();
        }

        let mut idiosyncratic = Vec::new();
        if spec.idiosyncratic_ar1() {
            for s in &series {
                let lags = match s.frequency {
                    Frequency::Monthly => 2,
                    Frequency::Quarterly => aggregation.span().max(2),
                };
                idiosyncratic.push(IdiosyncraticLayout { state_offset, lags });
                state_offset += lags;
            }
        }

        Ok(Self {
            blocks,
            series,
            idiosyncratic,
            weights: aggregation.weights(),
            state_dim: state_offset,
            factor_dim: factor_offset,
        })
    }

    pub(crate) fn blocks(&self) -> &[BlockLayout] {
        &self.blocks
    }

    pub(crate) fn series(&self) -> &[SeriesLayout] {
        &self.series
    }

    /// Idiosyncratic state groups, one per series; empty for white noise.
    pub(crate) fn idiosyncratic(&self) -> &[IdiosyncraticLayout] {
        &self.idiosyncratic
    }

    pub(crate) fn n_series(&self) -> usize {
        self.series.len()
    }

    pub(crate) fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub(crate) fn factor_dim(&self) -> usize {
        self.factor_dim
    }

    pub(crate) fn aggregation_weights(&self) -> &[f64] {
        &self.weights
    }

    pub(crate) fn series_index(&self, id: &str) -> Option<usize> {
        self.series.iter().position(|s| s.id == id)
    }

    /// Ids of the monthly or quarterly series, in model order.
    pub(crate) fn ids(&self, frequency: Frequency) -> Vec<String> {
        self.series
            .iter()
            .filter(|s| s.frequency == frequency)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Loading-matrix columns of series `i`, block by block.
    pub(crate) fn loading_columns(&self, i: usize) -> Vec<usize> {
        self.series[i]
            .blocks
            .iter()
            .flat_map(|&b| self.blocks[b].loading_columns())
            .collect()
    }

    /// Lag weights of series `i`: `[1]` for monthly, the aggregation weights
    /// for quarterly series.
    pub(crate) fn lag_weights(&self, i: usize) -> &[f64] {
        match self.series[i].frequency {
            Frequency::Monthly => &MONTHLY_WEIGHTS[..],
            Frequency::Quarterly => &self.weights[..],
        }
    }

    /// Selector `C_i` mapping the state to the (aggregated) factors series
    /// `i` loads on, so that `y_i = λ_iᵀ C_i x + ε`.
    pub(crate) fn selector(&self, i: usize) -> Array2<f64> {
        let cols = self.loading_columns(i);
        let weights = self.lag_weights(i);
        let mut c = Array2::zeros((cols.len(), self.state_dim));
        let mut row = 0;
        for &b in &self.series[i].blocks {
            let block = &self.blocks[b];
            for f in 0..block.factors {
                for (j, w) in weights.iter().enumerate() {
                    c[[row, block.state_offset + j * block.factors + f]] = *w;
                }
                row += 1;
            }
        }
        c
    }

    /// Builds the state-space matrices for `params`.
    pub(crate) fn state_space(&self, params: &DfmParams) -> StateSpace {
        let m = self.state_dim;
        let mut t = Array2::<f64>::zeros((m, m));
        let mut q = Array2::<f64>::zeros((m, m));
        for (b, block) in self.blocks.iter().enumerate() {
            let o = block.state_offset;
            let k = block.factors;
            let kp = k * block.order;
            t.slice_mut(s![o..o + k, o..o + kp])
                .assign(&params.transition()[b]);
            for lag in 1..block.lags {
                for f in 0..k {
                    t[[o + lag * k + f, o + (lag - 1) * k + f]] = 1.0;
                }
            }
            q.slice_mut(s![o..o + k, o..o + k])
                .assign(&params.process_cov()[b]);
        }
        for (i, idio) in self.idiosyncratic.iter().enumerate() {
            let o = idio.state_offset;
            t[[o, o]] = params.idiosyncratic_ar()[i];
            for lag in 1..idio.lags {
                t[[o + lag, o + lag - 1]] = 1.0;
            }
            q[[o, o]] = params.idiosyncratic_var()[i];
        }

        let mut z = Array2::<f64>::zeros((self.n_series(), m));
        for i in 0..self.n_series() {
            z.row_mut(i).assign(&self.design_row(i, params));
        }

        let p0 = linalg::discrete_lyapunov(&t, &q)
            .unwrap_or_else(|| Array2::eye(m) * FALLBACK_INITIAL_VARIANCE);

        StateSpace {
            t,
            z,
            q,
            h: params.obs_var().clone(),
            a0: Array1::zeros(m),
            p0,
        }
    }

    /// Row `i` of the design matrix: `λ_iᵀ C_i`, plus the series' own
    /// idiosyncratic lags.
    pub(crate) fn design_row(&self, i: usize, params: &DfmParams) -> Array1<f64> {
        let lambda = self.loadings_of(i, params);
        let row = self.selector(i).t().dot(&lambda);
        match self.idiosyncratic_row(i) {
            Some(d) => row + d,
            None => row,
        }
    }

    /// Weights of series `i`'s idiosyncratic lags over the state, or `None`
    /// without idiosyncratic states.
    pub(crate) fn idiosyncratic_row(&self, i: usize) -> Option<Array1<f64>> {
        let idio = self.idiosyncratic.get(i)?;
        let mut d = Array1::zeros(self.state_dim);
        for (j, w) in self.lag_weights(i).iter().enumerate() {
            d[idio.state_offset + j] = *w;
        }
        Some(d)
    }

    /// Free loadings `λ_i` of series `i`.
    pub(crate) fn loadings_of(&self, i: usize, params: &DfmParams) -> Array1<f64> {
        let row = params.loadings().row(i);
        Array1::from_iter(self.loading_columns(i).into_iter().map(|c| row[c]))
    }

    /// Number of free parameters, for information criteria.
    pub(crate) fn n_parameters(&self) -> usize {
        let loadings: usize = (0..self.n_series())
            .map(|i| self.loading_columns(i).len())
            .sum();
        let dynamics: usize = self
            .blocks
            .iter()
            .map(|b| b.factors * b.factors * b.order + b.factors * (b.factors + 1) / 2)
            .sum();
        let noise = if self.idiosyncratic.is_empty() {
            self.n_series()
        } else {
            2 * self.n_series()
        };
        loadings + dynamics + noise
    }
}
