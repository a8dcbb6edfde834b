//! Vintage-by-vintage nowcasting.

use std::sync::Arc;

use chrono::NaiveDate;
use nowcast_calendar::Quarter;
use nowcast_dfm::{Convergence, FactorSpec, FittedModel, NewsRequest, news};
use nowcast_history::{NewsHistory, NewsRecord, NowcastHistory, NowcastRecord};
use nowcast_panel::{Frequency, SeriesCatalog, StandardizationBook, Vintage};
use tracing::{debug, info, info_span, warn};

use crate::config::{PipelineConfig, RefitPolicy};
use crate::error::PipelineError;

/// What processing one vintage produced.
#[derive(Debug, Clone, PartialEq)]
pub struct VintageOutcome {
    /// Release date of the vintage.
    pub release_date: NaiveDate,
    /// Quarter nowcast (and standardization epoch).
    pub quarter: Quarter,
    /// `true` if this vintage opened a new standardization epoch.
    pub epoch_start: bool,
    /// `true` if model parameters were estimated on this vintage.
    pub estimated: bool,
    /// EM status of the model used for this vintage.
    pub convergence: Convergence,
    /// The nowcast appended to the history.
    pub nowcast: NowcastRecord,
    /// Number of news rows appended to the history.
    pub news_rows: usize,
}

/// Summary of [`Nowcaster::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Outcomes of the vintages that were processed, in release order.
    pub processed: Vec<VintageOutcome>,
    /// Vintages that failed, with the reason; their rows were not written.
    pub skipped: Vec<(NaiveDate, String)>,
}

/// Runs the nowcast on a sequence of vintages and keeps the history tables.
///
/// For each vintage, in release order:
///
/// 1. drop periods before the configured sample start;
/// 2. take the standardization parameters of the vintage's quarter, fixing
///    them on the first vintage of the quarter;
/// 3. estimate the model at the start of an epoch, otherwise re-filter (or
///    re-estimate, per [`RefitPolicy`]) the previous model;
/// 4. nowcast the targets for the vintage's quarter;
/// 5. decompose the revision since the previous vintage into news, when both
///    vintages share an epoch;
/// 6. append the nowcast and news rows to the histories, replacing any rows
///    an earlier run stored for the same vintage.
///
/// A vintage that fails at any step leaves the histories and the current
/// model untouched.
///
/// # Example
///
/// ```ignore
/// let mut nowcaster = Nowcaster::new(PipelineConfig::new(), catalog)?;
/// let summary = nowcaster.run(vintages);
/// write_nowcast_history(&path, nowcaster.nowcasts(), &WriterConfig::default())?;
/// ```
#[derive(Debug, Clone)]
pub struct Nowcaster {
    config: PipelineConfig,
    catalog: SeriesCatalog,
    spec: FactorSpec,
    book: StandardizationBook,
    model: Option<FittedModel>,
    last_release: Option<NaiveDate>,
    nowcasts: NowcastHistory,
    news: NewsHistory,
}

impl Nowcaster {
    /// Creates a pipeline with empty histories.
    ///
    /// The factor specification is derived from `catalog`: every series
    /// loads on the global block and on its broad sector's block.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`PipelineError::InvalidConfig`] / [`PipelineError::Dfm`] / [`PipelineError::Panel`] | `config` fails validation |
    /// | [`PipelineError::UnknownTarget`] | a target is not a quarterly series of `catalog` |
    /// | [`PipelineError::Dfm`] | the factor specification cannot be built |
    pub fn new(config: PipelineConfig, catalog: SeriesCatalog) -> Result<Self, PipelineError> {
        config.validate()?;
        if let Some(target) = config.targets().iter().find(|t| {
            catalog
                .get(t.as_str())
                .is_none_or(|m| m.frequency() != Frequency::Quarterly)
        }) {
            return Err(PipelineError::UnknownTarget {
                target: target.clone(),
            });
        }
        let spec = FactorSpec::from_catalog(
            &catalog,
            config.multiplicities(),
            config.default_factors(),
            config.factor_order(),
            config.aggregation().clone(),
        )?
        .with_idiosyncratic_ar1(config.idiosyncratic_ar1());
        info!(
            series = catalog.len(),
            blocks = spec.blocks().len(),
            aggregation = ?spec.aggregation(),
            targets = config.targets().len(),
            "nowcaster ready"
        );
        Ok(Self {
            book: StandardizationBook::new(config.standardize().clone()),
            config,
            catalog,
            spec,
            model: None,
            last_release: None,
            nowcasts: NowcastHistory::new(),
            news: NewsHistory::new(),
        })
    }

    /// Starts from previously stored histories.
    ///
    /// Rows for vintages processed again are superseded, not duplicated.
    pub fn with_history(mut self, nowcasts: NowcastHistory, news: NewsHistory) -> Self {
        self.nowcasts = nowcasts;
        self.news = news;
        self
    }

    /// Processes every vintage in release order, logging and skipping the
    /// ones that fail.
    pub fn run<I>(&mut self, vintages: I) -> RunSummary
    where
        I: IntoIterator<Item = Vintage>,
    {
        let mut vintages: Vec<Vintage> = vintages.into_iter().collect();
        vintages.sort_by_key(Vintage::release_date);

        let mut summary = RunSummary::default();
        for vintage in &vintages {
            match self.process(vintage) {
                Ok(outcome) => summary.processed.push(outcome),
                Err(e) => {
                    warn!(release_date = %vintage.release_date(), error = %e, "skipping vintage");
                    summary.skipped.push((vintage.release_date(), e.to_string()));
                }
            }
        }
        info!(
            processed = summary.processed.len(),
            skipped = summary.skipped.len(),
            "run complete"
        );
        summary
    }

    /// Processes one vintage.
    ///
    /// # Errors
    ///
    /// | Variant | Trigger |
    /// |---------|---------|
    /// | [`PipelineError::OutOfOrder`] | `vintage` is not newer than the last processed vintage |
    /// | [`PipelineError::Panel`] | standardization fails (e.g. a series has too few observations) |
    /// | [`PipelineError::Dfm`] | estimation, filtering, forecasting or news fails |
    ///
    /// On error nothing is recorded.
    pub fn process(&mut self, vintage: &Vintage) -> Result<VintageOutcome, PipelineError> {
        let release_date = vintage.release_date();
        let _span = info_span!("vintage", %release_date).entered();
        if let Some(last) = self.last_release.filter(|last| release_date <= *last) {
            return Err(PipelineError::OutOfOrder { release_date, last });
        }

        let vintage = match self.config.sample_start() {
            Some(start) => vintage.since(start),
            None => vintage.clone(),
        };
        let quarter = vintage.quarter();
        let epoch_start = self.book.get(quarter).is_none();
        let mut book = self.book.clone();
        let standardization = book.params_for(&vintage)?;

        let previous = self
            .model
            .as_ref()
            .filter(|m| Arc::ptr_eq(m.standardization(), &standardization));
        let (model, estimated) = match (previous, self.config.refit()) {
            (Some(prev), RefitPolicy::EpochStart) => (prev.refilter(&vintage)?, false),
            (Some(prev), RefitPolicy::EveryVintage) => (prev.reestimate(&vintage, self.config.em())?, true),
            (None, _) => {
                let spec = self.spec.without_series(standardization.excluded());
                (spec.fit(&vintage, Arc::clone(&standardization), self.config.em())?, true)
            }
        };

        let nowcast = self.target_record(&model)?;
        let news_rows = match previous {
            Some(prev) => self.news_rows(prev, &model)?,
            None => {
                debug!("no earlier vintage in this epoch; skipping news");
                Vec::new()
            }
        };
        let n_news = news_rows.len();

        self.nowcasts.append(vec![nowcast.clone()])?;
        // an empty batch still clears rows stored for this vintage by an earlier run
        self.news.replace((quarter, release_date), news_rows)?;
        self.book = book;
        self.last_release = Some(release_date);
        let convergence = model.convergence();
        self.model = Some(model);

        info!(
            %quarter,
            epoch_start,
            estimated,
            %convergence,
            news_rows = n_news,
            "processed vintage"
        );
        Ok(VintageOutcome {
            release_date,
            quarter,
            epoch_start,
            estimated,
            convergence,
            nowcast,
            news_rows: n_news,
        })
    }

    fn target_record(&self, model: &FittedModel) -> Result<NowcastRecord, PipelineError> {
        let mut record = model.nowcast_record()?;
        record.values.retain(|k, _| self.config.targets().contains(k));
        for target in self.config.targets() {
            if !record.values.contains_key(target) {
                warn!(variable = %target, "target not in the model; no nowcast");
            }
        }
        Ok(record)
    }

    fn news_rows(&self, previous: &FittedModel, current: &FittedModel) -> Result<Vec<NewsRecord>, PipelineError> {
        let targets = self
            .config
            .targets()
            .iter()
            .filter(|t| current.series().any(|s| s == t.as_str()));
        let request = NewsRequest::new(targets.cloned()).with_catalog(self.catalog.clone());
        Ok(news(previous, current, &request)?.into_records())
    }

    /// Nowcast history.
    pub fn nowcasts(&self) -> &NowcastHistory {
        &self.nowcasts
    }

    /// News history.
    pub fn news(&self) -> &NewsHistory {
        &self.news
    }

    /// Model of the last processed vintage.
    pub fn model(&self) -> Option<&FittedModel> {
        self.model.as_ref()
    }

    /// Standardization epochs opened so far.
    pub fn book(&self) -> &StandardizationBook {
        &self.book
    }

    /// Factor specification derived from the catalog.
    pub fn spec(&self) -> &FactorSpec {
        &self.spec
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Consumes the pipeline, returning the nowcast and news histories.
    pub fn into_histories(self) -> (NowcastHistory, NewsHistory) {
        (self.nowcasts, self.news)
    }
}
