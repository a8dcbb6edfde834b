//! Run command: process every vintage and update the history tables.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, info_span, warn};

use nowcast_history::{NewsHistory, NowcastHistory};
use nowcast_io::{
    list_vintages, read_catalog, read_news_history, read_nowcast_history, read_vintage,
    write_news_history, write_nowcast_history,
};
use nowcast_pipeline::Nowcaster;

use crate::cli::RunArgs;
use crate::{CATALOG_FILE, NEWS_FILE, NOWCAST_FILE, config, convert};

/// Run the nowcast over all vintages in the data directory.
pub fn run(args: RunArgs) -> Result<()> {
    let _cmd = info_span!("run").entered();
    // 1. Load project TOML
    let config = config::load(&args.config)?;
    let data = args.data.unwrap_or_else(|| config.io.data.clone());
    let output = args.output.unwrap_or_else(|| config.io.output.clone());
    let pipeline_cfg = convert::build_pipeline_config(&config)?;
    let writer_cfg = convert::build_writer_config(&config.io)?;

    // 2. Catalog and vintage listing
    let catalog_path = data.join(CATALOG_FILE);
    let catalog = read_catalog(&catalog_path)
        .with_context(|| format!("failed to read catalog: {}", catalog_path.display()))?;
    let entries = list_vintages(&data)
        .with_context(|| format!("failed to list vintages in {}", data.display()))?;
    if entries.is_empty() {
        bail!("no vintage directories (YYYY-MM-DD) found in {}", data.display());
    }
    info!(series = catalog.len(), vintages = entries.len(), "data directory scanned");

    // 3. Read vintages; unreadable ones are skipped like failed ones
    let mut vintages = Vec::with_capacity(entries.len());
    for entry in &entries {
        match read_vintage(entry.path()) {
            Ok(v) => vintages.push(v),
            Err(e) => warn!(release_date = %entry.release_date(), error = %e, "skipping unreadable vintage"),
        }
    }

    // 4. Resume from stored histories
    let nowcast_path = output.join(NOWCAST_FILE);
    let news_path = output.join(NEWS_FILE);
    let (nowcasts, news) = if args.fresh {
        (NowcastHistory::new(), NewsHistory::new())
    } else {
        load_histories(&nowcast_path, &news_path)?
    };

    // 5. Process
    let mut nowcaster = Nowcaster::new(pipeline_cfg, catalog)
        .context("failed to set up the nowcast")?
        .with_history(nowcasts, news);
    let summary = nowcaster.run(vintages);
    for (date, reason) in &summary.skipped {
        eprintln!("skipped vintage {date}: {reason}");
    }
    if summary.processed.is_empty() {
        bail!("no vintage could be processed");
    }

    // 6. Write histories
    let (nowcasts, news) = nowcaster.into_histories();
    write_nowcast_history(&nowcast_path, &nowcasts, &writer_cfg)
        .with_context(|| format!("failed to write {}", nowcast_path.display()))?;
    write_news_history(&news_path, &news, &writer_cfg)
        .with_context(|| format!("failed to write {}", news_path.display()))?;
    info!(
        processed = summary.processed.len(),
        skipped = summary.skipped.len(),
        nowcast_rows = nowcasts.len(),
        news_rows = news.len(),
        output = %output.display(),
        "histories written"
    );

    Ok(())
}

fn load_histories(nowcast_path: &Path, news_path: &Path) -> Result<(NowcastHistory, NewsHistory)> {
    let nowcasts = if nowcast_path.exists() {
        read_nowcast_history(nowcast_path)
            .with_context(|| format!("failed to read {}", nowcast_path.display()))?
    } else {
        NowcastHistory::new()
    };
    let news = if news_path.exists() {
        read_news_history(news_path)
            .with_context(|| format!("failed to read {}", news_path.display()))?
    } else {
        NewsHistory::new()
    };
    info!(nowcast_rows = nowcasts.len(), news_rows = news.len(), "resuming from stored histories");
    Ok((nowcasts, news))
}
