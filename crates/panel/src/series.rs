//! Series metadata and the catalog that groups it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PanelError;

/// Sampling frequency of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// Observed every month.
    Monthly,
    /// Observed once per quarter, dated at the quarter's last month.
    Quarterly,
}

impl FromStr for Frequency {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "M" | "m" | "monthly" => Ok(Self::Monthly),
            "Q" | "q" | "quarterly" => Ok(Self::Quarterly),
            other => Err(PanelError::InvalidFrequency {
                code: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Monthly => "M",
            Self::Quarterly => "Q",
        })
    }
}

/// Descriptive metadata for one series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesMeta {
    id: String,
    label: String,
    frequency: Frequency,
    sector: String,
    topic: String,
}

impl SeriesMeta {
    /// Creates metadata with an empty label, sector and topic.
    pub fn new(id: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            frequency,
            sector: String::new(),
            topic: String::new(),
        }
    }

    /// Sets the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the broad sector (e.g. `Real`, `Financial`).
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = sector.into();
        self
    }

    /// Sets the topic.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Series identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display label (falls back to the id when empty).
    pub fn label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Sampling frequency.
    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Broad sector tag.
    pub fn sector(&self) -> &str {
        &self.sector
    }

    /// Topic tag.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Ordered collection of [`SeriesMeta`] with lookup by id.
#[derive(Debug, Clone, Default)]
pub struct SeriesCatalog {
    series: Vec<SeriesMeta>,
    index: HashMap<String, usize>,
}

impl SeriesCatalog {
    /// Builds a catalog, preserving the input order.
    ///
    /// # Errors
    ///
    /// Returns [`PanelError::DuplicateSeries`] if an id occurs twice.
    pub fn new(series: Vec<SeriesMeta>) -> Result<Self, PanelError> {
        let mut index = HashMap::with_capacity(series.len());
        for (i, s) in series.iter().enumerate() {
            if index.insert(s.id.clone(), i).is_some() {
                return Err(PanelError::DuplicateSeries {
                    series: s.id.clone(),
                });
            }
        }
        Ok(Self { series, index })
    }

    /// Looks up a series by id.
    pub fn get(&self, id: &str) -> Option<&SeriesMeta> {
        self.index.get(id).map(|&i| &self.series[i])
    }

    /// Iterates over all series in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &SeriesMeta> {
        self.series.iter()
    }

    /// Series with the given frequency, in catalog order.
    pub fn with_frequency(&self, frequency: Frequency) -> impl Iterator<Item = &SeriesMeta> {
        self.series.iter().filter(move |s| s.frequency == frequency)
    }

    /// Distinct sectors in order of first appearance.
    pub fn sectors(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for s in &self.series {
            if !s.sector.is_empty() && !out.contains(&s.sector.as_str()) {
                out.push(&s.sector);
            }
        }
        out
    }

    /// Number of series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns `true` if the catalog holds no series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SeriesCatalog {
        SeriesCatalog::new(vec![
            SeriesMeta::new("IP", Frequency::Monthly)
                .with_label("Industrial production")
                .with_sector("Real")
                .with_topic("Production"),
            SeriesMeta::new("M3", Frequency::Monthly).with_sector("Financial"),
            SeriesMeta::new("RETAIL", Frequency::Monthly).with_sector("Real"),
            SeriesMeta::new("RGDP", Frequency::Quarterly),
        ])
        .unwrap()
    }

    #[test]
    fn lookup_and_order() {
        let c = catalog();
        assert_eq!(c.len(), 4);
        assert_eq!(c.get("IP").unwrap().label(), "Industrial production");
        assert_eq!(c.get("M3").unwrap().label(), "M3");
        assert!(c.get("CPI").is_none());
        let monthly: Vec<&str> = c.with_frequency(Frequency::Monthly).map(|s| s.id()).collect();
        assert_eq!(monthly, vec!["IP", "M3", "RETAIL"]);
    }

    #[test]
    fn sectors_in_first_appearance_order() {
        assert_eq!(catalog().sectors(), vec!["Real", "Financial"]);
    }

    #[test]
    fn duplicate_rejected() {
        let err = SeriesCatalog::new(vec![
            SeriesMeta::new("IP", Frequency::Monthly),
            SeriesMeta::new("IP", Frequency::Quarterly),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PanelError::DuplicateSeries {
                series: "IP".to_string()
            }
        );
    }

    #[test]
    fn frequency_codes() {
        assert_eq!("M".parse::<Frequency>().unwrap(), Frequency::Monthly);
        assert_eq!("Q".parse::<Frequency>().unwrap(), Frequency::Quarterly);
        assert!("A".parse::<Frequency>().is_err());
        assert_eq!(Frequency::Quarterly.to_string(), "Q");
    }
}
