use bwq_common::{BwqError, Result};
use serde::{Deserialize, Serialize};

/// Which raw count a statistic is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountBase {
    /// Token occurrences, `WordCount`.
    Words,
    /// Distinct books, `TextCount`.
    Texts,
}

impl CountBase {
    /// Column carrying this count in numerator and denominator subqueries.
    pub fn column(self) -> &'static str {
        match self {
            CountBase::Words => "WordCount",
            CountBase::Texts => "TextCount",
        }
    }
}

/// Statistic requested through `counttype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountType {
    WordCount,
    TextCount,
    WordsPerMillion,
    TextPercent,
    WordsRatio,
    TextRatio,
    TotalWords,
    TotalTexts,
    SumWords,
    SumTexts,
}

impl CountType {
    pub const ALL: [CountType; 10] = [
        CountType::WordCount,
        CountType::TextCount,
        CountType::WordsPerMillion,
        CountType::TextPercent,
        CountType::WordsRatio,
        CountType::TextRatio,
        CountType::TotalWords,
        CountType::TotalTexts,
        CountType::SumWords,
        CountType::SumTexts,
    ];

    /// Accepts current names and the older descriptive ones.
    pub fn from_name(name: &str) -> Result<Self> {
        if let Some(ct) = Self::ALL.into_iter().find(|ct| ct.name() == name) {
            return Ok(ct);
        }
        Ok(match name {
            "Occurrences_per_Million_Words" => CountType::WordsPerMillion,
            "Raw_Counts" => CountType::WordCount,
            "Percentage_of_Books" => CountType::TextPercent,
            "Number_of_Books" => CountType::TextCount,
            other => return Err(BwqError::Planning(format!("unknown counttype: {other}"))),
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            CountType::WordCount => "WordCount",
            CountType::TextCount => "TextCount",
            CountType::WordsPerMillion => "WordsPerMillion",
            CountType::TextPercent => "TextPercent",
            CountType::WordsRatio => "WordsRatio",
            CountType::TextRatio => "TextRatio",
            CountType::TotalWords => "TotalWords",
            CountType::TotalTexts => "TotalTexts",
            CountType::SumWords => "SumWords",
            CountType::SumTexts => "SumTexts",
        }
    }

    pub fn base(self) -> CountBase {
        match self {
            CountType::WordCount
            | CountType::WordsPerMillion
            | CountType::WordsRatio
            | CountType::TotalWords
            | CountType::SumWords => CountBase::Words,
            _ => CountBase::Texts,
        }
    }

    /// Raw counts are answered from the numerator alone.
    pub fn needs_denominator(self) -> bool {
        !matches!(self, CountType::WordCount | CountType::TextCount)
    }

    /// Aggregate in a counts subquery that joins a word fact table.
    pub fn book_operation(self, fastcat: &str) -> String {
        match self.base() {
            CountBase::Texts => format!("count(DISTINCT {fastcat}.bookid) as TextCount"),
            CountBase::Words => "sum(main.count) as WordCount".to_string(),
        }
    }

    /// Aggregate in a counts subquery over the catalog alone.
    pub fn catalog_operation(self) -> String {
        match self.base() {
            CountBase::Texts => "count(nwords) as TextCount".to_string(),
            CountBase::Words => "sum(nwords) as WordCount".to_string(),
        }
    }

    /// Outer expression combining `numerator.*` and `denominator.*`.
    ///
    /// Missing or zero denominators yield 0.
    pub fn final_operation(self) -> String {
        let col = self.base().column();
        let num = format!("IFNULL(numerator.{col},0)");
        let den = format!("IFNULL(denominator.{col},0)");
        let scaled = |factor: &str| {
            format!("IFNULL({num}{factor}/NULLIF(denominator.{col},0),0)")
        };
        let expr = match self {
            CountType::WordCount | CountType::TextCount => num,
            CountType::WordsPerMillion => scaled("*1000000"),
            CountType::TextPercent => scaled("*100"),
            CountType::WordsRatio | CountType::TextRatio => scaled(""),
            CountType::TotalWords | CountType::TotalTexts => den,
            CountType::SumWords | CountType::SumTexts => format!("{den}+{num}"),
        };
        format!("{expr} as {}", self.name())
    }

    /// Same arithmetic as [`CountType::final_operation`] on fetched counts.
    pub fn evaluate(self, numerator: Option<f64>, denominator: Option<f64>) -> f64 {
        let num = numerator.unwrap_or(0.0);
        let den = denominator.unwrap_or(0.0);
        let scaled = |factor: f64| if den == 0.0 { 0.0 } else { num * factor / den };
        match self {
            CountType::WordCount | CountType::TextCount => num,
            CountType::WordsPerMillion => scaled(1_000_000.0),
            CountType::TextPercent => scaled(100.0),
            CountType::WordsRatio | CountType::TextRatio => scaled(1.0),
            CountType::TotalWords | CountType::TotalTexts => den,
            CountType::SumWords | CountType::SumTexts => den + num,
        }
    }
}
