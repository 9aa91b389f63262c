use chrono::{DateTime, Datelike, FixedOffset, Utc};
use std::fmt;

/// A numbered document family. Each series has its own tag, category and
/// record scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    /// `INV/{YYYY}/{MM}-VE-{NNNN}` on reservations.
    Invoice,
    /// `NOTA/{YYYY}/{MM}-SDP-{NNNN}` on payments.
    Receipt,
}

impl Series {
    pub fn tag(self) -> &'static str {
        match self {
            Series::Invoice => "INV",
            Series::Receipt => "NOTA",
        }
    }

    pub fn category(self) -> &'static str {
        match self {
            Series::Invoice => "VE",
            Series::Receipt => "SDP",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Series::Invoice => "invoice",
            Series::Receipt => "receipt",
        }
    }
}

/// The (tag, category, year, month) tuple a sequence counter is local to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub series: Series,
    pub year: i32,
    pub month: u32,
}

impl ScopeKey {
    pub fn new(series: Series, year: i32, month: u32) -> Self {
        Self {
            series,
            year,
            month,
        }
    }

    /// Scope of `now`, with the calendar month read in `offset`.
    pub fn for_instant(series: Series, now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let local = now.with_timezone(&offset);
        Self::new(series, local.year(), local.month())
    }

    /// `{tag}/{year}/{month}-{category}-`
    pub fn prefix(&self) -> String {
        format!(
            "{}/{:04}/{:02}-{}-",
            self.series.tag(),
            self.year,
            self.month,
            self.series.category()
        )
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix())
    }
}
