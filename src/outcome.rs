//! Per-unit outcomes for multi-unit runs.
//!
//! A run works through units (file lists, logs) one after the other. Each
//! unit's result is recorded in a [`RunReport`]. With `continue_on_error`
//! a failed unit is logged and the run moves on; without it the first
//! failure ends the run. Either way a run with failures exits non-zero.

use std::fmt;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Done(String),
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit: String,
    pub status: UnitStatus,
}

#[derive(Debug)]
pub struct RunReport {
    started: DateTime<Utc>,
    continue_on_error: bool,
    outcomes: Vec<UnitOutcome>,
}

impl RunReport {
    pub fn new(continue_on_error: bool) -> Self {
        Self {
            started: Utc::now(),
            continue_on_error,
            outcomes: Vec::new(),
        }
    }

    /// Record the result of one unit.
    ///
    /// A successful result is described with `describe` and returned. A
    /// failure is returned as an error unless `continue_on_error` is set,
    /// in which case it is logged and `None` comes back.
    pub fn record<T>(
        &mut self,
        unit: &str,
        result: Result<T>,
        describe: impl FnOnce(&T) -> String,
    ) -> Result<Option<T>> {
        match result {
            Ok(value) => {
                let summary = describe(&value);
                info!(unit = unit, "{}", summary);
                self.push(unit, UnitStatus::Done(summary));
                Ok(Some(value))
            }
            Err(e) => {
                error!(unit = unit, "{:#}", e);
                self.push(unit, UnitStatus::Failed(format!("{:#}", e)));
                if self.continue_on_error {
                    Ok(None)
                } else {
                    Err(e.context(format!("{} failed", unit)))
                }
            }
        }
    }

    pub fn skipped(&mut self, unit: &str, reason: impl Into<String>) {
        let reason = reason.into();
        info!(unit = unit, "skipped: {}", reason);
        self.push(unit, UnitStatus::Skipped(reason));
    }

    fn push(&mut self, unit: &str, status: UnitStatus) {
        self.outcomes.push(UnitOutcome {
            unit: unit.to_string(),
            status,
        });
    }

    pub fn outcomes(&self) -> &[UnitOutcome] {
        &self.outcomes
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, UnitStatus::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&UnitStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    /// Fail if any unit failed.
    pub fn finish(&self) -> Result<()> {
        if self.failed() > 0 {
            bail!("{} of {} units failed", self.failed(), self.outcomes.len());
        }
        Ok(())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            match &outcome.status {
                UnitStatus::Done(summary) => writeln!(f, "  ok       {}  {}", outcome.unit, summary)?,
                UnitStatus::Skipped(reason) => writeln!(f, "  skipped  {}  {}", outcome.unit, reason)?,
                UnitStatus::Failed(err) => writeln!(f, "  FAILED   {}  {}", outcome.unit, err)?,
            }
        }
        let elapsed = Utc::now() - self.started;
        write!(
            f,
            "{} units: {} ok, {} skipped, {} failed ({:.1}s)",
            self.outcomes.len(),
            self.count(|s| matches!(s, UnitStatus::Done(_))),
            self.count(|s| matches!(s, UnitStatus::Skipped(_))),
            self.failed(),
            elapsed.num_milliseconds() as f64 / 1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn stops_on_first_failure_by_default() {
        let mut report = RunReport::new(false);
        let ok = report.record("a.txt", Ok(3), |n| format!("{n} files")).unwrap();
        assert_eq!(ok, Some(3));
        let err = report
            .record::<usize>("b.txt", Err(anyhow!("connection refused")), |_| String::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("b.txt failed"));
        assert_eq!(report.failed(), 1);
    }

    #[test]
    fn continues_when_asked_but_still_fails_the_run() {
        let mut report = RunReport::new(true);
        let none = report
            .record::<usize>("a.txt", Err(anyhow!("boom")), |_| String::new())
            .unwrap();
        assert!(none.is_none());
        report.skipped("b.txt", "already processed");
        report.record("c.txt", Ok(()), |_| "done".into()).unwrap();

        assert_eq!(report.outcomes().len(), 3);
        assert!(report.finish().is_err());
        let text = report.to_string();
        assert!(text.contains("FAILED   a.txt  boom"));
        assert!(text.contains("3 units: 1 ok, 1 skipped, 1 failed"));
    }

    #[test]
    fn clean_run_finishes() {
        let mut report = RunReport::new(false);
        report.record("a.txt", Ok(()), |_| "done".into()).unwrap();
        assert!(report.finish().is_ok());
    }
}
