use std::io::{self, Write};

use serde::Serialize;

use crate::bins::{classify, DiffBin, BIN_COUNT};
use crate::error::CompareError;
use crate::model::{Comparison, Identifier};

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinTally {
    pub bin: DiffBin,
    pub label: String,
    pub count: usize,
    /// Offending identifiers in arrival order. Always empty for `equal`
    /// and `less`.
    pub identifiers: Vec<Identifier>,
}

impl BinTally {
    fn empty(bin: DiffBin) -> Self {
        Self {
            bin,
            label: bin.to_string(),
            count: 0,
            identifiers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedIdentifier {
    pub identifier: Identifier,
    pub reason: String,
}

/// Histogram of one run. Invariant: `compared() + skipped.len() == total`
/// once every submitted identifier has been recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub total: usize,
    pub bins: [BinTally; BIN_COUNT],
    pub skipped: Vec<SkippedIdentifier>,
}

impl AggregateReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            bins: DiffBin::ALL.map(BinTally::empty),
            skipped: Vec::new(),
        }
    }

    /// Classify and count one successful comparison.
    pub fn record(&mut self, comparison: &Comparison) -> DiffBin {
        let bin = classify(comparison.difference());
        let tally = &mut self.bins[bin.index()];
        tally.count += 1;
        if bin.tracks_offenders() {
            tally.identifiers.push(comparison.identifier.clone());
        }
        bin
    }

    pub fn skip(&mut self, error: &CompareError) {
        self.skipped.push(SkippedIdentifier {
            identifier: error.identifier().to_string(),
            reason: error.to_string(),
        });
    }

    pub fn tally(&self, bin: DiffBin) -> &BinTally {
        &self.bins[bin.index()]
    }

    pub fn compared(&self) -> usize {
        self.bins.iter().map(|t| t.count).sum()
    }

    pub fn offending(&self) -> usize {
        self.bins
            .iter()
            .filter(|t| t.bin.tracks_offenders())
            .map(|t| t.count)
            .sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.compared() + self.skipped.len() == self.total
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StoreLabel {
    pub name: String,
    pub root: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub duration_ms: u128,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub store_a: StoreLabel,
    pub store_b: StoreLabel,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconSummary {
    pub total: usize,
    pub compared: usize,
    pub skipped: usize,
    pub equal: usize,
    pub less: usize,
    pub offending: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub bins: Vec<BinTally>,
    pub skipped: Vec<SkippedIdentifier>,
}

impl ReconReport {
    pub fn new(meta: ReconMeta, aggregate: AggregateReport) -> Self {
        let summary = ReconSummary {
            total: aggregate.total,
            compared: aggregate.compared(),
            skipped: aggregate.skipped.len(),
            equal: aggregate.tally(DiffBin::Equal).count,
            less: aggregate.tally(DiffBin::Less).count,
            offending: aggregate.offending(),
        };
        Self {
            meta,
            summary,
            bins: aggregate.bins.into_iter().collect(),
            skipped: aggregate.skipped,
        }
    }

    pub fn has_discrepancies(&self) -> bool {
        self.summary.offending > 0 || self.summary.skipped > 0
    }
}

// ---------------------------------------------------------------------------
// Text output
// ---------------------------------------------------------------------------

/// `('a', 'b', 'c')`
pub fn quote_identifiers(ids: &[Identifier]) -> String {
    let quoted: Vec<String> = ids.iter().map(|id| format!("'{id}'")).collect();
    format!("({})", quoted.join(", "))
}

/// Write the human-readable report, one line at a time.
pub fn write_summary<W: Write>(report: &ReconReport, out: &mut W) -> io::Result<()> {
    let a = &report.meta.store_a;
    let b = &report.meta.store_b;
    writeln!(out, "Store A: {} ({})", a.name, a.root)?;
    writeln!(out, "Store B: {} ({})", b.name, b.root)?;
    writeln!(out, "Total identifiers: {}", report.summary.total)?;
    writeln!(
        out,
        "Compared: {}, skipped: {}",
        report.summary.compared, report.summary.skipped
    )?;

    for tally in &report.bins {
        let description = match tally.bin {
            DiffBin::Less => "fewer objects in A than B".to_string(),
            DiffBin::Equal => "same object count in A and B".to_string(),
            DiffBin::MoreThan500 => "more than 500 extra objects in A".to_string(),
            _ => format!("{} extra objects in A", tally.label),
        };
        writeln!(out, "Total identifiers with {description}: {}", tally.count)?;
    }

    for tally in report.bins.iter().filter(|t| !t.identifiers.is_empty()) {
        writeln!(
            out,
            "Offending identifiers ({}): {}",
            tally.label,
            quote_identifiers(&tally.identifiers)
        )?;
    }

    for skipped in &report.skipped {
        writeln!(out, "Skipped '{}': {}", skipped.identifier, skipped.reason)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cmp(id: &str, a: u64, b: u64) -> Comparison {
        Comparison { identifier: id.into(), count_a: a, count_b: b }
    }

    fn meta() -> ReconMeta {
        ReconMeta {
            config_name: "t".into(),
            engine_version: "0".into(),
            run_at: "2026-01-01T00:00:00Z".into(),
            duration_ms: 1,
            concurrency: 4,
            timeout_secs: 300,
            store_a: StoreLabel { name: "prod".into(), root: "v2/".into() },
            store_b: StoreLabel { name: "temp".into(), root: "v4/".into() },
        }
    }

    #[test]
    fn record_examples() {
        let mut report = AggregateReport::new(5);
        assert_eq!(report.record(&cmp("id-1", 10, 10)), DiffBin::Equal);
        assert_eq!(report.record(&cmp("id-2", 7, 10)), DiffBin::Less);
        assert_eq!(report.record(&cmp("id-3", 13, 10)), DiffBin::More1To4);
        assert_eq!(report.record(&cmp("id-4", 10, 600)), DiffBin::Less);
        assert_eq!(report.record(&cmp("id-5", 610, 100)), DiffBin::MoreThan500);

        assert_eq!(report.tally(DiffBin::Less).count, 2);
        assert!(report.tally(DiffBin::Less).identifiers.is_empty());
        assert!(report.tally(DiffBin::Equal).identifiers.is_empty());
        assert_eq!(report.tally(DiffBin::More1To4).identifiers, vec!["id-3"]);
        assert_eq!(report.tally(DiffBin::MoreThan500).identifiers, vec!["id-5"]);
        assert_eq!(report.offending(), 2);
        assert!(report.is_balanced());
    }

    #[test]
    fn skipped_keeps_totals_balanced() {
        let mut report = AggregateReport::new(2);
        report.record(&cmp("id-1", 1, 1));
        report.skip(&CompareError::Timeout {
            identifier: "id-2".into(),
            after: Duration::from_secs(1),
        });
        assert!(report.is_balanced());
        assert_eq!(report.skipped[0].identifier, "id-2");
        assert_eq!(report.compared(), 1);
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_identifiers(&["a".into(), "b".into()]), "('a', 'b')");
        assert_eq!(quote_identifiers(&[]), "()");
    }

    #[test]
    fn summary_lines() {
        let mut agg = AggregateReport::new(3);
        agg.record(&cmp("id-1", 10, 10));
        agg.record(&cmp("id-2", 20, 10));
        agg.record(&cmp("id-3", 18, 10));
        let report = ReconReport::new(meta(), agg);

        let mut out = Vec::new();
        write_summary(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Total identifiers: 3\n"));
        assert!(text.contains("Total identifiers with same object count in A and B: 1\n"));
        assert!(text.contains("Total identifiers with +5..+10 extra objects in A: 2\n"));
        assert!(text.contains("Offending identifiers (+5..+10): ('id-2', 'id-3')\n"));
        assert!(!text.contains("Offending identifiers (equal)"));
    }

    #[test]
    fn json_shape() {
        let mut agg = AggregateReport::new(1);
        agg.record(&cmp("id-1", 610, 100));
        let report = ReconReport::new(meta(), agg);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"]["offending"], 1);
        assert_eq!(value["bins"].as_array().unwrap().len(), BIN_COUNT);
        assert_eq!(value["bins"][15]["bin"], "more_than_500");
        assert_eq!(value["bins"][15]["identifiers"][0], "id-1");
        assert!(report.has_discrepancies());
    }
}
