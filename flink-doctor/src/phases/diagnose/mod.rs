use std::fmt;

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::flink::ResourceRef;
use crate::phases::normalize::MetricIndex;

mod rules;
mod summary;

pub use rules::{
    standard_rules, BackpressureRule, CheckpointFailureRatioRule, CheckpointNotExternalizedRule, CpuSlotMismatchRule,
    DataSkewRule, HeapSaturationRule, MemorySaturationRule, RestartInstabilityRule, SlotSaturationRule,
    SlowCheckpointRule, StaleCheckpointingRule,
};
pub use summary::DerivedSummary;


#[derive(
    Debug, Display, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Ok,
    Warn,
    Critical,
}

/// One categorized conclusion drawn by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub subject: ResourceRef,
    pub message: String,
    pub rule: String,
}

/// Informational tip carrying no severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advisory {
    pub subject: ResourceRef,
    pub message: String,
    pub rule: String,
}

/// What a single rule concluded about the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Finding { severity: Severity, message: String },
    Advisory { message: String },
}

impl Verdict {
    pub fn warn(message: impl Into<String>) -> Self {
        Self::Finding { severity: Severity::Warn, message: message.into() }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::Finding { severity: Severity::Critical, message: message.into() }
    }

    pub fn advisory(message: impl Into<String>) -> Self {
        Self::Advisory { message: message.into() }
    }
}

/// A pure predicate over a typed metric mapping. Rules whose inputs are absent conclude nothing.
pub trait DiagnosticRule: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, metrics: &MetricIndex, subject: &ResourceRef) -> Option<Verdict>;
}

pub(crate) static DIAGNOSTIC_FINDINGS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("diagnostic_findings", "Number of diagnostic findings and advisories produced"),
        &["rule", "severity"],
    )
    .expect("failed creating diagnostic_findings metric")
});

const ADVISORY_LABEL: &str = "ADVISORY";

/// Result of evaluating every rule against one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub subject: ResourceRef,
    pub summary: DerivedSummary,
    pub findings: Vec<Finding>,
    pub advisories: Vec<Advisory>,
}

impl Assessment {
    /// Worst finding severity, `Ok` without findings.
    pub fn overall_severity(&self) -> Severity {
        self.findings.iter().map(|f| f.severity).max().unwrap_or_default()
    }

    pub fn finding_for(&self, rule: &str) -> Option<&Finding> {
        self.findings.iter().find(|f| f.rule == rule)
    }

    pub fn advisory_for(&self, rule: &str) -> Option<&Advisory> {
        self.advisories.iter().find(|a| a.rule == rule)
    }

    pub fn is_healthy(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Applies an ordered rule list to a metric mapping. Output order follows rule order.
#[derive(Debug)]
pub struct DiagnosticEvaluator {
    rules: Vec<Box<dyn DiagnosticRule>>,
}

impl Default for DiagnosticEvaluator {
    fn default() -> Self {
        Self::new(standard_rules())
    }
}

impl DiagnosticEvaluator {
    pub fn new(rules: Vec<Box<dyn DiagnosticRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    #[tracing::instrument(level = "debug", skip(self, metrics), fields(nr_metrics=%metrics.len()))]
    pub fn evaluate(&self, metrics: &MetricIndex, subject: &ResourceRef) -> Assessment {
        let mut findings = Vec::new();
        let mut advisories = Vec::new();

        for rule in self.rules.iter() {
            match rule.evaluate(metrics, subject) {
                Some(Verdict::Finding { severity, message }) => {
                    DIAGNOSTIC_FINDINGS
                        .with_label_values(&[rule.name(), severity.to_string().as_str()])
                        .inc();
                    findings.push(Finding {
                        severity,
                        subject: subject.clone(),
                        message,
                        rule: rule.name().to_string(),
                    });
                },
                Some(Verdict::Advisory { message }) => {
                    DIAGNOSTIC_FINDINGS.with_label_values(&[rule.name(), ADVISORY_LABEL]).inc();
                    advisories.push(Advisory { subject: subject.clone(), message, rule: rule.name().to_string() });
                },
                None => (),
            }
        }

        let assessment = Assessment {
            subject: subject.clone(),
            summary: DerivedSummary::derive(metrics),
            findings,
            advisories,
        };

        tracing::debug!(
            overall=%assessment.overall_severity(),
            nr_findings=%assessment.findings.len(), nr_advisories=%assessment.advisories.len(),
            "diagnostic rules evaluated"
        );
        assessment
    }
}
