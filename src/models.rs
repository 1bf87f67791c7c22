//! Data models for processes, flows, methods and results

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::EngineError;

/// A unit of production/activity in the product system.
#[derive(Debug, Clone)]
pub struct Process {
    pub id: String,
    pub name: String,
    pub location: String,
    pub dataset: String,
}

impl Process {
    /// Human-readable identity used as the result key for a demand.
    ///
    /// A demand is labelled after its first process, so two demands in one
    /// batch that share a first process share a result slot and the later
    /// demand's scores replace the earlier ones.
    pub fn label(&self) -> String {
        format!(
            "{} ({}) {}:{}",
            self.name, self.location, self.dataset, self.id
        )
    }
}

/// Kind of exchange attached to a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Reference production of the owning process (technosphere diagonal).
    Production,
    /// Input drawn from another process.
    Technosphere,
    /// Exchange with the environment (elementary flow).
    Biosphere,
}

impl FlowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::Production => "production",
            FlowKind::Technosphere => "technosphere",
            FlowKind::Biosphere => "biosphere",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "production" => Ok(FlowKind::Production),
            "technosphere" => Ok(FlowKind::Technosphere),
            "biosphere" => Ok(FlowKind::Biosphere),
            other => Err(EngineError::UnknownFlowKind(other.to_string())),
        }
    }
}

/// A quantified exchange owned by a process.
///
/// For production flows the target is the owning process itself; for
/// technosphere flows it is the supplying process; for biosphere flows it is
/// an elementary-flow identifier.
#[derive(Debug, Clone)]
pub struct Flow {
    pub process_id: String,
    pub target_id: String,
    pub amount: f64,
    pub kind: FlowKind,
}

/// Identity of an impact-assessment method: (family, category, indicator).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodKey {
    pub family: String,
    pub category: String,
    pub indicator: String,
}

/// Separator used when rendering a method key as a single string.
pub const METHOD_KEY_SEPARATOR: &str = " | ";

impl MethodKey {
    pub fn new(
        family: impl Into<String>,
        category: impl Into<String>,
        indicator: impl Into<String>,
    ) -> Self {
        MethodKey {
            family: family.into(),
            category: category.into(),
            indicator: indicator.into(),
        }
    }

    /// Parse a `"family | category | indicator"` string (separator `|`,
    /// surrounding whitespace ignored).
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let parts: Vec<&str> = s.split('|').map(str::trim).collect();
        match parts.as_slice() {
            [family, category, indicator]
                if !family.is_empty() && !category.is_empty() && !indicator.is_empty() =>
            {
                Ok(MethodKey::new(*family, *category, *indicator))
            }
            _ => Err(EngineError::MalformedMethodKey(s.to_string())),
        }
    }
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.family,
            self.category,
            self.indicator,
            sep = METHOD_KEY_SEPARATOR
        )
    }
}

/// A functional demand: ordered sparse mapping from process id to requested
/// amount of that process's reference output.
#[derive(Debug, Clone, Default)]
pub struct Demand {
    pub amounts: Vec<(String, f64)>,
}

impl Demand {
    pub fn single(process_id: impl Into<String>, amount: f64) -> Self {
        Demand {
            amounts: vec![(process_id.into(), amount)],
        }
    }

    /// Parse `"id=amount"` or `"id1=a1,id2=a2"` into a combined demand.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let mut amounts = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            let (id, amount) = part
                .split_once('=')
                .ok_or_else(|| EngineError::MalformedDemand(s.to_string()))?;
            let id = id.trim();
            let amount: f64 = amount
                .trim()
                .parse()
                .map_err(|_| EngineError::MalformedDemand(s.to_string()))?;
            if id.is_empty() {
                return Err(EngineError::MalformedDemand(s.to_string()));
            }
            amounts.push((id.to_string(), amount));
        }
        if amounts.is_empty() {
            return Err(EngineError::MalformedDemand(s.to_string()));
        }
        Ok(Demand { amounts })
    }
}

/// Per-demand, per-method impact scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalResults {
    pub scores: BTreeMap<String, BTreeMap<MethodKey, f64>>,
}

impl EvalResults {
    pub fn insert(&mut self, demand_label: &str, method: &MethodKey, score: f64) {
        self.scores
            .entry(demand_label.to_string())
            .or_default()
            .insert(method.clone(), score);
    }

    pub fn get(&self, demand_label: &str, method: &MethodKey) -> Option<f64> {
        self.scores.get(demand_label)?.get(method).copied()
    }

    /// Render method keys as single `" | "`-joined strings, the form the
    /// surrounding service layer serializes.
    pub fn formatted(&self) -> BTreeMap<String, BTreeMap<String, f64>> {
        self.scores
            .iter()
            .map(|(label, per_method)| {
                let inner = per_method
                    .iter()
                    .map(|(key, score)| (key.to_string(), *score))
                    .collect();
                (label.clone(), inner)
            })
            .collect()
    }
}

impl fmt::Display for EvalResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Impact Scores ===")?;
        for (label, per_method) in &self.scores {
            writeln!(f, "{}", label)?;
            for (method, score) in per_method {
                writeln!(f, "  {}: {:.6e}", method, score)?;
            }
        }
        Ok(())
    }
}

/// Call counts collected during one evaluation, used to verify reuse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalStats {
    pub factorizations: usize,
    pub solves: usize,
    pub characterization_builds: usize,
}

/// Outcome of one orchestrated evaluation.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub results: EvalResults,
    pub stats: EvalStats,
}
