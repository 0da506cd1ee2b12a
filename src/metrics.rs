//! Read-only statistics derived from the proof and circuit tables.
//!
//! Everything is recomputed from a full scan on each call; there is no
//! incremental path.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::EntityCounts;
use crate::types::{Blockchain, Circuit, ModuleType, Proof, ProofStatus};

const TREND_WINDOW: usize = 20;
const ACTIVITY_DAYS: i64 = 7;

/// Module-count buckets: label, inclusive lower bound, inclusive upper bound.
const COMPLEXITY_BUCKETS: [(&str, usize, usize); 4] = [
    ("1-2 modules", 1, 2),
    ("3-5 modules", 3, 5),
    ("6-10 modules", 6, 10),
    ("11+ modules", 11, usize::MAX),
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub active_circuits: u64,
    pub proofs_verified: u64,
    pub encrypted_operations: u64,
    pub avg_proof_time: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofTimeAnalytics {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub trend: Vec<TrendPoint>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainGas {
    pub chain: Blockchain,
    pub total_gas: u64,
    pub avg_gas: f64,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasAnalytics {
    pub total_gas_used: u64,
    pub avg_gas_per_proof: f64,
    pub by_chain: Vec<ChainGas>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComplexityBucket {
    pub range: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleTypeCount {
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitComplexity {
    pub total_circuits: u64,
    pub avg_modules_per_circuit: f64,
    pub complexity_distribution: Vec<ComplexityBucket>,
    pub by_type: Vec<ModuleTypeCount>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProofCounts {
    pub chain: Blockchain,
    pub verified: u64,
    pub pending: u64,
    pub failed: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofTypeTiming {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub count: u64,
    pub avg_time: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: String,
    pub proofs: u64,
    pub gas: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub proof_time_analytics: ProofTimeAnalytics,
    pub gas_analytics: GasAnalytics,
    pub circuit_complexity: CircuitComplexity,
    pub proofs_by_chain: Vec<ChainProofCounts>,
    pub proofs_by_type: Vec<ProofTypeTiming>,
    pub recent_activity: Vec<DailyActivity>,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Nearest-rank percentile over an ascending slice: the element at
/// `floor(n * quantile)`, clamped to the last index. Zero when empty.
pub fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() as f64 * quantile).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

pub fn dashboard_stats(counts: EntityCounts, proofs: &[Proof]) -> DashboardStats {
    let verified: Vec<&Proof> = proofs
        .iter()
        .filter(|proof| proof.status == ProofStatus::Verified)
        .collect();
    let total_time: f64 = verified
        .iter()
        .map(|proof| proof.verification_time.unwrap_or(0.0))
        .sum();
    DashboardStats {
        active_circuits: counts.circuits,
        proofs_verified: verified.len() as u64,
        encrypted_operations: counts.encrypted,
        avg_proof_time: round_to(mean(total_time, verified.len()), 1),
    }
}

/// Full metrics snapshot. `today` anchors the trailing activity window.
pub fn performance_metrics(
    proofs: &[Proof],
    circuits: &[Circuit],
    today: NaiveDate,
) -> PerformanceMetrics {
    let mut chronological: Vec<&Proof> = proofs.iter().collect();
    chronological.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    let verified: Vec<&Proof> = chronological
        .iter()
        .copied()
        .filter(|proof| proof.status == ProofStatus::Verified)
        .collect();

    PerformanceMetrics {
        proof_time_analytics: proof_time_analytics(&verified),
        gas_analytics: gas_analytics(&verified),
        circuit_complexity: circuit_complexity(circuits),
        proofs_by_chain: proofs_by_chain(&chronological),
        proofs_by_type: proofs_by_type(&verified),
        recent_activity: recent_activity(&chronological, today),
    }
}

fn proof_time_analytics(verified: &[&Proof]) -> ProofTimeAnalytics {
    let mut times: Vec<f64> = verified
        .iter()
        .filter_map(|proof| proof.verification_time)
        .filter(|time| *time > 0.0)
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));

    let trend_start = verified.len().saturating_sub(TREND_WINDOW);
    let trend = verified[trend_start..]
        .iter()
        .map(|proof| TrendPoint {
            timestamp: proof.timestamp,
            value: proof.verification_time.unwrap_or(0.0),
        })
        .collect();

    ProofTimeAnalytics {
        avg: mean(times.iter().sum(), times.len()),
        min: times.first().copied().unwrap_or(0.0),
        max: times.last().copied().unwrap_or(0.0),
        p50: percentile(&times, 0.5),
        p95: percentile(&times, 0.95),
        trend,
    }
}

/// Client-supplied gas figures are unbounded, so totals saturate at
/// `u64::MAX`.
fn gas_analytics(verified: &[&Proof]) -> GasAnalytics {
    let mut by_chain: BTreeMap<Blockchain, (u64, u64)> = BTreeMap::new();
    let mut total_gas_used: u64 = 0;
    for proof in verified {
        let gas = proof.gas_used.unwrap_or(0);
        total_gas_used = total_gas_used.saturating_add(gas);
        let entry = by_chain.entry(proof.chain).or_default();
        entry.0 = entry.0.saturating_add(gas);
        entry.1 += 1;
    }

    GasAnalytics {
        total_gas_used,
        avg_gas_per_proof: mean(total_gas_used as f64, verified.len()),
        by_chain: by_chain
            .into_iter()
            .map(|(chain, (total_gas, count))| ChainGas {
                chain,
                total_gas,
                avg_gas: mean(total_gas as f64, count as usize),
                count,
            })
            .collect(),
    }
}

fn circuit_complexity(circuits: &[Circuit]) -> CircuitComplexity {
    let module_counts: Vec<usize> = circuits.iter().map(|circuit| circuit.nodes.len()).collect();
    let total_modules: usize = module_counts.iter().sum();

    let complexity_distribution = COMPLEXITY_BUCKETS
        .iter()
        .map(|(label, low, high)| ComplexityBucket {
            range: (*label).to_string(),
            count: module_counts
                .iter()
                .filter(|count| (*low..=*high).contains(*count))
                .count() as u64,
        })
        .collect();

    let mut by_type: BTreeMap<ModuleType, u64> = BTreeMap::new();
    for node in circuits.iter().flat_map(|circuit| circuit.nodes.iter()) {
        *by_type.entry(node.module_type).or_default() += 1;
    }

    CircuitComplexity {
        total_circuits: circuits.len() as u64,
        avg_modules_per_circuit: round_to(mean(total_modules as f64, circuits.len()), 1),
        complexity_distribution,
        by_type: by_type
            .into_iter()
            .map(|(module_type, count)| ModuleTypeCount { module_type, count })
            .collect(),
    }
}

fn proofs_by_chain(proofs: &[&Proof]) -> Vec<ChainProofCounts> {
    let mut by_chain: BTreeMap<Blockchain, ChainProofCounts> = BTreeMap::new();
    for proof in proofs {
        let entry = by_chain
            .entry(proof.chain)
            .or_insert_with(|| ChainProofCounts {
                chain: proof.chain,
                verified: 0,
                pending: 0,
                failed: 0,
            });
        match proof.status {
            ProofStatus::Verified => entry.verified += 1,
            ProofStatus::Pending => entry.pending += 1,
            ProofStatus::Failed => entry.failed += 1,
        }
    }
    by_chain.into_values().collect()
}

fn proofs_by_type(verified: &[&Proof]) -> Vec<ProofTypeTiming> {
    let mut by_type: BTreeMap<&str, (u64, f64)> = BTreeMap::new();
    for proof in verified {
        let entry = by_type.entry(proof.proof_type.as_str()).or_default();
        entry.0 += 1;
        entry.1 += proof.verification_time.unwrap_or(0.0);
    }
    by_type
        .into_iter()
        .map(|(proof_type, (count, total_time))| ProofTypeTiming {
            proof_type: proof_type.to_string(),
            count,
            avg_time: round_to(mean(total_time, count as usize), 2),
        })
        .collect()
}

fn recent_activity(proofs: &[&Proof], today: NaiveDate) -> Vec<DailyActivity> {
    let mut window: BTreeMap<NaiveDate, (u64, u64)> = (0..ACTIVITY_DAYS)
        .map(|offset| (today - Duration::days(offset), (0, 0)))
        .collect();
    for proof in proofs {
        if let Some(day) = window.get_mut(&proof.timestamp.date_naive()) {
            day.0 += 1;
            day.1 = day.1.saturating_add(proof.gas_used.unwrap_or(0));
        }
    }
    window
        .into_iter()
        .map(|(date, (proofs, gas))| DailyActivity {
            date: date.to_string(),
            proofs,
            gas,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CircuitNode, Position};
    use chrono::TimeZone;
    use serde_json::Map;

    fn proof(
        id: u64,
        chain: Blockchain,
        status: ProofStatus,
        time: Option<f64>,
        gas: Option<u64>,
        timestamp: DateTime<Utc>,
    ) -> Proof {
        Proof {
            id,
            circuit_id: None,
            proof_type: if id % 2 == 0 { "even" } else { "odd" }.to_string(),
            status,
            chain,
            proof_hash: format!("0x{id:064x}"),
            verification_time: time,
            gas_used: gas,
            timestamp,
            details: None,
        }
    }

    fn circuit(id: u64, types: &[ModuleType]) -> Circuit {
        let now = Utc::now();
        Circuit {
            id,
            name: format!("circuit-{id}"),
            description: None,
            nodes: types
                .iter()
                .enumerate()
                .map(|(index, module_type)| CircuitNode {
                    id: format!("n{index}"),
                    module_type: *module_type,
                    name: format!("Node {index}"),
                    position: Position::default(),
                    config: Map::new(),
                    inputs: Vec::new(),
                    outputs: Vec::new(),
                })
                .collect(),
            connections: Vec::new(),
            current_version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date")
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let times = [2.5, 0.5, 1.5, 1.0, 2.0];
        let proofs: Vec<Proof> = times
            .iter()
            .enumerate()
            .map(|(index, time)| {
                proof(
                    index as u64 + 1,
                    Blockchain::Solana,
                    ProofStatus::Verified,
                    Some(*time),
                    Some(100_000),
                    at(10, index as u32),
                )
            })
            .collect();

        let analytics = performance_metrics(&proofs, &[], today()).proof_time_analytics;
        assert_eq!(analytics.p50, 1.5);
        assert_eq!(analytics.p95, 2.5);
        assert_eq!(analytics.min, 0.5);
        assert_eq!(analytics.max, 2.5);
        assert_eq!(analytics.avg, 1.5);
        let trend: Vec<f64> = analytics.trend.iter().map(|point| point.value).collect();
        assert_eq!(trend, times.to_vec());
    }

    #[test]
    fn empty_tables_yield_zeroes_and_a_full_window() {
        let metrics = performance_metrics(&[], &[], today());
        assert_eq!(metrics.proof_time_analytics.p50, 0.0);
        assert_eq!(metrics.gas_analytics.total_gas_used, 0);
        assert_eq!(metrics.gas_analytics.avg_gas_per_proof, 0.0);
        assert_eq!(metrics.circuit_complexity.avg_modules_per_circuit, 0.0);
        assert_eq!(metrics.recent_activity.len(), 7);
        assert_eq!(metrics.recent_activity[0].date, "2024-03-04");
        assert_eq!(metrics.recent_activity[6].date, "2024-03-10");
        assert!(metrics
            .recent_activity
            .iter()
            .all(|day| day.proofs == 0 && day.gas == 0));
    }

    #[test]
    fn trend_keeps_the_last_twenty_verified_proofs() {
        let proofs: Vec<Proof> = (1..=25)
            .map(|id| {
                proof(
                    id,
                    Blockchain::Base,
                    ProofStatus::Verified,
                    Some(id as f64),
                    None,
                    at(1, 0) + Duration::minutes(id as i64),
                )
            })
            .collect();
        let trend = performance_metrics(&proofs, &[], today())
            .proof_time_analytics
            .trend;
        assert_eq!(trend.len(), 20);
        assert_eq!(trend[0].value, 6.0);
        assert_eq!(trend[19].value, 25.0);
    }

    #[test]
    fn gas_totals_saturate_instead_of_overflowing() {
        let proofs = vec![
            proof(1, Blockchain::Base, ProofStatus::Verified, Some(1.0), Some(u64::MAX), at(10, 9)),
            proof(2, Blockchain::Base, ProofStatus::Verified, Some(1.0), Some(u64::MAX), at(10, 10)),
        ];
        let metrics = performance_metrics(&proofs, &[], today());

        assert_eq!(metrics.gas_analytics.total_gas_used, u64::MAX);
        assert_eq!(metrics.gas_analytics.by_chain[0].total_gas, u64::MAX);
        assert_eq!(metrics.gas_analytics.by_chain[0].count, 2);
        let busiest = metrics
            .recent_activity
            .iter()
            .find(|day| day.proofs == 2)
            .expect("today's activity");
        assert_eq!(busiest.gas, u64::MAX);
    }

    #[test]
    fn gas_and_status_are_grouped_by_chain() {
        let proofs = vec![
            proof(1, Blockchain::Solana, ProofStatus::Verified, Some(1.0), Some(100), at(9, 1)),
            proof(2, Blockchain::Solana, ProofStatus::Verified, Some(2.0), Some(300), at(9, 2)),
            proof(3, Blockchain::Ethereum, ProofStatus::Verified, Some(1.0), Some(500), at(9, 3)),
            proof(4, Blockchain::Ethereum, ProofStatus::Pending, None, None, at(9, 4)),
            proof(5, Blockchain::Ethereum, ProofStatus::Failed, None, Some(7), at(1, 4)),
        ];
        let metrics = performance_metrics(&proofs, &[], today());

        let gas = &metrics.gas_analytics;
        assert_eq!(gas.total_gas_used, 900);
        assert_eq!(gas.avg_gas_per_proof, 300.0);
        assert_eq!(gas.by_chain.len(), 2);
        assert_eq!(gas.by_chain[0].chain, Blockchain::Solana);
        assert_eq!(gas.by_chain[0].avg_gas, 200.0);
        assert_eq!(gas.by_chain[1].count, 1);

        assert_eq!(
            metrics.proofs_by_chain,
            vec![
                ChainProofCounts {
                    chain: Blockchain::Solana,
                    verified: 2,
                    pending: 0,
                    failed: 0
                },
                ChainProofCounts {
                    chain: Blockchain::Ethereum,
                    verified: 1,
                    pending: 1,
                    failed: 1
                },
            ]
        );

        let by_type = &metrics.proofs_by_type;
        assert_eq!(by_type.len(), 2);
        assert_eq!(by_type[0].proof_type, "even");
        assert_eq!(by_type[0].avg_time, 2.0);
        assert_eq!(by_type[1].proof_type, "odd");
        assert_eq!(by_type[1].count, 2);

        let yesterday = &metrics.recent_activity[5];
        assert_eq!(yesterday.date, "2024-03-09");
        assert_eq!(yesterday.proofs, 4);
        assert_eq!(yesterday.gas, 900);
        let total_in_window: u64 = metrics.recent_activity.iter().map(|day| day.proofs).sum();
        assert_eq!(total_in_window, 4, "proof outside the window is ignored");
    }

    #[test]
    fn circuits_are_bucketed_by_module_count() {
        use ModuleType::*;
        let circuits = vec![
            circuit(1, &[]),
            circuit(2, &[Identity]),
            circuit(3, &[Identity, Transfer, Storage]),
            circuit(4, &[Validation; 6]),
            circuit(5, &[Custom; 12]),
        ];
        let complexity = performance_metrics(&[], &circuits, today()).circuit_complexity;
        assert_eq!(complexity.total_circuits, 5);
        assert_eq!(complexity.avg_modules_per_circuit, 4.4);
        let counts: Vec<u64> = complexity
            .complexity_distribution
            .iter()
            .map(|bucket| bucket.count)
            .collect();
        assert_eq!(counts, vec![1, 1, 1, 1]);
        assert_eq!(complexity.complexity_distribution[3].range, "11+ modules");

        let custom = complexity
            .by_type
            .iter()
            .find(|entry| entry.module_type == Custom)
            .expect("custom count");
        assert_eq!(custom.count, 12);
        assert_eq!(complexity.by_type[0].module_type, Identity);
        assert_eq!(complexity.by_type[0].count, 2);
    }

    #[test]
    fn stats_average_rounds_to_one_decimal() {
        let proofs = vec![
            proof(1, Blockchain::Base, ProofStatus::Verified, Some(1.0), None, at(9, 1)),
            proof(2, Blockchain::Base, ProofStatus::Verified, Some(1.26), None, at(9, 2)),
            proof(3, Blockchain::Base, ProofStatus::Pending, Some(9.0), None, at(9, 3)),
        ];
        let counts = EntityCounts {
            circuits: 2,
            proofs: 3,
            encrypted: 4,
        };
        let stats = dashboard_stats(counts, &proofs);
        assert_eq!(stats.active_circuits, 2);
        assert_eq!(stats.proofs_verified, 2);
        assert_eq!(stats.encrypted_operations, 4);
        assert_eq!(stats.avg_proof_time, 1.1);
    }
}
