//! Aggregates shown on the three domain pages
//!
//! Everything here is a pure function of the loaded records, so the pages,
//! the charts and the assistant context all agree on the numbers.

use crate::models::{CyberIncident, DatasetMetadata, ItTicket};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Number of records sharing a label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Count {
    pub label: String,
    pub count: usize,
}

/// Mean resolution time of a group of tickets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Average {
    pub label: String,
    pub hours: f64,
}

/// Counts of a two-level grouping, `counts[series][group]`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupedCounts {
    pub groups: Vec<String>,
    pub series: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

/// Count occurrences of each value
///
/// Ordered by count descending; equal counts keep the order in which the
/// values were first seen.
pub fn value_counts<'a, I>(values: I) -> Vec<Count>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: Vec<Count> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|c| c.label == value) {
            Some(c) => c.count += 1,
            None => counts.push(Count {
                label: value.to_string(),
                count: 1,
            }),
        }
    }
    // stable sort keeps first-seen order for ties
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Arithmetic mean, `None` without samples
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().sum::<f64>() / samples.len() as f64)
    }
}

/// Quantile `q` (0.0..=1.0) with linear interpolation between closest ranks
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

fn sort_desc(averages: &mut [Average]) {
    averages.sort_by(|a, b| b.hours.total_cmp(&a.hours));
}

/// Cybersecurity page figures
#[derive(Debug, Clone, Serialize)]
pub struct IncidentSummary {
    pub total: usize,
    pub open: usize,
    pub critical: usize,
    pub phishing: usize,
    /// Phishing incidents still Open or In Progress
    pub unresolved_phishing: usize,
    pub phishing_status: Vec<Count>,
    pub by_category: Vec<Count>,
    pub by_severity: Vec<Count>,
    pub category_status: GroupedCounts,
}

impl IncidentSummary {
    pub fn from_records(incidents: &[CyberIncident]) -> Self {
        let phishing: Vec<&CyberIncident> = incidents
            .iter()
            .filter(|i| i.category == "Phishing")
            .collect();

        let categories: BTreeSet<&str> = incidents.iter().map(|i| i.category.as_str()).collect();
        let statuses: BTreeSet<&str> = incidents.iter().map(|i| i.status.as_str()).collect();
        let category_status = GroupedCounts {
            groups: categories.iter().map(|c| c.to_string()).collect(),
            series: statuses.iter().map(|s| s.to_string()).collect(),
            counts: statuses
                .iter()
                .map(|status| {
                    categories
                        .iter()
                        .map(|category| {
                            incidents
                                .iter()
                                .filter(|i| i.category == *category && i.status == *status)
                                .count()
                        })
                        .collect()
                })
                .collect(),
        };

        IncidentSummary {
            total: incidents.len(),
            open: incidents.iter().filter(|i| i.status == "Open").count(),
            critical: incidents.iter().filter(|i| i.severity == "Critical").count(),
            phishing: phishing.len(),
            unresolved_phishing: phishing
                .iter()
                .filter(|i| i.status == "Open" || i.status == "In Progress")
                .count(),
            phishing_status: value_counts(phishing.iter().map(|i| i.status.as_str())),
            by_category: value_counts(incidents.iter().map(|i| i.category.as_str())),
            by_severity: value_counts(incidents.iter().map(|i| i.severity.as_str())),
            category_status,
        }
    }
}

/// Per-assignee ticket figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaffPerformance {
    pub assignee: String,
    pub total_tickets: usize,
    pub avg_resolution: Option<f64>,
}

/// IT operations page figures
#[derive(Debug, Clone, Serialize)]
pub struct TicketSummary {
    pub total: usize,
    pub open: usize,
    pub critical: usize,
    pub avg_resolution: Option<f64>,
    /// Sorted by mean resolution time, slowest first; assignees without
    /// resolution times come last
    pub staff: Vec<StaffPerformance>,
    pub slowest: Option<Average>,
    /// Mean resolution time per status, slowest first
    pub status_resolution: Vec<Average>,
    pub bottleneck: Option<Average>,
    pub by_priority: Vec<Count>,
    /// Resolution time samples per priority, in first-seen priority order
    pub resolution_by_priority: Vec<(String, Vec<f64>)>,
}

impl TicketSummary {
    pub fn from_records(tickets: &[ItTicket]) -> Self {
        let resolved: Vec<f64> = tickets.iter().filter_map(|t| t.resolution_time_hours).collect();

        let mut by_assignee: BTreeMap<&str, (usize, Vec<f64>)> = BTreeMap::new();
        let mut by_status: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        let mut by_priority: Vec<(String, Vec<f64>)> = Vec::new();
        for ticket in tickets {
            let entry = by_assignee.entry(&ticket.assigned_to).or_default();
            entry.0 += 1;
            entry.1.extend(ticket.resolution_time_hours);

            let samples = by_status.entry(&ticket.status).or_default();
            samples.extend(ticket.resolution_time_hours);

            let idx = match by_priority.iter().position(|(p, _)| *p == ticket.priority) {
                Some(idx) => idx,
                None => {
                    by_priority.push((ticket.priority.clone(), Vec::new()));
                    by_priority.len() - 1
                }
            };
            by_priority[idx].1.extend(ticket.resolution_time_hours);
        }

        let mut staff: Vec<StaffPerformance> = by_assignee
            .into_iter()
            .map(|(assignee, (total_tickets, samples))| StaffPerformance {
                assignee: assignee.to_string(),
                total_tickets,
                avg_resolution: mean(&samples),
            })
            .collect();
        staff.sort_by(|a, b| match (a.avg_resolution, b.avg_resolution) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        let slowest = staff.first().and_then(|s| {
            s.avg_resolution.map(|hours| Average {
                label: s.assignee.clone(),
                hours,
            })
        });

        let mut status_resolution: Vec<Average> = by_status
            .into_iter()
            .filter_map(|(status, samples)| {
                mean(&samples).map(|hours| Average {
                    label: status.to_string(),
                    hours,
                })
            })
            .collect();
        sort_desc(&mut status_resolution);
        let bottleneck = status_resolution.first().cloned();

        TicketSummary {
            total: tickets.len(),
            open: tickets.iter().filter(|t| t.status == "Open").count(),
            critical: tickets.iter().filter(|t| t.priority == "Critical").count(),
            avg_resolution: mean(&resolved),
            staff,
            slowest,
            status_resolution,
            bottleneck,
            by_priority: value_counts(tickets.iter().map(|t| t.priority.as_str())),
            resolution_by_priority: by_priority,
        }
    }
}

/// Per-uploader dataset figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTotal {
    pub source: String,
    pub dataset_count: usize,
    pub total_rows: i64,
}

/// Data science page figures
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub total: usize,
    pub total_rows: i64,
    /// Rough footprint at 1000 bytes per row
    pub storage_gb: f64,
    pub sources: usize,
    /// The three largest datasets by rows
    pub top_by_rows: Vec<DatasetMetadata>,
    /// Rows per uploader, largest first
    pub rows_by_source: Vec<SourceTotal>,
    /// 75th percentile of rows
    pub large_threshold: Option<f64>,
    /// Datasets strictly above the 75th percentile
    pub large_datasets: Vec<DatasetMetadata>,
    /// Per-uploader totals ordered by uploader name
    pub source_totals: Vec<SourceTotal>,
}

/// Sum of dataset rows, saturating at `i64::MAX`
pub fn total_rows(datasets: &[DatasetMetadata]) -> i64 {
    datasets
        .iter()
        .fold(0i64, |acc, d| acc.saturating_add(d.rows))
}

impl DatasetSummary {
    pub fn from_records(datasets: &[DatasetMetadata]) -> Self {
        let total_rows = total_rows(datasets);

        let mut top_by_rows = datasets.to_vec();
        // stable: ties keep table order
        top_by_rows.sort_by(|a, b| b.rows.cmp(&a.rows));
        top_by_rows.truncate(3);

        let mut per_source: BTreeMap<&str, (usize, i64)> = BTreeMap::new();
        for dataset in datasets {
            let entry = per_source.entry(&dataset.uploaded_by).or_default();
            entry.0 += 1;
            entry.1 = entry.1.saturating_add(dataset.rows);
        }
        let source_totals: Vec<SourceTotal> = per_source
            .into_iter()
            .map(|(source, (dataset_count, total_rows))| SourceTotal {
                source: source.to_string(),
                dataset_count,
                total_rows,
            })
            .collect();
        let mut rows_by_source = source_totals.clone();
        rows_by_source.sort_by(|a, b| b.total_rows.cmp(&a.total_rows));

        let rows: Vec<f64> = datasets.iter().map(|d| d.rows as f64).collect();
        let large_threshold = percentile(&rows, 0.75);
        let large_datasets = match large_threshold {
            Some(threshold) => datasets
                .iter()
                .filter(|d| d.rows as f64 > threshold)
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        DatasetSummary {
            total: datasets.len(),
            total_rows,
            storage_gb: (total_rows as f64 * 1000.0) / 1024f64.powi(3),
            sources: source_totals.len(),
            top_by_rows,
            rows_by_source,
            large_threshold,
            large_datasets,
            source_totals,
        }
    }
}
