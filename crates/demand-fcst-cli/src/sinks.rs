//! Export sinks. Each renders a finished [`Report`] and nothing else.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};
use clap::ValueEnum;
use demand_fcst_core::{ForecastRow, Report, TrendRow};

/// Output format of the `forecast` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Spreadsheet-style sheet of forecast rows
    #[default]
    Csv,
    /// Human-readable document
    Text,
    /// Full report as JSON
    Json,
}

/// Render `report` in `format`.
pub fn write_report<W: Write>(report: &Report, format: OutputFormat, out: W) -> Result<()> {
    match format {
        OutputFormat::Csv => write_sheet(report, out),
        OutputFormat::Text => write_document(report, out),
        OutputFormat::Json => write_json(report, out),
    }
}

/// One sheet: a header row, then one row per future period per entity.
pub fn write_sheet<W: Write>(report: &Report, out: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(ForecastRow::HEADERS)?;
    for row in &report.forecasts {
        writer
            .serialize(row)
            .with_context(|| format!("writing row for {} {}", row.entity_id, row.period))?;
    }
    writer.flush().context("flushing sheet")?;
    Ok(())
}

pub fn write_json<W: Write>(report: &Report, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, report).context("serializing report")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Text document: one section per entity (per-period predictions and trend
/// label), the group totals, then every exclusion category that is not
/// empty.
pub fn write_document<W: Write>(report: &Report, mut out: W) -> Result<()> {
    writeln!(out, "Demand forecast, next {} period(s)", report.horizon)?;

    let trends = report.trend_index();
    let mut current: Option<&str> = None;
    for row in &report.forecasts {
        if current != Some(row.entity_id.as_str()) {
            if let Some(previous) = current {
                write_trend_line(&trends, previous, &mut out)?;
            }
            writeln!(out)?;
            writeln!(
                out,
                "== {} - {} (group {}) ==",
                row.entity_id, row.entity_name, row.group_id
            )?;
            current = Some(row.entity_id.as_str());
        }
        writeln!(
            out,
            "  {:<10} {:>12.2}   [{:.2}, {:.2}]",
            row.period, row.predicted, row.lower, row.upper
        )?;
    }
    if let Some(last) = current {
        write_trend_line(&trends, last, &mut out)?;
    }

    writeln!(out)?;
    writeln!(out, "== Group totals ==")?;
    if report.group_totals.is_empty() {
        writeln!(out, "  (none)")?;
    }
    for group in &report.group_totals {
        write!(
            out,
            "  {}: {:.2} over {} period(s), {} item(s)",
            group.group_id,
            group.total,
            group.horizon,
            group.contributing.len()
        )?;
        if !group.excluded.is_empty() {
            let excluded: Vec<String> = group
                .excluded
                .iter()
                .map(|e| format!("{} ({})", e.entity_id, e.reason))
                .collect();
            write!(out, "; excluded: {}", excluded.join(", "))?;
        }
        writeln!(out)?;
    }

    if !report.insufficient_history.is_empty() {
        writeln!(out)?;
        writeln!(out, "== Insufficient history ==")?;
        for item in &report.insufficient_history {
            writeln!(
                out,
                "  {} - {} (group {}): {} of {} period(s)",
                item.entity.id, item.entity.name, item.entity.group_id, item.periods, item.required
            )?;
        }
    }

    if !report.failures.is_empty() {
        writeln!(out)?;
        writeln!(out, "== Forecast failures ==")?;
        for failure in &report.failures {
            writeln!(
                out,
                "  {} - {} (group {}): {}",
                failure.entity_id, failure.entity_name, failure.group_id, failure.reason
            )?;
        }
    }

    if !report.conflicts.is_empty() {
        writeln!(out)?;
        writeln!(out, "== Conflicting item details ==")?;
        for conflict in &report.conflicts {
            writeln!(
                out,
                "  {} {}: {} (using '{}')",
                conflict.entity_id,
                conflict.field,
                conflict.values.join(" | "),
                conflict.values.first().map(String::as_str).unwrap_or_default()
            )?;
        }
    }

    if !report.row_issues.is_empty() {
        writeln!(out)?;
        writeln!(out, "== Skipped rows ==")?;
        for issue in &report.row_issues {
            writeln!(
                out,
                "  row {} {} '{}': {}",
                issue.row, issue.field, issue.value, issue.reason
            )?;
        }
    }

    out.flush()?;
    Ok(())
}

fn write_trend_line<W: Write>(
    trends: &HashMap<&str, &TrendRow>,
    entity_id: &str,
    out: &mut W,
) -> Result<()> {
    let Some(trend) = trends.get(entity_id) else {
        return Ok(());
    };
    write!(out, "  trend: {} ({:+.2}", trend.direction, trend.delta)?;
    if let Some(rel) = trend.relative_change {
        write!(out, ", {:+.1}%", rel * 100.0)?;
    }
    writeln!(out, ")")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use demand_fcst_core::TrendDirection;

    fn report() -> Report {
        Report {
            horizon: 2,
            forecasts: ["2025-01", "2025-02"]
                .iter()
                .map(|p| ForecastRow {
                    period: p.to_string(),
                    entity_id: "A".into(),
                    entity_name: "Parafuso".into(),
                    group_id: "X".into(),
                    predicted: 10.0,
                    lower: 8.0,
                    upper: 12.0,
                })
                .collect(),
            trends: vec![TrendRow {
                entity_id: "A".into(),
                entity_name: "Parafuso".into(),
                group_id: "X".into(),
                direction: TrendDirection::Increasing,
                delta: 2.0,
                recent_average: 8.0,
                forecast_average: 10.0,
                relative_change: Some(0.25),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_sheet_has_header_and_one_row_per_period() {
        let mut buf = Vec::new();
        write_sheet(&report(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "period,entity_id,entity_name,group_id,predicted,lower,upper");
        assert_eq!(lines[1], "2025-01,A,Parafuso,X,10.0,8.0,12.0");
    }

    #[test]
    fn test_empty_sheet_still_has_header() {
        let mut buf = Vec::new();
        write_sheet(&Report::default(), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_document_sections() {
        let mut buf = Vec::new();
        write_document(&report(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("== A - Parafuso (group X) =="));
        assert!(text.contains("trend: increasing (+2.00, +25.0%)"));
        assert!(text.contains("== Group totals =="));
        assert!(!text.contains("== Forecast failures =="));
    }

    #[test]
    fn test_each_trend_line_follows_its_own_section() {
        let mut report = report();
        report.forecasts.push(ForecastRow {
            period: "2025-01".into(),
            entity_id: "B".into(),
            entity_name: "Porca".into(),
            group_id: "X".into(),
            predicted: 5.0,
            lower: 4.0,
            upper: 6.0,
        });
        // trends listed in a different order than the sections
        report.trends.insert(
            0,
            TrendRow {
                entity_id: "B".into(),
                entity_name: "Porca".into(),
                group_id: "X".into(),
                direction: TrendDirection::Decreasing,
                delta: -1.0,
                recent_average: 6.0,
                forecast_average: 5.0,
                relative_change: None,
            },
        );

        let mut buf = Vec::new();
        write_document(&report, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let a = text.find("== A - Parafuso").unwrap();
        let b = text.find("== B - Porca").unwrap();
        let up = text.find("trend: increasing").unwrap();
        let down = text.find("trend: decreasing (-1.00)").unwrap();
        assert!(a < up && up < b);
        assert!(b < down);
    }
}
