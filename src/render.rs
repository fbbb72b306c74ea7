//! HTML rendering of the trigger dashboard and the IPC summary.
//!
//! Output is a self-contained document with inline styles. Category
//! columns get one background color per distinct value; trigger flags are
//! green when set and orange otherwise.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::models::fewsnet::Phase;
use crate::services::fewsnet::IpcSummary;
use crate::services::forecast::{Cell, Column, Schema};
use crate::services::tables::TriggerTable;
use crate::utils::{html_escape, serde_enum_name};

/// Columns whose values are colored by category, in palette order.
pub const CATEGORY_COLUMNS: [Column; 3] = [Column::AdminName, Column::Frequency, Column::IssueMonth];

const TRUE_COLOR: &str = "#CCFFCC";
const FALSE_COLOR: &str = "#FFCC99";

/// `n` evenly spaced hues.
pub fn generate_colors(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("hsl({}, 100%, 70%)", (360.0 / n as f64 * i as f64) as u32))
        .collect()
}

/// Color assignment for one render. Each category column gets a contiguous
/// slice of the palette, values in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorMap {
    colors: BTreeMap<(Column, String), String>,
}

impl ColorMap {
    pub fn build(tables: &[&TriggerTable]) -> Self {
        let mut distinct: Vec<(Column, String)> = Vec::new();
        for column in CATEGORY_COLUMNS {
            for table in tables {
                let Some(value) = table.cell(column).map(|c| cell_text(&c)) else { continue };
                if !distinct.iter().any(|(c, v)| *c == column && *v == value) {
                    distinct.push((column, value));
                }
            }
        }
        let palette = generate_colors(distinct.len());
        ColorMap {
            colors: distinct.into_iter().zip(palette).collect(),
        }
    }

    pub fn color_for(&self, column: Column, value: &str) -> Option<&str> {
        self.colors.get(&(column, value.to_string())).map(String::as_str)
    }
}

fn cell_text(cell: &Cell<'_>) -> String {
    match cell {
        Cell::Text(s) => s.to_string(),
        Cell::Number(n) => format!("{:.2}", n),
        Cell::Percent(p) => format!("{:.2}%", p),
        Cell::Flag(b) => String::from(if *b { "True" } else { "False" }),
        Cell::Markup(m) => m.to_string(),
    }
}

fn cell_style(column: Column, cell: &Cell<'_>, colors: &ColorMap) -> Option<String> {
    match cell {
        Cell::Flag(b) => Some(format!("background-color: {}", if *b { TRUE_COLOR } else { FALSE_COLOR })),
        other => colors
            .color_for(column, &cell_text(other))
            .map(|c| format!("background-color: {}", c)),
    }
}

fn render_cell(column: Column, cell: Option<Cell<'_>>, colors: &ColorMap) -> String {
    let Some(cell) = cell else {
        return "<td></td>".to_string();
    };
    let body = match &cell {
        Cell::Markup(m) => m.to_string(),
        other => html_escape(&cell_text(other)),
    };
    match cell_style(column, &cell, colors) {
        Some(style) => format!("<td style=\"{}\">{}</td>", style, body),
        None => format!("<td>{}</td>", body),
    }
}

/// Table columns: `Admin Name` plus the widest schema present.
fn dashboard_columns(tables: &[&TriggerTable]) -> Vec<Column> {
    let schema = if tables.iter().any(|t| t.row.schema() == Schema::Adjusted) {
        Schema::Adjusted
    } else {
        Schema::Standard
    };
    let mut cols = vec![Column::AdminName];
    cols.extend_from_slice(schema.columns());
    cols
}

pub fn render_trigger_table(tables: &[&TriggerTable]) -> String {
    if tables.is_empty() {
        return "<p class=\"empty\">No trigger data available.</p>".to_string();
    }
    let colors = ColorMap::build(tables);
    let columns = dashboard_columns(tables);

    let mut html = String::from("<table class=\"triggers\">\n<thead><tr>");
    for c in &columns {
        let _ = write!(html, "<th>{}</th>", html_escape(c.header()));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for table in tables {
        html.push_str("<tr>");
        for &c in &columns {
            html.push_str(&render_cell(c, table.cell(c), &colors));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

pub fn render_dashboard(title: &str, tables: &[&TriggerTable]) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <style>{css}</style>
</head>
<body>
    <h1>{title}</h1>
    {table}
</body>
</html>
"#,
        title = html_escape(title),
        css = inline_css(),
        table = render_trigger_table(tables),
    )
}

pub fn render_ipc_summary(summary: &IpcSummary) -> String {
    let phase_name = |p: Phase| serde_enum_name(&p).unwrap_or_default();

    let mut phases = String::from("<table>\n<thead><tr><th>Phase</th><th>Count</th></tr></thead>\n<tbody>\n");
    for (p, n) in &summary.phase_counts {
        let _ = writeln!(phases, "<tr><td>{}</td><td>{}</td></tr>", phase_name(*p), n);
    }
    phases.push_str("</tbody>\n</table>");

    let mut regions = String::from("<table>\n<thead><tr><th>Region</th><th>Count</th></tr></thead>\n<tbody>\n");
    for (r, n) in &summary.region_counts {
        let _ = writeln!(regions, "<tr><td>{}</td><td>{}</td></tr>", html_escape(r), n);
    }
    regions.push_str("</tbody>\n</table>");

    let mut breakdown = String::from("<table>\n<thead><tr><th>Region</th><th>Allowing for assistance</th>");
    for p in Phase::ALL {
        let _ = write!(breakdown, "<th>{}</th>", phase_name(p));
    }
    breakdown.push_str("</tr></thead>\n<tbody>\n");
    for row in &summary.breakdown {
        let _ = write!(
            breakdown,
            "<tr><td>{}</td><td>{}</td>",
            html_escape(&row.region),
            row.allowing_assistance
        );
        for n in row.counts {
            let _ = write!(breakdown, "<td>{}</td>", n);
        }
        breakdown.push_str("</tr>\n");
    }
    breakdown.push_str("</tbody>\n</table>");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>IPC phases - {country}</title>
    <style>{css}</style>
</head>
<body>
    <h1>IPC phases - {country}</h1>
    <p>{kept} of {total} record(s) kept ({undated} without projection dates). Latest report: {latest}.</p>
    <h2>Phase distribution</h2>
    {phases}
    <h2>Records per region</h2>
    {regions}
    <h2>Region and assistance by phase</h2>
    {breakdown}
</body>
</html>
"#,
        country = html_escape(summary.country.as_deref().unwrap_or("unknown country")),
        css = inline_css(),
        kept = summary.kept,
        total = summary.total_records,
        undated = summary.undated_records,
        latest = summary
            .latest_reporting_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string()),
        phases = phases,
        regions = regions,
        breakdown = breakdown,
    )
}

fn inline_css() -> &'static str {
    "body { font-family: sans-serif; margin: 1.5em; } \
     table { border-collapse: collapse; margin-bottom: 1.5em; } \
     th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; } \
     th { background: #f2f2f2; }"
}
