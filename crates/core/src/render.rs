use crate::model::{RunReport, SummaryReport};

const RULE_WIDTH: usize = 40;
const IEC_UNITS: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

pub fn render_summary(summary: &SummaryReport, dry_run: bool) -> String {
    if summary.is_empty() {
        return "No cache directories were processed.\n".to_string();
    }

    let mut out = String::new();
    for (partition, stats) in &summary.partitions {
        if dry_run {
            out.push_str(&format!("Partition {partition} (dry run)\n"));
        } else {
            out.push_str(&format!("Partition {partition}\n"));
        }
        out.push_str(&"-".repeat(RULE_WIDTH));
        out.push('\n');
        for entry in &stats.entries {
            out.push_str(&format!("{}: {}\n", entry.account, human_bytes(entry.bytes)));
        }
        let total_label = if dry_run {
            "Total reclaimable"
        } else {
            "Total cleared"
        };
        out.push_str(&format!(
            "{total_label}: {}\n",
            human_bytes(stats.total_bytes)
        ));
        out.push_str(&format!("Accounts processed: {}\n", stats.accounts_processed));
        out.push_str(&"=".repeat(RULE_WIDTH));
        out.push('\n');
    }
    out
}

pub fn render_run_report(report: &RunReport) -> String {
    let mut out = render_summary(&report.summary, report.dry_run);
    let failed = report
        .summary
        .partitions
        .values()
        .map(|stats| stats.failed)
        .sum::<u64>();
    if failed > 0 {
        out.push_str(&format!(
            "{failed} cache director(ies) could not be cleared; see the error log.\n"
        ));
    }
    if report.interrupted {
        out.push_str(if report.forced {
            "Run was interrupted and in-flight work was terminated; totals are partial.\n"
        } else {
            "Run was interrupted; totals are partial.\n"
        });
    }
    out
}

/// Binary-prefixed size in the style of `numfmt --to=iec-i`: plain integers
/// below 1 KiB, one decimal below 10 units, rounding always away from zero.
pub fn human_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return bytes.to_string();
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < IEC_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value < 10.0 {
        let tenths = (value * 10.0).ceil();
        if tenths < 100.0 {
            return format!("{:.1}{}", tenths / 10.0, IEC_UNITS[unit]);
        }
        value = 10.0;
    }

    let whole = value.ceil();
    if whole >= 1024.0 && unit < IEC_UNITS.len() - 1 {
        return format!("1.0{}", IEC_UNITS[unit + 1]);
    }
    format!("{}{}", whole as u64, IEC_UNITS[unit])
}
