//! Markdown summary of the redundancy audit.

use super::correlation::{CorrelationMethod, HighPair, representative};
use itertools::Itertools;

/// Pairs listed in the report before truncation.
pub const REPORT_TOP_PAIRS: usize = 20;

pub fn render_report(
    pairs: &[HighPair],
    clusters: &[Vec<String>],
    depth: Option<&str>,
    method: CorrelationMethod,
    threshold: f64,
) -> String {
    let title_depth = depth
        .map(|d| format!(" (depth {d} cm)"))
        .unwrap_or_default();
    let mut lines = vec![
        format!("# ISPC variable reduction report{title_depth}\n"),
        format!("- Correlation method: `{method}`"),
        format!("- Redundancy threshold on |r|: `{threshold}`\n"),
    ];

    if pairs.is_empty() {
        lines.push("No pair reaches the selected threshold.".to_string());
        return finish(lines);
    }

    lines.push(format!("## Most correlated pairs (top {REPORT_TOP_PAIRS})\n"));
    lines.extend(
        pairs
            .iter()
            .take(REPORT_TOP_PAIRS)
            .map(|p| format!("- {} × {}: r={:.3}", p.var_a, p.var_b, p.corr)),
    );

    lines.push("\n## Redundancy clusters (connected components)\n".to_string());
    if clusters.is_empty() {
        lines.push("No cluster was formed.".to_string());
        return finish(lines);
    }
    lines.extend(
        clusters
            .iter()
            .enumerate()
            .map(|(idx, cluster)| format!("- Cluster {}: {}", idx + 1, cluster.join(", "))),
    );

    lines.push("\n## Suggested reduction\n".to_string());
    lines.push(
        "Keep one representative per cluster and drop the others only after checking that \
         the downstream index and regressions still hold.\n"
            .to_string(),
    );
    for (idx, cluster) in clusters.iter().enumerate() {
        let Some(keep) = representative(cluster) else {
            continue;
        };
        let drops = cluster
            .iter()
            .filter(|m| m.as_str() != keep)
            .map(|m| format!("`{m}`"))
            .join(", ");
        lines.push(format!(
            "- Cluster {}: keep `{keep}`; drop candidates: {drops}",
            idx + 1
        ));
    }
    finish(lines)
}

fn finish(lines: Vec<String>) -> String {
    lines.join("\n") + "\n"
}
