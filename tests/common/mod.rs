//! Synthetic ISPC record files for the integration tests.

use ispc_reduce::records::{INPUT_FEATURES, ISPC_COLUMNS, TARGETS};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn raw_header(key: &'static str) -> &'static str {
    ISPC_COLUMNS
        .iter()
        .find(|column| column.key == key)
        .map(|column| column.raw)
        .unwrap_or(key)
}

/// CSV text with spreadsheet headers, `n` rows cycling through `depths`, and
/// targets that are noisy linear functions of the inputs. The first row has
/// no `dmp` value.
pub fn records_csv(n: usize, seed: u64, depths: &[&str]) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut header = vec!["ano", "profundidade_cm", "Parcela", "Cultura"];
    header.extend(INPUT_FEATURES.iter().copied().map(raw_header));
    header.extend(TARGETS.iter().copied().map(raw_header));

    let mut out = String::new();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in 0..n {
        let inputs: Vec<f64> = (0..INPUT_FEATURES.len())
            .map(|j| (j as f64 + 1.0) * rng.gen_range(0.5..1.5))
            .collect();
        let mut cells = vec![
            "2023".to_string(),
            depths[row % depths.len()].to_string(),
            format!("P{row}"),
            "milho".to_string(),
        ];
        cells.extend(inputs.iter().map(|v| format!("{v:.6}")));
        for t in 0..TARGETS.len() {
            let signal: f64 = inputs
                .iter()
                .enumerate()
                .map(|(j, x)| x * (((j * 3 + t) % 5) as f64 - 2.0) * 0.3)
                .sum();
            let value = 10.0 + signal + rng.gen_range(-0.05..0.05);
            if row == 0 && TARGETS[t] == "dmp" {
                cells.push(String::new());
            } else {
                cells.push(format!("{value:.6}"));
            }
        }
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// The same records as a bare spreadsheet export: no `ano` or
/// `profundidade_cm` columns.
pub fn raw_export_csv(n: usize, seed: u64) -> String {
    records_csv(n, seed, &[""])
        .lines()
        .map(|line| line.splitn(3, ',').nth(2).unwrap_or(""))
        .fold(String::new(), |mut out, line| {
            out.push_str(line);
            out.push('\n');
            out
        })
}
