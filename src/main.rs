use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use log::{info, warn};

use slouch_sentinel::{Config, PostureMonitor, RawKeypoint};

const DEFAULT_CONFIG_PATH: &str = "posture.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)?;

    info!(
        "Slouch sentinel starting: mode={:?} threshold_angle={} score_threshold={} topology={:?}",
        config.classifier.mode,
        config.classifier.threshold_angle,
        config.classifier.score_threshold,
        config.adapter.topology
    );

    let mut monitor = PostureMonitor::new(&config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    // One JSON array of keypoint rows per line, e.g. [[y, x, score], ...].
    for (line_no, line) in stdin.lock().lines().enumerate() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }

        let rows = match parse_rows(&monitor, &line) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Skipping line {}: {e:#}", line_no + 1);
                continue;
            }
        };

        monitor.process_rows(&rows);
        serde_json::to_writer(&mut stdout, &monitor.status())?;
        writeln!(stdout)?;
        stdout.flush()?;
    }

    info!("Input closed, exiting");
    Ok(())
}

fn parse_rows(monitor: &PostureMonitor, line: &str) -> Result<Vec<RawKeypoint>> {
    let rows: Vec<Vec<f32>> = serde_json::from_str(line)?;
    let Some(stride) = rows.first().map(Vec::len) else {
        // Nothing detected in this frame.
        return Ok(Vec::new());
    };
    if rows.iter().any(|row| row.len() != stride) {
        anyhow::bail!("Rows have differing lengths");
    }

    let count = rows.len();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    monitor.adapter().decode(&flat, &[1, count, stride])
}
