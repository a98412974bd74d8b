//! Workload file loading and round-robin partitioning across workers.

use std::path::Path;

/// Read one SQL statement per line, skipping blank lines and `--` comments.
/// Remaining lines are taken verbatim, in file order.
pub fn load_statements(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read workload {}: {}", path.display(), e))?;

    let statements = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--"))
        .map(str::to_string)
        .collect();

    Ok(statements)
}

/// Split `items` into `n` ordered buckets by index modulo `n`. Each item lands
/// in exactly one bucket and relative order is preserved within a bucket.
pub fn partition(items: Vec<String>, n: usize) -> Vec<Vec<String>> {
    assert!(n > 0, "partition requires at least one bucket");

    let mut buckets: Vec<Vec<String>> = (0..n).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        buckets[i % n].push(item);
    }
    buckets
}
