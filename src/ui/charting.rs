/// Points and Y bound for the score-history chart. X is the session index, 1-based.
pub fn history_points(scores: &[u32]) -> (Vec<(f64, f64)>, f64) {
    let points: Vec<(f64, f64)> = scores
        .iter()
        .enumerate()
        .map(|(i, &s)| ((i + 1) as f64, s as f64))
        .collect();
    let highest = scores.iter().copied().max().unwrap_or(0).max(1);
    (points, highest as f64)
}

/// `m:ss` for a millisecond countdown, rounding up so 0:00 means done.
pub fn format_clock(ms: f64) -> String {
    let secs = (ms.max(0.0) / 1000.0).ceil() as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}
