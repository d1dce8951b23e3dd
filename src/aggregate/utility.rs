/// `part / total` as a fraction. Returns 0.0 when `total` is zero.
pub fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Attendance rate, or `None` when the group held no sessions.
pub fn attendance_rate(present: usize, sessions: usize) -> Option<f64> {
    if sessions == 0 {
        None
    } else {
        Some((present as f64 / sessions as f64).clamp(0.0, 1.0))
    }
}
