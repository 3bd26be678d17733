//! Human-readable prime time summary.

use ratewise_core::PrimeTimeWindow;

pub fn format_windows(windows: &[PrimeTimeWindow]) -> String {
    if windows.is_empty() {
        return "No prime time windows detected\n".to_string();
    }

    let mut out = String::new();
    out.push_str(&format!("Prime time windows ({}):\n", windows.len()));
    for (i, w) in windows.iter().enumerate() {
        out.push_str(&format!(
            "  {}. {} UTC ({} min)\n",
            i + 1,
            w.label(),
            w.duration_minutes()
        ));
        out.push_str(&format!(
            "     avg peak {:.2} over {} samples, consistency {:.2}, threshold {:.2}\n",
            w.average_peak, w.sample_count, w.consistency_score, w.percentile_threshold
        ));
    }
    out
}
