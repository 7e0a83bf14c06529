pub fn format_bytes(value: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if value < 1024 {
        return format!("{value} B");
    }

    let mut size = value as f64;
    let mut unit = 0usize;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if size < 10.0 { format!("{size:.1} {}", UNITS[unit]) } else { format!("{size:.0} {}", UNITS[unit]) }
}

/// "12.3 MB of 40 MB", or just the received amount when the total is unknown.
pub fn format_transfer(received: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => format!("{} of {}", format_bytes(received), format_bytes(total)),
        _ => format_bytes(received),
    }
}

/// Whole percentage, clamped to 100. An unknown total reports 0.
pub fn percent_of(received: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => ((received.saturating_mul(100)) / total).min(100) as u8,
        _ => 0,
    }
}
