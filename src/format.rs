//! # Size Formatting
//!
//! Helpers used by the presentation layer to show file sizes and savings.
//!
//! ## Funzioni:
//! - `format_size()`: converte byte in formato leggibile (Bytes, KB, MB, GB)
//! - `calculate_reduction()`: percentuale di riduzione come numero
//! - `compression_ratio()`: la stessa percentuale come testo "<n>% smaller"

const UNITS: &[&str] = &["Bytes", "KB", "MB", "GB"];

/// Get human-readable file size
pub fn format_size(size: u64) -> String {
    if size == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = size as f64;
    let mut unit_index = 0;

    while value >= 1024.0 && unit_index < UNITS.len() - 1 {
        value /= 1024.0;
        unit_index += 1;
    }

    // 1023.995 and up would print as "1024.00"
    if unit_index > 0 && unit_index < UNITS.len() - 1 && (value * 100.0).round() >= 102_400.0 {
        value /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit_index])
    }
}

/// Calculate percentage reduction, `None` when either size is unknown
pub fn calculate_reduction(original_size: u64, compressed_size: u64) -> Option<f64> {
    if original_size == 0 || compressed_size == 0 {
        return None;
    }
    Some((original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0)
}

/// Savings label such as "42.5% smaller"; empty when either size is zero
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> String {
    match calculate_reduction(original_size, compressed_size) {
        Some(ratio) => format!("{:.1}% smaller", ratio),
        None => String::new(),
    }
}
