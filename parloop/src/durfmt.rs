//! Durations printed the way Go's `time.Duration` prints them, so threshold
//! and runtime reports read the same as the benchmark output next to them.

/// Format nanoseconds as Go does: `312ns`, `1.5µs`, `30ms`, `2.5s`, `1m30s`.
pub fn format_duration(nanos: i64) -> String {
    if nanos == 0 {
        return "0s".to_owned();
    }
    let negative = nanos < 0;
    let mut n = nanos.unsigned_abs();
    let mut out = String::new();

    if n < 1_000_000_000 {
        // Sub-second: pick the largest fitting unit and trim the fraction.
        let (unit, scale) = if n < 1_000 {
            ("ns", 1)
        } else if n < 1_000_000 {
            ("µs", 1_000)
        } else {
            ("ms", 1_000_000)
        };
        out.push_str(&format_scaled(n, scale));
        out.push_str(unit);
    } else {
        let secs = n / 1_000_000_000;
        n %= 1_000_000_000;
        let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
        if hours > 0 {
            out.push_str(&hours.to_string());
            out.push('h');
        }
        if minutes > 0 || hours > 0 {
            out.push_str(&minutes.to_string());
            out.push('m');
        }
        out.push_str(&format_scaled(seconds * 1_000_000_000 + n, 1_000_000_000));
        out.push('s');
    }

    if negative {
        out.insert(0, '-');
    }
    out
}

/// `value / scale` with the fractional part trimmed of trailing zeros.
fn format_scaled(value: u64, scale: u64) -> String {
    let whole = value / scale;
    let frac = value % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let width = scale.ilog10() as usize;
    let mut frac = format!("{frac:0width$}");
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{whole}.{frac}")
}
