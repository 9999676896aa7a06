use std::cmp::Ordering;
use statrs::statistics::Statistics;

/// a macro to declare simple Vec<String>
#[macro_export]
macro_rules! string_vec {
    ($($x:expr),*) => {
        vec![$($x.into()),*]
    };
}

/// info! that keeps ANSI colours only when colourful display is on
#[macro_export]
macro_rules! cinfo {
    ($colorful:expr, $($arg:tt)*) => {
        if $colorful {
            log::info!($($arg)*);
        } else {
            log::info!("{}", $crate::utils::strip_ansi(&format!($($arg)*)));
        }
    };
}

/// Remove ANSI escape sequences (`\x1b[...m`) from a string.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for inner in chars.by_ref() {
                if inner.is_ascii_alphabetic() { break }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Bounds `[start, end)` of chunk `i` when `n` elements are split into `p` chunks of
/// approximatively the same size: the first `n % p` chunks receive one extra element.
pub fn balanced_chunk_bounds(n: usize, p: usize, i: usize) -> (usize, usize) {
    let base_size = n / p;
    let extra_elements = n % p;
    let start = i * base_size + i.min(extra_elements);
    let size = base_size + if i < extra_elements { 1 } else { 0 };
    (start, start + size)
}

/// Compare version labels so that digit runs are compared as numbers ("1.10" > "1.9").
/// Labels that only differ by leading zeros ("1.01", "1.1") fall back to plain string order,
/// so the result is `Equal` only for identical labels.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    numeric_runs_cmp(a, b).then_with(|| a.cmp(b))
}

fn numeric_runs_cmp(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let mut na = String::new();
                while let Some(c) = a_chars.peek().copied().filter(|c| c.is_ascii_digit()) {
                    na.push(c);
                    a_chars.next();
                }
                let mut nb = String::new();
                while let Some(c) = b_chars.peek().copied().filter(|c| c.is_ascii_digit()) {
                    nb.push(c);
                    b_chars.next();
                }
                let na_trim = na.trim_start_matches('0');
                let nb_trim = nb.trim_start_matches('0');
                let ord = na_trim.len().cmp(&nb_trim.len()).then_with(|| na_trim.cmp(nb_trim));
                if ord != Ordering::Equal { return ord }
            }
            (Some(ca), Some(cb)) => {
                if ca != cb { return ca.cmp(&cb) }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

/// Mean and sample standard deviation; the deviation is 0 when it is undefined.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() { return (0.0, 0.0) }
    let mean = values.iter().mean();
    let std = values.iter().std_dev();
    (mean, if std.is_finite() { std } else { 0.0 })
}

pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}
