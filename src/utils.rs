/// `info!` that keeps ANSI colour codes only when the terminal display is
/// colourful, and strips them otherwise (file logging, plain terminals).
#[macro_export]
macro_rules! cinfo {
    ($colorful:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        if $colorful {
            log::info!("{}", message);
        } else {
            log::info!("{}", $crate::utils::strip_ansi(&message));
        }
    }};
}

/// Removes `ESC [ ... m` colour sequences.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Mean and population variance (divisor n). An empty slice gives (0, 0).
pub fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

/// K values `start, start+step, ...` strictly below `stop + 1`.
pub fn k_range(start: usize, stop: usize, step: usize) -> Vec<usize> {
    if step == 0 || start == 0 || start > stop {
        return Vec::new();
    }
    (start..=stop).step_by(step).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;93mFold #1\x1b[0m done"), "Fold #1 done");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn test_mean_and_variance() {
        let (mean, variance) = mean_and_variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(variance, 4.0, "population variance divides by n");
        assert_eq!(mean_and_variance(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_k_range() {
        assert_eq!(k_range(1, 10, 2), vec![1, 3, 5, 7, 9]);
        assert_eq!(k_range(1, 10, 11), vec![1]);
        assert_eq!(k_range(3, 3, 1), vec![3]);
        assert!(k_range(1, 10, 0).is_empty(), "a null step yields no value");
        assert!(k_range(0, 10, 1).is_empty(), "K=0 is never evaluated");
    }
}
