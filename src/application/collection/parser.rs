//! Text exposition format parser.
//!
//! Turns a scrape payload into a map of synthetic series key -> sample.
//! Parsing is line oriented and never fails as a whole: a bad line is
//! dropped with a debug note and the rest of the payload still counts.

use crate::domain::metrics::{MetricSample, MetricSet};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;
use tracing::debug;

type Chars<'a> = Peekable<CharIndices<'a>>;

#[derive(Debug, Error, PartialEq)]
enum LineError {
    #[error("invalid metric name")]
    InvalidName,
    #[error("invalid label '{0}'")]
    InvalidLabel(String),
    #[error("unterminated label set")]
    UnterminatedLabels,
    #[error("missing sample value")]
    MissingValue,
    #[error("non-numeric sample value '{0}'")]
    InvalidValue(String),
    #[error("unexpected trailing content '{0}'")]
    TrailingContent(String),
}

pub struct MetricSampleParser;

impl MetricSampleParser {
    /// Parse an exposition payload.
    ///
    /// Metadata lines (`# HELP`, `# TYPE`, comments) and blank lines are
    /// ignored. If the same series appears twice the later line wins.
    pub fn parse(payload: &str) -> BTreeMap<String, MetricSample> {
        let mut samples = BTreeMap::new();

        for (index, raw) in payload.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line) {
                Ok(sample) => {
                    samples.insert(sample.series_key(), sample);
                }
                Err(e) => {
                    debug!("MetricSampleParser: skipping line {} ({}): {}", index + 1, e, line);
                }
            }
        }

        samples
    }

    /// Collapse parsed samples into forwardable values.
    ///
    /// NaN and infinities cannot be carried by the ingestion API and are
    /// dropped here.
    pub fn flatten(samples: &BTreeMap<String, MetricSample>) -> MetricSet {
        samples
            .iter()
            .filter_map(|(key, sample)| {
                if sample.value.is_finite() {
                    Some((key.clone(), sample.value))
                } else {
                    debug!(
                        "MetricSampleParser: dropping non-finite value for {}: {}",
                        key, sample.value
                    );
                    None
                }
            })
            .collect()
    }
}

fn parse_line(line: &str) -> Result<MetricSample, LineError> {
    let name_end = line
        .char_indices()
        .find(|&(i, c)| !is_metric_name_char(c, i == 0))
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    if name_end == 0 {
        return Err(LineError::InvalidName);
    }
    let name = &line[..name_end];
    let mut rest = &line[name_end..];

    let mut labels = BTreeMap::new();
    if let Some(after_brace) = rest.strip_prefix('{') {
        let (parsed, remainder) = parse_labels(after_brace)?;
        labels = parsed;
        rest = remainder;
    } else if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(LineError::InvalidName);
    }

    let mut tokens = rest.split_whitespace();
    let raw_value = tokens.next().ok_or(LineError::MissingValue)?;
    let value = parse_float(raw_value).ok_or_else(|| LineError::InvalidValue(raw_value.to_string()))?;

    // Optional timestamp; anything past it is garbage.
    let _timestamp = tokens.next();
    if let Some(extra) = tokens.next() {
        return Err(LineError::TrailingContent(extra.to_string()));
    }

    Ok(MetricSample {
        name: name.to_string(),
        value,
        labels,
    })
}

/// Parse a label set. `input` starts right after the opening brace; the
/// returned slice starts right after the closing one.
fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str), LineError> {
    let mut labels = BTreeMap::new();
    let mut chars = input.char_indices().peekable();

    loop {
        skip_whitespace(&mut chars);
        match chars.peek() {
            Some(&(idx, '}')) => return Ok((labels, &input[idx + 1..])),
            None => return Err(LineError::UnterminatedLabels),
            _ => {}
        }

        let key = read_label_name(&mut chars)?;
        skip_whitespace(&mut chars);
        if !matches!(chars.next(), Some((_, '='))) {
            return Err(LineError::InvalidLabel(key));
        }
        skip_whitespace(&mut chars);
        if !matches!(chars.next(), Some((_, '"'))) {
            return Err(LineError::InvalidLabel(key));
        }
        let value = read_quoted(&mut chars).ok_or(LineError::UnterminatedLabels)?;
        labels.insert(key, value);

        skip_whitespace(&mut chars);
        match chars.next() {
            Some((_, ',')) => continue,
            Some((idx, '}')) => return Ok((labels, &input[idx + 1..])),
            _ => return Err(LineError::UnterminatedLabels),
        }
    }
}

fn read_label_name(chars: &mut Chars<'_>) -> Result<String, LineError> {
    let mut name = String::new();
    while let Some(&(_, c)) = chars.peek() {
        let valid = c == '_' || c.is_ascii_alphabetic() || (!name.is_empty() && c.is_ascii_digit());
        if !valid {
            break;
        }
        name.push(c);
        chars.next();
    }

    if name.is_empty() {
        Err(LineError::InvalidLabel(name))
    } else {
        Ok(name)
    }
}

/// Read a quoted label value up to the closing quote, resolving escapes.
fn read_quoted(chars: &mut Chars<'_>) -> Option<String> {
    let mut value = String::new();
    loop {
        match chars.next()? {
            (_, '"') => return Some(value),
            (_, '\\') => match chars.next()? {
                (_, 'n') => value.push('\n'),
                (_, '\\') => value.push('\\'),
                (_, '"') => value.push('"'),
                (_, other) => {
                    value.push('\\');
                    value.push(other);
                }
            },
            (_, c) => value.push(c),
        }
    }
}

fn skip_whitespace(chars: &mut Chars<'_>) {
    while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn is_metric_name_char(c: char, first: bool) -> bool {
    c == '_' || c == ':' || c.is_ascii_alphabetic() || (!first && c.is_ascii_digit())
}

/// Go-style float parsing: exporters emit `NaN`, `+Inf` and `-Inf`.
fn parse_float(s: &str) -> Option<f64> {
    match s.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        other => other.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unlabelled_samples() {
        let samples =
            MetricSampleParser::parse("nginx_connections_active 4\nnginx_http_requests_total 1000\n");

        assert_eq!(samples.len(), 2);
        assert_eq!(samples["nginx_connections_active"].value, 4.0);
        assert_eq!(samples["nginx_http_requests_total"].value, 1000.0);
        assert!(samples["nginx_connections_active"].labels.is_empty());
    }

    #[test]
    fn test_metadata_and_blank_lines_ignored() {
        let payload = "# HELP nginx_up Status of the last scrape\n\
                       # TYPE nginx_up gauge\n\
                       \n\
                       nginx_up 1\n";
        let samples = MetricSampleParser::parse(payload);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples["nginx_up"].value, 1.0);
    }

    #[test]
    fn test_labelled_series_not_collapsed() {
        let payload = "http_requests_total{method=\"get\",code=\"200\"} 10\n\
                       http_requests_total{method=\"post\",code=\"200\"} 3\n";
        let samples = MetricSampleParser::parse(payload);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples["http_requests_total_code_200_method_get"].value, 10.0);
        assert_eq!(samples["http_requests_total_code_200_method_post"].value, 3.0);
    }

    #[test]
    fn test_label_order_does_not_change_key() {
        let a = MetricSampleParser::parse("m{b=\"2\",a=\"1\"} 5");
        let b = MetricSampleParser::parse("m{a=\"1\",b=\"2\"} 5");
        assert_eq!(a.keys().collect::<Vec<_>>(), b.keys().collect::<Vec<_>>());
        assert!(a.contains_key("m_a_1_b_2"));
    }

    #[test]
    fn test_escaped_label_values() {
        let samples = MetricSampleParser::parse(r#"m{path="/a\"b",note="x\\y,z"} 1"#);
        let sample = samples.values().next().expect("one sample");
        assert_eq!(sample.labels["path"], "/a\"b");
        assert_eq!(sample.labels["note"], "x\\y,z");
    }

    #[test]
    fn test_timestamp_and_trailing_comma_accepted() {
        let samples = MetricSampleParser::parse("m{a=\"1\",} 2 1543182234");
        assert_eq!(samples["m_a_1"].value, 2.0);
    }

    #[test]
    fn test_malformed_lines_dropped() {
        let payload = "good 1\n\
                       bad_value abc\n\
                       foo=2\n\
                       {a=\"1\"} 3\n\
                       unterminated{a=\"1\" 4\n\
                       no_value\n\
                       too many tokens here\n\
                       also_good 2.5\n";
        let samples = MetricSampleParser::parse(payload);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples["good"].value, 1.0);
        assert_eq!(samples["also_good"].value, 2.5);
    }

    #[test]
    fn test_empty_and_garbage_payloads() {
        assert!(MetricSampleParser::parse("").is_empty());
        assert!(MetricSampleParser::parse("<html><body>502</body></html>").is_empty());
        assert!(MetricSampleParser::parse("\u{0}\u{1}{{{}}}").is_empty());
    }

    #[test]
    fn test_go_style_floats() {
        assert!(parse_float("NaN").expect("nan").is_nan());
        assert_eq!(parse_float("+Inf"), Some(f64::INFINITY));
        assert_eq!(parse_float("-Inf"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert_eq!(parse_float("x"), None);
    }

    #[test]
    fn test_flatten_drops_non_finite() {
        let samples = MetricSampleParser::parse("a 1\nb NaN\nc +Inf\n");
        let set = MetricSampleParser::flatten(&samples);
        assert_eq!(set.len(), 1);
        assert_eq!(set["a"], 1.0);
    }

    #[test]
    fn test_parse_line_errors() {
        assert_eq!(parse_line("9abc 1"), Err(LineError::InvalidName));
        assert_eq!(parse_line("abc"), Err(LineError::MissingValue));
        assert_eq!(
            parse_line("abc{1x=\"a\"} 1"),
            Err(LineError::InvalidLabel(String::new()))
        );
    }
}
