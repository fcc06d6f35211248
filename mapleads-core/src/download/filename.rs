use chrono::{DateTime, Utc};
use mapleads_model::Job;

use super::regions::{country_name, subdivision_name};

const FALLBACK_STEM: &str = "leads";
const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Name for a downloaded result file:
/// `<keyword>-(<location>)-<YYYY-MM-DD>.csv`.
///
/// The keyword is slugged, location codes are resolved to readable names
/// and lowercased. Missing location or date drop their segment.
pub fn download_filename(
    keyword: &str,
    location: Option<&str>,
    completed_at: Option<DateTime<Utc>>,
) -> String {
    let mut name = slug(keyword);
    if name.is_empty() {
        name.push_str(FALLBACK_STEM);
    }

    if let Some(location) = location.map(readable_location)
        && !location.is_empty()
    {
        name.push_str("-(");
        name.push_str(&location);
        name.push(')');
    }

    if let Some(date) = completed_at {
        name.push('-');
        name.push_str(&date.format("%Y-%m-%d").to_string());
    }

    name.push_str(".csv");
    name
}

/// [`download_filename`] for a job, preferring its completion timestamp.
pub fn job_download_filename(job: &Job) -> String {
    download_filename(
        &job.keyword,
        job.location.as_deref(),
        job.completed_at.or(job.updated_at),
    )
}

/// Lowercase, with every run of non-alphanumerics collapsed to one dash.
fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// `"CA, US"` becomes `"california, united states"`.
fn readable_location(label: &str) -> String {
    let parts: Vec<&str> = label
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let country_code = parts
        .last()
        .filter(|p| p.len() == 2 && country_name(p).is_some())
        .copied();

    parts
        .iter()
        .enumerate()
        .map(|(idx, part)| {
            let is_last = idx + 1 == parts.len();
            let resolved = match country_code {
                Some(code) if is_last => country_name(code),
                Some(code) if looks_like_code(part) => {
                    subdivision_name(code, part)
                }
                _ => None,
            };
            clean_part(resolved.unwrap_or(part))
        })
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn looks_like_code(part: &str) -> bool {
    (2..=3).contains(&part.len()) && part.chars().all(|c| c.is_ascii_alphabetic())
}

fn clean_part(part: &str) -> String {
    part.chars()
        .filter(|c| !UNSAFE_CHARS.contains(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
