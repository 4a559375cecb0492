//! yt-dlp output line parsing.
//!
//! yt-dlp is run with `--newline`, so every progress update is its own line:
//!
//! ```text
//! [download] Destination: /tmp/item-1/Song.webm
//! [download]  42.3% of    3.51MiB at  512.00KiB/s ETA 00:04
//! [ExtractAudio] Destination: /tmp/item-1/Song.mp3
//! ```

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use super::process::ProcessEvent;

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%(?:.*?\bETA\s+((?:\d+:)?\d{1,2}:\d{2}))?")
            .unwrap_or_else(|e| unreachable!("progress regex: {e}"))
    })
}

fn destination_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(download|ExtractAudio)\]\s+Destination:\s+(.+?)\s*$")
            .unwrap_or_else(|e| unreachable!("destination regex: {e}"))
    })
}

/// `MM:SS` or `HH:MM:SS` to seconds.
fn parse_eta(s: &str) -> Option<u64> {
    s.split(':')
        .try_fold(0u64, |acc, part| part.parse::<u64>().ok().map(|v| acc * 60 + v))
}

/// Classify one output line.
pub fn parse_line(line: &str, stderr: bool) -> ProcessEvent {
    if let Some(caps) = progress_re().captures(line) {
        if let Some(percent) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
            return ProcessEvent::Progress {
                percent,
                eta_secs: caps.get(2).and_then(|m| parse_eta(m.as_str())),
            };
        }
    }
    if let Some(caps) = destination_re().captures(line) {
        let path = PathBuf::from(&caps[2]);
        return if &caps[1] == "ExtractAudio" {
            ProcessEvent::Extracted(path)
        } else {
            ProcessEvent::Destination(path)
        };
    }
    ProcessEvent::Output {
        line: line.to_string(),
        stderr,
    }
}
