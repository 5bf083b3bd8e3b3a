use regex::Regex;
use std::collections::VecDeque;
use std::sync::LazyLock;

/// Number of samples a task keeps
pub const MAX_PROGRESS_HISTORY: usize = 30;

/// `Written 12.3 MB (45s @ 1.2 MB/s)` as printed by livestreamer
static LIVESTREAMER_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Written ([\d\.]+ [A-Z]B) \((\d+\w) @ ([\d\.]+ [A-Z]B/s)\)")
        .expect("livestreamer status pattern is valid")
});

/// ffmpeg `-stats` line: `frame= 10 ... size=  1024kB time=00:00:10.00 bitrate=... speed=1.5x`
static FFMPEG_STATS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"size=\s*(\S+)\s+time=\s*(\S+)\s+.*speed=\s*(\S+)")
        .expect("ffmpeg stats pattern is valid")
});

/// One parsed snapshot of a running process's progress
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    /// Amount written so far, e.g. `12.3 MB`
    pub progress: String,
    /// Elapsed time token, e.g. `45s`
    pub elapsed: String,
    /// Rate token, e.g. `1.2 MB/s`
    pub speed: String,
}

impl ProgressSample {
    /// Bytes written, when the progress token carries a size unit
    pub fn bytes_written(&self) -> Option<u64> {
        parse_size(&self.progress).map(|b| b as u64)
    }

    /// Transfer rate in bytes per second, when the speed token is a rate
    pub fn rate_bytes_per_sec(&self) -> Option<f64> {
        parse_size(self.speed.strip_suffix("/s")?)
    }

    /// Elapsed token in seconds: `45s`, `3m`, `1h` or ffmpeg's `00:01:02.50`
    pub fn elapsed_secs(&self) -> Option<f64> {
        let token = self.elapsed.trim();
        let secs = if token.contains(':') {
            token
                .split(':')
                .try_fold(0.0, |acc, part| part.parse::<f64>().ok().map(|v| acc * 60.0 + v))?
        } else {
            let (number, unit) = token.split_at(token.char_indices().last()?.0);
            let value: f64 = number.parse().ok()?;
            match unit {
                "s" => value,
                "m" => value * 60.0,
                "h" => value * 3600.0,
                _ => return None,
            }
        };
        Some(secs.max(0.0))
    }
}

/// Parse `1.5 MB`, `512kB` or `3 KiB` style sizes into bytes
fn parse_size(token: &str) -> Option<f64> {
    let token = token.trim();
    let split = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    let (number, unit) = token.split_at(split);
    let value: f64 = number.parse().ok()?;

    let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 1.0,
        "KB" | "KIB" => 1024.0,
        "MB" | "MIB" => 1024.0 * 1024.0,
        "GB" | "GIB" => 1024.0 * 1024.0 * 1024.0,
        "TB" | "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some(value * multiplier)
}

/// Which tool's diagnostic output a task is reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPattern {
    Livestreamer,
    Ffmpeg,
}

impl ProgressPattern {
    /// Match one diagnostic line. Non-matching lines yield `None`.
    pub fn parse(&self, line: &str) -> Option<ProgressSample> {
        let regex = match self {
            ProgressPattern::Livestreamer => &*LIVESTREAMER_STATUS,
            ProgressPattern::Ffmpeg => &*FFMPEG_STATS,
        };

        let captures = regex.captures(line)?;
        Some(ProgressSample {
            progress: captures[1].to_string(),
            elapsed: captures[2].to_string(),
            speed: captures[3].to_string(),
        })
    }
}

/// Ring buffer of the most recent samples, oldest first
#[derive(Debug, Clone, Default)]
pub struct ProgressHistory {
    samples: VecDeque<ProgressSample>,
}

impl ProgressHistory {
    pub fn push(&mut self, sample: ProgressSample) {
        self.samples.push_back(sample);
        while self.samples.len() > MAX_PROGRESS_HISTORY {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&ProgressSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProgressSample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<ProgressSample> {
        self.samples.iter().cloned().collect()
    }
}
