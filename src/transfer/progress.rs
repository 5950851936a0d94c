use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::config::TransferConfig;
use super::models::{ProgressSnapshot, TransferId};

/// 进度节流：每个间隔最多放行一次
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Instant,
}

impl ProgressThrottle {
    pub fn new(total_size: u64, config: &TransferConfig, started_at: Instant) -> Self {
        Self {
            interval: config.progress_interval(total_size),
            last_emit: started_at,
        }
    }

    pub fn ready(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_emit) < self.interval {
            return false;
        }
        self.last_emit = now;
        true
    }
}

/// 计算进度快照
///
/// `speed` 是本次尝试开始以来的累计平均速度（不是瞬时速度），
/// `attempt_bytes` 只统计本次尝试读到的字节。
pub fn snapshot(loaded: u64, total: u64, attempt_bytes: u64, elapsed: Duration) -> ProgressSnapshot {
    let percentage = if total > 0 {
        ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u32
    } else {
        0
    };

    let secs = elapsed.as_secs_f64();
    let speed = if secs > 0.0 {
        (attempt_bytes as f64 / secs) as u64
    } else {
        0
    };

    let time_remaining = (total > 0 && speed > 0)
        .then(|| Duration::try_from_secs_f64(total.saturating_sub(loaded) as f64 / speed as f64).ok())
        .flatten();

    ProgressSnapshot {
        loaded,
        total,
        percentage,
        speed,
        time_remaining,
    }
}

/// 终端多进度条显示
pub struct ConsoleProgress {
    multi_pb: MultiProgress,
    bars: Mutex<HashMap<TransferId, ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            multi_pb: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {msg:20} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({binary_bytes_per_sec}, {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
    }

    pub fn add(&self, id: &TransferId, name: &str) {
        let pb = self.multi_pb.add(ProgressBar::new(0));
        pb.set_style(Self::style());
        pb.set_message(name.to_string());
        self.bars.lock().insert(id.clone(), pb);
    }

    pub fn update(&self, id: &TransferId, progress: &ProgressSnapshot) {
        if let Some(pb) = self.bars.lock().get(id) {
            if progress.total > 0 {
                pb.set_length(progress.total);
            }
            pb.set_position(progress.loaded);
        }
    }

    pub fn finish(&self, id: &TransferId, message: &str) {
        if let Some(pb) = self.bars.lock().remove(id) {
            pb.finish_with_message(message.to_string());
        }
    }

    pub fn abandon(&self, id: &TransferId, message: &str) {
        if let Some(pb) = self.bars.lock().remove(id) {
            pb.abandon_with_message(message.to_string());
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_interval_policy() {
        let config = TransferConfig::default();
        assert_eq!(config.progress_interval(200 * MB), Duration::from_millis(500));
        assert_eq!(config.progress_interval(10 * MB), Duration::from_millis(1000));
        // 恰好 100MB 不算大文件
        assert_eq!(config.progress_interval(100 * MB), Duration::from_millis(1000));
        assert_eq!(config.progress_interval(0), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_large_transfer() {
        let config = TransferConfig::default();
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(200 * MB, &config, start);

        let emitted: Vec<u64> = (1..=30)
            .map(|i| i * 100)
            .filter(|ms| throttle.ready(start + Duration::from_millis(*ms)))
            .collect();

        assert_eq!(emitted, vec![500, 1000, 1500, 2000, 2500, 3000]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_small_transfer() {
        let config = TransferConfig::default();
        let start = Instant::now();
        let mut throttle = ProgressThrottle::new(10 * MB, &config, start);

        let emitted: Vec<u64> = (1..=30)
            .map(|i| i * 100)
            .filter(|ms| throttle.ready(start + Duration::from_millis(*ms)))
            .collect();

        assert_eq!(emitted, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_snapshot_known_total() {
        let progress = snapshot(250, 1000, 250, Duration::from_secs(5));
        assert_eq!(progress.percentage, 25);
        assert_eq!(progress.speed, 50);
        assert_eq!(progress.time_remaining, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_snapshot_unknown_total() {
        let progress = snapshot(4096, 0, 4096, Duration::from_secs(2));
        assert_eq!(progress.percentage, 0);
        assert_eq!(progress.speed, 2048);
        assert_eq!(progress.time_remaining, None);
    }

    #[test]
    fn test_snapshot_resumed_attempt_speed() {
        // 续传时只按本次读到的字节计算速度
        let progress = snapshot(600, 1000, 100, Duration::from_secs(1));
        assert_eq!(progress.percentage, 60);
        assert_eq!(progress.speed, 100);
        assert_eq!(progress.time_remaining, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_snapshot_huge_remaining_time() {
        // 剩余时间超出 Duration 表示范围时不给出估计
        let progress = snapshot(1, u64::MAX, 1, Duration::from_secs(1));
        assert_eq!(progress.speed, 1);
        assert_eq!(progress.time_remaining, None);
    }

    #[test]
    fn test_snapshot_no_elapsed_time() {
        let progress = snapshot(10, 100, 10, Duration::ZERO);
        assert_eq!(progress.speed, 0);
        assert_eq!(progress.time_remaining, None);
    }
}
