use super::{LoggingConfig, build_current_log_path};
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// 创建当天日志文件, 压缩历史日志并删除过期日志
pub fn run_log_maintenance(config: &LoggingConfig) -> Result<()> {
    ensure_current_log_file(config)?;
    cleanup_logs(config, Local::now().date_naive())
}

fn ensure_current_log_file(config: &LoggingConfig) -> Result<()> {
    let directory = Path::new(&config.directory);
    fs::create_dir_all(directory)?;
    let today = Local::now().date_naive();
    let current_path = build_current_log_path(directory, &config.file_prefix, today);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&current_path)
        .with_context(|| format!("创建当前日志文件失败, path={}", current_path.display()))?;
    Ok(())
}

fn cleanup_logs(config: &LoggingConfig, today: NaiveDate) -> Result<()> {
    let directory = Path::new(&config.directory);
    if !directory.exists() {
        return Ok(());
    }

    let cutoff = today - ChronoDuration::days(config.retention_days);

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let file_path = entry.path();

        let (date, compressed) = match parse_rotated_log_name(&file_name, &config.file_prefix) {
            Some(value) => value,
            None => continue,
        };

        if date < cutoff {
            fs::remove_file(&file_path)
                .with_context(|| format!("删除过期日志失败, path={}", file_path.display()))?;
            continue;
        }

        if config.compress_history && !compressed && date < today {
            compress_to_gz(&file_path)?;
        }
    }

    Ok(())
}

fn compress_to_gz(path: &Path) -> Result<()> {
    let gz_path = PathBuf::from(format!("{}.gz", path.display()));
    if gz_path.exists() {
        return Ok(());
    }

    let mut input = File::open(path).with_context(|| format!("打开待压缩日志失败, path={}", path.display()))?;
    let output =
        File::create(&gz_path).with_context(|| format!("创建压缩日志失败, path={}", gz_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());

    let mut buf = [0u8; 8 * 1024];
    loop {
        let read = input.read(&mut buf)?;
        if read == 0 {
            break;
        }
        encoder.write_all(&buf[..read])?;
    }

    encoder.finish()?;
    fs::remove_file(path).with_context(|| format!("删除已压缩日志失败, path={}", path.display()))?;
    Ok(())
}

fn parse_rotated_log_name(file_name: &str, prefix: &str) -> Option<(NaiveDate, bool)> {
    let with_dot = file_name.strip_prefix(prefix)?.strip_prefix('.')?;

    if let Some(date_part) = with_dot.strip_suffix(".log") {
        return parse_date(date_part).map(|date| (date, false));
    }
    if let Some(date_part) = with_dot.strip_suffix(".log.gz") {
        return parse_date(date_part).map(|date| (date, true));
    }
    None
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn temp_config(temp_dir: &TempDir, compress_history: bool) -> LoggingConfig {
        LoggingConfig {
            level: "info".to_string(),
            directory: temp_dir.path().to_string_lossy().to_string(),
            file_prefix: "resyn".to_string(),
            retention_days: 7,
            compress_history,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        match NaiveDate::from_ymd_opt(y, m, d) {
            Some(date) => date,
            None => panic!("测试日期初始化失败"),
        }
    }

    #[test]
    fn test_parse_rotated_log_name() {
        let prefix = "resyn";

        let parsed = parse_rotated_log_name("resyn.2026-02-06.log", prefix);
        assert_eq!(parsed, Some((date(2026, 2, 6), false)));

        let parsed = parse_rotated_log_name("resyn.2026-02-06.log.gz", prefix);
        assert_eq!(parsed, Some((date(2026, 2, 6), true)));

        assert!(parse_rotated_log_name("resyn.log", prefix).is_none());
        assert!(parse_rotated_log_name("other.2026-02-06.log", prefix).is_none());
        assert!(parse_rotated_log_name("resyn.2026-2-6.log", prefix).is_none());
    }

    #[test]
    fn test_cleanup_compresses_and_expires() {
        let temp_dir = match TempDir::new() {
            Ok(temp_dir) => temp_dir,
            Err(err) => panic!("创建临时目录失败: {}", err),
        };
        let config = temp_config(&temp_dir, true);
        let dir = temp_dir.path();
        let today = date(2026, 3, 20);

        let recent = build_current_log_path(dir, "resyn", date(2026, 3, 18));
        let expired = build_current_log_path(dir, "resyn", date(2026, 3, 1));
        let current = build_current_log_path(dir, "resyn", today);
        let unrelated = dir.join("notes.txt");
        for path in [&recent, &expired, &current, &unrelated] {
            if let Err(err) = fs::write(path, "第一行日志\n") {
                panic!("写入测试文件失败: {}", err);
            }
        }

        let cleaned = cleanup_logs(&config, today);
        assert!(cleaned.is_ok(), "清理日志失败: {:?}", cleaned.err());

        assert!(!expired.exists(), "过期日志应被删除");
        assert!(!recent.exists(), "历史日志压缩后原文件应被删除");
        assert!(current.exists(), "当天日志不压缩");
        assert!(unrelated.exists(), "非日志文件不受影响");

        let gz_path = PathBuf::from(format!("{}.gz", recent.display()));
        let file = match File::open(&gz_path) {
            Ok(file) => file,
            Err(err) => panic!("打开压缩日志失败: {}", err),
        };
        let mut content = String::new();
        let read = GzDecoder::new(file).read_to_string(&mut content);
        assert!(read.is_ok(), "解压日志失败: {:?}", read.err());
        assert_eq!(content, "第一行日志\n");
    }

    #[test]
    fn test_cleanup_without_compression() {
        let temp_dir = match TempDir::new() {
            Ok(temp_dir) => temp_dir,
            Err(err) => panic!("创建临时目录失败: {}", err),
        };
        let config = temp_config(&temp_dir, false);
        let today = date(2026, 3, 20);
        let recent = build_current_log_path(temp_dir.path(), "resyn", date(2026, 3, 19));
        if let Err(err) = fs::write(&recent, "x") {
            panic!("写入测试文件失败: {}", err);
        }

        let cleaned = cleanup_logs(&config, today);
        assert!(cleaned.is_ok(), "清理日志失败: {:?}", cleaned.err());
        assert!(recent.exists(), "关闭压缩时历史日志保持原样");
    }

    #[test]
    fn test_run_log_maintenance_creates_current_file() {
        let temp_dir = match TempDir::new() {
            Ok(temp_dir) => temp_dir,
            Err(err) => panic!("创建临时目录失败: {}", err),
        };
        let config = temp_config(&temp_dir, true);

        let result = run_log_maintenance(&config);
        assert!(result.is_ok(), "日志整理失败: {:?}", result.err());

        let today = Local::now().date_naive();
        let current_path = build_current_log_path(temp_dir.path(), "resyn", today);
        assert!(current_path.exists(), "当前日志文件不存在");
    }
}
