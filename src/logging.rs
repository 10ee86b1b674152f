use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// ログファイル名の接頭辞
const LOG_FILE_PREFIX: &str = "telemetry";

/// ログ設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error) または EnvFilter 書式
    pub level: String,
    /// 出力形式
    pub format: LogFormat,
    /// コンソール(stderr)出力有効
    pub console_enabled: bool,
    /// ファイル出力有効
    pub file_enabled: bool,
    /// ログディレクトリ
    pub log_dir: PathBuf,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// ログ保持ポリシー
    pub retention: LogRetention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 人間向けテキスト
    Text,
    /// 1行1イベントのJSON
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// 日次ローテーション
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "policy", content = "limit")]
pub enum LogRetention {
    /// アプリケーションは削除しない（OS/ログ管理ツール任せ）
    External,
    /// 指定日数より古いファイルを削除
    Days(u32),
    /// 新しい順に指定数のファイルのみ保持
    Count(u32),
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            console_enabled: true,
            file_enabled: false,
            log_dir: PathBuf::from("logs"),
            rotation: LogRotation::Daily,
            retention: LogRetention::External,
        }
    }
}

impl LogConfig {
    /// ログレベルを設定
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// 出力形式を設定
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// ローテーション設定
    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// 保持ポリシー設定
    pub fn with_retention(mut self, retention: LogRetention) -> Self {
        self.retention = retention;
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    /// ファイル出力制御
    pub fn with_file(mut self, enabled: bool) -> Self {
        self.file_enabled = enabled;
        self
    }

    /// EnvFilter を構築（不正な書式は info にフォールバック）
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ファイル出力のバックグラウンドライタを保持する
///
/// ドロップするとバッファ済みのログがフラッシュされる。
#[must_use = "dropping the guard stops the file writer"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_current_span(true)
            .boxed(),
    }
}

/// ログシステムを初期化
///
/// グローバルサブスクライバが既に設定済みの場合はエラーを返す。
pub fn init_logging(config: &LogConfig) -> Result<LogGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut file_guard = None;

    if config.console_enabled {
        layers.push(fmt_layer(config.format, std::io::stderr, true));
    }

    if config.file_enabled {
        ensure_log_dir(&config.log_dir)?;

        let file_name = format!("{}.log", LOG_FILE_PREFIX);
        let file_appender = match config.rotation {
            LogRotation::Daily => rolling::daily(&config.log_dir, &file_name),
            LogRotation::Hourly => rolling::hourly(&config.log_dir, &file_name),
            LogRotation::Never => rolling::never(&config.log_dir, &file_name),
        };
        let (writer, guard) = non_blocking(file_appender);
        layers.push(fmt_layer(config.format, writer, false));
        file_guard = Some(guard);
    }

    if layers.is_empty() {
        // 最低限の警告出力
        let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);
        layers.push(fmt_layer(config.format, stderr, true));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter())
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        level = %config.level,
        console = config.console_enabled,
        file = config.file_enabled,
        log_dir = %config.log_dir.display(),
        "ログシステム初期化完了"
    );

    if config.file_enabled {
        if let Err(e) = apply_retention_policy(config) {
            tracing::warn!("ログ保持ポリシー適用に失敗: {}", e);
        }
    }

    Ok(LogGuard { _file: file_guard })
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }
    Ok(())
}

/// ログ保持ポリシーを適用し、削除したファイル数を返す
fn apply_retention_policy(config: &LogConfig) -> Result<usize> {
    match config.retention {
        LogRetention::External => Ok(0),
        LogRetention::Days(days) => {
            let max_age = std::time::Duration::from_secs(u64::from(days) * 24 * 60 * 60);
            let cutoff = std::time::SystemTime::now()
                .checked_sub(max_age)
                .unwrap_or(std::time::UNIX_EPOCH);
            let files = list_log_files(&config.log_dir)?;
            Ok(remove_files(files.into_iter().filter(|(_, modified)| *modified < cutoff)))
        }
        LogRetention::Count(max_count) => {
            let mut files = list_log_files(&config.log_dir)?;
            // 更新日時でソート（新しい順）
            files.sort_by(|a, b| b.1.cmp(&a.1));
            Ok(remove_files(files.into_iter().skip(max_count as usize)))
        }
    }
}

fn list_log_files(log_dir: &Path) -> Result<Vec<(PathBuf, std::time::SystemTime)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_log_file(&path) {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            files.push((path, modified));
        }
    }
    Ok(files)
}

fn remove_files(files: impl Iterator<Item = (PathBuf, std::time::SystemTime)>) -> usize {
    let mut removed_count = 0;
    for (path, _) in files {
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!("ログファイル削除失敗: {} - {}", path.display(), e);
        } else {
            removed_count += 1;
            tracing::debug!("古いログファイル削除: {}", path.display());
        }
    }
    if removed_count > 0 {
        tracing::info!("古いログファイル{}個削除", removed_count);
    }
    removed_count
}

/// ログファイルかどうかを判定
fn is_log_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX) && name.contains(".log"))
}
