//! Writing selected icons to disk as SVG files

use crate::error::{IconMcpError, Result};
use crate::i18n::Translator;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory used when the caller gives no save path
pub const DEFAULT_SAVE_PATH: &str = "./saved-icons";

/// Outcome of one save request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    /// File names written
    pub saved: Vec<String>,
    /// Names of icons that could not be written
    pub failed: Vec<String>,
    /// Absolute target directory
    pub path: String,
    pub message: String,
}

/// Persists icon payloads as `<name>.svg`
pub struct IconSaver {
    translator: Translator,
}

impl IconSaver {
    pub fn new(translator: Translator) -> Self {
        Self { translator }
    }

    /// Save every icon in `icons` under `save_path`.
    ///
    /// Each item needs a `name` and either `svg` or `show_svg` markup. Items
    /// that cannot be written are reported in `failed`; the batch carries on.
    pub async fn save_icons(&self, icons: &[Value], save_path: impl AsRef<Path>) -> Result<SaveReport> {
        if icons.is_empty() {
            return Err(IconMcpError::Validation(self.translator.t("download.noIcons")));
        }

        let dir = absolute(save_path.as_ref())?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| IconMcpError::StorageIo(format!("{}: {}", dir.display(), e)))?;

        let mut saved = Vec::new();
        let mut failed = Vec::new();

        for icon in icons {
            let name = icon
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.trim().is_empty())
                .unwrap_or("unknown")
                .to_string();

            let svg = icon
                .get("svg")
                .and_then(Value::as_str)
                .or_else(|| icon.get("show_svg").and_then(Value::as_str))
                .filter(|s| !s.is_empty());

            let Some(svg) = svg else {
                warn!("{}", self.translator.translate("download.saveFailed", &[("name", &name)]));
                failed.push(name);
                continue;
            };

            let file_name = format!("{}.svg", file_stem(&name));
            match tokio::fs::write(dir.join(&file_name), svg).await {
                Ok(()) => {
                    info!(
                        "{}",
                        self.translator
                            .translate("download.saved", &[("fileName", &file_name)])
                    );
                    saved.push(file_name);
                }
                Err(e) => {
                    warn!(
                        "{} ({})",
                        self.translator.translate("download.saveFailed", &[("name", &name)]),
                        e
                    );
                    failed.push(name);
                }
            }
        }

        let path = dir.display().to_string();
        let message = self.translator.translate(
            "download.saveCompleted",
            &[("count", &saved.len()), ("path", &path)],
        );

        Ok(SaveReport {
            saved,
            failed,
            path,
            message,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Icon name made safe to use as a file name
fn file_stem(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Locale;
    use serde_json::json;
    use tempfile::TempDir;

    fn saver() -> IconSaver {
        IconSaver::new(Translator::new(Locale::En))
    }

    #[tokio::test]
    async fn test_save_writes_svg_files() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nested").join("icons");

        let report = saver()
            .save_icons(
                &[
                    json!({"name": "home", "show_svg": "<svg>home</svg>"}),
                    json!({"name": "user", "svg": "<svg>user</svg>"}),
                ],
                &target,
            )
            .await
            .unwrap();

        assert_eq!(report.saved, vec!["home.svg", "user.svg"]);
        assert!(report.failed.is_empty());
        assert_eq!(
            std::fs::read_to_string(target.join("home.svg")).unwrap(),
            "<svg>home</svg>"
        );
        assert!(target.join("user.svg").exists());
        assert!(Path::new(&report.path).is_absolute());
    }

    #[tokio::test]
    async fn test_missing_svg_is_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();

        let report = saver()
            .save_icons(
                &[json!({"name": "empty"}), json!({"name": "ok", "svg": "<svg/>"})],
                tmp.path(),
            )
            .await
            .unwrap();

        assert_eq!(report.saved, vec!["ok.svg"]);
        assert_eq!(report.failed, vec!["empty"]);
    }

    #[tokio::test]
    async fn test_empty_list_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = saver().save_icons(&[], tmp.path()).await;
        assert!(matches!(result, Err(IconMcpError::Validation(_))));
    }

    #[test]
    fn test_file_stem_replaces_separators() {
        assert_eq!(file_stem("arrow/left"), "arrow_left");
        assert_eq!(file_stem("a\\b:c"), "a_b_c");
        assert_eq!(file_stem("  "), "unknown");
        assert_eq!(file_stem(".."), "unknown");
        assert_eq!(file_stem("箭头"), "箭头");
    }
}
