//! 文件上下文注入
//!
//! 用户消息入库前扫描其中的路径引用（如 `src/main.rs`、`./notes.txt`），
//! 把存在的文件内容（有长度上限）追加到消息末尾；用户原文一字不改。

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::ContextSection;

fn path_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // 带扩展名的相对/绝对路径：a.rs、./a.rs、src/a.rs、/etc/hosts.conf
        Regex::new(r"(?:\.{1,2}/|/)?(?:[\w.-]+/)*[\w-][\w.-]*\.[A-Za-z0-9]{1,10}\b")
            .expect("static regex")
    })
}

/// 文件注入器：workspace_root 下解析相对路径，最多 max_files 个，每个最多 max_file_bytes 字节
#[derive(Debug, Clone)]
pub struct FileContextInjector {
    enabled: bool,
    workspace_root: PathBuf,
    max_file_bytes: usize,
    max_files: usize,
}

impl FileContextInjector {
    pub fn new(workspace_root: impl Into<PathBuf>, max_file_bytes: usize, max_files: usize) -> Self {
        Self {
            enabled: true,
            workspace_root: workspace_root.into(),
            max_file_bytes,
            max_files,
        }
    }

    pub fn from_config(cfg: &ContextSection) -> Self {
        let root = cfg
            .workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            enabled: cfg.inject_files,
            ..Self::new(root, cfg.max_file_bytes, cfg.max_files)
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(".", 0, 0)
        }
    }

    /// 返回注入后的消息文本；未找到任何文件时原样返回
    pub fn inject(&self, input: &str) -> String {
        if !self.enabled || self.max_files == 0 {
            return input.to_string();
        }
        let mut seen: Vec<PathBuf> = Vec::new();
        let mut blocks = Vec::new();
        for m in path_pattern().find_iter(input) {
            if blocks.len() >= self.max_files {
                break;
            }
            let raw = m.as_str();
            let Some(path) = self.resolve(raw) else {
                continue;
            };
            if seen.contains(&path) {
                continue;
            }
            match self.read_bounded(&path) {
                Ok(block) => {
                    tracing::debug!(path = %path.display(), "injecting file context");
                    blocks.push(format!("--- File: {} ---\n```\n{}\n```", raw, block));
                    seen.push(path);
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skip file context");
                }
            }
        }
        if blocks.is_empty() {
            return input.to_string();
        }
        format!("{}\n\n{}", input, blocks.join("\n\n"))
    }

    fn resolve(&self, raw: &str) -> Option<PathBuf> {
        let p = Path::new(raw);
        let full = if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace_root.join(p)
        };
        full.is_file().then_some(full)
    }

    /// 只读前 max_file_bytes 字节；总大小取自元数据，不把整个文件读进内存
    fn read_bounded(&self, path: &Path) -> std::io::Result<String> {
        let file = File::open(path)?;
        let total = file.metadata()?.len();
        let mut bytes = Vec::with_capacity(self.max_file_bytes.min(total as usize));
        file.take(self.max_file_bytes as u64).read_to_end(&mut bytes)?;
        if total <= self.max_file_bytes as u64 {
            return Ok(String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(format!(
            "{}\n... [truncated, {} of {} bytes shown]",
            String::from_utf8_lossy(&bytes),
            bytes.len(),
            total
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injects_existing_file_and_keeps_wording() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello from file").unwrap();
        let injector = FileContextInjector::new(dir.path(), 1024, 3);

        let input = "please summarize notes.txt for me";
        let out = injector.inject(input);
        assert!(out.starts_with(input));
        assert!(out.contains("--- File: notes.txt ---"));
        assert!(out.contains("hello from file"));
    }

    #[test]
    fn test_missing_file_leaves_input_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let injector = FileContextInjector::new(dir.path(), 1024, 3);
        let input = "look at missing.rs please";
        assert_eq!(injector.inject(input), input);
    }

    #[test]
    fn test_large_file_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/big.rs"), "x".repeat(5000)).unwrap();
        let injector = FileContextInjector::new(dir.path(), 100, 3);

        let out = injector.inject("check src/big.rs");
        assert!(out.contains("[truncated, 100 of 5000 bytes shown]"));
        assert!(out.len() < 400);
    }

    #[test]
    fn test_huge_file_reads_only_the_excerpt() {
        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::create(dir.path().join("huge.log")).unwrap();
        file.set_len(1 << 30).unwrap();
        drop(file);
        let injector = FileContextInjector::new(dir.path(), 100, 3);

        let out = injector.inject("what is in huge.log");
        assert!(out.contains("[truncated, 100 of 1073741824 bytes shown]"));
        assert!(out.len() < 400);
    }

    #[test]
    fn test_max_files_and_dedup() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        let injector = FileContextInjector::new(dir.path(), 1024, 2);
        let out = injector.inject("a.txt a.txt b.txt c.txt");
        assert_eq!(out.matches("--- File:").count(), 2);
        assert!(!out.contains("--- File: c.txt ---"));
    }

    #[test]
    fn test_disabled_injector_is_noop() {
        let injector = FileContextInjector::disabled();
        assert_eq!(injector.inject("Cargo.toml"), "Cargo.toml");
    }
}
