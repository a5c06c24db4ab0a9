//! テンプレート引数
//!
//! タグ・ラベル・ビルド引数の `{key}` を git 情報や日付で展開します。

use crate::error::{CoreError, Result};
use chrono::{Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// 展開に使う引数 (key -> value)
pub type TemplateArgs = BTreeMap<String, String>;

/// 短縮コミットIDの長さ
const SHORT_COMMIT_LEN: usize = 7;

/// テンプレート引数の生成器
///
/// 値を得られなかった生成器は何も返しません。
pub trait ArgGenerator: Send + Sync {
    fn generate(&self, workdir: &Path) -> Vec<(String, String)>;
}

/// 現在日時を書式化する生成器
pub struct DateGenerator {
    key: String,
    format: String,
    fixed: Option<NaiveDateTime>,
}

impl DateGenerator {
    /// `date` = `%Y%m%d`
    pub fn new() -> Self {
        Self::with_format("date", "%Y%m%d")
    }

    pub fn with_format(key: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            format: format.into(),
            fixed: None,
        }
    }

    /// 現在時刻の代わりに固定の日時を使う
    pub fn at(mut self, datetime: NaiveDateTime) -> Self {
        self.fixed = Some(datetime);
        self
    }
}

impl Default for DateGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgGenerator for DateGenerator {
    fn generate(&self, _workdir: &Path) -> Vec<(String, String)> {
        let now = self.fixed.unwrap_or_else(|| Local::now().naive_local());
        let mut value = String::new();
        if write!(value, "{}", now.format(&self.format)).is_err() {
            warn!(key = %self.key, format = %self.format, "Invalid date format");
            return Vec::new();
        }
        vec![(self.key.clone(), value)]
    }
}

/// シェルコマンドの出力を値にする生成器
pub struct CommandGenerator {
    key: String,
    command: String,
}

impl CommandGenerator {
    pub fn new(key: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            command: command.into(),
        }
    }

    pub fn git_commit_msg() -> Self {
        Self::new("commitmsg", "git log --oneline | head -1")
    }

    pub fn git_branch() -> Self {
        Self::new("git_branch", "git rev-parse --abbrev-ref HEAD")
    }

    pub fn git_tag() -> Self {
        Self::new("git_tag", "git tag --contains HEAD | head -1")
    }

    pub fn git_describe() -> Self {
        Self::new("git_describe", "git describe --tags")
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl ArgGenerator for CommandGenerator {
    fn generate(&self, workdir: &Path) -> Vec<(String, String)> {
        run_command(&self.command, workdir)
            .map(|value| vec![(self.key.clone(), value)])
            .unwrap_or_default()
    }
}

/// `fcommitid` (フル) と `scommitid` (7桁) を生成
pub struct GitCommitGenerator;

impl ArgGenerator for GitCommitGenerator {
    fn generate(&self, workdir: &Path) -> Vec<(String, String)> {
        run_command("git rev-parse HEAD", workdir)
            .map(|commit| commit_pairs(&commit))
            .unwrap_or_default()
    }
}

/// コミットIDから `fcommitid` / `scommitid` の組を作る
pub fn commit_pairs(commit: &str) -> Vec<(String, String)> {
    let commit = commit.trim();
    let short: String = commit.chars().take(SHORT_COMMIT_LEN).collect();
    vec![
        ("fcommitid".to_string(), commit.to_string()),
        ("scommitid".to_string(), short),
    ]
}

/// コマンドを `sh -c` で実行し、空でない出力を返す
fn run_command(command: &str, workdir: &Path) -> Option<String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if value.is_empty() {
                debug!(command, "Command produced no output");
                None
            } else {
                Some(value)
            }
        }
        Ok(output) => {
            debug!(command, status = %output.status, "Command failed");
            None
        }
        Err(e) => {
            debug!(command, error = %e, "Command could not be started");
            None
        }
    }
}

fn git_generators() -> Vec<Box<dyn ArgGenerator>> {
    vec![
        Box::new(GitCommitGenerator),
        Box::new(CommandGenerator::git_commit_msg()),
        Box::new(CommandGenerator::git_branch()),
        Box::new(CommandGenerator::git_tag()),
        Box::new(CommandGenerator::git_describe()),
    ]
}

/// タグ用の生成器 (git 情報 + 日付 + 追加の生成器)
pub fn tag_generators(extra: Vec<Box<dyn ArgGenerator>>) -> Vec<Box<dyn ArgGenerator>> {
    let mut generators = git_generators();
    generators.push(Box::new(DateGenerator::new()));
    generators.extend(extra);
    generators
}

/// ラベル用の生成器 (git 情報 + 追加の生成器、日付なし)
pub fn label_generators(extra: Vec<Box<dyn ArgGenerator>>) -> Vec<Box<dyn ArgGenerator>> {
    let mut generators = git_generators();
    generators.extend(extra);
    generators
}

/// 生成器を順に実行して引数を集める（後勝ち）
pub fn collect_args(generators: &[Box<dyn ArgGenerator>], workdir: &Path) -> TemplateArgs {
    let mut args = TemplateArgs::new();
    for generator in generators {
        args.extend(generator.generate(workdir));
    }
    debug!(count = args.len(), "Collected template arguments");
    args
}

/// テンプレート文字列内の `{key}` を展開
///
/// `{{` と `}}` はそれぞれ `{` と `}` になります。
pub fn expand(template: &str, args: &TemplateArgs) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                result.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                result.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => key.push(ch),
                        None => return Err(CoreError::InvalidTemplate(template.to_string())),
                    }
                }
                let key = key.trim();
                let value = args
                    .get(key)
                    .ok_or_else(|| CoreError::MissingTemplateArg(key.to_string()))?;
                result.push_str(value);
            }
            '}' => return Err(CoreError::InvalidTemplate(template.to_string())),
            _ => result.push(c),
        }
    }

    Ok(result)
}
