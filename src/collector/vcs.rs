use std::{
    collections::BTreeSet,
    future::Future,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::TrackerError;

/// Longest time a single history read may take before the source counts as unavailable.
pub const DEFAULT_VCS_TIMEOUT: Duration = Duration::from_secs(30);

const RECORD_SEPARATOR: char = '\u{1e}';
const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileChangeStats {
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
}

impl std::ops::AddAssign for FileChangeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.files_changed += rhs.files_changed;
        self.insertions += rhs.insertions;
        self.deletions += rhs.deletions;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitRecord {
    pub moment: DateTime<Utc>,
    pub author_email: Arc<str>,
    pub stats: FileChangeStats,
}

/// Which commits to read. The author filter matches the author email, `max_count` keeps the
/// newest commits.
#[derive(Debug, Clone)]
pub struct CommitQuery {
    pub repo: PathBuf,
    pub author: Option<String>,
    pub max_count: Option<usize>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl CommitQuery {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            author: None,
            max_count: None,
            since: None,
            until: None,
        }
    }

    pub fn author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn max_count(mut self, max_count: Option<usize>) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Self {
        self.since = Some(since);
        self.until = until;
        self
    }

    fn source_name(&self) -> String {
        format!("git {}", self.repo.display())
    }
}

/// A version-control history. Reads never report an unreadable repository as an empty one.
pub trait VcsSource {
    fn commits(
        &self,
        query: &CommitQuery,
    ) -> impl Future<Output = Result<Vec<CommitRecord>, TrackerError>> + Send;
}

/// Reads history by running the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    timeout: Duration,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_VCS_TIMEOUT,
        }
    }
}

impl GitCli {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(query: &CommitQuery) -> Command {
        let mut command = Command::new("git");
        command
            .arg("log")
            .arg(format!(
                "--format={RECORD_SEPARATOR}%ct{FIELD_SEPARATOR}%ae"
            ))
            .arg("--numstat")
            .current_dir(&query.repo)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(author) = &query.author {
            command.arg(format!("--author={author}"));
        }
        if let Some(max_count) = query.max_count {
            command.arg(format!("--max-count={max_count}"));
        }
        if let Some(since) = query.since {
            command.arg(format!("--since={}", since.to_rfc3339()));
        }
        if let Some(until) = query.until {
            command.arg(format!("--until={}", until.to_rfc3339()));
        }
        command
    }
}

impl VcsSource for GitCli {
    #[instrument(skip(self))]
    async fn commits(&self, query: &CommitQuery) -> Result<Vec<CommitRecord>, TrackerError> {
        let unavailable =
            |reason: String| TrackerError::source_unavailable(query.source_name(), reason);

        if !is_repository(&query.repo) {
            return Err(unavailable("not a git repository".into()));
        }

        let output = tokio::time::timeout(self.timeout, Self::command(query).output())
            .await
            .map_err(|_| unavailable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| unavailable(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("does not have any commits") {
                debug!("Repository has no commits yet");
                return Ok(vec![]);
            }
            return Err(unavailable(stderr.trim().to_string()));
        }

        let commits = parse_log(&String::from_utf8_lossy(&output.stdout));
        debug!("Parsed {} commits", commits.len());
        Ok(commits)
    }
}

fn is_repository(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Parses `git log` output produced by [GitCli]. Malformed records are skipped.
fn parse_log(output: &str) -> Vec<CommitRecord> {
    output
        .split(RECORD_SEPARATOR)
        .filter(|chunk| !chunk.trim().is_empty())
        .filter_map(|chunk| {
            let mut lines = chunk.lines();
            let header = lines.next()?;
            let Some((timestamp, email)) = header.split_once(FIELD_SEPARATOR) else {
                warn!("Skipping malformed commit header {header:?}");
                return None;
            };
            let Some(moment) = timestamp
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|s| DateTime::from_timestamp(s, 0))
            else {
                warn!("Skipping commit with bad timestamp {timestamp:?}");
                return None;
            };
            let stats = lines.filter_map(parse_numstat).fold(
                FileChangeStats::default(),
                |mut acc, v| {
                    acc += v;
                    acc
                },
            );
            Some(CommitRecord {
                moment,
                author_email: email.trim().into(),
                stats,
            })
        })
        .collect()
}

/// One `added<TAB>deleted<TAB>path` line. Binary files report `-` for both counts.
fn parse_numstat(line: &str) -> Option<FileChangeStats> {
    let mut parts = line.splitn(3, '\t');
    let (added, deleted, _path) = (parts.next()?, parts.next()?, parts.next()?);
    Some(FileChangeStats {
        files_changed: 1,
        insertions: added.parse().unwrap_or(0),
        deletions: deleted.parse().unwrap_or(0),
    })
}

/// Years with at least one commit, in the local calendar of `tz`.
pub async fn available_years<V: VcsSource, Tz: TimeZone>(
    vcs: &V,
    repo: &Path,
    tz: &Tz,
) -> Result<BTreeSet<i32>, TrackerError> {
    Ok(vcs
        .commits(&CommitQuery::new(repo))
        .await?
        .into_iter()
        .map(|c| c.moment.with_timezone(tz).year())
        .collect())
}

pub fn total_changes(commits: &[CommitRecord]) -> FileChangeStats {
    commits.iter().fold(FileChangeStats::default(), |mut acc, c| {
        acc += c.stats;
        acc
    })
}
