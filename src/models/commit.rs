use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sentinel id carried by the working-tree pseudo-commit.
pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// Returns true when `value` is a full 40-character hexadecimal object id.
pub fn is_commit_id(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn signature_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.*)<(.*)>$").expect("signature pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    /// Splits a `Name<email>` line as produced by `%cn<%ce>` / `%an<%ae>`.
    /// Lines without the angle-bracket pair keep the whole text as the name.
    fn parse(line: &str) -> Self {
        match signature_pattern().captures(line.trim()) {
            Some(caps) => GitSignature {
                name: caps[1].trim().to_string(),
                email: caps[2].trim().to_string(),
            },
            None => GitSignature {
                name: line.trim().to_string(),
                email: String::new(),
            },
        }
    }
}

/// One parsed revision from the history stream.
///
/// Instances are produced either by [`CommitInfo::parse`] from a raw log
/// record or by [`CommitInfo::new_wip`] for the working-tree pseudo-commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub parents: Vec<String>,
    pub committer: GitSignature,
    pub author: GitSignature,
    pub date: DateTime<Utc>,
    pub summary: String,
    pub body: String,
    /// 1-based position assigned at parse time; 0 for the pseudo-commit.
    pub order: usize,
    /// Set when the log marker flags a boundary commit.
    pub boundary: bool,
}

impl CommitInfo {
    /// Decodes one NUL-separated record of the fixed log format
    /// `%m%HX%P%n%cn<%ce>%n%an<%ae>%n%at%n%s%n%b`, optionally preceded by the
    /// `log size N` line that `--log-size` inserts.
    ///
    /// Returns `None` for malformed records: short header, non-hex id or
    /// parent, missing structural lines, or a non-numeric timestamp. Callers
    /// treat the first `None` in a batch as the end of usable output.
    pub fn parse(record: &str, order: usize) -> Option<Self> {
        let mut lines = record.lines();

        let mut header = lines.next()?;
        if header.starts_with("log size") {
            header = lines.next()?;
        }

        let bytes = header.as_bytes();
        if bytes.len() < 42 || bytes[41] != b'X' {
            return None;
        }

        let boundary = bytes[0] == b'-';
        let id = std::str::from_utf8(&bytes[1..41]).ok()?;
        if !is_commit_id(id) {
            return None;
        }

        let parent_field = std::str::from_utf8(&bytes[42..]).ok()?;
        let mut parents = Vec::new();
        for parent in parent_field.split_whitespace() {
            if !is_commit_id(parent) {
                return None;
            }
            parents.push(parent.to_string());
        }

        let committer = GitSignature::parse(lines.next()?);
        let author = GitSignature::parse(lines.next()?);
        let seconds: i64 = lines.next()?.trim().parse().ok()?;
        let summary = lines.next()?.to_string();
        let body = lines.collect::<Vec<_>>().join("\n");

        Some(CommitInfo {
            id: id.to_string(),
            parents,
            committer,
            author,
            date: DateTime::from_timestamp(seconds, 0).unwrap_or(DateTime::UNIX_EPOCH),
            summary,
            body,
            order,
            boundary,
        })
    }

    /// Builds the working-tree pseudo-commit. Its single parent is HEAD, or
    /// nothing in an unborn repository.
    pub fn new_wip(parent: Option<String>) -> Self {
        CommitInfo {
            id: ZERO_SHA.to_string(),
            parents: parent.into_iter().collect(),
            committer: GitSignature {
                name: String::new(),
                email: String::new(),
            },
            author: GitSignature {
                name: String::new(),
                email: String::new(),
            },
            date: Utc::now(),
            summary: "Local changes".to_string(),
            body: String::new(),
            order: 0,
            boundary: false,
        }
    }

    pub fn is_wip(&self) -> bool {
        self.id == ZERO_SHA
    }

    /// Author timestamp as seconds since the epoch.
    pub fn timestamp(&self) -> i64 {
        self.date.timestamp()
    }

    pub fn short_id(&self) -> &str {
        &self.id[..7]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    fn sha(fill: char) -> String {
        std::iter::repeat(fill).take(40).collect()
    }

    fn sample_record() -> String {
        format!(
            ">{}X{} {}\nCommitter One<committer@example.com>\nAuthor One<author@example.com>\n1672531200\nMerge topic into main\nFirst body line\nSecond body line",
            sha('a'),
            sha('b'),
            sha('c'),
        )
    }

    #[test]
    fn parses_merge_record() {
        let commit = CommitInfo::parse(&sample_record(), 3).expect("record is well formed");

        assert_eq!(commit.id, sha('a'));
        assert_eq!(commit.parents, vec![sha('b'), sha('c')]);
        assert_eq!(commit.committer.name, "Committer One");
        assert_eq!(commit.committer.email, "committer@example.com");
        assert_eq!(commit.author.name, "Author One");
        assert_eq!(commit.author.email, "author@example.com");
        assert_eq!(commit.timestamp(), 1672531200);
        assert_eq!(commit.summary, "Merge topic into main");
        assert_eq!(commit.body, "First body line\nSecond body line");
        assert_eq!(commit.order, 3);
        assert!(!commit.boundary);
        assert!(!commit.is_wip());
    }

    #[test]
    fn parses_root_commit_without_parents() {
        let record = format!(
            ">{}X\nC<c@example.com>\nA<a@example.com>\n0\nInitial import\n",
            sha('d'),
        );
        let commit = CommitInfo::parse(&record, 1).expect("record is well formed");

        assert!(commit.parents.is_empty());
        assert_eq!(commit.summary, "Initial import");
        assert_eq!(commit.body, "");
    }

    #[test]
    fn skips_log_size_line() {
        let record = format!("log size 187\n{}", sample_record());
        let commit = CommitInfo::parse(&record, 1).expect("record is well formed");
        assert_eq!(commit.id, sha('a'));
    }

    #[test]
    fn flags_boundary_marker() {
        let record = format!(
            "-{}X\nC<c@example.com>\nA<a@example.com>\n10\nEdge of range\n",
            sha('e'),
        );
        let commit = CommitInfo::parse(&record, 1).expect("record is well formed");
        assert!(commit.boundary);
    }

    #[test]
    fn signature_without_brackets_keeps_name() {
        let record = format!(
            ">{}X\nJust A Name\nOther Name\n5\nSubject\n",
            sha('f'),
        );
        let commit = CommitInfo::parse(&record, 1).expect("record is well formed");
        assert_eq!(commit.committer.name, "Just A Name");
        assert_eq!(commit.committer.email, "");
    }

    #[test_case("" ; "empty record")]
    #[test_case("garbage" ; "unstructured text")]
    #[test_case(">tooshortX" ; "short header")]
    #[test_case(">zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzX\nC<c@x>\nA<a@x>\n1\ns\n" ; "non hex id")]
    #[test_case(">aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaX notasha\nC<c@x>\nA<a@x>\n1\ns\n" ; "bad parent")]
    #[test_case(">aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaX\nC<c@x>\nA<a@x>" ; "missing timestamp and subject")]
    #[test_case(">aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaX\nC<c@x>\nA<a@x>\nnot-a-number\ns\n" ; "non numeric timestamp")]
    fn rejects_malformed_records(record: &str) {
        assert_eq!(CommitInfo::parse(record, 1), None);
    }

    #[test]
    fn wip_commit_carries_head_parent() {
        let head = sha('1');
        let wip = CommitInfo::new_wip(Some(head.clone()));

        assert!(wip.is_wip());
        assert_eq!(wip.parents, vec![head]);
        assert_eq!(wip.summary, "Local changes");
        assert_eq!(wip.order, 0);
    }

    #[test]
    fn wip_commit_in_unborn_repository_has_no_parent() {
        let wip = CommitInfo::new_wip(None);
        assert!(wip.parents.is_empty());
    }

    #[test]
    fn serializes_to_json_and_back() {
        let commit = CommitInfo::parse(&sample_record(), 2).expect("record is well formed");
        let json = serde_json::to_string(&commit).expect("commit serializes");
        let restored: CommitInfo = serde_json::from_str(&json).expect("commit deserializes");
        assert_eq!(restored, commit);
    }

    proptest! {
        #[test]
        fn parse_never_panics(record in "\\PC{0,200}") {
            let _ = CommitInfo::parse(&record, 1);
        }

        #[test]
        fn well_formed_records_round_trip(
            id in "[0-9a-f]{40}",
            parent in "[0-9a-f]{40}",
            name in "[A-Za-z][A-Za-z ]{0,19}",
            email in "[a-z]{1,10}@[a-z]{1,10}\\.com",
            seconds in 0i64..4_000_000_000i64,
            subject in "[A-Za-z0-9 ]{1,40}",
        ) {
            let record = format!(
                ">{id}X{parent}\n{name}<{email}>\n{name}<{email}>\n{seconds}\n{subject}\nbody",
            );
            let commit = CommitInfo::parse(&record, 9).expect("record is well formed");

            prop_assert_eq!(&commit.id, &id);
            prop_assert_eq!(&commit.parents, &vec![parent]);
            prop_assert_eq!(&commit.author.name, name.trim());
            prop_assert_eq!(&commit.author.email, &email);
            prop_assert_eq!(commit.timestamp(), seconds);
            prop_assert_eq!(&commit.summary, &subject);
            prop_assert_eq!(commit.order, 9);
        }
    }
}
