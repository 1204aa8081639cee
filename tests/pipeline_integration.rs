//! End-to-end tests for a retag run.
//!
//! Each test builds a mail root in a temporary directory with real mail
//! files, a rule file and an on-disk libSQL store, then drives
//! `pipeline::run` exactly as the binary does.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::timeout;

use mail_retag::config::RetagConfig;
use mail_retag::error::{ConfigError, Error, PipelineError};
use mail_retag::pipeline;
use mail_retag::store::{LibSqlStore, StoreMode, TagStore};

/// Maximum time any run is allowed to take before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const RULES: &str = r#"
{"Field": "From", "Pattern": "@lists\\.example\\.org", "Tags": "+list -new"}
{"Field": "List-Id", "Pattern": "bugs\\.example\\.org", "Tags": "+bug"}
{"Field": "From", "Pattern": "^Alice", "Tags": "+inbox -new"}
{"Field": "Subject", "Pattern": "(?i)\\[spam\\]", "Tags": "+delete -new"}
{"Field": "Subject", "Pattern": "([unclosed", "Tags": "+never"}
"#;

struct MailRoot {
    _tmp: tempfile::TempDir,
    config: RetagConfig,
}

impl MailRoot {
    fn new(pool_size: usize) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("Maildir");
        std::fs::create_dir_all(root.join("cur")).unwrap();

        let mut config = RetagConfig::with_mail_root(&root);
        config.pool_size = pool_size;
        std::fs::write(&config.rules_path, RULES).unwrap();

        Self { _tmp: tmp, config }
    }

    fn write_mail(&self, name: &str, headers: &str) -> PathBuf {
        let path = self.config.mail_root.join("cur").join(name);
        std::fs::write(&path, format!("{headers}\r\n\r\nHello.\r\n")).unwrap();
        path
    }

    /// Index messages as (id, thread, file, tags), then release the store.
    async fn index(&self, messages: &[(&str, &str, &Path, &[&str])]) {
        let store = LibSqlStore::open(&self.config.db_path, StoreMode::ReadWrite)
            .await
            .unwrap();
        for (id, thread, file, tags) in messages {
            store.index_message(id, thread, file, tags).await.unwrap();
        }
    }

    async fn tags_of(&self, id: &str) -> BTreeSet<String> {
        let store = LibSqlStore::open(&self.config.db_path, StoreMode::ReadOnly)
            .await
            .unwrap();
        store.find_message(id).await.unwrap().unwrap().tags
    }

    async fn run(&self) -> Result<pipeline::RunSummary, Error> {
        timeout(TEST_TIMEOUT, pipeline::run(&self.config))
            .await
            .expect("run hung")
    }
}

fn set(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
async fn full_run_tags_and_normalizes() {
    let root = MailRoot::new(3);

    let list = root.write_mail(
        "list",
        "From: Dev <dev@lists.example.org>\r\nSubject: [PATCH] fix\r\nMessage-ID: <list@example.org>",
    );
    let bug = root.write_mail(
        "bug",
        "From: tracker@lists.example.org\r\nList-Id: <bugs.example.org>\r\nSubject: Bug 12\r\nMessage-ID: <bug@example.org>",
    );
    let alice = root.write_mail(
        "alice",
        "From: Alice <alice@example.com>\r\nSubject: lunch?\r\nMessage-ID: <alice@example.com>",
    );
    let spam = root.write_mail(
        "spam",
        "From: Alice <alice@example.com>\r\nSubject: [SPAM] offer\r\nMessage-ID: <spam@example.com>",
    );
    let earlier = root.write_mail(
        "earlier",
        "From: me@example.com\r\nSubject: lunch\r\nMessage-ID: <earlier@example.com>",
    );
    let anon = root.write_mail("anon", "From: nobody@example.com\r\nSubject: ?");

    root.index(&[
        ("list@example.org", "t-list", list.as_path(), &["new"]),
        ("bug@example.org", "t-bug", bug.as_path(), &["new"]),
        ("alice@example.com", "t-lunch", alice.as_path(), &["new"]),
        ("spam@example.com", "t-spam", spam.as_path(), &["new"]),
        ("earlier@example.com", "t-lunch", earlier.as_path(), &["sent"]),
        ("anon@example.com", "t-anon", anon.as_path(), &["new"]),
    ])
    .await;

    let summary = root.run().await.unwrap();

    assert_eq!(summary.selected, 5);
    assert_eq!(summary.classified, 4);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.mutated, 4);

    assert_eq!(root.tags_of("list@example.org").await, set(&["list"]));
    assert_eq!(root.tags_of("bug@example.org").await, set(&["bug", "list"]));
    assert_eq!(root.tags_of("alice@example.com").await, set(&["inbox"]));
    // Deleted mail never stays in the inbox.
    assert_eq!(root.tags_of("spam@example.com").await, set(&["delete"]));
    // Inbox spreads across the lunch thread.
    assert_eq!(
        root.tags_of("earlier@example.com").await,
        set(&["inbox", "sent"])
    );
    // Skipped messages keep their tags.
    assert_eq!(root.tags_of("anon@example.com").await, set(&["new"]));
}

#[tokio::test]
async fn unknown_message_stops_the_run() {
    let root = MailRoot::new(2);

    let known = root.write_mail(
        "known",
        "From: Alice <alice@example.com>\r\nMessage-ID: <known@example.com>",
    );
    // Indexed under one identifier, but the file carries another.
    let stale = root.write_mail(
        "stale",
        "From: Alice <alice@example.com>\r\nMessage-ID: <rewritten@example.com>",
    );

    root.index(&[
        ("known@example.com", "t1", known.as_path(), &["new", "seen"]),
        ("stale@example.com", "t2", stale.as_path(), &["new"]),
    ])
    .await;

    let err = root.run().await.unwrap_err();
    match err {
        Error::Pipeline(PipelineError::MessageNotInStore { message_id, path }) => {
            assert_eq!(message_id, "rewritten@example.com");
            assert_eq!(path, stale);
        }
        other => panic!("Expected MessageNotInStore, got {:?}", other),
    }
}

#[tokio::test]
async fn corrupt_mail_file_stops_the_run() {
    let root = MailRoot::new(2);

    let good = root.write_mail(
        "good",
        "From: Alice <alice@example.com>\r\nMessage-ID: <good@example.com>",
    );
    let corrupt = root.config.mail_root.join("cur").join("corrupt");
    std::fs::write(&corrupt, vec![0u8; 4096]).unwrap();

    root.index(&[
        ("good@example.com", "t1", good.as_path(), &["new"]),
        ("corrupt@example.com", "t2", corrupt.as_path(), &["new"]),
    ])
    .await;

    let err = root.run().await.unwrap_err();
    match err {
        Error::Pipeline(PipelineError::MailUnparsable { path }) => assert_eq!(path, corrupt),
        other => panic!("Expected MailUnparsable, got {:?}", other),
    }
}

#[tokio::test]
async fn nothing_new_still_normalizes() {
    let root = MailRoot::new(4);
    let a = root.write_mail("a", "From: x@example.com\r\nMessage-ID: <a@example.com>");
    let b = root.write_mail("b", "From: y@example.com\r\nMessage-ID: <b@example.com>");

    root.index(&[
        ("a@example.com", "t1", a.as_path(), &["inbox", "seen"]),
        ("b@example.com", "t2", b.as_path(), &["inbox", "killed"]),
    ])
    .await;

    let summary = root.run().await.unwrap();
    assert_eq!(summary.selected, 0);
    assert_eq!(summary.classified, 0);

    assert_eq!(root.tags_of("a@example.com").await, set(&["archive", "seen"]));
    assert_eq!(root.tags_of("b@example.com").await, set(&["killed"]));
}

#[tokio::test]
async fn missing_rule_file_is_a_config_error() {
    let root = MailRoot::new(1);
    std::fs::remove_file(&root.config.rules_path).unwrap();

    let err = root.run().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Config(ConfigError::RulesUnreadable { .. })
    ));
}

#[tokio::test]
async fn missing_store_is_fatal() {
    let root = MailRoot::new(1);
    let err = root.run().await.unwrap_err();
    assert!(matches!(err, Error::Store(_)));
}
