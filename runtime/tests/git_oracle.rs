//! Classification against a real git repository.
//!
//! Builds a throwaway repository with plumbing commands (no branches or
//! working tree needed) and classifies tags through [`GitCheckout`].
//! Skipped when `git` is not installed.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use image_reaper_core::{Classification, ReaperError};
use image_reaper_runtime::{CommitClassifier, CommitOracle, GitCheckout};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Run git in `dir` and return trimmed stdout, asserting success.
fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_AUTHOR_NAME", "Reaper Test")
        .env("GIT_AUTHOR_EMAIL", "reaper@example.com")
        .env("GIT_COMMITTER_NAME", "Reaper Test")
        .env("GIT_COMMITTER_EMAIL", "reaper@example.com")
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

struct Repo {
    _dir: tempfile::TempDir,
    checkout: GitCheckout,
    tree: String,
    commit: String,
    merge: String,
    tagged: String,
}

async fn repo() -> Repo {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();
    git(path, &["init", "--quiet"]);

    let tree = git(path, &["write-tree"]);
    let root = git(path, &["commit-tree", &tree, "-m", "root"]);
    let commit = git(path, &["commit-tree", &tree, "-p", &root, "-m", "generic"]);
    let side = git(path, &["commit-tree", &tree, "-p", &root, "-m", "side"]);
    let merge = git(
        path,
        &["commit-tree", &tree, "-p", &commit, "-p", &side, "-m", "merge"],
    );
    let tagged = git(path, &["commit-tree", &tree, "-p", &merge, "-m", "release"]);
    git(path, &["tag", "v1.0.0", &tagged]);
    git(path, &["tag", "-a", "v2.0.0", "-m", "annotated", &tagged]);

    let checkout = GitCheckout::open(path, Duration::from_secs(10)).await.unwrap();
    Repo {
        _dir: dir,
        checkout,
        tree,
        commit,
        merge,
        tagged,
    }
}

/// Well-formed object id that no object in the test repository has.
const ABSENT_SHA: &str = "1234567890123456789012345678901234567890";

#[tokio::test]
async fn test_oracle_queries() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = repo().await;
    let oracle = &repo.checkout;

    assert_eq!(oracle.parent_count(&repo.merge).await.unwrap(), 2);
    assert_eq!(oracle.parent_count(&repo.commit).await.unwrap(), 1);
    assert_eq!(oracle.parent_count("no-such-object").await.unwrap(), 0);

    assert!(oracle.tag_exists("v1.0.0").await.unwrap());
    assert!(oracle.tag_exists("v2.0.0").await.unwrap());
    assert!(!oracle.tag_exists("v3.0.0").await.unwrap());

    assert_eq!(
        oracle.resolve_commit(&repo.commit).await.unwrap(),
        Some(repo.commit.clone())
    );
    assert_eq!(oracle.resolve_commit("no-such-object").await.unwrap(), None);
    assert_eq!(oracle.resolve_commit(ABSENT_SHA).await.unwrap(), None);
    assert_eq!(oracle.resolve_commit(&repo.tree).await.unwrap(), None);
    assert_eq!(
        oracle.resolve_commit("v2.0.0").await.unwrap(),
        Some(repo.tagged.clone())
    );
}

#[tokio::test]
async fn test_classify_against_history() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let repo = repo().await;
    let Repo {
        checkout,
        tree,
        commit,
        merge,
        tagged,
        _dir,
    } = repo;
    let classifier = CommitClassifier::new(Arc::new(checkout), 4);

    assert_eq!(classifier.classify_tag(&merge).await.unwrap(), Classification::Priority);
    assert_eq!(classifier.classify_tag("v1.0.0").await.unwrap(), Classification::Priority);
    assert_eq!(classifier.classify_tag("v2.0.0").await.unwrap(), Classification::Priority);
    assert_eq!(classifier.classify_tag(&commit).await.unwrap(), Classification::Generic);
    // The release commit itself is an ordinary commit.
    assert_eq!(classifier.classify_tag(&tagged).await.unwrap(), Classification::Generic);
    // Abbreviated shas resolve, but not to themselves.
    assert_eq!(classifier.classify_tag(&commit[..12]).await.unwrap(), Classification::Custom);
    assert_eq!(classifier.classify_tag("nightly").await.unwrap(), Classification::Custom);
    // Well-formed shas that are not commits in the history.
    assert_eq!(classifier.classify_tag(ABSENT_SHA).await.unwrap(), Classification::Custom);
    assert_eq!(classifier.classify_tag(&tree).await.unwrap(), Classification::Custom);
    assert_eq!(
        classifier.classify_tag("--output=/tmp/x").await.unwrap(),
        Classification::Custom
    );
}

#[tokio::test]
async fn test_open_rejects_non_repository() {
    if !git_available() {
        eprintln!("git not installed, skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let err = GitCheckout::open(dir.path(), Duration::from_secs(10))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ReaperError::ConfigError(_)));
}
