use std::time::Duration;

use drivesync::{FileId, Outcome};
use drivesyncd::{storage, Schedule};

use crate::{
    dataset::{Dataset, Entry, Patch},
    harness,
    stubs::drive::Mutation,
};

#[tokio::test]
async fn upload_new_tree() {
    let dataset = Dataset::new(
        vec![Entry::file("a.txt", "X"), Entry::dir("docs", vec![])],
        vec![],
    );
    let h = harness(dataset).await;

    h.sync().await.unwrap();

    assert_eq!(h.remote_children(""), vec!["a.txt", "docs"]);
    assert_eq!(h.remote_content("a.txt").as_deref(), Some("X"));
    assert!(h.has_remote_dir("docs"));
    assert_eq!(
        h.mutations(),
        vec![
            Mutation::MkDir {
                parent: h.remote_root.clone(),
                name: "docs".into()
            },
            Mutation::CreateFile {
                parent: h.remote_root.clone(),
                name: "a.txt".into()
            },
        ]
    );

    h.drive.clear_journal();
    h.take_outcomes();
    h.sync().await.unwrap();

    assert!(h.mutations().is_empty());
    assert_eq!(h.outcome_of("a.txt"), Some(Outcome::SkipEqual));
}

#[tokio::test]
async fn second_pass_is_idempotent() {
    let h = harness(Dataset::default()).await;
    h.sync_and_clear().await;

    h.sync().await.unwrap();

    assert!(h.mutations().is_empty());
    let outcomes = h.take_outcomes();
    assert!(!outcomes.is_empty());
    for (path, outcome) in outcomes {
        assert!(!outcome.is_mutation(), "{path}: {outcome}");
    }
}

#[tokio::test]
async fn trees_are_mirrored() {
    let h = harness(Dataset::default()).await;

    h.sync().await.unwrap();

    for path in [
        "only-local.txt",
        "only-local/file1.txt",
        "only-local/file2.txt",
        "only-local/deep/file1.txt",
        "only-local/deep/file2.txt",
        "both/only-local.txt",
    ] {
        let expected = format!("/{path}");
        assert_eq!(h.remote_content(path), Some(expected), "{path}");
        assert_eq!(h.outcome_of(path), Some(Outcome::UploadNew), "{path}");
    }
    for path in [
        "only-remote.txt",
        "only-remote/file1.txt",
        "only-remote/file2.txt",
        "only-remote/deep/file1.txt",
        "only-remote/deep/file2.txt",
        "both/only-remote.txt",
    ] {
        let expected = format!("/{path}");
        assert_eq!(h.local_content(path), Some(expected), "{path}");
        assert_eq!(h.outcome_of(path), Some(Outcome::DownloadNew), "{path}");
    }
}

#[tokio::test]
async fn equal_content_is_skipped() {
    let h = harness(Dataset::default()).await;
    let both_id = h.remote_id("both.txt").unwrap();
    let deep_both_id = h.remote_id("both/both.txt").unwrap();

    h.sync().await.unwrap();

    // mtimes differ both ways, content is the same
    assert_eq!(h.outcome_of("both.txt"), Some(Outcome::SkipEqual));
    assert_eq!(h.outcome_of("both/both.txt"), Some(Outcome::SkipEqual));
    for m in h.mutations() {
        match m {
            Mutation::WriteFile { id } | Mutation::Download { id, .. } => {
                assert_ne!(id, both_id);
                assert_ne!(id, deep_both_id);
            }
            _ => (),
        }
    }
}

#[tokio::test]
async fn local_newer_is_uploaded_in_place() {
    let h = harness(Dataset::default()).await;
    let id = h.remote_id("newer-local.txt").unwrap();

    h.sync().await.unwrap();

    assert_eq!(h.outcome_of("newer-local.txt"), Some(Outcome::UploadNewer));
    assert_eq!(
        h.remote_content("newer-local.txt").as_deref(),
        Some("/newer-local.txt - local")
    );
    assert_eq!(h.remote_id("newer-local.txt"), Some(id.clone()));
    assert!(h.mutations().contains(&Mutation::WriteFile { id }));
}

#[tokio::test]
async fn remote_newer_is_downloaded() {
    let h = harness(Dataset::default()).await;

    h.sync().await.unwrap();

    assert_eq!(
        h.outcome_of("newer-remote.txt"),
        Some(Outcome::DownloadNewer)
    );
    assert_eq!(
        h.local_content("newer-remote.txt").as_deref(),
        Some("/newer-remote.txt - remote")
    );
    assert_eq!(
        h.remote_content("newer-remote.txt").as_deref(),
        Some("/newer-remote.txt - remote")
    );
}

#[tokio::test]
async fn unknown_remote_time_uploads() {
    let dataset = Dataset::new(
        vec![Entry::file("a.txt", "local")],
        vec![Entry::file("a.txt", "remote")],
    )
    .apply_local(Patch::Age("/a.txt".into(), 3600));
    let h = harness(dataset).await;
    let id = h.remote_id("a.txt").unwrap();
    h.drive.set_mtime(&id, None);

    h.sync().await.unwrap();

    assert_eq!(h.outcome_of("a.txt"), Some(Outcome::UploadNewer));
    assert_eq!(h.remote_content("a.txt").as_deref(), Some("local"));
    assert_eq!(h.local_content("a.txt").as_deref(), Some("local"));
}

#[tokio::test]
async fn same_second_uploads() {
    let dataset = Dataset::new(
        vec![Entry::file("a.txt", "local")],
        vec![Entry::file("a.txt", "remote")],
    );
    let h = harness(dataset).await;

    h.sync().await.unwrap();

    assert_eq!(h.outcome_of("a.txt"), Some(Outcome::UploadNewer));
    assert_eq!(h.remote_content("a.txt").as_deref(), Some("local"));
}

#[tokio::test]
async fn folders_are_mirrored() {
    let h = harness(Dataset::default()).await;

    h.sync().await.unwrap();

    let only_local = h.remote_id("only-local").unwrap();
    let mutations = h.mutations();
    assert!(mutations.contains(&Mutation::MkDir {
        parent: h.remote_root.clone(),
        name: "only-local".into()
    }));
    assert!(mutations.contains(&Mutation::MkDir {
        parent: only_local,
        name: "deep".into()
    }));
    assert!(h.has_remote_dir("only-local/deep"));
    assert_eq!(
        h.outcome_of("only-local/deep"),
        Some(Outcome::CreateFolderRemote)
    );

    assert!(h.has_local_dir("only-remote"));
    assert!(h.has_local_dir("only-remote/deep"));
    assert_eq!(
        h.outcome_of("only-remote/deep"),
        Some(Outcome::CreateFolderLocal)
    );
}

#[tokio::test]
async fn documents_are_not_transferred() {
    let dataset = Dataset::new(vec![Entry::file("report.txt", "local report")], vec![]);
    let h = harness(dataset).await;
    h.drive.add_document(&h.remote_root, "notes");
    h.drive.add_document(&h.remote_root, "report.txt");

    h.sync().await.unwrap();

    assert!(h.mutations().is_empty());
    assert_eq!(h.outcome_of("notes"), Some(Outcome::SkipNotDownloadable));
    assert_eq!(
        h.outcome_of("report.txt"),
        Some(Outcome::SkipNotDownloadable)
    );
    assert_eq!(h.local_content("notes"), None);
    assert_eq!(
        h.local_content("report.txt").as_deref(),
        Some("local report")
    );
}

#[tokio::test]
async fn first_error_aborts_the_pass() {
    let calls = {
        let h = harness(Dataset::default()).await;
        h.sync().await.unwrap();
        h.drive.call_count()
    };
    assert!(calls > 10);

    for n in 0..calls {
        let h = harness(Dataset::default()).await;
        h.drive.fail_in(n);

        let err = h.sync().await.unwrap_err();

        let prefix = format!("injected failure on call #{n} ");
        assert!(
            matches!(&err, drivesync::Error::Api(msg) if msg.starts_with(&prefix)),
            "unexpected error {err:?}"
        );
        assert_eq!(h.drive.call_count(), n + 1, "calls after failing call #{n}");
        for (call, m) in h.drive.journal() {
            assert!(call < n, "{m:?} after failing call #{n}");
        }
    }
}

#[tokio::test]
async fn name_collisions_are_left_alone() {
    let dataset = Dataset::new(
        vec![Entry::file("x", "local x"), Entry::dir("y", vec![])],
        vec![
            Entry::dir("x", vec![Entry::file("inner.txt", "inner")]),
            Entry::file("y", "remote y"),
        ],
    );
    let h = harness(dataset).await;

    h.sync().await.unwrap();

    assert_eq!(h.local_content("x").as_deref(), Some("local x"));
    assert!(!h.has_local_dir("x"));
    assert!(h.has_local_dir("y"));
    assert_eq!(h.remote_content("y").as_deref(), Some("remote y"));
    // the local folder is still mirrored, the local file is not uploaded
    assert_eq!(
        h.mutations(),
        vec![Mutation::MkDir {
            parent: h.remote_root.clone(),
            name: "y".into()
        }]
    );
    assert_eq!(h.outcome_of("x"), None);

    h.drive.clear_journal();
    h.sync().await.unwrap();
    assert!(h.mutations().is_empty());
}

#[tokio::test]
async fn remote_edit_is_downloaded() {
    let dataset = Dataset::default()
        .apply_remote(Patch::Content(
            "/both/deep/file1.txt".into(),
            "/both/deep/file1.txt - remote edit".into(),
        ))
        .apply_local(Patch::Age("/both/deep/file1.txt".into(), 600));
    let h = harness(dataset).await;

    h.sync().await.unwrap();

    assert_eq!(
        h.outcome_of("both/deep/file1.txt"),
        Some(Outcome::DownloadNewer)
    );
    assert_eq!(
        h.local_content("both/deep/file1.txt").as_deref(),
        Some("/both/deep/file1.txt - remote edit")
    );
    assert_eq!(
        h.outcome_of("both/deep/file2.txt"),
        Some(Outcome::SkipEqual)
    );
}

#[tokio::test]
async fn remote_names_out_of_the_folder_are_skipped() {
    let h = harness(Dataset::empty()).await;
    let root_name = h.local_root.file_name().unwrap().to_string();
    let parent = h.local_root.parent().unwrap().to_owned();
    let escaped = format!("{root_name}-escaped.txt");
    let nested = format!("{root_name}-nested.txt");

    h.drive
        .add_file(&h.remote_root, &format!("../{escaped}"), "escaped", None);
    let dotdot = h.drive.add_folder(&h.remote_root, "..");
    h.drive.add_file(&dotdot, &nested, "nested", None);
    let dot = h.drive.add_folder(&h.remote_root, ".");
    h.drive.add_file(&dot, "inner.txt", "inner", None);

    h.sync().await.unwrap();

    assert!(!parent.join(&escaped).exists());
    assert!(!parent.join(&nested).exists());
    assert!(!h.local_root.join(&nested).exists());
    assert!(!h.local_root.join("inner.txt").exists());
    assert!(h.mutations().is_empty());
    assert!(h.take_outcomes().is_empty());
}

#[tokio::test]
async fn remote_names_with_separators_are_skipped() {
    let h = harness(Dataset::new(vec![Entry::file("ok.txt", "ok")], vec![])).await;
    h.drive.add_file(&h.remote_root, "a/b.txt", "slash", None);
    h.drive.add_folder(&h.remote_root, "c/d");
    h.drive.add_file(&h.remote_root, "", "no name", None);

    h.sync().await.unwrap();

    assert!(!h.local_path("a").exists());
    assert!(!h.local_path("c").exists());
    assert_eq!(h.remote_content("ok.txt").as_deref(), Some("ok"));
    assert_eq!(
        h.mutations(),
        vec![Mutation::CreateFile {
            parent: h.remote_root.clone(),
            name: "ok.txt".into()
        }]
    );
}

#[tokio::test]
async fn part_file_suffix_is_an_ordinary_name() {
    let dataset = Dataset::new(vec![], vec![Entry::file("notes.drivesync-part", "notes")]);
    let h = harness(dataset).await;

    h.sync().await.unwrap();
    assert_eq!(
        h.local_content("notes.drivesync-part").as_deref(),
        Some("notes")
    );

    h.drive.clear_journal();
    h.take_outcomes();
    h.sync().await.unwrap();

    assert!(h.mutations().is_empty());
    assert_eq!(
        h.outcome_of("notes.drivesync-part"),
        Some(Outcome::SkipEqual)
    );
}

#[cfg(unix)]
#[tokio::test]
async fn symlinks_are_ignored() {
    let dataset = Dataset::new(
        vec![Entry::file("target.txt", "target")],
        vec![Entry::file("link.txt", "remote link")],
    );
    let h = harness(dataset).await;
    std::os::unix::fs::symlink(h.local_path("target.txt"), h.local_path("link.txt")).unwrap();

    h.sync().await.unwrap();

    assert_eq!(h.remote_children(""), vec!["link.txt", "target.txt"]);
    assert_eq!(
        h.remote_content("link.txt").as_deref(),
        Some("remote link")
    );
    assert!(std::fs::symlink_metadata(h.local_path("link.txt"))
        .unwrap()
        .is_symlink());
    assert_eq!(h.local_content("target.txt").as_deref(), Some("target"));
}

#[tokio::test]
async fn driver_runs_once() {
    let h = harness(Dataset::default()).await;

    h.driver(Schedule::Once).run().await.unwrap();

    assert_eq!(
        h.remote_content("only-local.txt").as_deref(),
        Some("/only-local.txt")
    );
    let calls = h.drive.call_count();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.drive.call_count(), calls);
}

#[tokio::test]
async fn driver_stops_at_first_error() {
    let h = harness(Dataset::empty()).await;
    // a pass over empty folders lists the root twice
    h.drive.fail_in(5);

    let driver = h.driver(Schedule::Forever {
        interval: Duration::from_millis(10),
    });
    let res = tokio::time::timeout(Duration::from_secs(10), driver.run())
        .await
        .expect("driver should stop");

    assert!(matches!(res, Err(drivesync::Error::Api(_))));
    assert_eq!(h.drive.call_count(), 6);
}

#[tokio::test]
async fn root_folder_is_created_once() {
    let drive = crate::stubs::drive::Stub::new();

    let id = storage::find_or_create_folder(&drive, "Photos").await.unwrap();
    let again = storage::find_or_create_folder(&drive, "Photos").await.unwrap();

    assert_eq!(id, again);
    assert_eq!(
        drive.mutations(),
        vec![Mutation::MkDir {
            parent: FileId::root(),
            name: "Photos".into()
        }]
    );
}
