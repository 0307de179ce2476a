use crate::config::{Config, ExtractionConfig, ReadinessConfig, RetryConfig};
use crate::error::{Error, ExtractionError};
use crate::extraction::*;
use crate::types::{Event, TaskId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a ZIP archive containing the given files (directories end with '/')
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// Create a 7z archive from a source directory using sevenz_rust
fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

fn legacy_matcher() -> LegacyMatcher {
    LegacyMatcher::new(&ExtractionConfig::default().legacy_patterns).unwrap()
}

fn fast_readiness() -> ReadinessConfig {
    ReadinessConfig {
        sample_count: 3,
        sample_delay: Duration::from_millis(20),
    }
}

fn test_config(parallelism: usize) -> Config {
    let mut config = Config::default();
    config.extraction.max_parallelism = Some(parallelism);
    config.extraction.auto_delete_delay = Duration::from_millis(10);
    config.delete_retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

fn test_extractor(config: Config) -> (Extractor, broadcast::Receiver<Event>) {
    let (tx, rx) = broadcast::channel(1000);
    let extractor = Extractor::new(Arc::new(config), tx, CancellationToken::new());
    (extractor, rx)
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn progress_values(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ExtractionProgress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Path handling
// ---------------------------------------------------------------------------

#[test]
fn normalize_member_path_unifies_separators() {
    assert_eq!(normalize_member_path("dir\\sub\\a.pmp"), "dir/sub/a.pmp");
    assert_eq!(normalize_member_path("./a.pmp"), "a.pmp");
    assert_eq!(normalize_member_path("/abs/a.pmp"), "abs/a.pmp");
    assert_eq!(normalize_member_path("folder/"), "folder");
}

#[test]
fn member_destination_joins_below_root() {
    let root = Path::new("/mods/pack");
    let dest = member_destination(root, Path::new("/mods/pack.zip"), "sub/a.pmp").unwrap();
    assert_eq!(dest, PathBuf::from("/mods/pack/sub/a.pmp"));
}

#[test]
fn member_destination_rejects_traversal() {
    let root = Path::new("/mods/pack");
    let archive = Path::new("/mods/pack.zip");

    for entry in ["../evil.pmp", "sub/../../evil.pmp", "/etc/evil.pmp", ""] {
        let err = member_destination(root, archive, entry).unwrap_err();
        assert!(
            matches!(err, Error::Extraction(ExtractionError::UnsafePath { .. })),
            "{entry:?} should be rejected, got {err:?}"
        );
    }
}

#[test]
fn extraction_dir_for_loose_archive_is_sibling_folder() {
    let dir = extraction_dir(Path::new("/downloads/Cool Mod.zip")).unwrap();
    assert_eq!(dir, PathBuf::from("/downloads/Cool Mod"));
}

#[test]
fn extraction_dir_for_relocated_archive_is_its_folder() {
    let dir = extraction_dir(Path::new("/mods/Cool Mod/Cool Mod.zip")).unwrap();
    assert_eq!(dir, PathBuf::from("/mods/Cool Mod"));
}

// ---------------------------------------------------------------------------
// Format detection
// ---------------------------------------------------------------------------

#[test]
fn detects_formats_by_signature() {
    let temp = TempDir::new().unwrap();

    let zip_path = temp.path().join("a.zip");
    create_zip_archive(&zip_path, &[("a.pmp", b"x")]);
    assert_eq!(detect_archive_format(&zip_path).unwrap(), Some(ArchiveFormat::Zip));

    let src = temp.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("b.pmp"), b"y").unwrap();
    let sevenz_path = temp.path().join("b.7z");
    create_7z_archive(&sevenz_path, &src);
    assert_eq!(
        detect_archive_format(&sevenz_path).unwrap(),
        Some(ArchiveFormat::SevenZip)
    );

    let text = temp.path().join("notes.zip");
    std::fs::write(&text, b"definitely not an archive").unwrap();
    assert_eq!(detect_archive_format(&text).unwrap(), None);
}

#[test]
fn open_archive_rejects_unknown_signature() {
    let temp = TempDir::new().unwrap();
    let fake = temp.path().join("fake.rar");
    std::fs::write(&fake, b"plain text").unwrap();

    let err = open_archive(&fake).err().unwrap();
    assert!(err.is_invalid_archive());
}

#[test]
fn open_archive_reports_missing_file_as_io() {
    let temp = TempDir::new().unwrap();
    let err = open_archive(&temp.path().join("missing.zip")).err().unwrap();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn truncated_zip_is_invalid_archive() {
    let temp = TempDir::new().unwrap();
    let broken = temp.path().join("broken.zip");
    std::fs::write(&broken, b"PK\x03\x04 and then nothing useful").unwrap();

    let err = open_archive(&broken).err().unwrap();
    assert!(err.is_invalid_archive(), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inspect_keeps_only_mod_files_sorted() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(
        &archive,
        &[
            ("readme.txt", b"hi"),
            ("b.pmp", b"bbb"),
            ("textures/", b""),
            ("a.pmp", b"a"),
        ],
    );

    let listing = inspect_archive(&archive, &ExtractionConfig::default(), &legacy_matcher(), true)
        .await
        .unwrap();

    let paths: Vec<&str> = listing.iter().map(|e| e.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["a.pmp", "b.pmp"]);
    assert!(listing.iter().all(|e| e.is_mod_file && !e.is_legacy_flagged));
    assert_eq!(listing[1].size_bytes, 3);
    assert_eq!(listing[1].extension, "pmp");
}

#[tokio::test]
async fn inspect_is_deterministic() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(
        &archive,
        &[("z/last.ttmp2", b"1"), ("m.pmp", b"2"), ("a/first.ttmp", b"3")],
    );

    let config = ExtractionConfig::default();
    let first = inspect_archive(&archive, &config, &legacy_matcher(), true)
        .await
        .unwrap();
    let second = inspect_archive(&archive, &config, &legacy_matcher(), true)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].relative_path, "a/first.ttmp");
}

#[tokio::test]
async fn inspect_flags_legacy_members() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(
        &archive,
        &[
            ("Outfit.pmp", b"new"),
            ("Outfit Pre-DT.pmp", b"old"),
            ("[EW] Outfit.ttmp2", b"old"),
        ],
    );
    let config = ExtractionConfig::default();

    let skipped = inspect_archive(&archive, &config, &legacy_matcher(), true)
        .await
        .unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].relative_path, "Outfit.pmp");

    let flagged = inspect_archive(&archive, &config, &legacy_matcher(), false)
        .await
        .unwrap();
    assert_eq!(flagged.len(), 3);
    let legacy: Vec<&str> = flagged
        .iter()
        .filter(|e| e.is_legacy_flagged)
        .map(|e| e.relative_path.as_str())
        .collect();
    assert_eq!(legacy, vec!["Outfit Pre-DT.pmp", "[EW] Outfit.ttmp2"]);
}

#[tokio::test]
async fn inspect_lists_7z_members() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("one.pmp"), b"1").unwrap();
    std::fs::write(src.join("two.ttmp2"), b"22").unwrap();
    std::fs::write(src.join("notes.txt"), b"skip").unwrap();
    let archive = temp.path().join("pack.7z");
    create_7z_archive(&archive, &src);

    let listing = inspect_archive(&archive, &ExtractionConfig::default(), &legacy_matcher(), true)
        .await
        .unwrap();

    let mut names: Vec<&str> = listing.iter().map(|e| e.file_name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["one.pmp", "two.ttmp2"]);
}

#[tokio::test]
async fn inspect_invalid_archive_is_distinguishable() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("fake.7z");
    std::fs::write(&archive, b"nope").unwrap();

    let err = inspect_archive(&archive, &ExtractionConfig::default(), &legacy_matcher(), true)
        .await
        .unwrap_err();
    assert!(err.is_invalid_archive());
}

#[test]
fn legacy_matcher_rejects_bad_pattern() {
    let err = LegacyMatcher::new(&["(unclosed".to_string()]).unwrap_err();
    assert!(matches!(err, Error::Config { .. }));
}

#[test]
fn legacy_matcher_ignores_case_of_user_patterns() {
    let matcher = LegacyMatcher::new(&["endwalker-only".to_string()]).unwrap();

    assert!(matcher.is_legacy("mods/ENDWALKER-ONLY Hat.pmp"));
    assert!(matcher.is_legacy("Endwalker-Only/body.ttmp2"));
    assert!(!matcher.is_legacy("Dawntrail/body.ttmp2"));
}

// ---------------------------------------------------------------------------
// Readiness
// ---------------------------------------------------------------------------

#[test]
fn partial_marker_detection() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("mod.zip");
    std::fs::write(&file, b"data").unwrap();
    assert!(!has_partial_marker(&file, "part"));

    std::fs::write(temp.path().join("mod.zip.part"), b"").unwrap();
    assert!(has_partial_marker(&file, "part"));
}

#[test]
fn partial_marker_with_random_infix() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("mod.zip");
    std::fs::write(&file, b"data").unwrap();
    std::fs::write(temp.path().join("mod.zip.a1b2c3.part"), b"").unwrap();
    assert!(has_partial_marker(&file, "part"));

    // Another file's marker does not count
    let other = temp.path().join("other.zip");
    std::fs::write(&other, b"data").unwrap();
    assert!(!has_partial_marker(&other, "part"));
}

#[tokio::test]
async fn stable_file_is_ready() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("mod.pmp");
    std::fs::write(&file, b"complete").unwrap();

    assert!(is_ready(&file, &fast_readiness(), "part").await);
}

#[tokio::test]
async fn empty_missing_or_partial_file_is_not_ready() {
    let temp = TempDir::new().unwrap();
    let config = fast_readiness();

    let empty = temp.path().join("empty.pmp");
    std::fs::write(&empty, b"").unwrap();
    assert!(!is_ready(&empty, &config, "part").await);

    assert!(!is_ready(&temp.path().join("missing.pmp"), &config, "part").await);

    let partial = temp.path().join("partial.zip");
    std::fs::write(&partial, b"data").unwrap();
    std::fs::write(temp.path().join("partial.zip.part"), b"").unwrap();
    assert!(!is_ready(&partial, &config, "part").await);
}

#[tokio::test]
async fn growing_file_is_not_ready() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("growing.zip");
    std::fs::write(&file, b"start").unwrap();

    let writer_path = file.clone();
    let writer = tokio::spawn(async move {
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            std::io::Write::write_all(&mut f, b"more").unwrap();
        }
    });

    let config = ReadinessConfig {
        sample_count: 3,
        sample_delay: Duration::from_millis(25),
    };
    assert!(!is_ready(&file, &config, "part").await);
    writer.await.unwrap();
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

#[tokio::test]
async fn extracts_exactly_the_selection() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(
        &archive,
        &[
            ("a.pmp", b"aaa"),
            ("sub/b.pmp", b"bbb"),
            ("c.pmp", b"ccc"),
            ("readme.txt", b"r"),
        ],
    );
    let (extractor, mut rx) = test_extractor(test_config(2));
    let task_id = TaskId::new();

    let selected = vec![
        "a.pmp".to_string(),
        "sub/b.pmp".to_string(),
        "not-in-archive.pmp".to_string(),
    ];
    let mut files = extractor
        .extract_selected(&archive, &selected, &task_id)
        .await
        .unwrap();
    files.sort();

    let dest = temp.path().join("pack");
    assert_eq!(files, vec![dest.join("a.pmp"), dest.join("sub").join("b.pmp")]);
    assert_eq!(std::fs::read(dest.join("sub").join("b.pmp")).unwrap(), b"bbb");
    assert!(!dest.join("c.pmp").exists());
    assert!(archive.exists(), "archive kept without auto-delete");

    let events = drain(&mut rx);
    let progress = progress_values(&events);
    assert_eq!(progress.last(), Some(&100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::FilesExtracted { files, .. } if files.len() == 2
    )));
}

#[tokio::test]
async fn empty_intersection_reports_nothing_to_extract() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(&archive, &[("a.pmp", b"a")]);
    let (extractor, mut rx) = test_extractor(test_config(1));
    let task_id = TaskId::new();

    let files = extractor
        .extract_selected(&archive, &["other.pmp".to_string()], &task_id)
        .await
        .unwrap();
    assert!(files.is_empty());
    assert!(!temp.path().join("pack").exists());

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            Event::ExtractionProgress {
                task_id: task_id.clone(),
                progress: 100,
                message: "Nothing to extract".to_string(),
            },
            Event::TaskCompleted {
                task_id,
                message: "Nothing to extract".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn relocated_archive_extracts_in_place() {
    let temp = TempDir::new().unwrap();
    let folder = temp.path().join("pack");
    std::fs::create_dir(&folder).unwrap();
    let archive = folder.join("pack.zip");
    create_zip_archive(&archive, &[("a.pmp", b"a")]);
    let (extractor, _rx) = test_extractor(test_config(1));

    let files = extractor
        .extract_selected(&archive, &["a.pmp".to_string()], &TaskId::new())
        .await
        .unwrap();
    assert_eq!(files, vec![folder.join("a.pmp")]);
}

#[tokio::test]
async fn extracts_from_7z() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("one.pmp"), b"first").unwrap();
    std::fs::write(src.join("two.pmp"), b"second").unwrap();
    let archive = temp.path().join("pack.7z");
    create_7z_archive(&archive, &src);

    let members = list_members(&archive).await.unwrap();
    let two = members
        .iter()
        .find(|m| m.relative_path.ends_with("two.pmp"))
        .unwrap()
        .relative_path
        .clone();

    let (extractor, _rx) = test_extractor(test_config(2));
    let files = extractor
        .extract_selected(&archive, &[two], &TaskId::new())
        .await
        .unwrap();

    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("two.pmp"));
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"second");
}

#[tokio::test]
async fn auto_delete_removes_archive_after_extraction() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(&archive, &[("a.pmp", b"a")]);
    let mut config = test_config(1);
    config.install.auto_delete_archives = true;
    let (extractor, _rx) = test_extractor(config);

    extractor
        .extract_selected(&archive, &["a.pmp".to_string()], &TaskId::new())
        .await
        .unwrap();
    assert!(!archive.exists());
    assert!(temp.path().join("pack").join("a.pmp").exists());
}

#[tokio::test]
async fn invalid_archive_is_deleted() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("bogus.zip");
    std::fs::write(&archive, b"this is not a zip").unwrap();
    let (extractor, mut rx) = test_extractor(test_config(1));
    let task_id = TaskId::new();

    let err = extractor
        .extract_selected(&archive, &["a.pmp".to_string()], &task_id)
        .await
        .unwrap_err();
    assert!(err.is_invalid_archive());
    assert!(!archive.exists());

    // The answered task still gets a final status
    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::TaskFailed { task_id: failed, path, .. } if failed == &task_id && path == &archive
    )));
}

#[tokio::test]
async fn cancelled_extraction_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pack.zip");
    create_zip_archive(&archive, &[("a.pmp", b"a")]);

    let (tx, mut rx) = broadcast::channel(16);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let extractor = Extractor::new(Arc::new(test_config(1)), tx, cancel);

    let err = extractor
        .extract_selected(&archive, &["a.pmp".to_string()], &TaskId::new())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(drain(&mut rx).is_empty(), "cancellation is not a failure event");
    assert!(!temp.path().join("pack").exists());
}
