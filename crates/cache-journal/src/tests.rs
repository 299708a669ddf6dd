use crate::{
    parse, recover_file_set, rebuild, JournalError, JournalHeader, JournalRecord, JournalWriter,
    RebuildRecord, JOURNAL_BACKUP_FILENAME, JOURNAL_FILENAME, JOURNAL_TMP_FILENAME,
};
use std::fs;
use tempfile::tempdir;

fn header() -> JournalHeader {
    JournalHeader {
        app_version: 1,
        cache_version: 1,
        max_size: 1024,
    }
}

#[test]
fn create_and_parse_round_trip() {
    let dir = tempdir().unwrap();
    let mut w = JournalWriter::create_new(dir.path(), &header()).unwrap();
    w.append_dirty("a").unwrap();
    w.append_clean("a", 10, 1000).unwrap();
    w.append_read("a").unwrap();
    w.append_del("a").unwrap();
    drop(w);

    let parsed = parse(&dir.path().join(JOURNAL_FILENAME)).unwrap();
    assert_eq!(parsed.header, header());
    assert_eq!(
        parsed.records,
        vec![
            JournalRecord::Dirty("a".to_string()),
            JournalRecord::Clean {
                key: "a".to_string(),
                size: 10,
                mtime_millis: 1000
            },
            JournalRecord::Read("a".to_string()),
            JournalRecord::Del("a".to_string()),
        ]
    );
}

#[test]
fn bad_header_marker_is_format_error() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(JOURNAL_FILENAME), "not-the-right-marker\n1 1 1\n").unwrap();
    let err = parse(&dir.path().join(JOURNAL_FILENAME)).unwrap_err();
    assert!(matches!(err, JournalError::Format(_)));
}

#[test]
fn unknown_operator_is_format_error() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(JOURNAL_FILENAME),
        "go-disklrucache\n1 1 1024\nfrobnicate a\n",
    )
    .unwrap();
    let err = parse(&dir.path().join(JOURNAL_FILENAME)).unwrap_err();
    assert!(matches!(err, JournalError::Format(_)));
}

#[test]
fn rebuild_preserves_order_and_backs_up_prior_generation() {
    let dir = tempdir().unwrap();
    let w = JournalWriter::create_new(dir.path(), &header()).unwrap();

    let entries = vec![
        RebuildRecord::Clean {
            key: "a".to_string(),
            size: 4,
            mtime_millis: 1,
        },
        RebuildRecord::Dirty("b".to_string()),
    ];
    let _w2 = rebuild(dir.path(), &header(), entries.into_iter(), w).unwrap();

    assert!(dir.path().join(JOURNAL_BACKUP_FILENAME).exists());
    assert!(!dir.path().join(JOURNAL_TMP_FILENAME).exists());

    let parsed = parse(&dir.path().join(JOURNAL_FILENAME)).unwrap();
    assert_eq!(
        parsed.records,
        vec![
            JournalRecord::Clean {
                key: "a".to_string(),
                size: 4,
                mtime_millis: 1
            },
            JournalRecord::Dirty("b".to_string()),
        ]
    );
}

#[test]
fn recover_removes_orphan_tmp_when_journal_present() {
    let dir = tempdir().unwrap();
    let _w = JournalWriter::create_new(dir.path(), &header()).unwrap();
    fs::write(dir.path().join(JOURNAL_TMP_FILENAME), "garbage").unwrap();

    recover_file_set(dir.path()).unwrap();

    assert!(dir.path().join(JOURNAL_FILENAME).exists());
    assert!(!dir.path().join(JOURNAL_TMP_FILENAME).exists());
}

#[test]
fn recover_promotes_backup_when_journal_missing() {
    let dir = tempdir().unwrap();
    let mut w = JournalWriter::create_new(dir.path(), &header()).unwrap();
    // The pre-rebuild journal has one record; this is what should come
    // back after recovery promotes the backup.
    w.append_dirty("pre-rebuild").unwrap();

    let entries = vec![RebuildRecord::Dirty("a".to_string())];
    let _w2 = rebuild(dir.path(), &header(), entries.into_iter(), w).unwrap();

    // Simulate a crash right after journal -> journal.bak, before
    // journal.tmp -> journal: remove "journal" but leave "journal.bak".
    fs::remove_file(dir.path().join(JOURNAL_FILENAME)).unwrap();

    recover_file_set(dir.path()).unwrap();

    assert!(dir.path().join(JOURNAL_FILENAME).exists());
    let parsed = parse(&dir.path().join(JOURNAL_FILENAME)).unwrap();
    assert_eq!(
        parsed.records,
        vec![JournalRecord::Dirty("pre-rebuild".to_string())]
    );
}
