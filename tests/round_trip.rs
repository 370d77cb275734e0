use b64pack::decoder::decode_stream;
use b64pack::encoder::encode_stream;
use b64pack::pipeline::{decode_to_scratch, encode_to_file};
use b64pack::zipper::{archive_to_vec, ArchiveOptions};
use b64pack::{
    extract_archive, list_entries, CancelToken, FailureKind, NoProgress, Outcome, PipelineConfig,
    ProgressEvent, ProgressLog, ProgressSink, Stage, Task, TaskEvent, Worklist,
};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 8) as u8
        })
        .collect()
}

fn dir_is_empty(dir: &Path) -> bool {
    fs::read_dir(dir).unwrap().next().is_none()
}

#[test]
fn two_files_encode_decode_and_extract() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let config = PipelineConfig::default()
        .with_chunk_size(1000)
        .with_scratch_dir(scratch.path());

    let small = work.path().join("small.txt");
    let large = work.path().join("large.bin");
    fs::write(&small, b"ten bytes!").unwrap();
    fs::write(&large, pseudo_random(5000, 7)).unwrap();

    let list = Worklist::from_files(&[&small, &large]).unwrap();
    assert_eq!(list.total_bytes(), 5010);

    let text_path = work.path().join("payload.txt");
    let log = ProgressLog::new();
    encode_to_file(&list, &text_path, &config, &log, &CancelToken::new()).unwrap();

    let text = fs::read_to_string(&text_path).unwrap();
    assert!(text
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='));

    for stage in [Stage::Compressing, Stage::Encoding] {
        let events = log.events_for(stage);
        assert!(!events.is_empty());
        assert!(events.windows(2).all(|w| w[0].current <= w[1].current));
        assert!(events.iter().all(|e| e.current <= e.total));
    }

    let archive = decode_to_scratch(&text_path, &config, &NoProgress, &CancelToken::new()).unwrap();
    let entries = list_entries(&archive).unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["small.txt", "large.bin"]);

    let out = work.path().join("unpacked");
    extract_archive(&archive, &out).unwrap();
    assert_eq!(fs::read(out.join("small.txt")).unwrap(), b"ten bytes!");
    assert_eq!(fs::read(out.join("large.bin")).unwrap(), pseudo_random(5000, 7));

    fs::remove_file(&archive).unwrap();
    assert!(dir_is_empty(scratch.path()));
}

struct CancelAfterFirstChunk {
    token: CancelToken,
    compressing_events: AtomicUsize,
}

impl ProgressSink for CancelAfterFirstChunk {
    fn stage(&self, _stage: Stage) {}

    fn progress(&self, event: ProgressEvent) {
        if event.stage == Stage::Compressing && event.current > 0 {
            self.compressing_events.fetch_add(1, Ordering::SeqCst);
            self.token.cancel();
        }
    }
}

#[test]
fn cancel_after_first_chunk_leaves_no_files() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let config = PipelineConfig::default()
        .with_chunk_size(4)
        .with_scratch_dir(scratch.path());

    let small = work.path().join("small.txt");
    let large = work.path().join("large.bin");
    fs::write(&small, b"ten bytes!").unwrap();
    fs::write(&large, pseudo_random(5000, 3)).unwrap();
    let list = Worklist::from_files(&[&small, &large]).unwrap();
    let dest = work.path().join("payload.txt");

    let sink = CancelAfterFirstChunk {
        token: CancelToken::new(),
        compressing_events: AtomicUsize::new(0),
    };
    let err = encode_to_file(&list, &dest, &config, &sink, &sink.token).unwrap_err();

    assert!(err.is_canceled());
    assert_eq!(sink.compressing_events.load(Ordering::SeqCst), 1);
    assert!(!dest.exists());
    assert!(dir_is_empty(scratch.path()));
}

#[test]
fn codec_round_trip_is_byte_exact_for_any_chunk_size() {
    let work = TempDir::new().unwrap();
    let a = work.path().join("a.bin");
    let b = work.path().join("b.txt");
    fs::write(&a, pseudo_random(3001, 11)).unwrap();
    fs::write(&b, "hello ".repeat(300)).unwrap();
    let list = Worklist::from_files(&[&a, &b]).unwrap();
    let archive = archive_to_vec(list.items(), &ArchiveOptions::default()).unwrap();

    let mut reference: Option<Vec<u8>> = None;
    for chunk in [1, 3, 4, 1024, archive.len() + 1] {
        let mut text = Vec::new();
        encode_stream(
            Cursor::new(&archive),
            &mut text,
            Path::new("mem"),
            archive.len() as u64,
            chunk,
            &NoProgress,
            &CancelToken::new(),
        )
        .unwrap();
        match &reference {
            Some(expected) => assert_eq!(&text, expected, "chunk {}", chunk),
            None => reference = Some(text.clone()),
        }

        let mut decoded = Vec::new();
        decode_stream(
            Cursor::new(&text),
            &mut decoded,
            Path::new("mem"),
            text.len() as u64,
            chunk,
            false,
            &NoProgress,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(decoded, archive, "chunk {}", chunk);
    }
}

#[test]
fn decoded_payload_survives_trailing_newline() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let config = PipelineConfig::default()
        .with_chunk_size(64)
        .with_scratch_dir(scratch.path());

    let file = work.path().join("doc.md");
    fs::write(&file, "# Title\n\nBody text.\n").unwrap();
    let dest = work.path().join("doc.txt");
    encode_to_file(
        &Worklist::from_files(&[&file]).unwrap(),
        &dest,
        &config,
        &NoProgress,
        &CancelToken::new(),
    )
    .unwrap();

    let mut text = fs::read(&dest).unwrap();
    text.extend_from_slice(b" \n");
    fs::write(&dest, &text).unwrap();

    let archive = decode_to_scratch(&dest, &config, &NoProgress, &CancelToken::new()).unwrap();
    let entries = list_entries(&archive).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "doc.md");
    fs::remove_file(archive).unwrap();
}

#[test]
fn arbitrary_text_fails_at_validation() {
    let work = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let config = PipelineConfig::default()
        .with_chunk_size(16)
        .with_scratch_dir(scratch.path());
    let input = work.path().join("letter.txt");
    fs::write(
        &input,
        "Dear team,\nplease find attached the quarterly figures.\nRegards\n",
    )
    .unwrap();

    let handle = Task::decode(&input, config).start().unwrap();
    let events: Vec<TaskEvent> = handle.events().iter().collect();
    let outcome = handle.wait();

    let failure = match outcome {
        Outcome::Failed(failure) => failure,
        other => panic!("expected failure, got {:?}", other),
    };
    assert_eq!(failure.kind, FailureKind::NotAnArchive);

    let last_stage = events.iter().rev().find_map(|e| match e {
        TaskEvent::Stage(stage) => Some(*stage),
        _ => None,
    });
    assert_eq!(last_stage, Some(Stage::Validating));
    assert!(dir_is_empty(scratch.path()));
}
