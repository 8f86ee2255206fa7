use eccvault::codec::{Codec, CodecError, Decoded, ReedSolomonCodec};
use eccvault::error::ErrorKind;
use eccvault::io_stream::{check_stream, create_stream, fix_stream};
use eccvault::orchestrator::{EccOptions, Operation, Orchestrator};
use eccvault::params::CodecParams;
use eccvault::report::{FileOutcome, Success};
use eccvault::cancel::CancelToken;
use eccvault::EccError;
use proptest::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Fixture {
    _dir:  TempDir,
    data:  PathBuf,
    vault: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let vault = dir.path().join("vault");
    fs::create_dir_all(&data).unwrap();
    fs::create_dir_all(&vault).unwrap();
    Fixture { _dir: dir, data, vault }
}

fn orchestrator_with(codec: Box<dyn Codec>, vault: &Path) -> Orchestrator {
    let options = EccOptions { store_root: vault.to_path_buf(), ..EccOptions::default() };
    Orchestrator::new(codec, options)
}

fn orchestrator(vault: &Path) -> Orchestrator {
    orchestrator_with(Box::new(ReedSolomonCodec::new(CodecParams::default()).unwrap()), vault)
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(37).wrapping_add(seed)).collect()
}

fn succeeded(outcome: &FileOutcome) -> &Success {
    match outcome {
        FileOutcome::Succeeded { result } => result,
        other => panic!("expected success, got {other:?}"),
    }
}

#[test]
fn test_create_check_fix_roundtrip() {
    let fx = fixture();
    let file = fx.data.join("home.tar.gpg");
    let original = pattern(300, 1);
    fs::write(&file, &original).unwrap();
    let orch = orchestrator(&fx.vault);
    let roots = vec![fx.data.clone()];

    let batch = orch.run(Operation::Create, &roots).unwrap();
    assert_eq!(batch.files.len(), 1);
    assert!(matches!(succeeded(&batch.files[0].outcome), Success::Created(r) if r.blocks == 2 && r.ecc_bytes == 64));
    let store = orch.layout().ecc_path(&file);
    assert!(store.starts_with(fx.vault.join("ecc-255-223-8")));
    assert_eq!(fs::metadata(&store).unwrap().len(), 64);

    let batch = orch.run(Operation::Check, &roots).unwrap();
    assert!(matches!(succeeded(&batch.files[0].outcome), Success::Checked(r) if r.total_blocks == 2 && r.is_clean()));

    let batch = orch.run(Operation::Fix { compare: true }, &roots).unwrap();
    match succeeded(&batch.files[0].outcome) {
        Success::Fixed(r) => {
            assert_eq!(r.repaired_blocks, 0);
            assert_eq!(r.identical, Some(true));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(fs::read(orch.layout().repaired_path(&file)).unwrap(), original);
}

#[test]
fn test_create_is_idempotent() {
    let fx = fixture();
    let file = fx.data.join("a.gpg");
    fs::write(&file, pattern(1000, 9)).unwrap();
    let orch = orchestrator(&fx.vault);
    let roots = vec![file.clone()];

    orch.run(Operation::Create, &roots).unwrap();
    let first = fs::read(orch.layout().ecc_path(&file)).unwrap();

    let batch = orch.run(Operation::Create, &roots).unwrap();
    assert!(matches!(
        batch.files[0].outcome,
        FileOutcome::Skipped { kind: ErrorKind::EccStoreAlreadyExists, .. }
    ));
    assert_eq!(fs::read(orch.layout().ecc_path(&file)).unwrap(), first);
}

#[test]
fn test_fix_repairs_correctable_corruption() {
    let fx = fixture();
    let file = fx.data.join("a.gpg");
    let original = pattern(5000, 3);
    fs::write(&file, &original).unwrap();
    let orch = orchestrator(&fx.vault);
    let roots = vec![fx.data.clone()];
    orch.run(Operation::Create, &roots).unwrap();

    // 16 byte errors in block 0 and 3, the most a 32-byte parity can fix.
    let mut damaged = original.clone();
    for i in 0..16 {
        damaged[i * 13] ^= 0xFF;
        damaged[3 * 223 + i * 11] ^= 0x01;
    }
    fs::write(&file, &damaged).unwrap();

    let batch = orch.run(Operation::Check, &roots).unwrap();
    match &batch.files[0].outcome {
        FileOutcome::Failed { kind, failed_blocks, .. } => {
            assert_eq!(*kind, ErrorKind::VerificationFailed);
            assert_eq!(failed_blocks, &vec![0, 3]);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(batch.found_corruption());
    let failed = orch.check(&eccvault::select::ProtectedFile { path: file.clone(), len: 5000 }).unwrap();
    assert_eq!(failed.failed_blocks, vec![0, 3]);

    let batch = orch.run(Operation::Fix { compare: true }, &roots).unwrap();
    match succeeded(&batch.files[0].outcome) {
        Success::Fixed(r) => {
            assert_eq!(r.repaired_blocks, 2);
            assert_eq!(r.corrected_symbols, 32);
            assert_eq!(r.identical, Some(false));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(fs::read(orch.layout().repaired_path(&file)).unwrap(), original);
}

#[test]
fn test_single_flip_in_padded_block_is_detected() {
    let fx = fixture();
    let file = fx.data.join("a.gpg");
    let mut data = pattern(300, 5);
    fs::write(&file, &data).unwrap();
    let orch = orchestrator(&fx.vault);
    orch.run(Operation::Create, &[file.clone()]).unwrap();

    data[299] ^= 0x80;
    fs::write(&file, &data).unwrap();
    let report = orch.check(&eccvault::select::ProtectedFile { path: file, len: 300 }).unwrap();
    assert_eq!(report.failed_blocks, vec![1]);
}

#[test]
fn test_size_mismatch_detected() {
    let fx = fixture();
    let grown = fx.data.join("grown.gpg");
    let cut = fx.data.join("cut.gpg");
    fs::write(&grown, pattern(300, 0)).unwrap();
    fs::write(&cut, pattern(300, 0)).unwrap();
    let orch = orchestrator(&fx.vault);
    let roots = vec![fx.data.clone()];
    orch.run(Operation::Create, &roots).unwrap();

    fs::write(&grown, pattern(500, 0)).unwrap();
    let store = orch.layout().ecc_path(&cut);
    let bytes = fs::read(&store).unwrap();
    fs::write(&store, &bytes[..63]).unwrap();

    let batch = orch.run(Operation::CheckSize, &roots).unwrap();
    assert!(matches!(batch.files[0].outcome, FileOutcome::Failed { kind: ErrorKind::InconsistentEccSize, .. }));
    assert!(matches!(batch.files[1].outcome, FileOutcome::Failed { kind: ErrorKind::InconsistentInputSize, .. }));

    // Check and Fix refuse to decode a mismatched pair.
    let batch = orch.run(Operation::Fix { compare: false }, &roots).unwrap();
    assert_eq!(batch.failed(), 2);
    assert!(!orch.layout().repaired_path(&grown).exists());
}

#[test]
fn test_missing_store_is_skipped() {
    let fx = fixture();
    fs::write(fx.data.join("a.gpg"), pattern(10, 0)).unwrap();
    let orch = orchestrator(&fx.vault);
    let roots = vec![fx.data.clone()];
    for op in [Operation::Check, Operation::CheckSize, Operation::Fix { compare: false }] {
        let batch = orch.run(op, &roots).unwrap();
        assert!(matches!(batch.files[0].outcome, FileOutcome::Skipped { kind: ErrorKind::EccStoreMissing, .. }));
    }
}

#[test]
fn test_missing_root_aborts_before_processing() {
    let fx = fixture();
    let file = fx.data.join("a.gpg");
    fs::write(&file, pattern(10, 0)).unwrap();
    let orch = orchestrator(&fx.vault);
    let err = orch.run(Operation::Create, &[file.clone(), fx.data.join("gone")]).unwrap_err();
    assert!(matches!(err, EccError::InvalidInput { .. }));
    assert!(!orch.layout().ecc_path(&file).exists());
}

#[test]
fn test_empty_file() {
    let fx = fixture();
    let file = fx.data.join("empty.gpg");
    fs::write(&file, b"").unwrap();
    let orch = orchestrator(&fx.vault);
    let roots = vec![file.clone()];
    orch.run(Operation::Create, &roots).unwrap();
    assert_eq!(fs::metadata(orch.layout().ecc_path(&file)).unwrap().len(), 0);

    let batch = orch.run(Operation::Fix { compare: true }, &roots).unwrap();
    assert!(matches!(succeeded(&batch.files[0].outcome), Success::Fixed(r) if r.blocks == 0 && r.identical == Some(true)));
}

#[test]
fn test_paths_differing_only_by_parent_steps_get_their_own_stores() {
    let fx = fixture();
    fs::create_dir_all(fx.data.join("b/a")).unwrap();
    fs::create_dir_all(fx.data.join("a")).unwrap();
    let deep = fx.data.join("b/a/x.gpg");
    let up = fx.data.join("b/../a/x.gpg");
    fs::write(&deep, pattern(500, 11)).unwrap();
    fs::write(fx.data.join("a/x.gpg"), pattern(700, 12)).unwrap();

    let orch = orchestrator(&fx.vault);
    assert_ne!(orch.layout().ecc_path(&deep), orch.layout().ecc_path(&up));
    let roots = vec![deep.clone(), up.clone()];

    let batch = orch.run(Operation::Create, &roots).unwrap();
    assert_eq!(batch.succeeded(), 2, "{batch:?}");

    let batch = orch.run(Operation::Fix { compare: true }, &roots).unwrap();
    for file in &batch.files {
        assert!(matches!(succeeded(&file.outcome), Success::Fixed(r) if r.identical == Some(true)));
    }
    assert_eq!(fs::read(orch.layout().repaired_path(&deep)).unwrap(), pattern(500, 11));
    assert_eq!(fs::read(orch.layout().repaired_path(&up)).unwrap(), pattern(700, 12));
}

#[test]
fn test_overlapping_roots_select_each_file_once() {
    let fx = fixture();
    let file = fx.data.join("a.gpg");
    fs::write(&file, pattern(300, 4)).unwrap();
    let orch = orchestrator(&fx.vault);

    let batch = orch.run(Operation::Create, &[fx.data.clone(), file.clone()]).unwrap();
    assert_eq!(batch.files.len(), 2);
    assert!(matches!(succeeded(&batch.files[0].outcome), Success::Created(_)));
    assert!(matches!(batch.files[1].outcome, FileOutcome::Skipped { kind: ErrorKind::InvalidInput, .. }));
}

#[cfg(unix)]
mod hung_codec {
    use super::*;
    use eccvault::codec::CommandCodec;
    use std::time::{Duration, Instant};

    fn sleeping_orchestrator(vault: &Path) -> Orchestrator {
        let codec = CommandCodec::new("sh", CodecParams::default()).args(["-c", "sleep 5; cat", "codec-stub"]);
        let options = EccOptions {
            store_root:   vault.to_path_buf(),
            file_timeout: Some(Duration::from_millis(200)),
            ..EccOptions::default()
        };
        Orchestrator::new(Box::new(codec), options)
    }

    #[test]
    fn test_timeout_aborts_create() {
        let fx = fixture();
        let file = fx.data.join("a.gpg");
        fs::write(&file, pattern(300, 0)).unwrap();
        let orch = sleeping_orchestrator(&fx.vault);

        let start = Instant::now();
        let batch = orch.run(Operation::Create, &[file.clone()]).unwrap();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(matches!(batch.files[0].outcome, FileOutcome::Failed { kind: ErrorKind::Cancelled, .. }));
        assert_eq!(fs::metadata(orch.layout().ecc_path(&file)).unwrap().len(), 0);
    }

    #[test]
    fn test_timeout_aborts_fix_and_removes_output() {
        let fx = fixture();
        let file = fx.data.join("a.gpg");
        fs::write(&file, pattern(300, 0)).unwrap();
        orchestrator(&fx.vault).run(Operation::Create, &[file.clone()]).unwrap();

        let orch = sleeping_orchestrator(&fx.vault);
        let output = orch.layout().repaired_path(&file);
        fs::create_dir_all(output.parent().unwrap()).unwrap();
        fs::write(&output, b"stale").unwrap();

        let start = Instant::now();
        let batch = orch.run(Operation::Fix { compare: false }, &[file.clone()]).unwrap();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(matches!(batch.files[0].outcome, FileOutcome::Failed { kind: ErrorKind::Cancelled, .. }));
        assert!(!output.exists());
    }
}

/// Reed-Solomon, except that decode refuses any codeword starting with `BAD!`.
struct FlakyCodec(ReedSolomonCodec);

impl Codec for FlakyCodec {
    fn name(&self) -> &str { "flaky" }
    fn params(&self) -> CodecParams { self.0.params() }
    fn encode(&self, message: &[u8]) -> Result<Vec<u8>, CodecError> { self.0.encode(message) }
    fn verify(&self, codeword: &[u8]) -> Result<bool, CodecError> { self.0.verify(codeword) }
    fn decode(&self, codeword: &[u8]) -> Result<Decoded, CodecError> {
        if codeword.starts_with(b"BAD!") {
            return Err(CodecError::Uncorrectable);
        }
        self.0.decode(codeword)
    }
}

#[test]
fn test_uncorrectable_file_does_not_stop_batch() {
    let fx = fixture();
    let mut second = b"BAD!".to_vec();
    second.extend(pattern(400, 2));
    fs::write(fx.data.join("1.gpg"), pattern(400, 1)).unwrap();
    fs::write(fx.data.join("2.gpg"), &second).unwrap();
    fs::write(fx.data.join("3.gpg"), pattern(400, 3)).unwrap();

    let codec = FlakyCodec(ReedSolomonCodec::new(CodecParams::default()).unwrap());
    let orch = orchestrator_with(Box::new(codec), &fx.vault);
    let roots = vec![fx.data.clone()];
    orch.run(Operation::Create, &roots).unwrap();

    let batch = orch.run(Operation::Fix { compare: false }, &roots).unwrap();
    assert_eq!((batch.succeeded(), batch.failed()), (2, 1));
    assert!(matches!(batch.files[1].outcome, FileOutcome::Failed { kind: ErrorKind::UncorrectableBlock, .. }));
    assert!(!orch.layout().repaired_path(&fx.data.join("2.gpg")).exists());
    assert_eq!(fs::read(orch.layout().repaired_path(&fx.data.join("3.gpg"))).unwrap(), pattern(400, 3));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_stream_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..600), chunk in 1usize..5) {
        let codec = ReedSolomonCodec::new(CodecParams::new(30, 20, 8).unwrap()).unwrap();
        let token = CancelToken::new();

        let mut ecc = Vec::new();
        let created = create_stream(&codec, &data[..], &mut ecc, chunk, &token).unwrap();
        prop_assert_eq!(ecc.len() as u64, created.blocks * 10);
        prop_assert_eq!(created.blocks, (data.len() as u64 + 19) / 20);

        let checked = check_stream(&codec, &data[..], &ecc[..], chunk, &token).unwrap();
        prop_assert!(checked.is_clean());

        let mut out = Vec::new();
        fix_stream(&codec, &data[..], &ecc[..], &mut out, chunk, &token).unwrap();
        prop_assert_eq!(out, data);
    }
}
